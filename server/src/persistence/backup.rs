//
// Copyright 2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Automatic backup rotation
//!
//! Before a save replaces the save directory, the previous one is moved into
//! the newest backup slot and older slots shift down by one; the oldest is
//! dropped. Slot directories carry the time their backup was taken, e.g.
//! `Most Recent (2026-10-16-14-05-00)`.

use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};

/// Backup slots, oldest first
pub const BACKUP_SLOTS: [&str; 3] = ["Third Backup", "Second Backup", "Most Recent"];

/// Rotate `save_directory` into `backup_directory`
///
/// Returns the new "Most Recent" directory, or `None` if there was no save to
/// back up.
pub fn rotate_backups(save_directory: &Path, backup_directory: &Path) -> io::Result<Option<PathBuf>> {
    if !save_directory.exists() {
        return Ok(None);
    }
    std::fs::create_dir_all(backup_directory)?;

    if let Some(oldest) = find_slot(backup_directory, BACKUP_SLOTS[0])? {
        tracing::debug!("Dropping backup {}", oldest.display());
        std::fs::remove_dir_all(&oldest)?;
    }

    for pair in BACKUP_SLOTS.windows(2) {
        let (older, newer) = (pair[0], pair[1]);
        if let Some(current) = find_slot(backup_directory, newer)? {
            let stamp = slot_stamp(&current, newer);
            std::fs::rename(&current, backup_directory.join(format!("{}{}", older, stamp)))?;
        }
    }

    let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let target = backup_directory.join(format!("{} ({})", BACKUP_SLOTS[2], stamp));
    std::fs::rename(save_directory, &target)?;
    tracing::info!("Backed up {} to {}", save_directory.display(), target.display());
    Ok(Some(target))
}

fn find_slot(backup_directory: &Path, slot: &str) -> io::Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(backup_directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(slot) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// The `" (timestamp)"` suffix of a slot directory, if any
fn slot_stamp(path: &Path, slot: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().trim_start_matches(slot).to_string())
        .unwrap_or_default()
}
