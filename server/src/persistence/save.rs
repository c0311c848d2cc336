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

//! Save pipeline
//!
//! Every category is serialized in one pass: for each live entity the current
//! blob position is recorded, the body is written, and the index entry gets
//! the body length. Bodies are built in memory first; only then is the
//! previous save rotated into the backups and each file written to a `.tmp`
//! sibling and renamed into place, either inline or on a worker thread when
//! background writes are enabled.

use super::backup::rotate_backups;
use super::index::{IndexEntry, write_index, write_type_table};
use super::layout::{SaveLayout, replace_file};
use crate::entity::write_entity;
use crate::world::{Category, PendingWrite, World};
use shardworld_common::{BinaryWriter, CodecError, Serial};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to serialize {category} {serial}: {source}")]
    Serialize {
        category: Category,
        serial: Serial,
        #[source]
        source: CodecError,
    },

    #[error("{category} {serial} body is {length} bytes, more than an index entry can address")]
    BodyTooLarge {
        category: Category,
        serial: Serial,
        length: u64,
    },

    #[error("failed to encode {category} index: {source}")]
    Encode {
        category: Category,
        #[source]
        source: CodecError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rotate backups: {0}")]
    Backup(#[source] std::io::Error),

    #[error("save worker thread panicked")]
    WorkerPanicked,
}

/// Why a save did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySaving,
    SavesDisabled,
    WritePending,
}

/// Entity counts of a completed save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSummary {
    pub items: usize,
    pub mobiles: usize,
    pub guilds: usize,
    pub regions: usize,
    /// Files are still being written on a worker thread
    pub background: bool,
    pub elapsed: Duration,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.items + self.mobiles + self.guilds + self.regions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Completed(SaveSummary),
    Skipped(SkipReason),
}

/// One category, fully encoded and ready for disk
#[derive(Debug)]
struct EncodedCategory {
    category: Category,
    count: usize,
    index: Vec<u8>,
    type_table: Option<Vec<u8>>,
    blob: Vec<u8>,
}

/// Clears the saving flag when the save ends, however it ends
struct SavingGuard<'a>(&'a AtomicBool);

impl<'a> SavingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) fn save_world(world: &World) -> Result<SaveOutcome, SaveError> {
    if world.saves_disabled() {
        tracing::debug!("Save skipped: saves are disabled");
        return Ok(SaveOutcome::Skipped(SkipReason::SavesDisabled));
    }
    let Some(_guard) = SavingGuard::acquire(world.saving_flag()) else {
        tracing::debug!("Save skipped: a save is already running");
        return Ok(SaveOutcome::Skipped(SkipReason::AlreadySaving));
    };
    if write_pending(world) {
        tracing::debug!("Save skipped: the previous save is still being written");
        return Ok(SaveOutcome::Skipped(SkipReason::WritePending));
    }

    let started = Instant::now();
    tracing::info!("Saving world to {}", world.layout().root().display());

    let (mobiles, items) = if world.options().multiprocessor {
        std::thread::scope(|scope| {
            let mobiles = scope.spawn(|| encode_category(world, Category::Mobiles));
            let items = scope.spawn(|| encode_category(world, Category::Items));
            (
                mobiles.join().map_err(|_| SaveError::WorkerPanicked),
                items.join().map_err(|_| SaveError::WorkerPanicked),
            )
        })
    } else {
        (
            Ok(encode_category(world, Category::Mobiles)),
            Ok(encode_category(world, Category::Items)),
        )
    };
    let encoded = vec![
        mobiles??,
        items??,
        encode_category(world, Category::Guilds)?,
        encode_category(world, Category::Regions)?,
    ];

    // The previous save only moves once every body has been encoded
    if let Some(backup_directory) = &world.options().backup_directory {
        rotate_backups(world.layout().root(), backup_directory).map_err(SaveError::Backup)?;
    }

    let mut summary = SaveSummary::default();
    for category in &encoded {
        match category.category {
            Category::Items => summary.items = category.count,
            Category::Mobiles => summary.mobiles = category.count,
            Category::Guilds => summary.guilds = category.count,
            Category::Regions => summary.regions = category.count,
        }
    }

    if world.options().background_write {
        let layout = world.layout().clone();
        let handle = std::thread::Builder::new()
            .name("world-save-writer".to_string())
            .spawn(move || write_categories(&layout, &encoded))
            .map_err(|source| SaveError::Write {
                path: world.layout().root().to_path_buf(),
                source,
            })?;
        *world.pending_write() = Some(handle);
        summary.background = true;
    } else {
        write_categories(world.layout(), &encoded)?;
    }

    summary.elapsed = started.elapsed();
    tracing::info!(
        "World saved: {} mobiles, {} items, {} guilds, {} regions in {:.2}s{}",
        summary.mobiles,
        summary.items,
        summary.guilds,
        summary.regions,
        summary.elapsed.as_secs_f64(),
        if summary.background {
            " (writing in background)"
        } else {
            ""
        }
    );
    Ok(SaveOutcome::Completed(summary))
}

/// Reap a finished background write; true if one is still running
fn write_pending(world: &World) -> bool {
    let mut pending = world.pending_write();
    let finished = match pending.as_ref() {
        Some(handle) => handle.is_finished(),
        None => return false,
    };
    if !finished {
        return true;
    }
    if let Some(handle) = pending.take() {
        if let Err(e) = join_write(handle) {
            tracing::error!("Previous background save failed: {}", e);
        }
    }
    false
}

pub(crate) fn join_write(handle: PendingWrite) -> Result<(), SaveError> {
    handle.join().map_err(|_| SaveError::WorkerPanicked)?
}

fn encode_category(world: &World, category: Category) -> Result<EncodedCategory, SaveError> {
    let entities = world.registry(category).snapshot();
    let mut type_table = world.type_table(category);
    let mut entries = Vec::with_capacity(entities.len());

    let mut blob = Vec::new();
    {
        let mut writer = BinaryWriter::new(&mut blob);
        for entity in &entities {
            let mut entity = write_entity(entity);
            let serial = entity.serial();
            let ordinal = match type_table.as_mut() {
                Some(table) => table.ordinal_of(entity.type_name()),
                None => 0,
            };

            let offset = writer.position();
            entity
                .serialize(&mut writer)
                .map_err(|source| SaveError::Serialize {
                    category,
                    serial,
                    source,
                })?;
            let length = writer.position() - offset;
            entity.free_cache();

            let length = i32::try_from(length).map_err(|_| SaveError::BodyTooLarge {
                category,
                serial,
                length,
            })?;
            entries.push(IndexEntry {
                ordinal,
                serial,
                offset: offset as i64,
                length,
            });
        }
    }

    let encode = |source| SaveError::Encode { category, source };
    let mut index = Vec::with_capacity(4 + entries.len() * 20);
    write_index(&mut BinaryWriter::new(&mut index), category, &entries).map_err(encode)?;

    let type_table = match type_table {
        Some(table) => {
            let mut bytes = Vec::new();
            write_type_table(&mut BinaryWriter::new(&mut bytes), table.names()).map_err(encode)?;
            Some(bytes)
        }
        None => None,
    };

    Ok(EncodedCategory {
        category,
        count: entries.len(),
        index,
        type_table,
        blob,
    })
}

fn write_categories(layout: &SaveLayout, encoded: &[EncodedCategory]) -> Result<(), SaveError> {
    for category in encoded {
        let mut files = vec![
            (layout.blob(category.category), &category.blob),
            (layout.index(category.category), &category.index),
        ];
        if let (Some(path), Some(bytes)) =
            (layout.type_table(category.category), &category.type_table)
        {
            files.push((path, bytes));
        }

        for (path, bytes) in files {
            replace_file(&path, bytes).map_err(|source| SaveError::Write { path, source })?;
        }
    }
    Ok(())
}
