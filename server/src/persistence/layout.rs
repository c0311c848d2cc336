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

use crate::world::Category;
use std::io;
use std::path::{Path, PathBuf};

/// File locations of a save directory
///
/// ```text
/// Saves/
///   Items/Items.{idx,tdb,bin}
///   Mobiles/Mobiles.{idx,tdb,bin}
///   Guilds/Guilds.{idx,bin}
///   Regions/Regions.{idx,bin}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveLayout {
    root: PathBuf,
}

impl SaveLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn directory(&self, category: Category) -> PathBuf {
        self.root.join(category.name())
    }

    pub fn index(&self, category: Category) -> PathBuf {
        self.file(category, "idx")
    }

    /// Type table path; `None` for guilds and regions
    pub fn type_table(&self, category: Category) -> Option<PathBuf> {
        category
            .has_type_table()
            .then(|| self.file(category, "tdb"))
    }

    pub fn blob(&self, category: Category) -> PathBuf {
        self.file(category, "bin")
    }

    fn file(&self, category: Category, extension: &str) -> PathBuf {
        self.directory(category)
            .join(format!("{}.{}", category.name(), extension))
    }
}

/// Replace `path` with `bytes` by writing a sibling `.tmp` file and renaming
/// it over the target.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = PathBuf::from(temporary);

    std::fs::write(&temporary, bytes)?;
    std::fs::rename(&temporary, path)
}
