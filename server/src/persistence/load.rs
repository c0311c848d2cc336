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

//! Load pipeline
//!
//! Categories load in [`Category::LOAD_ORDER`], each through three phases:
//!
//! 1. **Type resolution** - read the type table and resolve every name through
//!    the [`TypeRegistry`](crate::world::TypeRegistry). An unknown name that
//!    the index references asks the operator whether to delete every object
//!    of that type; declining aborts the load.
//! 2. **Shells** - build an empty shell per index entry and register it right
//!    away, so bodies hydrated later can resolve references to it.
//! 3. **Hydration** - seek to each body in index order and deserialize it. A
//!    body must consume exactly the bytes the index records for it.
//!
//! Once every category is hydrated, items and mobiles recompute their
//! cached totals and the deletes deferred during the load are applied.
//!
//! Hydration failures are put to the operator: delete the object, delete
//! every object of its type, or abort. Deleting rewrites the index and the
//! load ends with [`LoadError::RestartRequired`]; the world is left empty.

use super::index::{IndexEntry, read_index, read_type_table, write_index};
use super::layout::replace_file;
use super::prompt::OperatorPrompt;
use crate::entity::{EntityRef, read_entity, write_entity};
use crate::world::{Category, Registration, ShellFactory, World};
use shardworld_common::{BinaryReader, BinaryWriter, CodecError, CodecResult, Serial};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{category} index is corrupt: {reason}")]
    CorruptIndex { category: Category, reason: String },

    #[error("{category} type table is corrupt: {source}")]
    CorruptTypeTable {
        category: Category,
        #[source]
        source: CodecError,
    },

    #[error("{category} index exists but its type table {path} is missing")]
    MissingTypeTable { category: Category, path: PathBuf },

    #[error("{category} index lists entities but the blob {path} is missing")]
    MissingBlob { category: Category, path: PathBuf },

    #[error("failed to read {category} blob: {source}")]
    Blob {
        category: Category,
        #[source]
        source: CodecError,
    },

    #[error("{category} save references type {type_name}, which is not registered")]
    UnresolvedType {
        category: Category,
        type_name: String,
    },

    #[error("factory for {type_name} returned {found} for {category} {serial}")]
    ConstructorContract {
        category: Category,
        type_name: String,
        serial: Serial,
        found: String,
    },

    #[error("{category} save is not empty but no {category} type is registered")]
    NoFactory { category: Category },

    #[error("load aborted by the operator after {category} failures")]
    Aborted { category: Category },

    #[error("{category} index rewritten without {removed} entries, restart to load the world")]
    RestartRequired { category: Category, removed: usize },

    #[error("failed to rewrite {path}: {source}")]
    Rewrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a load is already in progress")]
    AlreadyLoading,
}

/// Live entity counts after a completed load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub items: usize,
    pub mobiles: usize,
    pub guilds: usize,
    pub regions: usize,
    /// Index entries not loaded: deleted types, failed or duplicate shells
    pub skipped: usize,
    /// Deletes requested during the load and applied after it
    pub deleted: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadSummary),
    AlreadyLoaded,
}

/// A type table slot; `factory` is `None` for deleted or unused types
struct ResolvedType {
    name: String,
    factory: Option<ShellFactory>,
}

/// A registered shell waiting for its body
struct Shell {
    entry: IndexEntry,
    entity: EntityRef,
}

struct Failure {
    entry: IndexEntry,
    reason: String,
}

pub(crate) fn load_world(
    world: &World,
    prompt: &mut dyn OperatorPrompt,
) -> Result<LoadOutcome, LoadError> {
    if world.is_loaded() {
        tracing::debug!("World already loaded");
        return Ok(LoadOutcome::AlreadyLoaded);
    }
    if !world.begin_loading() {
        return Err(LoadError::AlreadyLoading);
    }

    let started = Instant::now();
    tracing::info!("Loading world from {}", world.layout().root().display());

    let mut summary = LoadSummary::default();
    for category in Category::LOAD_ORDER {
        match load_category(world, category, prompt) {
            Ok(skipped) => summary.skipped += skipped,
            Err(e) => {
                tracing::error!("World load failed: {}", e);
                world.clear_deferred_deletes();
                world.clear_registries();
                world.end_loading();
                return Err(e);
            }
        }
    }

    tracing::debug!("Updating item and mobile totals");
    for category in [Category::Items, Category::Mobiles] {
        for entity in world.registry(category).snapshot() {
            let mut entity = write_entity(&entity);
            entity.update_totals(world);
            entity.clear_properties();
        }
    }

    world.end_loading();
    summary.deleted = world.flush_deferred_deletes();
    world.seed_serials();
    world.mark_loaded();

    summary.items = world.registry(Category::Items).len();
    summary.mobiles = world.registry(Category::Mobiles).len();
    summary.guilds = world.registry(Category::Guilds).len();
    summary.regions = world.registry(Category::Regions).len();
    summary.elapsed = started.elapsed();
    tracing::info!(
        "World loaded: {} mobiles, {} items, {} guilds, {} regions in {:.2}s",
        summary.mobiles,
        summary.items,
        summary.guilds,
        summary.regions,
        summary.elapsed.as_secs_f64()
    );
    if summary.deleted > 0 {
        tracing::info!("Applied {} deferred deletes", summary.deleted);
    }
    Ok(LoadOutcome::Loaded(summary))
}

/// Load one category; returns how many index entries were skipped
fn load_category(
    world: &World,
    category: Category,
    prompt: &mut dyn OperatorPrompt,
) -> Result<usize, LoadError> {
    let layout = world.layout();
    let index_path = layout.index(category);
    if !index_path.exists() {
        tracing::info!("No {} save found, starting empty", category);
        return Ok(0);
    }

    let started = Instant::now();
    let entries = decode_file(&index_path, |reader| read_index(reader, category))?.map_err(
        |e| LoadError::CorruptIndex {
            category,
            reason: e.to_string(),
        },
    )?;

    let types = resolve_types(world, category, &entries, prompt)?;

    let kept: Vec<IndexEntry> = entries
        .iter()
        .filter(|entry| types[entry.ordinal as usize].factory.is_some())
        .copied()
        .collect();
    let mut skipped = entries.len() - kept.len();
    if skipped > 0 {
        tracing::warn!(
            "Removing {} {} entries of deleted types from the index",
            skipped,
            category
        );
        rewrite_index(world, category, &kept)?;
    }

    let blob_path = layout.blob(category);
    if !kept.is_empty() && !blob_path.exists() {
        return Err(LoadError::MissingBlob {
            category,
            path: blob_path,
        });
    }

    let shells = build_shells(world, category, &kept, &types, &mut skipped)?;
    let failures = hydrate(world, category, &blob_path, &shells)?;
    if !failures.is_empty() {
        return Err(recover(world, category, &kept, &types, &failures, prompt));
    }

    tracing::info!(
        "Loaded {} {} in {:.2}s",
        shells.len(),
        category,
        started.elapsed().as_secs_f64()
    );
    Ok(skipped)
}

fn resolve_types(
    world: &World,
    category: Category,
    entries: &[IndexEntry],
    prompt: &mut dyn OperatorPrompt,
) -> Result<Vec<ResolvedType>, LoadError> {
    let Some(type_path) = world.layout().type_table(category) else {
        return match world.types().structural(category) {
            Some((name, factory)) => Ok(vec![ResolvedType {
                name: name.to_string(),
                factory: Some(factory),
            }]),
            None if entries.is_empty() => Ok(vec![ResolvedType {
                name: String::new(),
                factory: None,
            }]),
            None => Err(LoadError::NoFactory { category }),
        };
    };

    if !type_path.exists() {
        return Err(LoadError::MissingTypeTable {
            category,
            path: type_path,
        });
    }
    let names = decode_file(&type_path, read_type_table)?
        .map_err(|source| LoadError::CorruptTypeTable { category, source })?;

    if let Some(entry) = entries
        .iter()
        .find(|entry| entry.ordinal < 0 || entry.ordinal as usize >= names.len())
    {
        return Err(LoadError::CorruptIndex {
            category,
            reason: format!(
                "{} uses type ordinal {} but the type table has {} names",
                entry.serial,
                entry.ordinal,
                names.len()
            ),
        });
    }
    let referenced: HashSet<i32> = entries.iter().map(|entry| entry.ordinal).collect();

    let mut types = Vec::with_capacity(names.len());
    for (ordinal, name) in names.into_iter().enumerate() {
        let factory = world.types().resolve(&name);
        if factory.is_none() {
            if referenced.contains(&(ordinal as i32)) {
                tracing::error!("{} save references unknown type {}", category, name);
                let question = format!(
                    "Type {} in the {} save no longer exists. Delete all objects of that type?",
                    name, category
                );
                if !prompt.confirm(&question) {
                    return Err(LoadError::UnresolvedType {
                        category,
                        type_name: name,
                    });
                }
                tracing::warn!("Deleting all {} of type {}", category, name);
            } else {
                tracing::warn!("Ignoring unused unknown type {} in the {} type table", name, category);
            }
        }
        types.push(ResolvedType { name, factory });
    }

    if let Some(mut table) = world.type_table(category) {
        table.seed(
            types
                .iter()
                .filter(|resolved| resolved.factory.is_some())
                .map(|resolved| resolved.name.as_str()),
        );
    }
    Ok(types)
}

fn build_shells(
    world: &World,
    category: Category,
    entries: &[IndexEntry],
    types: &[ResolvedType],
    skipped: &mut usize,
) -> Result<Vec<Shell>, LoadError> {
    let mut shells = Vec::with_capacity(entries.len());
    for entry in entries {
        let resolved = &types[entry.ordinal as usize];
        let Some(factory) = &resolved.factory else {
            *skipped += 1;
            continue;
        };

        let entity = match factory(entry.serial) {
            Ok(entity) => entity,
            Err(e) => {
                tracing::error!("Skipping {} {}: {}", category, entry.serial, e);
                *skipped += 1;
                continue;
            }
        };

        {
            let shell = read_entity(&entity);
            if shell.serial() != entry.serial || shell.type_name() != resolved.name {
                return Err(LoadError::ConstructorContract {
                    category,
                    type_name: resolved.name.clone(),
                    serial: entry.serial,
                    found: format!("{} {}", shell.type_name(), shell.serial()),
                });
            }
        }

        match world.add_entity(category, entity.clone()) {
            Registration::Added => shells.push(Shell {
                entry: *entry,
                entity,
            }),
            _ => *skipped += 1,
        }
    }
    Ok(shells)
}

fn hydrate(
    world: &World,
    category: Category,
    blob_path: &Path,
    shells: &[Shell],
) -> Result<Vec<Failure>, LoadError> {
    let mut failures = Vec::new();
    if shells.is_empty() {
        return Ok(failures);
    }

    let file = File::open(blob_path).map_err(|source| LoadError::Io {
        path: blob_path.to_path_buf(),
        source,
    })?;
    let blob_length = file
        .metadata()
        .map_err(|source| LoadError::Io {
            path: blob_path.to_path_buf(),
            source,
        })?
        .len();
    let mut stream = BufReader::new(file);
    let mut reader = BinaryReader::new(&mut stream);
    let blob_error = |source| LoadError::Blob { category, source };

    for shell in shells {
        let entry = shell.entry;
        let end = entry.end() as u64;
        if end > blob_length {
            tracing::error!(
                "{} {} ends at byte {} past the end of the {} byte blob",
                category,
                entry.serial,
                end,
                blob_length
            );
            failures.push(Failure {
                entry,
                reason: format!("body ends past the end of the blob ({} > {})", end, blob_length),
            });
            break;
        }

        reader.seek(entry.offset as u64).map_err(blob_error)?;
        let result = write_entity(&shell.entity).deserialize(&mut reader, world);
        match result {
            Ok(()) if reader.position() == end => {}
            Ok(()) => {
                let consumed = reader.position() as i64 - entry.offset;
                tracing::error!(
                    "{} {} read {} bytes but its index entry records {}",
                    category,
                    entry.serial,
                    consumed,
                    entry.length
                );
                failures.push(Failure {
                    entry,
                    reason: format!(
                        "body read {} bytes, expected {}",
                        consumed, entry.length
                    ),
                });
                break;
            }
            Err(e) => {
                tracing::error!("Failed to deserialize {} {}: {}", category, entry.serial, e);
                failures.push(Failure {
                    entry,
                    reason: e.to_string(),
                });
                reader.resync(end).map_err(blob_error)?;
            }
        }
    }
    Ok(failures)
}

/// Put hydration failures to the operator and rewrite the index
fn recover(
    world: &World,
    category: Category,
    entries: &[IndexEntry],
    types: &[ResolvedType],
    failures: &[Failure],
    prompt: &mut dyn OperatorPrompt,
) -> LoadError {
    let mut removed_serials = HashSet::new();
    let mut removed_types = HashSet::new();

    for failure in failures {
        let entry = failure.entry;
        if removed_types.contains(&entry.ordinal) {
            continue;
        }
        let type_name = &types[entry.ordinal as usize].name;
        tracing::error!(
            "Error loading {} {} of type {}: {}",
            category,
            entry.serial,
            type_name,
            failure.reason
        );

        let delete_object = format!(
            "An error was encountered while loading {} {} of type {}. Delete this object?",
            category, entry.serial, type_name
        );
        if prompt.confirm(&delete_object) {
            removed_serials.insert(entry.serial);
            continue;
        }
        let delete_type = format!("Delete all objects of type {}?", type_name);
        if prompt.confirm(&delete_type) {
            removed_types.insert(entry.ordinal);
            continue;
        }
        tracing::error!("{} load aborted by the operator", category);
        return LoadError::Aborted { category };
    }

    let retained: Vec<IndexEntry> = entries
        .iter()
        .filter(|entry| {
            !removed_serials.contains(&entry.serial) && !removed_types.contains(&entry.ordinal)
        })
        .copied()
        .collect();
    let removed = entries.len() - retained.len();
    if let Err(e) = rewrite_index(world, category, &retained) {
        return e;
    }
    tracing::warn!(
        "Removed {} {} entries from the index, restart to load the world",
        removed,
        category
    );
    LoadError::RestartRequired { category, removed }
}

fn rewrite_index(world: &World, category: Category, entries: &[IndexEntry]) -> Result<(), LoadError> {
    let path = world.layout().index(category);
    let mut bytes = Vec::with_capacity(4 + entries.len() * 20);
    write_index(&mut BinaryWriter::new(&mut bytes), category, entries).map_err(|e| {
        LoadError::Rewrite {
            path: path.clone(),
            source: std::io::Error::other(e.to_string()),
        }
    })?;
    replace_file(&path, &bytes).map_err(|source| LoadError::Rewrite { path, source })
}

/// Open `path` and run `decode` over it; the outer error is the open failure
fn decode_file<T>(
    path: &Path,
    decode: impl FnOnce(&mut BinaryReader<'_>) -> CodecResult<T>,
) -> Result<CodecResult<T>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut stream = BufReader::new(file);
    let mut reader = BinaryReader::new(&mut stream);
    Ok(decode(&mut reader))
}
