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

//! The world service
//!
//! [`World`] owns every live registry, the type registry and type tables, the
//! serial allocators and the deferred delete queue. It is created explicitly,
//! passed by reference to whatever needs it, and several worlds may coexist
//! in one process.
//!
//! # Operations
//!
//! ## Live registry
//! - `add_entity()` / `find_entity()` / `remove_entity()` - Per-category registry access
//! - `find_item()` / `find_mobile()` - Serial-kind shortcuts
//! - `new_serial()` / `create()` - Allocate a fresh serial and register a new entity
//!
//! ## Deletion
//! - `request_delete()` - Delete now, or defer while the world is loading
//!
//! ## Persistence
//! - `save()` - Write every category to the save directory
//! - `load()` - One-shot load of the save directory
//! - `wait_for_write_completion()` - Join a pending background write
//! - `set_saves_disabled()` - Maintenance switch turning `save()` into a no-op

mod category;
mod registry;
mod types;

pub use category::Category;
pub use registry::{EntityRegistry, Registration};
pub use types::{ConstructError, ShellFactory, TypeRegistry, TypeTable};

use crate::entity::{Entity, EntityRef, new_entity, read_entity, same_instance, write_entity};
use crate::persistence::{
    LoadError, LoadOutcome, OperatorPrompt, SaveError, SaveLayout, SaveOutcome, load, save,
};
use shardworld_common::{Serial, SerialKind};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// Outcome of [`World::request_delete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The world is loading; the delete runs once the load completes.
    Deferred,
    /// The entity ran its delete hook and left the registry.
    Deleted,
    /// No live entity with that serial.
    NotFound,
}

/// Persistence settings of a world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldOptions {
    /// Root of the save files
    pub save_directory: PathBuf,
    /// Where the previous save is rotated to before each save, if anywhere
    pub backup_directory: Option<PathBuf>,
    /// Serialize mobiles and items on two threads
    pub multiprocessor: bool,
    /// Flush save files on a worker thread after serializing in memory
    pub background_write: bool,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            save_directory: PathBuf::from("Saves"),
            backup_directory: Some(PathBuf::from("Backups/Automatic")),
            multiprocessor: true,
            background_write: false,
        }
    }
}

impl WorldOptions {
    /// Options saving under `save_directory` without backups
    pub fn at(save_directory: impl Into<PathBuf>) -> Self {
        Self {
            save_directory: save_directory.into(),
            backup_directory: None,
            ..Self::default()
        }
    }
}

pub(crate) type PendingWrite = JoinHandle<Result<(), SaveError>>;

/// Live world state and its persistence
pub struct World {
    options: WorldOptions,
    layout: SaveLayout,
    types: TypeRegistry,
    items: EntityRegistry,
    mobiles: EntityRegistry,
    guilds: EntityRegistry,
    regions: EntityRegistry,
    item_types: Mutex<TypeTable>,
    mobile_types: Mutex<TypeTable>,
    last_item: Mutex<Serial>,
    last_mobile: Mutex<Serial>,
    loading: AtomicBool,
    loaded: AtomicBool,
    saving: AtomicBool,
    saves_disabled: AtomicBool,
    delete_queue: Mutex<VecDeque<(Category, EntityRef)>>,
    pending_write: Mutex<Option<PendingWrite>>,
}

impl World {
    /// Create an empty, not yet loaded world
    pub fn new(options: WorldOptions, types: TypeRegistry) -> Self {
        Self {
            layout: SaveLayout::new(&options.save_directory),
            options,
            types,
            items: EntityRegistry::new(Category::Items),
            mobiles: EntityRegistry::new(Category::Mobiles),
            guilds: EntityRegistry::new(Category::Guilds),
            regions: EntityRegistry::new(Category::Regions),
            item_types: Mutex::new(TypeTable::new()),
            mobile_types: Mutex::new(TypeTable::new()),
            last_item: Mutex::new(Serial::ZERO),
            last_mobile: Mutex::new(Serial::ZERO),
            loading: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            saving: AtomicBool::new(false),
            saves_disabled: AtomicBool::new(false),
            delete_queue: Mutex::new(VecDeque::new()),
            pending_write: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &WorldOptions {
        &self.options
    }

    pub fn layout(&self) -> &SaveLayout {
        &self.layout
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // ============================================================================
    // Live Registry
    // ============================================================================

    pub fn registry(&self, category: Category) -> &EntityRegistry {
        match category {
            Category::Items => &self.items,
            Category::Mobiles => &self.mobiles,
            Category::Guilds => &self.guilds,
            Category::Regions => &self.regions,
        }
    }

    pub fn add_entity(&self, category: Category, entity: EntityRef) -> Registration {
        self.registry(category).add(entity)
    }

    pub fn find_entity(&self, category: Category, serial: Serial) -> Option<EntityRef> {
        self.registry(category).find(serial)
    }

    pub fn remove_entity(&self, category: Category, entity: &EntityRef) -> bool {
        self.registry(category).remove(entity)
    }

    pub fn find_item(&self, serial: Serial) -> Option<EntityRef> {
        self.items.find(serial)
    }

    pub fn find_mobile(&self, serial: Serial) -> Option<EntityRef> {
        self.mobiles.find(serial)
    }

    /// Allocate the next free serial of `kind`
    ///
    /// Allocation continues after the last serial handed out (or the highest
    /// loaded one), wraps at the end of the range and skips serials that are
    /// still live. Returns `None` when the range is exhausted.
    pub fn new_serial(&self, kind: SerialKind) -> Option<Serial> {
        let (category, last) = match kind {
            SerialKind::Item => (Category::Items, &self.last_item),
            SerialKind::Mobile => (Category::Mobiles, &self.last_mobile),
            SerialKind::Invalid => return None,
        };
        let (min, max) = kind.range()?;
        let registry = self.registry(category);
        if registry.len() as i64 >= max as i64 - min as i64 + 1 {
            tracing::error!("{} serial range exhausted", category);
            return None;
        }

        let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = kind.next_after(*last)?;
        while registry.contains(candidate) {
            candidate = kind.next_after(candidate)?;
        }
        *last = candidate;
        Some(candidate)
    }

    /// Create and register a fresh item or mobile
    ///
    /// # Arguments
    /// * `kind` - Serial domain, which also selects the registry
    /// * `build` - Builds the entity around its newly allocated serial
    ///
    /// # Returns
    /// The registered handle, or `None` if no serial could be allocated
    pub fn create<T, F>(&self, kind: SerialKind, build: F) -> Option<EntityRef>
    where
        T: Entity,
        F: FnOnce(Serial) -> T,
    {
        let category = match kind {
            SerialKind::Item => Category::Items,
            SerialKind::Mobile => Category::Mobiles,
            SerialKind::Invalid => return None,
        };
        let serial = self.new_serial(kind)?;
        let entity = new_entity(build(serial));
        match self.add_entity(category, entity.clone()) {
            Registration::Added => Some(entity),
            _ => None,
        }
    }

    // ============================================================================
    // Deletion
    // ============================================================================

    /// Delete a live entity, or queue the delete while the world is loading
    ///
    /// Entities discovering during `deserialize` that they are invalid call
    /// this on themselves. Outside of a load the entity must not be locked by
    /// the caller, since its delete hook takes the write lock.
    pub fn request_delete(&self, category: Category, serial: Serial) -> DeleteOutcome {
        let Some(entity) = self.find_entity(category, serial) else {
            return DeleteOutcome::NotFound;
        };

        {
            let mut queue = self.delete_queue();
            if self.loading.load(Ordering::Acquire) {
                tracing::debug!("Deferring delete of {} {} until load completes", category, serial);
                queue.push_back((category, entity));
                return DeleteOutcome::Deferred;
            }
        }

        if self.delete_now(category, serial, &entity) {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        }
    }

    /// Number of deletes waiting for the current load to complete
    pub fn pending_deletes(&self) -> usize {
        self.delete_queue().len()
    }

    fn delete_now(&self, category: Category, serial: Serial, entity: &EntityRef) -> bool {
        let registry = self.registry(category);
        match registry.find(serial) {
            Some(current) if same_instance(&current, entity) => {}
            _ => {
                tracing::debug!("{} {} already deleted", category, serial);
                return false;
            }
        }
        // Leave the registry first so a hook reaching back here finds nothing
        if !registry.remove_at(serial, entity) {
            return false;
        }
        write_entity(entity).on_delete(self);
        true
    }

    /// Apply queued deletes in request order; returns how many ran
    pub(crate) fn flush_deferred_deletes(&self) -> usize {
        let mut deleted = 0;
        loop {
            let next = self.delete_queue().pop_front();
            let Some((category, entity)) = next else {
                break;
            };
            let serial = read_entity(&entity).serial();
            if self.delete_now(category, serial, &entity) {
                deleted += 1;
            }
        }
        deleted
    }

    pub(crate) fn clear_deferred_deletes(&self) {
        self.delete_queue().clear();
    }

    fn delete_queue(&self) -> MutexGuard<'_, VecDeque<(Category, EntityRef)>> {
        self.delete_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    /// Save every category
    ///
    /// Returns [`SaveOutcome::Skipped`] without touching the disk while a save
    /// is running, while saves are disabled, or while a background write of
    /// the previous save is still in flight.
    pub fn save(&self) -> Result<SaveOutcome, SaveError> {
        save::save_world(self)
    }

    /// Load the save directory into this world
    ///
    /// A second call after a successful load returns
    /// [`LoadOutcome::AlreadyLoaded`] and reads nothing.
    pub fn load(&self, prompt: &mut dyn OperatorPrompt) -> Result<LoadOutcome, LoadError> {
        load::load_world(self, prompt)
    }

    /// Block until the pending background write, if any, has finished
    pub fn wait_for_write_completion(&self) -> Result<(), SaveError> {
        let pending = self.pending_write().take();
        match pending {
            Some(handle) => save::join_write(handle),
            None => Ok(()),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    pub fn saves_disabled(&self) -> bool {
        self.saves_disabled.load(Ordering::Acquire)
    }

    /// Turn saving off for destructive maintenance, or back on
    pub fn set_saves_disabled(&self, disabled: bool) {
        self.saves_disabled.store(disabled, Ordering::Release);
        if disabled {
            tracing::warn!("World saves disabled");
        } else {
            tracing::info!("World saves enabled");
        }
    }

    /// Enter the loading state; false if another load is running
    pub(crate) fn begin_loading(&self) -> bool {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_loading(&self) {
        let _queue = self.delete_queue();
        self.loading.store(false, Ordering::Release);
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    pub(crate) fn saving_flag(&self) -> &AtomicBool {
        &self.saving
    }

    pub(crate) fn pending_write(&self) -> MutexGuard<'_, Option<PendingWrite>> {
        self.pending_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Type table of a typed category
    pub(crate) fn type_table(&self, category: Category) -> Option<MutexGuard<'_, TypeTable>> {
        let table = match category {
            Category::Items => &self.item_types,
            Category::Mobiles => &self.mobile_types,
            Category::Guilds | Category::Regions => return None,
        };
        Some(table.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Continue serial allocation after the highest loaded serials
    pub(crate) fn seed_serials(&self) {
        for (registry, last) in [
            (&self.items, &self.last_item),
            (&self.mobiles, &self.last_mobile),
        ] {
            if let Some(max) = registry.max_serial() {
                let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                if max > *last {
                    *last = max;
                }
            }
        }
    }

    /// Drop every live entity, used when a load attempt fails
    pub(crate) fn clear_registries(&self) {
        for category in Category::LOAD_ORDER {
            self.registry(category).clear();
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("save_directory", &self.options.save_directory)
            .field("items", &self.items.len())
            .field("mobiles", &self.mobiles.len())
            .field("guilds", &self.guilds.len())
            .field("regions", &self.regions.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
