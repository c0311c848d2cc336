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

//! The persistence contract every world entity honors
//!
//! The core never knows concrete entity types. It needs exactly four things
//! from them:
//! - a [`Serial`] that never changes once assigned
//! - a stable type name usable as a lookup key in saved type tables
//! - [`Entity::serialize`] / [`Entity::deserialize`] against the binary codec
//! - a "deserialization constructor" building an empty shell from a serial,
//!   see [`Persistable::from_serial`]
//!
//! Live entities are shared as [`EntityRef`] handles. Hydration and saving
//! take the entity's write lock, lookups only clone the handle.

use crate::world::World;
use shardworld_common::{BinaryReader, BinaryWriter, CodecResult, Serial};
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a live entity
pub type EntityRef = Arc<RwLock<dyn Entity>>;

/// Access to the concrete type behind a trait object
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A persisted world entity
pub trait Entity: AsAny + Send + Sync {
    /// Persistent identifier, immutable once assigned
    fn serial(&self) -> Serial;

    /// Stable, fully-qualified type name written to the type table
    fn type_name(&self) -> &'static str;

    /// Write the entity body. Bodies should lead with a schema version.
    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()>;

    /// Populate a shell from its saved body.
    ///
    /// Every other entity saved alongside this one already exists as a
    /// shell, so references by serial resolve through `world` even when the
    /// target has not been hydrated yet. An entity that finds itself invalid
    /// must go through [`World::request_delete`], which is deferred while
    /// loading.
    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, world: &World) -> CodecResult<()>;

    /// Drop transient state after the body has been written during a save.
    fn free_cache(&mut self) {}

    /// Recompute non-persisted aggregates once the whole world is loaded.
    fn update_totals(&mut self, _world: &World) {}

    /// Clear cached property data once the whole world is loaded.
    fn clear_properties(&mut self) {}

    /// Called once right after the entity has left the live registry.
    fn on_delete(&mut self, _world: &World) {}
}

impl dyn Entity {
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: Entity>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// An entity type that can be rebuilt from a save
pub trait Persistable: Entity + Sized {
    /// Name stored in type tables; must never change once data is saved.
    const TYPE_NAME: &'static str;

    /// Deserialization constructor: an empty shell carrying only `serial`.
    fn from_serial(serial: Serial) -> Self;
}

/// Wrap an entity into a shared handle
pub fn new_entity<T: Entity>(entity: T) -> EntityRef {
    Arc::new(RwLock::new(entity))
}

/// Read-lock an entity, recovering from a poisoned lock
pub fn read_entity(entity: &EntityRef) -> RwLockReadGuard<'_, dyn Entity> {
    entity.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock an entity, recovering from a poisoned lock
pub fn write_entity(entity: &EntityRef) -> RwLockWriteGuard<'_, dyn Entity> {
    entity.write().unwrap_or_else(PoisonError::into_inner)
}

/// True when both handles point at the same allocation
pub fn same_instance(a: &EntityRef, b: &EntityRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
