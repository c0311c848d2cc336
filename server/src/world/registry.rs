//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
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

//! Live entity registry mapping serials to live entity handles
//!
//! One registry exists per [`Category`]. It is the single source of truth for
//! "does this serial currently denote a live entity" and is shared by
//! gameplay threads, timers, network handlers and the persistence pipeline,
//! so every operation is safe to call concurrently without external locking.
//!
//! Invariants:
//! - at most one instance occupies a serial at any time
//! - adding a different instance under an occupied serial keeps the original
//!   and logs an anomaly
//! - removal is the only way a serial becomes free again

use crate::entity::{EntityRef, read_entity, same_instance};
use crate::world::Category;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shardworld_common::Serial;

/// Result of [`EntityRegistry::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The entity now occupies its serial.
    Added,
    /// This exact instance was already registered.
    AlreadyRegistered,
    /// A different instance occupies the serial; the original was kept.
    Conflict,
    /// The entity carries a sentinel or negative serial.
    InvalidSerial,
}

/// Concurrent serial → entity map for one category
pub struct EntityRegistry {
    category: Category,
    entries: DashMap<Serial, EntityRef>,
}

impl EntityRegistry {
    /// Create a new empty registry
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entries: DashMap::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Register an entity under its serial
    ///
    /// # Arguments
    /// * `entity` - The live entity to register
    ///
    /// # Returns
    /// * `Registration::Added` if the serial was free
    /// * `Registration::AlreadyRegistered` if this instance already occupies it
    /// * `Registration::Conflict` if another instance occupies it (logged, original kept)
    /// * `Registration::InvalidSerial` if the serial can never denote a live entity
    pub fn add(&self, entity: EntityRef) -> Registration {
        let serial = read_entity(&entity).serial();
        if !serial.is_valid() {
            tracing::warn!(
                "Refusing to register {} with invalid serial {}",
                self.category,
                serial
            );
            return Registration::InvalidSerial;
        }

        match self.entries.entry(serial) {
            Entry::Occupied(occupied) => {
                if same_instance(occupied.get(), &entity) {
                    Registration::AlreadyRegistered
                } else {
                    tracing::warn!(
                        "{} registry anomaly: serial {} is already occupied by a different instance, keeping the original",
                        self.category,
                        serial
                    );
                    Registration::Conflict
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entity);
                Registration::Added
            }
        }
    }

    /// Look up a live entity by serial
    ///
    /// Sentinel and unknown serials return `None`.
    pub fn find(&self, serial: Serial) -> Option<EntityRef> {
        if !serial.is_valid() {
            return None;
        }
        self.entries.get(&serial).map(|entry| entry.value().clone())
    }

    /// Unregister an entity
    ///
    /// Only removes the entry if this exact instance occupies the serial.
    ///
    /// # Returns
    /// * `true` - The entity was removed
    /// * `false` - The entity was not registered (logged)
    pub fn remove(&self, entity: &EntityRef) -> bool {
        let serial = read_entity(entity).serial();
        self.remove_at(serial, entity)
    }

    /// Unregister `entity` knowing its serial, without locking the entity.
    pub fn remove_at(&self, serial: Serial, entity: &EntityRef) -> bool {
        let removed = self
            .entries
            .remove_if(&serial, |_, occupant| same_instance(occupant, entity))
            .is_some();
        if !removed {
            tracing::warn!(
                "Failed to remove {} serial {}: not registered to this instance",
                self.category,
                serial
            );
        }
        removed
    }

    /// Check if a serial is occupied
    pub fn contains(&self, serial: Serial) -> bool {
        self.entries.contains_key(&serial)
    }

    /// Get the number of registered entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all registrations
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get all registered serials in ascending order
    pub fn serials(&self) -> Vec<Serial> {
        let mut serials: Vec<Serial> = self.entries.iter().map(|entry| *entry.key()).collect();
        serials.sort_unstable();
        serials
    }

    /// Point-in-time copy of every live entity, ordered by serial
    pub fn snapshot(&self) -> Vec<EntityRef> {
        let mut entries: Vec<(Serial, EntityRef)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_unstable_by_key(|(serial, _)| *serial);
        entries.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Highest registered serial, if any
    pub fn max_serial(&self) -> Option<Serial> {
        self.entries.iter().map(|entry| *entry.key()).max()
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("category", &self.category)
            .field("len", &self.entries.len())
            .finish()
    }
}
