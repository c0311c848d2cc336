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

//! Persistable type registration and per-save type tables
//!
//! [`TypeRegistry`] is the closed, explicit set of entity types the loader can
//! rebuild: a type name maps to a factory producing an empty shell from a
//! serial. [`TypeTable`] assigns compact ordinals to type names for the
//! index files of one save generation.

use crate::entity::{EntityRef, Persistable, new_entity};
use crate::world::Category;
use shardworld_common::Serial;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Builds an empty shell for a persisted serial
pub type ShellFactory = Arc<dyn Fn(Serial) -> Result<EntityRef, ConstructError> + Send + Sync>;

/// A shell factory refused to build an entity
#[derive(Debug, Error)]
#[error("unable to construct {type_name} {serial}: {reason}")]
pub struct ConstructError {
    pub type_name: String,
    pub serial: Serial,
    pub reason: String,
}

impl ConstructError {
    pub fn new(type_name: impl Into<String>, serial: Serial, reason: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            serial,
            reason: reason.into(),
        }
    }
}

/// Name → factory map consulted during load
#[derive(Default, Clone)]
pub struct TypeRegistry {
    typed: HashMap<String, ShellFactory>,
    structural: HashMap<Category, (String, ShellFactory)>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item or mobile type under its [`Persistable::TYPE_NAME`]
    pub fn register<T: Persistable>(&mut self) -> &mut Self {
        self.register_with(T::TYPE_NAME, |serial| Ok(new_entity(T::from_serial(serial))))
    }

    /// Register a custom factory for an item or mobile type name
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_with<F>(&mut self, type_name: &str, factory: F) -> &mut Self
    where
        F: Fn(Serial) -> Result<EntityRef, ConstructError> + Send + Sync + 'static,
    {
        if self
            .typed
            .insert(type_name.to_string(), Arc::new(factory))
            .is_some()
        {
            tracing::debug!("Replaced factory for type {}", type_name);
        }
        self
    }

    /// Register the single guild type
    pub fn register_guild<T: Persistable>(&mut self) -> &mut Self {
        self.register_structural::<T>(Category::Guilds)
    }

    /// Register the single region type
    pub fn register_region<T: Persistable>(&mut self) -> &mut Self {
        self.register_structural::<T>(Category::Regions)
    }

    fn register_structural<T: Persistable>(&mut self, category: Category) -> &mut Self {
        let factory: ShellFactory = Arc::new(|serial| Ok(new_entity(T::from_serial(serial))));
        self.structural
            .insert(category, (T::TYPE_NAME.to_string(), factory));
        self
    }

    /// Resolve a saved type name
    pub fn resolve(&self, type_name: &str) -> Option<ShellFactory> {
        self.typed.get(type_name).cloned()
    }

    /// Type name and factory of a guild or region category
    pub fn structural(&self, category: Category) -> Option<(&str, ShellFactory)> {
        self.structural
            .get(&category)
            .map(|(name, factory)| (name.as_str(), factory.clone()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.typed.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.typed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.structural.is_empty()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.typed.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("typed", &names)
            .field("structural", &self.structural.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Ordered list of type names for one typed category
///
/// Ordinals are positions of first appearance. The table only grows within a
/// process, so ordinals stay stable across the saves of one session; they
/// carry no meaning outside the save that wrote them.
#[derive(Debug, Default, Clone)]
pub struct TypeTable {
    names: Vec<String>,
    ordinals: HashMap<String, i32>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordinal for `type_name`, appending it on first sight
    pub fn ordinal_of(&mut self, type_name: &str) -> i32 {
        if let Some(ordinal) = self.ordinals.get(type_name) {
            return *ordinal;
        }
        let ordinal = self.names.len() as i32;
        self.names.push(type_name.to_string());
        self.ordinals.insert(type_name.to_string(), ordinal);
        ordinal
    }

    /// Append every name not already present, keeping existing ordinals
    pub fn seed<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) {
        for name in names {
            self.ordinal_of(name);
        }
    }

    pub fn get(&self, ordinal: i32) -> Option<&str> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| self.names.get(index))
            .map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
