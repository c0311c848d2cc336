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

//! Base persisted entity types
//!
//! Gameplay crates extend the world with their own types; these are the
//! minimal ones the server itself registers. Every body leads with a schema
//! version so older saves keep loading after a type grows new fields.

use crate::entity::{Entity, Persistable, read_entity};
use crate::world::{Category, TypeRegistry, World};
use shardworld_common::{BinaryReader, BinaryWriter, CodecResult, Serial};

/// Register every type in this module
pub fn register(types: &mut TypeRegistry) {
    types
        .register::<Item>()
        .register::<Container>()
        .register::<Mobile>()
        .register_guild::<Guild>()
        .register_region::<Region>();
}

/// A plain item lying in the world or inside a container
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub serial: Serial,
    pub name: String,
    pub amount: i32,
    pub weight: f64,
    pub hue: i16,
    /// Containing item, or [`Serial::ZERO`] when on the ground
    pub parent: Serial,
}

impl Item {
    const VERSION: i32 = 1;

    pub fn new(serial: Serial, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount: 1,
            weight: 1.0,
            ..Self::from_serial(serial)
        }
    }
}

impl Entity for Item {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_version(Self::VERSION)?;
        writer.write_i16(self.hue)?;
        writer.write_string(&self.name)?;
        writer.write_i32(self.amount)?;
        writer.write_f64(self.weight)?;
        writer.write_serial(self.parent)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, world: &World) -> CodecResult<()> {
        let version = reader.read_version(Self::VERSION)?;
        if version >= 1 {
            self.hue = reader.read_i16()?;
        }
        self.name = reader.read_string()?;
        self.amount = reader.read_i32()?;
        self.weight = reader.read_f64()?;
        self.parent = reader.read_serial()?;

        if self.parent.is_valid() && world.find_item(self.parent).is_none() {
            tracing::warn!("Item {} lost its container {}, deleting", self.serial, self.parent);
            world.request_delete(Category::Items, self.serial);
        }
        Ok(())
    }
}

impl Persistable for Item {
    const TYPE_NAME: &'static str = "Shardworld.Items.Item";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            name: String::new(),
            amount: 0,
            weight: 0.0,
            hue: 0,
            parent: Serial::ZERO,
        }
    }
}

/// An item holding other items
///
/// Only the content serials are saved. Item and weight totals are
/// recomputed once the whole world has loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub serial: Serial,
    pub name: String,
    pub parent: Serial,
    pub contents: Vec<Serial>,
    pub total_items: usize,
    pub total_weight: f64,
}

impl Container {
    const VERSION: i32 = 0;

    pub fn new(serial: Serial, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::from_serial(serial)
        }
    }
}

impl Entity for Container {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_version(Self::VERSION)?;
        writer.write_string(&self.name)?;
        writer.write_serial(self.parent)?;
        writer.write_serials(&self.contents)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        reader.read_version(Self::VERSION)?;
        self.name = reader.read_string()?;
        self.parent = reader.read_serial()?;
        self.contents = reader.read_serials()?;
        Ok(())
    }

    fn free_cache(&mut self) {
        self.contents.shrink_to_fit();
    }

    fn update_totals(&mut self, world: &World) {
        self.total_items = 0;
        self.total_weight = 0.0;
        for serial in &self.contents {
            if *serial == self.serial {
                continue;
            }
            let Some(entity) = world.find_item(*serial) else {
                continue;
            };
            let entity = read_entity(&entity);
            if let Some(item) = entity.downcast_ref::<Item>() {
                self.total_items += 1;
                self.total_weight += item.weight * item.amount as f64;
            } else if let Some(container) = entity.downcast_ref::<Container>() {
                self.total_items += 1 + container.total_items;
                self.total_weight += container.total_weight;
            }
        }
    }

    fn on_delete(&mut self, world: &World) {
        for serial in std::mem::take(&mut self.contents) {
            if serial != self.serial {
                world.request_delete(Category::Items, serial);
            }
        }
    }
}

impl Persistable for Container {
    const TYPE_NAME: &'static str = "Shardworld.Items.Container";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            name: String::new(),
            parent: Serial::ZERO,
            contents: Vec::new(),
            total_items: 0,
            total_weight: 0.0,
        }
    }
}

/// A creature or player character
#[derive(Debug, Clone, PartialEq)]
pub struct Mobile {
    pub serial: Serial,
    pub name: String,
    pub hits: i32,
    pub backpack: Serial,
    pub guild: Serial,
}

impl Mobile {
    const VERSION: i32 = 0;

    pub fn new(serial: Serial, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: 100,
            ..Self::from_serial(serial)
        }
    }
}

impl Entity for Mobile {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_version(Self::VERSION)?;
        writer.write_string(&self.name)?;
        writer.write_i32(self.hits)?;
        writer.write_serial(self.backpack)?;
        writer.write_serial(self.guild)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        reader.read_version(Self::VERSION)?;
        self.name = reader.read_string()?;
        self.hits = reader.read_i32()?;
        self.backpack = reader.read_serial()?;
        self.guild = reader.read_serial()?;
        Ok(())
    }

    fn on_delete(&mut self, world: &World) {
        if self.backpack.is_valid() {
            world.request_delete(Category::Items, self.backpack);
        }
    }
}

impl Persistable for Mobile {
    const TYPE_NAME: &'static str = "Shardworld.Mobiles.Mobile";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            name: String::new(),
            hits: 0,
            backpack: Serial::ZERO,
            guild: Serial::ZERO,
        }
    }
}

/// A player guild; members are mobile serials
#[derive(Debug, Clone, PartialEq)]
pub struct Guild {
    pub serial: Serial,
    pub name: String,
    pub abbreviation: String,
    pub leader: Serial,
    pub members: Vec<Serial>,
}

impl Guild {
    const VERSION: i32 = 0;
}

impl Entity for Guild {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_version(Self::VERSION)?;
        writer.write_string(&self.name)?;
        writer.write_string(&self.abbreviation)?;
        writer.write_serial(self.leader)?;
        writer.write_serials(&self.members)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, world: &World) -> CodecResult<()> {
        reader.read_version(Self::VERSION)?;
        self.name = reader.read_string()?;
        self.abbreviation = reader.read_string()?;
        self.leader = reader.read_serial()?;
        self.members = reader.read_serials()?;
        // Members deleted since the last save drop out of the roster
        self.members
            .retain(|member| world.find_mobile(*member).is_some());
        Ok(())
    }
}

impl Persistable for Guild {
    const TYPE_NAME: &'static str = "Shardworld.Guilds.Guild";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            name: String::new(),
            abbreviation: String::new(),
            leader: Serial::ZERO,
            members: Vec::new(),
        }
    }
}

/// A named area of the map, optionally owned by a mobile
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub serial: Serial,
    pub name: String,
    pub owner: Serial,
    pub bounds: (i16, i16, i16, i16),
}

impl Region {
    const VERSION: i32 = 0;
}

impl Entity for Region {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_version(Self::VERSION)?;
        writer.write_string(&self.name)?;
        writer.write_serial(self.owner)?;
        let (x1, y1, x2, y2) = self.bounds;
        writer.write_i16(x1)?;
        writer.write_i16(y1)?;
        writer.write_i16(x2)?;
        writer.write_i16(y2)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        reader.read_version(Self::VERSION)?;
        self.name = reader.read_string()?;
        self.owner = reader.read_serial()?;
        self.bounds = (
            reader.read_i16()?,
            reader.read_i16()?,
            reader.read_i16()?,
            reader.read_i16()?,
        );
        Ok(())
    }
}

impl Persistable for Region {
    const TYPE_NAME: &'static str = "Shardworld.Regions.Region";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            name: String::new(),
            owner: Serial::ZERO,
            bounds: (0, 0, 0, 0),
        }
    }
}
