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

//! Integration tests for world save and load

use shardworld_common::{BinaryReader, BinaryWriter, CodecError, CodecResult, Serial, SerialKind};
use shardworld_server::content::{self, Container, Guild, Item, Mobile, Region};
use shardworld_server::entity::{Entity, Persistable, new_entity, read_entity};
use shardworld_server::persistence::{
    IndexEntry, LoadError, LoadOutcome, LoadSummary, SaveError, SaveOutcome, ScriptedPrompt,
    SkipReason, read_index, read_type_table, write_index, write_type_table,
};
use shardworld_server::world::{Category, TypeRegistry, World, WorldOptions};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Barrier};

fn content_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    content::register(&mut types);
    types
}

fn options(directory: &Path) -> WorldOptions {
    WorldOptions {
        save_directory: directory.join("Saves"),
        backup_directory: None,
        multiprocessor: true,
        background_write: false,
    }
}

fn fetch<T: Entity + Clone>(world: &World, category: Category, serial: i32) -> Option<T> {
    let entity = world.find_entity(category, Serial::new(serial))?;
    let entity = read_entity(&entity);
    entity.downcast_ref::<T>().cloned()
}

fn loaded(world: &World, prompt: &mut ScriptedPrompt) -> LoadSummary {
    match world.load(prompt) {
        Ok(LoadOutcome::Loaded(summary)) => summary,
        other => panic!("expected a completed load, got {:?}", other),
    }
}

fn populated_world(directory: &Path) -> World {
    let world = World::new(options(directory), content_types());

    let mut backpack = Container::new(Serial::new(0x10), "Backpack");
    backpack.contents = vec![Serial::new(0x11), Serial::new(0x12)];

    let mut gold = Item::new(Serial::new(0x11), "Gold");
    gold.amount = 250;
    gold.weight = 0.02;
    gold.parent = Serial::new(0x10);

    let mut dagger = Item::new(Serial::new(0x12), "Dagger");
    dagger.hue = 0x0455;
    dagger.parent = Serial::new(0x10);

    let mut mobile = Mobile::new(Serial::new(0x4000_0001), "Aldric");
    mobile.backpack = Serial::new(0x10);
    mobile.guild = Serial::new(1);

    world.add_entity(Category::Items, new_entity(backpack));
    world.add_entity(Category::Items, new_entity(gold));
    world.add_entity(Category::Items, new_entity(dagger));
    world.add_entity(Category::Mobiles, new_entity(mobile));
    world.add_entity(
        Category::Guilds,
        new_entity(Guild {
            serial: Serial::new(1),
            name: "Order of the Silver Serpent".to_string(),
            abbreviation: "OSS".to_string(),
            leader: Serial::new(0x4000_0001),
            members: vec![Serial::new(0x4000_0001)],
        }),
    );
    world.add_entity(
        Category::Regions,
        new_entity(Region {
            serial: Serial::new(1),
            name: "Britain".to_string(),
            owner: Serial::ZERO,
            bounds: (1416, 1498, 1740, 1777),
        }),
    );
    world
}

#[test]
fn test_empty_world_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = World::new(options(temp_dir.path()), content_types());
    assert!(matches!(world.save().unwrap(), SaveOutcome::Completed(_)));

    let saves = temp_dir.path().join("Saves");
    assert_eq!(std::fs::read(saves.join("Items/Items.idx")).unwrap(), vec![0, 0, 0, 0]);
    assert_eq!(std::fs::read(saves.join("Items/Items.tdb")).unwrap(), vec![0, 0, 0, 0]);
    assert_eq!(std::fs::read(saves.join("Items/Items.bin")).unwrap().len(), 0);
    assert_eq!(std::fs::read(saves.join("Mobiles/Mobiles.idx")).unwrap(), vec![0, 0, 0, 0]);
    assert_eq!(std::fs::read(saves.join("Guilds/Guilds.idx")).unwrap(), vec![0, 0, 0, 0]);
    assert!(!saves.join("Guilds/Guilds.tdb").exists());
    assert!(saves.join("Regions/Regions.bin").exists());

    let reloaded = World::new(options(temp_dir.path()), content_types());
    let mut prompt = ScriptedPrompt::default();
    let summary = loaded(&reloaded, &mut prompt);
    assert_eq!(summary.items, 0);
    assert_eq!(summary.mobiles, 0);
    assert!(prompt.asked().is_empty());
    assert!(reloaded.registry(Category::Items).is_empty());
}

#[test]
fn test_missing_save_directory_loads_empty_world() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = World::new(options(temp_dir.path()), content_types());

    let summary = loaded(&world, &mut ScriptedPrompt::default());
    assert_eq!(summary.items + summary.mobiles + summary.guilds + summary.regions, 0);
    assert!(world.is_loaded());
}

#[test]
fn test_mobile_and_item_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = World::new(options(temp_dir.path()), content_types());

    let mut item = Item::new(Serial::new(0x1), "Ingot");
    item.amount = 0x1234_5678;
    world.add_entity(Category::Items, new_entity(item));
    world.add_entity(
        Category::Mobiles,
        new_entity(Mobile::new(Serial::new(0x4000_0001), "Smith")),
    );
    world.save().unwrap();

    let reloaded = World::new(options(temp_dir.path()), content_types());
    loaded(&reloaded, &mut ScriptedPrompt::default());

    let item: Item = fetch(&reloaded, Category::Items, 0x1).unwrap();
    assert_eq!(item.amount, 0x1234_5678);
    assert_eq!(item.name, "Ingot");
    let mobile: Mobile = fetch(&reloaded, Category::Mobiles, 0x4000_0001).unwrap();
    assert_eq!(mobile.name, "Smith");
    assert!(reloaded.find_item(Serial::new(0x4000_0001)).is_none());
}

#[test]
fn test_round_trip_preserves_every_category() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = populated_world(temp_dir.path());
    world.save().unwrap();

    let reloaded = World::new(options(temp_dir.path()), content_types());
    let summary = loaded(&reloaded, &mut ScriptedPrompt::default());
    assert_eq!(
        (summary.items, summary.mobiles, summary.guilds, summary.regions),
        (3, 1, 1, 1)
    );

    for category in Category::LOAD_ORDER {
        assert_eq!(
            world.registry(category).serials(),
            reloaded.registry(category).serials()
        );
        for (before, after) in world
            .registry(category)
            .snapshot()
            .iter()
            .zip(reloaded.registry(category).snapshot().iter())
        {
            assert_eq!(read_entity(before).type_name(), read_entity(after).type_name());
        }
    }

    let gold: Item = fetch(&world, Category::Items, 0x11).unwrap();
    assert_eq!(fetch::<Item>(&reloaded, Category::Items, 0x11).unwrap(), gold);
    let dagger: Item = fetch(&world, Category::Items, 0x12).unwrap();
    assert_eq!(fetch::<Item>(&reloaded, Category::Items, 0x12).unwrap(), dagger);
    let mobile: Mobile = fetch(&world, Category::Mobiles, 0x4000_0001).unwrap();
    assert_eq!(fetch::<Mobile>(&reloaded, Category::Mobiles, 0x4000_0001).unwrap(), mobile);
    let guild: Guild = fetch(&world, Category::Guilds, 1).unwrap();
    assert_eq!(fetch::<Guild>(&reloaded, Category::Guilds, 1).unwrap(), guild);
    let region: Region = fetch(&world, Category::Regions, 1).unwrap();
    assert_eq!(fetch::<Region>(&reloaded, Category::Regions, 1).unwrap(), region);

    // Totals are not saved; the post-load pass recomputes them
    let backpack: Container = fetch(&reloaded, Category::Items, 0x10).unwrap();
    assert_eq!(backpack.contents, vec![Serial::new(0x11), Serial::new(0x12)]);
    assert_eq!(backpack.total_items, 2);
    assert!((backpack.total_weight - (250.0 * 0.02 + 1.0)).abs() < 1e-9);
}

#[test]
fn test_index_offsets_resolve_inside_blob() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = populated_world(temp_dir.path());
    world.save().unwrap();

    for category in Category::LOAD_ORDER {
        let layout = world.layout();
        let mut index = Cursor::new(std::fs::read(layout.index(category)).unwrap());
        let entries = read_index(&mut BinaryReader::new(&mut index), category).unwrap();
        let blob_length = std::fs::metadata(layout.blob(category)).unwrap().len() as i64;

        let mut expected_offset = 0;
        for entry in &entries {
            assert_eq!(entry.offset, expected_offset);
            assert!(entry.end() <= blob_length);
            expected_offset = entry.end();
        }
        assert_eq!(expected_offset, blob_length);

        let serials: Vec<Serial> = entries.iter().map(|entry| entry.serial).collect();
        assert_eq!(serials, world.registry(category).serials());
    }
}

#[test]
fn test_save_output_is_deterministic() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();

    let parallel = populated_world(first_dir.path());
    parallel.save().unwrap();
    let sequential = copy_world(
        WorldOptions {
            multiprocessor: false,
            ..options(second_dir.path())
        },
        &parallel,
    );
    sequential.save().unwrap();

    for category in Category::LOAD_ORDER {
        assert_eq!(
            std::fs::read(parallel.layout().index(category)).unwrap(),
            std::fs::read(sequential.layout().index(category)).unwrap()
        );
        assert_eq!(
            std::fs::read(parallel.layout().blob(category)).unwrap(),
            std::fs::read(sequential.layout().blob(category)).unwrap()
        );
    }
}

/// A new world sharing every live handle of `source`
fn copy_world(options: WorldOptions, source: &World) -> World {
    let world = World::new(options, content_types());
    for category in Category::LOAD_ORDER {
        for entity in source.registry(category).snapshot() {
            world.add_entity(category, entity);
        }
    }
    world
}

#[test]
fn test_load_is_one_shot() {
    let temp_dir = tempfile::tempdir().unwrap();
    populated_world(temp_dir.path()).save().unwrap();

    let world = World::new(options(temp_dir.path()), content_types());
    loaded(&world, &mut ScriptedPrompt::default());
    let before = world.registry(Category::Items).serials();

    // A second load must not read anything
    std::fs::remove_dir_all(temp_dir.path().join("Saves")).unwrap();
    let outcome = world.load(&mut ScriptedPrompt::default()).unwrap();
    assert_eq!(outcome, LoadOutcome::AlreadyLoaded);
    assert_eq!(world.registry(Category::Items).serials(), before);
}

#[test]
fn test_serial_allocation_continues_after_load() {
    let temp_dir = tempfile::tempdir().unwrap();
    populated_world(temp_dir.path()).save().unwrap();

    let world = World::new(options(temp_dir.path()), content_types());
    loaded(&world, &mut ScriptedPrompt::default());

    assert_eq!(world.new_serial(SerialKind::Item), Some(Serial::new(0x13)));
    assert_eq!(
        world.new_serial(SerialKind::Mobile),
        Some(Serial::new(0x4000_0002))
    );
    let created = world
        .create(SerialKind::Item, |serial| Item::new(serial, "Torch"))
        .unwrap();
    assert_eq!(read_entity(&created).serial(), Serial::new(0x14));
}

#[test]
fn test_corrupt_type_table_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = World::new(options(temp_dir.path()), content_types());
    world.add_entity(Category::Items, new_entity(Item::new(Serial::new(1), "Lantern")));
    let mut chest = Container::new(Serial::new(2), "Chest");
    chest.contents = vec![Serial::new(3)];
    world.add_entity(Category::Items, new_entity(chest));
    let mut coin = Item::new(Serial::new(3), "Coin");
    coin.parent = Serial::new(2);
    world.add_entity(Category::Items, new_entity(coin));
    world.save().unwrap();

    // Rename the container type to something no longer registered
    let type_path = world.layout().type_table(Category::Items).unwrap();
    let mut cursor = Cursor::new(std::fs::read(&type_path).unwrap());
    let names: Vec<String> = read_type_table(&mut BinaryReader::new(&mut cursor))
        .unwrap()
        .into_iter()
        .map(|name| {
            if name == Container::TYPE_NAME {
                "Shardworld.Items.LegacyChest".to_string()
            } else {
                name
            }
        })
        .collect();
    let mut bytes = Vec::new();
    write_type_table(&mut BinaryWriter::new(&mut bytes), &names).unwrap();
    std::fs::write(&type_path, bytes).unwrap();

    let first = World::new(options(temp_dir.path()), content_types());
    let mut prompt = ScriptedPrompt::new([true]);
    let summary = loaded(&first, &mut prompt);
    assert_eq!(prompt.asked().len(), 1);
    assert!(prompt.asked()[0].contains("Shardworld.Items.LegacyChest"));
    assert_eq!(summary.skipped, 1);
    assert!(first.find_item(Serial::new(1)).is_some());
    assert!(first.find_item(Serial::new(2)).is_none());
    // The coin's container is gone, so it deleted itself once loading finished
    assert!(first.find_item(Serial::new(3)).is_none());
    assert_eq!(summary.deleted, 1);

    let second = World::new(options(temp_dir.path()), content_types());
    let mut prompt = ScriptedPrompt::default();
    loaded(&second, &mut prompt);
    assert!(prompt.asked().is_empty());
    assert_eq!(second.registry(Category::Items).serials(), vec![Serial::new(1)]);
}

/// Body: a count followed by that many i64 entries
#[derive(Debug, Clone)]
struct Ledger {
    serial: Serial,
    entries: Vec<i64>,
}

impl Entity for Ledger {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_i32(self.entries.len() as i32)?;
        for entry in &self.entries {
            writer.write_i64(*entry)?;
        }
        Ok(())
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        let count = reader.read_i32()?;
        self.entries = (0..count)
            .map(|_| reader.read_i64())
            .collect::<CodecResult<_>>()?;
        Ok(())
    }
}

impl Persistable for Ledger {
    const TYPE_NAME: &'static str = "Tests.Ledger";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            entries: Vec::new(),
        }
    }
}

/// Reads a ledger as if entries were i32, consuming too few bytes
struct DriftedLedger {
    serial: Serial,
}

impl Entity for DriftedLedger {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Ledger::TYPE_NAME
    }

    fn serialize(&self, _writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        Ok(())
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        let count = reader.read_i32()?;
        for _ in 0..count {
            reader.read_i32()?;
        }
        Ok(())
    }
}

fn ledger_world(directory: &Path) -> World {
    let mut types = content_types();
    types.register::<Ledger>();
    let world = World::new(options(directory), types);
    world.add_entity(Category::Items, new_entity(Item::new(Serial::new(0x100), "Quill")));
    for (serial, entries) in [(1, vec![]), (2, vec![7]), (3, vec![1, 2])] {
        world.add_entity(
            Category::Items,
            new_entity(Ledger {
                serial: Serial::new(serial),
                entries,
            }),
        );
    }
    world
}

fn drifted_types() -> TypeRegistry {
    let mut types = content_types();
    types.register_with(Ledger::TYPE_NAME, |serial| Ok(new_entity(DriftedLedger { serial })));
    types
}

fn ledger_types() -> TypeRegistry {
    let mut types = content_types();
    types.register::<Ledger>();
    types
}

#[test]
fn test_position_mismatch_deletes_object_and_requires_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    ledger_world(temp_dir.path()).save().unwrap();

    let world = World::new(options(temp_dir.path()), drifted_types());
    let mut prompt = ScriptedPrompt::new([true]);
    let error = world.load(&mut prompt).unwrap_err();

    assert!(matches!(
        error,
        LoadError::RestartRequired {
            category: Category::Items,
            removed: 1
        }
    ));
    assert_eq!(prompt.asked().len(), 1);
    assert!(prompt.asked()[0].contains("0x00000002"));
    assert!(!world.is_loaded());
    assert!(world.registry(Category::Items).is_empty());
    assert!(world.registry(Category::Mobiles).is_empty());

    let restarted = World::new(options(temp_dir.path()), ledger_types());
    loaded(&restarted, &mut ScriptedPrompt::default());
    assert_eq!(
        restarted.registry(Category::Items).serials(),
        vec![Serial::new(1), Serial::new(3), Serial::new(0x100)]
    );
    let ledger: Ledger = fetch(&restarted, Category::Items, 3).unwrap();
    assert_eq!(ledger.entries, vec![1, 2]);
}

#[test]
fn test_position_mismatch_deletes_whole_type() {
    let temp_dir = tempfile::tempdir().unwrap();
    ledger_world(temp_dir.path()).save().unwrap();

    let world = World::new(options(temp_dir.path()), drifted_types());
    let mut prompt = ScriptedPrompt::new([false, true]);
    let error = world.load(&mut prompt).unwrap_err();
    assert!(matches!(error, LoadError::RestartRequired { removed: 3, .. }));
    assert_eq!(prompt.asked().len(), 2);

    let restarted = World::new(options(temp_dir.path()), drifted_types());
    let summary = loaded(&restarted, &mut ScriptedPrompt::default());
    assert_eq!(summary.items, 1);
    assert!(restarted.find_item(Serial::new(0x100)).is_some());
}

/// Fails to deserialize when its body says so
struct Fragile {
    serial: Serial,
    broken: bool,
}

impl Entity for Fragile {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_bool(self.broken)?;
        writer.write_i32(0)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        self.broken = reader.read_bool()?;
        if self.broken {
            return Err(CodecError::InvalidData("body marked as broken".to_string()));
        }
        reader.read_i32()?;
        Ok(())
    }
}

impl Persistable for Fragile {
    const TYPE_NAME: &'static str = "Tests.Fragile";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            broken: false,
        }
    }
}

#[test]
fn test_deserialize_errors_are_isolated_then_escalated() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut types = content_types();
    types.register::<Fragile>();
    let world = World::new(options(temp_dir.path()), types.clone());
    for (serial, broken) in [(1, false), (2, true), (3, false), (4, true)] {
        world.add_entity(
            Category::Items,
            new_entity(Fragile {
                serial: Serial::new(serial),
                broken,
            }),
        );
    }
    world.save().unwrap();

    // Both broken bodies are reported; declining everything aborts
    let aborted = World::new(options(temp_dir.path()), types.clone());
    let mut prompt = ScriptedPrompt::new([false, false]);
    let error = aborted.load(&mut prompt).unwrap_err();
    assert!(matches!(error, LoadError::Aborted { category: Category::Items }));
    assert!(aborted.registry(Category::Items).is_empty());

    // Deleting each broken object lets the next start succeed
    let recovering = World::new(options(temp_dir.path()), types.clone());
    let mut prompt = ScriptedPrompt::new([true, true]);
    let error = recovering.load(&mut prompt).unwrap_err();
    assert!(matches!(error, LoadError::RestartRequired { removed: 2, .. }));
    assert_eq!(prompt.asked().len(), 2);

    let restarted = World::new(options(temp_dir.path()), types);
    loaded(&restarted, &mut ScriptedPrompt::default());
    assert_eq!(
        restarted.registry(Category::Items).serials(),
        vec![Serial::new(1), Serial::new(3)]
    );
}

/// Records whether its target was resolvable while it was hydrated
#[derive(Debug, Clone)]
struct Watcher {
    serial: Serial,
    target: Serial,
    saw_target: bool,
}

impl Entity for Watcher {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        writer.write_serial(self.target)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, world: &World) -> CodecResult<()> {
        self.target = reader.read_serial()?;
        self.saw_target = world.find_item(self.target).is_some();
        Ok(())
    }
}

impl Persistable for Watcher {
    const TYPE_NAME: &'static str = "Tests.Watcher";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            target: Serial::ZERO,
            saw_target: false,
        }
    }
}

#[test]
fn test_deletes_requested_during_load_are_deferred() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut types = content_types();
    types.register::<Watcher>();

    let world = World::new(options(temp_dir.path()), types.clone());
    let mut orphan = Item::new(Serial::new(1), "Orphaned Key");
    orphan.parent = Serial::new(0x3FFF_0000);
    world.add_entity(Category::Items, new_entity(orphan));
    world.add_entity(
        Category::Items,
        new_entity(Watcher {
            serial: Serial::new(2),
            target: Serial::new(1),
            saw_target: false,
        }),
    );
    world.save().unwrap();

    let reloaded = World::new(options(temp_dir.path()), types);
    let summary = loaded(&reloaded, &mut ScriptedPrompt::default());

    assert_eq!(summary.deleted, 1);
    assert!(reloaded.find_item(Serial::new(1)).is_none());
    assert_eq!(reloaded.pending_deletes(), 0);
    let watcher: Watcher = fetch(&reloaded, Category::Items, 2).unwrap();
    assert!(watcher.saw_target);
}

#[test]
fn test_guilds_require_a_registered_type() {
    let temp_dir = tempfile::tempdir().unwrap();
    populated_world(temp_dir.path()).save().unwrap();

    let mut types = TypeRegistry::new();
    types.register::<Item>().register::<Container>().register::<Mobile>();
    let world = World::new(options(temp_dir.path()), types);

    let error = world.load(&mut ScriptedPrompt::default()).unwrap_err();
    assert!(matches!(error, LoadError::NoFactory { category: Category::Guilds }));
}

#[test]
fn test_guild_drops_members_deleted_since_save() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = populated_world(temp_dir.path());
    world.save().unwrap();

    // Remove the mobile from the save, keeping the guild that lists it
    let mobiles = world.layout().index(Category::Mobiles);
    std::fs::write(&mobiles, [0, 0, 0, 0]).unwrap();

    let reloaded = World::new(options(temp_dir.path()), content_types());
    loaded(&reloaded, &mut ScriptedPrompt::default());
    let guild: Guild = fetch(&reloaded, Category::Guilds, 1).unwrap();
    assert!(guild.members.is_empty());
}

#[test]
fn test_save_is_skipped_while_saves_are_disabled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = populated_world(temp_dir.path());
    world.set_saves_disabled(true);

    assert_eq!(
        world.save().unwrap(),
        SaveOutcome::Skipped(SkipReason::SavesDisabled)
    );
    assert!(!temp_dir.path().join("Saves").exists());

    world.set_saves_disabled(false);
    assert!(matches!(world.save().unwrap(), SaveOutcome::Completed(_)));
}

#[test]
fn test_background_write() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = copy_world(
        WorldOptions {
            background_write: true,
            ..options(temp_dir.path())
        },
        &populated_world(temp_dir.path()),
    );

    let SaveOutcome::Completed(summary) = world.save().unwrap() else {
        panic!("expected the save to run");
    };
    assert!(summary.background);
    assert_eq!(summary.total(), 6);
    world.wait_for_write_completion().unwrap();

    let reloaded = World::new(options(temp_dir.path()), content_types());
    let summary = loaded(&reloaded, &mut ScriptedPrompt::default());
    assert_eq!(summary.items, 3);
}

#[test]
fn test_each_save_rotates_backups() {
    let temp_dir = tempfile::tempdir().unwrap();
    let backups = temp_dir.path().join("Backups");
    let world = copy_world(
        WorldOptions {
            backup_directory: Some(backups.clone()),
            ..options(temp_dir.path())
        },
        &populated_world(temp_dir.path()),
    );

    world.save().unwrap();
    assert!(!backups.exists() || std::fs::read_dir(&backups).unwrap().count() == 0);

    world.save().unwrap();
    let slots: Vec<_> = std::fs::read_dir(&backups)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(slots.len(), 1);
    assert!(
        slots[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Most Recent (")
    );
    assert!(slots[0].join("Items").join("Items.idx").exists());
    assert!(world.layout().index(Category::Items).exists());
}

#[test]
fn test_type_ordinals_are_stable_within_a_session() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = World::new(options(temp_dir.path()), content_types());
    world.add_entity(Category::Items, new_entity(Container::new(Serial::new(1), "Crate")));
    world.save().unwrap();

    world.add_entity(Category::Items, new_entity(Item::new(Serial::new(2), "Nail")));
    world.save().unwrap();

    let type_path = world.layout().type_table(Category::Items).unwrap();
    let mut cursor = Cursor::new(std::fs::read(type_path).unwrap());
    let names = read_type_table(&mut BinaryReader::new(&mut cursor)).unwrap();
    assert_eq!(names, vec![Container::TYPE_NAME, Item::TYPE_NAME]);

    let mut index = Cursor::new(std::fs::read(world.layout().index(Category::Items)).unwrap());
    let entries = read_index(&mut BinaryReader::new(&mut index), Category::Items).unwrap();
    assert_eq!(entries[0].ordinal, 0);
    assert_eq!(entries[1].ordinal, 1);
}

/// Refuses to serialize
struct Cursed {
    serial: Serial,
}

impl Entity for Cursed {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        "Tests.Cursed"
    }

    fn serialize(&self, _writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        Err(CodecError::InvalidData("cursed body".to_string()))
    }

    fn deserialize(&mut self, _reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        Ok(())
    }
}

#[test]
fn test_failed_save_keeps_previous_save() {
    let temp_dir = tempfile::tempdir().unwrap();
    let backups = temp_dir.path().join("Backups");
    let world = World::new(
        WorldOptions {
            backup_directory: Some(backups.clone()),
            ..options(temp_dir.path())
        },
        content_types(),
    );
    world.add_entity(Category::Items, new_entity(Item::new(Serial::new(1), "Anvil")));
    world.save().unwrap();

    world.add_entity(
        Category::Items,
        new_entity(Cursed {
            serial: Serial::new(2),
        }),
    );
    let error = world.save().unwrap_err();
    assert!(matches!(
        error,
        SaveError::Serialize {
            category: Category::Items,
            ..
        }
    ));
    assert!(world.layout().index(Category::Items).exists());
    assert!(!backups.exists() || std::fs::read_dir(&backups).unwrap().count() == 0);
    assert!(!world.is_saving());

    let reloaded = World::new(options(temp_dir.path()), content_types());
    let summary = loaded(&reloaded, &mut ScriptedPrompt::default());
    assert_eq!(summary.items, 1);
    assert!(reloaded.find_item(Serial::new(1)).is_some());
}

#[test]
fn test_index_offset_overflow_is_corrupt() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = World::new(options(temp_dir.path()), content_types());
    world.add_entity(Category::Items, new_entity(Item::new(Serial::new(1), "Anvil")));
    world.save().unwrap();

    let mut bytes = Vec::new();
    write_index(
        &mut BinaryWriter::new(&mut bytes),
        Category::Items,
        &[IndexEntry {
            ordinal: 0,
            serial: Serial::new(1),
            offset: i64::MAX,
            length: 4,
        }],
    )
    .unwrap();
    std::fs::write(world.layout().index(Category::Items), bytes).unwrap();

    let reloaded = World::new(options(temp_dir.path()), content_types());
    let error = reloaded.load(&mut ScriptedPrompt::default()).unwrap_err();
    assert!(matches!(error, LoadError::CorruptIndex { category: Category::Items, .. }));
    assert!(!reloaded.is_loaded());
}

/// Holds a save inside `serialize` until released
struct Gate {
    serial: Serial,
    barrier: Arc<Barrier>,
}

impl Entity for Gate {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        "Tests.Gate"
    }

    fn serialize(&self, writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        // Entered, then released
        self.barrier.wait();
        self.barrier.wait();
        writer.write_i32(0)
    }

    fn deserialize(&mut self, reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        reader.read_i32()?;
        Ok(())
    }
}

#[test]
fn test_save_skipped_while_another_save_runs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let world = Arc::new(World::new(options(temp_dir.path()), content_types()));
    let barrier = Arc::new(Barrier::new(2));
    world.add_entity(
        Category::Items,
        new_entity(Gate {
            serial: Serial::new(1),
            barrier: barrier.clone(),
        }),
    );

    let saving = world.clone();
    let first = std::thread::spawn(move || saving.save());

    barrier.wait();
    assert!(world.is_saving());
    assert_eq!(
        world.save().unwrap(),
        SaveOutcome::Skipped(SkipReason::AlreadySaving)
    );
    barrier.wait();

    let outcome = first.join().unwrap().unwrap();
    assert!(matches!(outcome, SaveOutcome::Completed(summary) if summary.items == 1));
    assert!(!world.is_saving());
}

/// Counts the post-load hooks run on it
#[derive(Debug, Clone)]
struct Beacon {
    serial: Serial,
    totals_updated: usize,
    properties_cleared: usize,
}

impl Entity for Beacon {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn serialize(&self, _writer: &mut BinaryWriter<'_>) -> CodecResult<()> {
        Ok(())
    }

    fn deserialize(&mut self, _reader: &mut BinaryReader<'_>, _world: &World) -> CodecResult<()> {
        Ok(())
    }

    fn update_totals(&mut self, _world: &World) {
        self.totals_updated += 1;
    }

    fn clear_properties(&mut self) {
        self.properties_cleared += 1;
    }
}

impl Persistable for Beacon {
    const TYPE_NAME: &'static str = "Tests.Beacon";

    fn from_serial(serial: Serial) -> Self {
        Self {
            serial,
            totals_updated: 0,
            properties_cleared: 0,
        }
    }
}

#[test]
fn test_post_load_hooks_run_once_per_item_and_mobile() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut types = content_types();
    types.register::<Beacon>();

    let world = World::new(options(temp_dir.path()), types.clone());
    world.add_entity(Category::Items, new_entity(Beacon::from_serial(Serial::new(1))));
    world.add_entity(
        Category::Mobiles,
        new_entity(Beacon::from_serial(Serial::new(0x4000_0001))),
    );
    world.save().unwrap();

    let reloaded = World::new(options(temp_dir.path()), types);
    loaded(&reloaded, &mut ScriptedPrompt::default());

    let item: Beacon = fetch(&reloaded, Category::Items, 1).unwrap();
    assert_eq!((item.totals_updated, item.properties_cleared), (1, 1));
    let mobile: Beacon = fetch(&reloaded, Category::Mobiles, 0x4000_0001).unwrap();
    assert_eq!((mobile.totals_updated, mobile.properties_cleared), (1, 1));

    // A second load call is a no-op and runs no hooks
    reloaded.load(&mut ScriptedPrompt::default()).unwrap();
    let item: Beacon = fetch(&reloaded, Category::Items, 1).unwrap();
    assert_eq!(item.properties_cleared, 1);
}
