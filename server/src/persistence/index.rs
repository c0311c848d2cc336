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

//! Index and type table encoding

use crate::world::Category;
use shardworld_common::{BinaryReader, BinaryWriter, CodecError, CodecResult, Serial};

/// Location of one entity body inside a blob file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Position in the type table; always 0 for guilds and regions
    pub ordinal: i32,
    pub serial: Serial,
    pub offset: i64,
    pub length: i32,
}

impl IndexEntry {
    /// First byte past this body
    pub fn end(&self) -> i64 {
        self.offset.saturating_add(self.length as i64)
    }
}

/// Write an index: count, then `[ordinal] serial offset length` per entry
///
/// Guild and region indexes omit the ordinal.
pub fn write_index(
    writer: &mut BinaryWriter<'_>,
    category: Category,
    entries: &[IndexEntry],
) -> CodecResult<()> {
    writer.write_i32(entries.len() as i32)?;
    for entry in entries {
        if category.has_type_table() {
            writer.write_i32(entry.ordinal)?;
        }
        writer.write_serial(entry.serial)?;
        writer.write_i64(entry.offset)?;
        writer.write_i32(entry.length)?;
    }
    writer.flush()
}

pub fn read_index(reader: &mut BinaryReader<'_>, category: Category) -> CodecResult<Vec<IndexEntry>> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(CodecError::InvalidLength(count as i64));
    }

    let mut entries = Vec::with_capacity((count as usize).min(1 << 16));
    for _ in 0..count {
        let ordinal = if category.has_type_table() {
            reader.read_i32()?
        } else {
            0
        };
        let serial = reader.read_serial()?;
        let offset = reader.read_i64()?;
        let length = reader.read_i32()?;
        if offset < 0 || length < 0 || offset.checked_add(length as i64).is_none() {
            return Err(CodecError::InvalidData(format!(
                "entry {} has offset {} and length {}",
                serial, offset, length
            )));
        }
        entries.push(IndexEntry {
            ordinal,
            serial,
            offset,
            length,
        });
    }
    Ok(entries)
}

/// Write a type table: count, then each name as a length-prefixed string
pub fn write_type_table(writer: &mut BinaryWriter<'_>, names: &[String]) -> CodecResult<()> {
    writer.write_i32(names.len() as i32)?;
    for name in names {
        writer.write_string(name)?;
    }
    writer.flush()
}

pub fn read_type_table(reader: &mut BinaryReader<'_>) -> CodecResult<Vec<String>> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(CodecError::InvalidLength(count as i64));
    }
    let mut names = Vec::with_capacity((count as usize).min(4096));
    for _ in 0..count {
        names.push(reader.read_string()?);
    }
    Ok(names)
}
