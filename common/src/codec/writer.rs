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

use super::{CodecError, CodecResult, MAX_STRING_LENGTH};
use crate::Serial;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// Position-tracking little-endian writer
pub struct BinaryWriter<'a> {
    inner: &'a mut dyn Write,
    position: u64,
}

impl<'a> BinaryWriter<'a> {
    /// Wrap a stream; positions are counted from the wrap point.
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_u8(&mut self, value: u8) -> CodecResult<()> {
        self.inner.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> CodecResult<()> {
        self.write_u8(value as u8)
    }

    pub fn write_i16(&mut self, value: i16) -> CodecResult<()> {
        self.inner.write_i16::<LittleEndian>(value)?;
        self.position += 2;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> CodecResult<()> {
        self.inner.write_i32::<LittleEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> CodecResult<()> {
        self.inner.write_u32::<LittleEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> CodecResult<()> {
        self.inner.write_i64::<LittleEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> CodecResult<()> {
        self.inner.write_f64::<LittleEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    /// Write an integer using 1 to 5 bytes, seven bits per byte.
    pub fn write_encoded_int(&mut self, value: i32) -> CodecResult<()> {
        let mut remaining = value as u32;
        while remaining >= 0x80 {
            self.write_u8((remaining as u8) | 0x80)?;
            remaining >>= 7;
        }
        self.write_u8(remaining as u8)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write a UTF-8 string prefixed by its 7-bit encoded byte length.
    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        if value.len() > MAX_STRING_LENGTH {
            return Err(CodecError::InvalidLength(value.len() as i64));
        }
        self.write_encoded_int(value.len() as i32)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_serial(&mut self, serial: Serial) -> CodecResult<()> {
        self.write_i32(serial.value())
    }

    /// Write a count followed by each serial
    pub fn write_serials(&mut self, serials: &[Serial]) -> CodecResult<()> {
        self.write_i32(serials.len() as i32)?;
        for serial in serials {
            self.write_serial(*serial)?;
        }
        Ok(())
    }

    /// Write the schema version that leads an entity body.
    pub fn write_version(&mut self, version: i32) -> CodecResult<()> {
        self.write_encoded_int(version)
    }

    pub fn flush(&mut self) -> CodecResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}
