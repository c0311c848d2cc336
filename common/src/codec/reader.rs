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
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Object-safe combination of [`Read`] and [`Seek`]
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Position-tracking little-endian reader
pub struct BinaryReader<'a> {
    inner: &'a mut dyn ReadSeek,
    position: u64,
}

impl<'a> BinaryReader<'a> {
    /// Wrap a stream that is positioned at offset zero.
    pub fn new(inner: &'a mut dyn ReadSeek) -> Self {
        Self { inner, position: 0 }
    }

    /// Current absolute offset
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move to an absolute offset. Seeking to the current offset is free.
    pub fn seek(&mut self, position: u64) -> CodecResult<()> {
        if position != self.position {
            self.position = self.inner.seek(SeekFrom::Start(position))?;
        }
        Ok(())
    }

    /// Unconditionally move to an absolute offset, used after a failed read
    /// left the underlying stream somewhere unknown.
    pub fn resync(&mut self, position: u64) -> CodecResult<()> {
        self.position = self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        let value = self.inner.read_u8()?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> CodecResult<i16> {
        let value = self.inner.read_i16::<LittleEndian>()?;
        self.position += 2;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let value = self.inner.read_i32::<LittleEndian>()?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let value = self.inner.read_u32::<LittleEndian>()?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let value = self.inner.read_i64::<LittleEndian>()?;
        self.position += 8;
        Ok(value)
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        let value = self.inner.read_f64::<LittleEndian>()?;
        self.position += 8;
        Ok(value)
    }

    pub fn read_encoded_int(&mut self) -> CodecResult<i32> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            if shift >= 35 {
                return Err(CodecError::MalformedEncodedInt);
            }
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
    }

    pub fn read_bytes(&mut self, length: usize) -> CodecResult<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.inner.read_exact(&mut bytes)?;
        self.position += length as u64;
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        let length = self.read_encoded_int()?;
        if length < 0 || length as usize > MAX_STRING_LENGTH {
            return Err(CodecError::InvalidLength(length as i64));
        }
        let bytes = self.read_bytes(length as usize)?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn read_serial(&mut self) -> CodecResult<Serial> {
        Ok(Serial::new(self.read_i32()?))
    }

    pub fn read_serials(&mut self) -> CodecResult<Vec<Serial>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(CodecError::InvalidLength(count as i64));
        }
        let mut serials = Vec::with_capacity((count as usize).min(4096));
        for _ in 0..count {
            serials.push(self.read_serial()?);
        }
        Ok(serials)
    }

    /// Read the schema version leading an entity body, rejecting versions
    /// newer than `max`.
    pub fn read_version(&mut self, max: i32) -> CodecResult<i32> {
        let found = self.read_encoded_int()?;
        if found > max || found < 0 {
            return Err(CodecError::UnsupportedVersion { found, max });
        }
        Ok(found)
    }
}
