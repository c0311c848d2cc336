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

//! Entity identity
//!
//! A [`Serial`] is a 32-bit signed identifier. Its range partitions the
//! identifier space into two disjoint domains:
//!
//! | range                      | meaning                  |
//! |----------------------------|--------------------------|
//! | `-1`                       | [`Serial::MINUS_ONE`]    |
//! | `0`                        | [`Serial::ZERO`]         |
//! | `0x00000001..=0x3FFFFFFF`  | item serials             |
//! | `0x40000000..=0x7FFFFFFF`  | mobile serials           |
//!
//! Every other negative value is invalid. A serial says nothing about
//! liveness; the world registry is authoritative for that.

/// Persistent identifier of a world entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Serial(i32);

/// Address space a [`Serial`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerialKind {
    Item,
    Mobile,
    Invalid,
}

impl Serial {
    /// Sentinel for "no entity", used by references that were never set.
    pub const MINUS_ONE: Serial = Serial(-1);
    /// Sentinel for "no entity", used by cleared references.
    pub const ZERO: Serial = Serial(0);

    pub const ITEM_MIN: i32 = 0x0000_0001;
    pub const ITEM_MAX: i32 = 0x3FFF_FFFF;
    pub const MOBILE_MIN: i32 = 0x4000_0000;
    pub const MOBILE_MAX: i32 = i32::MAX;

    /// Wrap a raw value without any range check
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Raw 32-bit value as stored on disk
    pub const fn value(self) -> i32 {
        self.0
    }

    pub const fn is_item(self) -> bool {
        self.0 >= Self::ITEM_MIN && self.0 <= Self::ITEM_MAX
    }

    pub const fn is_mobile(self) -> bool {
        self.0 >= Self::MOBILE_MIN
    }

    /// True for any serial that may denote a live entity
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }

    pub const fn kind(self) -> SerialKind {
        if self.is_item() {
            SerialKind::Item
        } else if self.is_mobile() {
            SerialKind::Mobile
        } else {
            SerialKind::Invalid
        }
    }
}

impl SerialKind {
    /// Inclusive range of raw values belonging to this domain
    pub const fn range(self) -> Option<(i32, i32)> {
        match self {
            SerialKind::Item => Some((Serial::ITEM_MIN, Serial::ITEM_MAX)),
            SerialKind::Mobile => Some((Serial::MOBILE_MIN, Serial::MOBILE_MAX)),
            SerialKind::Invalid => None,
        }
    }

    /// First serial of the domain
    pub const fn first(self) -> Option<Serial> {
        match self.range() {
            Some((min, _)) => Some(Serial(min)),
            None => None,
        }
    }

    /// The serial following `serial` inside this domain, wrapping back to
    /// [`SerialKind::first`] past the end of the range. A serial from a
    /// different domain restarts at the beginning.
    pub fn next_after(self, serial: Serial) -> Option<Serial> {
        let (min, max) = self.range()?;
        if serial.0 < min || serial.0 >= max {
            Some(Serial(min))
        } else {
            Some(Serial(serial.0 + 1))
        }
    }
}

impl From<i32> for Serial {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<Serial> for i32 {
    fn from(serial: Serial) -> Self {
        serial.0
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl std::fmt::LowerHex for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}
