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

//! Binary codec used by every persisted entity
//!
//! All fixed-width integers are little-endian. Strings are UTF-8 prefixed by
//! their byte length as a 7-bit encoded integer. Both the writer and the
//! reader track their own stream position so the save pipeline can record
//! blob offsets and the load pipeline can verify how many bytes an entity
//! consumed.
//!
//! Entity bodies conventionally start with a version number written through
//! [`BinaryWriter::write_version`]; readers branch on it to accept data
//! written by older schemas.

mod reader;
mod writer;

pub use reader::{BinaryReader, ReadSeek};
pub use writer::BinaryWriter;

use thiserror::Error;

/// Longest string accepted by [`BinaryReader::read_string`]
pub const MAX_STRING_LENGTH: usize = 16 * 1024 * 1024;

/// Errors raised while encoding or decoding binary data
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A string was not valid UTF-8.
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A length prefix was negative or exceeded [`MAX_STRING_LENGTH`].
    #[error("Invalid length prefix: {0}")]
    InvalidLength(i64),

    /// A 7-bit encoded integer ran past five bytes.
    #[error("Malformed 7-bit encoded integer")]
    MalformedEncodedInt,

    /// A body was written by a newer schema than the reader understands.
    #[error("Unsupported version {found} (highest known is {max})")]
    UnsupportedVersion { found: i32, max: i32 },

    /// Entity-specific validation failure.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
