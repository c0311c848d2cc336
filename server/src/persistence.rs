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

//! World persistence
//!
//! Each typed category (items, mobiles) is stored as three files:
//! - `<Name>.idx` - entity count, then one [`IndexEntry`] per entity
//! - `<Name>.tdb` - type names referenced by ordinal from the index
//! - `<Name>.bin` - concatenated entity bodies
//!
//! Guilds and regions have a single known type and store only `.idx` and
//! `.bin`. All integers are little-endian.
//!
//! Saving walks the live registries and replaces these files. Loading runs
//! four phases: type resolution, shell construction, hydration and post-load
//! fixups, with mobiles first, then items, then guilds and regions.

mod backup;
mod index;
mod layout;
pub(crate) mod load;
mod prompt;
pub(crate) mod save;

pub use backup::{BACKUP_SLOTS, rotate_backups};
pub use index::{IndexEntry, read_index, read_type_table, write_index, write_type_table};
pub use layout::SaveLayout;
pub use load::{LoadError, LoadOutcome, LoadSummary};
pub use prompt::{ConsolePrompt, DeclinePrompt, OperatorPrompt, ScriptedPrompt};
pub use save::{SaveError, SaveOutcome, SaveSummary, SkipReason};

#[cfg(test)]
pub use prompt::MockOperatorPrompt;
