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

//! Shardworld World Server
//!
//! The world server keeps every live entity addressable by [`Serial`] and
//! persists the whole world to a directory of index, type table and blob
//! files.
//!
//! [`Serial`]: shardworld_common::Serial

pub mod autosave;
pub mod config;
pub mod content;
pub mod entity;
pub mod persistence;
pub mod world;
