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

use crate::world::WorldOptions;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_env_field::EnvField;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to configuration file",
        default_value = "server/config.yaml"
    )]
    pub config_file: String,

    #[arg(
        short = 'e',
        long = "env",
        help = "Path to environment file",
        default_value = "server/.env"
    )]
    pub env_file: Option<String>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config_file: "config.yaml".to_string(),
            env_file: Some(".env".to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Configuration, ConfigError> {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Open {
            path: path.to_string(),
            source,
        })?;
        serde_yaml::from_reader(file).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub save_directory: EnvField<SaveDirectory>,
    pub backup_directory: EnvField<BackupDirectory>,
    /// Rotate the previous save into the backup directory before saving
    pub backups: bool,
    pub multiprocessor: bool,
    pub background_write: bool,
    /// Seconds between automatic saves; 0 disables them
    pub auto_save_interval: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            save_directory: Default::default(),
            backup_directory: Default::default(),
            backups: true,
            multiprocessor: true,
            background_write: false,
            auto_save_interval: 3600,
        }
    }
}

impl WorldConfig {
    pub fn options(&self) -> WorldOptions {
        WorldOptions {
            save_directory: self.save_directory.to_path_buf(),
            backup_directory: self
                .backups
                .then(|| self.backup_directory.to_path_buf()),
            multiprocessor: self.multiprocessor,
            background_write: self.background_write,
        }
    }

    pub fn auto_save_interval(&self) -> Option<Duration> {
        (self.auto_save_interval > 0).then(|| Duration::from_secs(self.auto_save_interval))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Ask on the console when a load needs a decision; otherwise decline
    pub interactive: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { interactive: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveDirectory(PathBuf);

impl SaveDirectory {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.0.clone()
    }
}

impl FromStr for SaveDirectory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        tracing::debug!("Parsing save directory from string: {}", s);
        Ok(Self(PathBuf::from(s)))
    }
}

impl Default for SaveDirectory {
    fn default() -> Self {
        Self(PathBuf::from("Saves"))
    }
}

impl std::fmt::Display for SaveDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupDirectory(PathBuf);

impl BackupDirectory {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.0.clone()
    }
}

impl FromStr for BackupDirectory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl Default for BackupDirectory {
    fn default() -> Self {
        Self(PathBuf::from("Backups/Automatic"))
    }
}

impl std::fmt::Display for BackupDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
