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

use clap::Parser;
use shardworld_server::autosave::AutoSave;
use shardworld_server::config::{Arguments, Configuration};
use shardworld_server::persistence::{ConsolePrompt, DeclinePrompt, LoadOutcome, OperatorPrompt};
use shardworld_server::world::{TypeRegistry, World};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    // Load environment variables from .env file if specified
    if let Some(ref env_file) = arguments.env_file {
        if std::path::Path::new(env_file).exists() {
            tracing::debug!("Loading environment variables from file: {}", env_file);
            dotenv::from_filename(env_file).ok();
        }
    } else {
        tracing::debug!("Loading environment variables from default file");
        dotenv::dotenv().ok();
    }

    // Load configuration from a file with environment variable substitution
    let config = Configuration::load(&arguments.config_file)?;
    tracing::debug!("Configuration loaded: {:?}", config);
    tracing::info!("Starting Shardworld World Server...");

    let mut types = TypeRegistry::new();
    shardworld_server::content::register(&mut types);
    tracing::info!("Registered {} persistable types", types.len());

    let world = Arc::new(World::new(config.world.options(), types));

    // Loading blocks on disk and possibly on the operator
    let interactive = config.loader.interactive;
    let loader = world.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut prompt: Box<dyn OperatorPrompt> = if interactive {
            Box::new(ConsolePrompt::stdio())
        } else {
            Box::new(DeclinePrompt)
        };
        loader.load(prompt.as_mut())
    })
    .await?;
    match outcome {
        Ok(LoadOutcome::Loaded(summary)) => tracing::info!(
            "World ready with {} mobiles and {} items",
            summary.mobiles,
            summary.items
        ),
        Ok(LoadOutcome::AlreadyLoaded) => {}
        Err(e) => {
            tracing::error!("Failed to load world: {}", e);
            return Err(e.into());
        }
    }

    let auto_save = config
        .world
        .auto_save_interval()
        .map(|interval| AutoSave::new(world.clone(), interval).spawn());

    tracing::info!("World server running, press Ctrl-C to shut down");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    if let Some(task) = auto_save {
        task.abort();
    }

    let saver = world.clone();
    tokio::task::spawn_blocking(move || {
        saver.wait_for_write_completion()?;
        saver.save()?;
        saver.wait_for_write_completion()
    })
    .await??;

    tracing::info!("World saved, goodbye");
    Ok(())
}
