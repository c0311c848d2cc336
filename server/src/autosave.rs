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

//! Periodic world saves

use crate::persistence::{SaveError, SaveOutcome};
use crate::world::World;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Saves a world on a fixed interval
pub struct AutoSave {
    world: Arc<World>,
    interval: Duration,
}

impl AutoSave {
    pub fn new(world: Arc<World>, interval: Duration) -> Self {
        Self { world, interval }
    }

    /// Run one save on the blocking pool
    pub async fn save_now(&self) -> Result<SaveOutcome, SaveError> {
        let world = self.world.clone();
        tokio::task::spawn_blocking(move || world.save())
            .await
            .map_err(|_| SaveError::WorkerPanicked)?
    }

    /// Start the save loop; the first save happens one interval from now
    pub fn spawn(self) -> JoinHandle<()> {
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut interval_timer =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval_timer.tick().await;

                match self.save_now().await {
                    Ok(SaveOutcome::Completed(summary)) => {
                        tracing::debug!("Auto-save wrote {} entities", summary.total())
                    }
                    Ok(SaveOutcome::Skipped(reason)) => {
                        tracing::debug!("Auto-save skipped: {:?}", reason)
                    }
                    Err(e) => tracing::error!("Auto-save failed: {}", e),
                }
            }
        });

        tracing::info!("Auto-save task started (interval: {}s)", interval.as_secs());
        handle
    }
}
