// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Local adapter queries and the enable flow.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::backend::RadioBackend;
use super::device::Device;
use crate::lane::CallbackLane;

/// Thin gateway over the local radio.
#[derive(Clone)]
pub struct AdapterGateway {
    radio: Arc<dyn RadioBackend>,
    callbacks: CallbackLane,
}

impl AdapterGateway {
    pub fn new(radio: Arc<dyn RadioBackend>, callbacks: CallbackLane) -> Self {
        Self { radio, callbacks }
    }

    /// Live radio state. A failed query reads as disabled.
    pub async fn is_enabled(&self) -> bool {
        match self.radio.is_powered().await {
            Ok(powered) => powered,
            Err(e) => {
                warn!("Failed to query adapter state: {}", e);
                false
            }
        }
    }

    /// Ask for the radio to be enabled.
    ///
    /// If it already is, `on_result(true)` runs before this returns.
    /// Otherwise the platform flow runs in the background and `on_result`
    /// is posted to the callback lane exactly once with the outcome.
    pub async fn request_enable<F>(&self, on_result: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        if self.is_enabled().await {
            on_result(true);
            return;
        }

        info!("Requesting adapter enable...");
        let radio = self.radio.clone();
        let callbacks = self.callbacks.clone();
        tokio::spawn(async move {
            let granted = match radio.request_enable().await {
                Ok(granted) => granted,
                Err(e) => {
                    warn!("Adapter enable flow failed: {}", e);
                    false
                }
            };
            info!(
                "Adapter enable {}",
                if granted { "granted" } else { "denied" }
            );
            callbacks.post(move || on_result(granted));
        });
    }

    /// Snapshot of bonded devices, keyed by address.
    pub async fn paired_devices(&self) -> HashSet<Device> {
        match self.radio.bonded_devices().await {
            Ok(devices) => devices.into_iter().collect(),
            Err(e) => {
                warn!("Failed to list bonded devices: {}", e);
                HashSet::new()
            }
        }
    }
}
