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

//! Connection lifecycle for the single serial session.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::backend::{RadioBackend, SPP_UUID};
use super::device::Device;
use super::pump::StreamPump;
use super::scanner::DiscoveryScanner;
use super::slot::{Session, SessionCore};
use crate::events::StreamingHandler;
use crate::state::ConnectionState;

/// Pause between releasing a session and opening the next one, so the radio
/// has settled before a new socket is requested.
pub const RECONNECT_QUIESCENCE: Duration = Duration::from_millis(2000);

/// Owns the connect/close lifecycle.
///
/// Every connect attempt runs on the write lane, so attempts never overlap
/// with each other or with writes.
pub struct ConnectionManager {
    radio: Arc<dyn RadioBackend>,
    scanner: Arc<DiscoveryScanner>,
    core: Arc<SessionCore>,
    pump: StreamPump,
}

impl ConnectionManager {
    pub(crate) fn new(
        radio: Arc<dyn RadioBackend>,
        scanner: Arc<DiscoveryScanner>,
        core: Arc<SessionCore>,
        pump: StreamPump,
    ) -> Arc<Self> {
        Arc::new(Self {
            radio,
            scanner,
            core,
            pump,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.core.slot.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Device of the current or pending session.
    pub fn connected_device(&self) -> Option<Device> {
        let slot = self.core.slot.lock();
        if slot.state.is_active() {
            slot.target.clone()
        } else {
            None
        }
    }

    /// Connect to `device`, replacing whatever session exists.
    ///
    /// Returns `false` if the adapter is disabled; nothing else changes in
    /// that case. Otherwise the outcome arrives on `handler`.
    ///
    /// While connected, the current session is released first and the new
    /// attempt waits out [`RECONNECT_QUIESCENCE`]. While a previous attempt is
    /// still pending, the newest call wins and the older attempt backs off.
    pub async fn connect(self: &Arc<Self>, device: Device, handler: Arc<dyn StreamingHandler>) -> bool {
        if !self.adapter_enabled().await {
            debug!("Connect refused: adapter disabled");
            return false;
        }

        let generation = {
            let mut slot = self.core.slot.lock();
            slot.generation += 1;
            slot.target = Some(device.clone());
            slot.state = match slot.state {
                ConnectionState::Connected => {
                    info!("Reconnecting to {}", device);
                    ConnectionState::Reconnecting
                }
                ConnectionState::Disconnected => {
                    info!("Connecting to {}", device);
                    ConnectionState::Connecting
                }
                pending => {
                    info!("Connecting to {} (superseding {})", device, pending.as_str());
                    ConnectionState::Connecting
                }
            };
            slot.generation
        };

        if self
            .pump
            .submit_control(self.clone().attempt(generation, device, handler))
        {
            return true;
        }

        warn!("Write lane is gone; connect abandoned");
        let mut slot = self.core.slot.lock();
        if slot.generation == generation {
            slot.state = ConnectionState::Disconnected;
            slot.target = None;
        }
        false
    }

    /// Close the session. Returns `true` only if one was connected.
    pub fn close(&self) -> bool {
        self.core.close_connected()
    }

    /// Release everything and invalidate pending attempts.
    pub(crate) fn shutdown(&self) {
        self.core.reset();
    }

    async fn adapter_enabled(&self) -> bool {
        match self.radio.is_powered().await {
            Ok(powered) => powered,
            Err(e) => {
                warn!("Failed to query adapter state: {}", e);
                false
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.core.slot.lock().generation == generation
    }

    async fn attempt(self: Arc<Self>, generation: u64, device: Device, handler: Arc<dyn StreamingHandler>) {
        if !self.is_current(generation) {
            debug!("Connect attempt to {} superseded", device);
            return;
        }

        let reconnecting = self.state() == ConnectionState::Reconnecting;
        let released = self.core.retire_stale(generation);

        if reconnecting || released {
            debug!("Waiting {:?} before reconnecting", RECONNECT_QUIESCENCE);
            tokio::time::sleep(RECONNECT_QUIESCENCE).await;

            if !self.adapter_enabled().await {
                warn!("Adapter disabled while reconnecting to {}", device);
                let mut slot = self.core.slot.lock();
                if slot.generation == generation {
                    slot.state = ConnectionState::Disconnected;
                    slot.target = None;
                }
                return;
            }
        }

        {
            let mut slot = self.core.slot.lock();
            if slot.generation != generation {
                debug!("Connect attempt to {} superseded", device);
                return;
            }
            slot.state = ConnectionState::Connecting;
        }

        // Discovery slows connection establishment down considerably.
        self.scanner.cancel();

        info!("Opening serial link to {}", device);
        let result = self.radio.open_link(&device, SPP_UUID).await;

        let mut slot = self.core.slot.lock();
        if slot.generation != generation || slot.state != ConnectionState::Connecting {
            debug!("Dropping link to {}: attempt superseded", device);
            return;
        }

        match result {
            Ok(link) => {
                let (reader, writer) = tokio::io::split(link);
                let (stop_tx, stop_rx) = oneshot::channel();
                let live = Arc::new(AtomicBool::new(true));

                slot.session = Some(Session::new(
                    generation,
                    device.clone(),
                    handler.clone(),
                    writer,
                    stop_tx,
                    live.clone(),
                ));
                slot.state = ConnectionState::Connected;
                drop(slot);

                info!("Connected to {}", device);
                let on_connected = handler.clone();
                self.core.callbacks.post(move || on_connected.on_connected());

                if !self.pump.start_reading(generation, reader, stop_rx, live, handler) {
                    warn!("Read lane is gone; closing session with {}", device);
                    self.core.end_session(generation, None);
                }
            }
            Err(e) => {
                slot.state = ConnectionState::Disconnected;
                slot.target = None;
                drop(slot);

                warn!("Connection to {} failed: {}", device, e);
                self.core.callbacks.post(move || handler.on_error(e));
            }
        }
    }
}
