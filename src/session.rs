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

//! Public entry points: the session facade and its host.

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::bluetooth::{
    AdapterGateway, ConnectionManager, Device, DiscoveryScanner, RadioBackend, StreamPump,
};
use crate::bluetooth::slot::SessionCore;
use crate::config::BluetoothConfig;
use crate::error::SessionError;
use crate::events::{ScanListener, StreamingHandler};
use crate::lane::CallbackLane;
use crate::state::{ConnectionState, ScanState};

/// Everything a host needs from the engine, in one place.
///
/// Holds at most one session and at most one discovery cycle.
pub struct SessionFacade {
    gateway: AdapterGateway,
    scanner: Arc<DiscoveryScanner>,
    connection: Arc<ConnectionManager>,
    pump: StreamPump,
}

impl SessionFacade {
    /// Build the engine on top of `radio`. Must be called inside a tokio
    /// runtime; the write, read and callback lanes are spawned here.
    pub fn new(radio: Arc<dyn RadioBackend>, config: &BluetoothConfig) -> Self {
        let callbacks = CallbackLane::spawn();
        let core = SessionCore::new(callbacks.clone());
        let pump = StreamPump::new(core.clone(), config.report_read_errors);
        let scanner = Arc::new(DiscoveryScanner::new(
            radio.clone(),
            callbacks.clone(),
            Duration::from_secs(config.scan_window_secs),
        ));
        let connection =
            ConnectionManager::new(radio.clone(), scanner.clone(), core, pump.clone());

        Self {
            gateway: AdapterGateway::new(radio, callbacks),
            scanner,
            connection,
            pump,
        }
    }

    // Adapter

    pub async fn is_enabled(&self) -> bool {
        self.gateway.is_enabled().await
    }

    pub async fn request_enable<F>(&self, on_result: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.gateway.request_enable(on_result).await
    }

    pub async fn paired_devices(&self) -> HashSet<Device> {
        self.gateway.paired_devices().await
    }

    // Discovery

    pub async fn scan_devices(&self, listener: Arc<dyn ScanListener>) -> bool {
        self.scanner.start(listener).await
    }

    pub fn cancel_scan(&self) {
        self.scanner.cancel()
    }

    pub fn is_discovering(&self) -> bool {
        self.scanner.is_discovering()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    // Session

    pub async fn connect(&self, device: Device, handler: Arc<dyn StreamingHandler>) -> bool {
        self.connection.connect(device, handler).await
    }

    pub fn close(&self) -> bool {
        self.connection.close()
    }

    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.pump.write(bytes)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connected_device(&self) -> Option<Device> {
        self.connection.connected_device()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Close the session, cancel discovery and stop the I/O lanes.
    ///
    /// Callbacks already posted are still delivered.
    pub fn shutdown(&self) {
        info!("Shutting down serial session engine");
        self.scanner.cancel();
        self.connection.shutdown();
        self.pump.shutdown();
    }
}

impl Drop for SessionFacade {
    fn drop(&mut self) {
        // The callback lane drains on its own once every sender is gone.
        self.pump.shutdown();
    }
}

/// Future resolving to a usable radio, or why there is none.
pub type ProbeFuture = BoxFuture<'static, Result<Arc<dyn RadioBackend>, SessionError>>;

enum Capability {
    Unprobed,
    Unavailable,
    Available(SessionFacade),
}

/// Owns the engine for the lifetime of the process.
///
/// The platform is probed once, on first use. If it has no usable adapter
/// the host stays unavailable until [`SessionHost::teardown`].
pub struct SessionHost {
    config: BluetoothConfig,
    probe: Box<dyn Fn() -> ProbeFuture + Send + Sync>,
    capability: Capability,
}

impl SessionHost {
    pub fn new<F>(config: BluetoothConfig, probe: F) -> Self
    where
        F: Fn() -> ProbeFuture + Send + Sync + 'static,
    {
        Self {
            config,
            probe: Box::new(probe),
            capability: Capability::Unprobed,
        }
    }

    /// Host backed by the system BlueZ daemon.
    #[cfg(feature = "bluez")]
    pub fn bluez(config: BluetoothConfig) -> Self {
        use futures::FutureExt;

        let adapter = config.adapter.clone();
        Self::new(config, move || {
            let adapter = adapter.clone();
            async move {
                let radio = crate::bluetooth::BluezRadio::open(adapter.as_deref()).await?;
                Ok(Arc::new(radio) as Arc<dyn RadioBackend>)
            }
            .boxed()
        })
    }

    /// The engine, or `None` when the platform has no Bluetooth.
    pub async fn instance(&mut self) -> Option<&SessionFacade> {
        if let Capability::Unprobed = self.capability {
            self.capability = match (self.probe)().await {
                Ok(radio) => Capability::Available(SessionFacade::new(radio, &self.config)),
                Err(e) => {
                    warn!("Bluetooth unavailable: {}", e);
                    Capability::Unavailable
                }
            };
        }

        match &self.capability {
            Capability::Available(facade) => Some(facade),
            _ => None,
        }
    }

    /// Whether the last probe found no usable adapter.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.capability, Capability::Unavailable)
    }

    /// Shut the engine down and forget the probe result.
    pub fn teardown(&mut self) {
        if let Capability::Available(facade) = &self.capability {
            facade.shutdown();
        }
        self.capability = Capability::Unprobed;
    }
}
