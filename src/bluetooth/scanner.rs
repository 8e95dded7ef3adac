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

//! Time-bounded device discovery.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::backend::{DeviceStream, RadioBackend};
use crate::error::SessionError;
use crate::events::ScanListener;
use crate::lane::CallbackLane;
use crate::state::ScanState;

/// Default length of one discovery cycle.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(12);

/// One active discovery cycle.
struct ScanCycle {
    id: u64,
    listener: Arc<dyn ScanListener>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ScanCycle {
    /// Detach from the discovery stream.
    ///
    /// Fails if the cycle was already detached or its task is gone; callers
    /// log the error and move on.
    fn unsubscribe(&mut self) -> Result<(), SessionError> {
        let stop_tx = self.stop_tx.take().ok_or_else(|| {
            SessionError::ReceiverUnregisterFailed(format!("scan {} not registered", self.id))
        })?;
        stop_tx.send(()).map_err(|_| {
            SessionError::ReceiverUnregisterFailed(format!("scan {} already stopped", self.id))
        })
    }
}

/// Drives discovery cycles, one at a time.
pub struct DiscoveryScanner {
    radio: Arc<dyn RadioBackend>,
    callbacks: CallbackLane,
    window: Duration,
    cycle: Arc<Mutex<Option<ScanCycle>>>,
    next_id: AtomicU64,
}

impl DiscoveryScanner {
    pub fn new(radio: Arc<dyn RadioBackend>, callbacks: CallbackLane, window: Duration) -> Self {
        Self {
            radio,
            callbacks,
            window,
            cycle: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> ScanState {
        if self.cycle.lock().is_some() {
            ScanState::Discovering
        } else {
            ScanState::Idle
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.state() == ScanState::Discovering
    }

    /// Start a discovery cycle, cancelling any active one first.
    ///
    /// Returns `false` if the adapter is disabled or discovery could not be
    /// started.
    pub async fn start(&self, listener: Arc<dyn ScanListener>) -> bool {
        match self.radio.is_powered().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Scan refused: adapter disabled");
                return false;
            }
            Err(e) => {
                warn!("Scan refused: {}", e);
                return false;
            }
        }

        self.cancel();

        let devices = match self.radio.discover().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to start discovery: {}", e);
                return false;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = oneshot::channel();

        {
            let mut slot = self.cycle.lock();
            // A concurrent start may have slipped in while we awaited the backend.
            if let Some(previous) = slot.take() {
                Self::finish(&self.callbacks, previous);
            }
            *slot = Some(ScanCycle {
                id,
                listener: listener.clone(),
                stop_tx: Some(stop_tx),
            });
            self.callbacks.post(move || listener.on_start());
        }

        info!("Discovery started (scan {}, window {:?})", id, self.window);

        tokio::spawn(Self::run_cycle(
            id,
            devices,
            stop_rx,
            self.window,
            self.cycle.clone(),
            self.callbacks.clone(),
        ));

        true
    }

    /// Cancel the active cycle, if any. `on_finish` is queued before this
    /// returns.
    pub fn cancel(&self) {
        let Some(cycle) = self.cycle.lock().take() else {
            return;
        };
        info!("Discovery cancelled (scan {})", cycle.id);
        Self::finish(&self.callbacks, cycle);
    }

    fn finish(callbacks: &CallbackLane, mut cycle: ScanCycle) {
        if let Err(e) = cycle.unsubscribe() {
            debug!("{}", e);
        }
        let listener = cycle.listener;
        callbacks.post(move || listener.on_finish());
    }

    async fn run_cycle(
        id: u64,
        mut devices: DeviceStream,
        mut stop_rx: oneshot::Receiver<()>,
        window: Duration,
        cycle: Arc<Mutex<Option<ScanCycle>>>,
        callbacks: CallbackLane,
    ) {
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    debug!("Scan {} stopped", id);
                    return;
                }
                _ = &mut deadline => {
                    debug!("Scan {} window elapsed", id);
                    break;
                }
                found = devices.next() => match found {
                    Some(device) => {
                        let slot = cycle.lock();
                        match slot.as_ref() {
                            Some(current) if current.id == id => {
                                debug!("Found device: {}", device);
                                let listener = current.listener.clone();
                                callbacks.post(move || listener.on_device_found(device));
                            }
                            _ => return,
                        }
                    }
                    None => {
                        debug!("Scan {} stream ended", id);
                        break;
                    }
                }
            }
        }

        drop(devices);

        let finished = {
            let mut slot = cycle.lock();
            match slot.as_ref() {
                Some(current) if current.id == id => slot.take(),
                _ => None,
            }
        };

        if let Some(current) = finished {
            info!("Discovery finished (scan {})", id);
            Self::finish(&callbacks, current);
        }
    }
}
