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

//! Consumer-facing callbacks and event dispatch.

use tokio::sync::mpsc;
use tracing::debug;

use crate::bluetooth::Device;
use crate::error::SessionError;

/// Receives events for one serial session.
///
/// All methods are invoked on the callback lane, one at a time.
pub trait StreamingHandler: Send + Sync {
    /// The link is open and the read loop is about to start.
    fn on_connected(&self);

    /// A session that reached the connected state has ended.
    fn on_disconnected(&self);

    /// A connect attempt or a write failed.
    fn on_error(&self, error: SessionError);

    /// Bytes read from the link. Never empty.
    fn on_data(&self, data: &[u8]);
}

/// Receives events for one discovery cycle.
pub trait ScanListener: Send + Sync {
    fn on_start(&self);

    /// May be called more than once for the same address within a cycle.
    fn on_device_found(&self, device: Device);

    fn on_finish(&self);
}

/// Events emitted by the engine, for hosts that prefer a channel over
/// callbacks.
#[derive(Debug)]
pub enum SessionEvent {
    /// Connection established.
    Connected,
    /// Connection closed.
    Disconnected,
    /// Error occurred.
    Error(SessionError),
    /// Bytes received.
    Data(Vec<u8>),
    /// Discovery cycle started.
    ScanStarted,
    /// Device seen during discovery.
    DeviceFound(Device),
    /// Discovery cycle finished or was cancelled.
    ScanFinished,
}

/// Forwards every callback into an mpsc channel as a [`SessionEvent`].
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelHandler {
    pub fn new(event_tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { event_tx }
    }

    /// Create a handler together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self::new(event_tx), event_rx)
    }

    /// Emit an event.
    fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl StreamingHandler for ChannelHandler {
    fn on_connected(&self) {
        self.emit(SessionEvent::Connected);
    }

    fn on_disconnected(&self) {
        self.emit(SessionEvent::Disconnected);
    }

    fn on_error(&self, error: SessionError) {
        self.emit(SessionEvent::Error(error));
    }

    fn on_data(&self, data: &[u8]) {
        self.emit(SessionEvent::Data(data.to_vec()));
    }
}

impl ScanListener for ChannelHandler {
    fn on_start(&self) {
        self.emit(SessionEvent::ScanStarted);
    }

    fn on_device_found(&self, device: Device) {
        self.emit(SessionEvent::DeviceFound(device));
    }

    fn on_finish(&self) {
        self.emit(SessionEvent::ScanFinished);
    }
}
