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

//! The single session slot shared by the connection manager and the pump.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tracing::info;

use super::backend::BoxedLink;
use super::device::Device;
use crate::error::SessionError;
use crate::events::StreamingHandler;
use crate::lane::CallbackLane;
use crate::state::ConnectionState;

pub(crate) type LinkReader = ReadHalf<BoxedLink>;
pub(crate) type LinkWriter = WriteHalf<BoxedLink>;

/// An established connection.
///
/// The reader half lives in the read loop; the writer half lives here
/// except while a write job is using it.
pub(crate) struct Session {
    pub generation: u64,
    pub device: Device,
    pub handler: Arc<dyn StreamingHandler>,
    pub writer: Option<LinkWriter>,
    read_stop: Option<oneshot::Sender<()>>,
    /// Cleared on the callback lane just before `on_disconnected`; data
    /// callbacks posted later check it and drop their chunk.
    live: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        generation: u64,
        device: Device,
        handler: Arc<dyn StreamingHandler>,
        writer: LinkWriter,
        read_stop: oneshot::Sender<()>,
        live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            generation,
            device,
            handler,
            writer: Some(writer),
            read_stop: Some(read_stop),
            live,
        }
    }

    /// Drop our half of the link and tell the read loop to let go of its half.
    fn release(mut self) -> (Device, Arc<dyn StreamingHandler>, Arc<AtomicBool>) {
        self.writer.take();
        if let Some(stop) = self.read_stop.take() {
            // The loop may already have exited on its own.
            let _ = stop.send(());
        }
        (self.device, self.handler, self.live)
    }
}

pub(crate) struct SessionSlot {
    pub state: ConnectionState,
    /// Device of the current or pending session.
    pub target: Option<Device>,
    /// Bumped by every connect call and by shutdown; stale jobs compare
    /// against it and back off.
    pub generation: u64,
    pub session: Option<Session>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            target: None,
            generation: 0,
            session: None,
        }
    }

    pub fn session_mut(&mut self, generation: u64) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.generation == generation)
    }

    fn take_session(&mut self, generation: u64) -> Option<Session> {
        if self.session.as_ref().map(|s| s.generation) == Some(generation) {
            self.session.take()
        } else {
            None
        }
    }

    /// Generation of the established session, if connected.
    pub fn connected_generation(&self) -> Option<u64> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.session.as_ref().map(|s| s.generation)
    }
}

/// State shared by everything that touches the active session.
pub(crate) struct SessionCore {
    pub slot: Mutex<SessionSlot>,
    pub callbacks: CallbackLane,
}

impl SessionCore {
    pub fn new(callbacks: CallbackLane) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(SessionSlot::new()),
            callbacks,
        })
    }

    /// End the session opened at `generation` if it is still the live one.
    ///
    /// Posts `error` (when given) and then `on_disconnected` to the session's
    /// handler. Returns `false` if that session is already gone.
    pub fn end_session(&self, generation: u64, error: Option<SessionError>) -> bool {
        let session = {
            let mut slot = self.slot.lock();
            let Some(session) = slot.take_session(generation) else {
                return false;
            };
            // A reconnect in progress keeps its own state and target.
            if slot.state == ConnectionState::Connected {
                slot.state = ConnectionState::Disconnected;
                slot.target = None;
            }
            session
        };

        self.retire(session, error);
        true
    }

    /// Close the session if connected. Returns `false` otherwise.
    pub fn close_connected(&self) -> bool {
        let session = {
            let mut slot = self.slot.lock();
            if slot.state != ConnectionState::Connected {
                return false;
            }
            slot.state = ConnectionState::Disconnected;
            slot.target = None;
            slot.session.take()
        };

        if let Some(session) = session {
            self.retire(session, None);
        }
        true
    }

    /// Release a session that a newer connect superseded. Returns whether
    /// there was one.
    pub fn retire_stale(&self, current: u64) -> bool {
        let session = {
            let mut slot = self.slot.lock();
            match slot.session.as_ref() {
                Some(s) if s.generation != current => slot.session.take(),
                _ => None,
            }
        };

        match session {
            Some(session) => {
                self.retire(session, None);
                true
            }
            None => false,
        }
    }

    /// Drop everything: invalidate pending jobs and release the session.
    pub fn reset(&self) {
        let session = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.state = ConnectionState::Disconnected;
            slot.target = None;
            slot.session.take()
        };

        if let Some(session) = session {
            self.retire(session, None);
        }
    }

    fn retire(&self, session: Session, error: Option<SessionError>) {
        let (device, handler, live) = session.release();
        info!("Session with {} closed", device);
        self.callbacks.post(move || {
            live.store(false, Ordering::Release);
            if let Some(error) = error {
                handler.on_error(error);
            }
            handler.on_disconnected();
        });
    }
}
