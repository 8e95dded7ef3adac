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

//! Duplex I/O for the active session.
//!
//! Writes are queued on the write lane and performed in submission order.
//! Reads happen in a loop on the read lane, one buffer at a time, and every
//! chunk is handed to the consumer on the callback lane.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use super::backend::READ_BUFFER_SIZE;
use super::slot::{LinkReader, SessionCore};
use crate::error::SessionError;
use crate::events::StreamingHandler;
use crate::lane::SerialLane;

/// The write and read lanes of the engine.
#[derive(Clone)]
pub struct StreamPump {
    core: Arc<SessionCore>,
    write_lane: SerialLane,
    read_lane: SerialLane,
    report_read_errors: bool,
}

impl StreamPump {
    pub(crate) fn new(core: Arc<SessionCore>, report_read_errors: bool) -> Self {
        Self {
            core,
            write_lane: SerialLane::spawn("write"),
            read_lane: SerialLane::spawn("read"),
            report_read_errors,
        }
    }

    /// Queue `bytes` for transmission.
    ///
    /// Returns `false` without queueing anything if no session is connected.
    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> bool {
        let Some(generation) = self.core.slot.lock().connected_generation() else {
            debug!("Write refused: not connected");
            return false;
        };

        let bytes = bytes.into();
        trace!("Queueing {} bytes", bytes.len());
        self.write_lane
            .submit(Self::write_job(self.core.clone(), generation, bytes))
    }

    /// Run a connection job on the write lane, behind any queued writes.
    pub(crate) fn submit_control<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.write_lane.submit(job)
    }

    /// Start the read loop for a freshly committed session.
    pub(crate) fn start_reading(
        &self,
        generation: u64,
        reader: LinkReader,
        stop_rx: oneshot::Receiver<()>,
        live: Arc<AtomicBool>,
        handler: Arc<dyn StreamingHandler>,
    ) -> bool {
        self.read_lane.submit(Self::read_loop(
            self.core.clone(),
            generation,
            reader,
            stop_rx,
            live,
            handler,
            self.report_read_errors,
        ))
    }

    /// Stop both lanes. Whatever they were doing is dropped.
    pub fn shutdown(&self) {
        self.write_lane.shutdown();
        self.read_lane.shutdown();
    }

    async fn write_job(core: Arc<SessionCore>, generation: u64, bytes: Vec<u8>) {
        let writer = core
            .slot
            .lock()
            .session_mut(generation)
            .and_then(|session| session.writer.take());

        let Some(mut writer) = writer else {
            debug!("Dropping {} bytes for closed session", bytes.len());
            return;
        };

        let result = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                trace!("Wrote {} bytes", bytes.len());
                if let Some(session) = core.slot.lock().session_mut(generation) {
                    session.writer = Some(writer);
                }
                // Otherwise the session closed mid-write and the half is dropped here.
            }
            Err(e) => {
                warn!("Write failed: {}", e);
                drop(writer);
                core.end_session(generation, Some(SessionError::WriteFailed(e)));
            }
        }
    }

    async fn read_loop(
        core: Arc<SessionCore>,
        generation: u64,
        mut reader: LinkReader,
        mut stop_rx: oneshot::Receiver<()>,
        live: Arc<AtomicBool>,
        handler: Arc<dyn StreamingHandler>,
        report_read_errors: bool,
    ) {
        debug!("Read loop started");
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        let failure = loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    debug!("Read loop stopped");
                    return;
                }
                read = reader.read(&mut buffer) => match read {
                    // Zero bytes is end of stream, never a delivery.
                    Ok(0) => {
                        info!("Connection closed by remote");
                        break io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by remote");
                    }
                    Ok(n) => {
                        trace!("Read {} bytes", n);
                        let chunk = buffer[..n].to_vec();
                        let handler = handler.clone();
                        let live = live.clone();
                        core.callbacks.post(move || {
                            // A read can land while the session is being closed.
                            if live.load(Ordering::Acquire) {
                                handler.on_data(&chunk);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Read error: {}", e);
                        break e;
                    }
                }
            }
        };

        drop(reader);
        let error = report_read_errors.then(|| SessionError::ReadFailed(failure));
        core.end_session(generation, error);
    }
}
