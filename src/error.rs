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

//! Session engine errors.

use thiserror::Error;

use crate::bluetooth::DeviceAddress;

/// Errors surfaced by the serial session engine.
///
/// None of these cross a public engine operation as an `Err`: they are
/// either delivered through [`StreamingHandler::on_error`], folded into a
/// `bool` return, or logged.
///
/// [`StreamingHandler::on_error`]: crate::events::StreamingHandler::on_error
#[derive(Debug, Error)]
pub enum SessionError {
    /// The platform has no usable Bluetooth adapter.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// An operation was attempted while the radio is off.
    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    /// The serial socket could not be created.
    #[error("Failed to open serial socket to {address}: {reason}")]
    SocketOpenFailed {
        address: DeviceAddress,
        reason: String,
    },

    /// The serial socket was created but the connection attempt failed.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        address: DeviceAddress,
        reason: String,
    },

    /// Writing to the active session failed.
    #[error("Write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Reading from the active session failed or the peer went away.
    #[error("Read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Tearing down a discovery subscription failed.
    #[error("Discovery listener unregister failed: {0}")]
    ReceiverUnregisterFailed(String),

    /// Any other platform query failure.
    #[error("Bluetooth backend error: {0}")]
    Backend(String),
}

impl SessionError {
    /// Whether this error ended (or prevented) a session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::SocketOpenFailed { .. }
                | SessionError::ConnectFailed { .. }
                | SessionError::WriteFailed(_)
                | SessionError::ReadFailed(_)
        )
    }
}
