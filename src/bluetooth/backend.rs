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

//! Platform abstraction for the local radio.
//!
//! The engine never talks to BlueZ directly; everything goes through
//! [`RadioBackend`] so the session logic can run against an in-memory radio.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use super::device::Device;
use crate::error::SessionError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Bytes requested per read call on an active session.
pub const READ_BUFFER_SIZE: usize = 256;

/// A connected duplex byte stream to a remote device.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SerialLink for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned, type-erased serial link.
pub type BoxedLink = Box<dyn SerialLink>;

/// Devices reported during one discovery cycle.
///
/// Discovery stays active for as long as the stream is held; dropping it
/// stops discovery on the adapter.
pub type DeviceStream = BoxStream<'static, Device>;

/// Operations the engine needs from the local Bluetooth adapter.
#[async_trait]
pub trait RadioBackend: Send + Sync {
    /// Live powered state of the radio.
    async fn is_powered(&self) -> Result<bool, SessionError>;

    /// Run the platform's enable flow. Returns whether the radio ended up
    /// enabled; a refusal is `Ok(false)`.
    async fn request_enable(&self) -> Result<bool, SessionError>;

    /// Snapshot of bonded devices.
    async fn bonded_devices(&self) -> Result<Vec<Device>, SessionError>;

    /// Start discovery and subscribe to found devices.
    async fn discover(&self) -> Result<DeviceStream, SessionError>;

    /// Open a stream socket to `device` for the given service.
    async fn open_link(&self, device: &Device, service: Uuid) -> Result<BoxedLink, SessionError>;
}
