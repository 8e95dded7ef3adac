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

//! Bluetooth communication module.
//!
//! Classic RFCOMM client: adapter access, discovery, and the single serial
//! session with its write and read lanes.

mod adapter;
mod backend;
#[cfg(feature = "bluez")]
mod bluez;
mod connection;
mod device;
mod pump;
mod scanner;
pub(crate) mod slot;

pub use adapter::AdapterGateway;
pub use backend::{BoxedLink, DeviceStream, RadioBackend, SerialLink, READ_BUFFER_SIZE, SPP_UUID};
#[cfg(feature = "bluez")]
pub use bluez::BluezRadio;
pub use connection::{ConnectionManager, RECONNECT_QUIESCENCE};
pub use device::{Device, DeviceAddress, InvalidAddress};
pub use pump::StreamPump;
pub use scanner::{DiscoveryScanner, DEFAULT_SCAN_WINDOW};
