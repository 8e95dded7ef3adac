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

//! Classic Bluetooth serial (SPP) session engine.
//!
//! One session, one discovery cycle, and every event delivered to a single
//! consumer on a dedicated callback lane.

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod events;
pub mod framing;
pub mod lane;
pub mod session;
pub mod state;

pub use bluetooth::{Device, DeviceAddress, RadioBackend};
pub use error::SessionError;
pub use events::{ChannelHandler, ScanListener, SessionEvent, StreamingHandler};
pub use session::{SessionFacade, SessionHost};
pub use state::ConnectionState;
