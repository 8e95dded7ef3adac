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

//! Remote device handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// A 48-bit Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(pub [u8; 6]);

/// Error parsing a textual device address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid Bluetooth address: {0}")]
pub struct InvalidAddress(String);

impl DeviceAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');

        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(InvalidAddress(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(InvalidAddress(s.to_string()));
        }

        Ok(Self(bytes))
    }
}

#[cfg(feature = "bluez")]
impl From<bluer::Address> for DeviceAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluez")]
impl From<DeviceAddress> for bluer::Address {
    fn from(addr: DeviceAddress) -> Self {
        bluer::Address::new(addr.0)
    }
}

/// A remote peer as observed by the adapter.
///
/// Identity is the address: two handles for the same address compare equal
/// even if one was observed with a name and the other without.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub address: DeviceAddress,
    pub name: Option<String>,
    pub bonded: bool,
}

impl Device {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            name: None,
            bonded: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bonded(mut self, bonded: bool) -> Self {
        self.bonded = bonded;
        self
    }

    /// Name for display, falling back to the address.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}
