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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::framing::NUL;

const APP_DIR: &str = "spp-session";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Terminal settings.
    pub terminal: TerminalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter to use, e.g. "hci0". Unset means the system default.
    pub adapter: Option<String>,

    /// Length of one discovery cycle in seconds.
    pub scan_window_secs: u64,

    /// Report read failures through `on_error` as well as closing the
    /// session.
    pub report_read_errors: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            scan_window_secs: 12,
            report_read_errors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Byte that ends each message on the wire.
    pub terminator: u8,

    /// Echo sent messages back to the terminal.
    pub echo_sent: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            terminator: NUL,
            echo_sent: true,
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it does
    /// not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            return Ok(toml::from_str(&content)?);
        }

        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }
}
