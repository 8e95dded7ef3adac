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

//! SPP serial terminal

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spp_session::config::{Config, TerminalConfig};
use spp_session::framing::{encode_frame, FrameAccumulator};
use spp_session::{ChannelHandler, Device, DeviceAddress, SessionEvent, SessionFacade, SessionHost};

#[derive(Parser)]
#[command(name = "spp-session")]
#[command(about = "Bluetooth serial port terminal", long_about = None)]
#[command(version)]
struct Cli {
    /// Adapter to use, overriding the configuration file
    #[arg(short, long)]
    adapter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show adapter and session state
    Status,
    /// Power the adapter on
    Enable,
    /// List bonded devices
    Paired,
    /// Discover nearby devices
    Scan {
        /// Length of the discovery window
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Open an interactive serial session
    Connect {
        /// Device address, e.g. 00:11:22:33:44:55
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("spp_session=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(adapter) = cli.adapter {
        config.bluetooth.adapter = Some(adapter);
    }
    if let Commands::Scan {
        seconds: Some(seconds),
    } = cli.command
    {
        config.bluetooth.scan_window_secs = seconds;
    }
    info!("Configuration loaded");

    let mut host = SessionHost::bluez(config.bluetooth.clone());
    let result = match host.instance().await {
        Some(session) => run(cli.command, session, &config.terminal).await,
        None => Err(anyhow::anyhow!("No usable Bluetooth adapter")),
    };

    host.teardown();
    result
}

async fn run(command: Commands, session: &SessionFacade, terminal: &TerminalConfig) -> Result<()> {
    match command {
        Commands::Status => {
            println!(
                "Adapter: {}",
                if session.is_enabled().await { "enabled" } else { "disabled" }
            );
            println!("Session: {}", session.state().as_str());
            println!("Discovery: {}", session.scan_state().as_str());
            Ok(())
        }
        Commands::Enable => enable(session).await,
        Commands::Paired => {
            let mut devices: Vec<Device> = session.paired_devices().await.into_iter().collect();
            devices.sort_by_key(|d| d.address);
            if devices.is_empty() {
                println!("No bonded devices");
            }
            for device in devices {
                println!("{}  {}", device.address, device.display_name());
            }
            Ok(())
        }
        Commands::Scan { .. } => scan(session).await,
        Commands::Connect { address } => {
            let address: DeviceAddress = address.parse()?;
            connect(session, address, terminal).await
        }
    }
}

async fn enable(session: &SessionFacade) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    session
        .request_enable(move |granted| {
            let _ = tx.send(granted);
        })
        .await;

    if rx.await.unwrap_or(false) {
        println!("Adapter enabled");
        Ok(())
    } else {
        bail!("Adapter enable was refused")
    }
}

async fn scan(session: &SessionFacade) -> Result<()> {
    let (listener, mut events) = ChannelHandler::channel();
    if !session.scan_devices(Arc::new(listener)).await {
        bail!("Could not start discovery; is the adapter enabled?");
    }

    // The same device is usually reported several times per cycle.
    let mut seen: BTreeMap<DeviceAddress, Device> = BTreeMap::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                session.cancel_scan();
            }
            event = events.recv() => match event {
                Some(SessionEvent::ScanStarted) => println!("Scanning..."),
                Some(SessionEvent::DeviceFound(device)) => {
                    let is_new = !seen.contains_key(&device.address);
                    let named = device.name.is_some();
                    if is_new || named {
                        if is_new {
                            println!("{}  {}", device.address, device.display_name());
                        }
                        seen.insert(device.address, device);
                    }
                }
                Some(SessionEvent::ScanFinished) | None => break,
                Some(_) => {}
            }
        }
    }

    println!("{} device(s) found", seen.len());
    Ok(())
}

async fn connect(session: &SessionFacade, address: DeviceAddress, terminal: &TerminalConfig) -> Result<()> {
    let device = session
        .paired_devices()
        .await
        .into_iter()
        .find(|d| d.address == address)
        .unwrap_or_else(|| Device::new(address));
    let name = device.display_name();

    let (handler, mut events) = ChannelHandler::channel();
    if !session.connect(device.clone(), Arc::new(handler)).await {
        bail!("Could not connect; is the adapter enabled?");
    }
    println!("Connecting to {}...", device);

    let mut frames = FrameAccumulator::with_terminator(terminal.terminator);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    // Input ended before the link came up; close as soon as it does.
    let mut close_pending = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                session.close();
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !session.write(encode_frame(&line, terminal.terminator)) {
                        warn!("Not connected; message dropped");
                    } else if terminal.echo_sent {
                        println!("me : {}", line);
                    }
                }
                Ok(None) => {
                    stdin_open = false;
                    if !session.close() {
                        close_pending = true;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                    if !session.close() {
                        close_pending = true;
                    }
                }
            },
            event = events.recv() => match event {
                Some(SessionEvent::Connected) => {
                    println!("Connected to {}", device);
                    if close_pending {
                        session.close();
                    }
                }
                Some(SessionEvent::Data(chunk)) => {
                    for frame in frames.push(&chunk) {
                        println!("{} : {}", name, String::from_utf8_lossy(&frame));
                    }
                }
                Some(SessionEvent::Error(e)) => {
                    eprintln!("Error: {}", e);
                    // A failed connect never reports Disconnected.
                    if e.is_session_fatal() && !session.state().is_active() {
                        break;
                    }
                }
                Some(SessionEvent::Disconnected) | None => {
                    println!("Disconnected");
                    break;
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}
