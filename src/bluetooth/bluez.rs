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

//! BlueZ radio backend.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, Stream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{BoxedLink, DeviceStream, RadioBackend};
use super::device::Device;
use crate::error::SessionError;

/// Radio backed by the system BlueZ daemon.
pub struct BluezRadio {
    session: Session,
    adapter: Adapter,
}

impl BluezRadio {
    /// Connect to BlueZ and pick an adapter.
    ///
    /// `adapter_name` selects e.g. `hci1`; `None` uses the default adapter.
    pub async fn open(adapter_name: Option<&str>) -> Result<Self, SessionError> {
        info!("Initializing Bluetooth backend...");

        // Create BlueZ session
        let session = Session::new()
            .await
            .map_err(|e| SessionError::AdapterUnavailable(e.to_string()))?;
        debug!("BlueZ session created");

        let adapter = match adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|e| SessionError::AdapterUnavailable(e.to_string()))?;

        // The handle is lazy; make sure the adapter actually exists.
        let address = adapter
            .address()
            .await
            .map_err(|e| SessionError::AdapterUnavailable(e.to_string()))?;
        info!("Using Bluetooth adapter: {} ({})", adapter.name(), address);

        Ok(Self { session, adapter })
    }

    /// Build a [`Device`] from what BlueZ knows about `addr`.
    async fn describe(adapter: &Adapter, addr: Address) -> Option<Device> {
        let device = match adapter.device(addr) {
            Ok(device) => device,
            Err(e) => {
                debug!("Device {} vanished: {}", addr, e);
                return None;
            }
        };
        let name = device.name().await.ok().flatten();
        let bonded = device.is_paired().await.unwrap_or(false);

        Some(Device {
            address: addr.into(),
            name,
            bonded,
        })
    }
}

fn backend_error(e: bluer::Error) -> SessionError {
    SessionError::Backend(e.to_string())
}

#[async_trait]
impl RadioBackend for BluezRadio {
    async fn is_powered(&self) -> Result<bool, SessionError> {
        self.adapter.is_powered().await.map_err(backend_error)
    }

    async fn request_enable(&self) -> Result<bool, SessionError> {
        info!("Powering on Bluetooth adapter...");
        if let Err(e) = self.adapter.set_powered(true).await {
            // Refused by rfkill or policy: that is a denial, not a fault.
            warn!("Adapter refused to power on: {}", e);
            return Ok(false);
        }
        self.is_powered().await
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>, SessionError> {
        let mut devices = Vec::new();

        for addr in self.adapter.device_addresses().await.map_err(backend_error)? {
            let device = self.adapter.device(addr).map_err(backend_error)?;
            if device.is_paired().await.map_err(backend_error)? {
                let name = device.name().await.ok().flatten();
                devices.push(Device {
                    address: addr.into(),
                    name,
                    bonded: true,
                });
            }
        }

        Ok(devices)
    }

    async fn discover(&self) -> Result<DeviceStream, SessionError> {
        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(backend_error)?;
        let adapter = self.adapter.clone();

        let devices = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    AdapterEvent::DeviceAdded(addr) => BluezRadio::describe(&adapter, addr).await,
                    _ => None,
                }
            }
        });

        Ok(devices.boxed())
    }

    async fn open_link(&self, device: &Device, service: Uuid) -> Result<BoxedLink, SessionError> {
        let address = device.address;
        let socket_error = |e: bluer::Error| SessionError::SocketOpenFailed {
            address,
            reason: e.to_string(),
        };
        let connect_error = |reason: String| SessionError::ConnectFailed { address, reason };

        let profile = Profile {
            uuid: service,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut profile_handle = self
            .session
            .register_profile(profile)
            .await
            .map_err(socket_error)?;
        let remote = self
            .adapter
            .device(Address::from(address))
            .map_err(socket_error)?;

        debug!("Connecting profile {} on {}", service, address);
        let connect = remote.connect_profile(&service);
        tokio::pin!(connect);
        let mut connect_done = false;

        // BlueZ hands the socket to the registered profile, not to the caller
        // of connect_profile.
        let request = loop {
            tokio::select! {
                result = &mut connect, if !connect_done => {
                    connect_done = true;
                    if let Err(e) = result {
                        return Err(connect_error(e.to_string()));
                    }
                }
                request = profile_handle.next() => match request {
                    Some(request) => break request,
                    None => return Err(connect_error("profile unregistered".to_string())),
                }
            }
        };

        let stream = request
            .accept()
            .map_err(|e| connect_error(e.to_string()))?;
        info!("RFCOMM stream open to {}", address);

        Ok(Box::new(Box::pin(ProfileLink {
            stream,
            _profile: profile_handle,
        })))
    }
}

pin_project! {
    /// An RFCOMM stream that keeps its profile registration alive.
    struct ProfileLink {
        #[pin]
        stream: Stream,
        _profile: ProfileHandle,
    }
}

impl AsyncRead for ProfileLink {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().stream.poll_read(cx, buf)
    }
}

impl AsyncWrite for ProfileLink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().stream.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_shutdown(cx)
    }
}
