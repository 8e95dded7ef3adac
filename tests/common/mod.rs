//! In-memory radio shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use spp_session::bluetooth::{BoxedLink, DeviceStream, SPP_UUID};
use spp_session::config::BluetoothConfig;
use spp_session::{Device, DeviceAddress, RadioBackend, SessionError, SessionEvent, SessionFacade};

/// Capacity of each in-memory pipe.
const PIPE_CAPACITY: usize = 4096;

/// How the next `open_link` call behaves.
pub enum LinkPlan {
    /// Hand back one end of an in-memory pipe; the other end goes to the test.
    Duplex,
    /// Reads never complete and every write fails.
    BrokenWrite,
    /// Opening fails with `ConnectFailed`.
    Fail(&'static str),
}

/// Remote ends of links opened by the engine, in open order.
pub type Peers = mpsc::UnboundedReceiver<(Device, DuplexStream)>;

pub struct MockRadio {
    powered: AtomicBool,
    grant_enable: AtomicBool,
    pub enable_requests: AtomicUsize,
    bonded: Mutex<Vec<Device>>,
    discovery_tx: Mutex<Option<mpsc::UnboundedSender<Device>>>,
    pub discover_calls: AtomicUsize,
    plans: Mutex<VecDeque<LinkPlan>>,
    open_delay: Mutex<Duration>,
    opens: Mutex<Vec<(Device, Instant)>>,
    peer_tx: mpsc::UnboundedSender<(Device, DuplexStream)>,
}

impl MockRadio {
    /// A powered radio with nothing bonded.
    pub fn new() -> (Arc<Self>, Peers) {
        let (peer_tx, peers) = mpsc::unbounded_channel();
        let radio = Arc::new(Self {
            powered: AtomicBool::new(true),
            grant_enable: AtomicBool::new(true),
            enable_requests: AtomicUsize::new(0),
            bonded: Mutex::new(Vec::new()),
            discovery_tx: Mutex::new(None),
            discover_calls: AtomicUsize::new(0),
            plans: Mutex::new(VecDeque::new()),
            open_delay: Mutex::new(Duration::ZERO),
            opens: Mutex::new(Vec::new()),
            peer_tx,
        });
        (radio, peers)
    }

    pub fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
    }

    pub fn set_grant_enable(&self, grant: bool) {
        self.grant_enable.store(grant, Ordering::SeqCst);
    }

    pub fn set_bonded(&self, devices: Vec<Device>) {
        *self.bonded.lock() = devices;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    /// Queue the behaviour of a future `open_link` call. Unplanned calls
    /// get a duplex pipe.
    pub fn plan(&self, plan: LinkPlan) {
        self.plans.lock().push_back(plan);
    }

    /// Report `device` to the active discovery stream, if any.
    pub fn announce(&self, device: Device) -> bool {
        match self.discovery_tx.lock().as_ref() {
            Some(tx) => tx.send(device).is_ok(),
            None => false,
        }
    }

    /// End the active discovery stream as the adapter would when its own
    /// inquiry finishes.
    pub fn end_discovery(&self) {
        self.discovery_tx.lock().take();
    }

    /// Whether the engine still holds the discovery stream.
    pub fn discovery_active(&self) -> bool {
        self.discovery_tx
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Every `open_link` call so far, with the instant it was made.
    pub fn opens(&self) -> Vec<(Device, Instant)> {
        self.opens.lock().clone()
    }
}

#[async_trait]
impl RadioBackend for MockRadio {
    async fn is_powered(&self) -> Result<bool, SessionError> {
        Ok(self.powered.load(Ordering::SeqCst))
    }

    async fn request_enable(&self) -> Result<bool, SessionError> {
        self.enable_requests.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let granted = self.grant_enable.load(Ordering::SeqCst);
        if granted {
            self.set_powered(true);
        }
        Ok(granted)
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>, SessionError> {
        Ok(self.bonded.lock().clone())
    }

    async fn discover(&self) -> Result<DeviceStream, SessionError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.discovery_tx.lock() = Some(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|device| (device, rx))
        });
        Ok(stream.boxed())
    }

    async fn open_link(&self, device: &Device, service: Uuid) -> Result<BoxedLink, SessionError> {
        assert_eq!(service, SPP_UUID);
        self.opens.lock().push((device.clone(), Instant::now()));

        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let plan = self.plans.lock().pop_front().unwrap_or(LinkPlan::Duplex);
        match plan {
            LinkPlan::Duplex => {
                let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
                let _ = self.peer_tx.send((device.clone(), remote));
                Ok(Box::new(local))
            }
            LinkPlan::BrokenWrite => Ok(Box::new(BrokenLink)),
            LinkPlan::Fail(reason) => Err(SessionError::ConnectFailed {
                address: device.address,
                reason: reason.to_string(),
            }),
        }
    }
}

/// A link whose reads hang and whose writes fail.
struct BrokenLink;

impl AsyncRead for BrokenLink {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenLink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "link reset")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub fn device(n: u8) -> Device {
    Device::new(DeviceAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, n])).with_name(format!("Peer {}", n))
}

pub fn facade(radio: &Arc<MockRadio>) -> SessionFacade {
    SessionFacade::new(radio.clone(), &BluetoothConfig::default())
}

pub fn facade_with(radio: &Arc<MockRadio>, config: BluetoothConfig) -> SessionFacade {
    SessionFacade::new(radio.clone(), &config)
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Let every lane go idle, then assert nothing else was delivered.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event: {:?}", event);
    }
}

/// Next remote end opened by the engine.
pub async fn next_peer(peers: &mut Peers) -> (Device, DuplexStream) {
    tokio::time::timeout(Duration::from_secs(30), peers.recv())
        .await
        .expect("timed out waiting for link")
        .expect("peer channel closed")
}
