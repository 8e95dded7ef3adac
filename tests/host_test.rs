//! Capability probing and teardown of the session host.

mod common;

use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{device, next_event, MockRadio};
use spp_session::config::BluetoothConfig;
use spp_session::{ChannelHandler, ConnectionState, RadioBackend, SessionError, SessionEvent, SessionHost};

#[tokio::test(start_paused = true)]
async fn test_unavailable_is_sticky_until_teardown() {
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = probes.clone();
    let mut host = SessionHost::new(BluetoothConfig::default(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<Arc<dyn RadioBackend>, _>(SessionError::AdapterUnavailable("no adapter".to_string())) }.boxed()
    });

    assert!(!host.is_unavailable());
    assert!(host.instance().await.is_none());
    assert!(host.is_unavailable());
    assert!(host.instance().await.is_none());
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    host.teardown();
    assert!(!host.is_unavailable());
    assert!(host.instance().await.is_none());
    assert_eq!(probes.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_closes_session_and_reprobes() {
    let (radio, _peers) = MockRadio::new();
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = probes.clone();
    let backend = radio.clone();
    let mut host = SessionHost::new(BluetoothConfig::default(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let backend: Arc<dyn RadioBackend> = backend.clone();
        async move { Ok::<_, SessionError>(backend) }.boxed()
    });

    let (handler, mut events) = ChannelHandler::channel();
    {
        let session = host.instance().await.unwrap();
        assert!(session.connect(device(1), Arc::new(handler)).await);
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));
    assert!(host.instance().await.unwrap().is_connected());
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    host.teardown();
    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected));

    let session = host.instance().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(probes.load(Ordering::SeqCst), 2);
}
