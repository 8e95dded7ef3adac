//! Adapter queries and the enable flow.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use common::{device, facade, MockRadio};
use spp_session::{Device, DeviceAddress};

#[tokio::test(start_paused = true)]
async fn test_request_enable_when_already_enabled_is_immediate() {
    let (radio, _peers) = MockRadio::new();
    let session = facade(&radio);
    let called = Arc::new(AtomicBool::new(false));

    let flag = called.clone();
    session
        .request_enable(move |granted| {
            assert!(granted);
            flag.store(true, Ordering::SeqCst);
        })
        .await;

    assert!(called.load(Ordering::SeqCst));
    assert_eq!(radio.enable_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_request_enable_granted() {
    let (radio, _peers) = MockRadio::new();
    radio.set_powered(false);
    let session = facade(&radio);
    assert!(!session.is_enabled().await);

    let (tx, rx) = oneshot::channel();
    session
        .request_enable(move |granted| {
            let _ = tx.send(granted);
        })
        .await;

    assert!(rx.await.unwrap());
    assert!(session.is_enabled().await);
    assert_eq!(radio.enable_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_enable_denied() {
    let (radio, _peers) = MockRadio::new();
    radio.set_powered(false);
    radio.set_grant_enable(false);
    let session = facade(&radio);

    let (tx, rx) = oneshot::channel();
    session
        .request_enable(move |granted| {
            let _ = tx.send(granted);
        })
        .await;

    assert!(!rx.await.unwrap());
    assert!(!session.is_enabled().await);
    assert_eq!(radio.enable_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_paired_devices_keyed_by_address() {
    let (radio, _peers) = MockRadio::new();
    let unnamed = Device::new(DeviceAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 1]));
    radio.set_bonded(vec![device(1).bonded(true), unnamed, device(2).bonded(true)]);
    let session = facade(&radio);

    let paired = session.paired_devices().await;
    assert_eq!(paired.len(), 2);
    assert!(paired.contains(&device(1)));
    assert!(paired.contains(&device(2)));
}

#[tokio::test(start_paused = true)]
async fn test_paired_devices_empty() {
    let (radio, _peers) = MockRadio::new();
    let session = facade(&radio);

    assert!(session.paired_devices().await.is_empty());
}
