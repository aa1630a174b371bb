//! Drives a full peripheral session through the loopback transport

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use testcentral::gatt::profile;
use testcentral::{GattServer, LoopbackTransport, PeripheralConfig, ServerState};

async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn heartbeat_follows_subscription() {
    let transport = Arc::new(LoopbackTransport::new());
    let server = GattServer::new(transport.clone(), &PeripheralConfig::default()).unwrap();

    server.start().await.unwrap();
    assert_eq!(server.state(), ServerState::Advertising);

    transport.set_subscribers(&profile::NOTIFY_UUID, 1).unwrap();
    assert!(server.status().await.unwrap().notifying);

    advance_secs(6).await;
    let sent = transport.take_notifications();
    assert_eq!(sent.len(), 3);

    let payloads: HashSet<_> = sent.iter().map(|n| n.value.clone()).collect();
    assert_eq!(payloads.len(), 3);
    for notification in &sent {
        assert_eq!(notification.uuid, profile::NOTIFY_UUID);
        assert_eq!(notification.value.len(), 8);
    }
    let ticks: Vec<u64> = sent
        .iter()
        .map(|n| u64::from_ne_bytes(n.value.as_slice().try_into().unwrap()))
        .collect();
    assert!(ticks.windows(2).all(|w| w[1] > w[0]));

    transport.set_subscribers(&profile::NOTIFY_UUID, 0).unwrap();
    assert!(!server.status().await.unwrap().notifying);

    advance_secs(10).await;
    assert!(transport.notifications().is_empty());

    server.stop().await.unwrap();
    assert_eq!(server.state(), ServerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn manual_notification_alongside_heartbeat() {
    let transport = Arc::new(LoopbackTransport::new());
    let server = GattServer::new(transport.clone(), &PeripheralConfig::default()).unwrap();

    assert!(server.toggle());
    server
        .wait_for_state(ServerState::Advertising)
        .await
        .unwrap();

    transport.set_subscribers(&profile::NOTIFY_UUID, 1).unwrap();
    server
        .notify_once(profile::MANUAL_NOTIFY_PAYLOAD)
        .await
        .unwrap();
    advance_secs(2).await;

    let sent = transport.take_notifications();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].value, b"1234");
    assert_eq!(sent[1].value.len(), 8);

    assert!(!server.toggle());
    server.wait_for_state(ServerState::Idle).await.unwrap();
    advance_secs(4).await;
    assert!(transport.notifications().is_empty());
}
