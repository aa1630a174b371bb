//! Unit tests for the GATT server controller

use super::*;
use crate::gatt::{GattStatus, WriteKind};
use crate::transport::LoopbackTransport;
use std::collections::HashSet;
use std::time::Duration;

fn setup() -> (Arc<LoopbackTransport>, GattServer) {
    let transport = Arc::new(LoopbackTransport::new());
    let server = GattServer::new(transport.clone(), &PeripheralConfig::default()).unwrap();
    (transport, server)
}

async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}

#[tokio::test]
async fn test_start_registers_and_advertises() {
    let (transport, server) = setup();
    assert_eq!(server.state(), ServerState::Idle);

    server.start().await.unwrap();
    assert_eq!(server.state(), ServerState::Advertising);

    let advertisement = transport.advertisement().unwrap();
    assert_eq!(advertisement.local_name, "TestCentral");
    assert_eq!(advertisement.service_uuids, vec![profile::SERVICE_UUID]);

    let services = transport.services();
    assert_eq!(services.len(), 1);
    let service = &services[0];
    assert_eq!(service.uuid, profile::SERVICE_UUID);
    assert!(service.is_primary);
    let uuids: Vec<_> = service.characteristics.iter().map(|c| c.uuid).collect();
    assert_eq!(
        uuids,
        vec![
            profile::READ_WRITE_UUID,
            profile::READ_ONLY_UUID,
            profile::NOTIFY_UUID,
            profile::WRITE_ONLY_UUID,
        ]
    );
}

#[tokio::test]
async fn test_start_twice_registers_once() {
    let (transport, server) = setup();
    server.start().await.unwrap();
    server.start().await.unwrap();

    assert_eq!(transport.registrations(), 1);
    assert_eq!(server.status().await.unwrap().session, Some(1));
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let (transport, server) = setup();
    server.stop().await.unwrap();

    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(transport.registrations(), 0);
}

#[tokio::test]
async fn test_restart_cycles_use_fresh_handles() {
    let (transport, server) = setup();
    let mut seen = HashSet::new();

    for _ in 0..2 {
        server.start().await.unwrap();
        let services = transport.services();
        assert_eq!(services.len(), 1);
        for characteristic in &services[0].characteristics {
            assert!(seen.insert(characteristic.value_handle));
            assert!(seen.insert(characteristic.declaration_handle));
        }
        server.stop().await.unwrap();
        assert!(transport.services().is_empty());
        assert!(!transport.is_advertising());
    }

    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(transport.registrations(), 2);
}

#[tokio::test]
async fn test_notify_once_requires_registration() {
    let (transport, server) = setup();

    let err = server.notify_once(b"1234").await.unwrap_err();
    assert!(matches!(err, Error::NotRegistered));

    server.start().await.unwrap();
    server
        .notify_once(profile::MANUAL_NOTIFY_PAYLOAD)
        .await
        .unwrap();

    let sent = transport.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].uuid, profile::NOTIFY_UUID);
    assert_eq!(sent[0].value, b"1234");

    server.stop().await.unwrap();
    assert!(matches!(
        server.notify_once(b"1234").await,
        Err(Error::NotRegistered)
    ));
}

#[tokio::test]
async fn test_registration_failure_leaves_idle() {
    let (transport, server) = setup();
    transport.fail_next_add_service("out of attribute space");

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        Error::ServerStart(TransportError::Registration(_))
    ));
    assert_eq!(server.state(), ServerState::Idle);
    assert!(!transport.is_advertising());

    // A later start succeeds
    server.start().await.unwrap();
    assert_eq!(server.state(), ServerState::Advertising);
}

#[tokio::test]
async fn test_advertising_failure_clears_service() {
    let (transport, server) = setup();
    transport.fail_next_advertising("controller busy");

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        Error::ServerStart(TransportError::Advertising(_))
    ));
    assert_eq!(server.state(), ServerState::Idle);
    assert!(transport.services().is_empty());
    assert!(matches!(
        server.notify_once(b"x").await,
        Err(Error::NotRegistered)
    ));
}

#[tokio::test]
async fn test_handlers_are_wired() {
    let (transport, server) = setup();
    server.start().await.unwrap();

    let info = transport.read(&profile::READ_ONLY_UUID, 0).unwrap();
    assert_eq!(info.status, GattStatus::Success);
    assert_eq!(
        info.data,
        br#"{"deviceName":"TestDevice","deviceId":"00000001-0001-0001-0001-000000000001"}"#
    );

    let stamp = transport.read(&profile::READ_WRITE_UUID, 0).unwrap();
    assert_eq!(stamp.data.len(), 8);

    for uuid in [profile::READ_WRITE_UUID, profile::WRITE_ONLY_UUID] {
        let status = transport
            .write(&uuid, &[], WriteKind::WithoutResponse)
            .unwrap();
        assert_eq!(status, GattStatus::Success);
    }
    let status = transport
        .write(&profile::READ_ONLY_UUID, b"nope", WriteKind::WithoutResponse)
        .unwrap();
    assert_eq!(status, GattStatus::WriteNotPermitted);
}

#[tokio::test(start_paused = true)]
async fn test_subscription_drives_heartbeat() {
    let (transport, server) = setup();
    server.start().await.unwrap();

    transport.set_subscribers(&profile::NOTIFY_UUID, 2).unwrap();
    let status = server.status().await.unwrap();
    assert_eq!(status.subscribers, 2);
    assert!(status.notifying);

    advance_secs(4).await;
    assert_eq!(transport.notifications().len(), 2);

    transport.set_subscribers(&profile::NOTIFY_UUID, 0).unwrap();
    assert!(!server.status().await.unwrap().notifying);
    advance_secs(4).await;
    assert_eq!(transport.notifications().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_heartbeat() {
    let (transport, server) = setup();
    server.start().await.unwrap();
    transport.set_subscribers(&profile::NOTIFY_UUID, 1).unwrap();
    server.status().await.unwrap();
    advance_secs(2).await;
    assert_eq!(transport.notifications().len(), 1);

    server.stop().await.unwrap();
    let status = server.status().await.unwrap();
    assert!(!status.notifying);
    assert_eq!(status.subscribers, 0);

    advance_secs(10).await;
    assert_eq!(transport.notifications().len(), 1);

    // The next session starts without a heartbeat until someone subscribes
    server.start().await.unwrap();
    advance_secs(4).await;
    assert_eq!(transport.notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_survives_send_failures() {
    let (transport, server) = setup();
    server.start().await.unwrap();
    transport.fail_notifications(1);
    transport.set_subscribers(&profile::NOTIFY_UUID, 1).unwrap();
    server.status().await.unwrap();

    advance_secs(6).await;
    assert!(server.status().await.unwrap().notifying);
    assert_eq!(transport.notifications().len(), 2);
}

#[tokio::test]
async fn test_toggle_reports_intended_state() {
    let (transport, server) = setup();

    assert!(server.toggle());
    server
        .wait_for_state(ServerState::Advertising)
        .await
        .unwrap();
    assert!(transport.is_advertising());

    assert!(!server.toggle());
    server.wait_for_state(ServerState::Idle).await.unwrap();
    assert!(!transport.is_advertising());
}

#[tokio::test]
async fn test_rapid_toggles_apply_in_order() {
    let (transport, server) = setup();

    assert!(server.toggle());
    assert!(!server.toggle());
    assert!(server.toggle());

    let status = server.status().await.unwrap();
    assert_eq!(status.state, ServerState::Advertising);
    assert_eq!(transport.registrations(), 2);
}

#[tokio::test]
async fn test_toggle_failure_is_published() {
    let (transport, server) = setup();
    let mut events = server.subscribe_events();
    transport.fail_next_advertising("radio off");

    assert!(server.toggle());
    match events.recv().await.unwrap() {
        ServerEvent::StartFailed(err) => {
            assert!(matches!(*err, Error::ServerStart(_)));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(server.state(), ServerState::Idle);

    // The failed start does not count as advertising
    assert!(server.toggle());
    server
        .wait_for_state(ServerState::Advertising)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_start_keeps_later_toggles() {
    let (transport, server) = setup();
    transport.fail_next_advertising("controller busy");

    // start (fails), stop, start, all queued before the failure is seen
    assert!(server.toggle());
    assert!(!server.toggle());
    assert!(server.toggle());

    let status = server.status().await.unwrap();
    assert_eq!(status.state, ServerState::Advertising);

    assert!(!server.toggle());
    server.wait_for_state(ServerState::Idle).await.unwrap();
    assert!(!transport.is_advertising());
}

#[tokio::test]
async fn test_failed_start_after_explicit_stop() {
    let (transport, server) = setup();
    transport.fail_next_add_service("no room");

    assert!(server.toggle());
    server.stop().await.unwrap();
    assert_eq!(server.state(), ServerState::Idle);

    assert!(server.toggle());
    server
        .wait_for_state(ServerState::Advertising)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_subscription_flapping_keeps_worker_alive() {
    let (transport, server) = setup();
    server.start().await.unwrap();

    for count in [1, 2, 0, 3, 3, 0, 1] {
        transport.set_subscribers(&profile::NOTIFY_UUID, count).unwrap();
    }
    let status = server.status().await.unwrap();
    assert_eq!(status.subscribers, 1);
    assert!(status.notifying);

    advance_secs(2).await;
    assert_eq!(transport.notifications().len(), 1);
}

#[tokio::test]
async fn test_state_change_events() {
    let (_transport, server) = setup();
    let mut events = server.subscribe_events();

    server.start().await.unwrap();
    server.stop().await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        ServerEvent::StateChanged(ServerState::Advertising)
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        ServerEvent::StateChanged(ServerState::Idle)
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let transport = Arc::new(LoopbackTransport::new());
    let config = PeripheralConfig {
        notify_period_ms: 0,
        ..PeripheralConfig::default()
    };
    assert!(matches!(
        GattServer::new(transport, &config),
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_dropping_server_stops_advertising() {
    let (transport, server) = setup();
    server.start().await.unwrap();
    drop(server);

    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(!transport.is_advertising());
    assert!(transport.services().is_empty());
}
