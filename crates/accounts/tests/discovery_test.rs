mod support;

use palaver_accounts::{AccountManager, ManagerEvent};
use palaver_rpc::{
    AccountEvent, ConnectionHandle, ConnectionStatus, MemoryService, Presence, ServiceEvent,
    StatusReason,
};
use std::sync::Arc;
use support::{path, ready_props, wait_for_event};

#[tokio::test]
async fn bulk_discovery_tracks_every_valid_account() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));
    service.add_valid_account(path("/am/b"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );
    service.publish_account(
        path("/am/b"),
        AccountEvent::Ready(ready_props("B", Presence::offline())),
    );

    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::Ready)).await;

    assert!(manager.is_ready().await);
    assert_eq!(manager.count().await, 2);
    assert!(manager.lookup(&path("/am/a")).await.is_some());
    assert!(manager.lookup(&path("/am/b")).await.is_some());
    assert!(manager.lookup(&path("/am/c")).await.is_none());
}

#[tokio::test]
async fn discovering_the_same_path_twice_yields_one_handle() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    // The same path also arrives over the live validity stream.
    service.publish(ServiceEvent::ValidityChanged {
        path: path("/am/a"),
        valid: true,
    });
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );

    let created = wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountCreated(_))).await;

    assert_eq!(manager.count().await, 1);

    let looked_up = manager.lookup(&path("/am/a")).await.expect("account missing");
    let again = manager.lookup(&path("/am/a")).await.expect("account missing");
    assert_eq!(looked_up, again);
    match created {
        ManagerEvent::AccountCreated(account) => assert_eq!(account, looked_up),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn ready_flips_once_and_stays_set() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));
    service.add_valid_account(path("/am/b"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountCreated(_))).await;

    // One account is still fetching its properties.
    assert!(!manager.is_ready().await);

    service.publish_account(
        path("/am/b"),
        AccountEvent::Ready(ready_props("B", Presence::offline())),
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::Ready)).await;
    assert!(manager.is_ready().await);

    // A later account arriving not-yet-ready does not clear the flag.
    service.publish(ServiceEvent::ValidityChanged {
        path: path("/am/c"),
        valid: true,
    });
    service.publish_account(
        path("/am/a"),
        AccountEvent::DisplayNameChanged {
            display_name: "A2".to_string(),
        },
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountChanged(_))).await;

    assert_eq!(manager.count().await, 3);
    assert!(manager.is_ready().await);
}

#[tokio::test]
async fn enable_and_disable_events_follow_the_flag() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::Ready)).await;

    service.publish_account(path("/am/a"), AccountEvent::EnabledChanged { enabled: false });
    let event = wait_for_event(&mut events, |e| {
        matches!(
            e,
            ManagerEvent::AccountDisabled(_) | ManagerEvent::AccountEnabled(_)
        )
    })
    .await;
    match event {
        ManagerEvent::AccountDisabled(account) => assert!(!account.is_enabled().await),
        other => panic!("unexpected event: {:?}", other),
    }

    service.publish_account(path("/am/a"), AccountEvent::EnabledChanged { enabled: true });
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountEnabled(_))).await;
}

#[tokio::test]
async fn connection_lifecycle_and_lookup() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::Ready)).await;

    let connection = ConnectionHandle::new("/conn/a0");
    service.publish_account(
        path("/am/a"),
        AccountEvent::ConnectionChanged {
            connection: Some(connection.clone()),
        },
    );

    let event =
        wait_for_event(&mut events, |e| matches!(e, ManagerEvent::NewConnection(_))).await;
    match event {
        ManagerEvent::NewConnection(handle) => assert_eq!(handle, connection),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(manager.connections().await, vec![connection.clone()]);
    let account = manager
        .lookup_by_connection(&connection)
        .await
        .expect("connection lookup failed");
    assert_eq!(account.unique_name(), &path("/am/a"));

    // Losing the connection produces no NewConnection and empties the
    // snapshot.
    service.publish_account(path("/am/a"), AccountEvent::ConnectionChanged { connection: None });
    service.publish_account(
        path("/am/a"),
        AccountEvent::DisplayNameChanged {
            display_name: "A".to_string(),
        },
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountChanged(_))).await;

    assert!(manager.connections().await.is_empty());
    assert!(manager.lookup_by_connection(&connection).await.is_none());
}

#[tokio::test]
async fn status_transitions_keep_incremental_counters() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::Ready)).await;

    service.publish_account(
        path("/am/a"),
        AccountEvent::StatusChanged {
            old: ConnectionStatus::Disconnected,
            new: ConnectionStatus::Connecting,
            reason: StatusReason::Requested,
        },
    );
    wait_for_event(&mut events, |e| {
        matches!(e, ManagerEvent::AccountConnectionChanged { .. })
    })
    .await;
    assert_eq!(manager.connecting_count().await, 1);
    assert_eq!(manager.connected_count().await, 0);

    service.publish_account(
        path("/am/a"),
        AccountEvent::StatusChanged {
            old: ConnectionStatus::Connecting,
            new: ConnectionStatus::Connected,
            reason: StatusReason::Requested,
        },
    );
    let event = wait_for_event(&mut events, |e| {
        matches!(e, ManagerEvent::AccountConnectionChanged { .. })
    })
    .await;

    // Both counters moved together; no observable intermediate state.
    assert_eq!(manager.connecting_count().await, 0);
    assert_eq!(manager.connected_count().await, 1);
    match event {
        ManagerEvent::AccountConnectionChanged { old, new, reason, .. } => {
            assert_eq!(old, ConnectionStatus::Connecting);
            assert_eq!(new, ConnectionStatus::Connected);
            assert_eq!(reason, StatusReason::Requested);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    service.publish_account(
        path("/am/a"),
        AccountEvent::StatusChanged {
            old: ConnectionStatus::Connected,
            new: ConnectionStatus::Disconnected,
            reason: StatusReason::NetworkError,
        },
    );
    wait_for_event(&mut events, |e| {
        matches!(e, ManagerEvent::AccountConnectionChanged { .. })
    })
    .await;
    assert_eq!(manager.connecting_count().await, 0);
    assert_eq!(manager.connected_count().await, 0);
}

#[tokio::test]
async fn events_before_ready_are_dropped() {
    let service = MemoryService::new();
    service.add_valid_account(path("/am/a"));
    service.add_valid_account(path("/am/b"));

    let manager = AccountManager::new(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    service.set_owner_present();
    service.publish_account(
        path("/am/a"),
        AccountEvent::Ready(ready_props("A", Presence::offline())),
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountCreated(_))).await;

    // Account b has not reported ready; its status change must not count.
    service.publish_account(
        path("/am/b"),
        AccountEvent::StatusChanged {
            old: ConnectionStatus::Disconnected,
            new: ConnectionStatus::Connecting,
            reason: StatusReason::Requested,
        },
    );
    service.publish_account(
        path("/am/a"),
        AccountEvent::DisplayNameChanged {
            display_name: "A".to_string(),
        },
    );
    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::AccountChanged(_))).await;

    assert_eq!(manager.connecting_count().await, 0);
}
