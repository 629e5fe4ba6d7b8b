// Shared helpers for the manager integration tests.

#![allow(dead_code)]

use palaver_accounts::ManagerEvent;
use palaver_rpc::{AccountPath, AccountProperties, ConnectionStatus, Presence};
use std::time::Duration;
use tokio::sync::broadcast;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive events until one matches, or panic after a timeout.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<ManagerEvent>,
    matches: F,
) -> ManagerEvent
where
    F: Fn(&ManagerEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `probe` until it returns true, or panic after a timeout.
pub async fn wait_until<F, Fut>(probe: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            if probe().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}

pub fn path(name: &str) -> AccountPath {
    AccountPath::from(name)
}

/// Ready-event property snapshot: enabled, disconnected, given presence.
pub fn ready_props(display_name: &str, presence: Presence) -> AccountProperties {
    AccountProperties {
        display_name: display_name.to_string(),
        enabled: true,
        connection: None,
        status: ConnectionStatus::Disconnected,
        presence,
    }
}
