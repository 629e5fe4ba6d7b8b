// Account Handles
//
// Shared handles to individual accounts tracked by the aggregator. A handle
// stays usable after the aggregator drops the account from its map, so
// callers may hold on to accounts across removal.

use palaver_rpc::{AccountPath, AccountProperties, ConnectionHandle, ConnectionStatus, Presence};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

#[derive(Debug, Clone)]
struct AccountState {
    display_name: String,
    enabled: bool,
    connection: Option<ConnectionHandle>,
    status: ConnectionStatus,
    presence: Presence,
}

/// Handle to one account managed by the remote service.
///
/// Cloning is cheap; clones share state. Only the aggregator's event loop
/// mutates it.
#[derive(Debug, Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

#[derive(Debug)]
struct AccountInner {
    path: AccountPath,
    ready: watch::Sender<bool>,
    state: RwLock<AccountState>,
}

impl Account {
    pub(crate) fn new(path: AccountPath) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(AccountInner {
                path,
                ready,
                state: RwLock::new(AccountState {
                    display_name: String::new(),
                    enabled: false,
                    connection: None,
                    status: ConnectionStatus::Disconnected,
                    presence: Presence::unset(),
                }),
            }),
        }
    }

    /// Stable unique identifier of this account.
    pub fn unique_name(&self) -> &AccountPath {
        &self.inner.path
    }

    /// Whether the initial property set has been fetched. Monotonic.
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Watch receiver that flips to `true` once the account is ready.
    pub(crate) fn ready_watch(&self) -> watch::Receiver<bool> {
        self.inner.ready.subscribe()
    }

    pub async fn display_name(&self) -> String {
        self.inner.state.read().await.display_name.clone()
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.state.read().await.enabled
    }

    pub async fn connection(&self) -> Option<ConnectionHandle> {
        self.inner.state.read().await.connection.clone()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.state.read().await.status
    }

    pub async fn presence(&self) -> Presence {
        self.inner.state.read().await.presence.clone()
    }

    pub(crate) async fn apply_ready(&self, properties: AccountProperties) {
        {
            let mut state = self.inner.state.write().await;
            state.display_name = properties.display_name;
            state.enabled = properties.enabled;
            state.connection = properties.connection;
            state.status = properties.status;
            state.presence = properties.presence;
        }
        self.inner.ready.send_replace(true);
    }

    pub(crate) async fn set_enabled(&self, enabled: bool) {
        self.inner.state.write().await.enabled = enabled;
    }

    pub(crate) async fn set_connection(&self, connection: Option<ConnectionHandle>) {
        self.inner.state.write().await.connection = connection;
    }

    pub(crate) async fn set_status(&self, status: ConnectionStatus) {
        self.inner.state.write().await.status = status;
    }

    pub(crate) async fn set_presence(&self, presence: Presence) {
        self.inner.state.write().await.presence = presence;
    }

    pub(crate) async fn set_display_name(&self, display_name: String) {
        self.inner.state.write().await.display_name = display_name;
    }
}

// Handle identity: two accounts are equal when they share state.
impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Account {}
