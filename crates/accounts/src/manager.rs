// Account Aggregation
//
// Tracks every account exposed by the remote account-management service and
// republishes a single coherent view: per-account lifecycle events,
// connecting/connected tallies and the most-available "global" presence.

use crate::account::Account;
use crate::error::ManagerError;
use crate::events::ManagerEvent;
use futures::StreamExt;
use palaver_rpc::{
    AccountEvent, AccountPath, AccountService, ConnectionHandle, ConnectionStatus,
    CreateAccountRequest, Presence, ServiceEvent,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 100;

static SHARED: OnceLock<Mutex<Weak<AccountManager>>> = OnceLock::new();

/// Aggregated view over every account the remote service manages.
///
/// Dropping the manager cancels the service owner watch and the event loop;
/// account handles already given out stay valid.
pub struct AccountManager {
    inner: Arc<ManagerInner>,
    task: JoinHandle<()>,
}

struct ManagerInner {
    service: Arc<dyn AccountService>,
    state: RwLock<ManagerState>,
    event_tx: broadcast::Sender<ManagerEvent>,
    shutdown: watch::Sender<bool>,
}

struct ManagerState {
    /// Unique name -> account handle. Iteration order is unspecified.
    accounts: HashMap<AccountPath, Account>,
    connecting: u32,
    connected: u32,
    ready: bool,
    /// Account currently leading the global presence, if any.
    global_account: Option<Account>,
    global_presence: Presence,
    /// Last presence explicitly requested by the caller; applied to accounts
    /// created afterwards.
    desired_presence: Presence,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            connecting: 0,
            connected: 0,
            ready: false,
            global_account: None,
            global_presence: Presence::unset(),
            desired_presence: Presence::unset(),
        }
    }
}

impl AccountManager {
    /// Process-wide shared instance.
    ///
    /// The first call constructs the manager against `service`; later calls
    /// return the same handle (their `service` argument is ignored) until
    /// every strong reference has been dropped, after which the next call
    /// constructs a fresh instance.
    pub fn shared(service: Arc<dyn AccountService>) -> Arc<Self> {
        let slot = SHARED.get_or_init(|| Mutex::new(Weak::new()));
        let mut guard = slot.lock().expect("account manager singleton poisoned");

        if let Some(existing) = guard.upgrade() {
            return existing;
        }

        let manager = Arc::new(Self::new(service));
        *guard = Arc::downgrade(&manager);
        manager
    }

    /// Construct a standalone manager. Most callers want
    /// [`AccountManager::shared`].
    ///
    /// Must be called from within a tokio runtime; discovery runs on a
    /// spawned background task.
    pub fn new(service: Arc<dyn AccountService>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(ManagerInner {
            service,
            state: RwLock::new(ManagerState::default()),
            event_tx,
            shutdown,
        });

        let task = tokio::spawn(ManagerInner::run(inner.clone()));

        Self { inner, task }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Whether the initial account enumeration has completed. Monotonic:
    /// once `true` it never reverts.
    pub async fn is_ready(&self) -> bool {
        self.inner.state.read().await.ready
    }

    /// Number of accounts currently connecting.
    pub async fn connecting_count(&self) -> u32 {
        self.inner.state.read().await.connecting
    }

    /// Number of accounts currently connected.
    pub async fn connected_count(&self) -> u32 {
        self.inner.state.read().await.connected
    }

    /// Number of tracked accounts.
    pub async fn count(&self) -> usize {
        self.inner.state.read().await.accounts.len()
    }

    /// Direct lookup by unique name.
    pub async fn lookup(&self, unique_name: &AccountPath) -> Option<Account> {
        self.inner.state.read().await.accounts.get(unique_name).cloned()
    }

    /// Find the account owning `connection`. Linear scan over the tracked
    /// set.
    pub async fn lookup_by_connection(&self, connection: &ConnectionHandle) -> Option<Account> {
        let state = self.inner.state.read().await;
        for account in state.accounts.values() {
            if account.connection().await.as_ref() == Some(connection) {
                return Some(account.clone());
            }
        }
        None
    }

    /// Snapshot of every tracked account.
    pub async fn accounts(&self) -> Vec<Account> {
        self.inner.state.read().await.accounts.values().cloned().collect()
    }

    /// Snapshot of the connection handles of every account that has one.
    pub async fn connections(&self) -> Vec<ConnectionHandle> {
        let state = self.inner.state.read().await;
        let mut connections = Vec::new();
        for account in state.accounts.values() {
            if let Some(connection) = account.connection().await {
                connections.push(connection);
            }
        }
        connections
    }

    /// Cached most-available presence across all tracked accounts.
    pub async fn global_presence(&self) -> Presence {
        self.inner.state.read().await.global_presence.clone()
    }

    /// Request `presence` on every currently-ready account and record it as
    /// the desired presence for accounts created afterwards.
    pub async fn request_global_presence(&self, presence: Presence) {
        let accounts: Vec<Account> = {
            let state = self.inner.state.read().await;
            state.accounts.values().cloned().collect()
        };

        for account in accounts {
            if !account.is_ready() {
                continue;
            }
            if let Err(err) = self
                .inner
                .service
                .request_presence(account.unique_name(), &presence)
                .await
            {
                warn!(account = %account.unique_name(), error = %err, "presence request failed");
            }
        }

        self.inner.state.write().await.desired_presence = presence;
    }

    /// Create a new account on the remote service and wait for it to become
    /// ready; the current desired presence is then requested on it.
    ///
    /// The returned future is detached from this handle, so it can outlive
    /// the borrow; if the manager is torn down while the operation is in
    /// flight it resolves to [`ManagerError::Cancelled`]. The readiness wait
    /// has no timeout of its own; it rides the same event path as discovered
    /// accounts.
    pub fn create_account(
        &self,
        request: CreateAccountRequest,
    ) -> impl Future<Output = Result<Account, ManagerError>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move { inner.create_account(request).await }
    }

    /// Explicit account removal. The remote service binding does not support
    /// it; this always fails rather than silently doing nothing.
    pub async fn remove(&self, _account: &Account) -> Result<(), ManagerError> {
        Err(ManagerError::RemovalUnsupported)
    }
}

impl Drop for AccountManager {
    fn drop(&mut self) {
        // Cancels the owner watch and event dispatch; pending create_account
        // futures observe this as Cancelled.
        let _ = self.inner.shutdown.send(true);
        self.task.abort();
    }
}

impl ManagerInner {
    async fn run(inner: Arc<ManagerInner>) {
        if let Err(err) = inner.service.ping().await {
            debug!(error = %err, "service activation ping failed");
        }

        if let Err(err) = inner.service.wait_for_owner().await {
            // Degraded mode: the manager never becomes ready.
            warn!(error = %err, "account service owner watch failed");
            return;
        }
        debug!("account service appeared");

        // Subscribe before the bulk fetch so no validity change is lost
        // between the snapshot and the live stream.
        let mut events = inner.service.events();

        match inner.service.get_all().await {
            Ok(properties) => {
                for path in &properties.valid_accounts {
                    inner.ensure_account(path).await;
                }
                inner.check_ready().await;
            }
            Err(err) => {
                // No retry; the live stream converges eventually.
                warn!(error = %err, "bulk account fetch failed");
            }
        }

        while let Some(event) = events.next().await {
            inner.handle_event(event).await;
        }

        debug!("service event stream ended");
    }

    /// Return the tracked account for `path`, creating it if needed.
    /// Idempotent: a path seen twice yields the same handle.
    async fn ensure_account(&self, path: &AccountPath) -> Account {
        let mut state = self.state.write().await;
        if let Some(existing) = state.accounts.get(path) {
            return existing.clone();
        }

        let account = Account::new(path.clone());
        state.accounts.insert(path.clone(), account.clone());
        debug!(account = %path, "tracking account");
        account
    }

    async fn handle_event(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::ValidityChanged { path, valid } => {
                if valid {
                    self.ensure_account(&path).await;
                }
                // Invalidated accounts are dropped via their removal event.
            }
            ServiceEvent::Account { path, event } => {
                let account = self.state.read().await.accounts.get(&path).cloned();
                match account {
                    Some(account) => self.handle_account_event(account, event).await,
                    None => debug!(account = %path, "event for untracked account dropped"),
                }
            }
        }
    }

    async fn handle_account_event(&self, account: Account, event: AccountEvent) {
        match event {
            AccountEvent::Ready(properties) => {
                if account.is_ready() {
                    return;
                }
                let initial = properties.presence.clone();
                account.apply_ready(properties).await;
                self.emit(ManagerEvent::AccountCreated(account.clone()));
                // An account can arrive already set; fold its presence into
                // the global snapshot like any other change.
                self.presence_changed(account, initial).await;
                self.check_ready().await;
            }
            _ if !account.is_ready() => {
                // Mirrors the subscription order on the real service: until
                // the initial property fetch lands we are not listening yet.
                debug!(account = %account.unique_name(), "event before ready dropped");
            }
            AccountEvent::EnabledChanged { enabled } => {
                account.set_enabled(enabled).await;
                if enabled {
                    self.emit(ManagerEvent::AccountEnabled(account));
                } else {
                    self.emit(ManagerEvent::AccountDisabled(account));
                }
            }
            AccountEvent::ConnectionChanged { connection } => {
                account.set_connection(connection.clone()).await;
                if let Some(connection) = connection {
                    self.emit(ManagerEvent::NewConnection(connection));
                }
            }
            AccountEvent::StatusChanged { old, new, reason } => {
                account.set_status(new).await;

                {
                    let mut state = self.state.write().await;
                    match old {
                        ConnectionStatus::Connecting => {
                            state.connecting = state.connecting.saturating_sub(1)
                        }
                        ConnectionStatus::Connected => {
                            state.connected = state.connected.saturating_sub(1)
                        }
                        ConnectionStatus::Disconnected => {}
                    }
                    match new {
                        ConnectionStatus::Connecting => state.connecting += 1,
                        ConnectionStatus::Connected => state.connected += 1,
                        ConnectionStatus::Disconnected => {}
                    }
                }

                self.emit(ManagerEvent::AccountConnectionChanged {
                    account,
                    reason,
                    new,
                    old,
                });
            }
            AccountEvent::PresenceChanged { presence } => {
                account.set_presence(presence.clone()).await;
                self.presence_changed(account, presence).await;
            }
            AccountEvent::DisplayNameChanged { display_name } => {
                account.set_display_name(display_name).await;
                self.emit(ManagerEvent::AccountChanged(account));
            }
            AccountEvent::Removed => {
                let (was_leader, snapshot) = {
                    let mut state = self.state.write().await;
                    state.accounts.remove(account.unique_name());

                    let was_leader = state.global_account.as_ref() == Some(&account);
                    if was_leader {
                        Self::recompute_global(&mut state).await;
                    }
                    (was_leader, state.global_presence.clone())
                };

                self.emit(ManagerEvent::AccountDeleted(account));
                if was_leader {
                    self.emit(ManagerEvent::GlobalPresenceChanged(snapshot));
                }
            }
        }
    }

    /// Incremental global-presence update for a single account's change.
    async fn presence_changed(&self, account: Account, presence: Presence) {
        let snapshot = {
            let mut state = self.state.write().await;

            if presence.kind.cmp_availability(state.global_presence.kind) == Ordering::Greater {
                // The changed account outranks the cached leader.
                state.global_account = Some(account);
                state.global_presence = presence;
            } else if state.global_account.as_ref() == Some(&account) {
                // The leader dropped; it may now be below some other account.
                Self::recompute_global(&mut state).await;
            } else {
                return;
            }

            state.global_presence.clone()
        };

        self.emit(ManagerEvent::GlobalPresenceChanged(snapshot));
    }

    /// Full scan for the most-available account. Ties keep the first account
    /// encountered; map iteration order is unspecified.
    async fn recompute_global(state: &mut ManagerState) {
        let mut leader: Option<Account> = None;
        let mut best = Presence::offline();

        for account in state.accounts.values() {
            let presence = account.presence().await;
            if presence.kind.cmp_availability(best.kind) == Ordering::Greater {
                best = presence;
                leader = Some(account.clone());
            }
        }

        if leader.is_none() {
            best = Presence::offline();
        }
        state.global_account = leader;
        state.global_presence = best;
    }

    /// Flip the manager ready once every tracked account is ready.
    async fn check_ready(&self) {
        {
            let mut state = self.state.write().await;
            if state.ready {
                return;
            }
            for account in state.accounts.values() {
                if !account.is_ready() {
                    return;
                }
            }
            state.ready = true;
        }

        debug!("initial account enumeration complete");
        self.emit(ManagerEvent::Ready);
    }

    async fn create_account(&self, request: CreateAccountRequest) -> Result<Account, ManagerError> {
        let path = self.service.create_account(request).await?;
        let account = self.ensure_account(&path).await;

        // Wait for readiness on the same path discovered accounts take.
        // wait_for inspects the current value first, so neither an account
        // that is already ready nor a manager that is already torn down can
        // leave this hanging.
        let mut ready = account.ready_watch();
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            result = ready.wait_for(|is_ready| *is_ready) => {
                if result.is_err() {
                    return Err(ManagerError::Cancelled);
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => return Err(ManagerError::Cancelled),
        }

        // The account is ready; align it with the requested global presence.
        let desired = self.state.read().await.desired_presence.clone();
        if let Err(err) = self.service.request_presence(account.unique_name(), &desired).await {
            warn!(account = %account.unique_name(), error = %err, "presence request failed");
        }

        Ok(account)
    }

    fn emit(&self, event: ManagerEvent) {
        // Best-effort dispatch; no receivers is fine.
        let _ = self.event_tx.send(event);
    }
}
