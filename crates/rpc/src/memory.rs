// In-Memory Account Service
//
// Transport-free `AccountService` used by integration tests and the demo
// binary. Event delivery is deterministic: a subscriber first receives every
// event published so far, then live events in publish order, so discovery can
// never race the subscription.

use crate::error::RpcError;
use crate::protocol::{
    AccountEvent, AccountPath, CreateAccountRequest, ManagerProperties, Presence, ServiceEvent,
};
use crate::service::{AccountService, ServiceEvents};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Scriptable in-process stand-in for the remote account-management service.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    owner: watch::Sender<bool>,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    log: Vec<ServiceEvent>,
    subscribers: Vec<mpsc::UnboundedSender<ServiceEvent>>,
    valid_accounts: Vec<AccountPath>,
    presence_requests: Vec<(AccountPath, Presence)>,
    create_error: Option<RpcError>,
    created: u64,
    pinged: bool,
}

impl MemoryService {
    /// New service with no owner on the bus and no accounts.
    pub fn new() -> Self {
        let (owner, _) = watch::channel(false);
        Self {
            inner: Arc::new(MemoryInner {
                owner,
                state: Mutex::new(MemoryState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.state.lock().expect("memory service state poisoned")
    }

    /// Mark the service identity as owned; pending owner watches resolve.
    pub fn set_owner_present(&self) {
        // `send` is a no-op that errors when there are no live receivers, so
        // an owner set before anyone subscribes would be lost. `send_replace`
        // always stores the value and notifies any current/future receivers.
        self.inner.owner.send_replace(true);
    }

    /// Seed an account path into the `get_all` snapshot.
    pub fn add_valid_account(&self, path: AccountPath) {
        self.state().valid_accounts.push(path);
    }

    /// Push a live event to every subscriber.
    pub fn publish(&self, event: ServiceEvent) {
        let mut state = self.state();
        state.log.push(event.clone());
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Push a per-account event.
    pub fn publish_account(&self, path: AccountPath, event: AccountEvent) {
        self.publish(ServiceEvent::Account { path, event });
    }

    /// Fail the next `create_account` call with `error`.
    pub fn fail_next_create(&self, error: RpcError) {
        self.state().create_error = Some(error);
    }

    /// Presence requests received so far, in call order.
    pub fn presence_requests(&self) -> Vec<(AccountPath, Presence)> {
        self.state().presence_requests.clone()
    }

    pub fn was_pinged(&self) -> bool {
        self.state().pinged
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountService for MemoryService {
    async fn wait_for_owner(&self) -> Result<(), RpcError> {
        let mut rx = self.inner.owner.subscribe();
        rx.wait_for(|present| *present)
            .await
            .map(|_| ())
            .map_err(|_| RpcError::Unavailable)
    }

    async fn ping(&self) -> Result<(), RpcError> {
        self.state().pinged = true;
        Ok(())
    }

    fn events(&self) -> ServiceEvents {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backlog = {
            let mut state = self.state();
            state.subscribers.push(tx);
            state.log.clone()
        };

        Box::pin(async_stream::stream! {
            for event in backlog {
                yield event;
            }
            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }

    async fn get_all(&self) -> Result<ManagerProperties, RpcError> {
        Ok(ManagerProperties {
            valid_accounts: self.state().valid_accounts.clone(),
            invalid_accounts: Vec::new(),
        })
    }

    async fn create_account(
        &self,
        request: CreateAccountRequest,
    ) -> Result<AccountPath, RpcError> {
        let path = {
            let mut state = self.state();
            if let Some(error) = state.create_error.take() {
                return Err(error);
            }

            let path = AccountPath::new(format!(
                "/am/{}/{}/account{}",
                request.connection_manager, request.protocol, state.created
            ));
            state.created += 1;
            state.valid_accounts.push(path.clone());
            path
        };

        debug!(account = %path, "created account {}", request.display_name);

        // The real service announces new accounts over the validity stream.
        self.publish(ServiceEvent::ValidityChanged {
            path: path.clone(),
            valid: true,
        });

        Ok(path)
    }

    async fn request_presence(
        &self,
        path: &AccountPath,
        presence: &Presence,
    ) -> Result<(), RpcError> {
        self.state()
            .presence_requests
            .push((path.clone(), presence.clone()));
        Ok(())
    }
}
