// Account Service Interface
//
// The RPC seam between the client and the remote account-management service.

use crate::error::RpcError;
use crate::protocol::{
    AccountPath, CreateAccountRequest, ManagerProperties, Presence, ServiceEvent,
};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Live event subscription returned by [`AccountService::events`].
pub type ServiceEvents = Pin<Box<dyn Stream<Item = ServiceEvent> + Send>>;

/// RPC surface of the remote account-management service.
///
/// Discovery contract: callers wait for the service identity to gain an owner
/// on the transport, subscribe to `events` *before* issuing `get_all`, and
/// then reconcile the snapshot with the live stream. That ordering guarantees
/// no validity change is lost between the bulk fetch and the subscription.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Resolves once the service's well-known identity has an owner.
    ///
    /// This is a long-lived watch, not a one-shot probe; dropping the future
    /// cancels it.
    async fn wait_for_owner(&self) -> Result<(), RpcError>;

    /// Ask the transport to start the service if it is not already running.
    async fn ping(&self) -> Result<(), RpcError>;

    /// Subscribe to the live stream of validity and per-account events.
    fn events(&self) -> ServiceEvents;

    /// Bulk-fetch the service's current properties.
    async fn get_all(&self) -> Result<ManagerProperties, RpcError>;

    /// Create a new account, returning its path on success.
    async fn create_account(&self, request: CreateAccountRequest)
        -> Result<AccountPath, RpcError>;

    /// Request a presence change on a single account.
    async fn request_presence(
        &self,
        path: &AccountPath,
        presence: &Presence,
    ) -> Result<(), RpcError>;
}
