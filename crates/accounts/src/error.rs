use palaver_rpc::RpcError;
use thiserror::Error;

/// Errors returned by `AccountManager` operations.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    /// The remote service rejected or failed a call.
    #[error(transparent)]
    Remote(#[from] RpcError),

    /// The manager was torn down while the operation was in flight.
    #[error("account manager was shut down while the operation was pending")]
    Cancelled,

    /// Account removal is not wired to the remote service.
    #[error("account removal is not supported")]
    RemovalUnsupported,
}
