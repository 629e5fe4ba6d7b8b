// Palaver RPC - Account Service Transport Layer
//
// Wire protocol, the `AccountService` seam consumed by the account
// aggregator, and an in-memory service implementation for tests and demos.

pub mod error;
pub mod memory;
pub mod protocol;
pub mod service;

pub use error::RpcError;
pub use memory::MemoryService;
pub use protocol::{
    AccountEvent, AccountPath, AccountProperties, ConnectionHandle, ConnectionStatus,
    CreateAccountRequest, ManagerProperties, Presence, PresenceKind, ServiceEvent, StatusReason,
};
pub use service::{AccountService, ServiceEvents};
