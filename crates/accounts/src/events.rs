// Aggregator Lifecycle Events
//
// Typed events republished to windows, menus and rosters.

use crate::account::Account;
use palaver_rpc::{ConnectionHandle, ConnectionStatus, Presence, StatusReason};

/// Lifecycle event emitted by the account manager.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A tracked account finished fetching its initial properties.
    AccountCreated(Account),

    /// The remote service removed an account.
    AccountDeleted(Account),

    AccountEnabled(Account),

    AccountDisabled(Account),

    /// An account's descriptive properties changed.
    AccountChanged(Account),

    /// An account's connection status transitioned.
    AccountConnectionChanged {
        account: Account,
        reason: StatusReason,
        new: ConnectionStatus,
        old: ConnectionStatus,
    },

    /// The aggregate most-available presence changed.
    GlobalPresenceChanged(Presence),

    /// An account gained a live connection.
    NewConnection(ConnectionHandle),

    /// The initial account enumeration completed. Emitted at most once per
    /// manager instance.
    Ready,
}
