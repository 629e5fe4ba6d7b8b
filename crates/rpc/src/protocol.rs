// Account Service Wire Protocol
//
// Types exchanged with the remote account-management service. The transport
// itself is an opaque RPC channel; `AccountService` implementations map these
// types onto whatever bus they speak.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Stable unique identifier of an account on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountPath(String);

impl AccountPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

/// Opaque handle to a live protocol connection owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle(String);

impl ConnectionHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Reason reported alongside a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusReason {
    NoneSpecified,
    Requested,
    NetworkError,
    AuthenticationFailed,
    EncryptionError,
    NameInUse,
}

/// Presence category of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceKind {
    Unset,
    Offline,
    Available,
    Away,
    ExtendedAway,
    Hidden,
    Busy,
    Unknown,
    Error,
}

impl PresenceKind {
    /// Availability rank of this kind. Higher ranks win when aggregating
    /// presence across accounts.
    pub fn availability(self) -> u8 {
        match self {
            Self::Unset | Self::Unknown | Self::Error => 0,
            Self::Offline => 1,
            Self::Hidden => 2,
            Self::ExtendedAway => 3,
            Self::Away => 4,
            Self::Busy => 5,
            Self::Available => 6,
        }
    }

    /// Compare two kinds by availability. Transitive total order.
    pub fn cmp_availability(self, other: Self) -> Ordering {
        self.availability().cmp(&other.availability())
    }
}

/// A (kind, status, message) presence triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub kind: PresenceKind,

    /// Protocol status string, e.g. "away".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Free-text status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Presence {
    pub fn new(kind: PresenceKind, status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: Some(status.into()),
            message: Some(message.into()),
        }
    }

    /// Presence that has not been set yet.
    pub fn unset() -> Self {
        Self {
            kind: PresenceKind::Unset,
            status: None,
            message: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            kind: PresenceKind::Offline,
            status: None,
            message: None,
        }
    }

    /// Whether this presence is strictly more available than `other`.
    pub fn outranks(&self, other: &Presence) -> bool {
        self.kind.cmp_availability(other.kind) == Ordering::Greater
    }
}

/// Initial property snapshot of an account, delivered once the remote side
/// has finished fetching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProperties {
    pub display_name: String,

    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionHandle>,

    pub status: ConnectionStatus,

    pub presence: Presence,
}

impl Default for AccountProperties {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            enabled: false,
            connection: None,
            status: ConnectionStatus::Disconnected,
            presence: Presence::offline(),
        }
    }
}

/// Bulk property snapshot of the account-management service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerProperties {
    /// Paths of every currently valid account.
    pub valid_accounts: Vec<AccountPath>,

    /// Paths of accounts the service still stores but considers invalid.
    #[serde(default)]
    pub invalid_accounts: Vec<AccountPath>,
}

/// Parameters for the service's create-account call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Connection manager id, e.g. "gabble".
    pub connection_manager: String,

    /// Protocol id, e.g. "jabber".
    pub protocol: String,

    pub display_name: String,

    /// Protocol-specific connection parameters.
    #[serde(default)]
    pub parameters: HashMap<String, JsonValue>,

    /// Account properties to set at creation time.
    #[serde(default)]
    pub properties: HashMap<String, JsonValue>,
}

impl CreateAccountRequest {
    pub fn new(
        connection_manager: impl Into<String>,
        protocol: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            connection_manager: connection_manager.into(),
            protocol: protocol.into(),
            display_name: display_name.into(),
            parameters: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Event pushed by the remote service over the live subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServiceEvent {
    /// An account path became valid or invalid.
    #[serde(rename = "validity-changed")]
    ValidityChanged { path: AccountPath, valid: bool },

    /// Notification about a single account.
    #[serde(rename = "account")]
    Account { path: AccountPath, event: AccountEvent },
}

/// Per-account notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    /// The account's initial property set is fully fetched.
    #[serde(rename = "ready")]
    Ready(AccountProperties),

    #[serde(rename = "enabled-changed")]
    EnabledChanged { enabled: bool },

    /// The account gained or lost its connection.
    #[serde(rename = "connection-changed")]
    ConnectionChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        connection: Option<ConnectionHandle>,
    },

    /// Connection status transition, old to new.
    #[serde(rename = "status-changed")]
    StatusChanged {
        old: ConnectionStatus,
        new: ConnectionStatus,
        reason: StatusReason,
    },

    #[serde(rename = "presence-changed")]
    PresenceChanged { presence: Presence },

    #[serde(rename = "display-name-changed")]
    DisplayNameChanged { display_name: String },

    /// The service removed the account.
    #[serde(rename = "removed")]
    Removed,
}
