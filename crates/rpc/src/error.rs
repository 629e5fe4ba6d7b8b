use thiserror::Error;

/// Errors surfaced by an `AccountService` transport.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote call failed [{code}]: {message}")]
    Remote { code: String, message: String },

    #[error("account service is not available")]
    Unavailable,
}

impl RpcError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }
}
