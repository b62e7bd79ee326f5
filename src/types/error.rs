//! Error types for the relay
//!
//! Every work item ends in exactly one of these outcomes. The worker loop
//! picks a log level from the variant; the ledger pool uses
//! [`RelayError::is_transport`] to decide whether a connection is suspect.

/// Main error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Dial, call or timeout failure talking to a ledger node
    #[error("Transport error: {0}")]
    Transport(String),

    /// The ledger answered but refused the transaction
    #[error("Rejected by ledger (status {status}): {message}")]
    Rejected { status: u32, message: String },

    /// A local record the item depends on is missing or contradictory
    #[error("Inconsistent data: {0}")]
    Inconsistent(String),

    /// The item was already applied
    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Whether this failure should demote the connection that produced it
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for RelayError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for RelayError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Every HTTP client failure is a transport failure of that node
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_marks_suspect() {
        assert!(RelayError::Transport("timeout".into()).is_transport());
        assert!(!RelayError::Rejected {
            status: 500,
            message: "bad".into()
        }
        .is_transport());
        assert!(!RelayError::Store("down".into()).is_transport());
    }

    #[test]
    fn test_display_names_the_outcome() {
        let err = RelayError::Rejected {
            status: 402,
            message: "insufficient balance".into(),
        };
        assert_eq!(
            err.to_string(),
            "Rejected by ledger (status 402): insufficient balance"
        );
        assert_eq!(
            RelayError::Duplicate("LPGa".into()).to_string(),
            "Duplicate: LPGa"
        );
    }
}
