//! Error taxonomy shared by the session, dispatch and HTTP layers.

use thiserror::Error;

/// Errors surfaced to callers of the command dispatcher.
///
/// `Clone` because a single connection failure is fanned out to every
/// continuation still queued on the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// No session is registered for the identity issuing the command.
    #[error("user '{0}' is not logged in")]
    NotLoggedIn(String),

    /// The backend rejected the login handshake.
    #[error("login rejected by backend: {detail}")]
    LoginFailed { detail: String },

    /// Transport failure while connecting or mid-session.
    #[error("backend connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend connection closed while the request was outstanding.
    #[error("backend connection closed")]
    ConnectionClosed,

    /// The session exists but is not accepting commands yet (or anymore).
    #[error("session for '{0}' is not active")]
    SessionNotActive(String),

    /// No reply arrived within the configured reply timeout.
    #[error("no backend reply after {0} seconds")]
    ReplyTimeout(u64),
}

impl BridgeError {
    /// Short machine-friendly label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NotLoggedIn(_) => "not_logged_in",
            BridgeError::LoginFailed { .. } => "login_failed",
            BridgeError::ConnectionFailed(_) => "connection_failed",
            BridgeError::ConnectionClosed => "connection_closed",
            BridgeError::SessionNotActive(_) => "session_not_active",
            BridgeError::ReplyTimeout(_) => "reply_timeout",
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
