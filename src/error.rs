//! Error types for the AMI adapter

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AmiResult<T> = Result<T, AmiError>;

/// Errors produced by the adapter.
///
/// Transport failures never escape the public API as panics or `Err` returns
/// from `connect`/`send_action`; they reach the caller through the notification
/// stream or through the callback of the action that triggered them. The type is
/// `Clone` so one failure can be fanned out to several observers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AmiError {
    /// Invalid adapter configuration, raised at construction.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Socket-level failure (connect, read or write).
    #[error("connection error: {message}")]
    Connection { message: String },

    /// No response carrying the action's ActionID arrived within the TTL.
    #[error("no response for action {action_id} within {ttl_ms}ms")]
    ActionTimeout { action_id: String, ttl_ms: u64 },

    /// Asterisk answered with something other than `Response: Success`.
    #[error("action {action_id} failed: {message}")]
    ActionFailed { action_id: String, message: String },

    /// The socket is not writable; the action was not sent.
    #[error("cannot write to Asterisk socket")]
    Unwritable,

    /// The login handshake has not completed yet.
    #[error("connection is not established")]
    NotReady,

    /// The socket closed while the action was waiting for its response.
    #[error("connection closed")]
    ConnectionClosed,

    /// A pending request with the same ActionID already exists.
    #[error("duplicate ActionID {action_id}")]
    DuplicateActionId { action_id: String },

    /// The action cannot be encoded.
    #[error("invalid action: {message}")]
    InvalidAction { message: String },

    /// The peer is not speaking the framing the decoder expects.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// A notification subscriber fell behind and missed events.
    #[error("notification stream lagged, {skipped} events dropped")]
    Lagged { skipped: u64 },
}

impl AmiError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::InvalidAction {
            message: message.into(),
        }
    }

    /// True for failures reported by Asterisk rather than by the transport.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::ActionFailed { .. })
    }
}

impl From<std::io::Error> for AmiError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_becomes_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = AmiError::from(io);
        assert_eq!(
            err,
            AmiError::Connection {
                message: "refused".into()
            }
        );
    }

    #[test]
    fn display_carries_remote_message() {
        let err = AmiError::ActionFailed {
            action_id: "abc".into(),
            message: "Permission denied".into(),
        };
        assert_eq!(err.to_string(), "action abc failed: Permission denied");
        assert!(err.is_remote_failure());
        assert!(!AmiError::ConnectionClosed.is_remote_failure());
    }
}
