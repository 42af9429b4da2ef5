use thiserror::Error;

/// Errors from the chat transport (connect and send).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("session is not connected")]
    NotConnected,

    #[error("session closed")]
    Closed,
}

/// Errors from the remote object store and the local credential directory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote store returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid object name: {0}")]
    InvalidName(String),
}

/// Errors raised by business command handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler panicked")]
    Panicked,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fatal supervisor outcomes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("gave up after {attempts} consecutive reconnect attempts")]
    ReconnectLimitExceeded { attempts: u32 },
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_error_display() {
        let err = SupervisorError::ReconnectLimitExceeded { attempts: 11 };
        assert_eq!(
            err.to_string(),
            "gave up after 11 consecutive reconnect attempts"
        );
    }

    #[test]
    fn test_handler_error_wraps_transport_error() {
        let err: HandlerError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "session is not connected");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Remote {
            status: 403,
            message: "AuthenticationFailed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "remote store returned 403: AuthenticationFailed"
        );
    }
}
