//! Common error types for the OBD gateway

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by the session machinery.
///
/// None of these terminate the session itself. They are rendered into the
/// `error` field of a returned or streamed envelope; only `BindUnavailable`
/// and `RetryExhausted` end a supervisor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Connect attempt failed (retried up to the configured limit)
    #[error("Cannot connect to OBD: {0}")]
    Connect(String),

    /// No physical binding to the device is possible (not retried)
    #[error("Cannot bind to address: {0}")]
    BindUnavailable(String),

    /// A sampling cycle failed; the supervisor keeps running
    #[error("OBD communication error: {0}")]
    Read(String),

    /// The sample queue stayed full for the whole put timeout
    #[error("OBD sample queue full")]
    QueueFull,

    /// Connect requested while a supervisor is live
    #[error("Attempt to connect while connected")]
    AlreadyConnected,

    /// Read or Stop requested with no live supervisor
    #[error("Attempt to read an unactivated connection")]
    Unactivated,

    /// Connect retries exhausted; the supervisor has stopped
    #[error("Cannot connect to OBD after {0} attempts")]
    RetryExhausted(u32),

    /// Invalid startup configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// Whether this error ends the supervisor that raised it
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayError::BindUnavailable(_) | GatewayError::RetryExhausted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unactivated_message() {
        let msg = GatewayError::Unactivated.to_string();
        assert!(msg.contains("unactivated connection"));
    }

    #[test]
    fn test_terminal_errors() {
        assert!(GatewayError::RetryExhausted(3).is_terminal());
        assert!(GatewayError::BindUnavailable("00:11".to_string()).is_terminal());
        assert!(!GatewayError::QueueFull.is_terminal());
        assert!(!GatewayError::Read("timeout".to_string()).is_terminal());
        assert!(!GatewayError::AlreadyConnected.is_terminal());
    }
}
