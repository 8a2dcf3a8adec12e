//! Transport collaborator trait
//!
//! The gateway never talks to a vehicle directly. It drives an
//! [`ObdTransport`], which owns the device binding, the OBD link and the
//! decoding of raw command responses into [`SampleSet`]s.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LinkStatus, SampleSet};

/// Transport layer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("End of recorded trace")]
    EndOfTrace,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Diagnostic adapter interface consumed by the connection supervisor.
///
/// Implementations use interior mutability; a single instance is shared
/// between the supervisor task and the session as `Arc<dyn ObdTransport>`.
#[async_trait]
pub trait ObdTransport: Send + Sync {
    /// Bind to the device and open the OBD link.
    ///
    /// Returns whether the link is up afterwards. Failure details are
    /// available from [`last_error`](Self::last_error).
    async fn connect(&self, device_id: &str) -> bool;

    /// Current link status
    fn status(&self) -> LinkStatus;

    /// Query every requested command once
    async fn read_sample(&self) -> Result<SampleSet, TransportError>;

    /// Whether a physical binding to the device exists
    fn bound(&self) -> bool;

    /// Release every device binding held by this host
    async fn release(&self) -> Result<(), TransportError>;

    /// Last error or informational message reported by the adapter
    fn last_error(&self) -> String;

    /// Name of the negotiated OBD protocol (empty when disconnected)
    fn protocol_name(&self) -> String;

    /// Every command the connected vehicle supports
    fn all_commands(&self) -> Vec<String>;

    /// Narrow the commands queried by [`read_sample`](Self::read_sample).
    ///
    /// Names the vehicle does not support are ignored.
    fn set_requested_commands(&self, commands: &[String]);

    /// Commands currently queried on each sample
    fn requested_commands(&self) -> Vec<String>;

    fn requested_command_count(&self) -> usize {
        self.requested_commands().len()
    }
}
