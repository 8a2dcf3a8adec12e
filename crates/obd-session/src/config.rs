//! Gateway configuration
//!
//! This module contains the startup parameters of the session machinery and
//! the transport selection. All values are immutable for the lifetime of a
//! supervisor instance.

use std::path::PathBuf;
use std::time::Duration;

use obd_core::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};

/// Configuration for the session and its supervisors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Default device identifier (e.g. Bluetooth MAC of the OBD dongle)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Start a connection on Read when none is live
    #[serde(default)]
    pub autoconnect: bool,
    /// Consecutive failed connect attempts before giving up
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Delay between two sampling cycles
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,
    /// Recheck interval while connected with reading disabled
    #[serde(default = "default_idle_period_ms")]
    pub idle_period_ms: u64,
    /// Delay before the next connect attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Maximum time a sample may wait for a free queue slot
    #[serde(default = "default_put_timeout_ms")]
    pub put_timeout_ms: u64,
    /// Sample queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Reaction to a full queue
    #[serde(default)]
    pub queue_full_policy: QueueFullPolicy,
}

fn default_retry_limit() -> u32 {
    5
}

fn default_sample_period_ms() -> u64 {
    10_000
}

fn default_idle_period_ms() -> u64 {
    10_000
}

fn default_retry_backoff_ms() -> u64 {
    30_000
}

fn default_put_timeout_ms() -> u64 {
    30_000
}

fn default_queue_capacity() -> usize {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            autoconnect: false,
            retry_limit: default_retry_limit(),
            sample_period_ms: default_sample_period_ms(),
            idle_period_ms: default_idle_period_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            put_timeout_ms: default_put_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            queue_full_policy: QueueFullPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn idle_period(&self) -> Duration {
        Duration::from_millis(self.idle_period_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn put_timeout(&self) -> Duration {
        Duration::from_millis(self.put_timeout_ms)
    }

    /// Reject values the supervisor cannot run with
    pub fn validate(&self) -> GatewayResult<()> {
        if self.queue_capacity == 0 {
            return Err(GatewayError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("sample_period_ms", self.sample_period_ms),
            ("idle_period_ms", self.idle_period_ms),
            ("retry_backoff_ms", self.retry_backoff_ms),
            ("put_timeout_ms", self.put_timeout_ms),
        ] {
            if value == 0 {
                return Err(GatewayError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// What the supervisor does when a sample cannot be queued in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueFullPolicy {
    /// Stop producing until the next Read re-enables sampling
    #[default]
    DisableReading,
    /// Drop this cycle's sample and keep sampling
    SkipCycle,
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// In-memory vehicle
    Mock(MockConfig),
    /// Replay of a recorded JSON-lines trace
    Simulator(SimulatorConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Whether the device can be bound at all
    #[serde(default = "default_true")]
    pub bindable: bool,
    /// Connect attempts that fail before one succeeds
    #[serde(default)]
    pub connect_failures: u32,
    /// Engine state reported once connected
    #[serde(default = "default_true")]
    pub engine_on: bool,
    /// Commands supported by the simulated vehicle
    #[serde(default = "default_mock_commands")]
    pub commands: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_mock_commands() -> Vec<String> {
    ["SPEED", "RPM", "COOLANT_TEMP", "ENGINE_LOAD", "FUEL_TYPE"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            bindable: true,
            connect_failures: 0,
            engine_on: true,
            commands: default_mock_commands(),
        }
    }
}

/// Simulator transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// JSON-lines trace file
    pub file: PathBuf,
}
