//! Link and session status models

use serde::{Deserialize, Serialize};

/// Link status reported by a transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub engine_on: bool,
}

impl LinkStatus {
    pub fn new(connected: bool, engine_on: bool) -> Self {
        Self {
            connected,
            engine_on,
        }
    }
}

/// Reading state exposed by Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadState {
    /// No live supervisor
    Inactive,
    /// Live supervisor, reading disabled
    Idle,
    /// Live supervisor, reading enabled
    Run,
}

/// Why a supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    RetryExhausted,
    BindUnavailable,
    Shutdown,
}

/// Supervisor lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Connecting,
    ConnectedIdle,
    ConnectedReading,
    Stopped(StopReason),
}

impl SupervisorPhase {
    pub fn is_stopped(&self) -> bool {
        matches!(self, SupervisorPhase::Stopped(_))
    }
}

/// Which command list a Status call should include
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandListRequest {
    /// Everything the vehicle supports
    #[serde(rename = "vehicle_cmds")]
    Vehicle,
    /// The narrowed set queried on each sample
    #[serde(rename = "actual_cmds")]
    Actual,
}

/// Reply to a Status call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub connected: bool,
    pub engine_on: bool,
    pub state: ReadState,
    /// Phase of the current (or last) supervisor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SupervisorPhase>,
    /// Consecutive failed connect attempts of the current supervisor
    #[serde(default)]
    pub connect_attempts: u32,
    /// Negotiated OBD protocol, only while connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Device used for autoconnect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub autoconnect: bool,
    /// Requested command list, only while connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
    #[serde(default)]
    pub error: String,
}
