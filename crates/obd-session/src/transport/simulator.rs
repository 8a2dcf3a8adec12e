//! Trace replay transport
//!
//! Replays a JSON-lines recording, one line per sampling cycle:
//!
//! ```text
//! {"timestamp": 1700000000.0, "engine_on": true, "values": [["SPEED", 42.0, "kph"], ["FUEL_TYPE", "Gasoline"]]}
//! ```
//!
//! The link drops at the end of the trace; connecting again replays it from
//! the start.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use obd_core::{LinkStatus, ObdTransport, SampleSet, SampleValue, TransportError};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::narrow_commands;
use crate::config::SimulatorConfig;

const PROTOCOL: &str = "OBD Simulator";

#[derive(Debug, Deserialize)]
struct TraceRecord {
    #[serde(default = "default_engine_on")]
    engine_on: bool,
    #[serde(default)]
    values: Vec<TraceValue>,
}

fn default_engine_on() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TraceValue {
    Numeric(String, f64, String),
    Text(String, String),
}

impl TraceValue {
    fn command(&self) -> &str {
        match self {
            TraceValue::Numeric(command, ..) | TraceValue::Text(command, _) => command,
        }
    }

    fn into_sample(self) -> SampleValue {
        match self {
            TraceValue::Numeric(command, magnitude, unit) => {
                SampleValue::numeric(command, magnitude, unit)
            }
            TraceValue::Text(command, text) => SampleValue::text(command, text),
        }
    }
}

#[derive(Default)]
struct Replay {
    lines: Vec<String>,
    cursor: usize,
    commands: Vec<String>,
}

/// Transport replaying a recorded trace file
pub struct SimulatorTransport {
    path: PathBuf,
    replay: Mutex<Replay>,
    connected: AtomicBool,
    engine_on: AtomicBool,
    requested: RwLock<Vec<String>>,
    last_error: RwLock<String>,
}

impl SimulatorTransport {
    pub fn new(config: &SimulatorConfig) -> Result<Self, TransportError> {
        if config.file.as_os_str().is_empty() {
            return Err(TransportError::InvalidConfig(
                "simulator trace file not set".to_string(),
            ));
        }
        Ok(Self {
            path: config.file.clone(),
            replay: Mutex::new(Replay::default()),
            connected: AtomicBool::new(false),
            engine_on: AtomicBool::new(false),
            requested: RwLock::new(Vec::new()),
            last_error: RwLock::new(String::new()),
        })
    }

    fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.engine_on.store(false, Ordering::SeqCst);
    }

    /// Every command named anywhere in the trace, in order of first appearance
    fn scan_commands(lines: &[String]) -> Vec<String> {
        let mut commands: Vec<String> = Vec::new();
        for record in lines
            .iter()
            .filter_map(|line| serde_json::from_str::<TraceRecord>(line).ok())
        {
            for value in &record.values {
                if !commands.iter().any(|c| c == value.command()) {
                    commands.push(value.command().to_string());
                }
            }
        }
        commands
    }
}

#[async_trait]
impl ObdTransport for SimulatorTransport {
    async fn connect(&self, device_id: &str) -> bool {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot open trace");
                *self.last_error.write() = format!("cannot open {}: {}", self.path.display(), e);
                self.drop_link();
                return false;
            }
        };

        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        let commands = Self::scan_commands(&lines);
        info!(
            device_id,
            path = %self.path.display(),
            cycles = lines.len(),
            commands = commands.len(),
            "Trace loaded"
        );

        *self.requested.write() = commands.clone();
        *self.replay.lock() = Replay {
            lines,
            cursor: 0,
            commands,
        };
        self.last_error.write().clear();
        self.connected.store(true, Ordering::SeqCst);
        self.engine_on.store(true, Ordering::SeqCst);
        true
    }

    fn status(&self) -> LinkStatus {
        LinkStatus::new(
            self.connected.load(Ordering::SeqCst),
            self.engine_on.load(Ordering::SeqCst),
        )
    }

    async fn read_sample(&self) -> Result<SampleSet, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let line = {
            let mut replay = self.replay.lock();
            let line = replay.lines.get(replay.cursor).cloned();
            replay.cursor += 1;
            line
        };
        let Some(line) = line else {
            debug!("Trace exhausted, dropping link");
            self.drop_link();
            return Err(TransportError::EndOfTrace);
        };

        let record: TraceRecord = serde_json::from_str(&line).map_err(|e| {
            let err = TransportError::ReadFailed(format!("malformed trace line: {}", e));
            *self.last_error.write() = err.to_string();
            err
        })?;
        self.engine_on.store(record.engine_on, Ordering::SeqCst);

        let requested = self.requested.read().clone();
        Ok(record
            .values
            .into_iter()
            .filter(|value| requested.iter().any(|c| c == value.command()))
            .map(TraceValue::into_sample)
            .collect())
    }

    fn bound(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn release(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn last_error(&self) -> String {
        self.last_error.read().clone()
    }

    fn protocol_name(&self) -> String {
        PROTOCOL.to_string()
    }

    fn all_commands(&self) -> Vec<String> {
        self.replay.lock().commands.clone()
    }

    fn set_requested_commands(&self, commands: &[String]) {
        let supported = self.all_commands();
        *self.requested.write() = narrow_commands(commands, &supported);
    }

    fn requested_commands(&self) -> Vec<String> {
        self.requested.read().clone()
    }
}
