//! Mock transport for testing

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use obd_core::{LinkStatus, ObdTransport, SampleSet, SampleValue, TransportError};
use parking_lot::RwLock;
use tracing::debug;

use super::narrow_commands;
use crate::config::MockConfig;

const PROTOCOL: &str = "ISO 15765-4 (CAN 11/500)";

/// Mock transport producing synthetic samples.
///
/// Every knob can be changed at runtime so tests can script link loss,
/// bind failures and read errors.
pub struct MockTransport {
    config: MockConfig,
    connected: AtomicBool,
    bound: AtomicBool,
    bindable: AtomicBool,
    engine_on: AtomicBool,
    connect_failures: AtomicU32,
    failing_reads: AtomicU32,
    connect_calls: AtomicU32,
    read_calls: AtomicU64,
    requested: RwLock<Vec<String>>,
    last_error: RwLock<String>,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        let requested = config.commands.clone();
        Self {
            connected: AtomicBool::new(false),
            bound: AtomicBool::new(false),
            bindable: AtomicBool::new(config.bindable),
            engine_on: AtomicBool::new(config.engine_on),
            connect_failures: AtomicU32::new(config.connect_failures),
            failing_reads: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            read_calls: AtomicU64::new(0),
            requested: RwLock::new(requested),
            last_error: RwLock::new(String::new()),
            config,
        }
    }

    /// Set connection state without going through connect
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Whether the next connect can bind the device
    pub fn set_bindable(&self, bindable: bool) {
        self.bindable.store(bindable, Ordering::SeqCst);
    }

    pub fn set_engine_on(&self, engine_on: bool) {
        self.engine_on.store(engine_on, Ordering::SeqCst);
    }

    /// Make the next `count` connect calls fail
    pub fn set_connect_failures(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` sampling cycles fail
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn set_last_error(&self, error: impl Into<String>) {
        *self.last_error.write() = error.into();
    }

    /// Decrement `counter` if positive; returns whether it was
    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Deterministic value for `command` on sampling cycle `cycle`
fn synthetic_value(command: &str, cycle: u64) -> SampleValue {
    let step = (cycle % 60) as f64;
    match command {
        "SPEED" => SampleValue::numeric(command, step * 2.0, "kph"),
        "RPM" => SampleValue::numeric(command, 800.0 + step * 50.0, "revolutions_per_minute"),
        "COOLANT_TEMP" => SampleValue::numeric(command, 70.0 + (cycle % 20) as f64, "degC"),
        "ENGINE_LOAD" => SampleValue::numeric(command, 20.0 + step, "percent"),
        "FUEL_TYPE" => SampleValue::text(command, "Gasoline"),
        _ => SampleValue::numeric(command, cycle as f64, "count"),
    }
}

#[async_trait]
impl ObdTransport for MockTransport {
    async fn connect(&self, device_id: &str) -> bool {
        self.simulate_latency().await;
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if !self.bindable.load(Ordering::SeqCst) {
            self.bound.store(false, Ordering::SeqCst);
            self.set_last_error(format!("no rfcomm binding available for {}", device_id));
            return false;
        }
        self.bound.store(true, Ordering::SeqCst);

        if Self::take_one(&self.connect_failures) {
            self.connected.store(false, Ordering::SeqCst);
            self.set_last_error(format!("{} status: Not Connected", device_id));
            debug!(device_id, "Mock connect refused");
            return false;
        }

        self.connected.store(true, Ordering::SeqCst);
        *self.requested.write() = self.config.commands.clone();
        self.set_last_error("");
        debug!(device_id, "Mock connected");
        true
    }

    fn status(&self) -> LinkStatus {
        let connected = self.connected.load(Ordering::SeqCst);
        LinkStatus::new(connected, connected && self.engine_on.load(Ordering::SeqCst))
    }

    async fn read_sample(&self) -> Result<SampleSet, TransportError> {
        self.simulate_latency().await;
        let cycle = self.read_calls.fetch_add(1, Ordering::SeqCst);

        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if Self::take_one(&self.failing_reads) {
            let err = TransportError::ReadFailed("no response from vehicle".to_string());
            self.set_last_error(err.to_string());
            return Err(err);
        }

        Ok(self
            .requested
            .read()
            .iter()
            .map(|command| synthetic_value(command, cycle))
            .collect())
    }

    fn bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    async fn release(&self) -> Result<(), TransportError> {
        self.bound.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn last_error(&self) -> String {
        self.last_error.read().clone()
    }

    fn protocol_name(&self) -> String {
        if self.connected.load(Ordering::SeqCst) {
            PROTOCOL.to_string()
        } else {
            String::new()
        }
    }

    fn all_commands(&self) -> Vec<String> {
        self.config.commands.clone()
    }

    fn set_requested_commands(&self, commands: &[String]) {
        *self.requested.write() = narrow_commands(commands, &self.config.commands);
    }

    fn requested_commands(&self) -> Vec<String> {
        self.requested.read().clone()
    }
}
