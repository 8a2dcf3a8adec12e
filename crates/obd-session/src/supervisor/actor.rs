//! Connection supervisor task

use std::sync::Arc;
use std::time::Duration;

use obd_core::{
    GatewayError, GatewayResult, LinkStatus, ObdTransport, ResponseEnvelope, SampleSet,
    StopReason, SupervisorPhase,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::handle::{
    ActiveGuard, ConnectOutcome, SupervisorCommand, SupervisorHandle, SupervisorLink,
    SupervisorSnapshot,
};
use crate::config::{GatewayConfig, QueueFullPolicy};
use crate::queue::SampleQueue;

/// Background task keeping one diagnostic connection alive and sampling it
pub struct ConnectionSupervisor {
    transport: Arc<dyn ObdTransport>,
    config: GatewayConfig,
    device_id: String,
    queue: Arc<SampleQueue>,
    commands: mpsc::UnboundedReceiver<SupervisorCommand>,
    commands_open: bool,
    state: watch::Sender<SupervisorSnapshot>,
    gate: Option<oneshot::Sender<ConnectOutcome>>,
    phase: SupervisorPhase,
    read_enabled: bool,
    shutdown_requested: bool,
    attempts: u32,
    last_error: String,
    seq: u64,
}

impl ConnectionSupervisor {
    /// Spawn a supervisor for `device_id`.
    ///
    /// The returned receiver resolves exactly once, after the first connect
    /// attempt (or immediately if the link is already up).
    pub fn spawn(
        transport: Arc<dyn ObdTransport>,
        config: GatewayConfig,
        device_id: String,
        active: ActiveGuard,
    ) -> (SupervisorHandle, oneshot::Receiver<ConnectOutcome>) {
        let queue = Arc::new(SampleQueue::new(config.queue_capacity));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SupervisorSnapshot::starting());
        let (gate_tx, gate_rx) = oneshot::channel();

        let supervisor = Self {
            transport,
            config,
            device_id,
            queue: queue.clone(),
            commands: command_rx,
            commands_open: true,
            state: state_tx,
            gate: Some(gate_tx),
            phase: SupervisorPhase::Connecting,
            read_enabled: false,
            shutdown_requested: false,
            attempts: 0,
            last_error: String::new(),
            seq: 0,
        };

        let join = tokio::spawn(supervisor.run(active));

        let link = SupervisorLink::new(queue, command_tx, state_rx);
        (SupervisorHandle::new(link, join), gate_rx)
    }

    async fn run(mut self, active: ActiveGuard) -> StopReason {
        if let Err(e) = self.transport.release().await {
            debug!(error = %e, "Releasing stale bindings failed, continuing");
        }
        info!(device_id = %self.device_id, "Connection supervisor started");

        let reason = loop {
            if self.shutdown_requested {
                break StopReason::Shutdown;
            }

            let link = self.transport.status();
            if link.connected {
                self.open_gate(link, String::new());
                if self.read_enabled {
                    self.sample_cycle().await;
                } else {
                    self.set_phase(SupervisorPhase::ConnectedIdle);
                    self.pause(self.config.idle_period(), true).await;
                }
            } else {
                match self.connect_attempt().await {
                    Ok(()) => {}
                    Err(err) if err.is_terminal() => break stop_reason(&err),
                    Err(_) => self.pause(self.config.retry_backoff(), false).await,
                }
            }
        };

        self.finish(reason, active)
    }

    /// One connect attempt. Terminal errors end the supervisor; others are
    /// retried after the backoff.
    async fn connect_attempt(&mut self) -> GatewayResult<()> {
        if self.attempts >= self.config.retry_limit {
            let err = GatewayError::RetryExhausted(self.attempts);
            error!(device_id = %self.device_id, attempts = self.attempts, "{}", err);
            self.last_error = err.to_string();
            return Err(err);
        }

        self.set_phase(SupervisorPhase::Connecting);
        let accepted = self.transport.connect(&self.device_id).await;
        self.attempts += 1;
        let link = self.transport.status();

        if !self.transport.bound() {
            let err = GatewayError::BindUnavailable(self.device_id.clone());
            error!(device_id = %self.device_id, "{}", err);
            self.last_error = err.to_string();
            self.open_gate(link, self.last_error.clone());
            return Err(err);
        }

        if link.connected {
            info!(
                device_id = %self.device_id,
                attempts = self.attempts,
                protocol = %self.transport.protocol_name(),
                "OBD link up"
            );
            self.attempts = 0;
            self.last_error.clear();
            self.open_gate(link, String::new());
            self.publish();
            return Ok(());
        }

        let detail = match self.transport.last_error() {
            e if e.is_empty() => format!("no response from {}", self.device_id),
            e => e,
        };
        let err = GatewayError::Connect(detail);
        self.last_error = err.to_string();
        warn!(
            device_id = %self.device_id,
            attempt = self.attempts,
            limit = self.config.retry_limit,
            accepted,
            error = %self.last_error,
            "Connect attempt failed"
        );
        self.open_gate(link, self.last_error.clone());
        self.publish();
        Err(err)
    }

    async fn sample_cycle(&mut self) {
        self.set_phase(SupervisorPhase::ConnectedReading);

        let (values, read_error) = match self.transport.read_sample().await {
            Ok(values) => (values, String::new()),
            Err(e) => {
                let err = GatewayError::Read(e.to_string());
                warn!(device_id = %self.device_id, error = %err, "Sampling cycle failed");
                (SampleSet::new(), err.to_string())
            }
        };

        self.seq += 1;
        let seq = self.seq;
        let envelope = ResponseEnvelope::status(self.transport.status())
            .with_seq(seq)
            .with_error(read_error)
            .with_values(values);

        match self.put(envelope).await {
            Ok(()) => {
                debug!(seq, queued = self.queue.len(), "Sample queued");
                self.pause(self.config.sample_period(), true).await;
            }
            Err(e) => match self.config.queue_full_policy {
                QueueFullPolicy::DisableReading => {
                    error!(seq, error = %e, "Sample dropped, reading disabled");
                    self.read_enabled = false;
                    self.publish();
                }
                QueueFullPolicy::SkipCycle => {
                    warn!(seq, error = %e, "Sample dropped");
                    self.pause(self.config.sample_period(), true).await;
                }
            },
        }
    }

    /// Enqueue an envelope, applying commands while blocked on a full queue
    async fn put(&mut self, envelope: ResponseEnvelope) -> GatewayResult<()> {
        let queue = self.queue.clone();
        let put = queue.put(envelope, self.config.put_timeout());
        tokio::pin!(put);

        loop {
            tokio::select! {
                result = &mut put => return result,
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => {
                        self.apply(command);
                    }
                    None => self.commands_open = false,
                },
            }
        }
    }

    /// Sleep for `period`, applying commands as they arrive.
    ///
    /// With `wake_on_change`, a command that changes the reading state or
    /// requests shutdown ends the pause early.
    async fn pause(&mut self, period: Duration, wake_on_change: bool) {
        let sleep = tokio::time::sleep(period);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return,
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => {
                        let changed = self.apply(command);
                        if changed && (wake_on_change || self.shutdown_requested) {
                            return;
                        }
                    }
                    None => self.commands_open = false,
                },
            }
        }
    }

    /// Apply a command; returns whether it changed anything
    fn apply(&mut self, command: SupervisorCommand) -> bool {
        let changed = match command {
            SupervisorCommand::EnableReading => !std::mem::replace(&mut self.read_enabled, true),
            SupervisorCommand::DisableReading => std::mem::replace(&mut self.read_enabled, false),
            SupervisorCommand::Shutdown => !std::mem::replace(&mut self.shutdown_requested, true),
        };
        if changed {
            debug!(?command, read_enabled = self.read_enabled, "Supervisor command applied");
            self.publish();
        }
        changed
    }

    fn open_gate(&mut self, link: LinkStatus, error: String) {
        if let Some(gate) = self.gate.take() {
            if gate.send(ConnectOutcome { link, error }).is_err() {
                debug!("Connect caller gone before the first attempt finished");
            }
        }
    }

    fn set_phase(&mut self, phase: SupervisorPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Supervisor phase changed");
            self.phase = phase;
            self.publish();
        }
    }

    fn publish(&self) {
        self.state.send_replace(SupervisorSnapshot {
            phase: self.phase,
            read_enabled: self.read_enabled,
            connect_attempts: self.attempts,
            last_error: self.last_error.clone(),
        });
    }

    /// The guard is released before `Stopped` is published, so a supervisor
    /// started in response to it never overlaps this one in the count.
    fn finish(mut self, reason: StopReason, active: ActiveGuard) -> StopReason {
        let link = self.transport.status();
        let error = self.last_error.clone();
        self.open_gate(link, error);
        self.read_enabled = false;
        drop(active);
        self.set_phase(SupervisorPhase::Stopped(reason));
        info!(device_id = %self.device_id, ?reason, "Connection supervisor stopped");
        reason
    }
}

fn stop_reason(err: &GatewayError) -> StopReason {
    match err {
        GatewayError::BindUnavailable(_) => StopReason::BindUnavailable,
        _ => StopReason::RetryExhausted,
    }
}
