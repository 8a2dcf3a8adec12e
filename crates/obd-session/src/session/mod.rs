//! Session protocol: Status / Connect / Read / Stop
//!
//! A [`Session`] mediates between callers and at most one live
//! [`ConnectionSupervisor`]. Errors never escape as faults; they are
//! reported in the `error` field of the returned envelopes.

mod registry;

pub use registry::SupervisorRegistry;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use obd_core::{
    CommandListRequest, GatewayError, GatewayResult, ObdTransport, ReadState, ResponseEnvelope,
    StatusReport,
};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::supervisor::{ConnectOutcome, ConnectionSupervisor, SupervisorLink};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Which Read currently owns the queue, and whether it was asked to stop.
///
/// Every Read takes a new generation; a stream ends once the generation
/// moves past its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ReadTurn {
    generation: u64,
    stopped: bool,
}

/// Gateway session over one transport
pub struct Session {
    transport: Arc<dyn ObdTransport>,
    config: GatewayConfig,
    registry: SupervisorRegistry,
    read_turn: watch::Sender<ReadTurn>,
    device_id: RwLock<Option<String>>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn ObdTransport>,
        config: GatewayConfig,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let (read_turn, _) = watch::channel(ReadTurn::default());
        Ok(Self {
            transport,
            device_id: RwLock::new(config.device_id.clone()),
            config,
            registry: SupervisorRegistry::new(),
            read_turn,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current link and reading state. Never blocks and never touches the
    /// supervisor.
    pub fn status(&self, commands: Option<CommandListRequest>) -> StatusReport {
        let link = self.transport.status();
        let supervisor = self.registry.snapshot();

        let state = match &supervisor {
            Some((true, snapshot)) if snapshot.read_enabled => ReadState::Run,
            Some((true, _)) => ReadState::Idle,
            _ => ReadState::Inactive,
        };
        let error = supervisor
            .as_ref()
            .map(|(_, snapshot)| snapshot.last_error.clone())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.transport.last_error());

        StatusReport {
            connected: link.connected,
            engine_on: link.engine_on,
            state,
            phase: supervisor.as_ref().map(|(_, snapshot)| snapshot.phase),
            connect_attempts: supervisor
                .as_ref()
                .map(|(_, snapshot)| snapshot.connect_attempts)
                .unwrap_or(0),
            protocol: link.connected.then(|| self.transport.protocol_name()),
            device_id: self.device_id.read().clone(),
            autoconnect: self.config.autoconnect,
            commands: match commands {
                Some(_) if !link.connected => None,
                Some(CommandListRequest::Vehicle) => Some(self.transport.all_commands()),
                Some(CommandListRequest::Actual) => Some(self.transport.requested_commands()),
                None => None,
            },
            error,
        }
    }

    /// Start a supervisor for `device_id` and wait for its first connect
    /// attempt.
    ///
    /// An empty `device_id` uses the configured default device.
    pub async fn connect(&self, device_id: &str) -> ResponseEnvelope {
        let Some(device_id) = self.resolve_device(device_id) else {
            let err = GatewayError::Connect("no device identifier given".to_string());
            warn!(error = %err, "Connect rejected");
            return ResponseEnvelope::status(self.transport.status()).with_error(err.to_string());
        };

        let started = self.registry.start(|active| {
            ConnectionSupervisor::spawn(
                self.transport.clone(),
                self.config.clone(),
                device_id.clone(),
                active,
            )
        });
        let gate = match started {
            Ok(gate) => gate,
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Connect rejected");
                return ResponseEnvelope::status(self.transport.status())
                    .with_error(e.to_string());
            }
        };

        info!(device_id = %device_id, "Connecting");
        let outcome = gate.await.unwrap_or_else(|_| ConnectOutcome {
            link: self.transport.status(),
            error: GatewayError::Connect("supervisor ended before connecting".to_string())
                .to_string(),
        });
        if outcome.link.connected {
            *self.device_id.write() = Some(device_id);
        }

        ResponseEnvelope::status(outcome.link).with_error(outcome.error)
    }

    /// Stream envelopes from the live supervisor until [`Session::stop`].
    ///
    /// Set-up happens before this returns; envelopes are produced as the
    /// stream is polled. Without a live supervisor (and no autoconnect) the
    /// stream yields a single `Unactivated` envelope.
    ///
    /// A new Read replaces any earlier stream, which ends without draining.
    pub async fn read(
        &self,
        commands: Option<Vec<String>>,
    ) -> BoxStream<'static, ResponseEnvelope> {
        let link = match self.registry.live_link() {
            Some(link) => link,
            None => match self.autoconnect().await {
                Ok(link) => link,
                Err(envelope) => return stream::once(async move { envelope }).boxed(),
            },
        };

        if let Some(commands) = commands.filter(|c| !c.is_empty()) {
            self.transport.set_requested_commands(&commands);
            info!(
                requested = commands.len(),
                active = self.transport.requested_command_count(),
                "Command set narrowed"
            );
        }

        let mut generation = 0;
        self.read_turn.send_modify(|turn| {
            turn.generation += 1;
            turn.stopped = false;
            generation = turn.generation;
        });
        link.enable_reading();
        read_stream(link, self.read_turn.subscribe(), generation).boxed()
    }

    /// Ask the in-progress Read to drain and finish.
    ///
    /// Disables reading on the supervisor but never stops it. Does not wait
    /// for the drain.
    pub fn stop(&self) -> ResponseEnvelope {
        self.read_turn.send_modify(|turn| turn.stopped = true);
        let reply = ResponseEnvelope::status(self.transport.status());

        let Some(link) = self.registry.live_link() else {
            debug!("Stop without a live supervisor");
            return reply.with_error(GatewayError::Unactivated.to_string());
        };
        link.disable_reading();
        info!("Stop requested");
        reply.with_error(self.transport.last_error())
    }

    /// Stop the supervisor and release transport bindings
    pub async fn shutdown(&self) {
        self.read_turn.send_modify(|turn| turn.stopped = true);
        if let Some(handle) = self.registry.take() {
            handle.shutdown(SHUTDOWN_GRACE).await;
        }
        if let Err(e) = self.transport.release().await {
            warn!(error = %e, "Releasing transport bindings failed");
        }
        info!("Session shut down");
    }

    /// Number of supervisor tasks still running
    pub fn active_supervisors(&self) -> usize {
        self.registry.active_supervisors()
    }

    fn resolve_device(&self, device_id: &str) -> Option<String> {
        if device_id.is_empty() {
            self.device_id.read().clone().filter(|id| !id.is_empty())
        } else {
            Some(device_id.to_string())
        }
    }

    async fn autoconnect(&self) -> Result<SupervisorLink, ResponseEnvelope> {
        let unactivated =
            || ResponseEnvelope::rejected(GatewayError::Unactivated.to_string());
        if !self.config.autoconnect {
            warn!("Read without a live supervisor");
            return Err(unactivated());
        }
        let Some(device_id) = self.resolve_device("") else {
            warn!("Read without a live supervisor and no known device");
            return Err(unactivated());
        };

        info!(device_id = %device_id, "Autoconnecting before read");
        let reply = self.connect(&device_id).await;
        self.registry.live_link().ok_or_else(|| {
            if reply.has_error() {
                reply
            } else {
                unactivated()
            }
        })
    }
}

fn read_stream(
    link: SupervisorLink,
    mut turn: watch::Receiver<ReadTurn>,
    generation: u64,
) -> impl futures::Stream<Item = ResponseEnvelope> + Send + 'static {
    let stream_id = Uuid::new_v4();
    async_stream::stream! {
        debug!(%stream_id, generation, "Read stream started");
        let drain = loop {
            let current = *turn.borrow_and_update();
            if current.generation != generation {
                break false;
            }
            if current.stopped || turn.has_changed().is_err() {
                break true;
            }
            let next = tokio::select! {
                biased;
                _ = turn.changed() => None,
                envelope = link.queue().get() => Some(envelope),
            };
            if let Some(envelope) = next {
                yield envelope;
            }
        };

        // Only what was buffered when the stop was observed
        let pending = if drain { link.queue().len() } else { 0 };
        for _ in 0..pending {
            match link.queue().try_get().await {
                Some(envelope) => {
                    yield envelope;
                }
                None => break,
            }
        }
        debug!(%stream_id, drained = pending, superseded = !drain, "Read stream finished");
    }
}
