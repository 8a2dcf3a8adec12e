//! Handle and message types for a running connection supervisor

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use obd_core::{LinkStatus, StopReason, SupervisorPhase};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::queue::SampleQueue;

/// Commands accepted by a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    EnableReading,
    DisableReading,
    /// Finish at the next wait point
    Shutdown,
}

/// State published by a supervisor after every transition
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorSnapshot {
    pub phase: SupervisorPhase,
    pub read_enabled: bool,
    /// Consecutive failed connect attempts
    pub connect_attempts: u32,
    /// Last connect or stop error (empty when none)
    pub last_error: String,
}

impl SupervisorSnapshot {
    pub(crate) fn starting() -> Self {
        Self {
            phase: SupervisorPhase::Connecting,
            read_enabled: false,
            connect_attempts: 0,
            last_error: String::new(),
        }
    }
}

/// Result of the first connect attempt, delivered once to the caller of Connect
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOutcome {
    pub link: LinkStatus,
    /// Empty when the link came up
    pub error: String,
}

/// Counts live supervisors; decremented when the task's future is dropped
pub struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl ActiveGuard {
    pub fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cloneable access to a supervisor: its queue, command channel and state
#[derive(Clone)]
pub struct SupervisorLink {
    queue: Arc<SampleQueue>,
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    snapshot: watch::Receiver<SupervisorSnapshot>,
}

impl SupervisorLink {
    pub(crate) fn new(
        queue: Arc<SampleQueue>,
        commands: mpsc::UnboundedSender<SupervisorCommand>,
        snapshot: watch::Receiver<SupervisorSnapshot>,
    ) -> Self {
        Self {
            queue,
            commands,
            snapshot,
        }
    }

    pub fn queue(&self) -> &Arc<SampleQueue> {
        &self.queue
    }

    pub fn enable_reading(&self) {
        self.send(SupervisorCommand::EnableReading);
    }

    pub fn disable_reading(&self) {
        self.send(SupervisorCommand::DisableReading);
    }

    /// Latest published state; never blocks
    pub fn query_status(&self) -> SupervisorSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the supervisor publishes a state matching `predicate`.
    ///
    /// Returns the last known state if the supervisor goes away first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> SupervisorSnapshot
    where
        F: FnMut(&SupervisorSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let matched = rx.wait_for(|s| predicate(s)).await.map(|s| s.clone());
        match matched {
            Ok(snapshot) => snapshot,
            Err(_) => rx.borrow().clone(),
        }
    }

    fn send(&self, command: SupervisorCommand) {
        if self.commands.send(command).is_err() {
            debug!(?command, "Supervisor gone, command dropped");
        }
    }
}

/// Owner of a running supervisor task.
///
/// Dropping the handle aborts the task.
pub struct SupervisorHandle {
    link: SupervisorLink,
    join: JoinHandle<StopReason>,
}

impl SupervisorHandle {
    pub(crate) fn new(link: SupervisorLink, join: JoinHandle<StopReason>) -> Self {
        Self { link, join }
    }

    pub fn link(&self) -> SupervisorLink {
        self.link.clone()
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.link.query_status()
    }

    /// Whether the supervisor task is still running
    pub fn is_alive(&self) -> bool {
        !self.join.is_finished() && !self.snapshot().phase.is_stopped()
    }

    /// Ask the supervisor to finish and wait up to `grace` for it.
    ///
    /// A transport call in flight cannot be interrupted; past the grace
    /// period the task is aborted.
    pub async fn shutdown(mut self, grace: Duration) {
        self.link.send(SupervisorCommand::Shutdown);
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(Ok(reason)) => debug!(?reason, "Supervisor finished"),
            Ok(Err(e)) => warn!(error = %e, "Supervisor task failed"),
            Err(_) => warn!(?grace, "Supervisor did not finish in time, aborting"),
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}
