//! At-most-one supervisor registry

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use obd_core::GatewayError;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::supervisor::{
    ActiveGuard, ConnectOutcome, SupervisorHandle, SupervisorLink, SupervisorSnapshot,
};

/// Holds the current supervisor handle, if any.
///
/// The last handle is kept after its supervisor stops so Status can still
/// report why it stopped; it is replaced by the next successful start.
#[derive(Default)]
pub struct SupervisorRegistry {
    slot: Mutex<Option<SupervisorHandle>>,
    active: Arc<AtomicUsize>,
}

impl SupervisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a supervisor unless one is live.
    ///
    /// `spawn` runs under the registry lock, so concurrent starts cannot
    /// both succeed.
    pub fn start<F>(&self, spawn: F) -> Result<oneshot::Receiver<ConnectOutcome>, GatewayError>
    where
        F: FnOnce(ActiveGuard) -> (SupervisorHandle, oneshot::Receiver<ConnectOutcome>),
    {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(SupervisorHandle::is_alive) {
            return Err(GatewayError::AlreadyConnected);
        }

        let (handle, gate) = spawn(ActiveGuard::acquire(&self.active));
        if slot.replace(handle).is_some() {
            debug!("Replaced stopped supervisor");
        }
        Ok(gate)
    }

    /// Link to the live supervisor
    pub fn live_link(&self) -> Option<SupervisorLink> {
        self.slot
            .lock()
            .as_ref()
            .filter(|handle| handle.is_alive())
            .map(SupervisorHandle::link)
    }

    /// Liveness and latest state of the current (or last) supervisor
    pub fn snapshot(&self) -> Option<(bool, SupervisorSnapshot)> {
        self.slot
            .lock()
            .as_ref()
            .map(|handle| (handle.is_alive(), handle.snapshot()))
    }

    /// Remove the current handle
    pub fn take(&self) -> Option<SupervisorHandle> {
        self.slot.lock().take()
    }

    /// Number of supervisor tasks still running
    pub fn active_supervisors(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}
