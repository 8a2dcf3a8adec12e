//! obd-session - Connection supervision and session protocol for the OBD gateway
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │   Status / Connect / Read / Stop                             │
//! │                                                              │
//! │   ┌────────────────────┐        ┌──────────────────────────┐ │
//! │   │ SupervisorRegistry │ holds  │ SupervisorHandle         │ │
//! │   │ (at most one live) │──────► │ commands ─► actor task   │ │
//! │   └────────────────────┘        │ snapshot ◄─ actor task   │ │
//! │                                 └────────────┬─────────────┘ │
//! │      Read stream ◄── get() ── SampleQueue ◄── put() ─┘       │
//! │                                      ▲                       │
//! │                          ConnectionSupervisor                │
//! │                                      │                       │
//! │                              Arc<dyn ObdTransport>           │
//! │                              (mock / simulator)              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod queue;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::{GatewayConfig, QueueFullPolicy, TransportConfig};
pub use queue::SampleQueue;
pub use session::{Session, SupervisorRegistry};
pub use supervisor::{ConnectOutcome, ConnectionSupervisor, SupervisorHandle, SupervisorSnapshot};
pub use transport::create_transport;

// Re-export for convenience
pub use obd_core::{
    GatewayError, LinkStatus, ObdTransport, ReadState, ResponseEnvelope, SampleSet, SampleValue,
    StatusReport, SupervisorPhase, TransportError,
};
