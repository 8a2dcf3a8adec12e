//! Connection supervision
//!
//! A [`ConnectionSupervisor`] is a background task owning one diagnostic
//! connection: it drives connect retries, runs the sampling cycles while
//! reading is enabled, and is the sole producer into its [`SampleQueue`].
//! The session talks to it only through a [`SupervisorHandle`].
//!
//! ```text
//!            ┌──────────── EnableReading / DisableReading / Shutdown
//!            │
//!  Connecting ──connect ok──► ConnectedIdle ◄──────► ConnectedReading
//!      │  ▲                        │                       │
//!      │  └────── link lost ───────┴───────────────────────┘
//!      │
//!      └── retries exhausted / no binding ──► Stopped(reason)
//! ```
//!
//! [`SampleQueue`]: crate::queue::SampleQueue

mod actor;
mod handle;

pub use actor::ConnectionSupervisor;
pub use handle::{
    ActiveGuard, ConnectOutcome, SupervisorCommand, SupervisorHandle, SupervisorLink,
    SupervisorSnapshot,
};
