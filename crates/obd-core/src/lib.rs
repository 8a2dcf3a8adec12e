//! obd-core - Core traits and types for the OBD gateway
//!
//! This crate provides the data model shared by the session machinery and the
//! API layer, the gateway error taxonomy, and the [`ObdTransport`] trait that
//! concrete diagnostic adapters implement.

pub mod error;
pub mod models;
pub mod transport;

pub use error::{GatewayError, GatewayResult};
pub use models::*;
pub use transport::{ObdTransport, TransportError};
