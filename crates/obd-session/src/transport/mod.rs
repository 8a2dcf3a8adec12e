//! Built-in transports
//!
//! - Mock transport producing synthetic samples (tests, demos)
//! - Simulator replaying a recorded JSON-lines trace
//!
//! # Example
//!
//! ```ignore
//! use obd_session::transport::create_transport;
//! use obd_session::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config).await?;
//! let connected = transport.connect("00:11:22:33:44:55").await;
//! ```

pub mod mock;
pub mod simulator;

use std::sync::Arc;

use obd_core::{ObdTransport, TransportError};

use crate::config::TransportConfig;

/// Create a transport based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn ObdTransport>, TransportError> {
    match config {
        TransportConfig::Mock(cfg) => {
            let transport = mock::MockTransport::new(cfg.clone());
            Ok(Arc::new(transport))
        }
        TransportConfig::Simulator(cfg) => {
            let transport = simulator::SimulatorTransport::new(cfg)?;
            Ok(Arc::new(transport))
        }
    }
}

/// Keep the requested commands that `supported` knows, in request order, once each
pub(crate) fn narrow_commands(requested: &[String], supported: &[String]) -> Vec<String> {
    let mut narrowed: Vec<String> = Vec::with_capacity(requested.len());
    for command in requested {
        if supported.contains(command) && !narrowed.contains(command) {
            narrowed.push(command.clone());
        }
    }
    narrowed
}
