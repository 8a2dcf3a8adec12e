//! obd-api - HTTP API for the OBD gateway
//!
//! Exposes the session protocol over HTTP. `Read` is served as a
//! Server-Sent Events stream; the other operations are plain JSON.
//!
//! # Usage
//!
//! ```ignore
//! use obd_api::{create_router, AppState};
//! use obd_session::{create_transport, Session};
//!
//! let transport = create_transport(&config.transport).await?;
//! let session = Arc::new(Session::new(transport, config.gateway)?);
//! let router = create_router(AppState::new(session));
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the gateway router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Session protocol
        .route("/obd/v1/status", get(handlers::status::get_status))
        .route("/obd/v1/connect", post(handlers::connection::connect))
        .route("/obd/v1/read", get(handlers::read::read))
        .route("/obd/v1/stop", post(handlers::connection::stop))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
