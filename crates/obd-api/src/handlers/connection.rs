//! Connect and Stop handlers

use axum::extract::State;
use axum::Json;
use obd_core::ResponseEnvelope;
use serde::Deserialize;

use crate::state::AppState;

/// Request body for connect
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    /// Device address; empty means the configured default device
    #[serde(default, alias = "mac")]
    pub device_id: String,
}

/// POST /obd/v1/connect
///
/// Blocks until the first connect attempt finished.
pub async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Json<ResponseEnvelope> {
    Json(state.session().connect(&request.device_id).await)
}

/// POST /obd/v1/stop
pub async fn stop(State(state): State<AppState>) -> Json<ResponseEnvelope> {
    Json(state.session().stop())
}
