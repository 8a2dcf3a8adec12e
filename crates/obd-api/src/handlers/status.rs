//! Status handler

use axum::extract::{Query, State};
use axum::Json;
use obd_core::{CommandListRequest, StatusReport};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for status
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// `vehicle_cmds` or `actual_cmds`
    pub request: Option<String>,
}

/// GET /obd/v1/status
///
/// Example: GET /obd/v1/status?request=actual_cmds
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusReport>, ApiError> {
    let commands = query
        .request
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(parse_command_list)
        .transpose()?;

    Ok(Json(state.session().status(commands)))
}

fn parse_command_list(request: &str) -> Result<CommandListRequest, ApiError> {
    match request {
        "vehicle_cmds" => Ok(CommandListRequest::Vehicle),
        "actual_cmds" => Ok(CommandListRequest::Actual),
        other => Err(ApiError::BadRequest(format!(
            "Unknown command list '{}', expected vehicle_cmds or actual_cmds",
            other
        ))),
    }
}
