use axum::{Json, extract::State, http::StatusCode};
use tracing::{error, info, instrument};

use crate::{
    AppState,
    api::models::connection::{ConnectionConfigSummary, ConnectionTestFailure, ConnectionTestResponse},
};

pub const MISSING_CREDENTIALS: &str = "FTP_HOST or FTP_USER is not set";
pub const CONNECTION_OK: &str = "Connection succeeded";
pub const SFTP_PORT_HINT: &str = "SFTP usually runs on port 22, try FTP_PORT=22.";

/// Check the remote store credentials
///
/// Opens one session with the configured credentials and closes it again. Nothing is written.
#[utoipa::path(
    get,
    path = "/test-connection",
    tag = "connection",
    summary = "Test remote connection",
    responses(
        (status = 200, description = "Connected and logged in", body = ConnectionTestResponse),
        (status = 400, description = "Remote host or user not configured", body = ConnectionTestFailure),
        (status = 500, description = "Connecting or logging in failed", body = ConnectionTestFailure),
    )
)]
#[instrument(skip_all)]
pub async fn test_connection(
    State(state): State<AppState>,
) -> Result<Json<ConnectionTestResponse>, (StatusCode, Json<ConnectionTestFailure>)> {
    let remote = &state.config.remote;
    if !remote.is_configured() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ConnectionTestFailure::new(MISSING_CREDENTIALS, None)),
        ));
    }

    match state.relay.test_connection().await {
        Ok(()) => {
            info!(host = %remote.host, port = remote.port, protocol = %remote.protocol(), "Connection test succeeded");
            Ok(Json(ConnectionTestResponse {
                ok: true,
                message: CONNECTION_OK.to_string(),
                config: ConnectionConfigSummary::from(state.config.as_ref()),
            }))
        }
        Err(err) => {
            error!(error = %err, "Connection test failed");
            let hint = remote.sftp_on_ftp_port().then(|| SFTP_PORT_HINT.to_string());
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ConnectionTestFailure::new(err.raw(), hint)),
            ))
        }
    }
}
