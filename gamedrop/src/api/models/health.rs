use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Name reported by `/health`. Kept stable for existing uptime checks.
pub const SERVICE_NAME: &str = "games-upload-server";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            ok: true,
            service: SERVICE_NAME.to_string(),
        }
    }
}
