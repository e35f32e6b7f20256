use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Config;

/// Where uploads will land and over which protocol.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfigSummary {
    pub games_path: String,
    pub preview_images_path: String,
    /// `FTP` or `SFTP`
    pub protocol: String,
}

impl From<&Config> for ConnectionConfigSummary {
    fn from(config: &Config) -> Self {
        Self {
            games_path: config.paths.games.clone(),
            preview_images_path: config.paths.preview_images.clone(),
            protocol: config.remote.protocol().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub ok: bool,
    pub message: String,
    pub config: ConnectionConfigSummary,
}

/// Failure body. `error` is the raw library text, unclassified.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestFailure {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ConnectionTestFailure {
    pub fn new(error: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            hint,
        }
    }
}
