use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

use crate::{api::models::upload::UploadErrorResponse, config::RemoteConfig, relay::TransferError};

/// Appended to transfer errors when SFTP is configured on the FTP port.
pub const SFTP_PORT_TIP: &str = " Tip: SFTP usually runs on port 22, try FTP_PORT=22.";

#[derive(ThisError, Debug)]
pub enum Error {
    /// The remote store is not configured well enough to attempt a transfer
    #[error("{message}")]
    Configuration { message: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// The remote store rejected or failed the transfer
    #[error("{message}")]
    Transfer { message: String, raw: String },
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    /// Wrap a relay failure, keeping the raw library text next to the explanation.
    pub fn from_transfer(err: TransferError, remote: &RemoteConfig) -> Self {
        let mut message = err.user_message();
        if remote.sftp_on_ftp_port() {
            message.push_str(SFTP_PORT_TIP);
        }
        Error::Transfer {
            message,
            raw: err.raw().to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Configuration { .. } | Error::Transfer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration { message } | Error::BadRequest { message } | Error::Transfer { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Transfer { raw, .. } => {
                tracing::error!(raw_error = %raw, "Remote transfer failed: {}", self);
            }
            Error::Configuration { .. } => {
                tracing::warn!("Configuration error: {}", self);
            }
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = UploadErrorResponse {
            error: self.user_message(),
            raw_error: match self {
                Error::Transfer { raw, .. } => Some(raw),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
