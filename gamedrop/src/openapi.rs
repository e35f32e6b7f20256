//! OpenAPI document for the gateway, served with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api::{
    handlers::{connection, health, upload},
    models::{
        connection::{ConnectionConfigSummary, ConnectionTestFailure, ConnectionTestResponse},
        health::HealthResponse,
        upload::{GameUploadResponse, PreviewUploadResponse, UploadErrorResponse, UploadForm, UploadResponse},
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gamedrop",
        description = "Relays game files and preview images from browser clients to an FTP or SFTP file store."
    ),
    paths(health::health, connection::test_connection, upload::upload),
    components(schemas(
        HealthResponse,
        ConnectionConfigSummary,
        ConnectionTestResponse,
        ConnectionTestFailure,
        UploadForm,
        GameUploadResponse,
        PreviewUploadResponse,
        UploadResponse,
        UploadErrorResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "connection", description = "Remote store connectivity"),
        (name = "upload", description = "File uploads"),
    )
)]
pub struct ApiDoc;
