//! # gamedrop: upload gateway for game assets
//!
//! `gamedrop` accepts multipart uploads from a browser-based game catalogue and relays the files
//! to a classic hosting account over FTP, FTPS or SFTP. Browsers cannot speak those protocols;
//! the gateway holds the credentials and does it for them.
//!
//! ## Request Flow
//!
//! A `POST /upload` is read completely into memory, validated, and handed to the
//! [`relay::Relay`]. The relay opens one session against the remote store, creates any missing
//! directories one segment at a time, writes the files in request order and closes the session.
//! The first failure aborts the batch; its raw text and a classified explanation go back to the
//! client.
//!
//! Two placement modes exist. In structured mode (the default) every file of a request goes to
//! `<games base>/<category>/<gameName>/`, with all three caller-supplied names sanitized into
//! single path segments. In flat mode (`upload.flat`) each file goes to the relative path the
//! client sent alongside it, so a whole folder tree can be uploaded as-is.
//!
//! ## Configuration
//!
//! See [`config`]. Existing deployments configured purely through `FTP_*` environment variables
//! in a `.env` file keep working unchanged.
//!
//! ## Testing
//!
//! The [`test_utils`] module (behind the `test-utils` feature) provides an in-memory remote
//! store that records every call, so the HTTP layer can be exercised without an FTP server.

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod relay;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{get, post},
};
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::CorsOrigin;
use openapi::ApiDoc;
use relay::{Relay, RemoteConnector, create_connector};

/// Shared state for all handlers. Built once at startup and never mutated.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Relay,
}

/// Build the CORS layer. With no configured origins the request's `Origin` is echoed back, so
/// any site can call the gateway.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;

    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else if origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::from(Any)
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers(AllowHeaders::mirror_request());

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the router with all endpoints, the API reference and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;
    let upload_limit = state.config.upload.max_body_size;

    let router = Router::new()
        .route("/health", get(api::handlers::health::health))
        .route("/test-connection", get(api::handlers::connection::test_connection))
        .route(
            "/upload",
            post(api::handlers::upload::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(cors),
        );

    Ok(router)
}

/// Report what the gateway will talk to, and warn about settings that cannot work.
fn log_startup(config: &Config) {
    let remote = &config.remote;
    info!(
        protocol = %remote.protocol(),
        host = %remote.host,
        port = remote.port,
        secure = remote.secure,
        flat = config.upload.flat,
        "Remote store: {}:{}",
        remote.host,
        remote.port
    );
    info!(games = %config.paths.games, preview_images = %config.paths.preview_images, "Remote base paths");

    if !remote.is_configured() {
        warn!("FTP_HOST or FTP_USER is not set; uploads will fail until the remote store is configured");
    }
    if remote.sftp_on_ftp_port() {
        warn!("SFTP is enabled on port 21; SFTP normally listens on port 22 (set FTP_PORT=22)");
    }
}

/// The gateway: configuration plus a ready router.
///
/// ```ignore
/// let app = Application::new(config)?;
/// app.serve(shutdown_signal()).await?;
/// ```
pub struct Application {
    router: Router,
    config: Arc<Config>,
}

impl Application {
    /// Create the application against the configured FTP or SFTP store.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let connector = create_connector(&config.remote);
        Self::with_connector(config, connector)
    }

    /// Create the application against any remote store implementation.
    pub fn with_connector(config: Config, connector: Arc<dyn RemoteConnector>) -> anyhow::Result<Self> {
        debug!("Starting upload gateway with configuration: {:#?}", config);
        log_startup(&config);

        let config = Arc::new(config);
        let state = AppState::builder()
            .relay(Relay::new(connector, &config))
            .config(config.clone())
            .build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Upload gateway listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
