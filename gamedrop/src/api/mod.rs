//! HTTP surface of the gateway.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! # Routes
//!
//! - `GET /health`: liveness, never touches the remote store
//! - `GET /test-connection`: opens and closes one remote session
//! - `POST /upload`: multipart upload of game files or a single preview image
//! - `GET /docs`: OpenAPI reference rendered with Scalar

pub mod handlers;
pub mod models;
