//! Axum route handlers.
//!
//! - [`health`]: liveness probe
//! - [`connection`]: remote store connectivity check
//! - [`upload`]: multipart intake and hand-off to the [`crate::relay::Relay`]
//!
//! Upload failures are returned as [`crate::errors::Error`], which renders the `{error, rawError}`
//! body. The connection check keeps its own `{ok, error, hint}` body.

pub mod connection;
pub mod health;
pub mod upload;
