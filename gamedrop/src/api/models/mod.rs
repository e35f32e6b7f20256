//! Request and response bodies. Field names follow the JSON contract existing browser clients
//! already use, hence the camelCase renames.

pub mod connection;
pub mod health;
pub mod upload;
