//! Remote store abstraction.
//!
//! A [`RemoteConnector`] opens sessions; a [`RemoteSession`] is one authenticated connection that
//! lives for exactly one request. FTP and SFTP each implement the pair, and
//! [`create_connector`] is the single place configuration picks between them.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{Protocol, RemotePath, TransferError, error::is_already_exists, ftp::FtpConnector, sftp::SftpConnector};
use crate::config::RemoteConfig;

/// Opens sessions against one configured remote store.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Connect and authenticate. `timeout` bounds the whole handshake.
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn RemoteSession>, TransferError>;
}

/// One open connection. Paths are resolved against the session's anchor directory.
#[async_trait]
pub trait RemoteSession: Send {
    /// Create a single directory whose parent already exists.
    async fn create_dir(&mut self, dir: &RemotePath) -> Result<(), TransferError>;

    /// Whether `dir` exists as a directory.
    async fn dir_exists(&mut self, dir: &RemotePath) -> Result<bool, TransferError>;

    /// Write `content` to `path`, replacing any existing file.
    async fn write_file(&mut self, path: &RemotePath, content: &[u8]) -> Result<(), TransferError>;

    /// Log out and release the connection.
    async fn close(self: Box<Self>) -> Result<(), TransferError>;
}

/// Create `dir` unless it is already there.
///
/// A failed create is tolerated when the server says the directory exists or, for servers whose
/// reply does not say, when a follow-up check finds it. Any other failure is returned unchanged.
pub async fn create_dir_if_missing(session: &mut dyn RemoteSession, dir: &RemotePath) -> Result<(), TransferError> {
    let Err(err) = session.create_dir(dir).await else {
        return Ok(());
    };

    if is_already_exists(err.raw()) {
        return Ok(());
    }
    if let Ok(true) = session.dir_exists(dir).await {
        debug!(dir = %dir, "Directory already exists");
        return Ok(());
    }
    Err(err)
}

/// Create the connector for the configured protocol.
pub fn create_connector(config: &RemoteConfig) -> Arc<dyn RemoteConnector> {
    match config.protocol() {
        Protocol::Ftp => Arc::new(FtpConnector::from(config)),
        Protocol::Sftp => Arc::new(SftpConnector::from(config)),
    }
}
