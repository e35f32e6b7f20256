//! SFTP backend built on `russh` and `russh-sftp`.
//!
//! Paths are absolute from `/`, which on chrooted hosting accounts is the account root.

use async_trait::async_trait;
use russh::{
    Disconnect,
    client::{self, AuthResult},
    keys::ssh_key,
};
use russh_sftp::{client::SftpSession as Sftp, protocol::StatusCode};
use std::{sync::Arc, time::Duration};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{
    Protocol, RemotePath, TransferError, TransferErrorKind,
    error::kind_for_io,
    store::{RemoteConnector, RemoteSession},
};
use crate::config::RemoteConfig;

const ANCHOR: &str = "/";

pub struct SftpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl From<&RemoteConfig> for SftpConnector {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

/// Host keys are not pinned; the store is identified by host name and password login only.
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &ssh_key::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

impl SftpConnector {
    async fn open(&self, timeout: Duration) -> Result<SftpSession, TransferError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(timeout),
            ..Default::default()
        });

        let mut handle = client::connect(config, (self.host.as_str(), self.port), ClientHandler)
            .await
            .map_err(ssh_error)?;

        let auth = handle
            .authenticate_password(self.username.as_str(), self.password.as_str())
            .await
            .map_err(ssh_error)?;
        if !matches!(auth, AuthResult::Success) {
            return Err(TransferError::new(
                TransferErrorKind::Authentication,
                format!("All configured authentication methods failed for user {}", self.username),
            ));
        }

        let channel = handle.channel_open_session().await.map_err(ssh_error)?;
        channel.request_subsystem(true, "sftp").await.map_err(ssh_error)?;
        let sftp = Sftp::new(channel.into_stream()).await.map_err(sftp_error)?;

        debug!("SFTP subsystem ready");
        Ok(SftpSession { sftp, handle })
    }
}

#[async_trait]
impl RemoteConnector for SftpConnector {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn RemoteSession>, TransferError> {
        match tokio::time::timeout(timeout, self.open(timeout)).await {
            Ok(session) => Ok(Box::new(session?)),
            Err(_) => Err(TransferError::new(
                TransferErrorKind::ConnectionFailed,
                format!("Timeout (ETIMEDOUT): no SFTP session with {}:{} within {:?}", self.host, self.port, timeout),
            )),
        }
    }
}

struct SftpSession {
    sftp: Sftp,
    handle: client::Handle<ClientHandler>,
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn create_dir(&mut self, dir: &RemotePath) -> Result<(), TransferError> {
        self.sftp.create_dir(dir.under(ANCHOR)).await.map_err(sftp_error)
    }

    async fn dir_exists(&mut self, dir: &RemotePath) -> Result<bool, TransferError> {
        self.sftp.try_exists(dir.under(ANCHOR)).await.map_err(sftp_error)
    }

    async fn write_file(&mut self, path: &RemotePath, content: &[u8]) -> Result<(), TransferError> {
        let target = path.under(ANCHOR);
        let mut file = self.sftp.create(target.as_str()).await.map_err(sftp_error)?;
        file.write_all(content).await.map_err(|e| TransferError::from_io(&e))?;
        file.shutdown().await.map_err(|e| TransferError::from_io(&e))?;
        debug!(path = %target, bytes = content.len(), "SFTP upload complete");
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), TransferError> {
        let closed = self.sftp.close().await.map_err(sftp_error);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(ssh_error)?;
        closed
    }
}

fn ssh_error(err: russh::Error) -> TransferError {
    let kind = match &err {
        russh::Error::IO(io) => kind_for_io(io),
        russh::Error::ConnectionTimeout | russh::Error::KeepaliveTimeout | russh::Error::InactivityTimeout => {
            Some(TransferErrorKind::ConnectionFailed)
        }
        russh::Error::NotAuthenticated => Some(TransferErrorKind::Authentication),
        _ => None,
    };
    TransferError::classified(kind, err.to_string())
}

fn sftp_error(err: russh_sftp::client::error::Error) -> TransferError {
    let kind = match &err {
        russh_sftp::client::error::Error::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => Some(TransferErrorKind::RemotePathNotFound),
            _ => None,
        },
        _ => None,
    };
    TransferError::classified(kind, err.to_string())
}
