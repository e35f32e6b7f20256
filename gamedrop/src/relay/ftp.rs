//! FTP (and explicit FTPS) backend built on `suppaftp`.
//!
//! The session remembers the working directory it logged in to and addresses every directory
//! and file with an absolute path below it. It never `CWD`s into upload directories, so a failed
//! transfer cannot leave later files of the same batch landing somewhere else.

use async_trait::async_trait;
use std::time::Duration;
use suppaftp::{
    FtpError, Status, async_native_tls,
    tokio::{AsyncNativeTlsConnector, AsyncNativeTlsFtpStream},
    types::FileType,
};
use tracing::{debug, instrument};

use super::{
    Protocol, RemotePath, TransferError, TransferErrorKind,
    error::kind_for_io,
    store::{RemoteConnector, RemoteSession},
};
use crate::config::RemoteConfig;

pub struct FtpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    secure: bool,
}

impl From<&RemoteConfig> for FtpConnector {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            secure: config.secure,
        }
    }
}

/// Shared hosting commonly serves FTPS with self-signed certificates.
fn tls_connector() -> AsyncNativeTlsConnector {
    AsyncNativeTlsConnector::from(
        async_native_tls::TlsConnector::new()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true),
    )
}

impl FtpConnector {
    async fn open(&self) -> Result<FtpSession, TransferError> {
        let address = format!("{}:{}", self.host, self.port);
        let mut stream = AsyncNativeTlsFtpStream::connect(address.as_str()).await.map_err(ftp_error)?;

        if self.secure {
            stream = stream.into_secure(tls_connector(), &self.host).await.map_err(ftp_error)?;
        }

        // Data connections go to the control host even if PASV advertises another address.
        stream.set_passive_nat_workaround(true);

        stream.login(&self.username, &self.password).await.map_err(ftp_error)?;
        stream.transfer_type(FileType::Binary).await.map_err(ftp_error)?;
        let home = stream.pwd().await.map_err(ftp_error)?;

        debug!(home = %home, "FTP session logged in");
        Ok(FtpSession { stream, home })
    }
}

#[async_trait]
impl RemoteConnector for FtpConnector {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    #[instrument(skip(self), fields(host = %self.host, port = self.port, secure = self.secure))]
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn RemoteSession>, TransferError> {
        match tokio::time::timeout(timeout, self.open()).await {
            Ok(session) => Ok(Box::new(session?)),
            Err(_) => Err(TransferError::new(
                TransferErrorKind::ConnectionFailed,
                format!("Timeout (ETIMEDOUT): no FTP session with {}:{} within {:?}", self.host, self.port, timeout),
            )),
        }
    }
}

struct FtpSession {
    stream: AsyncNativeTlsFtpStream,
    home: String,
}

impl FtpSession {
    fn absolute(&self, path: &RemotePath) -> Result<String, TransferError> {
        // CR/LF would terminate the FTP command early.
        if path.segments().iter().any(|s| s.contains(['\r', '\n'])) {
            return Err(TransferError::new(
                TransferErrorKind::Other,
                format!("Remote path contains a line break: {path:?}"),
            ));
        }
        Ok(path.under(&self.home))
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn create_dir(&mut self, dir: &RemotePath) -> Result<(), TransferError> {
        let target = self.absolute(dir)?;
        self.stream.mkdir(&target).await.map_err(ftp_error)
    }

    /// MKD on an existing directory is a bare 550 on many servers, so entering it is the check.
    async fn dir_exists(&mut self, dir: &RemotePath) -> Result<bool, TransferError> {
        let target = self.absolute(dir)?;
        if self.stream.cwd(&target).await.is_err() {
            return Ok(false);
        }
        self.stream.cwd(&self.home).await.map_err(ftp_error)?;
        Ok(true)
    }

    async fn write_file(&mut self, path: &RemotePath, content: &[u8]) -> Result<(), TransferError> {
        let target = self.absolute(path)?;
        let mut reader = content;
        let written = self.stream.put_file(&target, &mut reader).await.map_err(ftp_error)?;
        debug!(path = %target, bytes = written, "FTP upload complete");
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), TransferError> {
        self.stream.quit().await.map_err(ftp_error)
    }
}

fn ftp_error(err: FtpError) -> TransferError {
    let kind = match &err {
        FtpError::ConnectionError(io) => kind_for_io(io),
        FtpError::UnexpectedResponse(response) => match response.status {
            Status::FileUnavailable => Some(TransferErrorKind::RemotePathNotFound),
            Status::NotLoggedIn => Some(TransferErrorKind::Authentication),
            _ => None,
        },
        _ => None,
    };
    TransferError::classified(kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connector(port: u16, secure: bool) -> FtpConnector {
        FtpConnector {
            host: "127.0.0.1".to_string(),
            port,
            username: "deploy".to_string(),
            password: "secret".to_string(),
            secure,
        }
    }

    #[test]
    fn test_tls_connector_builds() {
        let _connector = tls_connector();
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // bind then drop to get a local port nothing listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        for secure in [false, true] {
            let err = match connector(port, secure).connect(Duration::from_secs(5)).await {
                Ok(_) => panic!("connected to a closed port"),
                Err(err) => err,
            };
            assert_eq!(err.kind(), TransferErrorKind::ConnectionFailed);
        }
    }
}
