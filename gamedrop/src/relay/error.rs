//! Transfer failures and their classification.
//!
//! Backends map their own structured errors (I/O error kinds, FTP reply codes, SFTP status codes)
//! to a [`TransferErrorKind`] where they can. Anything they cannot place is classified from the
//! error text by [`classify_message`], which recognises the messages existing deployments have
//! learned to expect.

use std::io;

/// Coarse failure classes with an operator-facing explanation attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// The remote host name did not resolve
    HostNotFound,
    /// Refused, reset, timed out or unreachable
    ConnectionFailed,
    /// The server rejected the credentials
    Authentication,
    /// A remote directory or file does not exist (FTP 550, SFTP no-such-file)
    RemotePathNotFound,
    /// Nothing more specific is known
    Other,
}

impl TransferErrorKind {
    /// Actionable explanation for this class, if there is one.
    pub fn guidance(self) -> Option<&'static str> {
        match self {
            Self::HostNotFound => Some(
                "Remote host not found (FTP_HOST). Use the bare domain without https://, for example \
                 files.example.com, and make sure it matches the host your FTP client connects to.",
            ),
            Self::ConnectionFailed => Some(
                "The remote server (FTP/SFTP) refused or blocked the connection. Check: \
                 1) SFTP or FTP? Set FTP_USE_SFTP to match. Ports: SFTP=22, FTP=21. \
                 2) Host and port are the same as in your FTP client. \
                 3) Firewall or IP restrictions at the hosting provider.",
            ),
            Self::RemotePathNotFound => Some(
                "Remote directory not found (550). Make sure GAMES_BASE_PATH points to a directory that \
                 already exists, and create it with your FTP client if needed. For example, create games \
                 inside public_html and set GAMES_BASE_PATH=public_html/games.",
            ),
            Self::Authentication | Self::Other => None,
        }
    }
}

/// A failed remote operation: its class plus the raw text from the underlying library.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransferError {
    kind: TransferErrorKind,
    message: String,
}

impl TransferError {
    pub fn new(kind: TransferErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Use `kind` when the backend knows it, otherwise fall back to the text.
    pub fn classified(kind: Option<TransferErrorKind>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = kind.unwrap_or_else(|| classify_message(&message));
        Self { kind, message }
    }

    pub fn from_io(err: &io::Error) -> Self {
        Self::classified(kind_for_io(err), err.to_string())
    }

    pub fn kind(&self) -> TransferErrorKind {
        self.kind
    }

    /// The underlying error text, unchanged.
    pub fn raw(&self) -> &str {
        &self.message
    }

    /// What to show a user: the class guidance, or the raw text for uncatalogued errors.
    pub fn user_message(&self) -> String {
        match self.kind.guidance() {
            Some(guidance) => guidance.to_string(),
            None => self.message.clone(),
        }
    }
}

/// Structured mapping for socket-level failures.
pub fn kind_for_io(err: &io::Error) -> Option<TransferErrorKind> {
    use io::ErrorKind::*;
    match err.kind() {
        ConnectionRefused | ConnectionReset | ConnectionAborted | TimedOut | NotConnected | HostUnreachable
        | NetworkUnreachable | NetworkDown => Some(TransferErrorKind::ConnectionFailed),
        _ => None,
    }
}

const HOST_NOT_FOUND_MARKERS: &[&str] = &[
    "address lookup failed",
    "getaddrinfo",
    "unknown host",
    "enotfound",
    "failed to lookup address",
    "name or service not known",
];

const CONNECTION_MARKERS: &[&str] = &["refused", "econnrefused", "econnreset", "etimedout", "network", "unreachable"];

const PATH_MARKERS: &[&str] = &["550", "no such file or directory", "file unavailable"];

/// Whether a failed directory create was refused only because the directory is already there.
pub fn is_already_exists(raw: &str) -> bool {
    let text = raw.to_lowercase();
    text.contains("exist") && !text.contains("not exist")
}

/// Classify raw error text. Checked in order: host lookup, connectivity, missing remote path.
pub fn classify_message(raw: &str) -> TransferErrorKind {
    let text = raw.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if contains_any(HOST_NOT_FOUND_MARKERS) {
        TransferErrorKind::HostNotFound
    } else if contains_any(CONNECTION_MARKERS) {
        TransferErrorKind::ConnectionFailed
    } else if contains_any(PATH_MARKERS) {
        TransferErrorKind::RemotePathNotFound
    } else {
        TransferErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_host_lookup_failures() {
        for raw in [
            "getaddrinfo ENOTFOUND ftp.example.invalid",
            "Address lookup failed for host",
            "failed to lookup address information: Name or service not known",
        ] {
            assert_eq!(classify_message(raw), TransferErrorKind::HostNotFound, "{raw}");
        }
    }

    #[test]
    fn test_classify_connectivity_failures() {
        for raw in [
            "connect ECONNREFUSED 10.0.0.1:21",
            "read ECONNRESET",
            "Timeout (control socket) ETIMEDOUT",
            "Network is unreachable (os error 101)",
            "Connection refused (os error 111)",
        ] {
            assert_eq!(classify_message(raw), TransferErrorKind::ConnectionFailed, "{raw}");
        }
    }

    #[test]
    fn test_classify_missing_remote_path() {
        assert_eq!(classify_message("550 Failed to change directory"), TransferErrorKind::RemotePathNotFound);
        assert_eq!(classify_message("No such file or directory"), TransferErrorKind::RemotePathNotFound);
        assert_eq!(classify_message("Requested action not taken. File unavailable"), TransferErrorKind::RemotePathNotFound);
    }

    #[test]
    fn test_uncatalogued_errors_pass_through() {
        let err = TransferError::classified(None, "530 Login incorrect.");
        assert_eq!(err.kind(), TransferErrorKind::Other);
        assert_eq!(err.user_message(), "530 Login incorrect.");
        assert_eq!(err.raw(), "530 Login incorrect.");
    }

    #[test]
    fn test_econnrefused_keeps_raw_text() {
        let err = TransferError::classified(None, "connect ECONNREFUSED 127.0.0.1:21");
        assert_eq!(err.kind(), TransferErrorKind::ConnectionFailed);
        assert!(err.user_message().contains("refused or blocked"));
        assert_eq!(err.raw(), "connect ECONNREFUSED 127.0.0.1:21");
    }

    #[test]
    fn test_structured_kind_wins_over_text() {
        let err = TransferError::classified(Some(TransferErrorKind::Authentication), "550 looks like a path error");
        assert_eq!(err.kind(), TransferErrorKind::Authentication);
        assert_eq!(err.user_message(), "550 looks like a path error");
    }

    #[test]
    fn test_already_exists_replies() {
        assert!(is_already_exists("550 Create directory operation failed: File exists"));
        assert!(is_already_exists("Directory already exists"));
        assert!(!is_already_exists("550 Directory does not exist"));
        assert!(!is_already_exists("550 Permission denied"));
    }

    #[test]
    fn test_io_error_mapping() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(TransferError::from_io(&refused).kind(), TransferErrorKind::ConnectionFailed);

        let other = io::Error::other("disk quota exceeded");
        assert_eq!(TransferError::from_io(&other).kind(), TransferErrorKind::Other);
    }
}
