use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors produced while preparing or running a transfer.
///
/// Some variants abort the whole run (see [`TransferError::is_fatal`]), the others are
/// confined to a single host and only remove that host from the results.
#[derive(Error, Debug)]
pub enum TransferError {
    /// No usable authentication method could be resolved.
    #[error("Authentication resolution failed: {0}")]
    Auth(String),

    /// Dialing a host or negotiating its SSH/SFTP session failed.
    #[error("Connection to {host} failed: {message}")]
    Connect { host: String, message: String },

    /// Host key verification was requested but only the insecure mode exists.
    #[error("Host key verification is not supported, set `insecure_host_key_accept` to connect")]
    HostKeyPolicy,

    /// A local path could not be inspected or created before connecting.
    #[error("Local path {path:?} is unusable: {source}")]
    LocalPath {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The local fetch destination exists and is not a directory.
    #[error("Local path {0:?} cannot be a file")]
    LocalNotDirectory(PathBuf),

    /// Recursive transfers are not implemented in either direction.
    #[error("{0:?} is a directory, recursive transfer not supported")]
    RecursiveUnsupported(PathBuf),

    /// The remote source of a fetch is a directory.
    #[error("Remote path {0:?} is a directory, directory get is not supported")]
    RemoteIsDirectory(String),

    /// The server did not report the size of the remote source of a fetch.
    #[error("Remote file {0:?} has no size attribute")]
    UnknownSize(String),

    /// The remote source of a fetch exceeds the configured maximum.
    #[error("Remote file is {size} bytes, max transfer size is set to {max}")]
    TooLarge { size: u64, max: u64 },

    /// The remote target of a send already exists and overwrite is off.
    #[error("Remote file {0:?} exists")]
    RemoteExists(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local or remote I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH/SFTP protocol failure.
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),
}

impl TransferError {
    /// Creates a `Connect` error for the specified host.
    pub fn connect(host: impl Into<String>, message: impl ToString) -> Self {
        TransferError::Connect {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// Creates a `LocalPath` error for the specified path.
    pub fn local_path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::LocalPath {
            path: path.into(),
            source,
        }
    }

    /// Returns whether this error aborts the whole run rather than a single host.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::Auth(_)
                | TransferError::Connect { .. }
                | TransferError::HostKeyPolicy
                | TransferError::LocalPath { .. }
                | TransferError::LocalNotDirectory(_)
                | TransferError::RecursiveUnsupported(_)
                | TransferError::Config(_)
        )
    }
}
