//! SFTP Error types

use thiserror::Error;

use crate::ssh::SshError;

#[derive(Error, Debug)]
pub enum SftpError {
    #[error("Path {path} escapes site root {root}")]
    BoundaryViolation { root: String, path: String },

    #[error("Site {0} has no transfer credentials")]
    MissingCredentials(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("SFTP subsystem not available: {0}")]
    SubsystemNotAvailable(String),

    #[error("Transfer failed: {0}")]
    TransferError(String),

    #[error("SFTP protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SshError),
}

impl SftpError {
    /// True for the "path does not exist" family, used by idempotent tree ops
    pub fn is_not_found(&self) -> bool {
        matches!(self, SftpError::FileNotFound(_))
    }
}
