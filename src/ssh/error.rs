//! Transport errors

use thiserror::Error;

/// Failures while establishing an authenticated transport
#[derive(Error, Debug)]
pub enum SshError {
    /// Name resolution, TCP or handshake failure
    #[error("Cannot reach SSH server: {0}")]
    ConnectionFailed(String),

    #[error("SSH authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Private key unreadable or passphrase wrong
    #[error("Cannot load private key {0}")]
    KeyError(String),

    #[error("SSH connect timed out: {0}")]
    Timeout(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ConnectionFailed(err.to_string())
    }
}
