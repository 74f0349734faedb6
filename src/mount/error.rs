//! Mount Error types

use std::path::PathBuf;

use thiserror::Error;

use crate::sftp::SftpError;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("Site {0} has no transfer credentials")]
    MissingCredentials(String),

    #[error(
        "Mounting {domain} with password authentication needs an interactive terminal; \
         re-run from a terminal or switch the site to key authentication"
    )]
    InteractiveRequired { domain: String },

    #[error("Mount helper unavailable: {0}")]
    HelperUnavailable(String),

    #[error("Mount failed for {}: {message}\n  command: {invocation}", mountpoint.display())]
    MountFailed {
        mountpoint: PathBuf,
        message: String,
        invocation: String,
    },

    #[error("Unmount failed for {}: {details}", mountpoint.display())]
    UnmountFailed { mountpoint: PathBuf, details: String },

    #[error("Could not create a mountpoint for {domain}: {details}")]
    Mountpoint { domain: String, details: String },

    #[error(transparent)]
    Path(#[from] SftpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
