//! SFTP Session management
//!
//! One [`SftpSession`] owns one SSH transport and its `sftp` subsystem for
//! the duration of a single top-level operation. Use [`with_session`] so the
//! transport is released on every exit path.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::Handle;
use russh::Disconnect;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::fs::Metadata;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::StatusCode;
use tracing::{debug, info, warn};

use super::error::SftpError;
use super::path_utils::join_remote_path;
use super::remote_fs::{RemoteFs, RemoteWriter};
use super::types::{FileInfo, FileType};
use crate::ssh::{ClientHandler, SshClient, TransferCredentials};

/// SFTP Session wrapper
pub struct SftpSession {
    /// russh SFTP session
    sftp: RusshSftpSession,
    /// Transport the subsystem runs on
    handle: Handle<ClientHandler>,
    /// `user@host:port`, for logs
    label: String,
    released: bool,
}

impl SftpSession {
    /// Open a transport and the SFTP subsystem on it
    pub async fn connect(credentials: &TransferCredentials) -> Result<Self, SftpError> {
        let label = format!("{}@{}", credentials.username, credentials.address());
        let handle = SshClient::new(credentials.clone()).connect().await?;

        info!("Opening SFTP subsystem for {}", label);
        let sftp = open_on(&handle, &label, Self::open_subsystem(&handle)).await?;
        info!("SFTP subsystem opened for {}", label);

        Ok(Self {
            sftp,
            handle,
            label,
            released: false,
        })
    }

    async fn open_subsystem(handle: &Handle<ClientHandler>) -> Result<RusshSftpSession, SftpError> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::SubsystemNotAvailable(format!("Failed to open channel: {}", e)))?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SftpError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::SubsystemNotAvailable(e.to_string()))
    }

    fn to_info(path: &str, metadata: &Metadata) -> FileInfo {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let file_type = if metadata.is_dir() {
            FileType::Directory
        } else if metadata.is_symlink() {
            FileType::Symlink
        } else if metadata.is_regular() {
            FileType::File
        } else {
            FileType::Unknown
        };

        FileInfo {
            name,
            path: path.to_string(),
            file_type,
            size: metadata.size.unwrap_or(0),
            modified: metadata.mtime.map(|t| t as i64).unwrap_or(0),
        }
    }

    /// Map SFTP errors to our error type
    fn map_sftp_error(err: SftpErrorInner, path: &str) -> SftpError {
        if let SftpErrorInner::Status(ref status) = err {
            match status.status_code {
                StatusCode::NoSuchFile => return SftpError::FileNotFound(path.to_string()),
                StatusCode::PermissionDenied => {
                    return SftpError::PermissionDenied(path.to_string())
                }
                _ => {}
            }
        }
        let err_str = err.to_string();
        if err_str.contains("No such file") || err_str.contains("not found") {
            SftpError::FileNotFound(path.to_string())
        } else if err_str.contains("Permission denied") {
            SftpError::PermissionDenied(path.to_string())
        } else {
            SftpError::ProtocolError(format!("{}: {}", path, err_str))
        }
    }

    fn absent_as_none(
        result: Result<Metadata, SftpErrorInner>,
        path: &str,
    ) -> Result<Option<FileInfo>, SftpError> {
        match result {
            Ok(metadata) => Ok(Some(Self::to_info(path, &metadata))),
            Err(e) => match Self::map_sftp_error(e, path) {
                SftpError::FileNotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        if !self.released {
            // russh closes the transport when the handle goes away
            warn!("SFTP session {} dropped without release", self.label);
        }
    }
}

/// An authenticated transport that can be torn down
#[async_trait]
pub trait Transport: Send + Sync {
    async fn close_transport(&self, label: &str);
}

#[async_trait]
impl Transport for Handle<ClientHandler> {
    async fn close_transport(&self, label: &str) {
        if let Err(e) = self.disconnect(Disconnect::ByApplication, "", "en").await {
            debug!("Disconnect for {} returned: {}", label, e);
        }
    }
}

/// Await `open` on an established transport, closing the transport when it fails
async fn open_on<H, T, Fut>(transport: &H, label: &str, open: Fut) -> Result<T, SftpError>
where
    H: Transport + ?Sized,
    Fut: Future<Output = Result<T, SftpError>>,
{
    match open.await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("SFTP setup for {} failed, disconnecting: {}", label, e);
            transport.close_transport(label).await;
            Err(e)
        }
    }
}

/// A session that must be released exactly once when its operation ends
#[async_trait]
pub trait ScopedSession: Send + Sync + Sized {
    async fn release(self);
}

#[async_trait]
impl ScopedSession for SftpSession {
    /// Close the subsystem and disconnect the transport
    async fn release(mut self) {
        if let Err(e) = self.sftp.close().await {
            debug!("SFTP close for {} returned: {}", self.label, e);
        }
        self.handle.close_transport(&self.label).await;
        self.released = true;
        info!("Released SFTP session {}", self.label);
    }
}

#[async_trait]
impl RemoteFs for SftpSession {
    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, SftpError> {
        debug!("Getting file info: {}", path);
        Self::absent_as_none(self.sftp.metadata(path).await, path)
    }

    async fn lstat(&self, path: &str) -> Result<Option<FileInfo>, SftpError> {
        Self::absent_as_none(self.sftp.symlink_metadata(path).await, path)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, SftpError> {
        debug!("Listing directory: {}", path);

        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| Self::map_sftp_error(e, path))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let full_path = join_remote_path(path, &name);
            entries.push(Self::to_info(&full_path, &entry.metadata()));
        }

        debug!("Listed {} entries in {}", entries.len(), path);
        Ok(entries)
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        info!("Creating directory: {}", path);
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| Self::map_sftp_error(e, path))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        info!("Deleting file: {}", path);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| Self::map_sftp_error(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        info!("Deleting directory: {}", path);
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| Self::map_sftp_error(e, path))
    }

    async fn create_file(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        debug!("Creating remote file: {}", path);
        let file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| Self::map_sftp_error(e, path))?;
        Ok(Box::new(file))
    }
}

/// Run `op` on a freshly connected session and release it afterwards,
/// whether `op` succeeded or not.
pub async fn with_session<T, F, Fut>(
    credentials: &TransferCredentials,
    op: F,
) -> Result<T, SftpError>
where
    F: FnOnce(Arc<SftpSession>) -> Fut,
    Fut: Future<Output = Result<T, SftpError>>,
{
    let session = SftpSession::connect(credentials).await?;
    run_scoped(session, op).await
}

/// Run `op` on `session`, then release it on both the success and error paths
pub async fn run_scoped<S, T, F, Fut>(session: S, op: F) -> Result<T, SftpError>
where
    S: ScopedSession,
    F: FnOnce(Arc<S>) -> Fut,
    Fut: Future<Output = Result<T, SftpError>>,
{
    let session = Arc::new(session);
    let result = op(session.clone()).await;

    match Arc::try_unwrap(session) {
        Ok(session) => session.release().await,
        Err(_) => warn!("SFTP session still referenced after operation, dropping it"),
    }

    result
}
