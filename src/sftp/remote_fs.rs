//! Remote filesystem abstraction
//!
//! The tree operations and the sync engine only talk to this trait, so the
//! same code runs over a live [`SftpSession`](super::SftpSession) or over the
//! in-memory implementation used by the tests.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use super::error::SftpError;
use super::types::FileInfo;

/// Writable remote file handle
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Metadata following symlinks, `None` if the path does not exist
    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, SftpError>;

    /// Metadata of the entry itself (symlinks are not followed)
    async fn lstat(&self, path: &str) -> Result<Option<FileInfo>, SftpError>;

    /// Direct children of `path`, without `.` and `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, SftpError>;

    async fn create_dir(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    /// Create or truncate `path` for writing
    async fn create_file(&self, path: &str) -> Result<RemoteWriter, SftpError>;
}
