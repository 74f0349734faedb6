//! Remote file management over SFTP
//!
//! Sandboxed path resolution, tree operations, and local-to-remote sync.

pub mod error;
pub mod path_utils;
pub mod progress;
pub mod remote_fs;
pub mod session;
pub mod site;
pub mod sync;
pub mod tree_ops;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SftpError;
pub use progress::TransferProgress;
pub use remote_fs::{RemoteFs, RemoteWriter};
pub use session::{run_scoped, with_session, ScopedSession, SftpSession, Transport};
pub use site::{clear_site_dir, sync_site};
pub use sync::SyncEngine;
pub use tree_ops::{clear_remote_dir, ensure_remote_dir, list_files_recursive, remove_remote_recursive};
pub use types::*;
