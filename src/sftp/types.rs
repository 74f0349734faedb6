//! SFTP data types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Remote entry metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name (not full path)
    pub name: String,
    /// Full path
    pub path: String,
    /// File type
    pub file_type: FileType,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp, seconds)
    pub modified: i64,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// File type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// Inputs of one synchronization run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Local directory to mirror
    pub local_dir: PathBuf,
    /// Remote target directory (absolute, already resolved against the site)
    pub remote_dir: String,
    /// Delete remote files that have no local counterpart
    pub clean: bool,
    /// Classify and report only; no mutating remote call is issued
    pub dry_run: bool,
}

/// One planned upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlanEntry {
    pub local_path: PathBuf,
    /// Path relative to the local root, `/`-separated
    pub relative_path: String,
    pub remote_path: String,
    pub remote_parent_dir: String,
    pub size_bytes: u64,
}

/// Classification result, computed before any network mutation
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub uploads: Vec<SyncPlanEntry>,
    /// Relative paths classified as up to date
    pub skipped: Vec<String>,
    /// Every remote path derivable from a local file (uploads and skips)
    pub expected_remote: Vec<String>,
}

impl SyncPlan {
    /// Sum of planned upload sizes
    pub fn total_bytes(&self) -> u64 {
        self.uploads.iter().map(|e| e.size_bytes).sum()
    }
}

/// What a sync did (or would do, under dry-run)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Uploaded relative paths, in enumeration order
    pub uploaded: Vec<String>,
    /// Skipped relative paths, in enumeration order
    pub skipped: Vec<String>,
    /// Deleted absolute remote paths
    pub deleted: Vec<String>,
}

/// Transfer tuning constants
pub mod constants {
    /// Stream chunk size for uploads (64 KB)
    pub const CHUNK_SIZE: usize = 64 * 1024;

    /// Local mtime must exceed remote mtime by more than this to force an upload
    pub const MTIME_TOLERANCE_MS: i64 = 2_000;

    /// Names never uploaded: VCS metadata, OS marker files, dependency caches
    pub const IGNORED_NAMES: &[&str] = &[
        ".git",
        ".svn",
        ".hg",
        ".DS_Store",
        "Thumbs.db",
        "desktop.ini",
        "node_modules",
    ];
}
