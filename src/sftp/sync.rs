//! Local-to-remote directory synchronization
//!
//! Two phases: [`SyncEngine::plan`] classifies every local file against the
//! remote tree without mutating anything, then [`SyncEngine::execute`]
//! uploads the plan with progress accounting and, in clean mode, deletes
//! remote files that no local file maps to.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::error::SftpError;
use super::path_utils::{
    canonical, ensure_within_root, join_remote_path, remote_parent, to_posix_relative,
};
use super::progress::TransferProgress;
use super::remote_fs::RemoteFs;
use super::tree_ops::{ensure_remote_dir, list_files_recursive, remove_remote_recursive};
use super::types::{constants, FileInfo, SyncOptions, SyncPlan, SyncPlanEntry, SyncResult};

/// A regular local file found during enumeration
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    /// `/`-separated path relative to the sync root
    pub relative_path: String,
    pub size: u64,
    /// Modification time, milliseconds since the Unix epoch
    pub mtime_ms: i64,
}

/// Decide whether a local file must be uploaded.
///
/// Upload when the remote file is absent, the sizes differ, or the local copy
/// is newer by more than the clock-skew tolerance.
pub fn needs_upload(local_size: u64, local_mtime_ms: i64, remote: Option<&FileInfo>) -> bool {
    match remote {
        None => true,
        Some(remote) => {
            if remote.size != local_size {
                return true;
            }
            let remote_mtime_ms = remote.modified.saturating_mul(1000);
            local_mtime_ms.saturating_sub(remote_mtime_ms) > constants::MTIME_TOLERANCE_MS
        }
    }
}

fn is_ignored(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .map(|n| constants::IGNORED_NAMES.contains(&n))
        .unwrap_or(false)
}

/// Every regular file under `root` (hidden files included), minus the fixed
/// ignore set, in a stable enumeration order.
pub fn collect_local_files(root: &Path) -> Result<Vec<LocalFile>, SftpError> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(SftpError::NotADirectory(root.display().to_string()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            SftpError::IoError(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| {
            SftpError::IoError(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("metadata read failed")),
            )
        })?;
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            relative_path: to_posix_relative(relative),
            size: metadata.len(),
            mtime_ms,
        });
    }

    Ok(files)
}

/// Synchronizes one local tree into one remote directory
pub struct SyncEngine<'a, F: RemoteFs + ?Sized> {
    fs: &'a F,
    sandbox_root: String,
}

impl<'a, F: RemoteFs + ?Sized> SyncEngine<'a, F> {
    pub fn new(fs: &'a F, sandbox_root: impl Into<String>) -> Self {
        let sandbox_root: String = sandbox_root.into();
        Self {
            fs,
            sandbox_root: canonical(&sandbox_root),
        }
    }

    /// Classify every local file. Only reads remote metadata.
    pub async fn plan(&self, options: &SyncOptions) -> Result<SyncPlan, SftpError> {
        let remote_dir = canonical(&options.remote_dir);
        ensure_within_root(&self.sandbox_root, &remote_dir)?;

        let local_files = collect_local_files(&options.local_dir)?;
        debug!(
            "Classifying {} local files against {}",
            local_files.len(),
            remote_dir
        );

        let mut plan = SyncPlan::default();
        for file in local_files {
            let remote_path = join_remote_path(&remote_dir, &file.relative_path);
            ensure_within_root(&self.sandbox_root, &remote_path)?;

            let remote = self.fs.stat(&remote_path).await?;
            if needs_upload(file.size, file.mtime_ms, remote.as_ref()) {
                plan.uploads.push(SyncPlanEntry {
                    remote_parent_dir: remote_parent(&remote_path),
                    remote_path: remote_path.clone(),
                    relative_path: file.relative_path,
                    local_path: file.path,
                    size_bytes: file.size,
                });
            } else {
                plan.skipped.push(file.relative_path);
            }
            plan.expected_remote.push(remote_path);
        }

        Ok(plan)
    }

    /// Plan, then execute with a progress line on stderr
    pub async fn sync(&self, options: &SyncOptions) -> Result<SyncResult, SftpError> {
        let plan = self.plan(options).await?;
        let label = if options.dry_run { "dry-run" } else { "upload" };
        let mut progress = if options.dry_run {
            TransferProgress::hidden(plan.total_bytes(), label)
        } else {
            TransferProgress::new(plan.total_bytes(), label)
        };
        let result = self.execute(options, &plan, &mut progress).await;
        progress.finish();
        result
    }

    /// Upload the plan, then (clean mode) remove orphans.
    ///
    /// The first failure aborts the rest; completed uploads stay in place.
    pub async fn execute(
        &self,
        options: &SyncOptions,
        plan: &SyncPlan,
        progress: &mut TransferProgress,
    ) -> Result<SyncResult, SftpError> {
        let mut result = SyncResult {
            uploaded: plan.uploads.iter().map(|e| e.relative_path.clone()).collect(),
            skipped: plan.skipped.clone(),
            deleted: Vec::new(),
        };

        if !options.dry_run {
            let mut ensured: HashSet<&str> = HashSet::new();
            for entry in &plan.uploads {
                if ensured.insert(entry.remote_parent_dir.as_str()) {
                    ensure_remote_dir(self.fs, &entry.remote_parent_dir).await?;
                }
                self.upload_file(entry, progress).await?;
            }
            info!(
                "Uploaded {} files ({} skipped)",
                result.uploaded.len(),
                result.skipped.len()
            );
        }

        if options.clean {
            result.deleted = self.clean(options, plan).await?;
        }

        Ok(result)
    }

    async fn clean(&self, options: &SyncOptions, plan: &SyncPlan) -> Result<Vec<String>, SftpError> {
        let remote_dir = canonical(&options.remote_dir);
        let expected: HashSet<&str> = plan.expected_remote.iter().map(String::as_str).collect();

        let mut deleted = Vec::new();
        for remote in list_files_recursive(self.fs, &remote_dir).await? {
            if expected.contains(remote.path.as_str()) {
                continue;
            }
            ensure_within_root(&self.sandbox_root, &remote.path)?;
            if !options.dry_run {
                remove_remote_recursive(self.fs, &remote.path).await?;
            }
            deleted.push(remote.path);
        }

        if !deleted.is_empty() {
            info!("Removed {} orphaned remote files", deleted.len());
        }
        Ok(deleted)
    }

    /// Stream one file, accounting bytes as they are read locally
    async fn upload_file(
        &self,
        entry: &SyncPlanEntry,
        progress: &mut TransferProgress,
    ) -> Result<(), SftpError> {
        let mut local_file = tokio::fs::File::open(&entry.local_path).await?;
        let mut remote_file = self.fs.create_file(&entry.remote_path).await?;

        let mut buffer = vec![0u8; constants::CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let bytes_read = local_file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            remote_file
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| SftpError::TransferError(format!("{}: {}", entry.remote_path, e)))?;
            transferred += bytes_read as u64;
            progress.add(bytes_read as u64);
        }

        remote_file
            .flush()
            .await
            .map_err(|e| SftpError::TransferError(format!("{}: {}", entry.remote_path, e)))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| SftpError::TransferError(format!("{}: {}", entry.remote_path, e)))?;

        debug!("Uploaded {} ({} bytes)", entry.remote_path, transferred);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::testing::MemoryFs;
    use crate::sftp::types::FileType;
    use std::fs;
    use tempfile::tempdir;

    fn remote(size: u64, modified: i64) -> FileInfo {
        FileInfo {
            name: "f".into(),
            path: "/f".into(),
            file_type: FileType::File,
            size,
            modified,
        }
    }

    fn local_mtime_secs(path: &Path) -> i64 {
        fs::metadata(path)
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn options(local: &Path, remote: &str) -> SyncOptions {
        SyncOptions {
            local_dir: local.to_path_buf(),
            remote_dir: remote.to_string(),
            clean: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_classification_within_tolerance_skips() {
        let t_ms = 1_700_000_000_000;
        let t_secs = t_ms / 1000;
        assert!(!needs_upload(100, t_ms, Some(&remote(100, t_secs - 1))));
        assert!(!needs_upload(100, t_ms, Some(&remote(100, t_secs))));
        assert!(needs_upload(100, t_ms, Some(&remote(100, t_secs - 3))));
    }

    #[test]
    fn test_classification_size_mismatch_uploads() {
        let t_ms = 1_700_000_000_000;
        assert!(needs_upload(100, t_ms, Some(&remote(99, t_ms / 1000 + 3600))));
        assert!(needs_upload(100, t_ms, None));
    }

    #[test]
    fn test_collect_local_files_skips_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.html"), b"<html>").unwrap();
        fs::write(root.join(".htaccess"), b"deny").unwrap();
        fs::write(root.join(".DS_Store"), b"junk").unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join(".git/HEAD"), b"ref").unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), b"x").unwrap();
        fs::create_dir_all(root.join("css")).unwrap();
        fs::write(root.join("css/site.css"), b"body{}").unwrap();

        let files: Vec<String> = collect_local_files(root)
            .unwrap()
            .into_iter()
            .map(|f| f.relative_path)
            .collect();
        assert_eq!(files, vec![".htaccess", "css/site.css", "index.html"]);
    }

    #[test]
    fn test_collect_local_files_missing_dir() {
        let dir = tempdir().unwrap();
        let err = collect_local_files(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SftpError::IoError(e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_sync_uploads_new_and_changed_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/c.txt"), b"nested").unwrap();
        fs::write(dir.path().join("same.txt"), b"same").unwrap();

        let fs_remote = MemoryFs::new();
        fs_remote.add_dir("/site");
        let same_mtime = local_mtime_secs(&dir.path().join("same.txt"));
        fs_remote.add_file("/site/www/same.txt", b"same", same_mtime);

        let engine = SyncEngine::new(&fs_remote, "/site");
        let result = engine.sync(&options(dir.path(), "/site/www")).await.unwrap();

        assert_eq!(result.uploaded, vec!["a.txt", "b/c.txt"]);
        assert_eq!(result.skipped, vec!["same.txt"]);
        assert!(result.deleted.is_empty());
        assert_eq!(fs_remote.contents("/site/www/a.txt").unwrap(), b"hello");
        assert_eq!(fs_remote.contents("/site/www/b/c.txt").unwrap(), b"nested");
    }

    #[tokio::test]
    async fn test_parent_dirs_created_once_per_plan() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("img")).unwrap();
        for name in ["1.png", "2.png", "3.png"] {
            fs::write(dir.path().join("img").join(name), b"px").unwrap();
        }

        let fs_remote = MemoryFs::new();
        fs_remote.add_dir("/site");
        let engine = SyncEngine::new(&fs_remote, "/site");
        engine.sync(&options(dir.path(), "/site")).await.unwrap();

        // one create_dir for /site/img, three create_file
        assert_eq!(fs_remote.mutations(), 4);
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_run_without_mutation() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/c.txt"), b"cc").unwrap();

        let seed = |fs_remote: &MemoryFs| {
            fs_remote.add_file("/site/a.txt", b"old", 0);
            fs_remote.add_file("/site/stale.txt", b"gone", 0);
        };

        let dry_fs = MemoryFs::new();
        seed(&dry_fs);
        let mut dry = options(dir.path(), "/site");
        dry.dry_run = true;
        dry.clean = true;
        let dry_result = SyncEngine::new(&dry_fs, "/site").sync(&dry).await.unwrap();
        assert_eq!(dry_fs.mutations(), 0);
        assert!(dry_fs.exists("/site/stale.txt"));

        let real_fs = MemoryFs::new();
        seed(&real_fs);
        let mut real = options(dir.path(), "/site");
        real.clean = true;
        let real_result = SyncEngine::new(&real_fs, "/site").sync(&real).await.unwrap();

        assert_eq!(dry_result, real_result);
        assert_eq!(dry_result.deleted, vec!["/site/stale.txt"]);
        assert!(!real_fs.exists("/site/stale.txt"));
    }

    #[tokio::test]
    async fn test_clean_deletes_only_orphans() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/c.txt"), b"c").unwrap();

        let fs_remote = MemoryFs::new();
        fs_remote.add_file("/site/b/orphan.txt", b"orphan", 0);
        fs_remote.add_dir("/site/empty");

        let mut opts = options(dir.path(), "/site");
        opts.clean = true;
        let result = SyncEngine::new(&fs_remote, "/site").sync(&opts).await.unwrap();

        assert_eq!(result.deleted, vec!["/site/b/orphan.txt"]);
        assert!(fs_remote.exists("/site/b/c.txt"));
        assert!(!fs_remote.exists("/site/b/orphan.txt"));
        // directories are never removed on their own
        assert!(fs_remote.is_dir("/site/empty"));
    }

    #[tokio::test]
    async fn test_target_outside_root_fails_before_any_call() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let fs_remote = MemoryFs::new();
        let err = SyncEngine::new(&fs_remote, "/site")
            .plan(&options(dir.path(), "/etc"))
            .await
            .unwrap_err();
        assert!(matches!(err, SftpError::BoundaryViolation { .. }));
        assert_eq!(fs_remote.mutations(), 0);
    }

    #[tokio::test]
    async fn test_trailing_slash_root_syncs_into_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let fs_remote = MemoryFs::new();
        fs_remote.add_dir("/site");
        let result = SyncEngine::new(&fs_remote, "/site/")
            .sync(&options(dir.path(), "/site/./"))
            .await
            .unwrap();
        assert_eq!(result.uploaded, vec!["a.txt"]);
        assert_eq!(fs_remote.contents("/site/a.txt").unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_transfer_failure_aborts_remaining_plan() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();

        let fs_remote = MemoryFs::new();
        fs_remote.add_dir("/site");
        // a file where the parent directory should be makes the first upload fail
        fs_remote.add_file("/site/www", b"not a dir", 0);

        let err = SyncEngine::new(&fs_remote, "/site")
            .sync(&options(dir.path(), "/site/www"))
            .await
            .unwrap_err();
        assert!(matches!(err, SftpError::NotADirectory(_)));
        assert!(!fs_remote.exists("/site/www/b.txt"));
    }

    #[tokio::test]
    async fn test_progress_counts_planned_bytes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![7u8; 200_000]).unwrap();
        fs::write(dir.path().join("b.bin"), vec![1u8; 10]).unwrap();

        let fs_remote = MemoryFs::new();
        let opts = options(dir.path(), "/");
        let engine = SyncEngine::new(&fs_remote, "/");
        let plan = engine.plan(&opts).await.unwrap();
        assert_eq!(plan.total_bytes(), 200_010);

        let mut progress = TransferProgress::hidden(plan.total_bytes(), "test");
        engine.execute(&opts, &plan, &mut progress).await.unwrap();
        assert_eq!(progress.transferred_bytes(), 200_010);
        assert_eq!(fs_remote.contents("/a.bin").unwrap().len(), 200_000);
        progress.finish();
    }
}
