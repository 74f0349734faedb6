//! Idempotent recursive primitives over a [`RemoteFs`]

use tracing::{debug, info};

use super::error::SftpError;
use super::path_utils::remote_parent;
use super::remote_fs::RemoteFs;
use super::types::FileInfo;

/// Create `dir` and every missing ancestor. No-op if it already exists as a
/// directory; fails with [`SftpError::NotADirectory`] if something else
/// occupies the path.
pub async fn ensure_remote_dir<F: RemoteFs + ?Sized>(fs: &F, dir: &str) -> Result<(), SftpError> {
    // Walk up until an existing ancestor, then create downwards
    let mut missing = Vec::new();
    let mut current = dir.to_string();
    loop {
        match fs.stat(&current).await? {
            Some(info) if info.is_dir() => break,
            Some(_) => return Err(SftpError::NotADirectory(current)),
            None => {
                if current == "/" {
                    break;
                }
                let parent = remote_parent(&current);
                missing.push(current);
                current = parent;
            }
        }
    }

    for path in missing.iter().rev() {
        fs.create_dir(path).await?;
    }
    if !missing.is_empty() {
        debug!("Created {} directories up to {}", missing.len(), dir);
    }
    Ok(())
}

/// Delete `path` and everything below it. Files go before the directory that
/// held them; symlinks are removed as links. No-op if `path` is absent.
pub async fn remove_remote_recursive<F: RemoteFs + ?Sized>(
    fs: &F,
    path: &str,
) -> Result<(), SftpError> {
    let Some(info) = fs.lstat(path).await? else {
        debug!("Nothing to remove at {}", path);
        return Ok(());
    };

    if info.is_dir() {
        for child in fs.read_dir(path).await? {
            // Boxed to avoid infinite future size
            Box::pin(remove_remote_recursive(fs, &child.path)).await?;
        }
        fs.remove_dir(path).await
    } else {
        fs.remove_file(path).await
    }
}

/// Empty `dir` but keep the directory itself. No-op if `dir` is absent.
pub async fn clear_remote_dir<F: RemoteFs + ?Sized>(fs: &F, dir: &str) -> Result<(), SftpError> {
    match fs.stat(dir).await? {
        None => return Ok(()),
        Some(info) if !info.is_dir() => return Err(SftpError::NotADirectory(dir.to_string())),
        Some(_) => {}
    }

    let children = fs.read_dir(dir).await?;
    info!("Clearing {} entries from {}", children.len(), dir);
    for child in children {
        remove_remote_recursive(fs, &child.path).await?;
    }
    Ok(())
}

/// Every non-directory entry under `dir`, depth-first in listing order.
/// Empty when `dir` does not exist.
pub async fn list_files_recursive<F: RemoteFs + ?Sized>(
    fs: &F,
    dir: &str,
) -> Result<Vec<FileInfo>, SftpError> {
    let mut files = Vec::new();
    match fs.stat(dir).await? {
        Some(info) if info.is_dir() => collect_files(fs, dir, &mut files).await?,
        _ => {}
    }
    Ok(files)
}

async fn collect_files<F: RemoteFs + ?Sized>(
    fs: &F,
    dir: &str,
    out: &mut Vec<FileInfo>,
) -> Result<(), SftpError> {
    for entry in fs.read_dir(dir).await? {
        if entry.is_dir() {
            Box::pin(collect_files(fs, &entry.path, out)).await?;
        } else {
            out.push(entry);
        }
    }
    Ok(())
}
