//! Remote path utilities
//!
//! Remote SFTP paths always use `/` as separator, whatever the local OS.
//! Everything the crate sends to a server goes through [`resolve_from_cwd`]
//! and [`ensure_within_root`] first, so a site can never be pushed outside
//! its sandbox root.

use std::path::Path;

use super::error::SftpError;

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Rewrite backslashes to slashes and make the path absolute.
///
/// Never fails. An empty input becomes `/`.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

/// Collapse `.` and `..` segments and duplicate separators (POSIX semantics;
/// `..` at the root stays at the root).
fn collapse(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Normalized and collapsed form of an absolute path, used for sandbox roots
/// so `/home/site/` and `/home/./site` both become `/home/site`.
pub fn canonical(path: &str) -> String {
    collapse(&normalize(path))
}

/// Resolve `target` against the site's working directory.
///
/// Absolute targets are only normalized; relative ones are joined onto `cwd`
/// (which itself defaults to `root` when empty) and collapsed.
pub fn resolve_from_cwd(root: &str, cwd: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    if is_absolute_remote_path(&target) {
        return canonical(&target);
    }
    let base = if cwd.is_empty() { root } else { cwd };
    collapse(&join_remote_path(&normalize(base), &target))
}

/// Fail with [`SftpError::BoundaryViolation`] unless `resolved` starts with
/// the canonical root.
///
/// This is a plain string-prefix test: with root `/foo`, `/foobar` passes.
pub fn ensure_within_root(root: &str, resolved: &str) -> Result<(), SftpError> {
    let root = canonical(root);
    if resolved.starts_with(&root) {
        Ok(())
    } else {
        Err(SftpError::BoundaryViolation {
            root,
            path: resolved.to_string(),
        })
    }
}

/// Parent directory of a remote path (`/` for top-level entries).
pub fn remote_parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Turn a local relative path into `/`-separated segments.
pub fn to_posix_relative(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
