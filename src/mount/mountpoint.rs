//! Deterministic mountpoint locations per domain

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::MountError;

/// Shared, system-visible parent for mountpoints
pub const SHARED_MOUNT_ROOT: &str = "/Volumes/siteferry";

/// Where mountpoints may be created: a shared root first, then a per-user one
#[derive(Debug, Clone)]
pub struct MountPaths {
    pub shared_root: PathBuf,
    pub fallback_root: PathBuf,
}

impl MountPaths {
    /// `/Volumes/siteferry`, falling back to `<data dir>/siteferry/mounts`
    pub fn system() -> Self {
        let fallback_root = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("siteferry")
            .join("mounts");
        Self {
            shared_root: PathBuf::from(SHARED_MOUNT_ROOT),
            fallback_root,
        }
    }

    pub fn shared_candidate(&self, domain: &str) -> PathBuf {
        self.shared_root.join(sanitize_domain(domain))
    }

    pub fn fallback_candidate(&self, domain: &str) -> PathBuf {
        self.fallback_root.join(sanitize_domain(domain))
    }

    /// Create the mountpoint, preferring the shared root.
    ///
    /// Returns whichever path was actually created.
    pub async fn ensure(&self, domain: &str) -> Result<PathBuf, MountError> {
        let shared = self.shared_candidate(domain);
        let shared_err = match tokio::fs::create_dir_all(&shared).await {
            Ok(()) => {
                debug!("Using shared mountpoint {}", shared.display());
                return Ok(shared);
            }
            Err(e) => e,
        };

        warn!(
            "Cannot create {} ({}), falling back to per-user location",
            shared.display(),
            shared_err
        );

        let fallback = self.fallback_candidate(domain);
        tokio::fs::create_dir_all(&fallback)
            .await
            .map_err(|e| MountError::Mountpoint {
                domain: domain.to_string(),
                details: format!(
                    "{}: {}; {}: {}",
                    shared.display(),
                    shared_err,
                    fallback.display(),
                    e
                ),
            })?;
        Ok(fallback)
    }

    /// The mountpoint a domain would use, without creating anything
    pub async fn resolve(&self, domain: &str) -> PathBuf {
        let shared = self.shared_candidate(domain);
        if occupied(&shared).await {
            shared
        } else {
            self.fallback_candidate(domain)
        }
    }
}

/// Something sits at `path`, even if it cannot be followed: a stale sshfs
/// mount fails `stat` with ENOTCONN or EIO.
async fn occupied(path: &Path) -> bool {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta.is_dir() || meta.is_symlink(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            debug!("Cannot inspect {}: {}", path.display(), e);
            match path.parent() {
                Some(parent) => is_dir(parent).await,
                None => false,
            }
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// File-system-safe directory name for a domain
pub fn sanitize_domain(domain: &str) -> String {
    let cleaned: String = domain
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "site".to_string()
    } else {
        cleaned.to_string()
    }
}
