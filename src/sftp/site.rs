//! Site-scoped entry points: resolve through the site's sandbox, then run
//! one operation on one session

use std::path::Path;

use tracing::info;

use super::error::SftpError;
use super::session::with_session;
use super::sync::SyncEngine;
use super::tree_ops::clear_remote_dir;
use super::types::{SyncOptions, SyncResult};
use crate::config::SiteIdentity;
use crate::ssh::TransferCredentials;

fn site_credentials(site: &SiteIdentity) -> Result<&TransferCredentials, SftpError> {
    site.credentials
        .as_ref()
        .ok_or_else(|| SftpError::MissingCredentials(site.domain.clone()))
}

/// Everything `sync_site` checks before connecting
fn prepare_sync<'s>(
    site: &'s SiteIdentity,
    local_dir: &Path,
    remote_target: Option<&str>,
    clean: bool,
    dry_run: bool,
) -> Result<(&'s TransferCredentials, SyncOptions), SftpError> {
    let credentials = site_credentials(site)?;

    let meta = std::fs::metadata(local_dir)?;
    if !meta.is_dir() {
        return Err(SftpError::NotADirectory(local_dir.display().to_string()));
    }

    let remote_dir = site.resolve(remote_target.unwrap_or_else(|| site.cwd()))?;
    Ok((
        credentials,
        SyncOptions {
            local_dir: local_dir.to_path_buf(),
            remote_dir,
            clean,
            dry_run,
        },
    ))
}

/// Sync `local_dir` into `remote_target` (default: the site's working
/// directory) over a single session
pub async fn sync_site(
    site: &SiteIdentity,
    local_dir: &Path,
    remote_target: Option<&str>,
    clean: bool,
    dry_run: bool,
) -> Result<SyncResult, SftpError> {
    let (credentials, options) = prepare_sync(site, local_dir, remote_target, clean, dry_run)?;
    info!(
        "Syncing {} -> {}:{}{}{}",
        options.local_dir.display(),
        site.domain,
        options.remote_dir,
        if clean { " (clean)" } else { "" },
        if dry_run { " (dry run)" } else { "" }
    );

    let root = site.root.clone();
    with_session(credentials, |session| async move {
        SyncEngine::new(session.as_ref(), root).sync(&options).await
    })
    .await
}

/// Empty `target` inside the site, keeping the directory itself
pub async fn clear_site_dir(site: &SiteIdentity, target: &str) -> Result<(), SftpError> {
    let credentials = site_credentials(site)?;
    let dir = site.resolve(target)?;
    info!("Clearing {}:{}", site.domain, dir);

    with_session(credentials, |session| async move {
        clear_remote_dir(session.as_ref(), &dir).await
    })
    .await
}
