//! Persisted configuration types

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sftp::path_utils::{canonical, ensure_within_root, resolve_from_cwd};
use crate::sftp::SftpError;
use crate::ssh::TransferCredentials;

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Format version, for migrations
    pub version: u32,

    /// Known sites, one per domain
    #[serde(default)]
    pub sites: Vec<SiteIdentity>,

    /// Explicit mount helper path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_helper: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sites: Vec::new(),
            mount_helper: None,
        }
    }
}

impl ConfigFile {
    pub fn site(&self, domain: &str) -> Option<&SiteIdentity> {
        self.sites.iter().find(|s| s.domain == domain)
    }

    pub fn site_mut(&mut self, domain: &str) -> Option<&mut SiteIdentity> {
        self.sites.iter_mut().find(|s| s.domain == domain)
    }

    /// Insert or replace the site with the same domain
    pub fn upsert_site(&mut self, site: SiteIdentity) {
        match self.site_mut(&site.domain) {
            Some(existing) => *existing = site,
            None => self.sites.push(site),
        }
    }

    pub fn domains(&self) -> Vec<String> {
        self.sites.iter().map(|s| s.domain.clone()).collect()
    }
}

/// Optional attributes shown next to a site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDisplay {
    /// Username of the owning account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

/// A remote site: a domain confined to a sandbox root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteIdentity {
    pub domain: String,

    /// Sandbox root, absolute remote path
    pub root: String,

    /// Current working remote path, always inside `root`
    #[serde(default)]
    pub cwd: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<TransferCredentials>,

    #[serde(default)]
    pub display: SiteDisplay,

    pub created_at: DateTime<Utc>,
}

impl SiteIdentity {
    pub fn new(domain: impl Into<String>, root: &str) -> Self {
        let root = canonical(root);
        Self {
            domain: domain.into(),
            cwd: root.clone(),
            root,
            credentials: None,
            display: SiteDisplay::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_credentials(mut self, credentials: TransferCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Working directory, falling back to the root
    pub fn cwd(&self) -> &str {
        if self.cwd.is_empty() {
            &self.root
        } else {
            &self.cwd
        }
    }

    /// Move the sandbox root; the working directory resets to it
    pub fn set_root(&mut self, root: &str) {
        self.root = canonical(root);
        self.cwd = self.root.clone();
    }

    /// Resolve `target` against the working directory and check it stays
    /// inside the sandbox root
    pub fn resolve(&self, target: &str) -> Result<String, SftpError> {
        let resolved = resolve_from_cwd(&self.root, self.cwd(), target);
        ensure_within_root(&self.root, &resolved)?;
        Ok(resolved)
    }

    /// Resolve `target` and make it the new working directory
    pub fn change_dir(&mut self, target: &str) -> Result<&str, SftpError> {
        self.cwd = self.resolve(target)?;
        Ok(&self.cwd)
    }
}
