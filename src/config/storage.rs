//! Site store
//!
//! The known sites live in one JSON document, `~/.siteferry/sites.json`
//! (`%APPDATA%\SiteFerry\sites.json` on Windows). Every write replaces the
//! document atomically. An unreadable document is moved aside, never
//! overwritten in place.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::types::{ConfigFile, SiteIdentity, CONFIG_VERSION};
use crate::sftp::SftpError;

const SITES_FILE: &str = "sites.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Cannot locate a home directory for the site store")]
    NoConfigDir,

    #[error("Site store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Site store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Site store version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },

    #[error("Unknown site: {0}")]
    SiteNotFound(String),

    /// A site edit that would leave the sandbox
    #[error(transparent)]
    Sandbox(#[from] SftpError),
}

impl StorageError {
    /// Errors fixed by changing the invocation rather than the environment
    pub fn is_usage(&self) -> bool {
        match self {
            StorageError::SiteNotFound(_) => true,
            StorageError::Sandbox(e) => matches!(e, SftpError::BoundaryViolation { .. }),
            _ => false,
        }
    }
}

/// Directory holding the site store
pub fn config_dir() -> Result<PathBuf, StorageError> {
    if cfg!(windows) {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("SiteFerry"));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".siteferry"))
        .ok_or(StorageError::NoConfigDir)
}

pub fn sites_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join(SITES_FILE))
}

/// Look up `domain`, failing with `SiteNotFound`
pub fn require_site<'c>(config: &'c ConfigFile, domain: &str) -> Result<&'c SiteIdentity, StorageError> {
    config
        .site(domain)
        .ok_or_else(|| StorageError::SiteNotFound(domain.to_string()))
}

/// Persistent set of known sites
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Store at the default location
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self::with_path(sites_file()?))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. A missing file is an empty store; a file that does
    /// not parse is quarantined and an empty store returned.
    pub async fn load(&self) -> Result<ConfigFile, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No site store at {}", self.path.display());
                return Ok(ConfigFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<ConfigFile>(&contents) {
            Ok(config) if config.version > CONFIG_VERSION => Err(StorageError::VersionTooNew {
                found: config.version,
                supported: CONFIG_VERSION,
            }),
            Ok(config) => Ok(config),
            Err(e) => {
                let moved_to = self.quarantine().await?;
                warn!(
                    "Site store unreadable ({}), moved to {}; starting empty",
                    e,
                    moved_to.display()
                );
                Ok(ConfigFile::default())
            }
        }
    }

    /// Replace the document on disk
    pub async fn save(&self, config: &ConfigFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(config)?;

        let mut file = fs::File::create(&staging).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&staging, &self.path).await?;

        debug!("Saved {} sites to {}", config.sites.len(), self.path.display());
        Ok(())
    }

    /// Load the site for `domain`
    pub async fn load_site(&self, domain: &str) -> Result<SiteIdentity, StorageError> {
        let config = self.load().await?;
        require_site(&config, domain).cloned()
    }

    /// Add `site`, replacing any site with the same domain
    pub async fn put_site(&self, site: SiteIdentity) -> Result<(), StorageError> {
        let mut config = self.load().await?;
        info!("Saving site {} (root {})", site.domain, site.root);
        config.upsert_site(site);
        self.save(&config).await
    }

    /// Move the working directory of `domain`; nothing is written when the
    /// target leaves the sandbox
    pub async fn change_site_dir(&self, domain: &str, target: &str) -> Result<String, StorageError> {
        let mut config = self.load().await?;
        let site = config
            .site_mut(domain)
            .ok_or_else(|| StorageError::SiteNotFound(domain.to_string()))?;
        let cwd = site.change_dir(target)?.to_string();
        self.save(&config).await?;
        Ok(cwd)
    }

    async fn quarantine(&self) -> Result<PathBuf, StorageError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let target = self.path.with_extension(format!("json.corrupt-{}", stamp));
        fs::rename(&self.path, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{AuthMethod, TransferCredentials};
    use tempfile::tempdir;

    fn example_site() -> SiteIdentity {
        SiteIdentity::new("example.com", "/home/example").with_credentials(TransferCredentials::new(
            "sftp.example.com",
            22,
            "example",
            AuthMethod::password("pw"),
        ))
    }

    #[tokio::test]
    async fn test_missing_store_is_empty() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join(SITES_FILE));

        let config = storage.load().await.unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.sites.is_empty());
        assert!(!storage.path().exists());
    }

    #[tokio::test]
    async fn test_put_site_then_load_site() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("nested").join(SITES_FILE));

        storage.put_site(example_site()).await.unwrap();

        let site = storage.load_site("example.com").await.unwrap();
        assert_eq!(site.cwd(), "/home/example");
        // the password itself is never written
        assert!(site.credentials.as_ref().unwrap().needs_password());
    }

    #[tokio::test]
    async fn test_unknown_site() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join(SITES_FILE));
        storage.put_site(example_site()).await.unwrap();

        let err = storage.load_site("other.org").await.unwrap_err();
        assert!(matches!(err, StorageError::SiteNotFound(ref d) if d == "other.org"));
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_change_site_dir_is_persisted() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join(SITES_FILE));
        storage.put_site(example_site()).await.unwrap();

        let cwd = storage.change_site_dir("example.com", "www").await.unwrap();
        assert_eq!(cwd, "/home/example/www");

        let site = storage.load_site("example.com").await.unwrap();
        assert_eq!(site.cwd(), "/home/example/www");
    }

    #[tokio::test]
    async fn test_change_site_dir_outside_root_is_not_saved() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join(SITES_FILE));
        storage.put_site(example_site()).await.unwrap();

        let err = storage
            .change_site_dir("example.com", "../../etc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Sandbox(SftpError::BoundaryViolation { .. })
        ));
        assert!(err.is_usage());

        let site = storage.load_site("example.com").await.unwrap();
        assert_eq!(site.cwd(), "/home/example");
    }

    #[tokio::test]
    async fn test_unreadable_store_is_moved_aside() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SITES_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        let storage = ConfigStorage::with_path(path.clone());

        let config = storage.load().await.unwrap();
        assert!(config.sites.is_empty());
        assert!(!path.exists());

        let moved: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(moved.len(), 1);
        assert!(moved[0].starts_with("sites.json.corrupt-"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join(&moved[0])).unwrap(),
            "{ not json"
        );
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SITES_FILE);
        std::fs::write(&path, r#"{"version": 99, "sites": []}"#).unwrap();

        let err = ConfigStorage::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::VersionTooNew { found: 99, .. }));
    }
}
