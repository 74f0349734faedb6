//! Configuration Management Module
//!
//! Persists the known sites (domain, sandbox root, working directory,
//! credentials minus secrets) and the optional mount helper override.

pub mod storage;
pub mod types;

pub use storage::{config_dir, require_site, sites_file, ConfigStorage, StorageError};
pub use types::{ConfigFile, SiteDisplay, SiteIdentity, CONFIG_VERSION};
