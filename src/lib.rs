//! SiteFerry - keep a local tree in step with a sandboxed SFTP site
//!
//! Sync uploads what changed (optionally deleting remote orphans), and on
//! macOS a site can be live-mounted as a local volume through sshfs.

pub mod config;
pub mod interactive;
pub mod mount;
pub mod sftp;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when `verbose`.
/// Logs go to stderr, leaving stdout for command output.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
