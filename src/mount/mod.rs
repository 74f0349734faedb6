//! Live mounting of a site as a local volume through an external helper
//!
//! The OS mount table is authoritative: helper exit codes are advisory.

pub mod error;
pub mod helper;
pub mod manager;
pub mod mountpoint;
pub mod system;
pub mod table;

pub use error::MountError;
pub use helper::{HelperInvocation, HelperSearch};
pub use manager::{MountManager, MountNote, MountOutcome, MountState, MountStatus};
pub use mountpoint::{sanitize_domain, MountPaths};
pub use system::{CommandOutcome, HostMountSystem, MountSystem};
