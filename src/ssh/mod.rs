//! SSH module - credentials and transport establishment
//!
//! Only what a file-transfer session needs: one authenticated russh handle
//! per top-level operation. The SFTP subsystem on top of it lives in
//! [`crate::sftp::session`].

mod client;
mod config;
mod error;

pub use client::{ClientHandler, SshClient};
pub use config::{AuthMethod, TransferCredentials};
pub use error::SshError;
