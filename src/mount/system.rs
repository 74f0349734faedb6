//! Operating system side of mounting: helper processes, unmount commands
//! and the mount table

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::helper::HelperInvocation;

/// Result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub code: Option<i32>,
    /// Captured error output (empty when stdio was inherited)
    pub stderr: String,
}

impl CommandOutcome {
    fn from_output(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Error text for reports: stderr, else the exit status
    pub fn describe(&self) -> String {
        if !self.stderr.is_empty() {
            self.stderr.clone()
        } else {
            match self.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

#[async_trait]
pub trait MountSystem: Send + Sync {
    /// Whether live mounts are available on this platform
    fn supported(&self) -> bool;

    /// Raw text of the active mount table
    async fn mount_table(&self) -> std::io::Result<String>;

    /// Run the helper to completion. `attached` inherits the terminal so the
    /// helper can prompt; otherwise stdin is closed and stderr captured.
    async fn run_helper(
        &self,
        invocation: &HelperInvocation,
        attached: bool,
    ) -> std::io::Result<CommandOutcome>;

    /// Regular unmount
    async fn unmount(&self, mountpoint: &Path) -> std::io::Result<CommandOutcome>;

    /// Forced unmount, used after the regular one failed
    async fn force_unmount(&self, mountpoint: &Path) -> std::io::Result<CommandOutcome>;
}

/// The real host: `mount`, `umount`, `diskutil`
#[derive(Debug, Clone, Default)]
pub struct HostMountSystem;

#[async_trait]
impl MountSystem for HostMountSystem {
    fn supported(&self) -> bool {
        cfg!(target_os = "macos")
    }

    async fn mount_table(&self) -> std::io::Result<String> {
        let output = Command::new("mount").stdin(Stdio::null()).output().await?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "mount table query failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_helper(
        &self,
        invocation: &HelperInvocation,
        attached: bool,
    ) -> std::io::Result<CommandOutcome> {
        debug!("Spawning mount helper: {}", invocation.display());
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);

        if attached {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await?;
            Ok(CommandOutcome {
                success: status.success(),
                code: status.code(),
                stderr: String::new(),
            })
        } else {
            let output = command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await?;
            Ok(CommandOutcome::from_output(output))
        }
    }

    async fn unmount(&self, mountpoint: &Path) -> std::io::Result<CommandOutcome> {
        let output = Command::new("umount")
            .arg(mountpoint)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(CommandOutcome::from_output(output))
    }

    async fn force_unmount(&self, mountpoint: &Path) -> std::io::Result<CommandOutcome> {
        let output = Command::new("diskutil")
            .args(["unmount", "force"])
            .arg(mountpoint)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(CommandOutcome::from_output(output))
    }
}
