//! Mount lifecycle: Unmounted -> Mounting -> Mounted -> Unmounting -> Unmounted
//!
//! The mount table is the only authority on whether a site is mounted.
//! Nothing is cached between calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SiteIdentity;
use crate::interactive::InteractiveContext;

use super::error::MountError;
use super::helper::{build_invocation, volume_label, HelperSearch};
use super::mountpoint::MountPaths;
use super::system::{CommandOutcome, HostMountSystem, MountSystem};
use super::table::is_target_mounted;

/// Table re-checks after the helper exits before declaring failure
const SETTLE_ATTEMPTS: u32 = 5;
const SETTLE_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

/// Why an operation ended in its final state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountNote {
    /// Live mounts are not available on this platform; nothing was done
    Unsupported,
    /// The target was already mounted; the helper was not run
    AlreadyMounted,
    /// Helper succeeded and the table confirms it
    Mounted,
    /// Helper reported failure but the table shows the mount
    ConfirmedDespiteExit(String),
    /// Unmount requested but the table shows no mount
    NotMounted,
    Unmounted,
    /// Regular unmount failed, forced unmount succeeded
    ForceUnmounted,
}

#[derive(Debug, Clone)]
pub struct MountOutcome {
    pub domain: String,
    pub mountpoint: Option<PathBuf>,
    pub state: MountState,
    pub note: MountNote,
}

impl MountOutcome {
    fn unsupported(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            mountpoint: None,
            state: MountState::Unmounted,
            note: MountNote::Unsupported,
        }
    }
}

/// One row of [`MountManager::list_mounts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountStatus {
    pub domain: String,
    pub mountpoint: PathBuf,
    pub mounted: bool,
}

pub struct MountManager {
    system: Arc<dyn MountSystem>,
    paths: MountPaths,
    helper: HelperSearch,
    interactive: InteractiveContext,
    settle_attempts: u32,
    settle_delay: Duration,
}

impl MountManager {
    /// Manager for the real host
    pub fn new(helper_override: Option<PathBuf>, interactive: InteractiveContext) -> Self {
        Self::with_parts(
            Arc::new(HostMountSystem),
            MountPaths::system(),
            HelperSearch::system(helper_override),
            interactive,
        )
    }

    pub fn with_parts(
        system: Arc<dyn MountSystem>,
        paths: MountPaths,
        helper: HelperSearch,
        interactive: InteractiveContext,
    ) -> Self {
        Self {
            system,
            paths,
            helper,
            interactive,
            settle_attempts: SETTLE_ATTEMPTS,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override how long to wait for the table to agree after the helper exits
    pub fn with_settle(mut self, attempts: u32, delay: Duration) -> Self {
        self.settle_attempts = attempts.max(1);
        self.settle_delay = delay;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.system.supported()
    }

    /// Create (if needed) and return the mountpoint for `domain`
    pub async fn ensure_mountpoint(&self, domain: &str) -> Result<PathBuf, MountError> {
        self.paths.ensure(domain).await
    }

    /// Exact-target lookup in the live mount table
    pub async fn is_mounted(&self, mountpoint: &Path) -> Result<bool, MountError> {
        let table = self.system.mount_table().await?;
        Ok(is_target_mounted(&table, mountpoint))
    }

    /// Mount `remote_path` (default: the site's working directory) of `site`
    pub async fn mount(
        &self,
        site: &SiteIdentity,
        remote_path: Option<&str>,
        interactive: bool,
    ) -> Result<MountOutcome, MountError> {
        let domain = site.domain.as_str();
        if !self.is_supported() {
            info!("Live mounts are not supported on this platform, skipping {}", domain);
            return Ok(MountOutcome::unsupported(domain));
        }

        let credentials = site
            .credentials
            .as_ref()
            .ok_or_else(|| MountError::MissingCredentials(domain.to_string()))?;
        let program = self.helper.discover()?;

        if credentials.auth.is_password() && !interactive {
            return Err(MountError::InteractiveRequired {
                domain: domain.to_string(),
            });
        }

        let remote = site.resolve(remote_path.unwrap_or_else(|| site.cwd()))?;
        let mountpoint = self.ensure_mountpoint(domain).await?;

        if self.is_mounted(&mountpoint).await? {
            info!("{} already mounted at {}", domain, mountpoint.display());
            return Ok(MountOutcome {
                domain: domain.to_string(),
                mountpoint: Some(mountpoint),
                state: MountState::Mounted,
                note: MountNote::AlreadyMounted,
            });
        }

        let label = volume_label(domain, &remote, &site.root);
        let invocation = build_invocation(&program, credentials, &remote, &mountpoint, &label);
        self.transition(domain, MountState::Unmounted, MountState::Mounting);

        let exit = if interactive {
            let _input = self.interactive.acquire();
            self.system.run_helper(&invocation, true).await
        } else {
            self.system.run_helper(&invocation, false).await
        };

        // The helper may exit before the mount shows up (or after reporting
        // an error for a mount that did happen), so the table decides.
        let mounted = self.wait_for_table(&mountpoint, true).await?;

        match (exit, mounted) {
            (Ok(outcome), true) => {
                self.transition(domain, MountState::Mounting, MountState::Mounted);
                let note = if outcome.success {
                    MountNote::Mounted
                } else {
                    warn!(
                        "Mount helper for {} reported failure ({}) but the mount is live",
                        domain,
                        outcome.describe()
                    );
                    MountNote::ConfirmedDespiteExit(outcome.describe())
                };
                Ok(MountOutcome {
                    domain: domain.to_string(),
                    mountpoint: Some(mountpoint),
                    state: MountState::Mounted,
                    note,
                })
            }
            (Err(spawn_err), true) => {
                warn!("Mount helper error for {}: {} (mount is live)", domain, spawn_err);
                self.transition(domain, MountState::Mounting, MountState::Mounted);
                Ok(MountOutcome {
                    domain: domain.to_string(),
                    mountpoint: Some(mountpoint),
                    state: MountState::Mounted,
                    note: MountNote::ConfirmedDespiteExit(spawn_err.to_string()),
                })
            }
            (exit, false) => {
                self.transition(domain, MountState::Mounting, MountState::Unmounted);
                let message = match exit {
                    Ok(outcome) if outcome.success => {
                        "helper exited successfully but the mount never appeared".to_string()
                    }
                    Ok(outcome) => outcome.describe(),
                    Err(spawn_err) => format!("could not run helper: {}", spawn_err),
                };
                Err(MountError::MountFailed {
                    mountpoint,
                    message,
                    invocation: invocation.display(),
                })
            }
        }
    }

    /// Unmount the site mounted for `domain`
    pub async fn unmount(&self, domain: &str) -> Result<MountOutcome, MountError> {
        if !self.is_supported() {
            return Ok(MountOutcome::unsupported(domain));
        }

        let table = self.system.mount_table().await?;
        let (mountpoint, mounted) = self.locate(&table, domain).await;
        if !mounted {
            info!("{} is not mounted", domain);
            return Ok(MountOutcome {
                domain: domain.to_string(),
                mountpoint: Some(mountpoint),
                state: MountState::Unmounted,
                note: MountNote::NotMounted,
            });
        }

        self.transition(domain, MountState::Mounted, MountState::Unmounting);

        let primary = self.system.unmount(&mountpoint).await;
        if succeeded(&primary) && !self.wait_for_table(&mountpoint, false).await? {
            self.transition(domain, MountState::Unmounting, MountState::Unmounted);
            return Ok(MountOutcome {
                domain: domain.to_string(),
                mountpoint: Some(mountpoint),
                state: MountState::Unmounted,
                note: MountNote::Unmounted,
            });
        }
        debug!("Regular unmount of {} failed: {}", mountpoint.display(), describe(&primary));

        let forced = self.system.force_unmount(&mountpoint).await;
        if succeeded(&forced) && !self.wait_for_table(&mountpoint, false).await? {
            self.transition(domain, MountState::Unmounting, MountState::Unmounted);
            return Ok(MountOutcome {
                domain: domain.to_string(),
                mountpoint: Some(mountpoint),
                state: MountState::Unmounted,
                note: MountNote::ForceUnmounted,
            });
        }

        // Back to Unmounted in the state machine; the table still says mounted
        self.transition(domain, MountState::Unmounting, MountState::Unmounted);
        Err(MountError::UnmountFailed {
            mountpoint,
            details: format!("umount: {}; diskutil: {}", describe(&primary), describe(&forced)),
        })
    }

    /// Derived mountpoint and live status for every domain. Creates nothing;
    /// empty when mounts are unsupported.
    pub async fn list_mounts(&self, domains: &[String]) -> Result<Vec<MountStatus>, MountError> {
        if !self.is_supported() {
            return Ok(Vec::new());
        }
        let table = self.system.mount_table().await?;
        let mut statuses = Vec::with_capacity(domains.len());
        for domain in domains {
            let (mountpoint, mounted) = self.locate(&table, domain).await;
            statuses.push(MountStatus {
                domain: domain.clone(),
                mountpoint,
                mounted,
            });
        }
        Ok(statuses)
    }

    /// Whichever candidate the table shows mounted, else the mountpoint the
    /// domain would use. Never touches a mounted path, which may be wedged.
    async fn locate(&self, table: &str, domain: &str) -> (PathBuf, bool) {
        let candidates = [
            self.paths.shared_candidate(domain),
            self.paths.fallback_candidate(domain),
        ];
        for candidate in candidates {
            if is_target_mounted(table, &candidate) {
                return (candidate, true);
            }
        }
        (self.paths.resolve(domain).await, false)
    }

    /// Poll the table until the mountpoint reaches `want`, returning the
    /// last observed state
    async fn wait_for_table(&self, mountpoint: &Path, want: bool) -> Result<bool, MountError> {
        let mut mounted = self.is_mounted(mountpoint).await?;
        for _ in 1..self.settle_attempts {
            if mounted == want {
                break;
            }
            tokio::time::sleep(self.settle_delay).await;
            mounted = self.is_mounted(mountpoint).await?;
        }
        Ok(mounted)
    }

    fn transition(&self, domain: &str, from: MountState, to: MountState) {
        info!("Mount {}: {:?} -> {:?}", domain, from, to);
    }
}

fn succeeded(result: &std::io::Result<CommandOutcome>) -> bool {
    matches!(result, Ok(outcome) if outcome.success)
}

fn describe(result: &std::io::Result<CommandOutcome>) -> String {
    match result {
        Ok(outcome) => outcome.describe(),
        Err(e) => e.to_string(),
    }
}
