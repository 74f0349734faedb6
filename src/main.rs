use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table};

use siteferry_lib::config::{require_site, ConfigFile, ConfigStorage, SiteIdentity, StorageError};
use siteferry_lib::interactive::InteractiveContext;
use siteferry_lib::mount::{MountError, MountManager, MountNote, MountStatus};
use siteferry_lib::sftp::{clear_site_dir, sync_site, SftpError, SyncResult};
use siteferry_lib::ssh::{AuthMethod, TransferCredentials};

/// Sync local trees to sandboxed SFTP sites and mount them locally
#[derive(Parser)]
#[command(name = "siteferry")]
#[command(author, version)]
#[command(propagate_version = true)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage known sites
    #[command(subcommand)]
    Site(SiteCommand),

    /// Upload changed files from LOCAL into the site
    Sync {
        domain: String,
        local: PathBuf,
        /// Remote directory, relative to the site's working directory
        remote: Option<String>,
        /// Delete remote files with no local counterpart
        #[arg(long)]
        clean: bool,
        /// Report what would change without touching the remote side
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete everything inside a remote directory, keeping the directory
    Clear { domain: String, remote: String },

    /// Mount the site as a local volume (macOS)
    Mount {
        domain: String,
        remote: Option<String>,
        /// Never attach the helper to this terminal
        #[arg(long)]
        no_interactive: bool,
    },

    /// Unmount the site's volume
    Unmount { domain: String },

    /// Show mount status for every known site
    Mounts,
}

#[derive(Subcommand)]
enum SiteCommand {
    /// Add or replace a site
    Add {
        domain: String,
        /// Sandbox root on the server
        #[arg(long)]
        root: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 22)]
        port: u16,
        #[arg(long)]
        user: String,
        /// Private key; password authentication when omitted
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        order_id: Option<String>,
    },

    /// List known sites
    List,

    /// Change a site's working directory
    Cd { domain: String, target: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    siteferry_lib::init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// 2 for errors the user fixes by changing the invocation, 1 otherwise
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<SftpError>() {
        if matches!(e, SftpError::BoundaryViolation { .. } | SftpError::MissingCredentials(_)) {
            return 2;
        }
    }
    if let Some(e) = err.downcast_ref::<MountError>() {
        if matches!(
            e,
            MountError::InteractiveRequired { .. } | MountError::MissingCredentials(_)
        ) {
            return 2;
        }
    }
    if let Some(e) = err.downcast_ref::<StorageError>() {
        if e.is_usage() {
            return 2;
        }
    }
    1
}

async fn run(cli: Cli) -> Result<()> {
    let storage = ConfigStorage::new()?;
    let config = storage.load().await?;
    let interactive = InteractiveContext::new();

    match cli.command {
        Commands::Site(cmd) => site_command(cmd, &storage, &config).await,

        Commands::Sync {
            domain,
            local,
            remote,
            clean,
            dry_run,
        } => {
            let site = with_password(find_site(&config, &domain)?, &interactive)?;
            let result = sync_site(&site, &local, remote.as_deref(), clean, dry_run).await?;
            print_sync_result(&result, dry_run);
            Ok(())
        }

        Commands::Clear { domain, remote } => {
            let site = with_password(find_site(&config, &domain)?, &interactive)?;
            clear_site_dir(&site, &remote).await?;
            println!("Cleared {}", site.resolve(&remote)?);
            Ok(())
        }

        Commands::Mount {
            domain,
            remote,
            no_interactive,
        } => {
            let site = find_site(&config, &domain)?;
            let manager = MountManager::new(config.mount_helper.clone(), interactive);
            let attached = !no_interactive && std::io::stdin().is_terminal();
            let outcome = manager.mount(site, remote.as_deref(), attached).await?;
            match (&outcome.note, &outcome.mountpoint) {
                (MountNote::Unsupported, _) => println!("Live mounts are only supported on macOS"),
                (MountNote::AlreadyMounted, Some(mp)) => {
                    println!("{} is already mounted at {}", domain, mp.display())
                }
                (_, Some(mp)) => println!("Mounted {} at {}", domain, mp.display()),
                (_, None) => println!("Mounted {}", domain),
            }
            Ok(())
        }

        Commands::Unmount { domain } => {
            find_site(&config, &domain)?;
            let manager = MountManager::new(config.mount_helper.clone(), interactive);
            let outcome = manager.unmount(&domain).await?;
            match outcome.note {
                MountNote::Unsupported => println!("Live mounts are only supported on macOS"),
                MountNote::NotMounted => println!("{} is not mounted", domain),
                _ => println!("Unmounted {}", domain),
            }
            Ok(())
        }

        Commands::Mounts => {
            let manager = MountManager::new(config.mount_helper.clone(), interactive);
            if !manager.is_supported() {
                println!("Live mounts are only supported on macOS");
                return Ok(());
            }
            let statuses = manager.list_mounts(&config.domains()).await?;
            if statuses.is_empty() {
                println!("No sites configured");
            } else {
                println!("{}", mounts_table(&statuses));
            }
            Ok(())
        }
    }
}

async fn site_command(
    cmd: SiteCommand,
    storage: &ConfigStorage,
    config: &ConfigFile,
) -> Result<()> {
    match cmd {
        SiteCommand::Add {
            domain,
            root,
            host,
            port,
            user,
            key,
            account,
            order_id,
        } => {
            let auth = match key {
                Some(path) => AuthMethod::key(path, None),
                None => AuthMethod::password(""),
            };
            let mut site = SiteIdentity::new(domain.clone(), &root)
                .with_credentials(TransferCredentials::new(host, port, user, auth));
            site.display.account_username = account;
            site.display.order_id = order_id;
            storage.put_site(site).await?;
            println!("Saved {}", domain);
        }

        SiteCommand::List => {
            for site in &config.sites {
                let who = site
                    .credentials
                    .as_ref()
                    .map(|c| format!("{}@{}", c.username, c.address()))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<32} {:<40} {}", site.domain, site.cwd(), who);
            }
        }

        SiteCommand::Cd { domain, target } => {
            let cwd = storage.change_site_dir(&domain, &target).await?;
            println!("{}", cwd);
        }
    }
    Ok(())
}

fn find_site<'c>(config: &'c ConfigFile, domain: &str) -> Result<&'c SiteIdentity> {
    Ok(require_site(config, domain)?)
}

/// Copy of `site` with the (never persisted) password filled in
fn with_password(site: &SiteIdentity, interactive: &InteractiveContext) -> Result<SiteIdentity> {
    let mut site = site.clone();
    if let Some(credentials) = site.credentials.as_mut() {
        if credentials.needs_password() {
            if !std::io::stdin().is_terminal() {
                bail!("{} uses password authentication and stdin is not a terminal", site.domain);
            }
            let prompt = format!("Password for {}@{}: ", credentials.username, credentials.host);
            let password = interactive
                .prompt_secret(&prompt)
                .context("Failed to read password")?;
            credentials.auth = AuthMethod::password(password);
        }
    }
    Ok(site)
}

fn mounts_table(statuses: &[MountStatus]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Domain", "Status", "Mountpoint"]);
    for status in statuses {
        let state = if status.mounted {
            Cell::new("mounted").fg(Color::Green)
        } else {
            Cell::new("-")
        };
        table.add_row(vec![
            Cell::new(&status.domain),
            state,
            Cell::new(status.mountpoint.display()),
        ]);
    }
    table
}

fn print_sync_result(result: &SyncResult, dry_run: bool) {
    let (upload_verb, delete_verb) = if dry_run {
        ("would upload", "would delete")
    } else {
        ("uploaded", "deleted")
    };
    for path in &result.uploaded {
        println!("{} {}", upload_verb, path);
    }
    for path in &result.deleted {
        println!("{} {}", delete_verb, path);
    }
    println!(
        "{} {}, {} unchanged, {} {}",
        result.uploaded.len(),
        upload_verb,
        result.skipped.len(),
        result.deleted.len(),
        delete_verb
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mounts_table_rows() {
        let statuses = vec![
            MountStatus {
                domain: "example.com".to_string(),
                mountpoint: PathBuf::from("/Volumes/siteferry/example.com"),
                mounted: true,
            },
            MountStatus {
                domain: "other.org".to_string(),
                mountpoint: PathBuf::from("/Volumes/siteferry/other.org"),
                mounted: false,
            },
        ];

        let rendered = mounts_table(&statuses).to_string();
        assert!(rendered.contains("Domain"));
        assert!(rendered.contains("example.com"));
        assert!(rendered.contains("mounted"));
        assert!(rendered.contains("/Volumes/siteferry/other.org"));
    }

    #[test]
    fn test_unknown_site_is_usage_error() {
        let err: anyhow::Error = StorageError::SiteNotFound("nope.org".to_string()).into();
        assert_eq!(exit_code(&err), 2);
    }
}
