//! sealnote-daemon: workspace CLI and change-watching daemon.
//!
//! `init` / `create-vault` / `status` manage a workspace; `watch` unlocks a
//! vault and keeps its decrypted index caches consistent with external
//! writes (cloud-drive sync, other devices) until interrupted.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sealnote_core::{CryptoContext, KdfParams, Workspace};

use sealnote_daemon::native_fs::NativeFs;
use sealnote_daemon::reload::ReloadService;
use sealnote_daemon::watcher::{WorkspaceWatcher, DEFAULT_DEBOUNCE};

#[derive(Parser, Debug)]
#[command(name = "sealnote-daemon")]
#[command(about = "Encrypted local-first note store daemon")]
struct Args {
    /// Path to the workspace directory
    #[arg(short, long)]
    workspace: PathBuf,

    /// Workspace password
    #[arg(long, env = "SEALNOTE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new workspace
    Init,
    /// Create a vault in the workspace
    CreateVault {
        /// Display name for the vault
        name: String,
        /// Enable sync for this vault
        #[arg(long)]
        sync: bool,
    },
    /// List vaults (reads plaintext metadata, no password needed)
    Status,
    /// Watch for external changes and keep index caches fresh
    Watch {
        /// Vault id to watch
        vault_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let ctx = CryptoContext::new();
    let fs = Arc::new(NativeFs::new(args.workspace.clone()));

    match args.command {
        Command::Init => {
            let password = require_password(&args.password)?;
            Workspace::create(fs, &ctx, password, KdfParams::default())
                .await
                .context("failed to create workspace")?;
            println!("Workspace created at {}", args.workspace.display());
        }

        Command::CreateVault { name, sync } => {
            let password = require_password(&args.password)?;
            let mut workspace = Workspace::open(fs).await.context("failed to open workspace")?;
            workspace
                .unlock(&ctx, password)
                .await
                .context("incorrect password")?;

            let meta = workspace.create_vault(&ctx, &name, sync).await?;
            println!("Created vault {} ({})", meta.name, meta.vault_id);
        }

        Command::Status => {
            let workspace = Workspace::open(fs).await.context("failed to open workspace")?;
            let vaults = workspace.discover_vaults().await?;

            if vaults.is_empty() {
                println!("No vaults");
            }
            for meta in vaults {
                println!(
                    "{}  {}  created {}",
                    meta.vault_id,
                    meta.name,
                    meta.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Command::Watch { vault_id } => {
            let password = require_password(&args.password)?;
            let mut workspace = Workspace::open(fs).await.context("failed to open workspace")?;
            workspace
                .unlock(&ctx, password)
                .await
                .context("incorrect password")?;

            let vault = workspace
                .unlock_vault(&ctx, &vault_id)
                .await
                .with_context(|| format!("failed to unlock vault {}", vault_id))?;
            info!("Watching vault {} ({})", vault.metadata().name, vault_id);

            let service = ReloadService::new(ctx, vault);
            service.prime().await.context("initial index load failed")?;

            let mut watcher = WorkspaceWatcher::start(
                args.workspace.clone(),
                vec![".enc".to_string()],
                DEFAULT_DEBOUNCE,
            )
            .context("failed to start file watcher")?;

            loop {
                tokio::select! {
                    change = watcher.event_rx().recv() => {
                        match change {
                            Some(change) => {
                                if service.handle_change(&change).await {
                                    let cache = service.cache();
                                    let cache = cache.read().await;
                                    info!(
                                        "Index refreshed: {} notes, {} notebooks, {} tags",
                                        cache.notes.len(),
                                        cache.notebooks.len(),
                                        cache.tags.len()
                                    );
                                }
                            }
                            None => {
                                warn!("Watcher channel closed, exiting");
                                break;
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, shutting down");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn require_password(password: &Option<String>) -> Result<&str> {
    match password {
        Some(p) => Ok(p.as_str()),
        None => bail!("a password is required (--password or SEALNOTE_PASSWORD)"),
    }
}
