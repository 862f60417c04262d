//! Command-line interface for plexus.
//!
//! Provides commands for running the webhook receiver, inspecting the
//! persisted activity log, validating trigger files and showing the
//! resolved settings.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{self, Settings, SettingsOverrides};
use crate::core::{build_http_client, read_snapshot, ActivityStore, Dispatcher, ThumbStore, TriggerConfig};
use crate::http;

/// plexus - media server webhook receiver
#[derive(Parser, Debug)]
#[command(name = "plexus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Settings file (skips .plexus/config.yaml discovery)
    #[arg(long, global = true, env = "PLEXUS_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// HTTP listen address (":3000" binds every interface)
    #[arg(long, global = true, env = "PLEXUS_HTTP_ADDR")]
    pub http_addr: Option<String>,

    /// Directory holding the activity log and thumbnails
    #[arg(long, global = true, env = "PLEXUS_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Trigger configuration file
    #[arg(long, global = true, env = "PLEXUS_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Number of deliveries kept in the activity log
    #[arg(long, global = true, env = "PLEXUS_MAX_ITEMS")]
    pub max_items: Option<usize>,

    /// Timeout for outbound action requests, in seconds
    #[arg(long, global = true, env = "PLEXUS_ACTION_TIMEOUT")]
    pub action_timeout: Option<u64>,
}

impl From<SettingsArgs> for SettingsOverrides {
    fn from(args: SettingsArgs) -> Self {
        Self {
            http_addr: args.http_addr,
            db_path: args.db_path,
            config_file: args.config_file,
            max_items: args.max_items,
            action_timeout_seconds: args.action_timeout,
            settings_file: args.settings,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Receive webhooks over HTTP
    Serve,

    /// Show recorded deliveries
    Activity {
        /// Maximum number of entries to show (most recent)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Load a trigger file and summarize it
    CheckConfig {
        /// Trigger file (defaults to the configured one)
        file: Option<PathBuf>,
    },

    /// Show resolved settings (debug)
    Settings,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = config::resolve(self.settings.into())?;

        match self.command {
            Commands::Serve => serve(settings).await,
            Commands::Activity { limit } => show_activity(&settings, limit).await,
            Commands::CheckConfig { file } => {
                check_config(&file.unwrap_or_else(|| settings.config_file.clone()))
            }
            Commands::Settings => {
                show_settings(&settings);
                Ok(())
            }
        }
    }
}

/// Run the HTTP receiver until interrupted
async fn serve(settings: Settings) -> Result<()> {
    let triggers = TriggerConfig::from_file(&settings.config_file).with_context(|| {
        format!(
            "Failed to load trigger config: {}",
            settings.config_file.display()
        )
    })?;
    info!(
        triggers = triggers.len(),
        file = %settings.config_file.display(),
        "Loaded triggers"
    );

    let store = ActivityStore::open_dir(&settings.db_path, settings.max_items)
        .await
        .with_context(|| format!("Failed to open store: {}", settings.db_path.display()))?;

    let client = build_http_client(settings.action_timeout)
        .context("Failed to build outbound HTTP client")?;

    let dispatcher =
        Dispatcher::new(store, triggers, client).with_thumbs(ThumbStore::new(settings.thumbs_dir()));

    let listener = TcpListener::bind(settings.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.http_addr))?;
    info!(addr = %settings.http_addr, "Starting server");

    http::serve(
        listener,
        Arc::new(dispatcher),
        settings.max_upload_bytes,
        shutdown_signal(),
    )
    .await
    .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested");
}

/// Print the most recent recorded deliveries
async fn show_activity(settings: &Settings, limit: usize) -> Result<()> {
    let entries = read_snapshot(&settings.db_path)
        .await
        .with_context(|| format!("Failed to read store: {}", settings.db_path.display()))?;

    if entries.is_empty() {
        println!("No activity recorded");
        return Ok(());
    }

    println!(
        "{:<26} {:<38} {:<22} {}",
        "RECEIVED", "REQUEST ID", "EVENT", "TITLE"
    );
    println!("{}", "-".repeat(100));

    let skip = entries.len().saturating_sub(limit);
    for entry in entries.iter().skip(skip) {
        println!(
            "{:<26} {:<38} {:<22} {}",
            entry.received_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            entry.request_id,
            entry.payload.event,
            entry.payload.title().unwrap_or("-")
        );
    }

    Ok(())
}

/// Load a trigger file and print what it contains
fn check_config(path: &std::path::Path) -> Result<()> {
    let triggers = TriggerConfig::from_file(path)
        .with_context(|| format!("Invalid trigger config: {}", path.display()))?;

    println!("Trigger file: {}", path.display());
    println!("Triggers: {}", triggers.len());

    for (index, trigger) in triggers.triggers().iter().enumerate() {
        println!();
        println!("[{}]", index);
        if trigger.properties().is_empty() {
            println!("  properties: (matches every event)");
        } else {
            println!("  properties:");
            for (path, value) in trigger.properties() {
                println!("    {} = {}", path, value);
            }
        }
        println!("  actions:");
        if trigger.actions().is_empty() {
            println!("    (none)");
        }
        for action in trigger.actions() {
            println!("    {}", action);
        }
    }

    Ok(())
}

fn show_settings(settings: &Settings) {
    let source = settings
        .settings_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string());

    println!("Settings file: {}", source);
    println!();
    println!("  HTTP address:     {}", settings.http_addr);
    println!("  Store directory:  {}", settings.db_path.display());
    println!("  Thumbnails:       {}", settings.thumbs_dir().display());
    println!("  Trigger file:     {}", settings.config_file.display());
    println!("  Max items:        {}", settings.max_items);
    println!("  Action timeout:   {}s", settings.action_timeout.as_secs());
    println!("  Max upload size:  {} bytes", settings.max_upload_bytes);
}
