//! Service settings.
//!
//! Sources (highest priority first):
//! 1. Command-line flags and environment variables (PLEXUS_*), via clap
//! 2. Settings file (.plexus/config.yaml)
//! 3. Defaults
//!
//! Settings file discovery:
//! - An explicit `--settings <path>` wins
//! - Otherwise the current directory and its parents are searched for .plexus/config.yaml
//! - Relative paths in the file are resolved against the directory holding `.plexus/`

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_DB_PATH: &str = "./store";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MAX_ITEMS: usize = 100;
pub const DEFAULT_ACTION_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Raw settings file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    pub http_addr: Option<String>,
    /// Store directory (relative to the project root)
    pub db_path: Option<String>,
    /// Trigger file (relative to the project root)
    pub config_file: Option<String>,
    pub max_items: Option<usize>,
    pub action_timeout_seconds: Option<u64>,
    pub max_upload_bytes: Option<usize>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub http_addr: Option<String>,
    pub db_path: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub max_items: Option<usize>,
    pub action_timeout_seconds: Option<u64>,
    /// Explicit settings file, bypassing discovery
    pub settings_file: Option<PathBuf>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub http_addr: SocketAddr,
    /// Directory holding the activity log and thumbnails
    pub db_path: PathBuf,
    /// Trigger configuration file
    pub config_file: PathBuf,
    /// Capacity of the activity log
    pub max_items: usize,
    /// Timeout applied to every outbound action request
    pub action_timeout: Duration,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Settings file that was used (if any)
    pub settings_file: Option<PathBuf>,
}

impl Settings {
    /// Directory for delivered thumbnails
    pub fn thumbs_dir(&self) -> PathBuf {
        self.db_path.join("thumbs")
    }
}

/// Find .plexus/config.yaml in `start` or one of its parents
pub fn find_settings_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(".plexus").join("config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse a settings file
pub fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Parse a listen address; a bare `:port` binds every interface
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr> {
    let value = value.trim();
    let candidate = if value.starts_with(':') {
        format!("0.0.0.0{}", value)
    } else {
        value.to_string()
    };

    candidate
        .parse()
        .with_context(|| format!("Invalid listen address: {}", value))
}

/// Directory that relative paths in a settings file are resolved against
fn settings_base_dir(settings_path: &Path) -> PathBuf {
    let parent = settings_path.parent().unwrap_or(Path::new("."));
    if parent.file_name().is_some_and(|n| n == ".plexus") {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Resolve settings from overrides, the settings file and defaults
pub fn resolve(overrides: SettingsOverrides) -> Result<Settings> {
    let settings_file = match overrides.settings_file.clone() {
        Some(path) => Some(path),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_settings_file(&cwd)),
    };

    let (file, base) = match &settings_file {
        Some(path) => (load_settings_file(path)?, settings_base_dir(path)),
        None => (SettingsFile::default(), PathBuf::from(".")),
    };

    resolve_with(overrides, file, &base, settings_file)
}

fn resolve_with(
    overrides: SettingsOverrides,
    file: SettingsFile,
    base: &Path,
    settings_file: Option<PathBuf>,
) -> Result<Settings> {
    let http_addr = overrides
        .http_addr
        .or(file.http_addr)
        .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());

    let db_path = overrides
        .db_path
        .or_else(|| file.db_path.as_deref().map(|p| resolve_path(base, p)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

    let config_file = overrides
        .config_file
        .or_else(|| file.config_file.as_deref().map(|p| resolve_path(base, p)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let max_items = overrides
        .max_items
        .or(file.max_items)
        .unwrap_or(DEFAULT_MAX_ITEMS);
    if max_items == 0 {
        anyhow::bail!("max_items must be at least 1");
    }

    let action_timeout_seconds = overrides
        .action_timeout_seconds
        .or(file.action_timeout_seconds)
        .unwrap_or(DEFAULT_ACTION_TIMEOUT_SECONDS);
    if action_timeout_seconds == 0 {
        anyhow::bail!("action timeout must be at least 1 second");
    }

    Ok(Settings {
        http_addr: parse_listen_addr(&http_addr)?,
        db_path,
        config_file,
        max_items,
        action_timeout: Duration::from_secs(action_timeout_seconds),
        max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        settings_file,
    })
}
