//! Configuration for voxsync.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VOXSYNC_HOME, VOXSYNC_REMOTE_URL, GEMINI_API_KEY, ...)
//! 2. Config file ($VOXSYNC_HOME/config.yaml)
//! 3. Defaults (~/.voxsync)
//!
//! All sections in the config file are optional: with no file at all the
//! engine runs fully local (no remote backend, no backup) as long as an
//! AI key is present in the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 30;
const DEFAULT_BACKUP_ROOT: &str = "Voice Notes";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub ai: Option<AiConfig>,
    #[serde(default)]
    pub drive: Option<DriveConfig>,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

/// Remote sync backend. Absent means sync is disabled and processing runs
/// against the AI service directly.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Google Drive backup. Absent means backup commands are unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where the OAuth token is persisted (default: $VOXSYNC_HOME/drive_token.json)
    pub token_path: Option<String>,
    /// Name of the top-level backup folder (default: "Voice Notes")
    pub root_folder: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    pub drain_interval_secs: Option<u64>,
}

/// Resolved configuration with env overrides applied
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine state directory
    pub home: PathBuf,
    pub remote: Option<RemoteConfig>,
    pub ai: AiConfig,
    pub drive: Option<DriveConfig>,
    pub drain_interval: Duration,
}

impl Config {
    /// Load configuration from the home directory and the environment
    pub fn load() -> Result<Self> {
        let home = match std::env::var("VOXSYNC_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(".voxsync"),
        };

        let file = load_config_file(&home.join("config.yaml"))?;
        Ok(Self::resolve(home, file))
    }

    fn resolve(home: PathBuf, file: ConfigFile) -> Self {
        let mut remote = file.remote;
        if let Ok(url) = std::env::var("VOXSYNC_REMOTE_URL") {
            let api_key = remote.as_ref().and_then(|r| r.api_key.clone());
            remote = Some(RemoteConfig { base_url: url, api_key });
        }
        if let (Some(remote), Ok(key)) = (remote.as_mut(), std::env::var("VOXSYNC_REMOTE_KEY")) {
            remote.api_key = Some(key);
        }

        let mut ai = file.ai.unwrap_or_default();
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            ai.api_key = Some(key);
        }

        let drain_interval = file
            .scheduler
            .and_then(|s| s.drain_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_DRAIN_INTERVAL_SECS));

        Self {
            home,
            remote,
            ai,
            drive: file.drive,
            drain_interval,
        }
    }

    /// Directory the local store persists into ($VOXSYNC_HOME/data)
    pub fn data_dir(&self) -> PathBuf {
        self.home.join("data")
    }

    pub fn ai_model(&self) -> String {
        self.ai
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Where the Drive OAuth token lives
    pub fn drive_token_path(&self) -> PathBuf {
        self.drive
            .as_ref()
            .and_then(|d| d.token_path.as_ref())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.home.join("drive_token.json"))
    }

    pub fn backup_root_folder(&self) -> String {
        self.drive
            .as_ref()
            .and_then(|d| d.root_folder.clone())
            .unwrap_or_else(|| DEFAULT_BACKUP_ROOT.to_string())
    }
}

/// Load and parse the config file; a missing file is an empty config
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
