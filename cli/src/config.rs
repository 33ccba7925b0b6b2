//! Configuration loading for the tinysteps CLI.
//!
//! Values come from defaults, then `config.toml`, then `TINYSTEPS_*`
//! environment variables (`__` separates sections, e.g.
//! `TINYSTEPS_SYNC__ENDPOINT`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const APP_NAME: &str = "tinysteps";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "tinysteps.db";
const SERVER_DATABASE_FILE_NAME: &str = "server.db";
const API_KEY_FILE_NAME: &str = "api_key";

pub const DEFAULT_SYNC_ENDPOINT: &str = "https://keyvalue.xyz/8f1e5c2a";
pub const DEFAULT_KEY_PREFIX: &str = "tinysteps_v1_";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub insights: InsightsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for databases and the server API key.
    /// Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Overrides `<data_dir>/tinysteps.db`.
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the key-value service; snapshots live at
    /// `{endpoint}/{key_prefix}{sync_key}`.
    pub endpoint: String,
    pub key_prefix: String,
    /// Bearer token, needed when syncing against `tinysteps serve`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SYNC_ENDPOINT.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InsightsConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured API key, ignoring blank values.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME).context("Could not determine home directory")
}

fn check_url(field: &str, url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must be an http(s) URL, got '{url}'");
    }
    Ok(())
}

impl Config {
    /// Load configuration, reading `config_path` instead of the default file
    /// when given. A missing file is not an error.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        debug!(path = %config_file.display(), "loading configuration");

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(
                Env::raw()
                    .only(&["GEMINI_API_KEY"])
                    .map(|_| "insights.api_key".into()),
            )
            .merge(Env::prefixed("TINYSTEPS_").split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", config_file.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        check_url("sync.endpoint", &self.sync.endpoint)?;
        check_url("insights.endpoint", &self.insights.endpoint)?;
        if self.sync.key_prefix.contains('/') {
            bail!("sync.key_prefix must not contain '/'");
        }
        if self.sync.timeout_secs == 0 {
            bail!("sync.timeout_secs must be greater than 0");
        }
        if self.insights.timeout_secs == 0 {
            bail!("insights.timeout_secs must be greater than 0");
        }
        if self.insights.model.trim().is_empty() {
            bail!("insights.model must not be empty");
        }
        Ok(())
    }

    /// Resolve the data directory, creating it if needed.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.storage.data_dir {
            Some(dir) => dir.clone(),
            None => project_dirs()?.data_dir().to_path_buf(),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        Ok(dir)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join(DATABASE_FILE_NAME)),
        }
    }

    /// Database holding snapshots uploaded to `tinysteps serve`.
    pub fn server_db_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(SERVER_DATABASE_FILE_NAME))
    }

    /// Load the server API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        load_or_create_api_key_in(&self.data_dir()?)
    }
}

fn load_or_create_api_key_in(dir: &Path) -> Result<(String, bool)> {
    use rand::Rng;
    use std::fmt::Write;

    let path = dir.join(API_KEY_FILE_NAME);

    if path.exists() {
        let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
        let key = key.trim().to_string();
        if !key.is_empty() {
            return Ok((key, false));
        }
    }

    let bytes: [u8; 32] = rand::rng().random();
    let key = bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        });
    std::fs::write(&path, &key).context("Failed to write API key file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set API key file permissions")?;
    }
    info!(path = %path.display(), "generated server API key");
    Ok((key, true))
}
