/// Application configuration and the context threaded into every operation
///
/// The configuration is a JSON file in the user's data directory:
/// - Linux: ~/.local/share/dirt-locker/config.json
/// - macOS: ~/Library/Application Support/dirt-locker/config.json
/// - Windows: %APPDATA%\dirt-locker\config.json
///
/// A missing file is created with defaults on first start.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{LockerError, LockerResult};
use crate::remote::{ContentFetcher, HttpClient, UserDirectory};
use crate::storage::cache::DirtStorage;

const APP_DIR: &str = "dirt-locker";
const TOKEN_ENV: &str = "DIRT_LOCKER_DISCORD_TOKEN";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Root of the on-disk image cache (holds `dirt/` and `avatars/`)
    pub cache_dir: PathBuf,
    /// Discord REST API base, without trailing slash
    pub discord_api_base: String,
    /// Bot token used for user lookups
    pub discord_token: Option<String>,
    /// Maximum number of rows hydrated at the same time during a reload
    pub hydration_concurrency: usize,
    /// Timeout applied to every HTTP request
    pub request_timeout_secs: u64,
    /// How long a copied cell shows its "Copied" state
    pub copy_feedback_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let cache_dir = dirs_next::cache_dir()
            .or_else(dirs_next::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            database_path: data_dir.join("dirt_locker.db"),
            cache_dir,
            discord_api_base: "https://discord.com/api/v10".to_string(),
            discord_token: None,
            hydration_concurrency: 8,
            request_timeout_secs: 20,
            copy_feedback_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load the configuration from the default location, creating it if needed.
    /// The token environment variable wins over the file.
    pub fn load() -> LockerResult<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.discord_token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from an explicit path, writing defaults there if the file is absent
    pub fn load_from(path: &Path) -> LockerResult<Self> {
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_string_pretty(&config)?)?;
            info!(path = %path.display(), "📝 Wrote default configuration");
            return Ok(config);
        }

        let raw = fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> LockerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn validate(&self) -> LockerResult<()> {
        if self.hydration_concurrency == 0 {
            return Err(LockerError::Config(
                "hydration_concurrency must be at least 1".to_string(),
            ));
        }
        if self.discord_token.is_none() {
            warn!("No Discord token configured, user lookups will be rejected");
        }
        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    pub fn copy_feedback(&self) -> Duration {
        Duration::from_millis(self.copy_feedback_ms)
    }
}

/// Everything a background operation needs: configuration, the cache, and
/// the remote services. Cheap to clone behind an `Arc`.
pub struct AppContext {
    pub config: AppConfig,
    pub storage: DirtStorage,
    pub users: Arc<dyn UserDirectory>,
    pub fetcher: Arc<dyn ContentFetcher>,
}

impl AppContext {
    /// Build a context backed by the real HTTP services
    pub fn new(config: AppConfig) -> LockerResult<Self> {
        let client = Arc::new(HttpClient::new(&config)?);
        Self::with_services(config, client.clone(), client)
    }

    pub fn with_services(
        config: AppConfig,
        users: Arc<dyn UserDirectory>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> LockerResult<Self> {
        let storage = DirtStorage::new(&config.cache_dir)?;
        Ok(Self {
            config,
            storage,
            users,
            fetcher,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database_path
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .finish()
    }
}
