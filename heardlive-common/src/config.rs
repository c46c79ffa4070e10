//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file resolved in priority
//! order:
//! 1. Command-line argument (highest priority)
//! 2. `HEARDLIVE_CONFIG` environment variable
//! 3. `<config_dir>/heardlive/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file is never fatal: the service logs a warning and starts
//! with defaults. Credentials are then overlaid from the environment,
//! which wins over the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "HEARDLIVE_CONFIG";

pub const SUPABASE_URL_ENV: &str = "HEARDLIVE_SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "HEARDLIVE_SUPABASE_ANON_KEY";
pub const SPOTIFY_CLIENT_ID_ENV: &str = "HEARDLIVE_SPOTIFY_CLIENT_ID";
pub const SPOTIFY_CLIENT_SECRET_ENV: &str = "HEARDLIVE_SPOTIFY_CLIENT_SECRET";

/// Which implementation backs the external collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Supabase-compatible auth/REST/storage plus the Spotify catalog
    #[default]
    Supabase,
    /// In-process stand-ins, for local development
    Memory,
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub bind_address: Option<String>,
    pub backend: BackendKind,
    pub supabase: SupabaseSettings,
    pub spotify: SpotifySettings,
    pub search: SearchSettings,
    pub avatar: AvatarSettings,
    pub sessions: SessionSettings,
    pub http: HttpSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseSettings {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub avatar_bucket: String,
}

impl Default for SupabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            avatar_bucket: "avatars".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifySettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub accounts_url: String,
    pub api_url: String,
}

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            accounts_url: "https://accounts.spotify.com".to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub debounce_ms: u64,
    pub result_limit: usize,
    pub companion_debounce_ms: u64,
    pub companion_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            result_limit: 10,
            companion_debounce_ms: 300,
            companion_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    pub max_bytes: usize,
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub idle_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 2 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    pub const DEFAULT_BIND_ADDRESS: &'static str = "127.0.0.1:5740";

    pub fn bind_address(&self) -> &str {
        self.bind_address
            .as_deref()
            .unwrap_or(Self::DEFAULT_BIND_ADDRESS)
    }

    /// Overlay credentials from environment variables
    pub fn apply_env_overrides(&mut self) {
        fn non_empty(var: &str) -> Option<String> {
            std::env::var(var).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(url) = non_empty(SUPABASE_URL_ENV) {
            self.supabase.url = Some(url);
        }
        if let Some(key) = non_empty(SUPABASE_ANON_KEY_ENV) {
            self.supabase.anon_key = Some(key);
        }
        if let Some(id) = non_empty(SPOTIFY_CLIENT_ID_ENV) {
            self.spotify.client_id = Some(id);
        }
        if let Some(secret) = non_empty(SPOTIFY_CLIENT_SECRET_ENV) {
            self.spotify.client_secret = Some(secret);
        }
    }

    /// Check that the selected backend has what it needs
    pub fn validate(&self) -> Result<()> {
        if self.search.result_limit == 0 || self.search.companion_limit == 0 {
            return Err(Error::Config("search limits must be at least 1".to_string()));
        }

        if self.backend == BackendKind::Memory {
            return Ok(());
        }

        let missing: Vec<&str> = [
            ("supabase.url", &self.supabase.url, SUPABASE_URL_ENV),
            ("supabase.anon_key", &self.supabase.anon_key, SUPABASE_ANON_KEY_ENV),
            ("spotify.client_id", &self.spotify.client_id, SPOTIFY_CLIENT_ID_ENV),
            ("spotify.client_secret", &self.spotify.client_secret, SPOTIFY_CLIENT_SECRET_ENV),
        ]
        .into_iter()
        .filter(|(_, value, _)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(key, _, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "missing settings: {}. Set them in the TOML config or via \
                 {}, {}, {}, {}",
                missing.join(", "),
                SUPABASE_URL_ENV,
                SUPABASE_ANON_KEY_ENV,
                SPOTIFY_CLIENT_ID_ENV,
                SPOTIFY_CLIENT_SECRET_ENV
            )))
        }
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("heardlive").join("config.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation and environment overlay
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            read_toml_config(&path)?
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            TomlConfig::default()
        }
        None => {
            info!("No config file found, using defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    Ok(config)
}
