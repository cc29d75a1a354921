use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds before an in-flight request is aborted
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Largest accepted upload, in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    300
}

fn default_db_url() -> String {
    "sqlite:data/gamevault.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_local_path() -> String {
    "uploads".to_string()
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl StorageConfig {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.local_path)
    }
}

impl DatabaseConfig {
    /// On-disk location of a file-backed SQLite database, if the URL names one
    pub fn sqlite_file(&self) -> Option<&Path> {
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(Path::new(path))
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Storage root: {}, max upload size: {} bytes",
            config.storage.local_path,
            config.storage.max_upload_size
        );
        Ok(config)
    }

    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from a variable lookup.
    /// Format: GV_CONF_<SECTION>_<KEY>; the legacy `PORT` and `HOST_DB` are
    /// read first so the prefixed names take precedence.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Legacy deployment variables
        if let Some(val) = lookup("PORT") {
            set_parsed(&mut self.server.port, "PORT", &val);
        }
        if let Some(val) = lookup("HOST_DB") {
            self.database.url = val;
        }

        // Server overrides
        if let Some(val) = lookup("GV_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("GV_CONF_SERVER_PORT") {
            set_parsed(&mut self.server.port, "GV_CONF_SERVER_PORT", &val);
        }
        if let Some(val) = lookup("GV_CONF_SERVER_REQUEST_TIMEOUT") {
            set_parsed(
                &mut self.server.request_timeout,
                "GV_CONF_SERVER_REQUEST_TIMEOUT",
                &val,
            );
        }

        // Database overrides
        if let Some(val) = lookup("GV_CONF_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = lookup("GV_CONF_DATABASE_MAX_CONNECTIONS") {
            set_parsed(
                &mut self.database.max_connections,
                "GV_CONF_DATABASE_MAX_CONNECTIONS",
                &val,
            );
        }

        // Storage overrides
        if let Some(val) = lookup("GV_CONF_STORAGE_LOCAL_PATH") {
            if !val.trim().is_empty() {
                self.storage.local_path = val;
            }
        }
        if let Some(val) = lookup("GV_CONF_STORAGE_MAX_UPLOAD_SIZE") {
            set_parsed(
                &mut self.storage.max_upload_size,
                "GV_CONF_STORAGE_MAX_UPLOAD_SIZE",
                &val,
            );
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.database.sqlite_file().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::create_dir_all(&self.storage.local_path)?;

        Ok(())
    }
}

fn set_parsed<T: FromStr>(target: &mut T, key: &str, val: &str) {
    match val.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => tracing::warn!("Ignoring invalid value for {}: {:?}", key, val),
    }
}
