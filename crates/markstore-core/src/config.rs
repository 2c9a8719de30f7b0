//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/markstore/config.toml)
//! 3. Environment variables (MARKSTORE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable prefix
const ENV_PREFIX: &str = "MARKSTORE";

/// Database file name inside the data directory
const DB_FILE_NAME: &str = "bookmarks.db";

/// Browser-like user agent; some sites refuse unknown clients
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Explicit database file, overriding `data_dir/bookmarks.db`
    #[serde(default)]
    pub db_file: Option<PathBuf>,

    /// Worker threads for network refresh
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// HTTP client settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Settings passed to the HTTP fetcher at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Proxy URL; credentials in the URL are used for proxy auth
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: None,
            threads: default_threads(),
            log_file: None,
            fetch: FetchConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            proxy: None,
            max_redirects: default_max_redirects(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (MARKSTORE_DATA_DIR, MARKSTORE_DB_FILE, ...)
    /// 2. Config file (~/.config/markstore/config.toml or MARKSTORE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_var("DB_FILE") {
            self.db_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Some(val) = env_var("THREADS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.threads = n,
                _ => warn!(value = %val, "Ignoring invalid {}_THREADS", ENV_PREFIX),
            }
        }

        if let Some(val) = env_var("USER_AGENT") {
            if !val.is_empty() {
                self.fetch.user_agent = val;
            }
        }

        // MARKSTORE_PROXY wins; the conventional https_proxy only fills a gap
        if let Some(val) = env_var("PROXY") {
            self.fetch.proxy = if val.is_empty() { None } else { Some(val) };
        } else if self.fetch.proxy.is_none() {
            self.fetch.proxy = std::env::var("https_proxy").ok().filter(|v| !v.is_empty());
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with MARKSTORE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("markstore")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn db_path(&self) -> PathBuf {
        self.db_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DB_FILE_NAME))
    }

    /// Refresh worker count, never zero
    pub fn worker_threads(&self) -> usize {
        self.threads.max(1)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("markstore")
}

fn default_threads() -> usize {
    4
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "MARKSTORE_DATA_DIR",
        "MARKSTORE_DB_FILE",
        "MARKSTORE_THREADS",
        "MARKSTORE_PROXY",
        "MARKSTORE_USER_AGENT",
        "https_proxy",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.threads, 4);
        assert!(config.db_file.is_none());
        assert!(config.data_dir.ends_with("markstore"));
        assert_eq!(config.fetch.timeout_secs, 15);
        assert_eq!(config.fetch.max_redirects, 10);
        assert_eq!(config.fetch.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_db_path() {
        let mut config = Config {
            data_dir: PathBuf::from("/data/markstore"),
            ..Config::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/data/markstore/bookmarks.db"));

        config.db_file = Some(PathBuf::from("/elsewhere/b.db"));
        assert_eq!(config.db_path(), PathBuf::from("/elsewhere/b.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("MARKSTORE_DATA_DIR", "/tmp/markstore-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/markstore-test"));
    }

    #[test]
    fn test_env_override_threads() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("MARKSTORE_THREADS", "12");
        config.apply_env_overrides();
        assert_eq!(config.threads, 12);

        env::set_var("MARKSTORE_THREADS", "zero");
        config.apply_env_overrides();
        assert_eq!(config.threads, 12);

        env::set_var("MARKSTORE_THREADS", "0");
        config.apply_env_overrides();
        assert_eq!(config.threads, 12);
    }

    #[test]
    fn test_env_override_proxy() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("https_proxy", "http://fallback:3128");
        config.apply_env_overrides();
        assert_eq!(config.fetch.proxy.as_deref(), Some("http://fallback:3128"));

        env::set_var("MARKSTORE_PROXY", "http://preferred:8080");
        config.apply_env_overrides();
        assert_eq!(config.fetch.proxy.as_deref(), Some("http://preferred:8080"));

        // Empty string clears it
        env::set_var("MARKSTORE_PROXY", "");
        config.apply_env_overrides();
        assert!(config.fetch.proxy.is_none());
    }

    #[test]
    fn test_worker_threads_never_zero() {
        let config = Config {
            threads: 0,
            ..Config::default()
        };
        assert_eq!(config.worker_threads(), 1);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/markstore"),
            db_file: Some(PathBuf::from("/data/other.db")),
            threads: 8,
            log_file: None,
            fetch: FetchConfig {
                proxy: Some("http://proxy:3128".to_string()),
                ..FetchConfig::default()
            },
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("[fetch]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            threads = 2

            [fetch]
            timeout_secs = 5
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.threads, 2);
        assert_eq!(config.fetch.timeout_secs, 5);
        assert_eq!(config.fetch.max_redirects, 10);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.threads, 4);
        assert!(config.fetch.proxy.is_none());
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let _guard = EnvGuard::new(ENV_VARS);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "threads = [not toml").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }
}
