//! Configuration management for wpsync.
//!
//! Configuration is read from `~/.config/wpsync/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::sync::SyncConfig;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
}

/// Where to fetch posts from and how to address pages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Endpoint that returns one page of posts as XML
    pub path: String,
    /// Category filter, empty for all posts
    pub category_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Query parameter carrying the category (default: "category")
    pub category_param: String,
    /// Query parameter carrying the 1-based page number (default: "paged")
    pub page_param: String,
    /// Element name of a single post in the response (default: "post")
    pub item_element: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            category_id: String::new(),
            username: None,
            password: None,
            category_param: "category".to_string(),
            page_param: "paged".to_string(),
            item_element: "post".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            server_path: self.path.clone(),
            category_id: self.category_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            category_param: self.category_param.clone(),
            page_param: self.page_param.clone(),
            item_element: self.item_element.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("wpsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/wpsync/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("wpsync").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# wpsync configuration

[server]
# Endpoint returning one page of posts as XML
path = ""

# Category filter (leave empty for all categories)
category_id = ""

# Basic auth credentials (optional)
# username = "editor"
# password = "secret"

# Query parameter names used to address a page
category_param = "category"
page_param = "paged"

# Element wrapping a single post in the response
item_element = "post"

[http]
# Request timeout in seconds
timeout_secs = 30
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
