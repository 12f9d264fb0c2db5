use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::FetchOptions;
use crate::store::{StorePolicy, DEFAULT_PAGE_SIZE};

/// Environment variable overriding `api.url`
pub const API_URL_ENV: &str = "REPOLENS_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub search: SearchConfig,
  pub state: StateConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Root URL of the search service
  pub url: String,
  /// Per-request timeout
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:8000".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// How long fetched data is considered fresh
  pub stale_time_secs: u64,
  /// How long unobserved data stays cached
  pub gc_time_secs: u64,
  /// Retries after a transient failure
  pub retry: u32,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let defaults = FetchOptions::default();
    Self {
      stale_time_secs: defaults.stale_time.as_secs(),
      gc_time_secs: defaults.gc_time.as_secs(),
      retry: defaults.retry_count,
    }
  }
}

impl CacheConfig {
  pub fn fetch_options(&self) -> FetchOptions {
    FetchOptions {
      stale_time: Duration::from_secs(self.stale_time_secs),
      gc_time: Duration::from_secs(self.gc_time_secs),
      retry_count: self.retry,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  pub page_size: NonZeroU32,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
  /// Reset to page 1 when a single filter field is edited
  pub filter_edit_resets_page: bool,
}

impl StateConfig {
  pub fn policy(&self) -> StorePolicy {
    StorePolicy {
      filter_edit_resets_page: self.filter_edit_resets_page,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive; `RUST_LOG` takes precedence
  pub level: String,
  /// Directory for log files (default: $XDG_DATA_HOME/repolens/logs)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./repolens.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/repolens/config.yaml
  ///
  /// Without a file the defaults apply. `REPOLENS_API_URL` overrides the
  /// service URL either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      if !url.trim().is_empty() {
        config.api.url = url;
      }
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("repolens.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("repolens").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Check values serde cannot.
  pub fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api.url)
      .map_err(|e| eyre!("Invalid api.url '{}': {}", self.api.url, e))?;
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be greater than zero"));
    }
    Ok(())
  }
}
