use anyhow::{bail, Context, Result};
use relink_core::rename::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
use relink_core::rest_store::DEFAULT_BASE_URL;
use relink_core::{RenameOptions, RestStoreConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "relink.toml";
const API_KEY_VAR: &str = "OBSIDIAN_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api: ApiConfig,
    pub rename: RenameConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Read when `api_key` is not set, dotenv style.
    pub api_key_file: PathBuf,
    pub accept_invalid_certs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_key_file: PathBuf::from(".env"),
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenameConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load `path`, or `relink.toml` in the working directory if it exists.
    ///
    /// An explicitly named file must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rename.concurrency == 0 {
            bail!("rename.concurrency must be at least 1");
        }
        if self.rename.timeout_secs == 0 {
            bail!("rename.timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(base_url) = overrides.base_url {
            self.api.base_url = base_url;
        }
        if let Some(api_key) = overrides.api_key {
            self.api.api_key = Some(api_key);
        }
        if let Some(concurrency) = overrides.concurrency {
            self.rename.concurrency = concurrency;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.rename.timeout_secs = timeout_secs;
        }
        self.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.rename.timeout_secs)
    }

    pub fn rename_options(&self, dry_run: bool) -> RenameOptions {
        RenameOptions {
            concurrency: self.rename.concurrency.max(1),
            timeout: self.timeout(),
            dry_run,
        }
    }

    /// Resolve the API key and build the REST client settings.
    pub fn store_config(&self) -> Result<RestStoreConfig> {
        let api_key = match &self.api.api_key {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => read_api_key(&self.api.api_key_file)?,
        };
        Ok(RestStoreConfig {
            base_url: self.api.base_url.clone(),
            api_key,
            timeout: self.timeout(),
            accept_invalid_certs: self.api.accept_invalid_certs,
        })
    }
}

/// Read `OBSIDIAN_API_KEY=...` from a dotenv-style file.
pub fn read_api_key(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read API key file {}", path.display()))?;
    match parse_api_key(&contents) {
        Some(key) => Ok(key),
        None => bail!("{} not set in {}", API_KEY_VAR, path.display()),
    }
}

fn parse_api_key(contents: &str) -> Option<String> {
    let line = contents
        .lines()
        .find(|line| line.trim_start().starts_with(API_KEY_VAR))?;
    let (_, value) = line.split_once('=')?;
    let key = value.trim().trim_matches('"').trim();
    (!key.is_empty()).then(|| key.to_string())
}
