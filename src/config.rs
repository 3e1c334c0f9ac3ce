use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest validity window SigV4 allows for a presigned URL (7 days).
const MAX_URL_TTL_SECS: u64 = 604_800;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub scratch: ScratchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Endpoint the service itself talks to (MinIO, LocalStack). `None` means AWS.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Endpoint clients reach; signed URLs are issued for this host.
    #[serde(default)]
    pub public_endpoint: Option<String>,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_url_ttl_secs() -> u64 {
    3600
}

impl StorageConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_on_start: default_run_on_start(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}
fn default_run_on_start() -> bool {
    true
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScratchConfig {
    /// Where fetched objects are staged. Defaults to the system temp dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl ScratchConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.storage.bucket.trim().is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }

    if config.storage.url_ttl_secs == 0 || config.storage.url_ttl_secs > MAX_URL_TTL_SECS {
        anyhow::bail!(
            "storage.url_ttl_secs must be in [1, {}], got {}",
            MAX_URL_TTL_SECS,
            config.storage.url_ttl_secs
        );
    }

    if config.sync.interval_secs == 0 {
        anyhow::bail!("sync.interval_secs must be >= 1");
    }

    for (field, value) in [
        ("storage.endpoint", &config.storage.endpoint),
        ("storage.public_endpoint", &config.storage.public_endpoint),
    ] {
        if let Some(url) = value {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://, got '{}'", field, url);
            }
        }
    }

    Ok(config)
}
