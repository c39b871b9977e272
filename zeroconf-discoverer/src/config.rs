use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{DEFAULT_WINDOW_SECS, REPORT_FILE_PREFIX, SERVICE_TYPE_QUERY};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Restrict the mDNS daemon to one interface (name or address)
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_type_query")]
    pub type_query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One compact JSON document per line on stdout
    #[default]
    Stdout,
    /// One pretty-printed JSON file per record
    Files,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: OutputMode,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_type_query() -> String {
    SERVICE_TYPE_QUERY.to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    REPORT_FILE_PREFIX.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            interface: None,
            type_query: default_type_query(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            directory: default_directory(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl DiscoveryConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.discovery.window_secs == 0 {
            bail!("discovery.window_secs must be greater than zero");
        }
        if !self.discovery.type_query.ends_with('.') {
            bail!(
                "discovery.type_query must be fully qualified (end with '.'): {}",
                self.discovery.type_query
            );
        }
        Ok(())
    }
}
