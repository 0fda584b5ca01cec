use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::validation::{self, rules};

pub const CONFIG_ENV: &str = "SQUAD_REPORT_CONFIG";

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub tracking: TrackingServiceConfig,
    pub browser: BrowserConfig,
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackingServiceConfig {
    pub base_url: String,
    pub api_version: String,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for TrackingServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dev.azure.com".into(),
            api_version: "7.1".into(),
            chart_width: 1025,
            chart_height: 650,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub login_wait_secs: u64,
    pub render_wait_secs: u64,
    pub chart_selector: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".into(),
            login_wait_secs: 2,
            render_wait_secs: 15,
            chart_selector: ".burndown-chart".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub tenants_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tenants_path: data_dir().join("tenants.toml"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BusConfig {
    pub spool_dir: PathBuf,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            spool_dir: data_dir().join("spool"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub skip_weekends: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            skip_weekends: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".squad-report")
}

/// `--config` wins, then `$SQUAD_REPORT_CONFIG`, then the home directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Validate once at start-up; nothing downstream re-reads the environment.
pub fn validate(config: &AppConfig) -> Result<(), ReportError> {
    validation::validate(&rules::app_config(), config)
        .into_result()
        .map_err(ReportError::Configuration)
}
