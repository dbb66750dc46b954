//! Pipeline configuration: `carlog.yaml`, then `CARLOG_*` environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use carlog_adapters::SourceSettings;
use carlog_core::parse_timezone;
use carlog_storage::HttpClientConfig;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "carlog.yaml";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown time zone `{0}`")]
    TimeZone(String),
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
    #[error("max_detail_failure_ratio must be within 0..=1, got {0}")]
    FailureRatio(f64),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    pub pages: usize,
    pub max_workers: usize,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Share of detail pages allowed to fail before the run is aborted.
    pub max_detail_failure_ratio: f64,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            pages: 20,
            max_workers: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 10,
            max_detail_failure_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub snapshot: PathBuf,
    pub history: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("today_listings.csv"),
            history: PathBuf::from("historical_listings.csv"),
            output_dir: PathBuf::from("docs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// IANA zone used to bucket scrape dates into days and months.
    pub timezone: String,
    pub currency: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            timezone: "Europe/Tirane".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceSettings,
    pub scrape: ScrapeSettings,
    pub paths: PathSettings,
    pub dashboard: DashboardSettings,
    pub preview_port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            scrape: ScrapeSettings::default(),
            paths: PathSettings::default(),
            dashboard: DashboardSettings::default(),
            preview_port: 8000,
        }
    }
}

fn parsed<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

impl PipelineConfig {
    /// Reads `path`, or `carlog.yaml` in the working directory when it exists,
    /// then applies the process environment and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None if default_path.exists() => Self::from_yaml_file(default_path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overrides settings from `CARLOG_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = lookup("CARLOG_TIMEZONE") {
            self.dashboard.timezone = tz;
        } else if let Some(tz) = lookup("TZ") {
            // TZ is often a file path or POSIX rule rather than an IANA name.
            if parse_timezone(&tz).is_ok() {
                self.dashboard.timezone = tz;
            } else {
                warn!(tz = %tz, "ignoring TZ that is not an IANA zone name");
            }
        }
        if let Some(v) = lookup("CARLOG_HISTORY") {
            self.paths.history = PathBuf::from(v);
        }
        if let Some(v) = lookup("CARLOG_SNAPSHOT") {
            self.paths.snapshot = PathBuf::from(v);
        }
        if let Some(v) = lookup("CARLOG_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CARLOG_PAGES") {
            self.scrape.pages = parsed("CARLOG_PAGES", &v)?;
        }
        if let Some(v) = lookup("CARLOG_MAX_WORKERS") {
            self.scrape.max_workers = parsed("CARLOG_MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("CARLOG_USER_AGENT") {
            self.scrape.user_agent = v;
        }
        if let Some(v) = lookup("CARLOG_HTTP_TIMEOUT_SECS") {
            self.scrape.http_timeout_secs = parsed("CARLOG_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("CARLOG_CURRENCY") {
            self.dashboard.currency = v.trim().to_string();
        }
        if let Some(v) = lookup("CARLOG_PREVIEW_PORT") {
            self.preview_port = parsed("CARLOG_PREVIEW_PORT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        if self.scrape.pages == 0 {
            return Err(ConfigError::Zero("scrape.pages"));
        }
        if self.scrape.max_workers == 0 {
            return Err(ConfigError::Zero("scrape.max_workers"));
        }
        if self.scrape.http_timeout_secs == 0 {
            return Err(ConfigError::Zero("scrape.http_timeout_secs"));
        }
        let ratio = self.scrape.max_detail_failure_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::FailureRatio(ratio));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        parse_timezone(&self.dashboard.timezone)
            .map_err(|_| ConfigError::TimeZone(self.dashboard.timezone.clone()))
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.scrape.http_timeout_secs),
            user_agent: Some(self.scrape.user_agent.clone()),
            concurrency: self.scrape.max_workers,
            ..Default::default()
        }
    }
}
