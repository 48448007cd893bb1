//! Configuration loader and validator.
//!
//! Sources, later ones winning: built-in defaults, an optional YAML file,
//! then environment variables. The binary applies CLI flags on top and
//! re-validates.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::imagegen::{ImageParams, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::model::{FieldKey, FieldMap};
use crate::retry::RetryPolicy;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub notion: Notion,
    pub generation: Generation,
    pub retry: Retry,
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct App {
    pub max_per_run: usize,
    pub concurrency: usize,
    pub page_size: usize,
    pub write_back: bool,
    pub filter_by_status: bool,
    pub status_value: String,
    pub report_path: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            max_per_run: 100,
            concurrency: 4,
            page_size: 50,
            write_back: true,
            filter_by_status: false,
            status_value: "待拍".into(),
            report_path: "results.json".into(),
        }
    }
}

/// Notion API settings and the field-label mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Notion {
    pub token: String,
    pub version: String,
    pub database_id: String,
    /// Overrides for the native labels; unspecified fields keep their defaults.
    pub fields: BTreeMap<FieldKey, String>,
}

impl Default for Notion {
    fn default() -> Self {
        Self {
            token: String::new(),
            version: "2022-06-28".into(),
            database_id: String::new(),
            fields: BTreeMap::new(),
        }
    }
}

/// Image generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Generation {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f64,
    pub timeout_secs: u64,
}

impl Default for Generation {
    fn default() -> Self {
        let params = ImageParams::default();
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            width: params.width,
            height: params.height,
            steps: params.steps,
            guidance_scale: params.guidance_scale,
            timeout_secs: 120,
        }
    }
}

/// Back-off settings shared by every remote call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Retry {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 800,
        }
    }
}

impl Config {
    pub fn field_map(&self) -> FieldMap {
        FieldMap::with_overrides(self.notion.fields.clone())
    }

    pub fn image_params(&self) -> ImageParams {
        ImageParams {
            width: self.generation.width,
            height: self.generation.height,
            steps: self.generation.steps,
            guidance_scale: self.generation.guidance_scale,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NOTION_TOKEN") {
            self.notion.token = v;
        }
        if let Some(v) = get("NOTION_VERSION") {
            self.notion.version = v;
        }
        if let Some(v) = get("NOTION_DATABASE_ID") {
            self.notion.database_id = v;
        }
        if let Some(v) = get("SILICONFLOW_API_KEY") {
            self.generation.api_key = v;
        }
        if let Some(v) = get("SILICONFLOW_IMAGE_API") {
            self.generation.endpoint = v;
        }
        if let Some(v) = get("SILICONFLOW_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("STATUS_VALUE") {
            self.app.status_value = v;
        }
        if let Some(v) = get("REPORT_PATH") {
            self.app.report_path = v;
        }

        parse_into(get("MAX_PER_RUN"), "MAX_PER_RUN", &mut self.app.max_per_run)?;
        parse_into(get("CONCURRENCY"), "CONCURRENCY", &mut self.app.concurrency)?;
        parse_into(get("PAGE_SIZE"), "PAGE_SIZE", &mut self.app.page_size)?;
        parse_into(get("IMG_WIDTH"), "IMG_WIDTH", &mut self.generation.width)?;
        parse_into(get("IMG_HEIGHT"), "IMG_HEIGHT", &mut self.generation.height)?;
        parse_into(get("IMG_STEPS"), "IMG_STEPS", &mut self.generation.steps)?;
        parse_into(get("IMG_GUIDANCE"), "IMG_GUIDANCE", &mut self.generation.guidance_scale)?;
        parse_flag(get("WRITE_BACK"), "WRITE_BACK", &mut self.app.write_back)?;
        parse_flag(get("FILTER_BY_STATUS"), "FILTER_BY_STATUS", &mut self.app.filter_by_status)?;
        Ok(())
    }

    /// Apply command-line values; unset ones leave the current settings alone.
    pub fn apply_cli(&mut self, cli: CliOverrides) {
        if let Some(n) = cli.max_per_run {
            self.app.max_per_run = n;
        }
        if let Some(n) = cli.concurrency {
            self.app.concurrency = n;
        }
        if cli.no_write_back {
            self.app.write_back = false;
        }
        if let Some(status) = cli.only_status {
            self.app.filter_by_status = true;
            self.app.status_value = status;
        }
        if let Some(path) = cli.report_path {
            self.app.report_path = path;
        }
    }
}

/// Command-line values layered over file and environment settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub max_per_run: Option<usize>,
    pub concurrency: Option<usize>,
    pub no_write_back: bool,
    /// Turns on status filtering with this value.
    pub only_status: Option<String>,
    pub report_path: Option<String>,
}

fn parse_into<T: FromStr>(raw: Option<String>, key: &'static str, slot: &mut T) -> Result<(), ConfigError> {
    if let Some(value) = raw {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { key, value })?;
    }
    Ok(())
}

fn parse_flag(raw: Option<String>, key: &'static str, slot: &mut bool) -> Result<(), ConfigError> {
    if let Some(value) = raw {
        *slot = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(ConfigError::Env { key, value }),
        };
    }
    Ok(())
}

/// Load configuration from YAML (if any) plus the process environment, and
/// validate it.
/// - An explicit `path` must exist.
/// - With `None`, `config.yaml` in the working directory is used when present.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with(path, Path::new(DEFAULT_CONFIG_PATH), |key| std::env::var(key).ok())
}

/// `load` with the fallback file and the environment supplied by the caller.
pub fn load_with<F>(path: Option<&Path>, default_path: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match path {
        Some(p) => parse(&fs::read_to_string(p)?)?,
        None if default_path.exists() => parse(&fs::read_to_string(default_path)?)?,
        None => Config::default(),
    };
    cfg.apply_env(lookup)?;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn parse(content: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.notion.token.trim().is_empty() {
        return Err(ConfigError::Missing("notion.token (NOTION_TOKEN)"));
    }
    if cfg.notion.database_id.trim().is_empty() {
        return Err(ConfigError::Missing("notion.database_id (NOTION_DATABASE_ID)"));
    }
    if cfg.generation.api_key.trim().is_empty() {
        return Err(ConfigError::Missing("generation.api_key (SILICONFLOW_API_KEY)"));
    }
    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }
    if cfg.generation.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("generation.endpoint must be non-empty"));
    }
    if cfg.generation.model.trim().is_empty() {
        return Err(ConfigError::Invalid("generation.model must be non-empty"));
    }

    if cfg.app.max_per_run == 0 {
        return Err(ConfigError::Invalid("app.max_per_run must be > 0"));
    }
    if cfg.app.concurrency == 0 {
        return Err(ConfigError::Invalid("app.concurrency must be > 0"));
    }
    if cfg.app.page_size == 0 || cfg.app.page_size > 100 {
        return Err(ConfigError::Invalid("app.page_size must be within 1..=100"));
    }
    if cfg.app.filter_by_status && cfg.app.status_value.trim().is_empty() {
        return Err(ConfigError::Invalid("app.status_value must be non-empty when filtering by status"));
    }
    if cfg.app.report_path.trim().is_empty() {
        return Err(ConfigError::Invalid("app.report_path must be non-empty"));
    }

    if cfg.generation.width == 0 || cfg.generation.height == 0 {
        return Err(ConfigError::Invalid("generation.width/height must be > 0"));
    }
    if cfg.generation.steps == 0 {
        return Err(ConfigError::Invalid("generation.steps must be > 0"));
    }
    if !cfg.generation.guidance_scale.is_finite() || cfg.generation.guidance_scale < 0.0 {
        return Err(ConfigError::Invalid("generation.guidance_scale must be a non-negative number"));
    }
    if cfg.generation.timeout_secs == 0 {
        return Err(ConfigError::Invalid("generation.timeout_secs must be > 0"));
    }

    if cfg.notion.fields.values().any(|label| label.trim().is_empty()) {
        return Err(ConfigError::Invalid("notion.fields labels must be non-empty"));
    }

    Ok(())
}

/// Example configuration document.
pub fn example() -> &'static str {
    r#"app:
  max_per_run: 100
  concurrency: 4
  page_size: 50
  write_back: true
  filter_by_status: false
  status_value: "待拍"
  report_path: "results.json"

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
  database_id: "NOTION_DATABASE_ID"
  fields:
    description: "画面描述"
    image_output: "Ai构图"
    order: "顺序"

generation:
  api_key: "YOUR_SILICONFLOW_API_KEY"
  endpoint: "https://api.siliconflow.cn/v1/images/generations"
  model: "Qwen/Qwen-Image"
  width: 768
  height: 1024
  steps: 25
  guidance_scale: 7
  timeout_secs: 120

retry:
  max_retries: 2
  base_delay_ms: 800
"#
}
