//! Logging
//!
//! The crate only emits `tracing` events. Embedding applications install a
//! subscriber once through [`init_logging`]; environment variables override
//! the configured values:
//!
//! - `EVTREE_LOG`: full `EnvFilter` directive string
//! - `EVTREE_LOG_MODULES`: extra `target=level` pairs, comma separated
//! - `EVTREE_LOG_FORMAT`: `text` or `json`
//! - `EVTREE_LOG_OUTPUT`: `stdout`, `stderr`, `file`, `file+stderr`, `both`
//! - `EVTREE_LOG_FILE`: log file path

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::ConfigError(format!(
                "Unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Where log lines go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutput {
    #[serde(rename = "stdout")]
    Stdout,
    #[default]
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "file+stderr")]
    FileAndStderr,
    /// stdout and stderr
    #[serde(rename = "both")]
    Both,
}

impl LogOutput {
    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::FileAndStderr)
    }
}

impl FromStr for LogOutput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            "file+stderr" => Ok(LogOutput::FileAndStderr),
            "both" => Ok(LogOutput::Both),
            other => Err(ApiError::ConfigError(format!(
                "Unknown log output '{}', expected stdout, stderr, file, file+stderr or both",
                other
            ))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base level: trace, debug, info, warn, error or off
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Used when `output` writes a file; `None` picks the platform state dir
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// ANSI colors for text output on a terminal stream
    #[serde(default = "default_enabled")]
    pub color: bool,

    /// Per-target levels, e.g. `evtree::views = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: None,
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Copy of this config with `EVTREE_LOG_FORMAT`, `EVTREE_LOG_OUTPUT` and
    /// `EVTREE_LOG_FILE` applied
    pub fn with_env_overrides(&self) -> Result<Self, ApiError> {
        let mut config = self.clone();
        if let Some(format) = non_empty_env("EVTREE_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        if let Some(output) = non_empty_env("EVTREE_LOG_OUTPUT") {
            config.output = output.parse()?;
        }
        if let Some(file) = non_empty_env("EVTREE_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }
        Ok(config)
    }

    /// Filter from `EVTREE_LOG` if set, otherwise from level, modules and
    /// `EVTREE_LOG_MODULES`
    pub fn env_filter(&self) -> Result<EnvFilter, ApiError> {
        if let Ok(filter) = EnvFilter::try_from_env("EVTREE_LOG") {
            return Ok(filter);
        }

        let mut directives: Vec<String> = vec![self.level.clone()];
        directives.extend(
            self.modules
                .iter()
                .map(|(target, level)| format!("{}={}", target, level)),
        );
        if let Some(extra) = non_empty_env("EVTREE_LOG_MODULES") {
            directives.extend(
                extra
                    .split(',')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(target, level)| format!("{}={}", target.trim(), level.trim())),
            );
        }

        directives.iter().try_fold(EnvFilter::new(""), |filter, directive| {
            let parsed = directive.parse::<tracing_subscriber::filter::Directive>().map_err(|e| {
                ApiError::ConfigError(format!("Invalid log directive '{}': {}", directive, e))
            })?;
            Ok(filter.add_directive(parsed))
        })
    }

    /// Log file location: configured path, else `<state dir>/evtree.log`
    pub fn log_file_path(&self) -> Result<PathBuf, ApiError> {
        match &self.file {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.clone()),
            _ => default_log_file_path(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn default_log_file_path() -> Result<PathBuf, ApiError> {
    let dirs = directories::ProjectDirs::from("", "evtree", "evtree").ok_or_else(|| {
        ApiError::ConfigError("No platform directory available for the log file".to_string())
    })?;
    // state_dir only exists on Linux
    let base = dirs.state_dir().unwrap_or_else(|| dirs.data_dir());
    Ok(base.join("evtree.log"))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let config = config.cloned().unwrap_or_default().with_env_overrides()?;
    let installed = if !config.enabled {
        Registry::default()
            .with(EnvFilter::new("off"))
            .with(fmt::layer().with_writer(std::io::sink))
            .try_init()
    } else {
        let filter = config.env_filter()?;
        let writer = make_writer(&config)?;
        let ansi = config.color && !config.output.writes_file();
        let registry = Registry::default().with(filter);
        match config.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true)
                        .with_writer(writer),
                )
                .try_init(),
            LogFormat::Text => registry
                .with(
                    fmt::layer()
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true)
                        .with_ansi(ansi)
                        .with_writer(writer),
                )
                .try_init(),
        }
    };
    installed.map_err(|e| ApiError::ConfigError(format!("Logging already initialised: {}", e)))
}

fn make_writer(config: &LoggingConfig) -> Result<BoxMakeWriter, ApiError> {
    let writer = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        LogOutput::File => BoxMakeWriter::new(Mutex::new(open_log_file(config)?)),
        LogOutput::FileAndStderr => {
            BoxMakeWriter::new(Mutex::new(open_log_file(config)?).and(std::io::stderr))
        }
    };
    Ok(writer)
}

fn open_log_file(config: &LoggingConfig) -> Result<std::fs::File, ApiError> {
    let path = config.log_file_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            ApiError::ConfigError(format!("Cannot create log directory {}: {}", dir.display(), e))
        })?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ApiError::ConfigError(format!("Cannot open log file {}: {}", path.display(), e)))
}
