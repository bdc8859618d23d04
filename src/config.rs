//! Application configuration management
//!
//! This module handles loading and validating configuration from environment
//! variables. All configuration is loaded and validated once at startup and
//! then shared read-only (`Arc<Config>`) for the whole batch; nothing here is
//! mutated while grading.

use std::env;
use std::path::PathBuf;

use crate::constants::{DEFAULT_TRACKER_PATH, DEFAULT_WORKERS, placeholders};
use crate::grading::template::{CommandTemplate, TemplateError};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub run: RunConfig,
    pub grading: GradingConfig,
    pub storage: StorageConfig,
    pub rust_log: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
}

/// Commands used to build and evaluate a submission
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Evaluation command (`{EVALUATE}`, `{SUBMISSIONS}`)
    pub evaluate_command: CommandTemplate,
    /// Optional build step run before evaluation (`{SUBMISSIONS}`)
    pub precommand: Option<CommandTemplate>,
    /// Remote test settings, required by assignments with `--DT--`
    pub distributed: Option<DistributedConfig>,
}

/// Distributed (secondary) test settings
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    pub command: CommandTemplate,
    pub host_address: String,
}

/// Batch behaviour switches
#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Grade even if the latest submission already has a grade comment
    pub force: bool,
    /// Log reports instead of posting them
    pub dry_run: bool,
    /// Copy each work directory to `preserve_dir` before it is removed
    pub copy_tmpdir: bool,
    pub preserve_dir: PathBuf,
    /// Number of submissions graded concurrently within an assignment
    pub workers: usize,
}

/// File locations
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of the local course layout
    pub course_dir: PathBuf,
    /// JSON file backing the distributed tracking store
    pub tracker_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            run: RunConfig::from_lookup(&lookup)?,
            grading: GradingConfig::from_lookup(&lookup)?,
            storage: StorageConfig::from_lookup(&lookup),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "codeval=info".to_string()),
            log_json: parse_flag(&lookup, "CODEVAL_LOG_JSON", false)?,
        })
    }
}

impl RunConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let command = non_empty(lookup("CODEVAL_COMMAND"))
            .ok_or_else(|| ConfigError::Missing("CODEVAL_COMMAND".to_string()))?;
        let evaluate_command = parse_template("CODEVAL_COMMAND", &command, placeholders::EVALUATE_COMMAND)?;
        if !evaluate_command.placeholders().contains(&placeholders::EVALUATE) {
            return Err(ConfigError::MissingPlaceholder {
                key: "CODEVAL_COMMAND".to_string(),
                token: placeholders::EVALUATE.to_string(),
            });
        }

        let precommand = non_empty(lookup("CODEVAL_PRECOMMAND"))
            .map(|raw| parse_template("CODEVAL_PRECOMMAND", &raw, placeholders::PRECOMMAND))
            .transpose()?;

        let distributed = match (
            non_empty(lookup("CODEVAL_DIST_COMMAND")),
            non_empty(lookup("CODEVAL_HOST_IP")),
        ) {
            (Some(raw), Some(host_address)) => Some(DistributedConfig {
                command: parse_template("CODEVAL_DIST_COMMAND", &raw, placeholders::DIST_COMMAND)?,
                host_address,
            }),
            _ => None,
        };

        Ok(Self {
            evaluate_command,
            precommand,
            distributed,
        })
    }

    /// Distributed settings, or a configuration error naming what is missing
    pub fn require_distributed(&self) -> Result<&DistributedConfig, ConfigError> {
        self.distributed.as_ref().ok_or_else(|| {
            ConfigError::Missing("CODEVAL_DIST_COMMAND and CODEVAL_HOST_IP".to_string())
        })
    }
}

impl GradingConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers = match lookup("CODEVAL_WORKERS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ConfigError::InvalidValue("CODEVAL_WORKERS".to_string()))?,
            None => DEFAULT_WORKERS,
        };

        Ok(Self {
            force: parse_flag(lookup, "CODEVAL_FORCE", false)?,
            dry_run: parse_flag(lookup, "CODEVAL_DRY_RUN", true)?,
            copy_tmpdir: parse_flag(lookup, "CODEVAL_COPY_TMPDIR", false)?,
            preserve_dir: PathBuf::from(
                lookup("CODEVAL_PRESERVE_DIR").unwrap_or_else(|| ".".to_string()),
            ),
            workers,
        })
    }
}

impl StorageConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            course_dir: PathBuf::from(lookup("CODEVAL_COURSE_DIR").unwrap_or_else(|| ".".to_string())),
            tracker_path: PathBuf::from(
                lookup("CODEVAL_TRACKER_PATH").unwrap_or_else(|| DEFAULT_TRACKER_PATH.to_string()),
            ),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_template(key: &str, raw: &str, allowed: &[&str]) -> Result<CommandTemplate, ConfigError> {
    CommandTemplate::parse(raw, allowed).map_err(|source| ConfigError::InvalidTemplate {
        key: key.to_string(),
        source,
    })
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),

    #[error("Invalid command template in {key}: {source}")]
    InvalidTemplate {
        key: String,
        #[source]
        source: TemplateError,
    },

    #[error("Command template in {key} must contain {{{token}}}")]
    MissingPlaceholder { key: String, token: String },
}
