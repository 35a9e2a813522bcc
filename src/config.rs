// src/config.rs
//! Command-line input and the frozen extraction configuration.
//!
//! `ExtractionConfig` is read once from JSON, validated, and shared as an
//! `Arc` for the rest of the run. Nothing mutates it afterwards.

use crate::api::Authorizer;
use crate::constants::{
    DEFAULT_BASE_RETRY_DELAY_SECS, DEFAULT_BURST_CAPACITY, DEFAULT_MAX_BLOCK_DEPTH,
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY_SECS, DEFAULT_NOTION_VERSION,
    DEFAULT_REQUESTS_PER_SECOND, DEFAULT_REQUEST_TIMEOUT_SECS, MAX_BLOCK_DEPTH_LIMIT,
    MAX_REQUESTS_PER_SECOND, MIN_REQUESTS_PER_SECOND, NOTION_API_PAGE_SIZE,
};
use crate::error::AppError;
use crate::streams::StreamKind;
use crate::types::ValidationError;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

static API_VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("API version pattern is a valid regex")
});

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verify the credentials can reach the workspace
    Check,
    /// Print the catalog of available streams
    Discover,
    /// Extract records, writing RECORD and STATE messages to stdout
    Read {
        /// Previously emitted state to resume from
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Where to write the final state, also after a failed run
        #[arg(long)]
        state_out: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = ModeArg::Incremental)]
        mode: ModeArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    FullRefresh,
    Incremental,
}

/// How the extractor authenticates against the workspace.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Credentials {
    /// Internal integration token
    Token { token: String },
    /// Public integration that already completed the OAuth exchange
    #[serde(rename = "oauth2")]
    OAuth2 {
        client_id: String,
        client_secret: String,
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
    },
}

impl Credentials {
    fn bearer_token(&self) -> &str {
        match self {
            Credentials::Token { token } => token,
            Credentials::OAuth2 { access_token, .. } => access_token,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Credentials::Token { token } => {
                if token.trim().is_empty() {
                    return Err(ValidationError::EmptyField("credentials.token"));
                }
            }
            Credentials::OAuth2 {
                client_id,
                client_secret,
                access_token,
                ..
            } => {
                if client_id.trim().is_empty() {
                    return Err(ValidationError::EmptyField("credentials.client_id"));
                }
                if client_secret.trim().is_empty() {
                    return Err(ValidationError::EmptyField("credentials.client_secret"));
                }
                if access_token.trim().is_empty() {
                    return Err(ValidationError::EmptyField("credentials.access_token"));
                }
            }
        }
        Ok(())
    }
}

// Secrets never reach the logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token { .. } => f.debug_struct("Token").field("token", &"***").finish(),
            Credentials::OAuth2 { client_id, .. } => f
                .debug_struct("OAuth2")
                .field("client_id", client_id)
                .field("client_secret", &"***")
                .field("access_token", &"***")
                .finish(),
        }
    }
}

impl Authorizer for Credentials {
    fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer_token())
    }
}

/// Validated, immutable settings for one extraction run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    pub credentials: Credentials,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Records modified before this instant are never extracted.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay: f64,

    /// Seconds
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: f64,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,

    #[serde(default = "enabled")]
    pub fetch_blocks: bool,

    #[serde(default = "default_max_block_depth")]
    pub max_block_depth: u32,

    #[serde(default = "enabled")]
    pub sync_users: bool,
    #[serde(default = "enabled")]
    pub sync_databases: bool,
    #[serde(default = "enabled")]
    pub sync_pages: bool,
    #[serde(default = "enabled")]
    pub sync_blocks: bool,
    #[serde(default = "enabled")]
    pub sync_comments: bool,
}

fn default_api_version() -> String {
    DEFAULT_NOTION_VERSION.to_string()
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_retry_delay() -> f64 {
    DEFAULT_BASE_RETRY_DELAY_SECS
}
fn default_max_retry_delay() -> f64 {
    DEFAULT_MAX_RETRY_DELAY_SECS
}
fn default_page_size() -> u32 {
    NOTION_API_PAGE_SIZE
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_requests_per_second() -> f64 {
    DEFAULT_REQUESTS_PER_SECOND
}
fn default_burst_capacity() -> u32 {
    DEFAULT_BURST_CAPACITY
}
fn default_max_block_depth() -> u32 {
    DEFAULT_MAX_BLOCK_DEPTH
}
fn enabled() -> bool {
    true
}

/// Rejects `value` unless it lies within `min..=max`.
fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_nan() || value < min || value > max {
        return Err(ValidationError::OutOfBounds {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl ExtractionConfig {
    /// A configuration with every default applied.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api_version: default_api_version(),
            start_date: None,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay: DEFAULT_BASE_RETRY_DELAY_SECS,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY_SECS,
            page_size: NOTION_API_PAGE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst_capacity: DEFAULT_BURST_CAPACITY,
            fetch_blocks: true,
            max_block_depth: DEFAULT_MAX_BLOCK_DEPTH,
            sync_users: true,
            sync_databases: true,
            sync_pages: true,
            sync_blocks: true,
            sync_comments: true,
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: ExtractionConfig = serde_json::from_str(raw)
            .map_err(|e| ValidationError::Unparseable(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its documented bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        self.credentials.validate()?;

        if !API_VERSION_PATTERN.is_match(&self.api_version) {
            return Err(ValidationError::InvalidFormat {
                field: "api_version",
                value: self.api_version.clone(),
                expected: "YYYY-MM-DD",
            }
            .into());
        }

        check_range("max_retries", self.max_retries as f64, 1.0, 10.0)?;
        check_range("base_retry_delay", self.base_retry_delay, 0.1, 60.0)?;
        check_range("max_retry_delay", self.max_retry_delay, 1.0, 300.0)?;
        if self.max_retry_delay < self.base_retry_delay {
            return Err(ValidationError::Inconsistent(format!(
                "max_retry_delay ({}) must be at least base_retry_delay ({})",
                self.max_retry_delay, self.base_retry_delay
            ))
            .into());
        }
        check_range("page_size", self.page_size as f64, 1.0, NOTION_API_PAGE_SIZE as f64)?;
        check_range("request_timeout", self.request_timeout as f64, 10.0, 300.0)?;
        check_range(
            "requests_per_second",
            self.requests_per_second,
            MIN_REQUESTS_PER_SECOND,
            MAX_REQUESTS_PER_SECOND,
        )?;
        check_range("burst_capacity", self.burst_capacity as f64, 1.0, 1000.0)?;
        check_range(
            "max_block_depth",
            self.max_block_depth as f64,
            1.0,
            MAX_BLOCK_DEPTH_LIMIT as f64,
        )?;

        Ok(())
    }

    /// Streams to extract, in the fixed run order.
    pub fn enabled_streams(&self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    pub fn is_enabled(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Users => self.sync_users,
            StreamKind::Databases => self.sync_databases,
            StreamKind::Pages => self.sync_pages,
            StreamKind::Blocks => self.sync_blocks && self.fetch_blocks,
            StreamKind::Comments => self.sync_comments,
        }
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token_config() -> ExtractionConfig {
        ExtractionConfig::new(Credentials::Token {
            token: "secret_abc".to_string(),
        })
    }

    #[test]
    fn test_minimal_document_gets_defaults() {
        let config = ExtractionConfig::from_json(
            r#"{"credentials": {"auth_type": "token", "token": "secret_abc"}}"#,
        )
        .unwrap();

        assert_eq!(config, token_config());
        assert_eq!(config.api_version, "2022-06-28");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.max_block_depth, 5);
    }

    #[test]
    fn test_oauth_credentials_authorize_with_access_token() {
        let config = ExtractionConfig::from_json(
            r#"{
                "credentials": {
                    "auth_type": "oauth2",
                    "client_id": "id",
                    "client_secret": "shh",
                    "access_token": "tok"
                },
                "start_date": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(config.credentials.authorization(), "Bearer tok");
        assert!(config.start_date.is_some());
        assert!(!format!("{:?}", config.credentials).contains("shh"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = ExtractionConfig::from_json(
            r#"{"credentials": {"auth_type": "token", "token": "t"}, "verbose": true}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Configuration(ValidationError::Unparseable(_))
        ));
    }

    #[test]
    fn test_bounds_are_enforced() {
        let mut config = token_config();
        config.max_retries = 11;
        assert!(config.validate().is_err());

        let mut config = token_config();
        config.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = token_config();
        config.base_retry_delay = 30.0;
        config.max_retry_delay = 10.0;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(ValidationError::Inconsistent(_)))
        ));

        let mut config = token_config();
        config.api_version = "latest".to_string();
        assert!(config.validate().is_err());

        let config = ExtractionConfig::new(Credentials::Token {
            token: "  ".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(ValidationError::EmptyField(_)))
        ));
    }

    #[test]
    fn test_request_rate_must_be_usable() {
        for rate in [0.0, -3.0, 1e-30, f64::NAN, f64::INFINITY, 5_000.0] {
            let mut config = token_config();
            config.requests_per_second = rate;
            assert!(
                matches!(
                    config.validate(),
                    Err(AppError::Configuration(ValidationError::OutOfBounds {
                        field: "requests_per_second",
                        ..
                    }))
                ),
                "rate {}",
                rate
            );
        }

        let mut config = token_config();
        config.requests_per_second = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_read_arguments() {
        let input = CommandLineInput::try_parse_from([
            "notion2records",
            "read",
            "--state",
            "in.json",
            "--state-out",
            "out/state.json",
            "--mode",
            "full-refresh",
        ])
        .unwrap();

        assert_eq!(input.config, PathBuf::from("config.json"));
        match input.command {
            Command::Read {
                state,
                state_out,
                mode,
            } => {
                assert_eq!(state, Some(PathBuf::from("in.json")));
                assert_eq!(state_out, Some(PathBuf::from("out/state.json")));
                assert_eq!(mode, ModeArg::FullRefresh);
            }
            other => panic!("expected read, got {:?}", other),
        }

        let input = CommandLineInput::try_parse_from(["notion2records", "read"]).unwrap();
        assert!(matches!(
            input.command,
            Command::Read {
                state: None,
                state_out: None,
                mode: ModeArg::Incremental,
            }
        ));
    }

    #[test]
    fn test_enabled_streams_keep_run_order() {
        let mut config = token_config();
        config.sync_databases = false;
        config.fetch_blocks = false;

        assert_eq!(
            config.enabled_streams(),
            vec![StreamKind::Users, StreamKind::Pages, StreamKind::Comments]
        );
    }
}
