//! Configuration module for the forum bindings backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::resolver::{Source, DEFAULT_COMPANY_PRECEDENCE, DEFAULT_EXPERIENCE_PRECEDENCE};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Invalid configuration value.
#[derive(Debug)]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.key, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Pre-shared key guarding the API (optional)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Company used when no request-scoped candidate resolves
    pub default_company_id: Option<String>,
    pub company_precedence: Vec<Source>,
    pub experience_precedence: Vec<Source>,
    /// Host platform API settings
    pub platform_base_url: String,
    pub platform_api_key: Option<String>,
    /// This app's id on the host platform; its own experiences are hidden from listings
    pub platform_app_id: Option<String>,
    pub platform_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = non_empty_var("FORUM_API_PSK");

        let db_path = env::var("FORUM_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let bind_addr = env::var("FORUM_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| ConfigError {
                key: "FORUM_BIND_ADDR",
                message: format!("{}", e),
            })?;

        let log_level = env::var("FORUM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("FORUM_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ConfigError {
                    key: "FORUM_LOG_FORMAT",
                    message: format!("expected 'pretty' or 'json', got '{}'", other),
                })
            }
        };

        let request_timeout = seconds_var("FORUM_REQUEST_TIMEOUT_SECS", 30)?;

        let default_company_id = non_empty_var("FORUM_DEFAULT_COMPANY_ID")
            .or_else(|| non_empty_var("WHOP_COMPANY_ID"));

        let company_precedence = precedence_var(
            "FORUM_COMPANY_PRECEDENCE",
            DEFAULT_COMPANY_PRECEDENCE,
            Source::is_company_source,
        )?;
        let experience_precedence = precedence_var(
            "FORUM_EXPERIENCE_PRECEDENCE",
            DEFAULT_EXPERIENCE_PRECEDENCE,
            Source::is_experience_source,
        )?;

        let platform_base_url = env::var("PLATFORM_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.whop.com/api/v5".to_string())
            .trim_end_matches('/')
            .to_string();
        let platform_api_key = non_empty_var("PLATFORM_API_KEY");
        let platform_app_id = non_empty_var("PLATFORM_APP_ID");
        let platform_timeout = seconds_var("PLATFORM_TIMEOUT_SECS", 10)?;

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_format,
            request_timeout,
            default_company_id,
            company_precedence,
            experience_precedence,
            platform_base_url,
            platform_api_key,
            platform_app_id,
            platform_timeout,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_psk", &self.api_psk.as_ref().map(|_| "<redacted>"))
            .field("db_path", &self.db_path)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("request_timeout", &self.request_timeout)
            .field("default_company_id", &self.default_company_id)
            .field("company_precedence", &self.company_precedence)
            .field("experience_precedence", &self.experience_precedence)
            .field("platform_base_url", &self.platform_base_url)
            .field(
                "platform_api_key",
                &self.platform_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("platform_app_id", &self.platform_app_id)
            .field("platform_timeout", &self.platform_timeout)
            .finish()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn seconds_var(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match non_empty_var(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError {
                key,
                message: format!("'{}': {}", raw, e),
            }),
    }
}

/// Parse a comma separated precedence list such as `path,query,header`.
fn precedence_var(
    key: &'static str,
    default: &[Source],
    allowed: fn(&Source) -> bool,
) -> Result<Vec<Source>, ConfigError> {
    let Some(raw) = non_empty_var(key) else {
        return Ok(default.to_vec());
    };
    parse_precedence(&raw, allowed).map_err(|message| ConfigError { key, message })
}

fn parse_precedence(raw: &str, allowed: fn(&Source) -> bool) -> Result<Vec<Source>, String> {
    let mut order = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let source = Source::from_name(name).ok_or_else(|| format!("unknown source '{}'", name))?;
        if !allowed(&source) {
            return Err(format!("source '{}' is not valid here", name));
        }
        if !order.contains(&source) {
            order.push(source);
        }
    }
    if order.is_empty() {
        return Err("precedence list is empty".to_string());
    }
    Ok(order)
}
