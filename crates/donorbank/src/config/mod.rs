//! Environment-driven configuration for the donor-bank service.

use std::env;
use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8184";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_MATCH_LIMIT: &str = "50";
const DEFAULT_PAGE_SIZE: &str = "10";

/// Runtime environment the service believes it is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            AppEnvironment::Production
        } else if value.eq_ignore_ascii_case("staging") {
            AppEnvironment::Staging
        } else {
            AppEnvironment::Development
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Staging => "staging",
            AppEnvironment::Production => "production",
        }
    }
}

/// Listener settings for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost {
                    value: self.host.clone(),
                    source,
                })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Log filtering applied when `RUST_LOG` is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Dials for the allotment workflow: how many matching candidates a single
/// lookup may return and how many requests fit on a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub candidate_limit: usize,
    pub page_size: usize,
}

/// Aggregated runtime configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Reads configuration from the process environment, with `.env` support
    /// for local development. Missing variables fall back to defaults;
    /// malformed ones are errors.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::parse(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port_raw = env::var("APP_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let port = port_raw
            .parse::<u16>()
            .map_err(|source| ConfigError::InvalidPort {
                value: port_raw.clone(),
                source,
            })?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let candidate_limit = positive_usize("APP_MATCH_LIMIT", DEFAULT_MATCH_LIMIT)?;
        let page_size = positive_usize("APP_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            workflow: WorkflowConfig {
                candidate_limit,
                page_size,
            },
        })
    }
}

fn positive_usize(name: &'static str, default: &str) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>()
        .ok()
        .filter(|value| *value >= 1)
        .ok_or(ConfigError::InvalidDial { name, value: raw })
}

/// Errors produced while reading configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidPort {
        value: String,
        source: std::num::ParseIntError,
    },
    InvalidHost {
        value: String,
        source: AddrParseError,
    },
    InvalidDial {
        name: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort { value, .. } => {
                write!(f, "APP_PORT must be a valid port number, got {value:?}")
            }
            ConfigError::InvalidHost { value, .. } => {
                write!(f, "APP_HOST must be an IP address or localhost, got {value:?}")
            }
            ConfigError::InvalidDial { name, value } => {
                write!(f, "{name} must be a positive integer, got {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort { source, .. } => Some(source),
            ConfigError::InvalidHost { source, .. } => Some(source),
            ConfigError::InvalidDial { .. } => None,
        }
    }
}
