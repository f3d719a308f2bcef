//! Environment variable validation and configuration module for Weathervane
//!
//! This module provides centralized validation and configuration management
//! for all environment variables used by the Weathervane proxy gateway.
//!
//! # Supported Environment Variables
//!
//! ## Server Configuration
//! - `WEATHERVANE_HOST`: Server bind address (default: "0.0.0.0")
//! - `WEATHERVANE_PORT`: Server port (default: "3000")
//!
//! ## Logging Configuration
//! - `RUST_LOG`: Standard Rust logging configuration
//! - `WEATHERVANE_LOG_LEVEL`: Application-specific log level override
//!
//! ## Rate Limiter Tuning
//! - `WEATHER_RATE_LIMIT_HOURLY`: Requests allowed per hourly window (default: "120")
//! - `WEATHER_RATE_LIMIT_BURST`: Requests allowed per burst window (default: "30")
//! - `WEATHER_RATE_LIMIT_BURST_WINDOW_MS`: Burst window length in ms (default: "300000")
//! - `WEATHERVANE_SWEEP_INTERVAL_SECS`: Background sweep interval (default: "60")
//!
//! Invalid or non-positive tuning values are never fatal; they fall back to
//! the defaults with a warning.
//!
//! ## Session Resolution
//! - `WEATHERVANE_SESSION_JWT_SECRET`: HS256 secret for decoding session
//!   bearer tokens (optional; unset means all callers resolve as anonymous)
//!
//! ## Upstream APIs
//! - `WEATHERVANE_UPSTREAM_TIMEOUT_SECS`: Per-request upstream timeout (default: "8")
//! - `WEATHERVANE_WEATHER_UPSTREAM_URL`, `WEATHERVANE_METAR_UPSTREAM_URL`,
//!   `WEATHERVANE_PRECIPITATION_UPSTREAM_URL`, `WEATHERVANE_POLLEN_UPSTREAM_URL`,
//!   `WEATHERVANE_NEWS_UPSTREAM_URL`: upstream base URLs (production defaults)
//! - `OPENWEATHER_API_KEY`, `GOOGLE_POLLEN_API_KEY`, `NEWS_API_KEY`: upstream
//!   credentials (optional; requests are sent without a key when unset)
//!
//! ## Response Cache TTLs (seconds)
//! - `WEATHERVANE_WEATHER_CACHE_TTL_SECS` (default: "300")
//! - `WEATHERVANE_METAR_CACHE_TTL_SECS` (default: "600")
//! - `WEATHERVANE_PRECIPITATION_CACHE_TTL_SECS` (default: "900")
//! - `WEATHERVANE_PRECIPITATION_HISTORY_CACHE_TTL_SECS` (default: "3600")
//! - `WEATHERVANE_POLLEN_CACHE_TTL_SECS` (default: "3600")
//! - `WEATHERVANE_NEWS_CACHE_TTL_SECS` (default: "900")

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment validation errors
#[derive(Debug, Clone)]
pub struct EnvValidationError {
    pub variable: String,
    pub message: String,
    pub severity: ErrorSeverity,
}

/// Severity level for environment validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    /// Critical errors that prevent application startup
    Critical,
    /// Warnings about missing optional variables or suboptimal configurations
    Warning,
    /// Informational messages about default values being used
    Info,
}

/// Validated application configuration derived from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Server
    pub host: String,
    pub port: u16,
    pub bind_address: SocketAddr,

    // Logging
    pub log_level: String,

    // Rate limiter
    pub rate_limit_hourly: u32,
    pub rate_limit_burst: u32,
    pub rate_limit_burst_window_ms: i64,
    pub sweep_interval_secs: u64,

    // Session resolution
    pub session_jwt_secret: Option<String>,

    // Upstreams
    pub upstream_timeout_secs: u64,
    pub weather_upstream_url: String,
    pub metar_upstream_url: String,
    pub precipitation_upstream_url: String,
    pub pollen_upstream_url: String,
    pub news_upstream_url: String,
    pub openweather_api_key: Option<String>,
    pub pollen_api_key: Option<String>,
    pub news_api_key: Option<String>,

    // Cache TTLs
    pub weather_cache_ttl_secs: u64,
    pub metar_cache_ttl_secs: u64,
    pub precipitation_cache_ttl_secs: u64,
    pub precipitation_history_cache_ttl_secs: u64,
    pub pollen_cache_ttl_secs: u64,
    pub news_cache_ttl_secs: u64,
}

/// Validate all environment variables and return configuration or errors
pub fn validate_environment() -> Result<AppConfig, Vec<EnvValidationError>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Server configuration
    let host = env::var("WEATHERVANE_HOST").unwrap_or_else(|_| {
        warnings.push(EnvValidationError {
            variable: "WEATHERVANE_HOST".to_string(),
            message: "Using default host '0.0.0.0'".to_string(),
            severity: ErrorSeverity::Info,
        });
        "0.0.0.0".to_string()
    });

    // Validate host is a valid IP address
    if IpAddr::from_str(&host).is_err() {
        errors.push(EnvValidationError {
            variable: "WEATHERVANE_HOST".to_string(),
            message: format!("Invalid IP address: {}", host),
            severity: ErrorSeverity::Critical,
        });
    }

    let port = match env::var("WEATHERVANE_PORT") {
        Ok(port_str) => match port_str.parse::<u16>() {
            Ok(port) => {
                if port < 1024 && port != 0 {
                    warnings.push(EnvValidationError {
                        variable: "WEATHERVANE_PORT".to_string(),
                        message: format!(
                            "Using privileged port {}, may require root privileges",
                            port
                        ),
                        severity: ErrorSeverity::Warning,
                    });
                }
                port
            }
            Err(_) => {
                errors.push(EnvValidationError {
                    variable: "WEATHERVANE_PORT".to_string(),
                    message: format!("Invalid port number: {}", port_str),
                    severity: ErrorSeverity::Critical,
                });
                3000 // fallback
            }
        },
        Err(_) => {
            warnings.push(EnvValidationError {
                variable: "WEATHERVANE_PORT".to_string(),
                message: "Using default port 3000".to_string(),
                severity: ErrorSeverity::Info,
            });
            3000
        }
    };

    // Create bind address
    let bind_address = match format!("{}:{}", host, port).parse::<SocketAddr>() {
        Ok(addr) => addr,
        Err(_) => {
            errors.push(EnvValidationError {
                variable: "WEATHERVANE_HOST/WEATHERVANE_PORT".to_string(),
                message: format!("Cannot create valid socket address from {}:{}", host, port),
                severity: ErrorSeverity::Critical,
            });
            "0.0.0.0:3000".parse().unwrap() // fallback
        }
    };

    // Logging configuration
    let log_level = env::var("WEATHERVANE_LOG_LEVEL")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| {
            warnings.push(EnvValidationError {
                variable: "RUST_LOG/WEATHERVANE_LOG_LEVEL".to_string(),
                message: "Using default log level 'weathervane=info,tower_http=debug'".to_string(),
                severity: ErrorSeverity::Info,
            });
            "weathervane=info,tower_http=debug".to_string()
        });

    // Rate limiter tuning. Non-positive or unparseable values silently fall
    // back to the defaults so a bad deploy never takes the gateway down.
    let rate_limit_hourly =
        parse_positive_env_var_with_default("WEATHER_RATE_LIMIT_HOURLY", 120u32, &mut warnings);
    let rate_limit_burst =
        parse_positive_env_var_with_default("WEATHER_RATE_LIMIT_BURST", 30u32, &mut warnings);
    let rate_limit_burst_window_ms = parse_positive_env_var_with_default(
        "WEATHER_RATE_LIMIT_BURST_WINDOW_MS",
        300_000i64,
        &mut warnings,
    );
    let sweep_interval_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_SWEEP_INTERVAL_SECS",
        60u64,
        &mut warnings,
    );

    // Session resolution
    let session_jwt_secret = env::var("WEATHERVANE_SESSION_JWT_SECRET").ok();
    if session_jwt_secret.is_none() {
        warnings.push(EnvValidationError {
            variable: "WEATHERVANE_SESSION_JWT_SECRET".to_string(),
            message: "No session secret configured, all callers resolve as anonymous".to_string(),
            severity: ErrorSeverity::Info,
        });
    }

    // Upstream configuration
    let upstream_timeout_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_UPSTREAM_TIMEOUT_SECS",
        8u64,
        &mut warnings,
    );

    let weather_upstream_url = env::var("WEATHERVANE_WEATHER_UPSTREAM_URL")
        .unwrap_or_else(|_| "https://api.openweathermap.org/data/2.5".to_string());
    let metar_upstream_url = env::var("WEATHERVANE_METAR_UPSTREAM_URL")
        .unwrap_or_else(|_| "https://aviationweather.gov/api/data/metar".to_string());
    let precipitation_upstream_url = env::var("WEATHERVANE_PRECIPITATION_UPSTREAM_URL")
        .unwrap_or_else(|_| "https://api.open-meteo.com/v1/forecast".to_string());
    let pollen_upstream_url = env::var("WEATHERVANE_POLLEN_UPSTREAM_URL")
        .unwrap_or_else(|_| "https://pollen.googleapis.com/v1/forecast:lookup".to_string());
    let news_upstream_url = env::var("WEATHERVANE_NEWS_UPSTREAM_URL")
        .unwrap_or_else(|_| "https://newsapi.org/v2/top-headlines".to_string());

    let openweather_api_key = env::var("OPENWEATHER_API_KEY").ok();
    let pollen_api_key = env::var("GOOGLE_POLLEN_API_KEY").ok();
    let news_api_key = env::var("NEWS_API_KEY").ok();

    for (variable, key) in [
        ("OPENWEATHER_API_KEY", &openweather_api_key),
        ("GOOGLE_POLLEN_API_KEY", &pollen_api_key),
        ("NEWS_API_KEY", &news_api_key),
    ] {
        if key.is_none() {
            warnings.push(EnvValidationError {
                variable: variable.to_string(),
                message: "No API key configured, upstream requests will be sent without one"
                    .to_string(),
                severity: ErrorSeverity::Info,
            });
        }
    }

    // Cache TTLs
    let weather_cache_ttl_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_WEATHER_CACHE_TTL_SECS",
        300u64,
        &mut warnings,
    );
    let metar_cache_ttl_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_METAR_CACHE_TTL_SECS",
        600u64,
        &mut warnings,
    );
    let precipitation_cache_ttl_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_PRECIPITATION_CACHE_TTL_SECS",
        900u64,
        &mut warnings,
    );
    let precipitation_history_cache_ttl_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_PRECIPITATION_HISTORY_CACHE_TTL_SECS",
        3600u64,
        &mut warnings,
    );
    let pollen_cache_ttl_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_POLLEN_CACHE_TTL_SECS",
        3600u64,
        &mut warnings,
    );
    let news_cache_ttl_secs = parse_positive_env_var_with_default(
        "WEATHERVANE_NEWS_CACHE_TTL_SECS",
        900u64,
        &mut warnings,
    );

    // Add all warnings to errors for reporting
    errors.extend(warnings);

    // Check if we have any critical errors
    let has_critical_errors = errors.iter().any(|e| e.severity == ErrorSeverity::Critical);

    if has_critical_errors {
        return Err(errors);
    }

    // Log non-critical issues
    for error in &errors {
        match error.severity {
            ErrorSeverity::Warning => warn!("{}: {}", error.variable, error.message),
            ErrorSeverity::Info => info!("{}: {}", error.variable, error.message),
            ErrorSeverity::Critical => {} // Already handled above
        }
    }

    Ok(AppConfig {
        host,
        port,
        bind_address,
        log_level,
        rate_limit_hourly,
        rate_limit_burst,
        rate_limit_burst_window_ms,
        sweep_interval_secs,
        session_jwt_secret,
        upstream_timeout_secs,
        weather_upstream_url,
        metar_upstream_url,
        precipitation_upstream_url,
        pollen_upstream_url,
        news_upstream_url,
        openweather_api_key,
        pollen_api_key,
        news_api_key,
        weather_cache_ttl_secs,
        metar_cache_ttl_secs,
        precipitation_cache_ttl_secs,
        precipitation_history_cache_ttl_secs,
        pollen_cache_ttl_secs,
        news_cache_ttl_secs,
    })
}

/// Get the validated configuration, exiting if validation fails
pub fn get_config() -> AppConfig {
    match validate_environment() {
        Ok(config) => config,
        Err(errors) => {
            eprintln!("Environment validation failed:");
            for error in errors {
                match error.severity {
                    ErrorSeverity::Critical => {
                        eprintln!("CRITICAL - {}: {}", error.variable, error.message)
                    }
                    ErrorSeverity::Warning => {
                        eprintln!("WARNING - {}: {}", error.variable, error.message)
                    }
                    ErrorSeverity::Info => {
                        eprintln!("INFO - {}: {}", error.variable, error.message)
                    }
                }
            }
            std::process::exit(1);
        }
    }
}

/// Print environment validation results in a user-friendly format
pub fn print_validation_results(result: &Result<AppConfig, Vec<EnvValidationError>>) {
    match result {
        Ok(config) => {
            info!("Environment validation successful");
            info!("Configuration:");
            info!("  Server: {}", config.bind_address);
            info!("  Log Level: {}", config.log_level);
            info!(
                "  Rate Limit: {}/hour, {}/burst ({}ms burst window)",
                config.rate_limit_hourly,
                config.rate_limit_burst,
                config.rate_limit_burst_window_ms
            );
            info!("  Sweep Interval: {}s", config.sweep_interval_secs);
            info!("  Upstream Timeout: {}s", config.upstream_timeout_secs);
            info!(
                "  Session Resolution: {}",
                if config.session_jwt_secret.is_some() {
                    "enabled"
                } else {
                    "disabled (anonymous only)"
                }
            );
        }
        Err(errors) => {
            let critical_count = errors
                .iter()
                .filter(|e| e.severity == ErrorSeverity::Critical)
                .count();
            let warning_count = errors
                .iter()
                .filter(|e| e.severity == ErrorSeverity::Warning)
                .count();
            let info_count = errors
                .iter()
                .filter(|e| e.severity == ErrorSeverity::Info)
                .count();

            if critical_count > 0 {
                eprintln!(
                    "Environment validation failed with {} critical error(s), {} warning(s), {} info message(s):",
                    critical_count, warning_count, info_count
                );
            } else {
                println!(
                    "Environment validation completed with {} warning(s), {} info message(s):",
                    warning_count, info_count
                );
            }

            for error in errors {
                let prefix = match error.severity {
                    ErrorSeverity::Critical => "CRITICAL",
                    ErrorSeverity::Warning => "WARNING",
                    ErrorSeverity::Info => "INFO",
                };
                println!("  {} - {}: {}", prefix, error.variable, error.message);
            }
        }
    }
}

/// Generate example environment configuration file
pub fn generate_env_example() -> String {
    r#"# Weathervane Proxy Gateway Environment Configuration
# Copy this file to .env and customize the values for your deployment

# =============================================================================
# Server Configuration
# =============================================================================

# Server bind address
# Default: 0.0.0.0 (bind to all interfaces)
WEATHERVANE_HOST=0.0.0.0

# Server port
# Default: 3000
WEATHERVANE_PORT=3000

# =============================================================================
# Logging Configuration
# =============================================================================

# Log level configuration
# Default: weathervane=info,tower_http=debug
RUST_LOG=weathervane=info,tower_http=debug

# =============================================================================
# Rate Limiter Tuning
# =============================================================================

# Requests allowed per client per hourly window
# Default: 120
WEATHER_RATE_LIMIT_HOURLY=120

# Requests allowed per client per burst window
# Default: 30
WEATHER_RATE_LIMIT_BURST=30

# Burst window length in milliseconds
# Default: 300000 (5 minutes)
WEATHER_RATE_LIMIT_BURST_WINDOW_MS=300000

# Background sweep interval for expired rate-limit entries and cache lines
# Default: 60
WEATHERVANE_SWEEP_INTERVAL_SECS=60

# =============================================================================
# Session Resolution
# =============================================================================

# HS256 secret for decoding session bearer tokens. When unset, every caller
# is rate limited by IP instead of user id.
# Generate with: openssl rand -base64 32
# WEATHERVANE_SESSION_JWT_SECRET=your-session-secret-here

# =============================================================================
# Upstream APIs
# =============================================================================

# Per-request upstream timeout in seconds
# Default: 8
WEATHERVANE_UPSTREAM_TIMEOUT_SECS=8

# Upstream base URLs (override for testing against a stub)
# WEATHERVANE_WEATHER_UPSTREAM_URL=https://api.openweathermap.org/data/2.5
# WEATHERVANE_METAR_UPSTREAM_URL=https://aviationweather.gov/api/data/metar
# WEATHERVANE_PRECIPITATION_UPSTREAM_URL=https://api.open-meteo.com/v1/forecast
# WEATHERVANE_POLLEN_UPSTREAM_URL=https://pollen.googleapis.com/v1/forecast:lookup
# WEATHERVANE_NEWS_UPSTREAM_URL=https://newsapi.org/v2/top-headlines

# Upstream credentials
# OPENWEATHER_API_KEY=your-openweathermap-key
# GOOGLE_POLLEN_API_KEY=your-google-pollen-key
# NEWS_API_KEY=your-newsapi-key

# =============================================================================
# Response Cache TTLs (seconds)
# =============================================================================

WEATHERVANE_WEATHER_CACHE_TTL_SECS=300
WEATHERVANE_METAR_CACHE_TTL_SECS=600
WEATHERVANE_PRECIPITATION_CACHE_TTL_SECS=900
WEATHERVANE_PRECIPITATION_HISTORY_CACHE_TTL_SECS=3600
WEATHERVANE_POLLEN_CACHE_TTL_SECS=3600
WEATHERVANE_NEWS_CACHE_TTL_SECS=900
"#
    .to_string()
}

/// Helper function to parse environment variable with default value
fn parse_env_var_with_default<T>(
    var_name: &str,
    default: T,
    warnings: &mut Vec<EnvValidationError>,
) -> T
where
    T: FromStr + Clone + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(var_name) {
        Ok(value_str) => match value_str.parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warnings.push(EnvValidationError {
                    variable: var_name.to_string(),
                    message: format!(
                        "Invalid value '{}': {}. Using default: {}",
                        value_str, e, default
                    ),
                    severity: ErrorSeverity::Warning,
                });
                default
            }
        },
        Err(_) => {
            warnings.push(EnvValidationError {
                variable: var_name.to_string(),
                message: format!("Using default value: {}", default),
                severity: ErrorSeverity::Info,
            });
            default
        }
    }
}

/// Like [`parse_env_var_with_default`], but a parsed value that is not
/// strictly positive also falls back to the default. Rate-limit ceilings and
/// TTLs of zero or below would disable the gateway outright.
fn parse_positive_env_var_with_default<T>(
    var_name: &str,
    default: T,
    warnings: &mut Vec<EnvValidationError>,
) -> T
where
    T: FromStr + Clone + Copy + Default + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_env_var_with_default(var_name, default, warnings);
    if value <= T::default() {
        warnings.push(EnvValidationError {
            variable: var_name.to_string(),
            message: format!(
                "Non-positive value '{}' is not allowed. Using default: {}",
                value, default
            ),
            severity: ErrorSeverity::Warning,
        });
        return default;
    }
    value
}
