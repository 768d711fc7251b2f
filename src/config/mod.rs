//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, LoggingOverrides, ProbeArgs, ServeArgs, ServeOverrides};

use crate::cache::{CacheConfig, CacheKind};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "feedgate";
const ENV_PREFIX: &str = "FEEDGATE";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 1200;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_ALLOW_ORIGIN: &str = "*";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub access: AccessSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub kind: CacheKind,
    pub route_expire_seconds: u64,
    pub memory_max_entries: usize,
    pub sweep_interval_seconds: u64,
    pub operation_timeout_ms: u64,
    pub write_queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct AccessSettings {
    /// Feed routes are open when unset.
    pub key: Option<String>,
    pub allow_origin: String,
    pub disallow_robots: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Probe(args)) => raw.apply_logging_overrides(&args.logging),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            access,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            access: build_access_settings(access),
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    access: RawAccessSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(kind) = overrides.cache_kind.as_ref() {
            self.cache.kind = Some(kind.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.cache_route_expire_seconds {
            self.cache.route_expire_seconds = Some(seconds);
        }
        if let Some(key) = overrides.access_key.as_ref() {
            self.access.key = Some(key.clone());
        }

        self.apply_logging_overrides(&overrides.logging);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let redis_url = non_blank(cache.redis_url);
    let kind = match cache.kind.as_deref().map(str::trim) {
        None | Some("") | Some("memory") => CacheKind::Memory,
        Some("none") => CacheKind::None,
        Some("redis") => match redis_url {
            Some(url) => CacheKind::Redis { url },
            None => {
                return Err(LoadError::invalid(
                    "cache.redis_url",
                    "required when cache.kind is `redis`",
                ));
            }
        },
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.kind",
                format!("unknown backend `{other}`; expected memory, redis or none"),
            ));
        }
    };

    let route_expire_seconds = positive(
        cache.route_expire_seconds,
        defaults.route_expire_seconds,
        "cache.route_expire_seconds",
    )?;
    let sweep_interval_seconds = positive(
        cache.sweep_interval_seconds,
        defaults.sweep_interval_seconds,
        "cache.sweep_interval_seconds",
    )?;
    let operation_timeout_ms = positive(
        cache.operation_timeout_ms,
        defaults.operation_timeout_ms,
        "cache.operation_timeout_ms",
    )?;
    let memory_max_entries = positive_usize(
        cache.memory_max_entries,
        defaults.memory_max_entries,
        "cache.memory_max_entries",
    )?;
    let write_queue_capacity = positive_usize(
        cache.write_queue_capacity,
        defaults.write_queue_capacity,
        "cache.write_queue_capacity",
    )?;

    Ok(CacheSettings {
        kind,
        route_expire_seconds,
        memory_max_entries,
        sweep_interval_seconds,
        operation_timeout_ms,
        write_queue_capacity,
    })
}

fn build_access_settings(access: RawAccessSettings) -> AccessSettings {
    AccessSettings {
        key: non_blank(access.key),
        allow_origin: non_blank(access.allow_origin)
            .unwrap_or_else(|| DEFAULT_ALLOW_ORIGIN.to_string()),
        disallow_robots: access.disallow_robots.unwrap_or(false),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    kind: Option<String>,
    redis_url: Option<String>,
    route_expire_seconds: Option<u64>,
    memory_max_entries: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    operation_timeout_ms: Option<u64>,
    write_queue_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAccessSettings {
    key: Option<String>,
    allow_origin: Option<String>,
    disallow_robots: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive(value: Option<u64>, default: u64, key: &'static str) -> Result<u64, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        value => Ok(value),
    }
}

fn positive_usize(
    value: Option<u64>,
    default: usize,
    key: &'static str,
) -> Result<usize, LoadError> {
    let value = match value {
        Some(value) => usize::try_from(value)
            .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?,
        None => default,
    };
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}
