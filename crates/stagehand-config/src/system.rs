//! System configuration parsing.

use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::{ConfigError, ConfigResult, parse_duration};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagehandConfig {
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
}

/// Settings for the scheduling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the loop scans even when nobody called `schedule`.
    pub poll_interval: Duration,
    /// Start with matching paused.
    pub paused: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            paused: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings for the HTTP server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// PostgreSQL URL. Without one the server keeps stages in memory.
    pub database_url: Option<String>,
    /// Maximum connections in the database pool.
    pub database_pool_size: u32,
    /// Upper bound on how long one runner request is held open.
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            database_pool_size: 10,
            request_timeout: Duration::from_secs(30),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Read and parse a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<StagehandConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Parse configuration from KDL text. Missing fields keep their defaults.
pub fn parse_config(kdl: &str) -> ConfigResult<StagehandConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = StagehandConfig::default();
    let mut seen_scheduler = false;
    let mut seen_server = false;

    for node in doc.nodes() {
        match node.name().value() {
            "scheduler" => {
                if std::mem::replace(&mut seen_scheduler, true) {
                    return Err(ConfigError::Duplicate("scheduler".to_string()));
                }
                config.scheduler = parse_scheduler(node)?;
            }
            "server" => {
                if std::mem::replace(&mut seen_server, true) {
                    return Err(ConfigError::Duplicate("server".to_string()));
                }
                config.server = parse_server(node)?;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_scheduler(node: &KdlNode) -> ConfigResult<SchedulerConfig> {
    let mut scheduler = SchedulerConfig::default();

    for child in child_nodes(node) {
        match child.name().value() {
            "poll-interval" | "poll_interval" => {
                scheduler.poll_interval = get_duration_arg(child, "scheduler.poll-interval")?;
            }
            "paused" => {
                scheduler.paused = get_first_arg(child)
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| ConfigError::invalid("scheduler.paused", "expected a boolean"))?;
            }
            _ => {}
        }
    }

    Ok(scheduler)
}

fn parse_server(node: &KdlNode) -> ConfigResult<ServerConfig> {
    let mut server = ServerConfig::default();

    for child in child_nodes(node) {
        match child.name().value() {
            "listen" => {
                let addr = get_string_arg(child, "server.listen")?;
                server.listen = addr
                    .parse()
                    .map_err(|e| ConfigError::invalid("server.listen", format!("{}", e)))?;
            }
            "database-url" | "database_url" => {
                server.database_url = Some(get_string_arg(child, "server.database-url")?);
            }
            "database-pool-size" | "database_pool_size" => {
                server.database_pool_size = get_first_arg(child)
                    .and_then(|v| v.as_integer())
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        ConfigError::invalid(
                            "server.database-pool-size",
                            "expected a positive integer",
                        )
                    })?;
            }
            "request-timeout" | "request_timeout" => {
                server.request_timeout = get_duration_arg(child, "server.request-timeout")?;
            }
            "log-format" | "log_format" => {
                server.log_format = match get_string_arg(child, "server.log-format")?.as_str() {
                    "pretty" => LogFormat::Pretty,
                    "json" => LogFormat::Json,
                    other => {
                        return Err(ConfigError::invalid(
                            "server.log-format",
                            format!("unknown log format: {}", other),
                        ));
                    }
                };
            }
            _ => {}
        }
    }

    Ok(server)
}

// Helper functions for extracting values from KDL nodes

fn child_nodes(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn get_first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn get_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::invalid(field, "expected a string"))
}

fn get_duration_arg(node: &KdlNode, field: &str) -> ConfigResult<Duration> {
    match get_first_arg(node) {
        Some(value) => {
            if let Some(text) = value.as_string() {
                parse_duration(field, text)
            } else if let Some(secs) = value.as_integer() {
                let secs = u64::try_from(secs)
                    .map_err(|_| ConfigError::invalid(field, "duration must be positive"))?;
                parse_duration(field, &secs.to_string())
            } else {
                Err(ConfigError::invalid(field, "expected a duration"))
            }
        }
        None => Err(ConfigError::invalid(field, "missing value")),
    }
}
