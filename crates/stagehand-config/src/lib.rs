//! KDL configuration parsing for Stagehand.
//!
//! This crate handles parsing of:
//! - Scheduler settings (poll interval, start paused)
//! - Server settings (listen address, database, long-poll timeout, logging)
//! - Human-readable durations

pub mod duration;
pub mod error;
pub mod system;

pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
pub use system::{
    LogFormat, SchedulerConfig, ServerConfig, StagehandConfig, load_config, parse_config,
};
