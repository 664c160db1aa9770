//! Stage descriptors, worker capability filters and assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BuildId, Error, StageId};

/// Kind assumed when a stage or filter leaves `kind` empty.
pub const DEFAULT_KIND: &str = "pipeline";

/// Type assumed when a stage or filter leaves `type` empty.
pub const DEFAULT_TYPE: &str = "docker";

/// Execution status of a stage as recorded by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failure,
    Error,
    Killed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Failure => "failure",
            StageStatus::Error => "error",
            StageStatus::Killed => "killed",
            StageStatus::Skipped => "skipped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, StageStatus::Running)
    }

    /// Whether the stage has finished, one way or another.
    pub fn is_done(&self) -> bool {
        !matches!(self, StageStatus::Pending | StageStatus::Running)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "success" => Ok(StageStatus::Success),
            "failure" => Ok(StageStatus::Failure),
            "error" => Ok(StageStatus::Error),
            "killed" => Ok(StageStatus::Killed),
            "skipped" => Ok(StageStatus::Skipped),
            other => Err(Error::InvalidInput(format!("unknown stage status: {}", other))),
        }
    }
}

/// A stage as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub id: StageId,
    pub build_id: BuildId,
    pub name: String,
    /// Pipeline kind; empty means [`DEFAULT_KIND`].
    #[serde(default)]
    pub kind: String,
    /// Pipeline type; empty means [`DEFAULT_TYPE`].
    #[serde(default, rename = "type")]
    pub stage_type: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub status: StageStatus,
    /// Machine that claimed the stage. Empty while unassigned.
    #[serde(default)]
    pub machine: String,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
}

impl StageDescriptor {
    /// A pending, unassigned stage with the given requirement.
    pub fn pending(build_id: BuildId, name: impl Into<String>) -> Self {
        Self {
            id: StageId::new(),
            build_id,
            name: name.into(),
            kind: String::new(),
            stage_type: String::new(),
            os: String::new(),
            arch: String::new(),
            status: StageStatus::Pending,
            machine: String::new(),
            started: None,
            stopped: None,
        }
    }

    /// Not running, not finished and not claimed by any machine.
    pub fn is_eligible(&self) -> bool {
        !self.status.is_running() && !self.status.is_done() && self.machine.is_empty()
    }

    /// Kind with the default applied.
    pub fn effective_kind(&self) -> &str {
        or_default(&self.kind, DEFAULT_KIND)
    }

    /// Type with the default applied.
    pub fn effective_type(&self) -> &str {
        or_default(&self.stage_type, DEFAULT_TYPE)
    }
}

/// What a waiting worker says it can execute.
///
/// Empty `kind`/`type` take the defaults. Empty `os`/`arch` mean the worker
/// does not care about that axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityFilter {
    #[serde(default)]
    pub kind: String,
    #[serde(default, rename = "type")]
    pub stage_type: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
}

impl CapabilityFilter {
    /// A filter for the default kind and type on a specific platform.
    pub fn platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            ..Self::default()
        }
    }

    pub fn effective_kind(&self) -> &str {
        or_default(&self.kind, DEFAULT_KIND)
    }

    pub fn effective_type(&self) -> &str {
        or_default(&self.stage_type, DEFAULT_TYPE)
    }
}

/// The payload handed to a worker when it is matched with a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAssignment {
    pub stage_id: StageId,
    pub build_id: BuildId,
    pub name: String,
    pub kind: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    pub os: String,
    pub arch: String,
    pub status: StageStatus,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
}

impl From<&StageDescriptor> for StageAssignment {
    fn from(stage: &StageDescriptor) -> Self {
        Self {
            stage_id: stage.id,
            build_id: stage.build_id,
            name: stage.name.clone(),
            kind: stage.kind.clone(),
            stage_type: stage.stage_type.clone(),
            os: stage.os.clone(),
            arch: stage.arch.clone(),
            status: stage.status,
            started: stage.started,
            stopped: stage.stopped,
        }
    }
}

fn or_default<'a>(value: &'a str, default: &'static str) -> &'a str {
    if value.is_empty() { default } else { value }
}
