use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sampling resolution for server metrics, in seconds.
pub const METRICS_STEP_SECS: u32 = 60;

/// Provider-assigned server identifier. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(i64);

impl ServerId {
    pub fn new(raw: i64) -> Result<Self> {
        if raw <= 0 {
            return Err(Error::Validation(format!("invalid server id: {raw}")));
        }
        Ok(Self(raw))
    }

    /// Parse a path segment such as `"42"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::Validation(format!("invalid server id: {raw}")))?;
        Self::new(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-reported server status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Initializing,
    Starting,
    Running,
    Stopping,
    Off,
    Deleting,
    Migrating,
    Rebuilding,
    Unknown,
}

impl ServerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "initializing" => Self::Initializing,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "off" => Self::Off,
            "deleting" => Self::Deleting,
            "migrating" => Self::Migrating,
            "rebuilding" => Self::Rebuilding,
            _ => Self::Unknown,
        }
    }

    /// Still coming up after a provisioning request.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Initializing | Self::Starting)
    }
}

/// A compute server as reported by the provider. Never cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub server_type: String,
    pub image: Option<String>,
    pub labels: HashMap<String, String>,
    pub status: ServerStatus,
    pub created: String,
    pub public_ipv4: Option<String>,
}

/// Lifecycle of a provider-side asynchronous operation.
///
/// Hetzner reports queued actions as `running`, so there is no separate
/// pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

/// Handle for an asynchronous provider operation (provisioning, deletion, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub command: String,
    pub status: ActionStatus,
    pub progress: i32,
    pub error: Option<ActionError>,
}

/// Fields required to provision a server.
#[derive(Debug, Clone)]
pub struct CreateServerSpec {
    pub name: String,
    pub server_type: String,
    pub image: String,
}

impl CreateServerSpec {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("server_type", &self.server_type),
            ("image", &self.image),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Mutable server fields. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateServerSpec {
    pub name: Option<String>,
    pub labels: Option<HashMap<String, String>>,
}

impl UpdateServerSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_none() && self.labels.is_none() {
            return Err(Error::Validation("nothing to update: provide name and/or labels".into()));
        }
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(Error::Validation("name must not be empty".into()));
        }
        Ok(())
    }
}

/// A freshly requested server plus the actions that bring it up.
#[derive(Debug, Clone)]
pub struct ProvisionedServer {
    pub server: Server,
    pub action: Action,
    pub next_actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Cpu,
    Network,
    Disk,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [MetricType::Cpu, MetricType::Network, MetricType::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Network => "network",
            Self::Disk => "disk",
        }
    }
}

/// Validated metrics window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub step: u32,
    pub types: Vec<MetricType>,
}

impl MetricsQuery {
    /// Parse an RFC3339 window. Always samples every metric type at a fixed step.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_at = DateTime::parse_from_rfc3339(start)
            .map_err(|e| Error::Validation(format!("invalid start time format: {e}")))?;
        let end_at = DateTime::parse_from_rfc3339(end)
            .map_err(|e| Error::Validation(format!("invalid end time format: {e}")))?;

        if end_at < start_at {
            return Err(Error::Validation("end time must not be before start time".into()));
        }

        Ok(Self {
            start: start_at,
            end: end_at,
            step: METRICS_STEP_SECS,
            types: MetricType::ALL.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: f64,
    pub value: String,
}

/// Metric time series keyed by series name (e.g. `cpu`, `network.0.bandwidth.in`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMetrics {
    pub start: String,
    pub end: String,
    pub step: f64,
    pub time_series: HashMap<String, Vec<MetricSample>>,
}
