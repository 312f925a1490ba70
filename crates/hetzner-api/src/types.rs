use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Server types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub created: String,
    pub server_type: ServerTypeRef,
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub public_net: Option<PublicNet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerTypeRef {
    pub name: String,
}

/// Image attached to a server. Snapshots and backups carry no name.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicNet {
    pub ipv4: Option<Ipv4>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ipv4 {
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_after_create: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateServerRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerResponse {
    pub server: Server,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListServersResponse {
    pub servers: Vec<Server>,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServerResponse {
    pub server: Server,
    pub action: Action,
    #[serde(default)]
    pub next_actions: Vec<Action>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub next_page: Option<u32>,
    pub last_page: Option<u32>,
    pub total_entries: Option<u64>,
}

// ── Metrics types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Cpu,
    Disk,
    Network,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Disk => "disk",
            Self::Network => "network",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsQuery {
    pub types: Vec<MetricType>,
    /// RFC3339 timestamps, passed through verbatim.
    pub start: String,
    pub end: String,
    pub step: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsResponse {
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metrics {
    pub start: String,
    pub end: String,
    pub step: f64,
    #[serde(default)]
    pub time_series: HashMap<String, TimeSeries>,
}

/// Samples are `[unix_timestamp, "value"]` pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeries {
    pub values: Vec<(f64, String)>,
}

// ── Action types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub id: i64,
    pub command: String,
    pub status: String,
    pub progress: i32,
    pub started: Option<String>,
    pub finished: Option<String>,
    pub error: Option<ActionError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub action: Action,
}

// ── Error envelope ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: String,
    pub message: String,
}
