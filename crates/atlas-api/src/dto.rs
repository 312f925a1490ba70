use std::collections::HashMap;

use atlas_infra::types::{CreateServerSpec, UpdateServerSpec};
use serde::{Deserialize, Serialize};

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
}

impl From<CreateServerRequest> for CreateServerSpec {
    fn from(req: CreateServerRequest) -> Self {
        Self {
            name: req.name,
            server_type: req.server_type,
            image: req.image,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    pub labels: Option<HashMap<String, String>>,
}

impl From<UpdateServerRequest> for UpdateServerSpec {
    fn from(req: UpdateServerRequest) -> Self {
        Self {
            name: req.name,
            labels: req.labels,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub message: &'static str,
}
