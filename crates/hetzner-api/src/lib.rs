//! Typed Rust client for the Hetzner Cloud API.
//!
//! Covers the subset needed for managing compute servers:
//! servers (list, get, create, update, delete), server metrics, and actions.

mod types;

pub use types::*;

use std::time::Duration;

const BASE_URL: &str = "https://api.hetzner.cloud/v1";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const PER_PAGE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hetzner api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("hetzner api {endpoint} returned {status} ({code}): {message}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        code: String,
        message: String,
    },
}

impl Error {
    /// Whether the API reported the addressed resource as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Api { status, code, .. } => {
                *status == reqwest::StatusCode::NOT_FOUND || code == "not_found"
            }
            Error::Request(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Hetzner Cloud REST API.
#[derive(Clone)]
pub struct HetznerClient {
    token: String,
    base_url: String,
    http: reqwest::Client,
}

impl HetznerClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            token: token.into(),
            base_url: BASE_URL.into(),
            http,
        })
    }

    /// Point the client at a different API root (e.g. a local stub server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => (envelope.error.code, envelope.error.message),
                Err(_) => ("unknown".to_string(), body),
            };
            return Err(Error::Api {
                endpoint,
                status,
                code,
                message,
            });
        }
        Ok(resp)
    }

    // ── Servers ──────────────────────────────────────────────────────

    /// Fetch every server, following pagination in the order the API returns.
    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        let mut servers = Vec::new();
        let mut page = 1;

        loop {
            let resp = self
                .http
                .get(self.url("/servers"))
                .header("Authorization", self.auth())
                .query(&[("page", page), ("per_page", PER_PAGE)])
                .send()
                .await?;

            let body: ListServersResponse = Self::check(resp, "list servers").await?.json().await?;
            servers.extend(body.servers);

            match body.meta.and_then(|m| m.pagination.next_page) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(servers)
    }

    pub async fn get_server(&self, id: i64) -> Result<Server> {
        let resp = self
            .http
            .get(self.url(&format!("/servers/{id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;

        let body: ServerResponse = Self::check(resp, "get server").await?.json().await?;
        Ok(body.server)
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<CreateServerResponse> {
        let resp = self
            .http
            .post(self.url("/servers"))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create server")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn update_server(&self, id: i64, req: &UpdateServerRequest) -> Result<Server> {
        let resp = self
            .http
            .put(self.url(&format!("/servers/{id}")))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        let body: ServerResponse = Self::check(resp, "update server").await?.json().await?;
        Ok(body.server)
    }

    /// Delete a server. The returned action tracks the teardown.
    pub async fn delete_server(&self, id: i64) -> Result<Action> {
        let resp = self
            .http
            .delete(self.url(&format!("/servers/{id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;

        let body: ActionResponse = Self::check(resp, "delete server").await?.json().await?;
        Ok(body.action)
    }

    // ── Metrics ──────────────────────────────────────────────────────

    pub async fn get_server_metrics(&self, id: i64, query: &MetricsQuery) -> Result<Metrics> {
        let types = query
            .types
            .iter()
            .map(MetricType::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let resp = self
            .http
            .get(self.url(&format!("/servers/{id}/metrics")))
            .header("Authorization", self.auth())
            .query(&[
                ("type", types),
                ("start", query.start.clone()),
                ("end", query.end.clone()),
                ("step", query.step.to_string()),
            ])
            .send()
            .await?;

        let body: MetricsResponse = Self::check(resp, "get server metrics").await?.json().await?;
        Ok(body.metrics)
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub async fn get_action(&self, id: i64) -> Result<Action> {
        let resp = self
            .http
            .get(self.url(&format!("/actions/{id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;

        let body: ActionResponse = Self::check(resp, "get action").await?.json().await?;
        Ok(body.action)
    }
}
