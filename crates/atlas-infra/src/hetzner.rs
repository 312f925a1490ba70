use async_trait::async_trait;
use chrono::SecondsFormat;
use hetzner_api::HetznerClient;
use tracing::info;

use crate::types::{
    Action, ActionError, ActionStatus, CreateServerSpec, MetricSample, MetricType, MetricsQuery,
    ProvisionedServer, Server, ServerId, ServerMetrics, ServerStatus, UpdateServerSpec,
};
use crate::{CloudProvider, Error, PollPolicy, Result};

/// Hetzner Cloud provider backed by `hetzner_api::HetznerClient`.
///
/// Holds a single token-authenticated session for the whole process.
pub struct HetznerProvider {
    client: HetznerClient,
    location: Option<String>,
    poll: PollPolicy,
}

impl HetznerProvider {
    /// Build a provider for `token`. An empty token is a configuration error.
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Configuration("HCLOUD_TOKEN is required".into()));
        }

        let client = HetznerClient::new(token)
            .map_err(|e| Error::Configuration(format!("hetzner client not initialized: {e}")))?;

        Ok(Self {
            client,
            location: None,
            poll: PollPolicy::default(),
        })
    }

    /// Override the API root (e.g. `HCLOUD_ENDPOINT`).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(endpoint);
        self
    }

    /// Default location for new servers. Unset lets Hetzner pick.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn convert_server(s: hetzner_api::Server) -> Result<Server> {
        let id = ServerId::new(s.id).map_err(|_| Error::Provider {
            op: "decode server".into(),
            message: format!("provider returned invalid server id {}", s.id),
        })?;

        Ok(Server {
            id,
            name: s.name,
            server_type: s.server_type.name,
            image: s.image.and_then(|img| img.name.or(img.description)),
            labels: s.labels,
            status: ServerStatus::parse(&s.status),
            created: s.created,
            public_ipv4: s.public_net.and_then(|net| net.ipv4).map(|v4| v4.ip),
        })
    }

    fn convert_action(a: hetzner_api::Action) -> Action {
        let status = match a.status.as_str() {
            "success" => ActionStatus::Success,
            "error" => ActionStatus::Error,
            _ => ActionStatus::Running,
        };

        Action {
            id: a.id,
            command: a.command,
            status,
            progress: a.progress,
            error: a.error.map(|e| ActionError {
                code: e.code,
                message: e.message,
            }),
        }
    }

    fn metric_type(t: MetricType) -> hetzner_api::MetricType {
        match t {
            MetricType::Cpu => hetzner_api::MetricType::Cpu,
            MetricType::Network => hetzner_api::MetricType::Network,
            MetricType::Disk => hetzner_api::MetricType::Disk,
        }
    }

    /// Map a client error, turning 404s on a known server into `NotFound`.
    fn api_error(op: String, id: Option<ServerId>, e: hetzner_api::Error) -> Error {
        match id {
            Some(id) if e.is_not_found() => Error::NotFound(id),
            _ => Error::Provider {
                op,
                message: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl CloudProvider for HetznerProvider {
    async fn list_servers(&self) -> Result<Vec<Server>> {
        let servers = self
            .client
            .list_servers()
            .await
            .map_err(|e| Self::api_error("list servers".into(), None, e))?;

        servers.into_iter().map(Self::convert_server).collect()
    }

    async fn get_server(&self, id: ServerId) -> Result<Server> {
        let server = self
            .client
            .get_server(id.get())
            .await
            .map_err(|e| Self::api_error(format!("get server {id}"), Some(id), e))?;

        Self::convert_server(server)
    }

    async fn create_server(&self, spec: &CreateServerSpec) -> Result<ProvisionedServer> {
        let resp = self
            .client
            .create_server(&hetzner_api::CreateServerRequest {
                name: spec.name.clone(),
                server_type: spec.server_type.clone(),
                image: spec.image.clone(),
                location: self.location.clone(),
                labels: None,
                start_after_create: Some(true),
            })
            .await
            .map_err(|e| Self::api_error(format!("create server {}", spec.name), None, e))?;

        let server = Self::convert_server(resp.server)?;
        info!(server_id = %server.id, action_id = resp.action.id, "hetzner: server create requested");

        Ok(ProvisionedServer {
            server,
            action: Self::convert_action(resp.action),
            next_actions: resp.next_actions.into_iter().map(Self::convert_action).collect(),
        })
    }

    async fn update_server(&self, id: ServerId, spec: &UpdateServerSpec) -> Result<Server> {
        let server = self
            .client
            .update_server(
                id.get(),
                &hetzner_api::UpdateServerRequest {
                    name: spec.name.clone(),
                    labels: spec.labels.clone(),
                },
            )
            .await
            .map_err(|e| Self::api_error(format!("update server {id}"), Some(id), e))?;

        info!(server_id = %id, "hetzner: server updated");
        Self::convert_server(server)
    }

    async fn delete_server(&self, id: ServerId) -> Result<Action> {
        let action = self
            .client
            .delete_server(id.get())
            .await
            .map_err(|e| Self::api_error(format!("delete server {id}"), Some(id), e))?;

        info!(server_id = %id, action_id = action.id, "hetzner: server delete requested");
        Ok(Self::convert_action(action))
    }

    async fn get_metrics(&self, id: ServerId, query: &MetricsQuery) -> Result<ServerMetrics> {
        let metrics = self
            .client
            .get_server_metrics(
                id.get(),
                &hetzner_api::MetricsQuery {
                    types: query.types.iter().copied().map(Self::metric_type).collect(),
                    start: query.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    end: query.end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    step: query.step,
                },
            )
            .await
            .map_err(|e| Self::api_error(format!("get metrics for server {id}"), Some(id), e))?;

        let time_series = metrics
            .time_series
            .into_iter()
            .map(|(name, series)| {
                let samples = series
                    .values
                    .into_iter()
                    .map(|(timestamp, value)| MetricSample { timestamp, value })
                    .collect();
                (name, samples)
            })
            .collect();

        Ok(ServerMetrics {
            start: metrics.start,
            end: metrics.end,
            step: metrics.step,
            time_series,
        })
    }

    async fn get_action(&self, id: i64) -> Result<Action> {
        let action = self
            .client
            .get_action(id)
            .await
            .map_err(|e| Self::api_error(format!("get action {id}"), None, e))?;

        Ok(Self::convert_action(action))
    }

    fn name(&self) -> &'static str {
        "hetzner"
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll
    }
}
