use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::types::{
    CreateServerSpec, MetricsQuery, Server, ServerId, ServerMetrics, UpdateServerSpec,
};
use crate::{CloudProvider, Error, Result};

/// Deadlines applied to provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on a single provider request.
    pub request: Duration,
    /// Bound on waiting for create/delete actions to finish.
    pub action: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            action: Duration::from_secs(120),
        }
    }
}

/// Server management operations on top of a [`CloudProvider`].
///
/// Create and delete block until the provider's actions are terminal, so
/// callers only ever observe settled servers.
#[derive(Clone)]
pub struct ServerService {
    provider: Arc<dyn CloudProvider>,
    timeouts: Timeouts,
}

impl ServerService {
    pub fn new(provider: Arc<dyn CloudProvider>, timeouts: Timeouts) -> Self {
        Self { provider, timeouts }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn list(&self) -> Result<Vec<Server>> {
        let servers = self
            .bounded("list servers".into(), self.provider.list_servers())
            .await?;
        debug!(count = servers.len(), "listed servers");
        Ok(servers)
    }

    pub async fn get(&self, id: ServerId) -> Result<Server> {
        self.bounded(format!("get server {id}"), self.provider.get_server(id))
            .await
    }

    /// Provision a server and return it once every provisioning action succeeded.
    pub async fn create(&self, spec: CreateServerSpec) -> Result<Server> {
        spec.validate()?;

        let provisioned = self
            .bounded(
                format!("create server {}", spec.name),
                self.provider.create_server(&spec),
            )
            .await?;
        let id = provisioned.server.id;

        let actions = std::iter::once(provisioned.action).chain(provisioned.next_actions);
        let waits = async {
            for action in actions {
                let action_id = action.id;
                if let Err(e) = self
                    .provider
                    .wait_for_action(action, self.timeouts.action)
                    .await
                {
                    warn!(server_id = %id, action_id, error = %e, "provisioning action did not succeed");
                    return Err(e);
                }
            }
            Ok(())
        };
        tokio::time::timeout(self.timeouts.action, waits)
            .await
            .map_err(|_| Error::Timeout {
                op: format!("provision server {id}"),
                after: self.timeouts.action,
            })??;

        // The server in the create response is provisional; fetch the settled one.
        let server = self.get(id).await?;
        info!(server_id = %id, name = %server.name, status = ?server.status, "server created");
        Ok(server)
    }

    pub async fn update(&self, id: ServerId, spec: UpdateServerSpec) -> Result<Server> {
        spec.validate()?;

        let server = self
            .bounded(
                format!("update server {id}"),
                self.provider.update_server(id, &spec),
            )
            .await?;
        info!(server_id = %id, "server updated");
        Ok(server)
    }

    /// Delete a server, returning only once the delete action is terminal.
    ///
    /// A failed action leaves the server in place and yields
    /// [`Error::ActionFailed`].
    pub async fn delete(&self, id: ServerId) -> Result<()> {
        let action = self
            .bounded(format!("delete server {id}"), self.provider.delete_server(id))
            .await?;

        self.provider
            .wait_for_action(action, self.timeouts.action)
            .await
            .inspect_err(|e| warn!(server_id = %id, error = %e, "delete action did not succeed"))?;

        info!(server_id = %id, "server deleted");
        Ok(())
    }

    /// CPU, network and disk metrics at 60 second resolution.
    ///
    /// The window is validated before the provider is contacted.
    pub async fn metrics(&self, id: ServerId, start: &str, end: &str) -> Result<ServerMetrics> {
        let query = MetricsQuery::parse(start, end)?;

        self.bounded(
            format!("get metrics for server {id}"),
            self.provider.get_metrics(id, &query),
        )
        .await
    }

    async fn bounded<T>(&self, op: String, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.timeouts.request;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op = %op, timeout_secs = limit.as_secs_f64(), "provider call timed out");
                Err(Error::Timeout { op, after: limit })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stub::StubProvider;
    use crate::types::{ActionStatus, ServerStatus};

    fn service(stub: &Arc<StubProvider>) -> ServerService {
        ServerService::new(
            stub.clone(),
            Timeouts {
                request: Duration::from_secs(2),
                action: Duration::from_secs(2),
            },
        )
    }

    fn web_spec() -> CreateServerSpec {
        CreateServerSpec {
            name: "web-1".into(),
            server_type: "cx11".into(),
            image: "ubuntu-22.04".into(),
        }
    }

    #[tokio::test]
    async fn test_create_waits_for_action_before_returning() {
        let stub = Arc::new(StubProvider::new());
        stub.set_action_script(vec![ActionStatus::Running, ActionStatus::Running, ActionStatus::Success]);

        let server = service(&stub).create(web_spec()).await.unwrap();

        assert_eq!(server.name, "web-1");
        assert_eq!(server.status, ServerStatus::Running);
        assert!(!server.status.is_pending());
        assert_eq!(stub.calls("get_action"), 3);
        assert_eq!(stub.calls("get_server"), 1);
    }

    #[tokio::test]
    async fn test_create_validation_precedes_provider_call() {
        let stub = Arc::new(StubProvider::new());
        let mut spec = web_spec();
        spec.image = String::new();

        let err = service(&stub).create(spec).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(stub.calls("create_server"), 0);
    }

    #[tokio::test]
    async fn test_create_surfaces_failed_action() {
        let stub = Arc::new(StubProvider::new());
        stub.set_action_script(vec![ActionStatus::Error]);

        let err = service(&stub).create(web_spec()).await.unwrap_err();
        assert!(matches!(err, Error::ActionFailed { .. }));
    }

    #[tokio::test]
    async fn test_create_waits_for_follow_up_actions() {
        let stub = Arc::new(StubProvider::new());
        stub.set_follow_up_scripts(vec![
            vec![ActionStatus::Running, ActionStatus::Success],
            vec![ActionStatus::Success],
        ]);

        let server = service(&stub).create(web_spec()).await.unwrap();

        assert_eq!(server.status, ServerStatus::Running);
        // One poll for the create action, two and one for the follow-ups.
        assert_eq!(stub.calls("get_action"), 4);
        assert_eq!(stub.calls("get_server"), 1);
    }

    #[tokio::test]
    async fn test_create_surfaces_failed_follow_up_action() {
        let stub = Arc::new(StubProvider::new());
        stub.set_follow_up_scripts(vec![vec![ActionStatus::Running, ActionStatus::Error]]);

        let err = service(&stub).create(web_spec()).await.unwrap_err();

        match err {
            Error::ActionFailed { command, .. } => assert_eq!(command, "start_server"),
            other => panic!("expected ActionFailed, got {other:?}"),
        }
        assert_eq!(stub.calls("get_server"), 0);
    }

    #[tokio::test]
    async fn test_create_times_out_on_stuck_action() {
        let stub = Arc::new(StubProvider::new());
        stub.set_action_script(vec![ActionStatus::Running]);
        let impatient = ServerService::new(
            stub.clone(),
            Timeouts {
                request: Duration::from_secs(2),
                action: Duration::from_millis(50),
            },
        );

        let err = impatient.create(web_spec()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_delete_returns_after_terminal_action() {
        let stub = Arc::new(StubProvider::new());
        let server = stub.insert_server("db-1", "cx21", Some("debian-12"), ServerStatus::Running);
        stub.set_action_script(vec![ActionStatus::Running, ActionStatus::Success]);

        service(&stub).delete(server.id).await.unwrap();

        assert_eq!(stub.calls("get_action"), 2);
        assert!(stub.server(server.id).is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_server() {
        let stub = Arc::new(StubProvider::new());
        let server = stub.insert_server("db-1", "cx21", Some("debian-12"), ServerStatus::Running);
        stub.set_action_script(vec![ActionStatus::Error]);

        let err = service(&stub).delete(server.id).await.unwrap_err();

        assert!(matches!(err, Error::ActionFailed { .. }));
        assert!(stub.server(server.id).is_some());
    }

    #[tokio::test]
    async fn test_delete_unknown_server_is_not_found() {
        let stub = Arc::new(StubProvider::new());
        let id = ServerId::new(999).unwrap();

        let err = service(&stub).delete(id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(missing) if missing == id));
        assert_eq!(stub.calls("get_action"), 0);
    }

    #[tokio::test]
    async fn test_metrics_forwards_fixed_query() {
        let stub = Arc::new(StubProvider::new());
        let server = stub.insert_server("web-1", "cx11", Some("ubuntu-22.04"), ServerStatus::Running);

        service(&stub)
            .metrics(server.id, "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z")
            .await
            .unwrap();

        let query = stub.last_metrics_query().unwrap();
        assert_eq!(query.step, 60);
        assert_eq!(query.types, crate::types::MetricType::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_metrics_rejects_bad_timestamps_without_network_call() {
        let stub = Arc::new(StubProvider::new());
        let server = stub.insert_server("web-1", "cx11", Some("ubuntu-22.04"), ServerStatus::Running);

        let err = service(&stub)
            .metrics(server.id, "not-a-date", "2024-01-02T00:00:00Z")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(stub.calls("get_metrics"), 0);
    }

    #[tokio::test]
    async fn test_update_renames_and_relabels() {
        let stub = Arc::new(StubProvider::new());
        let server = stub.insert_server("web-1", "cx11", Some("ubuntu-22.04"), ServerStatus::Running);

        let updated = service(&stub)
            .update(
                server.id,
                UpdateServerSpec {
                    name: Some("web-2".into()),
                    labels: Some([("env".to_string(), "prod".to_string())].into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "web-2");
        assert_eq!(updated.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(updated.server_type, "cx11");
    }

    #[tokio::test]
    async fn test_provider_failure_propagates_without_retry() {
        let stub = Arc::new(StubProvider::new());
        stub.set_unavailable(true);

        let err = service(&stub).list().await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert_eq!(stub.calls("list_servers"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_are_independent() {
        let stub = Arc::new(StubProvider::new());
        let servers: Vec<Server> = (0..16)
            .map(|i| {
                stub.insert_server(&format!("node-{i}"), "cx11", Some("ubuntu-22.04"), ServerStatus::Running)
            })
            .collect();
        let shared = service(&stub);

        let handles: Vec<_> = servers
            .iter()
            .map(|s| {
                let svc = shared.clone();
                let id = s.id;
                tokio::spawn(async move { svc.get(id).await })
            })
            .collect();

        for (handle, expected) in handles.into_iter().zip(&servers) {
            let fetched = handle.await.unwrap().unwrap();
            assert_eq!(&fetched, expected);
        }
    }
}
