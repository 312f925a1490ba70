pub mod hetzner;
pub mod service;
#[cfg(any(test, feature = "stub"))]
pub mod stub;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use types::{
    Action, ActionStatus, CreateServerSpec, MetricsQuery, ProvisionedServer, Server, ServerId,
    ServerMetrics, UpdateServerSpec,
};

pub use hetzner::HetznerProvider;
pub use service::{ServerService, Timeouts};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("server {0} not found")]
    NotFound(ServerId),

    #[error("{op}: {message}")]
    Provider { op: String, message: String },

    #[error("action {action_id} ({command}) failed: {code}: {message}")]
    ActionFailed {
        action_id: i64,
        command: String,
        code: String,
        message: String,
    },

    #[error("{op} timed out after {}s", .after.as_secs_f64())]
    Timeout { op: String, after: Duration },
}

impl Error {
    pub(crate) fn action_failed(action: &Action) -> Self {
        let (code, message) = match &action.error {
            Some(e) => (e.code.clone(), e.message.clone()),
            None => ("unknown".into(), "action reported an error".into()),
        };
        Self::ActionFailed {
            action_id: action.id,
            command: action.command.clone(),
            code,
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Backoff between action status checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl PollPolicy {
    fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(self.multiplier).min(self.max)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

/// Adapter over a cloud provider's server API.
///
/// Implementations hold only immutable session state and are shared across
/// requests behind an `Arc`. Provider failures are returned as-is with
/// operation context; nothing is cached or retried.
#[async_trait]
pub trait CloudProvider: Send + Sync + 'static {
    /// All servers, in the order the provider lists them.
    async fn list_servers(&self) -> Result<Vec<Server>>;

    async fn get_server(&self, id: ServerId) -> Result<Server>;

    /// Request a new server. The returned actions are still in flight.
    async fn create_server(&self, spec: &CreateServerSpec) -> Result<ProvisionedServer>;

    async fn update_server(&self, id: ServerId, spec: &UpdateServerSpec) -> Result<Server>;

    /// Request deletion. The returned action is still in flight.
    async fn delete_server(&self, id: ServerId) -> Result<Action>;

    async fn get_metrics(&self, id: ServerId, query: &MetricsQuery) -> Result<ServerMetrics>;

    async fn get_action(&self, id: i64) -> Result<Action>;

    /// Provider identifier, used in logs.
    fn name(&self) -> &'static str;

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }

    /// Poll `action` until it reaches a terminal state or `timeout` elapses.
    ///
    /// A terminal `error` becomes [`Error::ActionFailed`]; running out of time
    /// becomes [`Error::Timeout`].
    async fn wait_for_action(&self, action: Action, timeout: Duration) -> Result<Action> {
        let policy = self.poll_policy();
        let deadline = Instant::now() + timeout;
        let timed_out = move |id: i64| Error::Timeout {
            op: format!("wait for action {id}"),
            after: timeout,
        };

        let mut delay = policy.initial;
        let mut current = action;

        loop {
            match current.status {
                ActionStatus::Success => return Ok(current),
                ActionStatus::Error => return Err(Error::action_failed(&current)),
                ActionStatus::Running => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(current.id));
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = policy.next(delay);

            let id = current.id;
            current = tokio::time::timeout_at(deadline, self.get_action(id))
                .await
                .map_err(|_| timed_out(id))??;

            tracing::debug!(
                provider = self.name(),
                action_id = id,
                progress = current.progress,
                status = ?current.status,
                "polled action"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_policy_backs_off_to_cap() {
        let policy = PollPolicy::default();
        let mut delay = policy.initial;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(delay.as_millis());
            delay = policy.next(delay);
        }
        assert_eq!(seen, vec![500, 1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn test_timeout_message_is_distinct_from_provider_errors() {
        let err = Error::Timeout {
            op: "get server 42".into(),
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "get server 42 timed out after 10s");
    }
}
