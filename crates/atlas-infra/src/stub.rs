//! In-memory [`CloudProvider`] that mimics provider-side action lifecycles.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{
    Action, ActionError, ActionStatus, CreateServerSpec, MetricSample, MetricsQuery,
    ProvisionedServer, Server, ServerId, ServerMetrics, ServerStatus, UpdateServerSpec,
};
use crate::{CloudProvider, Error, PollPolicy, Result};

#[derive(Debug, Clone, Copy)]
enum Effect {
    None,
    Create(ServerId),
    Delete(ServerId),
}

#[derive(Debug)]
struct PendingAction {
    action: Action,
    remaining: VecDeque<ActionStatus>,
    effect: Effect,
}

#[derive(Debug)]
struct StubState {
    servers: BTreeMap<ServerId, Server>,
    actions: HashMap<i64, PendingAction>,
    script: Vec<ActionStatus>,
    follow_ups: Vec<Vec<ActionStatus>>,
    next_server_id: i64,
    next_action_id: i64,
    unavailable: bool,
    calls: HashMap<&'static str, usize>,
    last_metrics_query: Option<MetricsQuery>,
}

/// Provider double. Servers are listed in id order.
///
/// Every action it hands out starts `running` and then reports the statuses
/// of the current action script, one per poll, repeating the last one once
/// the script is exhausted. Successful create actions bring the server to
/// `running`; successful delete actions remove it.
pub struct StubProvider {
    state: Mutex<StubState>,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                servers: BTreeMap::new(),
                actions: HashMap::new(),
                script: vec![ActionStatus::Success],
                follow_ups: Vec::new(),
                next_server_id: 1,
                next_action_id: 1,
                unavailable: false,
                calls: HashMap::new(),
                last_metrics_query: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing server.
    pub fn insert_server(
        &self,
        name: &str,
        server_type: &str,
        image: Option<&str>,
        status: ServerStatus,
    ) -> Server {
        let mut state = self.state();
        let server = state.new_server(name, server_type, image, status);
        state.servers.insert(server.id, server.clone());
        server
    }

    /// Statuses reported by subsequently created actions, one per poll.
    pub fn set_action_script(&self, script: Vec<ActionStatus>) {
        self.state().script = script;
    }

    /// Attach one `start_server` follow-up action per script to every
    /// subsequent create, each reporting its own statuses.
    pub fn set_follow_up_scripts(&self, scripts: Vec<Vec<ActionStatus>>) {
        self.state().follow_ups = scripts;
    }

    /// Make every call fail with a provider error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Number of times `op` (a `CloudProvider` method name) was invoked.
    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    pub fn server(&self, id: ServerId) -> Option<Server> {
        self.state().servers.get(&id).cloned()
    }

    pub fn last_metrics_query(&self) -> Option<MetricsQuery> {
        self.state().last_metrics_query.clone()
    }

    fn enter(&self, op: &'static str) -> Result<MutexGuard<'_, StubState>> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        if state.unavailable {
            return Err(Error::Provider {
                op: op.replace('_', " "),
                message: "stub provider unavailable".into(),
            });
        }
        Ok(state)
    }
}

impl StubState {
    fn new_server(
        &mut self,
        name: &str,
        server_type: &str,
        image: Option<&str>,
        status: ServerStatus,
    ) -> Server {
        let id = ServerId::new(self.next_server_id).expect("stub ids start at 1");
        self.next_server_id += 1;
        Server {
            id,
            name: name.to_string(),
            server_type: server_type.to_string(),
            image: image.map(str::to_string),
            labels: HashMap::new(),
            status,
            created: "2024-01-01T00:00:00+00:00".into(),
            public_ipv4: Some(format!("10.0.0.{}", id.get() % 250)),
        }
    }

    fn start_action(&mut self, command: &str, effect: Effect, script: Vec<ActionStatus>) -> Action {
        let action = Action {
            id: self.next_action_id,
            command: command.to_string(),
            status: ActionStatus::Running,
            progress: 0,
            error: None,
        };
        self.next_action_id += 1;
        self.actions.insert(
            action.id,
            PendingAction {
                action: action.clone(),
                remaining: script.into(),
                effect,
            },
        );
        action
    }

    fn advance(&mut self, id: i64) -> Option<Action> {
        let pending = self.actions.get_mut(&id)?;
        if !pending.action.status.is_terminal()
            && let Some(next) = pending.remaining.pop_front()
        {
            pending.action.status = next;
            match next {
                ActionStatus::Running => {
                    pending.action.progress = (pending.action.progress + 50).min(99);
                }
                ActionStatus::Success => pending.action.progress = 100,
                ActionStatus::Error => {
                    pending.action.error = Some(ActionError {
                        code: "action_failed".into(),
                        message: "stub action failed".into(),
                    });
                }
            }

            if next == ActionStatus::Success {
                let effect = pending.effect;
                self.apply(effect);
            }
        }
        self.actions.get(&id).map(|p| p.action.clone())
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Create(id) => {
                if let Some(server) = self.servers.get_mut(&id) {
                    server.status = ServerStatus::Running;
                }
            }
            Effect::Delete(id) => {
                self.servers.remove(&id);
            }
            Effect::None => {}
        }
    }
}

#[async_trait]
impl CloudProvider for StubProvider {
    async fn list_servers(&self) -> Result<Vec<Server>> {
        let state = self.enter("list_servers")?;
        Ok(state.servers.values().cloned().collect())
    }

    async fn get_server(&self, id: ServerId) -> Result<Server> {
        let server = {
            let state = self.enter("get_server")?;
            state.servers.get(&id).cloned().ok_or(Error::NotFound(id))
        };
        tokio::task::yield_now().await;
        server
    }

    async fn create_server(&self, spec: &CreateServerSpec) -> Result<ProvisionedServer> {
        let mut state = self.enter("create_server")?;
        let server = state.new_server(
            &spec.name,
            &spec.server_type,
            Some(&spec.image),
            ServerStatus::Initializing,
        );
        state.servers.insert(server.id, server.clone());
        let script = state.script.clone();
        let action = state.start_action("create_server", Effect::Create(server.id), script);
        let follow_ups = state.follow_ups.clone();
        let next_actions = follow_ups
            .into_iter()
            .map(|script| state.start_action("start_server", Effect::None, script))
            .collect();

        Ok(ProvisionedServer {
            server,
            action,
            next_actions,
        })
    }

    async fn update_server(&self, id: ServerId, spec: &UpdateServerSpec) -> Result<Server> {
        let mut state = self.enter("update_server")?;
        let server = state.servers.get_mut(&id).ok_or(Error::NotFound(id))?;
        if let Some(name) = &spec.name {
            server.name = name.clone();
        }
        if let Some(labels) = &spec.labels {
            server.labels = labels.clone();
        }
        Ok(server.clone())
    }

    async fn delete_server(&self, id: ServerId) -> Result<Action> {
        let mut state = self.enter("delete_server")?;
        let server = state.servers.get_mut(&id).ok_or(Error::NotFound(id))?;
        server.status = ServerStatus::Deleting;
        let script = state.script.clone();
        Ok(state.start_action("delete_server", Effect::Delete(id), script))
    }

    async fn get_metrics(&self, id: ServerId, query: &MetricsQuery) -> Result<ServerMetrics> {
        let mut state = self.enter("get_metrics")?;
        if !state.servers.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        state.last_metrics_query = Some(query.clone());

        let start = query.start.timestamp() as f64;
        let time_series = query
            .types
            .iter()
            .map(|t| {
                let samples = vec![MetricSample {
                    timestamp: start,
                    value: "0".into(),
                }];
                (t.as_str().to_string(), samples)
            })
            .collect();

        Ok(ServerMetrics {
            start: query.start.to_rfc3339(),
            end: query.end.to_rfc3339(),
            step: query.step as f64,
            time_series,
        })
    }

    async fn get_action(&self, id: i64) -> Result<Action> {
        let mut state = self.enter("get_action")?;
        state.advance(id).ok_or_else(|| Error::Provider {
            op: format!("get action {id}"),
            message: "action not found".into(),
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            multiplier: 2,
        }
    }
}
