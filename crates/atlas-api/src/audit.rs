use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    GetMetrics,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::GetMetrics => "get_metrics",
        })
    }
}

/// A completed operation. Written once, never read back.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub resource: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, resource: &impl Serialize) -> Self {
        Self {
            action,
            resource: serde_json::to_value(resource).unwrap_or(serde_json::Value::Null),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn write(&self, entry: &AuditEntry) -> Result<(), BoxError>;
}

/// Emits each entry as a structured event on the `audit` target.
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), BoxError> {
        tracing::info!(
            target: "audit",
            action = %entry.action,
            resource = %entry.resource,
            timestamp = %entry.timestamp.to_rfc3339(),
            "operation recorded"
        );
        Ok(())
    }
}

/// Handle for handing entries to the background audit worker.
///
/// Recording never waits: when the queue is full or the worker is gone the
/// entry is dropped.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditLogger {
    /// Start the single consumer task and return a handle to feed it.
    ///
    /// The task exits once every `AuditLogger` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(capacity: usize, sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, sink));
        (Self { tx }, worker)
    }

    pub fn record(&self, entry: AuditEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(action = %entry.action, "audit queue full, dropping entry");
            }
            Err(TrySendError::Closed(entry)) => {
                tracing::warn!(action = %entry.action, "audit worker stopped, dropping entry");
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<AuditEntry>, sink: Arc<dyn AuditSink>) {
    while let Some(entry) = rx.recv().await {
        if let Err(e) = sink.write(&entry).await {
            tracing::error!(action = %entry.action, error = %e, "failed to write audit entry");
        }
    }
    tracing::debug!("audit worker stopped");
}
