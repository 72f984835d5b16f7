//! The uniform boundary to backing services.
//!
//! Each service gets one [`RemoteAdapter`]. An adapter never panics and never
//! returns an error the coordinator has to interpret: every failure mode,
//! including a timeout, comes back as a [`RemoteFailure`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::item::{ListId, Service};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single remote mutation. Ids are the service's own ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteOp {
    Complete { id: String },
    Reopen { id: String },
    SetDue { id: String, due: Option<NaiveDate> },
    SetOrder { list: ListId, orders: Vec<(String, usize)> },
    SetState { id: String, state: Option<String> },
    Assign { id: String, assignee: Option<String> },
    RemoveReviewer { id: String, reviewer: String },
    RequestReviewer { id: String, reviewer: String },
    Create { list: ListId, title: String },
    Delete { id: String },
    Abandon { id: String },
    Restore { id: String },
    MarkRead { id: String },
    Merge { id: String },
    Reschedule { id: String, due: NaiveDate },
}

impl RemoteOp {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteOp::Complete { .. } => "complete",
            RemoteOp::Reopen { .. } => "reopen",
            RemoteOp::SetDue { .. } => "set_due",
            RemoteOp::SetOrder { .. } => "set_order",
            RemoteOp::SetState { .. } => "set_state",
            RemoteOp::Assign { .. } => "assign",
            RemoteOp::RemoveReviewer { .. } => "remove_reviewer",
            RemoteOp::RequestReviewer { .. } => "request_reviewer",
            RemoteOp::Create { .. } => "create",
            RemoteOp::Delete { .. } => "delete",
            RemoteOp::Abandon { .. } => "abandon",
            RemoteOp::Restore { .. } => "restore",
            RemoteOp::MarkRead { .. } => "mark_read",
            RemoteOp::Merge { .. } => "merge",
            RemoteOp::Reschedule { .. } => "reschedule",
        }
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Authoritative fields a service hands back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAck {
    pub created_id: Option<String>,
}

impl RemoteAck {
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            created_id: Some(id.into()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteFailure {
    #[error("{service} timed out after {after:?}")]
    Timeout { service: Service, after: Duration },
    #[error("{service} does not support {op}")]
    Unsupported { service: Service, op: &'static str },
    #[error("{service} rejected the request: {reason}")]
    Rejected { service: Service, reason: String },
    #[error("no adapter registered for {0}")]
    NoAdapter(Service),
}

pub type Attempt = Result<RemoteAck, RemoteFailure>;

#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    fn service(&self) -> Service;

    async fn attempt(&self, op: RemoteOp) -> Attempt;
}

/// Bounds any adapter with a deadline; an elapsed call is an ordinary
/// failure.
pub struct TimeoutAdapter<A> {
    inner: A,
    limit: Duration,
}

impl<A> TimeoutAdapter<A> {
    pub fn new(inner: A, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<A> RemoteAdapter for TimeoutAdapter<A>
where
    A: RemoteAdapter,
{
    fn service(&self) -> Service {
        self.inner.service()
    }

    async fn attempt(&self, op: RemoteOp) -> Attempt {
        let service = self.inner.service();
        let name = op.name();
        match tokio::time::timeout(self.limit, self.inner.attempt(op)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%service, op = name, limit = ?self.limit, "remote call timed out");
                Err(RemoteFailure::Timeout {
                    service,
                    after: self.limit,
                })
            }
        }
    }
}

/// One adapter per service.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Service, Arc<dyn RemoteAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn RemoteAdapter>) {
        let service = adapter.service();
        debug!(%service, "registered adapter");
        self.adapters.insert(service, adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn RemoteAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Wraps every registered adapter in a [`TimeoutAdapter`].
    pub fn with_timeout(self, limit: Duration) -> Self {
        let adapters = self
            .adapters
            .into_iter()
            .map(|(service, adapter)| {
                let bounded: Arc<dyn RemoteAdapter> =
                    Arc::new(TimeoutAdapter::new(SharedAdapter(adapter), limit));
                (service, bounded)
            })
            .collect();
        Self { adapters }
    }

    pub fn get(&self, service: Service) -> Option<Arc<dyn RemoteAdapter>> {
        self.adapters.get(&service).cloned()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.adapters.keys()).finish()
    }
}

struct SharedAdapter(Arc<dyn RemoteAdapter>);

#[async_trait]
impl RemoteAdapter for SharedAdapter {
    fn service(&self) -> Service {
        self.0.service()
    }

    async fn attempt(&self, op: RemoteOp) -> Attempt {
        self.0.attempt(op).await
    }
}

/// Runs `op` against the registered adapter for `service`.
pub async fn dispatch(
    adapter: Option<Arc<dyn RemoteAdapter>>,
    service: Service,
    op: RemoteOp,
) -> Attempt {
    match adapter {
        Some(adapter) => adapter.attempt(op).await,
        None => Err(RemoteFailure::NoAdapter(service)),
    }
}
