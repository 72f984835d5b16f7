//! An in-memory stand-in for a remote service.
//!
//! Records every attempted operation, sleeps for a configurable latency on
//! the tokio clock, and fails on demand. Successful operations are applied
//! to simulated item lists, one per [`ListId`], which
//! [`MemoryAdapter::snapshot`] hands back as the service's "remote" contents. Clones share state, so a handle kept by
//! a test observes calls made through the registered copy.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::adapter::{Attempt, RemoteAck, RemoteAdapter, RemoteFailure, RemoteOp};
use crate::item::{Item, ListId, Service};

#[derive(Debug, Default)]
struct MemoryState {
    calls: Vec<RemoteOp>,
    failing_ops: HashSet<&'static str>,
    fail_all: bool,
    fail_next: usize,
    op_latency: HashMap<&'static str, Duration>,
    created: u64,
    lists: BTreeMap<ListId, Vec<Item>>,
}

impl MemoryState {
    fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.lists
            .values_mut()
            .flat_map(|items| items.iter_mut())
            .find(|item| item.remote_id.as_deref() == Some(id))
    }

    fn drop_item(&mut self, id: &str) {
        for items in self.lists.values_mut() {
            items.retain(|item| item.remote_id.as_deref() != Some(id));
        }
    }

    /// Mirrors a confirmed operation onto the simulated list. Unknown ids
    /// are ignored; the fake only fails when told to.
    fn apply(&mut self, service: Service, op: RemoteOp, created_id: Option<&str>) {
        match op {
            RemoteOp::Complete { id } => self.edit(&id, |item| item.completed = true),
            RemoteOp::Reopen { id } => self.edit(&id, |item| item.completed = false),
            RemoteOp::SetDue { id, due } => self.edit(&id, |item| item.due = due),
            RemoteOp::SetState { id, state } => self.edit(&id, |item| item.state = state),
            RemoteOp::Assign { id, assignee } => self.edit(&id, |item| item.assignee = assignee),
            RemoteOp::RemoveReviewer { id, reviewer } => self.edit(&id, |item| {
                item.reviewers.remove(&reviewer);
            }),
            RemoteOp::RequestReviewer { id, reviewer } => self.edit(&id, |item| {
                item.reviewers.insert(reviewer);
            }),
            RemoteOp::Abandon { id } => self.edit(&id, |item| item.abandoned = true),
            RemoteOp::Restore { id } => self.edit(&id, |item| item.abandoned = false),
            RemoteOp::Reschedule { id, due } => self.edit(&id, |item| item.due = Some(due)),
            RemoteOp::Delete { id } | RemoteOp::MarkRead { id } | RemoteOp::Merge { id } => {
                self.drop_item(&id);
            }
            RemoteOp::Create { list, title } => {
                if let Some(created_id) = created_id {
                    self.lists
                        .entry(list)
                        .or_default()
                        .push(Item::new(service, created_id, title));
                }
            }
            RemoteOp::SetOrder { list, orders } => {
                let rank: HashMap<&str, usize> = orders
                    .iter()
                    .map(|(id, position)| (id.as_str(), *position))
                    .collect();
                let Some(items) = self.lists.get_mut(&list) else {
                    debug!(%list, "reorder of unknown list ignored");
                    return;
                };
                items.sort_by_key(|item| {
                    item.remote_id
                        .as_deref()
                        .and_then(|id| rank.get(id).copied())
                        .unwrap_or(usize::MAX)
                });
            }
        }
    }

    fn edit(&mut self, id: &str, change: impl FnOnce(&mut Item)) {
        match self.item_mut(id) {
            Some(item) => change(item),
            None => debug!(id, "operation on unknown item ignored"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    service: Service,
    latency: Duration,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryAdapter {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            latency: Duration::ZERO,
            state: Arc::default(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seeds one simulated remote list.
    pub fn with_list(self, list: ListId, items: Vec<Item>) -> Self {
        self.state.lock().lists.insert(list, items);
        self
    }

    pub fn lists(&self) -> Vec<ListId> {
        self.state.lock().lists.keys().cloned().collect()
    }

    /// What a refresh of `list` from this service would return right now.
    pub fn snapshot(&self, list: &ListId) -> Vec<Item> {
        self.state
            .lock()
            .lists
            .get(list)
            .cloned()
            .unwrap_or_default()
    }

    /// Overrides the latency of one operation kind (see [`RemoteOp::name`]).
    pub fn set_op_latency(&self, op: &'static str, latency: Duration) {
        self.state.lock().op_latency.insert(op, latency);
    }

    pub fn fail_op(&self, op: &'static str) {
        self.state.lock().failing_ops.insert(op);
    }

    pub fn fail_all(&self, fail: bool) {
        self.state.lock().fail_all = fail;
    }

    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_ops.clear();
        state.fail_all = false;
        state.fail_next = 0;
    }

    pub fn calls(&self) -> Vec<RemoteOp> {
        self.state.lock().calls.clone()
    }

    pub fn calls_named(&self, op: &str) -> Vec<RemoteOp> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.name() == op)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RemoteAdapter for MemoryAdapter {
    fn service(&self) -> Service {
        self.service
    }

    #[instrument(skip(self, op), fields(service = %self.service, op = op.name()))]
    async fn attempt(&self, op: RemoteOp) -> Attempt {
        let name = op.name();
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(op.clone());
            state.op_latency.get(name).copied().unwrap_or(self.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        let forced = if state.fail_next > 0 {
            state.fail_next -= 1;
            true
        } else {
            false
        };
        if forced || state.fail_all || state.failing_ops.contains(name) {
            debug!("simulated failure");
            return Err(RemoteFailure::Rejected {
                service: self.service,
                reason: format!("simulated {name} failure"),
            });
        }

        let ack = match op {
            RemoteOp::Create { .. } => {
                state.created += 1;
                RemoteAck::created(format!("{}-{}", self.service, state.created))
            }
            _ => RemoteAck::default(),
        };
        state.apply(self.service, op, ack.created_id.as_deref());
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::MemoryAdapter;
    use crate::adapter::{RemoteAdapter, RemoteOp};
    use crate::item::{Item, ListId, Service};

    #[tokio::test(start_paused = true)]
    async fn records_calls_and_assigns_ids() {
        let adapter = MemoryAdapter::new(Service::Todoist).with_latency(Duration::from_millis(50));
        let observer = adapter.clone();

        let ack = adapter
            .attempt(RemoteOp::Create {
                list: ListId::new("todoist"),
                title: "new".to_string(),
            })
            .await
            .expect("create succeeds");

        assert_eq!(ack.created_id.as_deref(), Some("todoist-1"));
        assert_eq!(observer.calls_named("create").len(), 1);
    }

    #[tokio::test]
    async fn fail_next_is_consumed() {
        let adapter = MemoryAdapter::new(Service::Goals);
        adapter.fail_next(1);
        let op = RemoteOp::Complete { id: "g".to_string() };
        assert!(adapter.attempt(op.clone()).await.is_err());
        assert!(adapter.attempt(op).await.is_ok());
    }

    #[tokio::test]
    async fn confirmed_operations_reach_the_snapshot() {
        let list = ListId::new("todoist");
        let adapter = MemoryAdapter::new(Service::Todoist).with_list(
            list.clone(),
            vec![
                Item::new(Service::Todoist, "1", "one"),
                Item::new(Service::Todoist, "2", "two"),
            ],
        );

        adapter
            .attempt(RemoteOp::Complete { id: "1".to_string() })
            .await
            .expect("complete");
        adapter
            .attempt(RemoteOp::SetOrder {
                list: ListId::new("todoist"),
                orders: vec![("2".to_string(), 0), ("1".to_string(), 1)],
            })
            .await
            .expect("reorder");
        adapter.fail_next(1);
        let _ = adapter.attempt(RemoteOp::Delete { id: "2".to_string() }).await;

        let snapshot = adapter.snapshot(&list);
        let keys: Vec<_> = snapshot.iter().map(|item| item.id.key.as_str()).collect();
        assert_eq!(keys, vec!["2", "1"]);
        assert!(snapshot[1].completed);
    }

    #[tokio::test]
    async fn github_lists_share_one_adapter() {
        let prs = ListId::new("prs");
        let inbox = ListId::new("notifications");
        let adapter = MemoryAdapter::new(Service::Github)
            .with_list(prs.clone(), vec![Item::new(Service::Github, "430", "Add cache")])
            .with_list(
                inbox.clone(),
                vec![Item::new(Service::Github, "thread-1", "Build failed")],
            );

        adapter
            .attempt(RemoteOp::MarkRead {
                id: "thread-1".to_string(),
            })
            .await
            .expect("mark read");

        assert_eq!(adapter.lists(), vec![inbox.clone(), prs.clone()]);
        assert!(adapter.snapshot(&inbox).is_empty());
        assert_eq!(adapter.snapshot(&prs).len(), 1);
    }
}
