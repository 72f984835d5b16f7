//! Trailing-edge debounce of reorder gestures.
//!
//! Each reorderable list has at most one open window. Every move inside the
//! window pushes its deadline out again; when a deadline passes, the whole
//! window is handed back to the coordinator as a single [`PendingBatch`].
//! Deadlines are polled from the event loop, there is no timer thread.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::item::{ItemId, ListId};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub list: ListId,
    /// List order when the window opened.
    pub started_from: Vec<ItemId>,
    /// Newest requested position per moved item.
    pub moves: BTreeMap<ItemId, usize>,
    /// List generation the window belongs to.
    pub generation: u64,
    pub deadline: Instant,
}

#[derive(Debug)]
pub struct ReorderBatches {
    window: Duration,
    pending: BTreeMap<ListId, PendingBatch>,
}

impl Default for ReorderBatches {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl ReorderBatches {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
        }
    }

    /// Notes a move and restarts the list's window. `order_before` is only
    /// used when this move opens a new window.
    pub fn record(
        &mut self,
        list: &ListId,
        item: &ItemId,
        new_position: usize,
        order_before: Vec<ItemId>,
        generation: u64,
        now: Instant,
    ) -> &PendingBatch {
        let deadline = now + self.window;

        let stale = self
            .pending
            .get(list)
            .is_some_and(|batch| batch.generation != generation);
        if stale {
            debug!(%list, "dropping window opened against an older list generation");
            self.pending.remove(list);
        }

        let batch = self.pending.entry(list.clone()).or_insert_with(|| {
            debug!(%list, "opening reorder window");
            PendingBatch {
                list: list.clone(),
                started_from: order_before,
                moves: BTreeMap::new(),
                generation,
                deadline,
            }
        });
        batch.moves.insert(item.clone(), new_position);
        batch.deadline = deadline;
        trace!(%list, item = %item, new_position, moves = batch.moves.len(), "window extended");
        batch
    }

    /// Removes and returns every window whose deadline is at or before
    /// `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingBatch> {
        let due: Vec<ListId> = self
            .pending
            .iter()
            .filter(|(_, batch)| batch.deadline <= now)
            .map(|(list, _)| list.clone())
            .collect();
        due.iter()
            .filter_map(|list| self.pending.remove(list))
            .collect()
    }

    /// Drops a window without flushing it.
    pub fn discard(&mut self, list: &ListId) -> Option<PendingBatch> {
        let dropped = self.pending.remove(list);
        if dropped.is_some() {
            debug!(%list, "reorder window discarded");
        }
        dropped
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|batch| batch.deadline).min()
    }

    pub fn get(&self, list: &ListId) -> Option<&PendingBatch> {
        self.pending.get(list)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::ReorderBatches;
    use crate::item::{ItemId, ListId, Service};

    fn id(key: &str) -> ItemId {
        ItemId::new(Service::Todoist, key)
    }

    #[test]
    fn moves_inside_the_window_extend_the_deadline() {
        let list = ListId::new("todoist");
        let mut batches = ReorderBatches::new(Duration::from_millis(500));
        let t0 = Instant::now();

        batches.record(&list, &id("y"), 3, vec![id("a"), id("y")], 0, t0);
        let t1 = t0 + Duration::from_millis(200);
        batches.record(&list, &id("y"), 5, vec![id("ignored")], 0, t1);

        assert!(batches.take_due(t0 + Duration::from_millis(600)).is_empty());
        let due = batches.take_due(t1 + Duration::from_millis(500));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].moves.get(&id("y")), Some(&5));
        assert_eq!(due[0].started_from, vec![id("a"), id("y")]);
        assert!(batches.is_empty());
    }

    #[test]
    fn a_new_generation_restarts_the_window() {
        let list = ListId::new("goals");
        let mut batches = ReorderBatches::default();
        let now = Instant::now();
        batches.record(&list, &id("a"), 1, vec![id("a"), id("b")], 0, now);
        let batch = batches.record(&list, &id("b"), 0, vec![id("b"), id("a")], 1, now);
        assert_eq!(batch.generation, 1);
        assert_eq!(batch.started_from, vec![id("b"), id("a")]);
        assert_eq!(batch.moves.len(), 1);
    }

    #[test]
    fn discard_and_deadlines() {
        let a = ListId::new("a");
        let b = ListId::new("b");
        let mut batches = ReorderBatches::new(Duration::from_millis(100));
        let now = Instant::now();
        batches.record(&a, &id("x"), 0, vec![], 0, now);
        batches.record(&b, &id("x"), 0, vec![], 0, now + Duration::from_millis(50));

        assert_eq!(batches.next_deadline(), Some(now + Duration::from_millis(100)));
        assert!(batches.discard(&a).is_some());
        assert!(batches.discard(&a).is_none());
        assert_eq!(batches.next_deadline(), Some(now + Duration::from_millis(150)));
    }
}
