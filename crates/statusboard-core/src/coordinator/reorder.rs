use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::reconcile::Ticket;
use super::{Coordinator, Rejection};
use crate::action::ActionKind;
use crate::adapter::RemoteOp;
use crate::batch::PendingBatch;
use crate::item::{ItemId, ListId, Service};

const REORDERABLE: [Service; 3] = [Service::Todoist, Service::Linear, Service::Goals];

impl Coordinator {
    /// Moves an item up (negative) or down (positive) by `offset` rows.
    /// Running off either end of the list is a quiet no-op, as is crossing
    /// a status boundary in a Linear list.
    #[instrument(skip(self), fields(item = %id))]
    pub fn move_item(&mut self, id: &ItemId, offset: isize) -> Result<(), Rejection> {
        let Some((list, current)) = self.board.locate(id) else {
            return Err(self.reject(Rejection::Missing));
        };
        let Some(target) = self.board.list(&list) else {
            return Err(self.reject(Rejection::UnknownList(list)));
        };

        let Some(new_position) = current
            .checked_add_signed(offset)
            .filter(|pos| *pos < target.items.len())
        else {
            debug!(current, offset, "move past list edge ignored");
            return Ok(());
        };

        if target.service == Service::Linear
            && target.items[current].state != target.items[new_position].state
        {
            debug!(current, new_position, "move across status group ignored");
            return Ok(());
        }

        self.record_move(&list, id, new_position)
    }

    /// Reorders locally at once and folds the move into the list's open
    /// debounce window.
    #[instrument(skip(self), fields(list = %list, item = %id))]
    pub fn record_move(
        &mut self,
        list: &ListId,
        id: &ItemId,
        new_position: usize,
    ) -> Result<(), Rejection> {
        let checked = match self.board.list(list) {
            None => Err(Rejection::UnknownList(list.clone())),
            Some(target) if !REORDERABLE.contains(&target.service) => {
                Err(Rejection::Unsupported("Can only reorder tasks, issues or goals"))
            }
            Some(target) => match target.position(id) {
                None => Err(Rejection::Missing),
                Some(_) if new_position >= target.items.len() => Err(Rejection::Illegal(
                    format!("Position {new_position} is out of range"),
                )),
                Some(current) => Ok((current, target.order(), target.generation)),
            },
        };
        let (current, order_before, generation) = self.confirmed(checked)?;
        if current == new_position {
            return Ok(());
        }

        self.board.move_item(list, id, new_position);
        let batch = self.batches.record(
            list,
            id,
            new_position,
            order_before,
            generation,
            Instant::now(),
        );
        debug!(moves = batch.moves.len(), deadline = ?batch.deadline, "move recorded");
        self.presenter.state_changed(list);
        Ok(())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.batches.next_deadline()
    }

    pub fn pending_reorder(&self, list: &ListId) -> Option<&PendingBatch> {
        self.batches.get(list)
    }

    /// Flushes every reorder window whose deadline has passed.
    pub fn flush_due(&mut self, now: Instant) {
        for batch in self.batches.take_due(now) {
            self.flush_batch(batch);
        }
    }

    /// One remote call carrying the list's complete final order, recorded as
    /// a single undoable reorder.
    #[instrument(skip(self, batch), fields(list = %batch.list, moves = batch.moves.len()))]
    fn flush_batch(&mut self, batch: PendingBatch) {
        let Some(target) = self.board.list(&batch.list) else {
            debug!("list went away before flush");
            return;
        };
        if target.generation != batch.generation {
            debug!("list refreshed before flush");
            return;
        }

        let after = target.order();
        if after == batch.started_from {
            debug!("moves cancelled out; nothing to send");
            return;
        }

        let service = target.service;
        let orders: Vec<(String, usize)> = target
            .items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| item.remote_id.clone().map(|id| (id, idx)))
            .collect();
        if orders.is_empty() {
            debug!("no confirmed items to order");
            return;
        }

        let action = self.record(
            ActionKind::Reorder {
                list: batch.list.clone(),
                before: batch.started_from,
                after,
            },
            batch.list.as_str(),
        );
        info!(seq = action.seq, "flushing reorder window");
        self.presenter.state_changed(&batch.list);
        self.launch(
            Ticket::Flush(action),
            service,
            RemoteOp::SetOrder {
                list: batch.list,
                orders,
            },
        );
    }
}
