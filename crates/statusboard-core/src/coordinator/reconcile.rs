use chrono::NaiveDate;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use super::Coordinator;
use super::inverse::{Inverse, Mode};
use crate::action::{Action, ActionKind};
use crate::adapter::{self, Attempt, RemoteAck, RemoteFailure, RemoteOp};
use crate::item::{Item, ItemId, ListId, Service};
use crate::notice::Severity;

/// What a remote call was launched for, and so how its result is folded
/// back into local state.
#[derive(Debug, Clone)]
pub(super) enum Ticket {
    /// A user mutation that was recorded on the undo stack.
    Forward(Action),
    /// The remote half of an undo.
    Inverse(Action),
    /// A flushed reorder window.
    Flush(Action),
    /// A deletion; keeps the removed row so it can be put back.
    Delete {
        list: ListId,
        index: usize,
        item: Item,
    },
    /// Remote delete of a row whose creation was undone before the service
    /// returned its id.
    OrphanCleanup(Action),
    MarkRead {
        list: ListId,
        index: usize,
        item: Item,
    },
    /// `number` is the pull request's remote id, used in notices.
    Merge {
        list: ListId,
        item: ItemId,
        number: String,
    },
    /// One task of a bulk overdue reschedule.
    Reschedule {
        run: u64,
        item: ItemId,
        previous_due: Option<NaiveDate>,
        due: NaiveDate,
    },
}

impl Ticket {
    fn label(&self) -> &'static str {
        match self {
            Ticket::Forward(_) => "forward",
            Ticket::Inverse(_) => "inverse",
            Ticket::Flush(_) => "flush",
            Ticket::Delete { .. } => "delete",
            Ticket::OrphanCleanup(_) => "orphan_cleanup",
            Ticket::MarkRead { .. } => "mark_read",
            Ticket::Merge { .. } => "merge",
            Ticket::Reschedule { .. } => "reschedule",
        }
    }
}

/// The result of one remote call, waiting to be reconciled.
#[derive(Debug)]
pub struct Outcome {
    pub(super) ticket: Ticket,
    pub(super) result: Attempt,
}

impl Outcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

impl Coordinator {
    /// Fires `op` at the service's adapter on a detached task. The caller
    /// never waits; the result arrives later on the outcome channel.
    pub(super) fn launch(&mut self, ticket: Ticket, service: Service, op: RemoteOp) {
        self.in_flight += 1;
        debug!(
            %service,
            op = op.name(),
            ticket = ticket.label(),
            in_flight = self.in_flight,
            "remote call launched"
        );
        let adapter = self.adapters.get(service);
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = adapter::dispatch(adapter, service, op).await;
            // The coordinator may already be gone during shutdown.
            let _ = tx.send(Outcome { ticket, result });
        });
    }

    /// Waits for the next remote result. Never resolves while nothing is in
    /// flight, so it is safe to poll from `select!`.
    pub async fn recv_outcome(&mut self) -> Option<Outcome> {
        if self.in_flight == 0 {
            return std::future::pending().await;
        }
        self.outcome_rx.recv().await
    }

    /// Folds one remote result back into local state.
    #[instrument(
        skip(self, outcome),
        fields(ticket = outcome.ticket.label(), ok = outcome.succeeded())
    )]
    pub fn reconcile(&mut self, outcome: Outcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Outcome { ticket, result } = outcome;

        match (ticket, result) {
            (Ticket::Forward(action), Ok(ack)) => self.confirm(action, ack),
            (Ticket::Forward(action), Err(failure)) => self.roll_back(action, failure),
            (Ticket::Flush(action), Ok(_)) => {
                debug!(seq = action.seq, "reorder confirmed");
            }
            (Ticket::Flush(action), Err(failure)) => self.roll_back_flush(action, failure),
            (Ticket::Inverse(action), Ok(_)) => {
                debug!(seq = action.seq, "undo confirmed");
            }
            (Ticket::Inverse(action), Err(failure)) => {
                // Local state stays undone; re-applying would oscillate.
                warn!(seq = action.seq, %failure, "remote undo failed");
                self.presenter.notice(
                    &format!("Failed to undo: {}", action.description),
                    Severity::Error,
                );
            }
            (Ticket::Delete { item, .. }, Ok(_)) => {
                debug!(item = %item.id, "delete confirmed");
            }
            (Ticket::Delete { list, index, item }, Err(failure)) => {
                warn!(item = %item.id, %failure, "remote delete failed");
                let title = item.short_title();
                self.put_back(&list, index, item);
                self.presenter
                    .notice(&format!("Failed to delete {title}"), Severity::Error);
            }
            (Ticket::OrphanCleanup(action), Ok(_)) => {
                debug!(seq = action.seq, "orphaned creation removed remotely");
            }
            (Ticket::OrphanCleanup(action), Err(failure)) => {
                warn!(seq = action.seq, %failure, "orphaned creation could not be removed");
                self.presenter.notice(
                    &format!("Failed to undo: {}", action.description),
                    Severity::Error,
                );
            }
            (Ticket::MarkRead { item, .. }, Ok(_)) => {
                debug!(item = %item.id, "notification read");
                self.presenter
                    .notice("Notification marked as read", Severity::Info);
            }
            (Ticket::MarkRead { list, index, item }, Err(failure)) => {
                warn!(item = %item.id, %failure, "marking notification read failed");
                self.put_back(&list, index, item);
                self.presenter
                    .notice("Failed to mark notification as read", Severity::Error);
            }
            (Ticket::Merge { list, item, number }, result) => {
                self.merged(list, item, number, result);
            }
            (
                Ticket::Reschedule {
                    run,
                    item,
                    previous_due,
                    due,
                },
                result,
            ) => self.rescheduled(run, item, previous_due, due, &result),
        }
    }

    fn confirm(&mut self, action: Action, ack: RemoteAck) {
        debug!(seq = action.seq, "remote confirmed");
        let (ActionKind::Create { item, .. }, Some(remote_id)) = (&action.kind, ack.created_id)
        else {
            return;
        };
        let item = item.clone();

        if self.orphaned.remove(&item) {
            info!(%item, %remote_id, "creation was undone early; deleting remotely");
            self.launch(
                Ticket::OrphanCleanup(action),
                item.service,
                RemoteOp::Delete { id: remote_id },
            );
            return;
        }

        if let Some(created) = self.board.item_mut(&item) {
            debug!(%item, %remote_id, "remote id assigned");
            created.remote_id = Some(remote_id);
        }
    }

    /// Reverts exactly the delta `action` owns and withdraws it from the
    /// undo history.
    fn roll_back(&mut self, action: Action, failure: RemoteFailure) {
        warn!(
            seq = action.seq,
            description = %action.description,
            %failure,
            "remote call failed; rolling back"
        );
        self.undo.remove(action.seq);
        if let ActionKind::Create { item, .. } = &action.kind {
            self.orphaned.remove(item);
        }

        match self.apply_inverse(&action.kind, Mode::Rollback) {
            Inverse::Applied { list, .. } => self.presenter.state_changed(&list),
            Inverse::Superseded => debug!(seq = action.seq, "newer write owns the field"),
            Inverse::Stale => debug!(seq = action.seq, "rollback target gone"),
        }
        self.presenter.notice(
            &format!("Failed to {}", action.description),
            Severity::Error,
        );
    }

    /// A failed flush puts the list back to where the window started. The
    /// flushed reorder is replaced by its mirror image so that a single undo
    /// re-applies the gesture. A window opened after the flush is dropped
    /// along with the order it started from.
    fn roll_back_flush(&mut self, action: Action, failure: RemoteFailure) {
        warn!(seq = action.seq, %failure, "reorder flush failed; restoring order");
        let ActionKind::Reorder {
            list,
            before,
            after,
        } = &action.kind
        else {
            return;
        };
        self.undo.remove(action.seq);

        if self.board.order(list).as_ref() == Some(after) {
            self.batches.discard(list);
            self.board.apply_order(list, before);
            self.record(
                ActionKind::Reorder {
                    list: list.clone(),
                    before: after.clone(),
                    after: before.clone(),
                },
                list.as_str(),
            );
            self.presenter.state_changed(list);
        } else {
            debug!(%list, "list changed since the flush; order left alone");
        }
        self.presenter.notice(
            &format!("Failed to {}", action.description),
            Severity::Error,
        );
    }

    /// Drives remote results and reorder deadlines until nothing is left in
    /// flight or pending.
    pub async fn settle(&mut self) {
        loop {
            let deadline = self.next_deadline();
            if self.in_flight == 0 && deadline.is_none() {
                return;
            }
            tokio::select! {
                Some(outcome) = self.outcome_rx.recv(), if self.in_flight > 0 => {
                    self.reconcile(outcome);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush_due(Instant::now());
                }
                else => return,
            }
        }
    }

    /// Whether `id` belongs to a creation that was undone before it was
    /// confirmed.
    pub fn is_orphaned(&self, id: &ItemId) -> bool {
        self.orphaned.contains(id)
    }
}
