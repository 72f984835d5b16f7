use tracing::{debug, info, instrument};

use super::Coordinator;
use super::reconcile::Ticket;
use crate::action::{Action, ActionKind};
use crate::adapter::RemoteOp;
use crate::item::{ListId, Service};
use crate::notice::Severity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The stack was empty.
    Empty,
    /// The action's target is gone from local state.
    Stale(Action),
    Undone(Action),
}

/// How an inverse is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// User-requested undo; always applied.
    Undo,
    /// Failure reconciliation; applied only while the field still holds the
    /// value the action wrote.
    Rollback,
}

#[derive(Debug)]
pub(super) enum Inverse {
    Applied {
        list: ListId,
        service: Service,
        remote: Option<RemoteOp>,
    },
    /// Target no longer exists locally.
    Stale,
    /// A newer write owns the field now.
    Superseded,
}

impl Coordinator {
    /// Reverts the most recent action locally and asks the service to do
    /// the same. Undo is not itself recorded.
    #[instrument(skip(self))]
    pub fn undo(&mut self) -> UndoOutcome {
        let Some(action) = self.undo.pop() else {
            self.presenter.notice("Nothing to undo", Severity::Warning);
            return UndoOutcome::Empty;
        };

        match self.apply_inverse(&action.kind, Mode::Undo) {
            Inverse::Applied {
                list,
                service,
                remote,
            } => {
                info!(seq = action.seq, description = %action.description, "undone locally");
                self.presenter.state_changed(&list);
                self.presenter
                    .notice(&format!("Undid: {}", action.description), Severity::Info);
                if let Some(op) = remote {
                    self.launch(Ticket::Inverse(action.clone()), service, op);
                }
                UndoOutcome::Undone(action)
            }
            Inverse::Stale | Inverse::Superseded => {
                debug!(seq = action.seq, "undo target missing");
                self.presenter
                    .notice("Item no longer present", Severity::Warning);
                UndoOutcome::Stale(action)
            }
        }
    }

    /// Puts local state back to what `kind` replaced and returns the remote
    /// call that does the same upstream.
    pub(super) fn apply_inverse(&mut self, kind: &ActionKind, mode: Mode) -> Inverse {
        let guarded = mode == Mode::Rollback;

        if let ActionKind::Reorder {
            list,
            before,
            after,
        } = kind
        {
            let Some(current) = self.board.order(list) else {
                return Inverse::Stale;
            };
            if guarded && current != *after {
                return Inverse::Superseded;
            }
            if mode == Mode::Undo {
                self.batches.discard(list);
            }
            self.board.apply_order(list, before);
            let Some(target) = self.board.list(list) else {
                return Inverse::Stale;
            };
            let orders = target
                .items
                .iter()
                .enumerate()
                .filter_map(|(idx, item)| item.remote_id.clone().map(|id| (id, idx)))
                .collect();
            return Inverse::Applied {
                list: list.clone(),
                service: target.service,
                remote: Some(RemoteOp::SetOrder {
                    list: list.clone(),
                    orders,
                }),
            };
        }

        if let ActionKind::Create { list, item } = kind {
            let Some((owner, _, removed)) = self.board.remove_item(item) else {
                return Inverse::Stale;
            };
            debug_assert_eq!(&owner, list);
            let remote = match (mode, removed.remote_id) {
                (Mode::Undo, Some(id)) => Some(RemoteOp::Delete { id }),
                (Mode::Undo, None) => {
                    self.orphaned.insert(item.clone());
                    None
                }
                (Mode::Rollback, _) => None,
            };
            return Inverse::Applied {
                list: owner,
                service: item.service,
                remote,
            };
        }

        let Some(id) = kind.item() else {
            return Inverse::Stale;
        };
        let Some((list, _)) = self.board.locate(id) else {
            return Inverse::Stale;
        };
        let Some(item) = self.board.item_mut(id) else {
            return Inverse::Stale;
        };
        let remote_id = item.remote_id.clone();

        let op = match kind {
            ActionKind::Reorder { .. } | ActionKind::Create { .. } => return Inverse::Stale,
            ActionKind::Complete { .. } => {
                if guarded && !item.completed {
                    return Inverse::Superseded;
                }
                item.completed = false;
                remote_id.map(|id| RemoteOp::Reopen { id })
            }
            ActionKind::Defer {
                previous_due,
                new_due,
                ..
            } => {
                if guarded && item.due != Some(*new_due) {
                    return Inverse::Superseded;
                }
                item.due = *previous_due;
                remote_id.map(|id| RemoteOp::SetDue {
                    id,
                    due: *previous_due,
                })
            }
            ActionKind::SetState { previous, next, .. } => {
                if guarded && item.state.as_deref() != Some(next.as_str()) {
                    return Inverse::Superseded;
                }
                item.state = previous.clone();
                remote_id.map(|id| RemoteOp::SetState {
                    id,
                    state: previous.clone(),
                })
            }
            ActionKind::Assign { previous, next, .. } => {
                if guarded && item.assignee != *next {
                    return Inverse::Superseded;
                }
                item.assignee = previous.clone();
                remote_id.map(|id| RemoteOp::Assign {
                    id,
                    assignee: previous.clone(),
                })
            }
            ActionKind::RemoveReviewer { reviewer, .. } => {
                if guarded && item.reviewers.contains(reviewer) {
                    return Inverse::Superseded;
                }
                item.reviewers.insert(reviewer.clone());
                remote_id.map(|id| RemoteOp::RequestReviewer {
                    id,
                    reviewer: reviewer.clone(),
                })
            }
            ActionKind::Abandon { .. } => {
                if guarded && !item.abandoned {
                    return Inverse::Superseded;
                }
                item.abandoned = false;
                remote_id.map(|id| RemoteOp::Restore { id })
            }
            ActionKind::Restore { .. } => {
                if guarded && item.abandoned {
                    return Inverse::Superseded;
                }
                item.abandoned = true;
                remote_id.map(|id| RemoteOp::Abandon { id })
            }
        };

        Inverse::Applied {
            list,
            service: id.service,
            remote: op,
        }
    }
}
