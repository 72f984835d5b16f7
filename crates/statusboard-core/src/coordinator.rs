//! Optimistic mutation coordinator.
//!
//! Every user request goes through the same four steps:
//!
//! 1. validate against local state, rejecting with a notice;
//! 2. apply the change to the [`Board`] and tell the presenter;
//! 3. record an [`Action`] on the [`UndoStack`];
//! 4. spawn the remote call, whose [`Outcome`] comes back over a channel and
//!    is handed to [`Coordinator::reconcile`].
//!
//! Steps 1-3 happen inside one synchronous method call, so local state and
//! the undo history never disagree. Only step 4 suspends. Reconciliation of
//! a failure reverts the field only while it still holds the value the
//! failed action wrote, so a newer optimistic write is never clobbered.
//!
//! Deletes, read notifications, merges and overdue reschedules skip step 3:
//! they are never undoable.

mod github;
mod inverse;
mod overdue;
mod reconcile;
mod reorder;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::action::{Action, ActionKind};
use crate::adapter::{AdapterRegistry, RemoteOp};
use crate::batch::ReorderBatches;
use crate::board::Board;
use crate::config::Settings;
use crate::item::{Item, ItemId, ItemKind, ListId, Service, next_working_day};
use crate::notice::{Presenter, Severity};
use crate::undo::UndoStack;

pub use inverse::UndoOutcome;
pub use reconcile::Outcome;

use overdue::RescheduleRun;
use reconcile::Ticket;

/// Why a request was refused before anything changed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Item no longer present")]
    Missing,
    #[error("Unknown list {0}")]
    UnknownList(ListId),
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("{0}")]
    Illegal(String),
}

pub struct Coordinator {
    board: Board,
    undo: UndoStack,
    batches: ReorderBatches,
    adapters: AdapterRegistry,
    presenter: Box<dyn Presenter>,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcome_rx: mpsc::UnboundedReceiver<Outcome>,
    next_seq: u64,
    in_flight: usize,
    /// Creations undone before the service assigned an id; deleted remotely
    /// once the id arrives.
    orphaned: HashSet<ItemId>,
    /// Pull requests with a merge call in flight.
    merging: HashSet<ItemId>,
    reschedules: HashMap<u64, RescheduleRun>,
    next_run: u64,
}

impl Coordinator {
    pub fn new(adapters: AdapterRegistry, undo: UndoStack, presenter: Box<dyn Presenter>) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            board: Board::new(),
            undo,
            batches: ReorderBatches::default(),
            adapters,
            presenter,
            outcome_tx,
            outcome_rx,
            next_seq: 1,
            in_flight: 0,
            orphaned: HashSet::new(),
            merging: HashSet::new(),
            reschedules: HashMap::new(),
            next_run: 1,
        }
    }

    pub fn from_settings(
        adapters: AdapterRegistry,
        settings: &Settings,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        Self::new(
            adapters.with_timeout(settings.remote_timeout),
            UndoStack::new(settings.undo_capacity),
            presenter,
        )
        .with_debounce(settings.reorder_debounce)
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.batches = ReorderBatches::new(window);
        self
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Installs fresh remote contents for a list. An open reorder window on
    /// the list is dropped: the refresh supersedes it.
    #[instrument(skip(self, items), fields(list = %list, count = items.len()))]
    pub fn refresh_list(&mut self, list: ListId, service: Service, items: Vec<Item>) {
        self.batches.discard(&list);
        self.board.replace_list(list.clone(), service, items);
        self.presenter.state_changed(&list);
    }

    #[instrument(skip(self), fields(item = %id))]
    pub fn complete(&mut self, id: &ItemId) -> Result<u64, Rejection> {
        let checked = self.validate(id, |item| {
            require_service(
                item,
                &[Service::Todoist, Service::Linear, Service::Goals],
                "Can only complete tasks, issues or goals",
            )?;
            if item.completed {
                return Err(Rejection::Illegal(format!(
                    "{} is already completed",
                    item.short_title()
                )));
            }
            if item.abandoned {
                return Err(Rejection::Illegal(
                    "Cannot complete an abandoned goal".to_string(),
                ));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        if let Some(item) = self.board.item_mut(id) {
            item.completed = true;
        }
        Ok(self.commit(
            list,
            ActionKind::Complete { item: id.clone() },
            &title,
            id.service,
            RemoteOp::Complete { id: remote_id },
        ))
    }

    /// Pushes the due date to the next working day after `today`.
    #[instrument(skip(self), fields(item = %id))]
    pub fn defer(&mut self, id: &ItemId, today: NaiveDate) -> Result<u64, Rejection> {
        let new_due = next_working_day(today);
        let checked = self.validate(id, |item| {
            require_service(item, &[Service::Todoist], "Can only defer Todoist tasks")?;
            if item.completed {
                return Err(Rejection::Illegal("Cannot defer a completed task".to_string()));
            }
            if item.due == Some(new_due) {
                return Err(Rejection::Illegal(format!("Already due {new_due}")));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        let mut previous_due = None;
        if let Some(item) = self.board.item_mut(id) {
            previous_due = item.due.replace(new_due);
        }
        Ok(self.commit(
            list,
            ActionKind::Defer {
                item: id.clone(),
                previous_due,
                new_due,
            },
            &title,
            id.service,
            RemoteOp::SetDue {
                id: remote_id,
                due: Some(new_due),
            },
        ))
    }

    #[instrument(skip(self), fields(item = %id))]
    pub fn set_state(&mut self, id: &ItemId, state: &str) -> Result<u64, Rejection> {
        let state = state.trim().to_string();
        let checked = self.validate(id, |item| {
            require_service(item, &[Service::Linear], "Can only change state on Linear issues")?;
            if state.is_empty() {
                return Err(Rejection::Illegal("State cannot be empty".to_string()));
            }
            if item.state.as_deref() == Some(state.as_str()) {
                return Err(Rejection::Illegal(format!("Already {state}")));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        let mut previous = None;
        if let Some(item) = self.board.item_mut(id) {
            previous = item.state.replace(state.clone());
        }
        Ok(self.commit(
            list,
            ActionKind::SetState {
                item: id.clone(),
                previous,
                next: state.clone(),
            },
            &title,
            id.service,
            RemoteOp::SetState {
                id: remote_id,
                state: Some(state),
            },
        ))
    }

    /// `None` unassigns.
    #[instrument(skip(self), fields(item = %id))]
    pub fn assign(&mut self, id: &ItemId, assignee: Option<String>) -> Result<u64, Rejection> {
        let checked = self.validate(id, |item| {
            require_service(item, &[Service::Linear], "Can only assign Linear issues")?;
            if item.assignee == assignee {
                return Err(Rejection::Illegal(match &assignee {
                    Some(who) => format!("Already assigned to {who}"),
                    None => "Already unassigned".to_string(),
                }));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        let mut previous = None;
        if let Some(item) = self.board.item_mut(id) {
            previous = std::mem::replace(&mut item.assignee, assignee.clone());
        }
        Ok(self.commit(
            list,
            ActionKind::Assign {
                item: id.clone(),
                previous,
                next: assignee.clone(),
            },
            &title,
            id.service,
            RemoteOp::Assign {
                id: remote_id,
                assignee,
            },
        ))
    }

    #[instrument(skip(self), fields(item = %id))]
    pub fn remove_reviewer(&mut self, id: &ItemId, reviewer: &str) -> Result<u64, Rejection> {
        let checked = self.validate(id, |item| {
            require_kind(
                item,
                ItemKind::ReviewRequest,
                "Can only remove reviewers from review requests",
            )?;
            if !item.reviewers.contains(reviewer) {
                return Err(Rejection::Illegal(format!(
                    "{reviewer} is not reviewing {}",
                    item.short_title()
                )));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        if let Some(item) = self.board.item_mut(id) {
            item.reviewers.remove(reviewer);
        }
        Ok(self.commit(
            list,
            ActionKind::RemoveReviewer {
                item: id.clone(),
                reviewer: reviewer.to_string(),
            },
            &title,
            id.service,
            RemoteOp::RemoveReviewer {
                id: remote_id,
                reviewer: reviewer.to_string(),
            },
        ))
    }

    #[instrument(skip(self), fields(item = %id))]
    pub fn abandon(&mut self, id: &ItemId) -> Result<u64, Rejection> {
        let checked = self.validate(id, |item| {
            require_service(item, &[Service::Goals], "Can only abandon goals")?;
            if item.completed {
                return Err(Rejection::Illegal(
                    "Cannot abandon a completed goal".to_string(),
                ));
            }
            if item.abandoned {
                return Err(Rejection::Illegal("Goal is already abandoned".to_string()));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        if let Some(item) = self.board.item_mut(id) {
            item.abandoned = true;
        }
        Ok(self.commit(
            list,
            ActionKind::Abandon { item: id.clone() },
            &title,
            id.service,
            RemoteOp::Abandon { id: remote_id },
        ))
    }

    #[instrument(skip(self), fields(item = %id))]
    pub fn restore(&mut self, id: &ItemId) -> Result<u64, Rejection> {
        let checked = self.validate(id, |item| {
            require_service(item, &[Service::Goals], "Can only restore goals")?;
            if !item.abandoned {
                return Err(Rejection::Illegal("Goal is not abandoned".to_string()));
            }
            Ok(())
        });
        let (list, remote_id, title) = self.confirmed(checked)?;

        if let Some(item) = self.board.item_mut(id) {
            item.abandoned = false;
        }
        Ok(self.commit(
            list,
            ActionKind::Restore { item: id.clone() },
            &title,
            id.service,
            RemoteOp::Restore { id: remote_id },
        ))
    }

    /// Appends a provisional row to `list` and asks the service to create
    /// it. Returns the row's local id.
    #[instrument(skip(self, title), fields(list = %list))]
    pub fn create(&mut self, list: &ListId, title: &str) -> Result<ItemId, Rejection> {
        let title = title.trim();
        let checked = match self.board.list(list) {
            None => Err(Rejection::UnknownList(list.clone())),
            Some(target)
                if !matches!(
                    target.service,
                    Service::Todoist | Service::Linear | Service::Goals
                ) =>
            {
                Err(Rejection::Unsupported("Can only create tasks, issues or goals"))
            }
            Some(_) if title.is_empty() => {
                Err(Rejection::Illegal("Title cannot be empty".to_string()))
            }
            Some(target) => Ok(target.service),
        };
        let service = self.confirmed(checked)?;

        let item = Item::provisional(service, self.next_seq, title);
        let id = item.id.clone();
        let end = self.board.list(list).map(|l| l.items.len()).unwrap_or(0);
        self.board.insert_item(list, end, item);
        self.commit(
            list.clone(),
            ActionKind::Create {
                list: list.clone(),
                item: id.clone(),
            },
            title,
            service,
            RemoteOp::Create {
                list: list.clone(),
                title: title.to_string(),
            },
        );
        Ok(id)
    }

    /// Removes the row right away. Deletion is not undoable; a failed
    /// remote delete puts the row back where it was.
    #[instrument(skip(self), fields(item = %id))]
    pub fn delete(&mut self, id: &ItemId) -> Result<(), Rejection> {
        let checked = self.validate(id, |item| {
            require_service(
                item,
                &[Service::Todoist, Service::Goals],
                "Can only delete Todoist tasks or goals",
            )
        });
        let (_, remote_id, _) = self.confirmed(checked)?;

        let Some((list, index, item)) = self.board.remove_item(id) else {
            return Err(self.reject(Rejection::Missing));
        };
        self.presenter.state_changed(&list);
        info!(list = %list, index, "item deleted locally");
        self.launch(
            Ticket::Delete { list, index, item },
            id.service,
            RemoteOp::Delete { id: remote_id },
        );
        Ok(())
    }

    /// Step 1 for item-scoped requests: the item must exist and pass
    /// `check`. Yields the owning list, the remote id and the title.
    fn validate(
        &self,
        id: &ItemId,
        check: impl FnOnce(&Item) -> Result<(), Rejection>,
    ) -> Result<(ListId, String, String), Rejection> {
        let (list, _) = self.board.locate(id).ok_or(Rejection::Missing)?;
        let item = self.board.item(id).ok_or(Rejection::Missing)?;
        check(item)?;
        let remote_id = item.remote_id.clone().ok_or_else(|| {
            Rejection::Illegal(format!("{} is still being created", item.short_title()))
        })?;
        Ok((list, remote_id, item.title.clone()))
    }

    /// Surfaces a rejection to the user before handing it back.
    fn confirmed<T>(&mut self, checked: Result<T, Rejection>) -> Result<T, Rejection> {
        checked.map_err(|rejection| self.reject(rejection))
    }

    fn reject(&mut self, rejection: Rejection) -> Rejection {
        debug!(%rejection, "request rejected");
        self.presenter.notice(&rejection.to_string(), Severity::Warning);
        rejection
    }

    /// Steps 3 and 4, after the caller has applied step 2.
    fn commit(
        &mut self,
        list: ListId,
        kind: ActionKind,
        subject: &str,
        service: Service,
        op: RemoteOp,
    ) -> u64 {
        let action = self.record(kind, subject);
        let seq = action.seq;
        self.presenter.state_changed(&list);
        self.launch(Ticket::Forward(action), service, op);
        seq
    }

    fn record(&mut self, kind: ActionKind, subject: &str) -> Action {
        let action = Action::new(self.next_seq, kind, subject);
        self.next_seq += 1;
        info!(seq = action.seq, description = %action.description, "applied optimistically");
        self.undo.push(action.clone());
        action
    }
}

fn require_service(
    item: &Item,
    allowed: &[Service],
    message: &'static str,
) -> Result<(), Rejection> {
    if allowed.contains(&item.id.service) {
        Ok(())
    } else {
        warn!(service = %item.id.service, "operation not supported for service");
        Err(Rejection::Unsupported(message))
    }
}

fn require_kind(item: &Item, kind: ItemKind, message: &'static str) -> Result<(), Rejection> {
    if item.kind == kind {
        Ok(())
    } else {
        warn!(kind = ?item.kind, "operation not supported for this kind of row");
        Err(Rejection::Unsupported(message))
    }
}
