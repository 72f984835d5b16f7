use tracing::{debug, info, instrument, warn};

use super::reconcile::Ticket;
use super::{Coordinator, Rejection, require_kind};
use crate::adapter::{Attempt, RemoteOp};
use crate::item::{Item, ItemId, ItemKind, ListId};
use crate::notice::Severity;

impl Coordinator {
    /// Drops a notification from its list at once. Reading is not undoable;
    /// a failed call puts the row back where it was.
    #[instrument(skip(self), fields(item = %id))]
    pub fn mark_read(&mut self, id: &ItemId) -> Result<(), Rejection> {
        let checked = self.validate(id, |item| {
            require_kind(
                item,
                ItemKind::Notification,
                "Can only mark notifications as read",
            )
        });
        let (_, remote_id, _) = self.confirmed(checked)?;

        let Some((list, index, item)) = self.board.remove_item(id) else {
            return Err(self.reject(Rejection::Missing));
        };
        self.presenter.state_changed(&list);
        debug!(list = %list, index, "notification hidden");
        self.launch(
            Ticket::MarkRead { list, index, item },
            id.service,
            RemoteOp::MarkRead { id: remote_id },
        );
        Ok(())
    }

    /// Squash-merges an approved pull request. The row stays until the
    /// service confirms the merge.
    #[instrument(skip(self), fields(item = %id))]
    pub fn merge(&mut self, id: &ItemId) -> Result<(), Rejection> {
        let in_flight = self.merging.contains(id);
        let checked = self.validate(id, |item| {
            require_kind(item, ItemKind::PullRequest, "Can only merge pull requests")?;
            if !item.approved {
                return Err(Rejection::Illegal("Can only merge approved PRs".to_string()));
            }
            if in_flight {
                return Err(Rejection::Illegal(format!(
                    "{} is already being merged",
                    item.short_title()
                )));
            }
            Ok(())
        });
        let (list, remote_id, _) = self.confirmed(checked)?;

        self.merging.insert(id.clone());
        info!(number = %remote_id, "merging pull request");
        self.launch(
            Ticket::Merge {
                list,
                item: id.clone(),
                number: remote_id.clone(),
            },
            id.service,
            RemoteOp::Merge { id: remote_id },
        );
        Ok(())
    }

    pub(super) fn merged(&mut self, list: ListId, item: ItemId, number: String, result: Attempt) {
        self.merging.remove(&item);
        match result {
            Ok(_) => {
                if self.board.remove_item(&item).is_some() {
                    self.presenter.state_changed(&list);
                }
                self.presenter
                    .notice(&format!("Merged PR #{number}"), Severity::Info);
            }
            Err(failure) => {
                warn!(%item, %failure, "merge failed");
                self.presenter.notice("Failed to merge PR", Severity::Error);
            }
        }
    }

    /// Re-inserts a row removed ahead of a failed call, unless a refresh
    /// already brought it back.
    pub(super) fn put_back(&mut self, list: &ListId, index: usize, item: Item) {
        if self.board.contains(&item.id) {
            debug!(item = %item.id, "row already back");
            return;
        }
        if self.board.insert_item(list, index, item) {
            self.presenter.state_changed(list);
        }
    }
}
