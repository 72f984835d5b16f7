use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use super::reconcile::Ticket;
use super::{Coordinator, Rejection};
use crate::adapter::{Attempt, RemoteOp};
use crate::item::{ItemId, ListId, Service};
use crate::notice::Severity;

/// Tally of one bulk reschedule. Reported once every call has landed.
#[derive(Debug)]
pub(super) struct RescheduleRun {
    total: usize,
    succeeded: usize,
    failed: usize,
}

impl Coordinator {
    /// Moves every open task in `list` that was due before `today` to
    /// `today`, one call per task. Returns how many calls went out.
    #[instrument(skip(self), fields(list = %list))]
    pub fn reschedule_overdue(
        &mut self,
        list: &ListId,
        today: NaiveDate,
    ) -> Result<usize, Rejection> {
        let checked = match self.board.list(list) {
            None => Err(Rejection::UnknownList(list.clone())),
            Some(target) if target.service != Service::Todoist => {
                Err(Rejection::Unsupported("Can only reschedule Todoist tasks"))
            }
            Some(target) => Ok(target
                .items
                .iter()
                .filter(|item| !item.completed && item.due.is_some_and(|due| due < today))
                .filter_map(|item| {
                    item.remote_id
                        .clone()
                        .map(|remote_id| (item.id.clone(), remote_id))
                })
                .collect::<Vec<_>>()),
        };
        let overdue = self.confirmed(checked)?;
        if overdue.is_empty() {
            self.presenter
                .notice("No overdue tasks to reschedule", Severity::Info);
            return Ok(0);
        }

        let run = self.next_run;
        self.next_run += 1;
        self.reschedules.insert(
            run,
            RescheduleRun {
                total: overdue.len(),
                succeeded: 0,
                failed: 0,
            },
        );
        info!(run, count = overdue.len(), %today, "rescheduling overdue tasks");

        for (id, remote_id) in &overdue {
            let mut previous_due = None;
            if let Some(item) = self.board.item_mut(id) {
                previous_due = item.due.replace(today);
            }
            self.launch(
                Ticket::Reschedule {
                    run,
                    item: id.clone(),
                    previous_due,
                    due: today,
                },
                id.service,
                RemoteOp::Reschedule {
                    id: remote_id.clone(),
                    due: today,
                },
            );
        }
        self.presenter.state_changed(list);
        Ok(overdue.len())
    }

    /// Folds one task's result into its run. A failed task gets its old due
    /// date back unless something newer was written meanwhile.
    pub(super) fn rescheduled(
        &mut self,
        run: u64,
        item: ItemId,
        previous_due: Option<NaiveDate>,
        due: NaiveDate,
        result: &Attempt,
    ) {
        if let Err(failure) = result {
            warn!(%item, %failure, "reschedule failed");
            if let Some((list, _)) = self.board.locate(&item)
                && let Some(row) = self.board.item_mut(&item)
                && row.due == Some(due)
            {
                row.due = previous_due;
                self.presenter.state_changed(&list);
            }
        }

        let Some(progress) = self.reschedules.get_mut(&run) else {
            return;
        };
        if result.is_ok() {
            progress.succeeded += 1;
        } else {
            progress.failed += 1;
        }
        if progress.succeeded + progress.failed < progress.total {
            return;
        }

        let (total, succeeded) = (progress.total, progress.succeeded);
        let (message, severity) = if succeeded == total {
            (format!("Rescheduled {total} task(s) to today"), Severity::Info)
        } else if succeeded > 0 {
            (format!("Rescheduled {succeeded}/{total} tasks"), Severity::Warning)
        } else {
            ("Failed to reschedule tasks".to_string(), Severity::Error)
        };
        self.reschedules.remove(&run);
        self.presenter.notice(&message, severity);
    }
}
