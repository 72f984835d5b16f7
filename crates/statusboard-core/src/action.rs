//! Reversible user actions.
//!
//! Every variant carries exactly what is needed to put local state back the
//! way it was, so undo never has to ask a remote service for the old value.
//! The set is closed: a new undoable feature is a new variant here plus a
//! case in the coordinator's inverse dispatch.

use chrono::NaiveDate;
use serde::Serialize;

use crate::item::{ItemId, ListId, truncate_title};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    Complete {
        item: ItemId,
    },
    Defer {
        item: ItemId,
        previous_due: Option<NaiveDate>,
        new_due: NaiveDate,
    },
    Reorder {
        list: ListId,
        before: Vec<ItemId>,
        after: Vec<ItemId>,
    },
    SetState {
        item: ItemId,
        previous: Option<String>,
        next: String,
    },
    Assign {
        item: ItemId,
        previous: Option<String>,
        next: Option<String>,
    },
    RemoveReviewer {
        item: ItemId,
        reviewer: String,
    },
    Create {
        list: ListId,
        item: ItemId,
    },
    Abandon {
        item: ItemId,
    },
    Restore {
        item: ItemId,
    },
}

impl ActionKind {
    /// The single item the action touches, if it is item-scoped.
    pub fn item(&self) -> Option<&ItemId> {
        match self {
            ActionKind::Reorder { .. } => None,
            ActionKind::Complete { item }
            | ActionKind::Defer { item, .. }
            | ActionKind::SetState { item, .. }
            | ActionKind::Assign { item, .. }
            | ActionKind::RemoveReviewer { item, .. }
            | ActionKind::Create { item, .. }
            | ActionKind::Abandon { item }
            | ActionKind::Restore { item } => Some(item),
        }
    }
}

/// One applied mutation, as recorded on the undo stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub seq: u64,
    pub description: String,
    pub kind: ActionKind,
}

impl Action {
    /// `subject` is the item title, or the list name for reorders.
    pub fn new(seq: u64, kind: ActionKind, subject: &str) -> Self {
        let description = describe(&kind, &truncate_title(subject));
        Self {
            seq,
            description,
            kind,
        }
    }
}

/// Lower-case verb phrase, e.g. "complete Write report". Used verbatim in
/// "Failed to ..." and "Undid: ..." notices.
pub fn describe(kind: &ActionKind, subject: &str) -> String {
    match kind {
        ActionKind::Complete { .. } => format!("complete {subject}"),
        ActionKind::Defer { .. } => format!("defer {subject}"),
        ActionKind::Reorder { .. } => format!("reorder {subject}"),
        ActionKind::SetState { next, .. } => format!("set {subject} to {next}"),
        ActionKind::Assign { next: Some(who), .. } => format!("assign {subject} to {who}"),
        ActionKind::Assign { next: None, .. } => format!("unassign {subject}"),
        ActionKind::RemoveReviewer { reviewer, .. } => {
            format!("remove {reviewer} from {subject}")
        }
        ActionKind::Create { .. } => format!("create {subject}"),
        ActionKind::Abandon { .. } => format!("abandon {subject}"),
        ActionKind::Restore { .. } => format!("restore {subject}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, ActionKind};
    use crate::item::{ItemId, ListId, Service};

    #[test]
    fn descriptions_name_the_subject() {
        let item = ItemId::new(Service::Todoist, "1");
        let action = Action::new(7, ActionKind::Complete { item }, "Write report");
        assert_eq!(action.seq, 7);
        assert_eq!(action.description, "complete Write report");
    }

    #[test]
    fn long_subjects_are_truncated() {
        let item = ItemId::new(Service::Goals, "g");
        let action = Action::new(1, ActionKind::Abandon { item }, &"x".repeat(50));
        assert_eq!(action.description, format!("abandon {}", "x".repeat(30)));
    }

    #[test]
    fn assignment_descriptions_follow_direction() {
        let item = ItemId::new(Service::Linear, "ISS-1");
        let assign = ActionKind::Assign {
            item: item.clone(),
            previous: None,
            next: Some("me".to_string()),
        };
        let unassign = ActionKind::Assign {
            item,
            previous: Some("me".to_string()),
            next: None,
        };
        assert_eq!(super::describe(&assign, "ISS-1"), "assign ISS-1 to me");
        assert_eq!(super::describe(&unassign, "ISS-1"), "unassign ISS-1");
    }

    #[test]
    fn reorders_are_list_scoped() {
        let kind = ActionKind::Reorder {
            list: ListId::new("goals"),
            before: vec![],
            after: vec![],
        };
        assert!(kind.item().is_none());
    }
}
