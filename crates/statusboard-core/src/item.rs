use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

const TITLE_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Todoist,
    Linear,
    Github,
    Goals,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Todoist => "todoist",
            Service::Linear => "linear",
            Service::Github => "github",
            Service::Goals => "goals",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a row stands for. GitHub alone feeds three kinds of list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Task,
    Issue,
    ReviewRequest,
    PullRequest,
    Notification,
    Goal,
}

impl ItemKind {
    pub fn default_for(service: Service) -> Self {
        match service {
            Service::Todoist => ItemKind::Task,
            Service::Linear => ItemKind::Issue,
            Service::Github => ItemKind::ReviewRequest,
            Service::Goals => ItemKind::Goal,
        }
    }
}

/// Identity of one panel's list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(String);

impl ListId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service-qualified local identity. Stable for the life of the row, even
/// when the remote id is only learned after a create call completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId {
    pub service: Service,
    pub key: String,
}

impl ItemId {
    pub fn new(service: Service, key: impl Into<String>) -> Self {
        Self {
            service,
            key: key.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_temporary(&self) -> bool {
        self.key.starts_with("temp-")
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,

    pub kind: ItemKind,

    /// Id understood by the backing service. `None` while a create is in
    /// flight.
    #[serde(default)]
    pub remote_id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub abandoned: bool,

    #[serde(default)]
    pub due: Option<NaiveDate>,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub reviewers: BTreeSet<String>,

    /// Pull requests only.
    #[serde(default)]
    pub approved: bool,

    /// Why a notification arrived (`review_requested`, `mention`, ...).
    #[serde(default)]
    pub reason: Option<String>,
}

impl Item {
    pub fn new(service: Service, remote_id: impl Into<String>, title: impl Into<String>) -> Self {
        let remote_id = remote_id.into();
        Self {
            id: ItemId::new(service, remote_id.clone()),
            kind: ItemKind::default_for(service),
            remote_id: Some(remote_id),
            title: title.into(),
            completed: false,
            abandoned: false,
            due: None,
            state: None,
            assignee: None,
            reviewers: BTreeSet::new(),
            approved: false,
            reason: None,
        }
    }

    /// A locally created row that the service has not acknowledged yet.
    pub fn provisional(service: Service, local_seq: u64, title: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(service, format!("temp-{local_seq}")),
            kind: ItemKind::default_for(service),
            remote_id: None,
            title: title.into(),
            completed: false,
            abandoned: false,
            due: None,
            state: None,
            assignee: None,
            reviewers: BTreeSet::new(),
            approved: false,
            reason: None,
        }
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.approved = true;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_due(mut self, due: NaiveDate) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_reviewers<I, S>(mut self, reviewers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reviewers = reviewers.into_iter().map(Into::into).collect();
        self
    }

    pub fn short_title(&self) -> String {
        truncate_title(&self.title)
    }
}

pub fn truncate_title(title: &str) -> String {
    title.chars().take(TITLE_LIMIT).collect()
}

/// Next Monday-to-Friday date strictly after `from`.
pub fn next_working_day(from: NaiveDate) -> NaiveDate {
    let mut day = from + Duration::days(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day += Duration::days(1);
    }
    day
}

/// Monday of the week containing `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}
