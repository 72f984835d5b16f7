use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{Attempt, RemoteAck, RemoteAdapter, RemoteFailure, RemoteOp};
use crate::item::{Item, Service, week_start};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub id: Uuid,
    pub content: String,
    pub week_start: NaiveDate,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_abandoned: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sort_order: usize,
}

impl Goal {
    pub fn to_item(&self) -> Item {
        let mut item = Item::new(Service::Goals, self.id.to_string(), self.content.clone());
        item.completed = self.is_completed;
        item.abandoned = self.is_abandoned;
        item
    }
}

/// Weekly goals kept as JSON lines in the data directory.
#[derive(Debug)]
pub struct GoalStore {
    pub goals_path: PathBuf,
}

impl GoalStore {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let goals_path = data_dir.join("goals.data");
        if !goals_path.exists() {
            fs::write(&goals_path, "")?;
        }

        info!(goals = %goals_path.display(), "opened goal store");
        Ok(Self { goals_path })
    }

    #[instrument(skip(self))]
    pub fn load_all(&self) -> anyhow::Result<Vec<Goal>> {
        load_jsonl(&self.goals_path).context("failed to load goals.data")
    }

    #[instrument(skip(self, goals))]
    pub fn save_all(&self, goals: &[Goal]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.goals_path, goals).context("failed to save goals.data")
    }

    /// Goals of the week starting on `week`, by sort order then age.
    #[instrument(skip(self))]
    pub fn load_week(&self, week: NaiveDate) -> anyhow::Result<Vec<Goal>> {
        let mut goals: Vec<Goal> = self
            .load_all()?
            .into_iter()
            .filter(|goal| goal.week_start == week)
            .collect();
        goals.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(goals)
    }

    #[instrument(skip(self, content))]
    pub fn create(
        &self,
        content: &str,
        week: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Goal> {
        let content = content.trim();
        if content.is_empty() {
            return Err(anyhow!("goal content cannot be empty"));
        }

        let mut goals = self.load_all()?;
        let sort_order = goals
            .iter()
            .filter(|goal| goal.week_start == week)
            .map(|goal| goal.sort_order + 1)
            .max()
            .unwrap_or(0);

        let goal = Goal {
            id: Uuid::new_v4(),
            content: content.to_string(),
            week_start: week,
            is_completed: false,
            completed_at: None,
            is_abandoned: false,
            created_at: now,
            sort_order,
        };
        goals.push(goal.clone());
        self.save_all(&goals)?;
        debug!(id = %goal.id, sort_order, "goal created");
        Ok(goal)
    }

    pub fn set_completed(
        &self,
        id: Uuid,
        completed: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.modify(id, |goal| {
            goal.is_completed = completed;
            goal.completed_at = completed.then_some(now);
        })
    }

    pub fn set_abandoned(&self, id: Uuid, abandoned: bool) -> anyhow::Result<bool> {
        self.modify(id, |goal| goal.is_abandoned = abandoned)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut goals = self.load_all()?;
        let before = goals.len();
        goals.retain(|goal| goal.id != id);
        if goals.len() == before {
            return Ok(false);
        }
        self.save_all(&goals)?;
        Ok(true)
    }

    #[instrument(skip(self, orders), fields(count = orders.len()))]
    pub fn update_sort_orders(&self, orders: &[(Uuid, usize)]) -> anyhow::Result<bool> {
        let mut goals = self.load_all()?;
        let mut touched = 0usize;
        for (id, order) in orders {
            if let Some(goal) = goals.iter_mut().find(|goal| goal.id == *id) {
                goal.sort_order = *order;
                touched += 1;
            } else {
                warn!(%id, "sort order for unknown goal");
            }
        }
        if touched == 0 {
            return Ok(false);
        }
        self.save_all(&goals)?;
        Ok(true)
    }

    #[instrument(skip(self, change))]
    fn modify(&self, id: Uuid, change: impl FnOnce(&mut Goal)) -> anyhow::Result<bool> {
        let mut goals = self.load_all()?;
        let Some(goal) = goals.iter_mut().find(|goal| goal.id == id) else {
            return Ok(false);
        };
        change(goal);
        self.save_all(&goals)?;
        Ok(true)
    }
}

/// Presents the goal store through the uniform adapter contract. File IO
/// runs on the blocking pool; the mutex keeps read-modify-write cycles from
/// interleaving.
#[derive(Debug, Clone)]
pub struct GoalAdapter {
    store: Arc<Mutex<GoalStore>>,
}

impl GoalAdapter {
    pub fn new(store: GoalStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Current week's goals as board items.
    pub fn current_week_items(&self) -> anyhow::Result<Vec<Item>> {
        let week = week_start(Local::now().date_naive());
        let goals = self.store.lock().load_week(week)?;
        Ok(goals.iter().map(Goal::to_item).collect())
    }
}

#[async_trait]
impl RemoteAdapter for GoalAdapter {
    fn service(&self) -> Service {
        Service::Goals
    }

    #[instrument(skip(self, op), fields(op = op.name()))]
    async fn attempt(&self, op: RemoteOp) -> Attempt {
        let store = Arc::clone(&self.store);
        let name = op.name();
        let joined = tokio::task::spawn_blocking(move || apply_goal_op(&store.lock(), op)).await;

        match joined {
            Ok(Ok(Some(ack))) => Ok(ack),
            Ok(Ok(None)) => Err(RemoteFailure::Rejected {
                service: Service::Goals,
                reason: "goal not found".to_string(),
            }),
            Ok(Err(Unsupported)) => Err(RemoteFailure::Unsupported {
                service: Service::Goals,
                op: name,
            }),
            Err(err) => Err(RemoteFailure::Rejected {
                service: Service::Goals,
                reason: format!("goal store task failed: {err}"),
            }),
        }
    }
}

struct Unsupported;

fn apply_goal_op(store: &GoalStore, op: RemoteOp) -> Result<Option<RemoteAck>, Unsupported> {
    let now = Utc::now();
    let outcome = match op {
        RemoteOp::Create { title, .. } => store
            .create(&title, week_start(Local::now().date_naive()), now)
            .map(|goal| Some(RemoteAck::created(goal.id.to_string()))),
        RemoteOp::Complete { id } => with_uuid(&id, |id| store.set_completed(id, true, now)),
        RemoteOp::Reopen { id } => with_uuid(&id, |id| store.set_completed(id, false, now)),
        RemoteOp::Abandon { id } => with_uuid(&id, |id| store.set_abandoned(id, true)),
        RemoteOp::Restore { id } => with_uuid(&id, |id| store.set_abandoned(id, false)),
        RemoteOp::Delete { id } => with_uuid(&id, |id| store.delete(id)),
        RemoteOp::SetOrder { orders, .. } => orders
            .iter()
            .map(|(id, order)| -> anyhow::Result<(Uuid, usize)> {
                Ok((Uuid::parse_str(id)?, *order))
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .and_then(|orders| store.update_sort_orders(&orders))
            .map(|found| found.then(RemoteAck::default)),
        RemoteOp::SetDue { .. }
        | RemoteOp::SetState { .. }
        | RemoteOp::Assign { .. }
        | RemoteOp::RemoveReviewer { .. }
        | RemoteOp::RequestReviewer { .. }
        | RemoteOp::MarkRead { .. }
        | RemoteOp::Merge { .. }
        | RemoteOp::Reschedule { .. } => return Err(Unsupported),
    };

    match outcome {
        Ok(ack) => Ok(ack),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "goal store operation failed");
            Ok(None)
        }
    }
}

fn with_uuid(
    raw: &str,
    f: impl FnOnce(Uuid) -> anyhow::Result<bool>,
) -> anyhow::Result<Option<RemoteAck>> {
    let id = Uuid::parse_str(raw).with_context(|| format!("invalid goal id {raw}"))?;
    Ok(f(id)?.then(RemoteAck::default))
}

#[instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Goal>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let goal: Goal = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(goal);
    }

    debug!(count = out.len(), "loaded goals from jsonl");
    Ok(out)
}

#[instrument(skip(path, goals))]
fn save_jsonl_atomic(path: &Path, goals: &[Goal]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = goals.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for goal in goals {
        let serialized = serde_json::to_string(goal)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
