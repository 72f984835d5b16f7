//! The interactive driver.
//!
//! Seeds the board from every service, then runs one cooperative loop that
//! multiplexes typed commands, remote outcomes and the next reorder
//! deadline. Everything touching the board happens on this one task.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{Local, NaiveDate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument};

use crate::adapter::{AdapterRegistry, RemoteAdapter};
use crate::commands::{Command, ItemRef};
use crate::config::Settings;
use crate::coordinator::{Coordinator, Rejection};
use crate::goals::{GoalAdapter, GoalStore};
use crate::item::{Item, ItemId, ItemKind, ListId, Service};
use crate::memory::MemoryAdapter;
use crate::notice::{ChannelPresenter, Notice, Severity, UiEvent};
use crate::render::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    coordinator: Coordinator,
    events: UnboundedReceiver<UiEvent>,
    renderer: Renderer,
    demo: BTreeMap<Service, MemoryAdapter>,
    goals: GoalAdapter,
    goals_list: ListId,
}

impl Session {
    /// Builds the coordinator and loads every list once. Must run inside a
    /// tokio runtime.
    #[instrument(skip_all)]
    pub fn new(settings: &Settings, store: GoalStore, renderer: Renderer) -> anyhow::Result<Self> {
        let today = Local::now().date_naive();
        let demo = demo_services(settings.demo_latency, today);
        let goals = GoalAdapter::new(store);

        let mut adapters = AdapterRegistry::new().with(Arc::new(goals.clone()));
        for adapter in demo.values() {
            adapters.register(Arc::new(adapter.clone()));
        }
        let (presenter, events) = ChannelPresenter::new();
        let coordinator = Coordinator::from_settings(adapters, settings, Box::new(presenter));

        let mut session = Self {
            coordinator,
            events,
            renderer,
            demo,
            goals,
            goals_list: ListId::new(Service::Goals.name()),
        };
        session.refresh(None)?;
        while session.events.try_recv().is_ok() {}
        info!(lists = session.coordinator.board().lists().count(), "session ready");
        Ok(session)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Reads commands from stdin until `quit` or end of input.
    pub async fn run_interactive(&mut self) -> anyhow::Result<()> {
        self.renderer.print_board(self.coordinator.board())?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let deadline = self.coordinator.next_deadline();
            let flow = tokio::select! {
                line = lines.next_line() => match line.context("failed to read command")? {
                    Some(line) => self.execute_line(&line)?,
                    None => Flow::Quit,
                },
                Some(outcome) = self.coordinator.recv_outcome() => {
                    self.coordinator.reconcile(outcome);
                    Flow::Continue
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.coordinator.flush_due(Instant::now());
                    Flow::Continue
                }
            };
            self.drain_events()?;
            if flow == Flow::Quit {
                break;
            }
        }

        self.settle().await
    }

    /// Runs a single command line and waits for everything it started.
    pub async fn run_once(&mut self, line: &str) -> anyhow::Result<()> {
        self.execute_line(line)?;
        self.drain_events()?;
        self.settle().await
    }

    /// Lets pending reorder windows flush and in-flight calls land.
    pub async fn settle(&mut self) -> anyhow::Result<()> {
        debug!(in_flight = self.coordinator.in_flight(), "settling");
        self.coordinator.settle().await;
        self.drain_events()
    }

    /// Parses and runs one line. Bad input becomes a notice; only output
    /// failures are errors.
    #[instrument(skip(self))]
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        let outcome = Command::parse(line).and_then(|command| match command {
            Some(command) => self.execute(command),
            None => Ok(Flow::Continue),
        });

        match outcome {
            Ok(flow) => Ok(flow),
            Err(err) => {
                debug!(error = %format!("{err:#}"), "command failed");
                self.renderer.print_notice(&Notice {
                    message: format!("{err:#}"),
                    severity: Severity::Warning,
                })?;
                Ok(Flow::Continue)
            }
        }
    }

    fn execute(&mut self, command: Command) -> anyhow::Result<Flow> {
        match command {
            Command::List(None) => self.renderer.print_board(self.coordinator.board())?,
            Command::List(Some(list)) => {
                let items = self
                    .coordinator
                    .board()
                    .list(&list)
                    .ok_or_else(|| anyhow!("no list named {list}"))?;
                self.renderer.print_list(&list, items)?;
            }
            Command::Complete(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.complete(&id));
            }
            Command::Defer(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.defer(&id, Local::now().date_naive()));
            }
            Command::State(target, state) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.set_state(&id, &state));
            }
            Command::Assign(target, who) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.assign(&id, Some(who)));
            }
            Command::Unassign(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.assign(&id, None));
            }
            Command::Unreview(target, who) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.remove_reviewer(&id, &who));
            }
            Command::Read(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.mark_read(&id));
            }
            Command::Merge(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.merge(&id));
            }
            Command::Reschedule(list) => {
                let list = list.unwrap_or_else(|| ListId::new(Service::Todoist.name()));
                noted(
                    self.coordinator
                        .reschedule_overdue(&list, Local::now().date_naive()),
                );
            }
            Command::Abandon(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.abandon(&id));
            }
            Command::Restore(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.restore(&id));
            }
            Command::Add(list, title) => noted(self.coordinator.create(&list, &title)),
            Command::Delete(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.delete(&id));
            }
            Command::Up(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.move_item(&id, -1));
            }
            Command::Down(target) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.move_item(&id, 1));
            }
            Command::Move(target, row) => {
                let id = self.resolve(&target)?;
                noted(self.coordinator.record_move(&target.list, &id, row - 1));
            }
            Command::Undo => {
                self.coordinator.undo();
            }
            Command::Refresh(list) => self.refresh(list.as_ref())?,
            Command::Help => self.renderer.print_help()?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn resolve(&self, target: &ItemRef) -> anyhow::Result<ItemId> {
        target.resolve(self.coordinator.board())
    }

    /// Replaces lists with what the services currently hold.
    #[instrument(skip(self))]
    pub fn refresh(&mut self, only: Option<&ListId>) -> anyhow::Result<()> {
        let wanted = |list: &ListId| only.is_none_or(|target| target == list);
        let mut refreshed = 0;

        for adapter in self.demo.values() {
            for list in adapter.lists() {
                if wanted(&list) {
                    let items = adapter.snapshot(&list);
                    self.coordinator.refresh_list(list, adapter.service(), items);
                    refreshed += 1;
                }
            }
        }

        if wanted(&self.goals_list) {
            let items = self
                .goals
                .current_week_items()
                .context("failed to load this week's goals")?;
            self.coordinator
                .refresh_list(self.goals_list.clone(), Service::Goals, items);
            refreshed += 1;
        }

        if refreshed == 0
            && let Some(list) = only
        {
            return Err(anyhow!("no list named {list}"));
        }
        debug!(refreshed, "lists refreshed");
        Ok(())
    }

    /// Prints changed lists, then any notices raised along the way.
    fn drain_events(&mut self) -> anyhow::Result<()> {
        let mut dirty = BTreeSet::new();
        let mut notices = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                UiEvent::StateChanged(list) => {
                    dirty.insert(list);
                }
                UiEvent::Notice(notice) => notices.push(notice),
            }
        }

        for list in dirty {
            if let Some(items) = self.coordinator.board().list(&list) {
                self.renderer.print_list(&list, items)?;
            }
        }
        for notice in &notices {
            self.renderer.print_notice(notice)?;
        }
        Ok(())
    }
}

fn noted<T>(result: Result<T, Rejection>) {
    if let Err(rejection) = result {
        debug!(%rejection, "request refused");
    }
}

/// Stand-in Todoist, Linear and GitHub lists backed by in-memory services.
fn demo_services(latency: Duration, today: NaiveDate) -> BTreeMap<Service, MemoryAdapter> {
    let yesterday = today - chrono::Duration::days(1);
    let todoist = vec![
        Item::new(Service::Todoist, "8101", "Write quarterly report").with_due(today),
        Item::new(Service::Todoist, "8102", "Book dentist appointment").with_due(yesterday),
        Item::new(Service::Todoist, "8103", "Renew passport").with_due(today),
        Item::new(Service::Todoist, "8104", "Plan team offsite"),
    ];
    let linear = vec![
        Item::new(Service::Linear, "ENG-101", "Fix login redirect loop").with_state("Todo"),
        Item::new(Service::Linear, "ENG-102", "Add search filters").with_state("Todo"),
        {
            let mut item = Item::new(Service::Linear, "ENG-98", "Migrate billing webhooks")
                .with_state("In Progress");
            item.assignee = Some("sam".to_string());
            item
        },
    ];
    let reviews = vec![
        Item::new(Service::Github, "412", "Cache dashboard queries").with_reviewers(["ana", "ben"]),
        Item::new(Service::Github, "415", "Bump tokio to 1.49").with_reviewers(["ana"]),
    ];
    let pull_requests = vec![
        Item::new(Service::Github, "430", "Add weekly goal export")
            .with_kind(ItemKind::PullRequest)
            .with_approval(),
        Item::new(Service::Github, "433", "Retry flaky webhook deliveries")
            .with_kind(ItemKind::PullRequest),
    ];
    let notifications = vec![
        Item::new(Service::Github, "thread-9001", "CI failed on main")
            .with_kind(ItemKind::Notification)
            .with_reason("ci_activity"),
        Item::new(Service::Github, "thread-9002", "ana mentioned you in #412")
            .with_kind(ItemKind::Notification)
            .with_reason("mention"),
    ];

    let adapter = |service: Service| MemoryAdapter::new(service).with_latency(latency);
    BTreeMap::from([
        (
            Service::Todoist,
            adapter(Service::Todoist).with_list(ListId::new("todoist"), todoist),
        ),
        (
            Service::Linear,
            adapter(Service::Linear).with_list(ListId::new("linear"), linear),
        ),
        (
            Service::Github,
            adapter(Service::Github)
                .with_list(ListId::new("github"), reviews)
                .with_list(ListId::new("prs"), pull_requests)
                .with_list(ListId::new("notifications"), notifications),
        ),
    ])
}
