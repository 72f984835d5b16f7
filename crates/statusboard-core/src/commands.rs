use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use tracing::{debug, instrument};

use crate::board::Board;
use crate::item::{ItemId, ListId};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "complete",
        "defer",
        "state",
        "assign",
        "unassign",
        "unreview",
        "read",
        "merge",
        "reschedule",
        "abandon",
        "restore",
        "add",
        "delete",
        "up",
        "down",
        "move",
        "undo",
        "refresh",
        "help",
        "quit",
    ]
}

/// Exact names win; otherwise a unique prefix expands to its command.
pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// A row on screen, written `<list>#<row>` with 1-based rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub list: ListId,
    pub row: usize,
}

impl FromStr for ItemRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (list, row) = s
            .split_once('#')
            .ok_or_else(|| anyhow!("expected <list>#<row>, got: {s}"))?;
        let row: usize = row
            .parse()
            .with_context(|| format!("invalid row number in {s}"))?;
        if list.is_empty() || row == 0 {
            bail!("expected <list>#<row> with a row of 1 or more, got: {s}");
        }
        Ok(Self {
            list: ListId::new(list),
            row,
        })
    }
}

impl ItemRef {
    pub fn resolve(&self, board: &Board) -> anyhow::Result<ItemId> {
        let list = board
            .list(&self.list)
            .ok_or_else(|| anyhow!("no list named {}", self.list))?;
        list.items
            .get(self.row - 1)
            .map(|item| item.id.clone())
            .ok_or_else(|| anyhow!("{} has no row {}", self.list, self.row))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(Option<ListId>),
    Complete(ItemRef),
    Defer(ItemRef),
    State(ItemRef, String),
    Assign(ItemRef, String),
    Unassign(ItemRef),
    Unreview(ItemRef, String),
    Read(ItemRef),
    Merge(ItemRef),
    /// Overdue tasks to today; the Todoist list unless one is named.
    Reschedule(Option<ListId>),
    Abandon(ItemRef),
    Restore(ItemRef),
    Add(ListId, String),
    Delete(ItemRef),
    Up(ItemRef),
    Down(ItemRef),
    /// Target row, 1-based like item references.
    Move(ItemRef, usize),
    Undo,
    Refresh(Option<ListId>),
    Help,
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    #[instrument]
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = tokens.collect();

        let known = known_command_names();
        let name = expand_command_abbrev(head, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {head}"))?;
        debug!(token = head, expanded = name, "resolved command token");

        let item = |idx: usize| -> anyhow::Result<ItemRef> {
            rest.get(idx)
                .ok_or_else(|| anyhow!("{name} needs an item as <list>#<row>"))?
                .parse()
        };
        let text = |from: usize, what: &str| -> anyhow::Result<String> {
            let joined = rest.get(from..).unwrap_or_default().join(" ");
            if joined.is_empty() {
                bail!("{name} needs {what}");
            }
            Ok(joined)
        };
        let list = |idx: usize| rest.get(idx).map(|raw| ListId::new(*raw));

        let command = match name {
            "list" => Command::List(list(0)),
            "complete" => Command::Complete(item(0)?),
            "defer" => Command::Defer(item(0)?),
            "state" => Command::State(item(0)?, text(1, "a state")?),
            "assign" => Command::Assign(item(0)?, text(1, "an assignee")?),
            "unassign" => Command::Unassign(item(0)?),
            "unreview" => Command::Unreview(item(0)?, text(1, "a reviewer")?),
            "read" => Command::Read(item(0)?),
            "merge" => Command::Merge(item(0)?),
            "reschedule" => Command::Reschedule(list(0)),
            "abandon" => Command::Abandon(item(0)?),
            "restore" => Command::Restore(item(0)?),
            "add" => Command::Add(
                list(0).ok_or_else(|| anyhow!("add needs a list"))?,
                text(1, "a title")?,
            ),
            "delete" => Command::Delete(item(0)?),
            "up" => Command::Up(item(0)?),
            "down" => Command::Down(item(0)?),
            "move" => {
                let target = rest
                    .get(1)
                    .ok_or_else(|| anyhow!("move needs a target row"))?;
                let row: usize = target
                    .parse()
                    .with_context(|| format!("invalid target row: {target}"))?;
                if row == 0 {
                    bail!("rows start at 1");
                }
                Command::Move(item(0)?, row)
            }
            "undo" => Command::Undo,
            "refresh" => Command::Refresh(list(0)),
            "help" => Command::Help,
            "quit" => Command::Quit,
            other => bail!("unhandled command: {other}"),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, ItemRef, expand_command_abbrev, known_command_names};
    use crate::board::Board;
    use crate::item::{Item, ListId, Service};

    #[test]
    fn unique_prefixes_expand() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("comp", &known), Some("complete"));
        assert_eq!(expand_command_abbrev("und", &known), Some("undo"));
        assert_eq!(expand_command_abbrev("un", &known), None);
        assert_eq!(expand_command_abbrev("up", &known), Some("up"));
        assert_eq!(expand_command_abbrev("rea", &known), Some("read"));
        assert_eq!(expand_command_abbrev("res", &known), None);
        assert_eq!(expand_command_abbrev("resc", &known), Some("reschedule"));
    }

    #[test]
    fn item_refs_are_one_based() {
        let parsed: ItemRef = "todoist#2".parse().expect("valid ref");
        assert_eq!(parsed.row, 2);
        assert!("todoist#0".parse::<ItemRef>().is_err());
        assert!("todoist".parse::<ItemRef>().is_err());

        let mut board = Board::new();
        board.replace_list(
            ListId::new("todoist"),
            Service::Todoist,
            vec![
                Item::new(Service::Todoist, "a", "first"),
                Item::new(Service::Todoist, "b", "second"),
            ],
        );
        assert_eq!(parsed.resolve(&board).expect("row exists").key, "b");
        let missing: ItemRef = "todoist#3".parse().expect("valid ref");
        assert!(missing.resolve(&board).is_err());
    }

    #[test]
    fn commands_take_free_text_tails() {
        let parsed = Command::parse("state linear#1 In Review").expect("parses");
        assert!(matches!(
            parsed,
            Some(Command::State(_, ref state)) if state == "In Review"
        ));
        assert_eq!(
            Command::parse("add goals Ship the beta").expect("parses"),
            Some(Command::Add(ListId::new("goals"), "Ship the beta".to_string()))
        );
        assert_eq!(Command::parse("   ").expect("blank"), None);
        assert!(Command::parse("move todoist#1 0").is_err());
        assert!(Command::parse("assign linear#1").is_err());
        assert_eq!(
            Command::parse("reschedule").expect("parses"),
            Some(Command::Reschedule(None))
        );
        assert!(Command::parse("merge").is_err());
    }
}
