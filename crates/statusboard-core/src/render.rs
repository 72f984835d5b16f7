use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::board::{Board, ItemList};
use crate::config::Config;
use crate::item::{Item, ItemKind, ListId, Service};
use crate::notice::{Notice, Severity};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, board))]
    pub fn print_board(&mut self, board: &Board) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for (id, list) in board.lists() {
            self.write_list(&mut out, id, list)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, list))]
    pub fn print_list(&mut self, id: &ListId, list: &ItemList) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_list(&mut out, id, list)
    }

    pub fn write_list<W: Write>(
        &self,
        mut out: W,
        id: &ListId,
        list: &ItemList,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&format!("{id} ({})", list.service), "1"))?;

        let headers = headers_for(list.service)
            .iter()
            .map(|header| header.to_string())
            .collect();
        let rows = list
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| self.row_for(list.service, idx + 1, item))
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn print_notice(&mut self, notice: &Notice) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let code = match notice.severity {
            Severity::Info => "32",
            Severity::Warning => "33",
            Severity::Error => "31",
        };
        writeln!(
            out,
            "{} {}",
            self.paint(&format!("[{}]", notice.severity), code),
            notice.message
        )?;
        Ok(())
    }

    pub fn print_help(&mut self) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in HELP {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn row_for(&self, service: Service, row: usize, item: &Item) -> Vec<String> {
        let mut status = if item.abandoned {
            "abandoned".to_string()
        } else if item.completed {
            self.paint("done", "32")
        } else {
            String::new()
        };
        if item.remote_id.is_none() {
            status = self.paint("saving", "2");
        }

        let mut cells = vec![self.paint(&row.to_string(), "33"), item.title.clone()];
        match service {
            Service::Todoist => cells.push(
                item.due
                    .map(|due| due.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
            Service::Linear => {
                cells.push(item.state.clone().unwrap_or_default());
                cells.push(item.assignee.clone().unwrap_or_default());
            }
            Service::Github => cells.push(match item.kind {
                ItemKind::PullRequest if item.approved => self.paint("approved", "32"),
                ItemKind::Notification => item.reason.clone().unwrap_or_default(),
                _ => item
                    .reviewers
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
            Service::Goals => {}
        }
        cells.push(status);
        cells
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

const HELP: &[&str] = &[
    "items are written <list>#<row>, e.g. todoist#2; commands accept unique prefixes",
    "  list [list]                 show one list or all",
    "  complete <item>             mark done",
    "  defer <item>                due next working day (Todoist)",
    "  state <item> <state>        change state (Linear)",
    "  assign <item> <who>         assign (Linear)",
    "  unassign <item>             clear assignee (Linear)",
    "  unreview <item> <who>       remove a reviewer (GitHub)",
    "  read <item>                 mark a notification read",
    "  merge <item>                squash-merge an approved PR",
    "  reschedule [list]           overdue tasks to today (Todoist)",
    "  abandon|restore <item>      goals only",
    "  add <list> <title>          create an item",
    "  delete <item>               delete (cannot be undone)",
    "  up|down <item>              move one row",
    "  move <item> <row>           move to a row",
    "  undo                        revert the last change",
    "  refresh [list]              reload from the service",
    "  quit",
];

fn headers_for(service: Service) -> &'static [&'static str] {
    match service {
        Service::Todoist => &["#", "Task", "Due", "Status"],
        Service::Linear => &["#", "Issue", "State", "Assignee", "Status"],
        Service::Github => &["#", "Title", "Detail", "Status"],
        Service::Goals => &["#", "Goal", "Status"],
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{Renderer, strip_ansi, write_table};
    use crate::board::Board;
    use crate::item::{Item, ItemKind, ListId, Service};

    #[test]
    fn columns_align_on_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["#".to_string(), "Goal".to_string()],
            vec![
                vec!["\x1b[33m1\x1b[0m".to_string(), "Écrire".to_string()],
                vec!["10".to_string(), "x".to_string()],
            ],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(strip_ansi(lines[2]), "1  Écrire ");
        assert_eq!(lines[3], "10 x      ");
    }

    #[test]
    fn lists_render_per_service_columns() {
        let mut board = Board::new();
        let list = ListId::new("linear");
        board.replace_list(
            list.clone(),
            Service::Linear,
            vec![Item::new(Service::Linear, "ENG-1", "Fix login").with_state("Todo")],
        );

        let mut buf = Vec::new();
        Renderer::plain()
            .write_list(&mut buf, &list, board.list(&list).expect("list"))
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("linear (linear)\n"));
        assert!(text.contains("Assignee"));
        assert!(text.contains("Fix login"));
    }

    #[test]
    fn github_rows_show_what_matters_for_their_kind() {
        let mut board = Board::new();
        let list = ListId::new("notifications");
        board.replace_list(
            list.clone(),
            Service::Github,
            vec![
                Item::new(Service::Github, "thread-1", "CI failed on main")
                    .with_kind(ItemKind::Notification)
                    .with_reason("ci_activity"),
                Item::new(Service::Github, "430", "Add cache")
                    .with_kind(ItemKind::PullRequest)
                    .with_approval(),
            ],
        );

        let mut buf = Vec::new();
        Renderer::plain()
            .write_list(&mut buf, &list, board.list(&list).expect("list"))
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("ci_activity"));
        assert!(text.contains("approved"));
    }
}
