use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::item::ListId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

/// What the coordinator tells the presentation layer. Both calls happen
/// synchronously on the mutation path and must not block.
pub trait Presenter {
    fn state_changed(&mut self, list: &ListId);

    fn notice(&mut self, message: &str, severity: Severity);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    StateChanged(ListId),
    Notice(Notice),
}

/// Forwards presenter calls onto an unbounded channel so a render loop (or a
/// test) can consume them at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Presenter for ChannelPresenter {
    fn state_changed(&mut self, list: &ListId) {
        // A closed receiver means nobody is rendering any more.
        let _ = self.tx.send(UiEvent::StateChanged(list.clone()));
    }

    fn notice(&mut self, message: &str, severity: Severity) {
        trace!(%severity, message, "notice");
        let _ = self.tx.send(UiEvent::Notice(Notice {
            message: message.to_string(),
            severity,
        }));
    }
}
