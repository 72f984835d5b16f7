use std::collections::VecDeque;

use tracing::{
  debug,
  trace
};

use crate::action::Action;

pub const DEFAULT_CAPACITY: usize = 15;

/// Bounded, most-recent-last history of
/// applied actions. Pushing past
/// capacity drops the oldest entry for
/// good.
#[derive(Debug, Clone)]
pub struct UndoStack {
  entries:  VecDeque<Action>,
  capacity: usize
}

impl Default for UndoStack {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}

impl UndoStack {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      entries: VecDeque::with_capacity(
        capacity + 1
      ),
      capacity
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn push(
    &mut self,
    action: Action
  ) {
    trace!(seq = action.seq, description = %action.description, "push undo");
    self.entries.push_back(action);
    if self.entries.len() > self.capacity
      && let Some(evicted) =
        self.entries.pop_front()
    {
      debug!(
        seq = evicted.seq,
        description = %evicted.description,
        "undo history full; oldest action is no longer reversible"
      );
    }
  }

  pub fn pop(&mut self) -> Option<Action> {
    self.entries.pop_back()
  }

  pub fn peek(&self) -> Option<&Action> {
    self.entries.back()
  }

  pub fn describe_top(
    &self
  ) -> Option<&str> {
    self
      .peek()
      .map(|action| {
        action.description.as_str()
      })
  }

  /// Withdraws the action with `seq`,
  /// wherever it sits. Returns `None`
  /// if it was already popped or
  /// evicted.
  pub fn remove(
    &mut self,
    seq: u64
  ) -> Option<Action> {
    let idx = self
      .entries
      .iter()
      .position(|a| a.seq == seq)?;
    self.entries.remove(idx)
  }

  #[cfg(test)]
  pub(crate) fn contains(
    &self,
    seq: u64
  ) -> bool {
    self
      .entries
      .iter()
      .any(|a| a.seq == seq)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = &Action> {
    self.entries.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::UndoStack;
  use crate::action::{
    Action,
    ActionKind
  };
  use crate::item::{
    ItemId,
    Service
  };

  fn action(seq: u64) -> Action {
    Action::new(
      seq,
      ActionKind::Complete {
        item: ItemId::new(
          Service::Todoist,
          seq.to_string()
        )
      },
      &format!("A{seq}")
    )
  }

  #[test]
  fn sixteenth_push_evicts_the_first()
  {
    let mut stack = UndoStack::default();
    for seq in 1..=16 {
      stack.push(action(seq));
    }
    assert_eq!(stack.len(), 15);
    let seqs: Vec<u64> = stack
      .iter()
      .map(|a| a.seq)
      .collect();
    assert_eq!(
      seqs,
      (2..=16).collect::<Vec<_>>()
    );
  }

  #[test]
  fn length_is_bounded_for_any_push_count()
  {
    for n in [0usize, 1, 14, 15, 16, 40] {
      let mut stack =
        UndoStack::default();
      for seq in 0..n as u64 {
        stack.push(action(seq));
      }
      assert_eq!(stack.len(), n.min(15));
      if let Some(first) =
        stack.iter().next()
      {
        assert_eq!(
          first.seq,
          n.saturating_sub(15) as u64
        );
      }
    }
  }

  #[test]
  fn pop_returns_most_recent_then_none()
  {
    let mut stack = UndoStack::new(3);
    stack.push(action(1));
    stack.push(action(2));
    assert_eq!(
      stack.describe_top(),
      Some("complete A2")
    );
    assert_eq!(
      stack.pop().map(|a| a.seq),
      Some(2)
    );
    assert_eq!(
      stack.pop().map(|a| a.seq),
      Some(1)
    );
    assert!(stack.pop().is_none());
    assert!(stack.is_empty());
  }

  #[test]
  fn remove_withdraws_by_sequence() {
    let mut stack = UndoStack::new(5);
    for seq in 1..=3 {
      stack.push(action(seq));
    }
    assert!(stack.remove(2).is_some());
    assert!(!stack.contains(2));
    assert!(stack.remove(2).is_none());
    assert_eq!(
      stack.peek().map(|a| a.seq),
      Some(3)
    );
  }
}
