//! Undo and redo by log replay
//!
//! The undo and redo stacks are not stored. Replaying the record kinds in
//! order rebuilds them:
//! - `Execute` pushes onto the undo stack and clears the redo stack
//! - `Undo` pops its target from the undo stack and pushes itself on redo
//! - `Redo` pops its target from the redo stack and pushes itself on undo
//! - `Permanent` records are invisible
//!
//! A log cut by compaction may start with undo or redo records whose target
//! is gone. They replay with no target and stay on their stack.

use tracing::debug;

use super::record::{HistoryRecord, RecordKind};
use super::state::{HistoryState, Region};
use super::{CollabHistory, HistoryEvent};
use crate::changeset::{Bias, Changeset};
use crate::error::Result;
use crate::selection::SelectionRange;

/// Undo/redo stacks rebuilt from a log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UndoStacks {
    pub undo: Vec<usize>,
    pub redo: Vec<usize>,

    /// Record undone or redone by each `Undo`/`Redo` record
    pub targets: Vec<Option<usize>>,

    /// Whether each `Execute` record discarded a non-empty redo stack
    pub clears_redo: Vec<bool>,
}

impl UndoStacks {
    pub fn last_executed(&self) -> Option<usize> {
        self.undo.last().copied()
    }

    pub fn is_targeted(&self, index: usize) -> bool {
        self.targets.contains(&Some(index))
    }

    /// True if no record other than `by` targets `index`
    pub fn targeted_only_by(&self, index: usize, by: usize) -> bool {
        self.targets
            .iter()
            .enumerate()
            .all(|(i, target)| i == by || *target != Some(index))
    }
}

pub(crate) fn replay(records: &[HistoryRecord]) -> UndoStacks {
    let mut stacks = UndoStacks {
        targets: vec![None; records.len()],
        clears_redo: vec![false; records.len()],
        ..UndoStacks::default()
    };

    for (index, record) in records.iter().enumerate() {
        match record.kind {
            RecordKind::Execute => {
                stacks.clears_redo[index] = !stacks.redo.is_empty();
                stacks.redo.clear();
                stacks.undo.push(index);
            }
            RecordKind::Undo => {
                stacks.targets[index] = stacks.undo.pop();
                stacks.redo.push(index);
            }
            RecordKind::Redo => {
                stacks.targets[index] = stacks.redo.pop();
                stacks.undo.push(index);
            }
            RecordKind::Permanent => {}
        }
    }

    stacks
}

/// Changesets of the records after `target`, with each undo or redo pair
/// lying entirely after `target` folded away
///
/// A folded pair is dropped and the records between its halves are rebased
/// as if the cancelled record had never run. Carrying an inverse through
/// the pair itself would let the cancelled record's deletions and
/// reinsertions move the inverse's insertions.
fn net_changes_after(state: &HistoryState, target: usize) -> Result<Vec<Changeset>> {
    let stacks = replay(&state.records);
    let start = state.text_at(target + 1)?;
    let mut path: Vec<(usize, Changeset)> = Vec::new();

    for index in target + 1..state.records.len() {
        let cancelled = stacks.targets[index]
            .filter(|&undone| undone > target)
            .and_then(|undone| path.iter().position(|(i, _)| *i == undone));
        let Some(at) = cancelled else {
            path.push((index, state.records[index].changeset.clone()));
            continue;
        };

        let text = start.compose_all(path[..at].iter().map(|(_, changeset)| changeset))?;
        let mut inverse = path[at].1.inverse(&text)?;
        let between = path.split_off(at + 1);
        path.truncate(at);
        for (i, later) in between {
            let on_undone = inverse.follow_with_bias(&later, Bias::After);
            inverse = later.follow(&inverse);
            path.push((i, on_undone));
        }
    }

    Ok(path.into_iter().map(|(_, changeset)| changeset).collect())
}

/// Inverse of `records[target]`, rebased onto the end of the log, plus the
/// selections the generated record carries
fn carry_inverse(state: &HistoryState, target: usize) -> Result<(Changeset, SelectionRange, SelectionRange)> {
    let record = &state.records[target];
    let mut inverse = record.changeset.inverse(&state.text_at(target)?)?;

    // `before` tracks the live text, `after` the text with the target undone
    let mut before = record.after_selection;
    let mut after = record.before_selection;

    for later in net_changes_after(state, target)? {
        let on_undone = inverse.follow_with_bias(&later, Bias::After);
        after = after.follow(&on_undone, Bias::Before);
        before = before.follow(&later, Bias::Before);
        inverse = later.follow(&inverse);
    }

    Ok((inverse, before, after))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl CollabHistory {
    pub fn can_undo(&self) -> bool {
        self.state.last_executed_index.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !replay(&self.state.records).redo.is_empty()
    }

    /// Undo the most recent undoable group
    ///
    /// Returns `Ok(false)` when nothing in the retained log can be undone;
    /// the caller may restore older history and retry.
    pub fn undo(&mut self) -> Result<bool> {
        Ok(self.undo_view_change()?.is_some())
    }

    /// Redo the most recently undone group
    pub fn redo(&mut self) -> Result<bool> {
        Ok(self.redo_view_change()?.is_some())
    }

    /// Like [`undo`](Self::undo), returning the view change
    pub(crate) fn undo_view_change(&mut self) -> Result<Option<Changeset>> {
        self.with_transaction(|history| history.step(Direction::Undo))
    }

    pub(crate) fn redo_view_change(&mut self) -> Result<Option<Changeset>> {
        self.with_transaction(|history| history.step(Direction::Redo))
    }

    fn step(&mut self, direction: Direction) -> Result<Option<Changeset>> {
        let mut stacks = replay(&self.state.records);
        let (kind, stack) = match direction {
            Direction::Undo => (RecordKind::Undo, &mut stacks.undo),
            Direction::Redo => (RecordKind::Redo, &mut stacks.redo),
        };

        let old_view_len = self.state.view()?.output_len();
        let mut generated = Vec::new();

        while let Some(target) = stack.pop() {
            let (changeset, before, after) = carry_inverse(&self.state, target)?;
            let mut record = HistoryRecord::new(kind, changeset.clone(), before, after);
            record.squash = !generated.is_empty();
            self.state.records.push(record);
            generated.push(changeset);

            if !self.state.records[target].squash {
                break;
            }
        }

        if generated.is_empty() {
            return Ok(None);
        }
        debug!(?direction, records = generated.len(), "Generated history records");

        let view_change = Changeset::identity(old_view_len).compose_all(&generated)?;
        self.compact(Region::Local)?;
        self.state.refresh_last_executed();
        self.queue(HistoryEvent::LocalChanged);
        self.queue(HistoryEvent::ViewChanged {
            changeset: view_change.clone(),
        });
        Ok(Some(view_change))
    }
}
