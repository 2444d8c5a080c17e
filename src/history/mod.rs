//! CollabHistory: transactional, self-compacting edit history
//!
//! The history is the single owner of the four text slots (`server`,
//! `submitted`, `local`, `view`). All of them are derived from one log of
//! [`HistoryRecord`]s plus two cursors; see [`HistoryState`].
//!
//! Lifecycle of a local edit:
//!
//! ```text
//! push_selection_changeset  ->  local
//! submit_changes            ->  submitted  (cursor move)
//! submitted_changes_acknowledged -> server
//! ```
//!
//! Foreign edits enter through `handle_external_change`, which inserts them
//! at the server cursor and rebases every submitted and local record past
//! them. Undo and redo append synthetic records; compaction keeps the log
//! short.
//!
//! # Example
//!
//! ```rust
//! use synckit_collab::changeset::{Changeset, Strip};
//! use synckit_collab::history::{CollabHistory, PushOptions};
//! use synckit_collab::protocol::TextRevision;
//! use synckit_collab::selection::SelectionRange;
//!
//! let mut history = CollabHistory::new(TextRevision::new(0, "hello"));
//! let edit = Changeset::new(vec![
//!     Strip::Retain { start: 0, end: 5 },
//!     Strip::Insert("!".to_string()),
//! ]).unwrap();
//!
//! history
//!     .push_selection_changeset(edit, SelectionRange::caret(5), SelectionRange::caret(6), PushOptions::default())
//!     .unwrap();
//! assert_eq!(history.view_text().unwrap(), "hello!");
//!
//! history.undo().unwrap();
//! assert_eq!(history.view_text().unwrap(), "hello");
//! ```

mod compaction;
mod rebase;
mod record;
mod restore;
mod state;
mod transaction;
mod undo;

pub use record::{HistoryRecord, RecordKind};
pub use state::HistoryState;

use tracing::debug;

use crate::changeset::Changeset;
use crate::error::{CollabError, Result};
use crate::events::{EventEmitter, Subscription};
use crate::protocol::{RevisionRecord, TextRevision};
use crate::selection::SelectionRange;
use state::Region;

/// Notifications emitted after a history transaction commits
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    ServerTailChanged,
    ServerChanged,
    SubmittedChanged,
    LocalChanged,

    /// Older records were spliced in front of the log
    RecordsRestored { own_count: usize },

    /// `changeset` turns the previous view into the current one
    ViewChanged { changeset: Changeset },
}

/// Options for [`CollabHistory::push_selection_changeset`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Undo together with the previous record
    pub squash: bool,
}

/// Edit history and derived text state of one document
pub struct CollabHistory {
    state: HistoryState,
    events: EventEmitter<HistoryEvent>,
    queued: Vec<HistoryEvent>,
    in_transaction: bool,
}

impl CollabHistory {
    /// Empty history over the text at `head.revision`
    pub fn new(head: TextRevision) -> Self {
        Self {
            state: HistoryState::new(head),
            events: EventEmitter::new(),
            queued: Vec::new(),
            in_transaction: false,
        }
    }

    /// Resume from a persisted state, validating it first
    pub fn from_state(state: HistoryState) -> Result<Self> {
        state.check_invariants()?;
        Ok(Self {
            state,
            events: EventEmitter::new(),
            queued: Vec::new(),
            in_transaction: false,
        })
    }

    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn records(&self) -> &[HistoryRecord] {
        self.state.records()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&HistoryEvent) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    pub fn server(&self) -> Result<Changeset> {
        self.state.server()
    }

    pub fn submitted(&self) -> Result<Changeset> {
        self.state.submitted()
    }

    pub fn local(&self) -> Result<Changeset> {
        self.state.local()
    }

    pub fn view(&self) -> Result<Changeset> {
        self.state.view()
    }

    pub fn view_text(&self) -> Result<String> {
        self.state
            .view()?
            .as_text()
            .ok_or_else(|| CollabError::invariant("view is not a text"))
    }

    pub fn has_submitted_changes(&self) -> bool {
        self.state.has_submitted_changes()
    }

    pub fn has_local_changes(&self) -> bool {
        self.state.has_local_changes()
    }

    pub fn can_submit_changes(&self) -> bool {
        self.has_local_changes() && !self.has_submitted_changes()
    }

    /// Record a local edit against the current view
    ///
    /// Returns `Ok(false)` without recording anything if the changeset does
    /// not change the view.
    pub fn push_selection_changeset(
        &mut self,
        changeset: Changeset,
        before_selection: SelectionRange,
        after_selection: SelectionRange,
        options: PushOptions,
    ) -> Result<bool> {
        self.with_transaction(|history| {
            let view = history.state.view()?;
            if !view.is_composable_with(&changeset) {
                return Err(CollabError::changeset(format!(
                    "edit requires {} chars, view has {}",
                    changeset.required_input_len(),
                    view.output_len()
                )));
            }
            if changeset.is_noop_after(&view) {
                return Ok(false);
            }

            let mut record = HistoryRecord::new(
                RecordKind::Execute,
                changeset.clone(),
                before_selection,
                after_selection,
            );
            record.squash = options.squash;
            history.state.records.push(record);

            history.compact(Region::Local)?;
            history.state.refresh_last_executed();
            history.queue(HistoryEvent::LocalChanged);
            history.queue(HistoryEvent::ViewChanged { changeset });
            Ok(true)
        })
    }

    /// Move every local record into the submitted region
    ///
    /// Returns the submitted changeset, relative to the server text.
    ///
    /// # Errors
    ///
    /// `CollabError::Protocol` if a submission is already outstanding or
    /// there is nothing to submit.
    pub fn submit_changes(&mut self) -> Result<Changeset> {
        self.with_transaction(|history| {
            if history.has_submitted_changes() {
                return Err(CollabError::protocol("a submission is already outstanding"));
            }
            if !history.has_local_changes() {
                return Err(CollabError::protocol("no local changes to submit"));
            }

            history.state.submitted_index = history.state.records.len();
            debug!(
                records = history.state.submitted_index - history.state.server_index,
                "Submitted local changes"
            );
            history.queue(HistoryEvent::SubmittedChanged);
            history.queue(HistoryEvent::LocalChanged);
            history.state.submitted()
        })
    }

    /// The authority committed the outstanding submission as `record`
    ///
    /// # Errors
    ///
    /// `CollabError::Protocol` if nothing is outstanding.
    pub fn submitted_changes_acknowledged(&mut self, record: &RevisionRecord) -> Result<()> {
        self.with_transaction(|history| {
            if !history.has_submitted_changes() {
                return Err(CollabError::protocol(format!(
                    "acknowledgement for revision {} with nothing outstanding",
                    record.revision
                )));
            }

            let last = history.state.submitted_index - 1;
            history.state.records[last].server_record = Some(record.server_record());
            history.state.server_index = history.state.submitted_index;

            debug!(revision = record.revision, "Submission acknowledged");
            history.compact(Region::Server)?;
            history.state.refresh_last_executed();
            history.queue(HistoryEvent::ServerChanged);
            history.queue(HistoryEvent::SubmittedChanged);
            Ok(())
        })
    }

    /// Replace the whole history with a fresh head text
    ///
    /// Returns the view change, if the view text differs.
    pub fn reset(&mut self, head: TextRevision) -> Result<Option<Changeset>> {
        self.with_transaction(|history| {
            let old_view = history.state.view()?;
            history.state = HistoryState::new(head);
            let new_view = history.state.view()?;
            history.queue(HistoryEvent::ServerTailChanged);
            history.queue(HistoryEvent::ServerChanged);
            if new_view == old_view {
                return Ok(None);
            }

            let new_text = new_view
                .as_text()
                .ok_or_else(|| CollabError::changeset("head must be a text"))?;
            let len = old_view.output_len();
            let changeset = Changeset::replace(len, 0, len, &new_text)?;
            history.queue(HistoryEvent::ViewChanged {
                changeset: changeset.clone(),
            });
            Ok(Some(changeset))
        })
    }
}

impl std::fmt::Debug for CollabHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabHistory")
            .field("state", &self.state)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Strip;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn retain(start: usize, end: usize) -> Strip {
        Strip::Retain { start, end }
    }

    fn insert(text: &str) -> Strip {
        Strip::Insert(text.to_string())
    }

    fn type_at(history: &mut CollabHistory, at: usize, text: &str) {
        let len = history.view().unwrap().output_len();
        let mut strips = Vec::new();
        if at > 0 {
            strips.push(retain(0, at));
        }
        strips.push(insert(text));
        if at < len {
            strips.push(retain(at, len));
        }
        let changeset = Changeset::new(strips).unwrap();
        let end = at + text.chars().count();
        history
            .push_selection_changeset(changeset, SelectionRange::caret(at), SelectionRange::caret(end), PushOptions::default())
            .unwrap();
    }

    fn assert_decomposes(history: &CollabHistory) {
        let recomposed = history
            .server()
            .unwrap()
            .compose(&history.submitted().unwrap())
            .unwrap()
            .compose(&history.local().unwrap())
            .unwrap();
        assert_eq!(recomposed, history.view().unwrap());
    }

    #[test]
    fn test_push_submit_acknowledge() {
        let mut history = CollabHistory::new(TextRevision::new(4, "hello world"));
        type_at(&mut history, 11, "abc");
        assert!(history.can_submit_changes());

        let submitted = history.submit_changes().unwrap();
        assert_eq!(submitted.apply("hello world").unwrap(), "hello worldabc");
        assert!(!history.can_submit_changes());
        assert!(matches!(history.submit_changes(), Err(CollabError::Protocol(_))));
        assert_decomposes(&history);

        let record = RevisionRecord::new(5, submitted);
        history.submitted_changes_acknowledged(&record).unwrap();
        assert_eq!(history.server().unwrap().as_text().unwrap(), "hello worldabc");
        assert_eq!(history.state().server_revision(), 5);
        assert_decomposes(&history);
    }

    #[test]
    fn test_acknowledge_without_submission_fails() {
        let mut history = CollabHistory::new(TextRevision::new(0, ""));
        let record = RevisionRecord::new(1, Changeset::from_text("x"));
        assert!(matches!(
            history.submitted_changes_acknowledged(&record),
            Err(CollabError::Protocol(_))
        ));
    }

    #[test]
    fn test_noop_push_is_ignored() {
        let mut history = CollabHistory::new(TextRevision::new(0, "abc"));
        let pushed = history
            .push_selection_changeset(
                Changeset::identity(3),
                SelectionRange::caret(0),
                SelectionRange::caret(0),
                PushOptions::default(),
            )
            .unwrap();
        assert!(!pushed);
        assert!(history.records().is_empty());
    }

    #[test]
    fn test_push_rejects_oversized_edit() {
        let mut history = CollabHistory::new(TextRevision::new(0, "abc"));
        let result = history.push_selection_changeset(
            Changeset::identity(10),
            SelectionRange::caret(0),
            SelectionRange::caret(0),
            PushOptions::default(),
        );
        assert!(matches!(result, Err(CollabError::InvalidChangeset(_))));
    }

    #[test]
    fn test_undo_redo_inverse_law() {
        let mut history = CollabHistory::new(TextRevision::new(0, ""));
        let mut texts = vec![history.view_text().unwrap()];
        for (i, word) in ["one", " two", " three"].iter().enumerate() {
            let at = history.view().unwrap().output_len();
            type_at(&mut history, at, word);
            texts.push(history.view_text().unwrap());
            assert_eq!(texts.len(), i + 2);
        }

        for expected in texts.iter().rev().skip(1) {
            assert!(history.undo().unwrap());
            assert_eq!(&history.view_text().unwrap(), expected);
        }
        assert!(!history.undo().unwrap());

        for expected in texts.iter().skip(1) {
            assert!(history.redo().unwrap());
            assert_eq!(&history.view_text().unwrap(), expected);
        }
        assert!(!history.redo().unwrap());
        assert_decomposes(&history);
    }

    proptest::proptest! {
        #[test]
        fn undo_all_then_redo_all_walks_every_text(
            start in "[x-z]{0,5}",
            edits in proptest::collection::vec((0usize..8, 0usize..3, "[a-c]{0,2}"), 1..8),
            submit_after in 0usize..8,
        ) {
            let mut history = CollabHistory::new(TextRevision::new(0, &start));
            let mut texts = vec![history.view_text().unwrap()];

            for (i, (at, delete, text)) in edits.into_iter().enumerate() {
                let len = history.view().unwrap().output_len();
                let from = at % (len + 1);
                let to = (from + delete).min(len);
                let changeset = Changeset::replace(len, from, to, &text).unwrap();
                if changeset.apply(texts.last().unwrap()).unwrap() != *texts.last().unwrap() {
                    history
                        .push_selection_changeset(
                            changeset,
                            SelectionRange::new(from, to),
                            SelectionRange::caret(from + text.chars().count()),
                            PushOptions::default(),
                        )
                        .unwrap();
                    texts.push(history.view_text().unwrap());
                }
                if i == submit_after && history.can_submit_changes() {
                    history.submit_changes().unwrap();
                }
            }

            for expected in texts.iter().rev().skip(1) {
                proptest::prop_assert!(history.undo().unwrap());
                proptest::prop_assert_eq!(&history.view_text().unwrap(), expected);
            }
            proptest::prop_assert!(!history.undo().unwrap());

            for expected in texts.iter().skip(1) {
                proptest::prop_assert!(history.redo().unwrap());
                proptest::prop_assert_eq!(&history.view_text().unwrap(), expected);
            }
            proptest::prop_assert!(!history.redo().unwrap());
        }
    }

    #[test]
    fn test_squashed_edits_undo_together() {
        let mut history = CollabHistory::new(TextRevision::new(0, ""));
        type_at(&mut history, 0, "a");
        history.submit_changes().unwrap();

        let changeset = Changeset::new(vec![retain(0, 1), insert("b")]).unwrap();
        history
            .push_selection_changeset(
                changeset,
                SelectionRange::caret(1),
                SelectionRange::caret(2),
                PushOptions { squash: true },
            )
            .unwrap();
        let changeset = Changeset::new(vec![retain(0, 2), insert("c")]).unwrap();
        history
            .push_selection_changeset(
                changeset,
                SelectionRange::caret(2),
                SelectionRange::caret(3),
                PushOptions { squash: true },
            )
            .unwrap();

        // the second squash record merges into the first local one
        assert_eq!(history.records().len(), 2);

        // squash chains back to the submitted "a"
        assert!(history.undo().unwrap());
        assert_eq!(history.view_text().unwrap(), "");
        assert!(!history.undo().unwrap());

        assert!(history.redo().unwrap());
        assert_eq!(history.view_text().unwrap(), "abc");
        assert_decomposes(&history);
    }

    #[test]
    fn test_events_after_push() {
        let mut history = CollabHistory::new(TextRevision::new(0, ""));
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let _sub = history.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        type_at(&mut history, 0, "x");

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], HistoryEvent::LocalChanged);
        assert!(matches!(&log[1], HistoryEvent::ViewChanged { changeset } if changeset.as_text().as_deref() == Some("x")));
    }

    #[test]
    fn test_from_state_validates() {
        let mut history = CollabHistory::new(TextRevision::new(0, ""));
        type_at(&mut history, 0, "abc");

        let json = serde_json::to_string(history.state()).unwrap();
        let state: HistoryState = serde_json::from_str(&json).unwrap();
        let restored = CollabHistory::from_state(state).unwrap();
        assert_eq!(restored.view_text().unwrap(), "abc");

        let mut broken: serde_json::Value = serde_json::from_str(&json).unwrap();
        broken["submittedIndex"] = serde_json::json!(7);
        let state: HistoryState = serde_json::from_value(broken).unwrap();
        assert!(matches!(
            CollabHistory::from_state(state),
            Err(CollabError::InvariantViolation(_))
        ));
    }
}
