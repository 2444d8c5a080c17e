//! CollabService: one client's collaboration endpoint
//!
//! Owns an [`OrderedMessageBuffer`] keyed by revision and a
//! [`CollabHistory`]. Authority messages (acknowledgements and foreign
//! edits) go through the buffer so the history always sees them in revision
//! order; local edits go straight to the history. At most one submission is
//! outstanding at a time.
//!
//! # Example
//!
//! ```rust
//! use synckit_collab::changeset::Changeset;
//! use synckit_collab::config::CollabConfig;
//! use synckit_collab::history::PushOptions;
//! use synckit_collab::protocol::{RevisionRecord, TextRevision};
//! use synckit_collab::selection::SelectionRange;
//! use synckit_collab::service::CollabService;
//!
//! let mut service = CollabService::new(CollabConfig::new("alice"), TextRevision::new(0, "hi")).unwrap();
//! let edit = Changeset::replace(2, 2, 2, "!").unwrap();
//! service
//!     .push_selection_changeset(edit, SelectionRange::caret(2), SelectionRange::caret(3), PushOptions::default())
//!     .unwrap();
//!
//! let submitted = service.submit_changes().unwrap();
//! let mut committed = RevisionRecord::new(1, submitted.changeset.clone());
//! committed.user_generated_id = Some(submitted.user_generated_id.clone());
//! service.submitted_changes_acknowledged(committed).unwrap();
//!
//! assert_eq!(service.view_text().unwrap(), "hi!");
//! assert_eq!(service.revision(), 1);
//! ```

mod state;

pub use state::{ServiceMessage, ServiceState};

use std::cell::OnceCell;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::changeset::Changeset;
use crate::config::CollabConfig;
use crate::error::{CollabError, Result};
use crate::events::{EventEmitter, Subscription};
use crate::history::{CollabHistory, PushOptions};
use crate::protocol::{Revision, RevisionRecord, SubmittedRecord, TextRevision};
use crate::records::UserRecordsFacade;
use crate::selection::SelectionRange;
use crate::sync::{OrderedMessageBuffer, Versioned};

/// Notifications emitted by [`CollabService`]
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// A submission was created or cleared
    SubmittedRecordChanged,

    /// Revisions `start..=end` must be fetched and redelivered
    MissingRevisions { start: Revision, end: Revision },

    /// `changeset` turns the previous view into the current one
    ViewChanged { changeset: Changeset },
}

/// Result of delivering an authority message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    /// False if the message was obsolete or already queued
    pub accepted: bool,

    /// View changes caused by the messages this delivery released, in order
    pub view_changes: Vec<Changeset>,

    /// Inclusive revision range still missing
    pub missing: Option<(Revision, Revision)>,
}

/// Collaboration endpoint for one document
pub struct CollabService {
    config: CollabConfig,
    buffer: OrderedMessageBuffer<ServiceMessage>,
    history: CollabHistory,
    submitted_record: Option<SubmittedRecord>,
    view_text: OnceCell<String>,
    events: EventEmitter<ServiceEvent>,
}

impl CollabService {
    /// Start from the head text at `head.revision`
    pub fn new(config: CollabConfig, head: TextRevision) -> Result<Self> {
        config.validate()?;
        if !head.changeset.is_text() {
            return Err(CollabError::changeset("head must be a text"));
        }
        Ok(Self {
            buffer: OrderedMessageBuffer::new(head.revision),
            history: CollabHistory::new(head),
            config,
            submitted_record: None,
            view_text: OnceCell::new(),
            events: EventEmitter::new(),
        })
    }

    /// Resume from a value produced by one of the `serialize_*` methods
    pub fn parse_value(config: CollabConfig, value: serde_json::Value) -> Result<Self> {
        config.validate()?;
        let state: ServiceState = serde_json::from_value(value)?;

        let history = CollabHistory::from_state(state.history)?;
        if state.submitted_record.is_some() != history.has_submitted_changes() {
            return Err(CollabError::invariant(
                "submitted record does not match the submitted history region",
            ));
        }

        Ok(Self {
            config,
            buffer: OrderedMessageBuffer::from_state(state.records_buffer),
            history,
            submitted_record: state.submitted_record,
            view_text: OnceCell::new(),
            events: EventEmitter::new(),
        })
    }

    /// Persist everything, including acknowledged history
    pub fn serialize_lossless(&self) -> Result<serde_json::Value> {
        self.serialize_with(self.history.state().clone())
    }

    /// Persist without acknowledged history; undo cannot reach past it
    /// until restored
    pub fn serialize_compact(&self) -> Result<serde_json::Value> {
        self.serialize_with(self.history.state().compacted(self.buffer.version())?)
    }

    fn serialize_with(&self, history: crate::history::HistoryState) -> Result<serde_json::Value> {
        let state = ServiceState {
            submitted_record: self.submitted_record.clone(),
            records_buffer: self.buffer.state(),
            history,
        };
        Ok(serde_json::to_value(state)?)
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }

    pub fn history(&self) -> &CollabHistory {
        &self.history
    }

    /// Newest revision applied to the server text
    pub fn revision(&self) -> Revision {
        self.buffer.version()
    }

    /// Fails with `CollabError::MissingData` while delivered revisions wait
    /// on a gap
    pub fn ensure_complete(&self) -> Result<()> {
        match self.buffer.missing_versions() {
            Some((start, end)) => Err(CollabError::MissingData { start, end }),
            None => Ok(()),
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ServiceEvent) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    pub fn server(&self) -> Result<Changeset> {
        self.history.server()
    }

    pub fn submitted(&self) -> Result<Changeset> {
        self.history.submitted()
    }

    pub fn local(&self) -> Result<Changeset> {
        self.history.local()
    }

    pub fn view(&self) -> Result<Changeset> {
        self.history.view()
    }

    /// Current view as a string, cached until the view changes
    pub fn view_text(&self) -> Result<&str> {
        if let Some(text) = self.view_text.get() {
            return Ok(text);
        }
        let text = self.history.view_text()?;
        Ok(self.view_text.get_or_init(|| text))
    }

    /// The outstanding submission, for resending after a dropped
    /// acknowledgement
    pub fn submitted_record(&self) -> Option<&SubmittedRecord> {
        self.submitted_record.as_ref()
    }

    pub fn can_submit_changes(&self) -> bool {
        self.submitted_record.is_none() && self.history.can_submit_changes()
    }

    pub fn push_selection_changeset(
        &mut self,
        changeset: Changeset,
        before_selection: SelectionRange,
        after_selection: SelectionRange,
        options: PushOptions,
    ) -> Result<bool> {
        let view_change = changeset.clone();
        let pushed = self
            .history
            .push_selection_changeset(changeset, before_selection, after_selection, options)?;
        if pushed {
            self.view_changed(view_change);
        }
        Ok(pushed)
    }

    pub fn undo(&mut self) -> Result<bool> {
        Ok(self.undo_view_change()?.is_some())
    }

    pub fn redo(&mut self) -> Result<bool> {
        Ok(self.redo_view_change()?.is_some())
    }

    pub(crate) fn undo_view_change(&mut self) -> Result<Option<Changeset>> {
        let change = self.history.undo_view_change()?;
        Ok(self.step_finished(change))
    }

    pub(crate) fn redo_view_change(&mut self) -> Result<Option<Changeset>> {
        let change = self.history.redo_view_change()?;
        Ok(self.step_finished(change))
    }

    fn step_finished(&mut self, change: Option<Changeset>) -> Option<Changeset> {
        if let Some(change) = &change {
            self.view_changed(change.clone());
        }
        change
    }

    /// Submit every local change
    ///
    /// # Errors
    ///
    /// `CollabError::Protocol` if a submission is outstanding or there are no
    /// local changes.
    pub fn submit_changes(&mut self) -> Result<SubmittedRecord> {
        if self.submitted_record.is_some() {
            return Err(CollabError::protocol("a submission is already outstanding"));
        }

        let changeset = self.history.submit_changes()?;
        let state = self.history.state();
        let region = &state.records()[state.server_index()..state.submitted_index()];

        let submitted = SubmittedRecord {
            user_generated_id: Uuid::new_v4().to_string(),
            base_revision: self.buffer.version(),
            changeset,
            before_selection: region.first().map(|record| record.before_selection),
            after_selection: region.last().map(|record| record.after_selection),
            creator_user_id: Some(self.config.user_id.clone()),
        };

        debug!(
            id = %submitted.user_generated_id,
            base = submitted.base_revision,
            "Created submission"
        );
        self.submitted_record = Some(submitted.clone());
        self.events.emit(&ServiceEvent::SubmittedRecordChanged);
        Ok(submitted)
    }

    /// Deliver the authority's acknowledgement of the outstanding submission
    pub fn submitted_changes_acknowledged(&mut self, record: RevisionRecord) -> Result<Delivery> {
        self.deliver(ServiceMessage::Acknowledged(record))
    }

    /// Deliver another client's committed edit
    pub fn handle_external_change(&mut self, record: RevisionRecord) -> Result<Delivery> {
        self.deliver(ServiceMessage::External(record))
    }

    fn deliver(&mut self, message: ServiceMessage) -> Result<Delivery> {
        let outcome = self.buffer.add(message);
        let mut delivery = Delivery {
            accepted: outcome.accepted,
            view_changes: Vec::new(),
            missing: outcome.missing,
        };

        let mut drained = outcome.drained.into_iter();
        while let Some(message) = drained.next() {
            let revision = message.version();
            match self.apply(message) {
                Ok(Some(change)) => delivery.view_changes.push(change),
                Ok(None) => {}
                Err(err) => {
                    // the failed revision must be redelivered; keep the rest queued
                    warn!(revision, error = %err, "Failed to apply revision");
                    self.buffer.set_version(revision - 1);
                    for rest in drained {
                        self.buffer.add(rest);
                    }
                    self.emit_view_changes(&delivery.view_changes);
                    return Err(err);
                }
            }
        }

        if let Some((start, end)) = delivery.missing {
            self.events.emit(&ServiceEvent::MissingRevisions { start, end });
        }
        self.emit_view_changes(&delivery.view_changes);
        Ok(delivery)
    }

    fn apply(&mut self, message: ServiceMessage) -> Result<Option<Changeset>> {
        match message {
            ServiceMessage::Acknowledged(record) => {
                self.acknowledge(&record)?;
                Ok(None)
            }
            ServiceMessage::External(record) if self.is_own_echo(&record) => {
                debug!(revision = record.revision, "External record echoes own submission");
                self.acknowledge(&record)?;
                Ok(None)
            }
            ServiceMessage::External(record) => {
                let change = self.history.handle_external_change(&record)?;
                self.view_text.take();
                Ok(Some(change))
            }
        }
    }

    fn is_own_echo(&self, record: &RevisionRecord) -> bool {
        match (&self.submitted_record, &record.user_generated_id) {
            (Some(submitted), Some(id)) => submitted.user_generated_id == *id,
            _ => false,
        }
    }

    fn acknowledge(&mut self, record: &RevisionRecord) -> Result<()> {
        let Some(submitted) = &self.submitted_record else {
            return Err(CollabError::protocol(format!(
                "acknowledgement for revision {} with nothing outstanding",
                record.revision
            )));
        };
        if let Some(id) = &record.user_generated_id {
            if *id != submitted.user_generated_id {
                return Err(CollabError::protocol(format!(
                    "acknowledgement {} does not match submission {}",
                    id, submitted.user_generated_id
                )));
            }
        }

        self.history.submitted_changes_acknowledged(record)?;
        self.submitted_record = None;
        self.events.emit(&ServiceEvent::SubmittedRecordChanged);
        Ok(())
    }

    /// Pull up to `count` of the user's own older edits back into history
    pub async fn history_restore<F>(&mut self, facade: &F, count: usize) -> Result<usize>
    where
        F: UserRecordsFacade + ?Sized,
    {
        self.history.restore_from_user_records(facade, count).await
    }

    /// Replace the document with a fresh head text
    ///
    /// # Errors
    ///
    /// `CollabError::Protocol` while submitted or local changes exist.
    pub fn replace_head_text(&mut self, head: TextRevision) -> Result<()> {
        if self.submitted_record.is_some()
            || self.history.has_submitted_changes()
            || self.history.has_local_changes()
        {
            return Err(CollabError::protocol(
                "cannot replace head text while changes are pending",
            ));
        }
        if !head.changeset.is_text() {
            return Err(CollabError::changeset("head must be a text"));
        }

        let revision = head.revision;
        let change = self.history.reset(head)?;
        self.buffer.set_version(revision);
        debug!(revision, "Replaced head text");

        if let Some(change) = change {
            self.view_changed(change);
        }
        Ok(())
    }

    fn view_changed(&mut self, changeset: Changeset) {
        self.view_text.take();
        self.events.emit(&ServiceEvent::ViewChanged { changeset });
    }

    fn emit_view_changes(&mut self, changes: &[Changeset]) {
        for change in changes {
            self.events.emit(&ServiceEvent::ViewChanged {
                changeset: change.clone(),
            });
        }
    }
}

impl std::fmt::Debug for CollabService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabService")
            .field("user_id", &self.config.user_id)
            .field("revision", &self.buffer.version())
            .field("submitted_record", &self.submitted_record)
            .field("history", &self.history)
            .finish()
    }
}
