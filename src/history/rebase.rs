//! Rebasing pending records past a foreign edit
//!
//! A foreign edit is committed before anything this client has not had
//! acknowledged. It enters the log as a `Permanent` record at the server
//! cursor, and every submitted and local record after it is rewritten to
//! apply on top of it:
//!
//! ```text
//! before:  [server] r1 r2 r3
//! after:   [server] P  r1' r2' r3'      r1' = F.follow(r1)
//!                                       F'  = r1.follow_with_bias(F, After)
//! ```
//!
//! `F` starts as the foreign changeset and ends as the foreign edit
//! expressed against the old view, which is exactly the view change.

use tracing::{debug, trace};

use super::record::{HistoryRecord, RecordKind};
use super::state::Region;
use super::{CollabHistory, HistoryEvent};
use crate::changeset::{Bias, Changeset};
use crate::error::{CollabError, Result};
use crate::protocol::RevisionRecord;

impl CollabHistory {
    /// Apply a foreign edit committed by the authority
    ///
    /// Returns the changeset that turned the previous view into the current
    /// one.
    pub fn handle_external_change(&mut self, record: &RevisionRecord) -> Result<Changeset> {
        self.with_transaction(|history| history.rebase_onto(record))
    }

    fn rebase_onto(&mut self, record: &RevisionRecord) -> Result<Changeset> {
        let server = self.state.server()?;
        if !server.is_composable_with(&record.changeset) {
            return Err(CollabError::changeset(format!(
                "revision {} requires {} chars, server text has {}",
                record.revision,
                record.changeset.required_input_len(),
                server.output_len()
            )));
        }

        let at = self.state.server_index;
        let mut running = record.changeset.clone();

        for index in at..self.state.records.len() {
            let pending = &mut self.state.records[index];
            let passed = pending.changeset.follow_with_bias(&running, Bias::After);

            // Keep a caret on the far side of foreign text only where this
            // record's own insertion sits at the caret
            let source = &pending.changeset;
            pending.before_selection = pending.before_selection.follow_with(&running, |p| {
                if source.inserts_at_source(p) {
                    Bias::After
                } else {
                    Bias::Before
                }
            });
            pending.after_selection = pending.after_selection.follow_with(&passed, |q| {
                if source.insert_starts_at_output(q) {
                    Bias::After
                } else {
                    Bias::Before
                }
            });
            pending.changeset = running.follow(&pending.changeset);

            trace!(index, "Rebased pending record");
            running = passed;
        }

        let mut permanent = HistoryRecord::new(
            RecordKind::Permanent,
            record.changeset.clone(),
            record.before_selection.unwrap_or_default(),
            record.after_selection.unwrap_or_default(),
        );
        permanent.server_record = Some(record.server_record());
        self.state.records.insert(at, permanent);
        self.state.server_index += 1;
        self.state.submitted_index += 1;

        debug!(
            revision = record.revision,
            rebased = self.state.records.len() - self.state.server_index,
            "Applied external change"
        );

        self.compact(Region::Server)?;
        self.compact(Region::Local)?;
        self.state.refresh_last_executed();

        self.queue(HistoryEvent::ServerChanged);
        if self.state.has_submitted_changes() {
            self.queue(HistoryEvent::SubmittedChanged);
        }
        if self.state.has_local_changes() {
            self.queue(HistoryEvent::LocalChanged);
        }
        self.queue(HistoryEvent::ViewChanged {
            changeset: running.clone(),
        });
        Ok(running)
    }
}
