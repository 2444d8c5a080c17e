//! Pulling older records back into the history
//!
//! Compacted or freshly loaded histories start at a tail revision with
//! nothing to undo. Restore walks the authority's records backwards from the
//! tail and splices them in front of the log: the user's own edits that
//! carry a selection become undoable `Execute` records, everything else
//! becomes `Permanent`. It repeats until enough own records are back or the
//! source has none left.

use tracing::debug;

use super::record::{HistoryRecord, RecordKind};
use super::state::Region;
use super::{CollabHistory, HistoryEvent};
use crate::error::{CollabError, Result};
use crate::protocol::{RevisionRecord, TextRevision};
use crate::records::UserRecordsFacade;

impl CollabHistory {
    /// Restore up to `desired_count` of the user's own older records
    ///
    /// Returns how many own records were restored. Each fetched batch is
    /// spliced in its own transaction, so an error leaves the batches already
    /// spliced in place.
    pub async fn restore_from_user_records<F>(&mut self, facade: &F, desired_count: usize) -> Result<usize>
    where
        F: UserRecordsFacade + ?Sized,
    {
        let mut restored = 0;

        while restored < desired_count {
            let tail_revision = self.state.server_tail_record.revision;
            if !facade.has_own_older_records(tail_revision + 1).await? {
                break;
            }

            let mut batch = Vec::new();
            let mut own = 0;
            {
                let mut cursor = facade.newest_records(tail_revision);
                while own < desired_count - restored {
                    let Some(record) = cursor.next().await? else {
                        break;
                    };
                    if facade.is_own_record(&record) && record.has_selection() {
                        own += 1;
                    }
                    batch.push((facade.is_own_record(&record), record));
                }
            }
            let Some((_, oldest)) = batch.last() else {
                break;
            };
            let Some(base_revision) = oldest.revision.checked_sub(1) else {
                return Err(CollabError::Source(
                    "source returned a record at revision 0".to_string(),
                ));
            };
            let base = facade.get_text_at(base_revision).await?;

            batch.reverse();
            self.with_transaction(|history| history.splice_restored(base, batch, own))?;
            restored += own;

            if own == 0 {
                break;
            }
        }

        debug!(restored, desired_count, "History restore finished");
        Ok(restored)
    }

    /// Put `records` (oldest first) in front of the log, with `base` as the
    /// new tail
    fn splice_restored(&mut self, base: TextRevision, records: Vec<(bool, RevisionRecord)>, own_count: usize) -> Result<()> {
        let tail = &self.state.server_tail_record;
        let mut expected_revision = base.revision + 1;
        let mut text = base.changeset.clone();
        for (_, record) in &records {
            if record.revision != expected_revision {
                return Err(CollabError::Source(format!(
                    "expected revision {}, source returned {}",
                    expected_revision, record.revision
                )));
            }
            text = text.compose(&record.changeset)?;
            expected_revision += 1;
        }
        if expected_revision != tail.revision + 1 || text != tail.changeset {
            return Err(CollabError::Source(format!(
                "restored records do not lead to the text at revision {}",
                tail.revision
            )));
        }

        let mut spliced: Vec<HistoryRecord> = records
            .into_iter()
            .map(|(is_own, record)| {
                let kind = if is_own && record.has_selection() {
                    RecordKind::Execute
                } else {
                    RecordKind::Permanent
                };
                let mut restored = HistoryRecord::new(
                    kind,
                    record.changeset.clone(),
                    record.before_selection.unwrap_or_default(),
                    record.after_selection.unwrap_or_default(),
                );
                restored.server_record = Some(record.server_record());
                restored
            })
            .collect();

        if let Some(transform) = self.state.server_to_local_history_transform.take() {
            spliced.push(HistoryRecord::new(
                RecordKind::Permanent,
                transform,
                Default::default(),
                Default::default(),
            ));
        }

        let added = spliced.len();
        spliced.append(&mut self.state.records);
        self.state.records = spliced;
        self.state.server_index += added;
        self.state.submitted_index += added;
        self.state.server_tail_record = base;

        debug!(
            added,
            own_count,
            tail = self.state.server_tail_record.revision,
            "Spliced restored records"
        );

        self.compact(Region::Server)?;
        self.state.refresh_last_executed();
        self.queue(HistoryEvent::ServerTailChanged);
        self.queue(HistoryEvent::RecordsRestored { own_count });
        Ok(())
    }
}
