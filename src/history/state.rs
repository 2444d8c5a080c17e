//! Persistent history state and its derived slots
//!
//! The log is split by two cursors into three regions:
//!
//! ```text
//!  records: [ server .......... | submitted ....... | local ........ ]
//!            0            server_index      submitted_index      len
//! ```
//!
//! Text slots are never stored; they are composed on demand:
//! - `server    = tail ∘ transform ∘ records[..server_index]`
//! - `submitted = records[server_index..submitted_index]`
//! - `local     = records[submitted_index..]`
//! - `view      = server ∘ submitted ∘ local`

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::record::{fold_server_records, HistoryRecord, RecordKind};
use super::undo::replay;
use crate::changeset::Changeset;
use crate::error::{CollabError, Result};
use crate::protocol::{Revision, ServerRecord, TextRevision};

/// Log regions compaction may touch. The submitted region is in flight and
/// is never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Server,
    Local,
}

/// Serializable history snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    /// Oldest retained text and its revision
    pub(crate) server_tail_record: TextRevision,

    /// Bridges the tail text to the input of the first record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) server_to_local_history_transform: Option<Changeset>,

    pub(crate) records: Vec<HistoryRecord>,

    /// Number of acknowledged records
    pub(crate) server_index: usize,

    /// Number of acknowledged plus submitted records
    pub(crate) submitted_index: usize,

    /// Record the next undo targets
    #[serde(default)]
    pub(crate) last_executed_index: Option<usize>,
}

impl HistoryState {
    pub fn new(head: TextRevision) -> Self {
        Self {
            server_tail_record: head,
            server_to_local_history_transform: None,
            records: Vec::new(),
            server_index: 0,
            submitted_index: 0,
            last_executed_index: None,
        }
    }

    pub fn server_tail_record(&self) -> &TextRevision {
        &self.server_tail_record
    }

    pub fn server_to_local_history_transform(&self) -> Option<&Changeset> {
        self.server_to_local_history_transform.as_ref()
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn server_index(&self) -> usize {
        self.server_index
    }

    pub fn submitted_index(&self) -> usize {
        self.submitted_index
    }

    pub fn last_executed_index(&self) -> Option<usize> {
        self.last_executed_index
    }

    /// Newest revision known to the log
    pub fn server_revision(&self) -> Revision {
        self.records[..self.server_index]
            .iter()
            .rev()
            .find_map(HistoryRecord::server_revision)
            .unwrap_or(self.server_tail_record.revision)
    }

    /// Text the first record applies to
    pub fn base_text(&self) -> Result<Changeset> {
        let tail = &self.server_tail_record.changeset;
        match &self.server_to_local_history_transform {
            Some(transform) => tail.compose(transform),
            None => Ok(tail.clone()),
        }
    }

    /// Text before `records[index]` (or after the last record when
    /// `index == records.len()`)
    pub fn text_at(&self, index: usize) -> Result<Changeset> {
        let end = index.min(self.records.len());
        self.base_text()?
            .compose_all(self.records[..end].iter().map(|record| &record.changeset))
    }

    pub fn server(&self) -> Result<Changeset> {
        self.text_at(self.server_index)
    }

    pub fn submitted(&self) -> Result<Changeset> {
        let server = self.server()?;
        self.span(server.output_len(), self.server_index..self.submitted_index)
    }

    pub fn local(&self) -> Result<Changeset> {
        let submitted_text = self.text_at(self.submitted_index)?;
        self.span(submitted_text.output_len(), self.submitted_index..self.records.len())
    }

    pub fn view(&self) -> Result<Changeset> {
        self.text_at(self.records.len())
    }

    pub fn has_submitted_changes(&self) -> bool {
        self.submitted_index > self.server_index
    }

    pub fn has_local_changes(&self) -> bool {
        self.records.len() > self.submitted_index
    }

    /// Copy that keeps only the submitted and local records, with the
    /// acknowledged text as the new tail at `server_revision`
    pub fn compacted(&self, server_revision: Revision) -> Result<HistoryState> {
        let mut state = HistoryState {
            server_tail_record: TextRevision {
                revision: server_revision,
                changeset: self.server()?,
            },
            server_to_local_history_transform: None,
            records: self.records[self.server_index..].to_vec(),
            server_index: 0,
            submitted_index: self.submitted_index - self.server_index,
            last_executed_index: None,
        };
        state.refresh_last_executed();
        Ok(state)
    }

    /// Composition of `records[range]` applied to a text of `input_len`
    fn span(&self, input_len: usize, range: Range<usize>) -> Result<Changeset> {
        Changeset::identity(input_len)
            .compose_all(self.records[range].iter().map(|record| &record.changeset))
    }

    pub(crate) fn region_range(&self, region: Region) -> Range<usize> {
        match region {
            Region::Server => 0..self.server_index,
            Region::Local => self.submitted_index..self.records.len(),
        }
    }

    pub(crate) fn refresh_last_executed(&mut self) {
        self.last_executed_index = replay(&self.records).last_executed();
    }

    /// Remove a record, shifting the cursors, without touching its server
    /// record
    pub(crate) fn take_record(&mut self, index: usize) -> HistoryRecord {
        let record = self.records.remove(index);
        if index < self.server_index {
            self.server_index -= 1;
        }
        if index < self.submitted_index {
            self.submitted_index -= 1;
        }
        record
    }

    /// Remove a record, handing its server record to a neighbour in the
    /// same region
    pub(crate) fn remove_record(&mut self, index: usize, region: Region) -> HistoryRecord {
        let mut record = self.take_record(index);
        if let Some(server_record) = record.server_record.take() {
            self.fold_server_record(index, region, server_record);
        }
        record
    }

    /// Attach `server_record` (from a record just removed at `index`) to the
    /// next record in `region`, else the previous one
    pub(crate) fn fold_server_record(&mut self, index: usize, region: Region, server_record: ServerRecord) {
        let range = self.region_range(region);
        if index < range.end {
            let next = &mut self.records[index];
            next.server_record = Some(match next.server_record.take() {
                Some(existing) => fold_server_records(server_record, existing),
                None => server_record,
            });
        } else if index > range.start {
            let previous = &mut self.records[index - 1];
            previous.server_record = Some(match previous.server_record.take() {
                Some(existing) => fold_server_records(existing, server_record),
                None => server_record,
            });
        } else {
            tracing::debug!(
                revision = server_record.revision,
                "Dropping server record with no neighbour"
            );
        }
    }

    /// Validate every global invariant of the log
    pub(crate) fn check_invariants(&self) -> Result<()> {
        let len = self.records.len();
        if self.server_index > self.submitted_index || self.submitted_index > len {
            return Err(CollabError::invariant(format!(
                "cursors out of order: server {} submitted {} len {}",
                self.server_index, self.submitted_index, len
            )));
        }

        let tail = &self.server_tail_record;
        if !tail.changeset.is_text() {
            return Err(CollabError::invariant("server tail has unresolved retains"));
        }

        let mut text = tail.changeset.clone();
        if let Some(transform) = &self.server_to_local_history_transform {
            if !text.is_composable_with(transform) {
                return Err(CollabError::invariant("tail transform does not fit the tail"));
            }
            if transform.is_noop_after(&text) {
                return Err(CollabError::invariant("tail transform is a no-op"));
            }
            text = text.compose(transform)?;
        }

        let mut previous_server: Option<&ServerRecord> = None;
        for (index, record) in self.records.iter().enumerate() {
            if !text.is_composable_with(&record.changeset) {
                return Err(CollabError::invariant(format!(
                    "record {} does not compose onto its predecessor",
                    index
                )));
            }
            text = text.compose(&record.changeset)?;

            let in_server = index < self.server_index;
            if record.kind == RecordKind::Permanent && !in_server {
                return Err(CollabError::invariant(format!(
                    "permanent record {} outside the server region",
                    index
                )));
            }

            let Some(server_record) = &record.server_record else {
                continue;
            };
            if !in_server {
                return Err(CollabError::invariant(format!(
                    "record {} carries a server record outside the server region",
                    index
                )));
            }
            if server_record.revision <= tail.revision {
                return Err(CollabError::invariant(format!(
                    "server record {} is not newer than the tail",
                    server_record.revision
                )));
            }
            if let Some(previous) = previous_server {
                if server_record.revision <= previous.revision {
                    return Err(CollabError::invariant(format!(
                        "server record revisions not increasing: {} then {}",
                        previous.revision, server_record.revision
                    )));
                }
                if server_record.revision == previous.revision + 1
                    && !previous.changeset.is_composable_with(&server_record.changeset)
                {
                    return Err(CollabError::invariant(format!(
                        "server records {} and {} do not compose",
                        previous.revision, server_record.revision
                    )));
                }
            }
            previous_server = Some(server_record);
        }

        let expected = replay(&self.records).last_executed();
        if self.last_executed_index != expected {
            return Err(CollabError::invariant(format!(
                "last executed index {:?}, log replays to {:?}",
                self.last_executed_index, expected
            )));
        }

        Ok(())
    }
}
