//! Authority-side revision log
//!
//! `RevisionRecords` is an append-only list of committed edits with
//! consecutive revisions. A submission authored against an older revision is
//! walked forward through every newer stored record before it is committed,
//! so concurrent submissions never overwrite each other. The walk also
//! detects a resend of an already committed submission by its
//! `user_generated_id`.

use tracing::{debug, trace, warn};

use crate::changeset::{Bias, Changeset};
use crate::error::{CollabError, Result};
use crate::protocol::{Revision, RevisionRecord, SubmittedRecord, TextRevision};

/// Decision of one walk step in [`RevisionRecords::insert_with`]
#[derive(Debug, Clone, PartialEq)]
pub enum InsertStep {
    /// Candidate rebased past the stored record
    Continue(SubmittedRecord),

    /// Candidate is a resend of the stored record
    Duplicate,
}

/// Result of inserting a submission
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Committed as a new revision
    Inserted(RevisionRecord),

    /// Already committed; the existing record is returned unchanged
    Duplicate(RevisionRecord),
}

impl InsertOutcome {
    pub fn record(&self) -> &RevisionRecord {
        match self {
            InsertOutcome::Inserted(record) | InsertOutcome::Duplicate(record) => record,
        }
    }

    pub fn into_record(self) -> RevisionRecord {
        match self {
            InsertOutcome::Inserted(record) | InsertOutcome::Duplicate(record) => record,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, InsertOutcome::Duplicate(_))
    }
}

/// Committed-edit log keyed by consecutive revisions
#[derive(Debug, Clone)]
pub struct RevisionRecords {
    /// Oldest retained text; records start at `tail.revision + 1`
    tail: TextRevision,
    records: Vec<RevisionRecord>,
    head_text: Changeset,
}

impl RevisionRecords {
    /// Start a log from the text at `initial.revision`
    pub fn new(initial: TextRevision) -> Result<Self> {
        if !initial.changeset.is_text() {
            return Err(CollabError::changeset("initial revision must be a text"));
        }
        Ok(Self {
            head_text: initial.changeset.clone(),
            tail: initial,
            records: Vec::new(),
        })
    }

    pub fn from_text(revision: Revision, text: &str) -> Self {
        let tail = TextRevision::new(revision, text);
        Self {
            head_text: tail.changeset.clone(),
            tail,
            records: Vec::new(),
        }
    }

    pub fn tail_revision(&self) -> Revision {
        self.tail.revision
    }

    pub fn newest_revision(&self) -> Revision {
        self.tail.revision + self.records.len() as Revision
    }

    pub fn records(&self) -> &[RevisionRecord] {
        &self.records
    }

    /// Position of `revision` in [`records`](Self::records)
    pub fn revision_to_index(&self, revision: Revision) -> Option<usize> {
        let offset = revision.checked_sub(self.tail.revision + 1)?;
        let index = usize::try_from(offset).ok()?;
        (index < self.records.len()).then_some(index)
    }

    pub fn get(&self, revision: Revision) -> Option<&RevisionRecord> {
        self.revision_to_index(revision).map(|index| &self.records[index])
    }

    /// Stored records with revisions in `start..=end`, clamped to the log
    pub fn range(&self, start: Revision, end: Revision) -> &[RevisionRecord] {
        let first = self.tail.revision + 1;
        let start = start.max(first);
        let end = end.min(self.newest_revision());
        if start > end {
            return &[];
        }
        let from = (start - first) as usize;
        let to = (end - first) as usize + 1;
        &self.records[from..to]
    }

    pub fn head_text(&self) -> TextRevision {
        TextRevision {
            revision: self.newest_revision(),
            changeset: self.head_text.clone(),
        }
    }

    /// Text as of `revision`
    pub fn text_at(&self, revision: Revision) -> Result<TextRevision> {
        if revision == self.newest_revision() {
            return Ok(self.head_text());
        }
        if revision < self.tail.revision || revision > self.newest_revision() {
            return Err(CollabError::protocol(format!(
                "revision {} outside retained range {}..={}",
                revision,
                self.tail.revision,
                self.newest_revision()
            )));
        }
        let count = (revision - self.tail.revision) as usize;
        let changeset = self
            .tail
            .changeset
            .compose_all(self.records[..count].iter().map(|record| &record.changeset))?;
        Ok(TextRevision { revision, changeset })
    }

    /// Commit a submission, rebasing it with `Changeset::follow` past every
    /// newer record and detecting resends by `user_generated_id`
    pub fn insert(&mut self, candidate: SubmittedRecord) -> Result<InsertOutcome> {
        self.insert_with(candidate, |stored, mut candidate| {
            if stored.user_generated_id.as_deref() == Some(candidate.user_generated_id.as_str()) {
                return Ok(InsertStep::Duplicate);
            }

            let rebased = stored.changeset.follow(&candidate.changeset);
            let passed = candidate
                .changeset
                .follow_with_bias(&stored.changeset, Bias::After);
            candidate.before_selection = candidate
                .before_selection
                .map(|selection| selection.follow(&stored.changeset, Bias::Before));
            candidate.after_selection = candidate
                .after_selection
                .map(|selection| selection.follow(&passed, Bias::Before));
            candidate.changeset = rebased;
            Ok(InsertStep::Continue(candidate))
        })
    }

    /// Commit a submission using a custom per-step transform
    ///
    /// `transform` is called for each stored record newer than the
    /// candidate's base revision, oldest first, and returns the rebased
    /// candidate or flags it a duplicate of that record.
    ///
    /// # Errors
    ///
    /// Returns `CollabError::Protocol` if the base revision is older than the
    /// retained log or newer than its head, and `InvalidChangeset` if the
    /// rebased changeset does not apply to the head text.
    pub fn insert_with<F>(&mut self, candidate: SubmittedRecord, mut transform: F) -> Result<InsertOutcome>
    where
        F: FnMut(&RevisionRecord, SubmittedRecord) -> Result<InsertStep>,
    {
        let base = candidate.base_revision;
        if base < self.tail.revision {
            return Err(CollabError::protocol(format!(
                "base revision {} is older than retained revision {}",
                base, self.tail.revision
            )));
        }
        if base > self.newest_revision() {
            return Err(CollabError::protocol(format!(
                "base revision {} is newer than head revision {}",
                base,
                self.newest_revision()
            )));
        }

        let first_newer = (base - self.tail.revision) as usize;
        let mut candidate = candidate;
        for stored in &self.records[first_newer..] {
            trace!(revision = stored.revision, "Rebasing submission past stored record");
            match transform(stored, candidate)? {
                InsertStep::Continue(next) => candidate = next,
                InsertStep::Duplicate => {
                    warn!(
                        revision = stored.revision,
                        "Duplicate resubmission; returning committed record"
                    );
                    return Ok(InsertOutcome::Duplicate(stored.clone()));
                }
            }
        }

        let head_text = self.head_text.compose(&candidate.changeset)?;
        let record = RevisionRecord {
            revision: self.newest_revision() + 1,
            changeset: candidate.changeset,
            before_selection: candidate.before_selection,
            after_selection: candidate.after_selection,
            creator_user_id: candidate.creator_user_id,
            user_generated_id: Some(candidate.user_generated_id),
        };

        debug!(revision = record.revision, base, "Committed record");
        self.head_text = head_text;
        self.records.push(record.clone());
        Ok(InsertOutcome::Inserted(record))
    }
}
