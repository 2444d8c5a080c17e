//! Per-user view over a committed-record source
//!
//! History restore pulls a user's own older edits back into the local undo
//! stack. It talks to the authority through [`UserRecordsFacade`];
//! [`UserRecords`] implements the facade on top of any [`RecordSource`],
//! paging records newest-first and caching what it has fetched.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::debug;

use crate::config::CollabConfig;
use crate::error::{CollabError, Result};
use crate::protocol::{Revision, RevisionRecord, TextRevision};
use crate::records::revision::RevisionRecords;

/// Raw access to committed records (backed by the authority)
#[async_trait(?Send)]
pub trait RecordSource {
    async fn head_revision(&self) -> Result<Revision>;

    async fn text_at(&self, revision: Revision) -> Result<TextRevision>;

    /// Records with revisions in `start..=end`, oldest first. Revisions the
    /// source no longer holds are skipped.
    async fn records(&self, start: Revision, end: Revision) -> Result<Vec<RevisionRecord>>;
}

/// Reverse iterator over committed records
#[async_trait(?Send)]
pub trait RecordCursor {
    /// Next older record, or `None` when the source is exhausted
    async fn next(&mut self) -> Result<Option<RevisionRecord>>;
}

/// What history restore needs from the authority
#[async_trait(?Send)]
pub trait UserRecordsFacade {
    async fn get_text_at(&self, revision: Revision) -> Result<TextRevision>;

    async fn get_head_text(&self) -> Result<TextRevision>;

    /// Records at or before `head_revision`, newest first
    fn newest_records(&self, head_revision: Revision) -> Box<dyn RecordCursor + '_>;

    fn is_own_record(&self, record: &RevisionRecord) -> bool;

    /// Whether any own record exists strictly before `before_revision`
    async fn has_own_older_records(&self, before_revision: Revision) -> Result<bool>;
}

#[async_trait(?Send)]
impl RecordSource for RevisionRecords {
    async fn head_revision(&self) -> Result<Revision> {
        Ok(self.newest_revision())
    }

    async fn text_at(&self, revision: Revision) -> Result<TextRevision> {
        RevisionRecords::text_at(self, revision)
    }

    async fn records(&self, start: Revision, end: Revision) -> Result<Vec<RevisionRecord>> {
        Ok(self.range(start, end).to_vec())
    }
}

/// Caching [`UserRecordsFacade`] over a [`RecordSource`]
pub struct UserRecords<S> {
    source: S,
    user_id: String,
    page_size: usize,
    texts: RefCell<HashMap<Revision, TextRevision>>,
    records: RefCell<BTreeMap<Revision, RevisionRecord>>,
}

impl<S: RecordSource> UserRecords<S> {
    pub fn new(source: S, config: &CollabConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            user_id: config.user_id.clone(),
            page_size: config.restore_page_size,
            texts: RefCell::new(HashMap::new()),
            records: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Up to one page of records strictly before `before`, oldest first
    async fn page_before(&self, before: Revision) -> Result<Vec<RevisionRecord>> {
        if before == 0 {
            return Ok(Vec::new());
        }
        let start = before.saturating_sub(self.page_size as Revision);

        {
            let cached = self.records.borrow();
            let hits: Vec<RevisionRecord> = cached.range(start..before).map(|(_, r)| r.clone()).collect();
            if hits.len() as Revision == before - start {
                return Ok(hits);
            }
        }

        debug!(start, end = before - 1, "Fetching record page");
        let page = self.source.records(start, before - 1).await?;
        let mut cached = self.records.borrow_mut();
        for record in &page {
            if record.revision >= before {
                return Err(CollabError::Source(format!(
                    "source returned revision {} for a page ending at {}",
                    record.revision,
                    before - 1
                )));
            }
            cached.insert(record.revision, record.clone());
        }
        Ok(page)
    }
}

struct NewestFirst<'a, S> {
    facade: &'a UserRecords<S>,
    before: Revision,
    page: Vec<RevisionRecord>,
    exhausted: bool,
}

#[async_trait(?Send)]
impl<S: RecordSource> RecordCursor for NewestFirst<'_, S> {
    async fn next(&mut self) -> Result<Option<RevisionRecord>> {
        if self.page.is_empty() && !self.exhausted {
            let page = self.facade.page_before(self.before).await?;
            match page.first() {
                Some(oldest) => {
                    self.before = oldest.revision;
                    self.page = page;
                }
                None => self.exhausted = true,
            }
        }
        Ok(self.page.pop())
    }
}

#[async_trait(?Send)]
impl<S: RecordSource> UserRecordsFacade for UserRecords<S> {
    async fn get_text_at(&self, revision: Revision) -> Result<TextRevision> {
        if let Some(text) = self.texts.borrow().get(&revision) {
            return Ok(text.clone());
        }
        let text = self.source.text_at(revision).await?;
        if text.revision != revision || !text.changeset.is_text() {
            return Err(CollabError::Source(format!(
                "source returned no text for revision {}",
                revision
            )));
        }
        self.texts.borrow_mut().insert(revision, text.clone());
        Ok(text)
    }

    async fn get_head_text(&self) -> Result<TextRevision> {
        let head = self.source.head_revision().await?;
        self.get_text_at(head).await
    }

    fn newest_records(&self, head_revision: Revision) -> Box<dyn RecordCursor + '_> {
        Box::new(NewestFirst {
            facade: self,
            before: head_revision.saturating_add(1),
            page: Vec::new(),
            exhausted: false,
        })
    }

    fn is_own_record(&self, record: &RevisionRecord) -> bool {
        record.creator_user_id.as_deref() == Some(self.user_id.as_str())
    }

    async fn has_own_older_records(&self, before_revision: Revision) -> Result<bool> {
        if before_revision == 0 {
            return Ok(false);
        }
        let mut cursor = self.newest_records(before_revision - 1);
        while let Some(record) = cursor.next().await? {
            if self.is_own_record(&record) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
