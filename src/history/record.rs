//! History log entries

use serde::{Deserialize, Serialize};

use crate::changeset::Changeset;
use crate::protocol::{Revision, ServerRecord};
use crate::selection::SelectionRange;

/// Origin of a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Genuine local edit
    Execute,

    /// Absorbed foreign edit; transformable, never undoable
    Permanent,

    /// Generated by `undo()`
    Undo,

    /// Generated by `redo()`
    Redo,
}

/// One entry of the history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,

    pub changeset: Changeset,

    #[serde(default)]
    pub before_selection: SelectionRange,

    #[serde(default)]
    pub after_selection: SelectionRange,

    /// Undo/redo together with the preceding record
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub squash: bool,

    /// Acknowledged `{revision, changeset}` this record carries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_record: Option<ServerRecord>,
}

impl HistoryRecord {
    pub fn new(kind: RecordKind, changeset: Changeset, before: SelectionRange, after: SelectionRange) -> Self {
        Self {
            kind,
            changeset,
            before_selection: before,
            after_selection: after,
            squash: false,
            server_record: None,
        }
    }

    pub fn is_undoable(&self) -> bool {
        !matches!(self.kind, RecordKind::Permanent)
    }

    pub fn server_revision(&self) -> Option<Revision> {
        self.server_record.as_ref().map(|record| record.revision)
    }
}

/// Merge two server records that sit next to each other in the log
///
/// Records from consecutive revisions compose into one spanning both;
/// otherwise only the later one survives.
pub(crate) fn fold_server_records(earlier: ServerRecord, later: ServerRecord) -> ServerRecord {
    if earlier.revision + 1 == later.revision {
        if let Ok(changeset) = earlier.changeset.compose(&later.changeset) {
            return ServerRecord {
                revision: later.revision,
                changeset,
            };
        }
    }
    later
}
