//! Wire records exchanged with the authority
//!
//! The authority assigns every committed edit a strictly increasing
//! [`Revision`]. Clients receive [`RevisionRecord`]s (their own
//! acknowledgements and other clients' edits) and send a single outstanding
//! [`SubmittedRecord`] at a time.

pub mod serialize;

use crate::changeset::Changeset;
use crate::selection::SelectionRange;
use crate::sync::Versioned;
use serde::{Deserialize, Serialize};

pub use serialize::{decode_message, encode_message};

/// Authority-assigned sequence number of a committed edit
pub type Revision = u64;

/// A committed edit as delivered by the authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRecord {
    pub revision: Revision,

    /// Transforms the text at `revision - 1` into the text at `revision`
    pub changeset: Changeset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_selection: Option<SelectionRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_selection: Option<SelectionRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_user_id: Option<String>,

    /// Idempotency key chosen by the submitting client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_generated_id: Option<String>,
}

impl RevisionRecord {
    /// Bare record with no selection or provenance
    pub fn new(revision: Revision, changeset: Changeset) -> Self {
        Self {
            revision,
            changeset,
            before_selection: None,
            after_selection: None,
            creator_user_id: None,
            user_generated_id: None,
        }
    }

    pub fn has_selection(&self) -> bool {
        self.before_selection.is_some() || self.after_selection.is_some()
    }

    pub fn server_record(&self) -> ServerRecord {
        ServerRecord {
            revision: self.revision,
            changeset: self.changeset.clone(),
        }
    }
}

impl Versioned for RevisionRecord {
    fn version(&self) -> Revision {
        self.revision
    }
}

/// Full text at a revision (the changeset is a pure insertion)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRevision {
    pub revision: Revision,
    pub changeset: Changeset,
}

impl TextRevision {
    pub fn new(revision: Revision, text: &str) -> Self {
        Self {
            revision,
            changeset: Changeset::from_text(text),
        }
    }

    pub fn text(&self) -> Option<String> {
        self.changeset.as_text()
    }
}

/// `{revision, changeset}` pair cached on acknowledged history records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub revision: Revision,
    pub changeset: Changeset,
}

/// The single in-flight local submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedRecord {
    /// Idempotency key; a resend carries the same id
    pub user_generated_id: String,

    /// Revision the changeset was authored against
    pub base_revision: Revision,

    pub changeset: Changeset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_selection: Option<SelectionRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_selection: Option<SelectionRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_revision_record_wire_shape() {
        let record = RevisionRecord {
            revision: 7,
            changeset: Changeset::from_text("hi"),
            before_selection: None,
            after_selection: Some(SelectionRange::caret(2)),
            creator_user_id: Some("user-1".to_string()),
            user_generated_id: Some("abc".to_string()),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "revision": 7,
                "changeset": ["hi"],
                "afterSelection": {"start": 2},
                "creatorUserId": "user-1",
                "userGeneratedId": "abc"
            })
        );
    }

    #[test]
    fn test_revision_record_minimal_parse() {
        let record: RevisionRecord =
            serde_json::from_value(json!({"revision": 3, "changeset": [[0, 4], "!"]})).unwrap();
        assert_eq!(record.revision, 3);
        assert!(!record.has_selection());
        assert_eq!(record.changeset.apply("test").unwrap(), "test!");
    }
}
