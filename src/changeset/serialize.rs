//! Wire form of a changeset
//!
//! A serialized changeset is a JSON array mixing:
//! - integers: a single retained source index
//! - `[start, end]` pairs: a retained source range `[start, end)`
//! - strings: literal insertions
//!
//! ```text
//! [[0, 5], ", ", 5, [7, 11], "!"]
//! ```
//!
//! This is the only persisted and transmitted form of a `Changeset`.

use super::{Changeset, Strip};
use crate::error::{CollabError, Result};
use serde::{Deserialize, Serialize};

/// One element of a serialized changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedStrip {
    /// Single retained index `i`, shorthand for `[i, i + 1]`
    Index(usize),

    /// Retained range `[start, end)`
    Range([usize; 2]),

    /// Literal insertion
    Text(String),
}

/// Serialized changeset (see module docs)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedChangeset(pub Vec<SerializedStrip>);

impl From<&Changeset> for SerializedChangeset {
    fn from(changeset: &Changeset) -> Self {
        let strips = changeset
            .strips()
            .iter()
            .map(|strip| match strip {
                Strip::Retain { start, end } if end - start == 1 => SerializedStrip::Index(*start),
                Strip::Retain { start, end } => SerializedStrip::Range([*start, *end]),
                Strip::Insert(text) => SerializedStrip::Text(text.clone()),
            })
            .collect();
        SerializedChangeset(strips)
    }
}

impl From<Changeset> for SerializedChangeset {
    fn from(changeset: Changeset) -> Self {
        SerializedChangeset::from(&changeset)
    }
}

impl TryFrom<SerializedChangeset> for Changeset {
    type Error = CollabError;

    fn try_from(serialized: SerializedChangeset) -> Result<Self> {
        let strips = serialized
            .0
            .into_iter()
            .map(|strip| match strip {
                SerializedStrip::Index(index) => Strip::Retain {
                    start: index,
                    end: index + 1,
                },
                SerializedStrip::Range([start, end]) => Strip::Retain { start, end },
                SerializedStrip::Text(text) => Strip::Insert(text),
            })
            .collect();
        Changeset::new(strips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let cs = Changeset::new(vec![
            Strip::Retain { start: 0, end: 5 },
            Strip::Insert(", ".into()),
            Strip::Retain { start: 5, end: 6 },
            Strip::Retain { start: 7, end: 11 },
        ])
        .unwrap();

        let value = serde_json::to_value(&cs).unwrap();
        assert_eq!(value, json!([[0, 5], ", ", 5, [7, 11]]));
    }

    #[test]
    fn test_parse_wire_shape() {
        let cs: Changeset = serde_json::from_value(json!([[0, 2], "x", 4, [6, 8]])).unwrap();
        assert_eq!(cs.apply("abcdefgh").unwrap(), "abxegh");
    }

    #[test]
    fn test_parse_rejects_unordered_retains() {
        let result: std::result::Result<Changeset, _> = serde_json::from_value(json!([[4, 6], 1]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_elements() {
        let result: std::result::Result<Changeset, _> = serde_json::from_value(json!([[1, 2, 3]]));
        assert!(result.is_err());
        let result: std::result::Result<Changeset, _> = serde_json::from_value(json!([true]));
        assert!(result.is_err());
    }
}
