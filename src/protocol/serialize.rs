// Serialization layer - Convert wire records to/from bytes
//!
//! Transport is out of scope for this crate; these helpers give it a single
//! JSON encoding for every wire type so client and authority agree on the
//! bytes.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize any wire message to bytes
pub fn encode_message<M: Serialize>(msg: &M) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(msg)?)
}

/// Deserialize a wire message from bytes
pub fn decode_message<M: DeserializeOwned>(bytes: &[u8]) -> Result<M> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Changeset;
    use crate::error::CollabError;
    use crate::protocol::{RevisionRecord, SubmittedRecord};

    #[test]
    fn test_submitted_record_bytes() {
        let submitted = SubmittedRecord {
            user_generated_id: "id-1".to_string(),
            base_revision: 4,
            changeset: Changeset::from_text("abc"),
            before_selection: None,
            after_selection: None,
            creator_user_id: None,
        };

        let bytes = encode_message(&submitted).unwrap();
        let decoded: SubmittedRecord = decode_message(&bytes).unwrap();
        assert_eq!(decoded, submitted);
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<RevisionRecord> = decode_message(b"{not json");
        assert!(matches!(result, Err(CollabError::Serialization(_))));
    }
}
