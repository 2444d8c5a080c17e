//! Buffered messages and the persisted service state

use serde::{Deserialize, Serialize};

use crate::history::HistoryState;
use crate::protocol::{Revision, RevisionRecord, SubmittedRecord};
use crate::sync::{BufferState, Versioned};

/// Authority message queued in revision order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "camelCase")]
pub enum ServiceMessage {
    /// The outstanding submission was committed
    Acknowledged(RevisionRecord),

    /// Another client's edit was committed
    External(RevisionRecord),
}

impl ServiceMessage {
    pub fn record(&self) -> &RevisionRecord {
        match self {
            ServiceMessage::Acknowledged(record) | ServiceMessage::External(record) => record,
        }
    }
}

impl Versioned for ServiceMessage {
    fn version(&self) -> Revision {
        self.record().revision
    }
}

/// Everything needed to resume a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    pub submitted_record: Option<SubmittedRecord>,
    pub records_buffer: BufferState<ServiceMessage>,
    pub history: HistoryState,
}
