//! Committed-record stores
//!
//! - `revision`: the authority's append-only log
//! - `user`: per-user facade used by history restore

pub mod revision;
pub mod user;

pub use revision::{InsertOutcome, InsertStep, RevisionRecords};
pub use user::{RecordCursor, RecordSource, UserRecords, UserRecordsFacade};
