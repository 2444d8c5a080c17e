//! SyncKit Collab - client-side collaboration core
//!
//! Operational-transform machinery for one client editing a shared text
//! against a central authority that assigns revisions. It implements:
//! - Text changesets with compose, inverse and follow (OT transform)
//! - Selection transformation through changesets
//! - In-order delivery of revision-numbered authority messages
//! - A self-compacting edit history with undo/redo that survives rebasing
//! - An authority-side revision log for in-process simulation
//!
//! # Examples
//!
//! ```rust
//! use synckit_collab::{CollabConfig, CollabService, SimpleTextEditor, TextRevision};
//!
//! let service = CollabService::new(CollabConfig::new("client-1"), TextRevision::new(0, "Hello")).unwrap();
//! let mut editor = SimpleTextEditor::new(service).unwrap();
//!
//! editor.insert(" World").unwrap();
//! assert_eq!(editor.text().unwrap(), "Hello World");
//!
//! editor.undo().unwrap();
//! assert_eq!(editor.text().unwrap(), "Hello");
//! ```

pub mod changeset;
pub mod config;
pub mod editor;
pub mod error;
pub mod events;
pub mod history;
pub mod protocol;
pub mod records;
pub mod selection;
pub mod service;
pub mod sync;

// Re-exports for convenience
pub use changeset::{Bias, Changeset, Strip};
pub use config::CollabConfig;
pub use editor::SimpleTextEditor;
pub use error::{CollabError, Result};
pub use history::{CollabHistory, HistoryEvent, PushOptions};
pub use protocol::{Revision, RevisionRecord, SubmittedRecord, TextRevision};
pub use records::{RevisionRecords, UserRecords};
pub use selection::SelectionRange;
pub use service::{CollabService, Delivery, ServiceEvent};
pub use sync::OrderedMessageBuffer;
