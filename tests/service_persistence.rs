//! Saving and resuming a client mid-session

use serde_json::json;
use synckit_collab::history::PushOptions;
use synckit_collab::{
    Changeset, CollabConfig, CollabError, CollabService, RevisionRecord, SelectionRange,
    TextRevision,
};

fn config() -> CollabConfig {
    CollabConfig::new("alice")
}

fn append(service: &mut CollabService, text: &str) {
    let len = service.view().unwrap().output_len();
    let changeset = Changeset::replace(len, len, len, text).unwrap();
    service
        .push_selection_changeset(
            changeset,
            SelectionRange::caret(len),
            SelectionRange::caret(len + text.chars().count()),
            PushOptions::default(),
        )
        .unwrap();
}

#[test]
fn lossless_round_trip_keeps_everything() {
    let mut service = CollabService::new(config(), TextRevision::new(10, "doc")).unwrap();
    append(&mut service, " one");
    let submitted = service.submit_changes().unwrap();
    append(&mut service, " two");

    // revision 12 arrives before 11 and waits in the buffer
    let early = RevisionRecord::new(12, Changeset::replace(7, 0, 0, "#").unwrap());
    service.handle_external_change(early).unwrap();

    let saved = service.serialize_lossless().unwrap();
    let mut resumed = CollabService::parse_value(config(), saved.clone()).unwrap();

    assert_eq!(resumed.view_text().unwrap(), "doc one two");
    assert_eq!(resumed.submitted_record(), Some(&submitted));
    assert_eq!(resumed.revision(), 10);
    assert_eq!(resumed.serialize_lossless().unwrap(), saved);

    let mut ack = RevisionRecord::new(11, submitted.changeset.clone());
    ack.user_generated_id = Some(submitted.user_generated_id.clone());
    let delivery = resumed.submitted_changes_acknowledged(ack).unwrap();

    // the stashed revision 12 drains right behind the acknowledgement
    assert_eq!(delivery.view_changes.len(), 1);
    assert_eq!(resumed.revision(), 12);
    assert_eq!(resumed.view_text().unwrap(), "#doc one two");
    assert_eq!(resumed.server().unwrap().as_text().unwrap(), "#doc one");
}

#[test]
fn compact_serialization_drops_acknowledged_history() {
    let mut service = CollabService::new(config(), TextRevision::new(0, "")).unwrap();
    append(&mut service, "a");
    let submitted = service.submit_changes().unwrap();
    let mut ack = RevisionRecord::new(1, submitted.changeset.clone());
    ack.user_generated_id = Some(submitted.user_generated_id.clone());
    service.submitted_changes_acknowledged(ack).unwrap();
    append(&mut service, "b");

    let lossless = service.serialize_lossless().unwrap();
    let compact = service.serialize_compact().unwrap();
    assert_eq!(lossless["history"]["records"].as_array().unwrap().len(), 2);
    assert_eq!(compact["history"]["records"].as_array().unwrap().len(), 1);
    assert_eq!(compact["history"]["serverTailRecord"]["revision"], json!(1));

    let mut resumed = CollabService::parse_value(config(), compact).unwrap();
    assert_eq!(resumed.view_text().unwrap(), "ab");

    // the local edit is still undoable, the acknowledged one is gone
    assert!(resumed.undo().unwrap());
    assert_eq!(resumed.view_text().unwrap(), "a");
    assert!(!resumed.undo().unwrap());
}

#[test]
fn parse_rejects_inconsistent_state() {
    let mut service = CollabService::new(config(), TextRevision::new(0, "x")).unwrap();
    append(&mut service, "y");
    service.submit_changes().unwrap();

    let mut saved = service.serialize_lossless().unwrap();
    saved["submittedRecord"] = json!(null);
    assert!(matches!(
        CollabService::parse_value(config(), saved),
        Err(CollabError::InvariantViolation(_))
    ));

    assert!(matches!(
        CollabService::parse_value(config(), json!({"history": 3})),
        Err(CollabError::Serialization(_))
    ));
}

#[test]
fn resend_after_dropped_acknowledgement_is_idempotent() {
    use synckit_collab::records::InsertOutcome;
    use synckit_collab::RevisionRecords;

    let mut authority = RevisionRecords::from_text(0, "");
    let mut service = CollabService::new(config(), TextRevision::new(0, "")).unwrap();
    append(&mut service, "hi");
    let submitted = service.submit_changes().unwrap();

    let first = authority.insert(submitted.clone()).unwrap();
    assert!(!first.is_duplicate());

    // acknowledgement lost; the client resends the same record
    let resent = service.submitted_record().cloned().unwrap();
    let second = authority.insert(resent).unwrap();
    assert!(matches!(second, InsertOutcome::Duplicate(_)));
    assert_eq!(authority.newest_revision(), 1);

    service
        .submitted_changes_acknowledged(second.into_record())
        .unwrap();
    assert!(service.submitted_record().is_none());
    assert_eq!(service.view_text().unwrap(), "hi");
}
