//! Restoring undo history from the authority's committed records

use futures::executor::block_on;
use synckit_collab::history::{HistoryEvent, RecordKind};
use synckit_collab::protocol::SubmittedRecord;
use synckit_collab::records::RecordSource;
use synckit_collab::{
    Changeset, CollabConfig, CollabError, CollabHistory, CollabService, Revision, RevisionRecord,
    RevisionRecords, SelectionRange, TextRevision, UserRecords,
};

fn commit(log: &mut RevisionRecords, user: &str, text: &str) {
    let head = log.head_text();
    let len = head.changeset.output_len();
    let id = format!("{}-{}", user, head.revision + 1);
    log.insert(SubmittedRecord {
        user_generated_id: id,
        base_revision: head.revision,
        changeset: Changeset::replace(len, len, len, text).unwrap(),
        before_selection: Some(SelectionRange::caret(len)),
        after_selection: Some(SelectionRange::caret(len + text.chars().count())),
        creator_user_id: Some(user.to_string()),
    })
    .unwrap();
}

/// "one" by alice, " two" by bob, " three" by alice
fn authority() -> RevisionRecords {
    let mut log = RevisionRecords::from_text(0, "");
    commit(&mut log, "alice", "one");
    commit(&mut log, "bob", " two");
    commit(&mut log, "alice", " three");
    log
}

fn alice() -> CollabConfig {
    CollabConfig::new("alice")
}

#[test]
fn restores_only_as_many_own_records_as_asked() {
    let log = authority();
    let facade = UserRecords::new(log.clone(), &alice()).unwrap();
    let mut service = CollabService::new(alice(), log.head_text()).unwrap();
    assert!(!service.undo().unwrap());

    let restored = block_on(service.history_restore(&facade, 1)).unwrap();
    assert_eq!(restored, 1);
    assert_eq!(service.history().state().server_tail_record().revision, 2);

    assert!(service.undo().unwrap());
    assert_eq!(service.view_text().unwrap(), "one two");
    assert!(!service.undo().unwrap());
}

#[test]
fn foreign_records_stay_permanent() {
    let log = authority();
    let facade = UserRecords::new(log.clone(), &alice()).unwrap();
    let mut service = CollabService::new(alice(), log.head_text()).unwrap();

    let restored = block_on(service.history_restore(&facade, 5)).unwrap();
    assert_eq!(restored, 2);
    assert!(service
        .history()
        .records()
        .iter()
        .all(|record| record.kind != RecordKind::Undo));

    assert!(service.undo().unwrap());
    assert_eq!(service.view_text().unwrap(), "one two");
    assert!(service.undo().unwrap());
    assert_eq!(service.view_text().unwrap(), " two");
    assert!(!service.undo().unwrap());

    assert!(service.redo().unwrap());
    assert_eq!(service.view_text().unwrap(), "one two");
    assert_eq!(service.server().unwrap().as_text().unwrap(), "one two three");
}

#[test]
fn restore_emits_events_after_commit() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let log = authority();
    let facade = UserRecords::new(log.clone(), &alice()).unwrap();
    let mut history = CollabHistory::new(log.head_text());

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let _sub = history.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    block_on(history.restore_from_user_records(&facade, 1)).unwrap();

    let events = events.borrow();
    assert!(events.contains(&HistoryEvent::ServerTailChanged));
    assert!(events.contains(&HistoryEvent::RecordsRestored { own_count: 1 }));
    assert_eq!(history.view_text().unwrap(), "one two three");
}

#[test]
fn nothing_to_restore_for_a_user_without_records() {
    let log = authority();
    let carol = CollabConfig::new("carol");
    let facade = UserRecords::new(log.clone(), &carol).unwrap();
    let mut service = CollabService::new(carol, log.head_text()).unwrap();

    let restored = block_on(service.history_restore(&facade, 3)).unwrap();
    assert_eq!(restored, 0);
    assert!(service.history().records().is_empty());
}

#[test]
fn mismatched_source_is_rejected_and_rolled_back() {
    let log = authority();
    let facade = UserRecords::new(log.clone(), &alice()).unwrap();
    let mut service = CollabService::new(alice(), TextRevision::new(3, "something else")).unwrap();

    let result = block_on(service.history_restore(&facade, 1));
    assert!(matches!(result, Err(CollabError::Source(_))));
    assert!(service.history().records().is_empty());
    assert_eq!(service.history().state().server_tail_record().revision, 3);
}

/// Claims a single record of alice's at revision 0, which no text precedes
struct RevisionZeroSource;

#[async_trait::async_trait(?Send)]
impl RecordSource for RevisionZeroSource {
    async fn head_revision(&self) -> synckit_collab::Result<Revision> {
        Ok(0)
    }

    async fn text_at(&self, revision: Revision) -> synckit_collab::Result<TextRevision> {
        Ok(TextRevision::new(revision, "x"))
    }

    async fn records(&self, _start: Revision, _end: Revision) -> synckit_collab::Result<Vec<RevisionRecord>> {
        let mut record = RevisionRecord::new(0, Changeset::replace(0, 0, 0, "x").unwrap());
        record.creator_user_id = Some("alice".to_string());
        record.before_selection = Some(SelectionRange::caret(0));
        record.after_selection = Some(SelectionRange::caret(1));
        Ok(vec![record])
    }
}

#[test]
fn record_at_revision_zero_is_a_source_error() {
    let facade = UserRecords::new(RevisionZeroSource, &alice()).unwrap();
    let mut service = CollabService::new(alice(), TextRevision::new(0, "x")).unwrap();

    let result = block_on(service.history_restore(&facade, 1));
    assert!(matches!(result, Err(CollabError::Source(_))));
    assert!(service.history().records().is_empty());
    assert_eq!(service.view_text().unwrap(), "x");
}
