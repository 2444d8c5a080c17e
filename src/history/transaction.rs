//! Transactional mutation of the history
//!
//! Every mutating operation runs through [`CollabHistory::with_transaction`]:
//! the state is snapshotted, the operation runs, and the global invariants
//! are checked. On any error the snapshot is restored and queued events are
//! discarded; on success queued events are delivered, view changes last.

use tracing::warn;

use super::{CollabHistory, HistoryEvent};
use crate::error::{CollabError, Result};

impl CollabHistory {
    pub(crate) fn with_transaction<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.in_transaction {
            return Err(CollabError::Reentrant);
        }
        self.in_transaction = true;

        // Changesets share their strips, so this copies pointers
        let snapshot = self.state.clone();
        let result = op(self).and_then(|value| {
            self.state.check_invariants()?;
            Ok(value)
        });
        self.in_transaction = false;

        match result {
            Ok(value) => {
                self.flush_events();
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "Rolling back history transaction");
                self.state = snapshot;
                self.queued.clear();
                Err(err)
            }
        }
    }

    /// Queue an event for delivery when the current transaction commits
    pub(crate) fn queue(&mut self, event: HistoryEvent) {
        if !self.queued.contains(&event) {
            self.queued.push(event);
        }
    }

    fn flush_events(&mut self) {
        let (view, state): (Vec<_>, Vec<_>) = self
            .queued
            .drain(..)
            .partition(|event| matches!(event, HistoryEvent::ViewChanged { .. }));

        for event in state.iter().chain(view.iter()) {
            self.events.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::Changeset;
    use crate::protocol::TextRevision;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_nested_transaction_is_rejected() {
        let mut history = CollabHistory::new(TextRevision::new(0, "abc"));
        let result = history.with_transaction(|h| h.with_transaction(|_| Ok(())));
        assert!(matches!(result, Err(CollabError::Reentrant)));
        assert!(!history.in_transaction);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let mut history = CollabHistory::new(TextRevision::new(0, "abc"));
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        let _sub = history.subscribe(move |_| *sink.borrow_mut() += 1);

        let result = history.with_transaction(|h| {
            h.state.server_index = 5;
            h.queue(HistoryEvent::ServerChanged);
            Ok(())
        });

        assert!(matches!(result, Err(CollabError::InvariantViolation(_))));
        assert_eq!(history.state().server_index(), 0);
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn test_view_event_delivered_last() {
        let mut history = CollabHistory::new(TextRevision::new(0, ""));
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let _sub = history.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        history
            .with_transaction(|h| {
                h.queue(HistoryEvent::ViewChanged {
                    changeset: Changeset::empty(),
                });
                h.queue(HistoryEvent::LocalChanged);
                Ok(())
            })
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                HistoryEvent::LocalChanged,
                HistoryEvent::ViewChanged {
                    changeset: Changeset::empty()
                },
            ]
        );
    }
}
