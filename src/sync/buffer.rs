//! Revision sequencing and gap detection
//!
//! Authority messages must apply strictly in version order. Messages that
//! arrive early are stashed until every version before them has been seen;
//! the buffer then drains the contiguous run in one batch and reports any
//! gap still open so the caller can request redelivery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::{EventEmitter, Subscription};
use crate::protocol::Revision;

/// A message carrying its position in the sequence
pub trait Versioned {
    fn version(&self) -> Revision;
}

/// Notifications emitted while adding messages
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent<M> {
    /// A contiguous run is about to be drained
    ProcessingStarted,

    /// Next message, in version order
    Message(M),

    /// The drain that began with `ProcessingStarted` is complete
    ProcessingFinished,

    /// Versions `start..=end` have not arrived yet
    MissingVersions { start: Revision, end: Revision },
}

/// Result of [`OrderedMessageBuffer::add`]
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome<M> {
    /// False if the message was obsolete or already stashed
    pub accepted: bool,

    /// Messages released by this add, in version order
    pub drained: Vec<M>,

    /// Inclusive range still missing after this add
    pub missing: Option<(Revision, Revision)>,
}

/// Persisted form of a buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferState<M> {
    pub version: Revision,
    pub messages: Vec<M>,
}

/// Reorders versioned messages into a gap-free stream
pub struct OrderedMessageBuffer<M> {
    version: Revision,
    stashed: BTreeMap<Revision, M>,
    events: EventEmitter<BufferEvent<M>>,
}

impl<M: Versioned + Clone> OrderedMessageBuffer<M> {
    /// Create a buffer whose last processed version is `version`
    pub fn new(version: Revision) -> Self {
        Self {
            version,
            stashed: BTreeMap::new(),
            events: EventEmitter::new(),
        }
    }

    /// Restore a persisted buffer, dropping messages it has already passed
    pub fn from_state(state: BufferState<M>) -> Self {
        let mut buffer = Self::new(state.version);
        for message in state.messages {
            let version = message.version();
            if version > buffer.version {
                buffer.stashed.insert(version, message);
            }
        }
        buffer
    }

    pub fn state(&self) -> BufferState<M> {
        BufferState {
            version: self.version,
            messages: self.stashed.values().cloned().collect(),
        }
    }

    /// Last version released
    pub fn version(&self) -> Revision {
        self.version
    }

    pub fn stashed_len(&self) -> usize {
        self.stashed.len()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&BufferEvent<M>) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    /// Stash `message` and drain whatever became contiguous
    pub fn add(&mut self, message: M) -> AddOutcome<M> {
        let version = message.version();

        if version <= self.version || self.stashed.contains_key(&version) {
            debug!(version, current = self.version, "Discarding obsolete or duplicate message");
            return AddOutcome {
                accepted: false,
                drained: Vec::new(),
                missing: self.missing_versions(),
            };
        }

        self.stashed.insert(version, message);
        let drained = self.drain();
        let missing = self.missing_versions();

        if let Some((start, end)) = missing {
            warn!(start, end, "Gap in message sequence");
            self.events.emit(&BufferEvent::MissingVersions { start, end });
        }

        AddOutcome {
            accepted: true,
            drained,
            missing,
        }
    }

    /// Move the processed version, discarding stashed messages at or before it
    pub fn set_version(&mut self, version: Revision) {
        self.version = version;
        self.stashed = self.stashed.split_off(&(version + 1));
    }

    /// Inclusive range of versions between the processed version and the
    /// oldest stashed message; none of them has arrived yet
    pub fn missing_versions(&self) -> Option<(Revision, Revision)> {
        let oldest = *self.stashed.keys().next()?;
        Some((self.version + 1, oldest - 1))
    }

    fn drain(&mut self) -> Vec<M> {
        let mut drained = Vec::new();
        while let Some(message) = self.stashed.remove(&(self.version + 1)) {
            self.version += 1;
            drained.push(message);
        }

        if !drained.is_empty() {
            debug!(count = drained.len(), version = self.version, "Drained messages");
            self.events.emit(&BufferEvent::ProcessingStarted);
            for message in &drained {
                self.events.emit(&BufferEvent::Message(message.clone()));
            }
            self.events.emit(&BufferEvent::ProcessingFinished);
        }

        drained
    }
}

impl<M> std::fmt::Debug for OrderedMessageBuffer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedMessageBuffer")
            .field("version", &self.version)
            .field("stashed", &self.stashed.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Msg(Revision);

    impl Versioned for Msg {
        fn version(&self) -> Revision {
            self.0
        }
    }

    #[test]
    fn test_drains_in_order() {
        let mut buffer = OrderedMessageBuffer::new(10);

        let outcome = buffer.add(Msg(13));
        assert!(outcome.accepted);
        assert!(outcome.drained.is_empty());
        assert_eq!(outcome.missing, Some((11, 12)));

        let outcome = buffer.add(Msg(12));
        assert!(outcome.drained.is_empty());
        assert_eq!(outcome.missing, Some((11, 11)));

        let outcome = buffer.add(Msg(11));
        assert_eq!(outcome.drained, vec![Msg(11), Msg(12), Msg(13)]);
        assert_eq!(outcome.missing, None);
        assert_eq!(buffer.version(), 13);
    }

    #[test]
    fn test_missing_range_stops_before_oldest_stashed() {
        let mut buffer = OrderedMessageBuffer::new(10);
        buffer.add(Msg(15));
        let outcome = buffer.add(Msg(13));
        assert_eq!(outcome.missing, Some((11, 12)));

        let outcome = buffer.add(Msg(11));
        assert_eq!(outcome.drained, vec![Msg(11)]);
        assert_eq!(outcome.missing, Some((12, 12)));

        let outcome = buffer.add(Msg(12));
        assert_eq!(outcome.drained, vec![Msg(12), Msg(13)]);
        assert_eq!(outcome.missing, Some((14, 14)));
    }

    #[test]
    fn test_rejects_obsolete_and_duplicate() {
        let mut buffer = OrderedMessageBuffer::new(5);
        assert!(!buffer.add(Msg(5)).accepted);
        assert!(!buffer.add(Msg(2)).accepted);
        assert!(buffer.add(Msg(8)).accepted);
        assert!(!buffer.add(Msg(8)).accepted);
        assert_eq!(buffer.stashed_len(), 1);
    }

    #[test]
    fn test_events_bracket_each_drain() {
        let mut buffer = OrderedMessageBuffer::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let _sub = buffer.subscribe(move |event: &BufferEvent<Msg>| sink.borrow_mut().push(event.clone()));

        buffer.add(Msg(2));
        buffer.add(Msg(1));

        assert_eq!(
            *log.borrow(),
            vec![
                BufferEvent::MissingVersions { start: 1, end: 1 },
                BufferEvent::ProcessingStarted,
                BufferEvent::Message(Msg(1)),
                BufferEvent::Message(Msg(2)),
                BufferEvent::ProcessingFinished,
            ]
        );
    }

    #[test]
    fn test_set_version_discards_obsolete() {
        let mut buffer = OrderedMessageBuffer::new(0);
        buffer.add(Msg(3));
        buffer.add(Msg(6));

        buffer.set_version(4);
        assert_eq!(buffer.stashed_len(), 1);
        assert_eq!(buffer.missing_versions(), Some((5, 5)));

        let outcome = buffer.add(Msg(5));
        assert_eq!(outcome.drained, vec![Msg(5), Msg(6)]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut buffer = OrderedMessageBuffer::new(1);
        buffer.add(Msg(4));

        let json = serde_json::to_string(&buffer.state()).unwrap();
        let state: BufferState<Msg> = serde_json::from_str(&json).unwrap();
        let mut restored = OrderedMessageBuffer::from_state(state);

        assert_eq!(restored.version(), 1);
        let outcome = restored.add(Msg(2));
        assert_eq!(outcome.drained, vec![Msg(2)]);
        let outcome = restored.add(Msg(3));
        assert_eq!(outcome.drained, vec![Msg(3), Msg(4)]);
    }
}
