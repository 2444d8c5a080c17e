//! Ordering of authority messages

pub mod buffer;

pub use buffer::{AddOutcome, BufferEvent, BufferState, OrderedMessageBuffer, Versioned};
