//! Changeset: algebraic text deltas
//!
//! A changeset transforms a source text into a target text through an
//! ordered list of strips:
//! - **Retain**: copies a half-open source range `[start, end)`
//! - **Insert**: emits literal text
//!
//! Source characters not covered by any retain are deleted, including
//! everything past the last retained range. A changeset therefore carries no
//! explicit input length; `required_input_len()` is the smallest source it
//! can apply to.
//!
//! # Algebra
//!
//! - `compose(a, b)`: apply `a` then `b` (requires `b` to fit `a`'s output)
//! - `get_identity()`: pure retain of the whole output
//! - `inverse(before)`: undo a changeset relative to the text it applied to
//! - `follow(other)`: rebase a concurrent changeset so it applies after `self`
//!
//! Positions count `char`s, not bytes.
//!
//! # Example
//!
//! ```rust
//! use synckit_collab::changeset::Changeset;
//!
//! let text = Changeset::from_text("hello world");
//! let edit = Changeset::new(vec![
//!     synckit_collab::changeset::Strip::Retain { start: 0, end: 5 },
//!     synckit_collab::changeset::Strip::Insert(",".to_string()),
//!     synckit_collab::changeset::Strip::Retain { start: 5, end: 11 },
//! ]).unwrap();
//!
//! let result = text.compose(&edit).unwrap();
//! assert_eq!(result.as_text().unwrap(), "hello, world");
//! ```

mod serialize;
mod transform;

pub use serialize::{SerializedChangeset, SerializedStrip};

use crate::error::{CollabError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One element of a changeset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strip {
    /// Copy source characters `[start, end)`
    Retain { start: usize, end: usize },

    /// Emit literal text
    Insert(String),
}

impl Strip {
    /// Number of output characters this strip produces
    pub fn len(&self) -> usize {
        match self {
            Strip::Retain { start, end } => end - start,
            Strip::Insert(text) => char_len(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordering of concurrent insertions that land on the same source gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    /// Keep a caret (or this side's insertion) before the other insertion
    Before,

    /// Move a caret (or this side's insertion) past the other insertion
    After,
}

/// Immutable text delta
///
/// Cloning is cheap: strips are shared behind an `Arc`, so history
/// snapshots copy pointers rather than text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SerializedChangeset", try_from = "SerializedChangeset")]
pub struct Changeset {
    strips: Arc<[Strip]>,
    output_len: usize,
}

impl Default for Changeset {
    fn default() -> Self {
        Self::empty()
    }
}

impl Changeset {
    /// Build a changeset from strips, validating retain ordering
    ///
    /// # Errors
    ///
    /// Returns `CollabError::InvalidChangeset` if a retain is empty, reversed,
    /// or overlaps/precedes an earlier retain.
    pub fn new(strips: Vec<Strip>) -> Result<Self> {
        let mut builder = ChangesetBuilder::new();
        let mut last_end = 0;
        let mut seen_retain = false;

        for strip in strips {
            match strip {
                Strip::Retain { start, end } => {
                    if start >= end {
                        return Err(CollabError::changeset(format!(
                            "empty or reversed retain [{}, {})",
                            start, end
                        )));
                    }
                    if seen_retain && start < last_end {
                        return Err(CollabError::changeset(format!(
                            "retain [{}, {}) overlaps earlier retain ending at {}",
                            start, end, last_end
                        )));
                    }
                    seen_retain = true;
                    last_end = end;
                    builder.retain(start, end);
                }
                Strip::Insert(text) => builder.insert(&text),
            }
        }

        Ok(builder.finish())
    }

    /// The empty changeset: deletes everything, inserts nothing
    pub fn empty() -> Self {
        Self {
            strips: Arc::from(Vec::new()),
            output_len: 0,
        }
    }

    /// A text, expressed as pure insertion into an empty source
    pub fn from_text(text: &str) -> Self {
        let mut builder = ChangesetBuilder::new();
        builder.insert(text);
        builder.finish()
    }

    /// Pure retain of `len` characters
    pub fn identity(len: usize) -> Self {
        let mut builder = ChangesetBuilder::new();
        builder.retain(0, len);
        builder.finish()
    }

    /// Replace chars `[start, end)` of a `len`-char text with `text`
    ///
    /// # Errors
    ///
    /// Returns `CollabError::InvalidChangeset` if the range is reversed or
    /// extends past `len`.
    pub fn replace(len: usize, start: usize, end: usize, text: &str) -> Result<Self> {
        if start > end || end > len {
            return Err(CollabError::changeset(format!(
                "replace range [{}, {}) outside text of {} chars",
                start, end, len
            )));
        }
        let mut builder = ChangesetBuilder::new();
        builder.retain(0, start);
        builder.insert(text);
        builder.retain(end, len);
        Ok(builder.finish())
    }

    /// Neutral element that composes after `self`
    pub fn get_identity(&self) -> Self {
        Self::identity(self.output_len)
    }

    pub fn strips(&self) -> &[Strip] {
        &self.strips
    }

    /// Length of the target text
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Smallest source length this changeset can apply to
    pub fn required_input_len(&self) -> usize {
        self.strips
            .iter()
            .rev()
            .find_map(|strip| match strip {
                Strip::Retain { end, .. } => Some(*end),
                Strip::Insert(_) => None,
            })
            .unwrap_or(0)
    }

    /// True if the changeset contains insertions only
    pub fn is_text(&self) -> bool {
        self.strips
            .iter()
            .all(|strip| matches!(strip, Strip::Insert(_)))
    }

    /// Render a pure-insertion changeset as a string
    pub fn as_text(&self) -> Option<String> {
        let mut out = String::new();
        for strip in self.strips.iter() {
            match strip {
                Strip::Insert(text) => out.push_str(text),
                Strip::Retain { .. } => return None,
            }
        }
        Some(out)
    }

    /// True if this is a pure retain of exactly `len` characters
    pub fn is_identity_for(&self, len: usize) -> bool {
        match &self.strips[..] {
            [] => len == 0,
            [Strip::Retain { start: 0, end }] => *end == len,
            _ => false,
        }
    }

    /// Whether `next` can be applied to this changeset's output
    pub fn is_composable_with(&self, next: &Changeset) -> bool {
        next.required_input_len() <= self.output_len
    }

    /// Sequential composition: `self` then `next`
    ///
    /// # Errors
    ///
    /// Returns `CollabError::InvalidChangeset` if `next` retains past the end
    /// of `self`'s output.
    pub fn compose(&self, next: &Changeset) -> Result<Changeset> {
        if !self.is_composable_with(next) {
            return Err(CollabError::changeset(format!(
                "cannot compose: next requires {} chars, output has {}",
                next.required_input_len(),
                self.output_len
            )));
        }

        let offsets = self.output_offsets();
        let mut builder = ChangesetBuilder::new();

        for strip in next.strips.iter() {
            match strip {
                Strip::Insert(text) => builder.insert(text),
                Strip::Retain { start, end } => {
                    self.copy_output_range(&offsets, *start, *end, &mut builder)
                }
            }
        }

        Ok(builder.finish())
    }

    /// Compose a sequence of changesets onto `self`
    pub fn compose_all<'a>(&self, next: impl IntoIterator<Item = &'a Changeset>) -> Result<Changeset> {
        let mut acc = self.clone();
        for changeset in next {
            acc = acc.compose(changeset)?;
        }
        Ok(acc)
    }

    /// Apply to a plain string
    pub fn apply(&self, text: &str) -> Result<String> {
        Changeset::from_text(text)
            .compose(self)?
            .as_text()
            .ok_or_else(|| CollabError::changeset("composition onto text produced retains"))
    }

    /// True if composing `self` after `before` leaves `before` unchanged
    pub fn is_noop_after(&self, before: &Changeset) -> bool {
        match before.compose(self) {
            Ok(composed) => composed == *before,
            Err(_) => false,
        }
    }

    /// Changeset that undoes `self`, given the text `self` applied to
    ///
    /// # Errors
    ///
    /// Returns `CollabError::InvalidChangeset` if `before` is not a pure text
    /// or is too short for `self`.
    pub fn inverse(&self, before: &Changeset) -> Result<Changeset> {
        let text = before
            .as_text()
            .ok_or_else(|| CollabError::changeset("inverse requires a text as context"))?;
        let chars: Vec<char> = text.chars().collect();
        if self.required_input_len() > chars.len() {
            return Err(CollabError::changeset(format!(
                "inverse context has {} chars, changeset requires {}",
                chars.len(),
                self.required_input_len()
            )));
        }

        let mut builder = ChangesetBuilder::new();
        let mut source = 0;
        let mut out = 0;

        for strip in self.strips.iter() {
            match strip {
                Strip::Retain { start, end } => {
                    if *start > source {
                        builder.insert(&chars[source..*start].iter().collect::<String>());
                    }
                    builder.retain(out, out + (end - start));
                    out += end - start;
                    source = *end;
                }
                Strip::Insert(text) => out += char_len(text),
            }
        }
        if source < chars.len() {
            builder.insert(&chars[source..].iter().collect::<String>());
        }

        Ok(builder.finish())
    }

    /// Rebase `other` (concurrent with `self` on the same source) so it
    /// applies after `self`. `self`'s insertions win same-gap ties.
    pub fn follow(&self, other: &Changeset) -> Changeset {
        self.follow_with_bias(other, Bias::Before)
    }

    /// Like [`follow`](Self::follow), with explicit tie ordering:
    /// `Bias::Before` places `self`'s insertions first at a shared gap,
    /// `Bias::After` places `other`'s insertions first.
    pub fn follow_with_bias(&self, other: &Changeset, bias: Bias) -> Changeset {
        transform::follow(self, other, bias)
    }

    /// Map a caret position in the source to the target
    ///
    /// Positions inside deleted ranges map to the nearest retained position.
    /// When insertions sit exactly at the caret, `bias` decides which side of
    /// them the caret lands on.
    pub fn follow_index(&self, index: usize, bias: Bias) -> usize {
        let mut out = 0;
        let mut last_before = 0;

        for strip in self.strips.iter() {
            match strip {
                Strip::Retain { start, end } => {
                    if *end <= index {
                        out += end - start;
                        last_before = out;
                    } else if *start < index {
                        return out + (index - start);
                    } else {
                        return match bias {
                            Bias::Before => last_before,
                            Bias::After => out,
                        };
                    }
                }
                Strip::Insert(text) => out += char_len(text),
            }
        }

        match bias {
            Bias::Before => last_before,
            Bias::After => out,
        }
    }

    /// True if source gap `index` lies between the retains around an
    /// insertion (deleted characters next to it included)
    pub fn inserts_at_source(&self, index: usize) -> bool {
        let mut gap_start = 0;
        let mut inserting = false;
        for strip in self.strips.iter() {
            match strip {
                Strip::Retain { start, end } => {
                    if inserting && (gap_start..=*start).contains(&index) {
                        return true;
                    }
                    if *start > index {
                        return false;
                    }
                    gap_start = *end;
                    inserting = false;
                }
                Strip::Insert(_) => inserting = true,
            }
        }
        inserting && index >= gap_start
    }

    /// True if an insertion starts at target position `index`
    pub fn insert_starts_at_output(&self, index: usize) -> bool {
        let mut out = 0;
        for strip in self.strips.iter() {
            if out > index {
                return false;
            }
            if matches!(strip, Strip::Insert(_)) && out == index {
                return true;
            }
            out += strip.len();
        }
        false
    }

    /// Output offset at which each strip starts
    fn output_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.strips.len());
        let mut out = 0;
        for strip in self.strips.iter() {
            offsets.push(out);
            out += strip.len();
        }
        offsets
    }

    /// Append the strips producing output range `[start, end)` to `builder`
    fn copy_output_range(
        &self,
        offsets: &[usize],
        start: usize,
        end: usize,
        builder: &mut ChangesetBuilder,
    ) {
        let first = offsets.partition_point(|&offset| offset <= start).saturating_sub(1);

        for (strip, &offset) in self.strips[first..].iter().zip(&offsets[first..]) {
            if offset >= end {
                break;
            }
            let lo = start.max(offset) - offset;
            let hi = end.min(offset + strip.len()) - offset;
            if lo >= hi {
                continue;
            }
            match strip {
                Strip::Retain { start: source, .. } => builder.retain(source + lo, source + hi),
                Strip::Insert(text) => builder.insert(char_slice(text, lo, hi)),
            }
        }
    }
}

/// Incremental, normalizing changeset construction
///
/// Adjacent contiguous retains and adjacent inserts merge; empty strips are
/// dropped. Callers are responsible for pushing retains in increasing order.
#[derive(Debug, Default)]
pub(crate) struct ChangesetBuilder {
    strips: Vec<Strip>,
    output_len: usize,
}

impl ChangesetBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn retain(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.output_len += end - start;
        if let Some(Strip::Retain { end: last_end, .. }) = self.strips.last_mut() {
            if *last_end == start {
                *last_end = end;
                return;
            }
        }
        debug_assert!(
            self.last_retain_end().map_or(true, |last| last <= start),
            "retains must be pushed in increasing order"
        );
        self.strips.push(Strip::Retain { start, end });
    }

    pub(crate) fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.output_len += char_len(text);
        if let Some(Strip::Insert(last)) = self.strips.last_mut() {
            last.push_str(text);
            return;
        }
        self.strips.push(Strip::Insert(text.to_string()));
    }

    fn last_retain_end(&self) -> Option<usize> {
        self.strips.iter().rev().find_map(|strip| match strip {
            Strip::Retain { end, .. } => Some(*end),
            Strip::Insert(_) => None,
        })
    }

    pub(crate) fn finish(self) -> Changeset {
        Changeset {
            strips: Arc::from(self.strips),
            output_len: self.output_len,
        }
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Substring by char positions `[start, end)`
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let from = indices.by_ref().nth(start).unwrap_or(text.len());
    let to = if end > start {
        indices.nth(end - start - 1).unwrap_or(text.len())
    } else {
        from
    };
    &text[from..to]
}
