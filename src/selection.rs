//! SelectionRange: caret or selection carried through changesets
//!
//! A selection is `{start, end?}`; `end == None` is a collapsed caret.
//! Transforming a selection maps each boundary through a changeset to the
//! nearest retained position.

use crate::changeset::{Bias, Changeset};
use serde::{Deserialize, Serialize};

/// Caret (`end == None`) or selection over view positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl SelectionRange {
    /// Collapsed caret at `index`
    pub fn caret(index: usize) -> Self {
        Self {
            start: index,
            end: None,
        }
    }

    /// Selection `[start, end]`; collapses to a caret when both are equal
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: (start != end).then_some(end),
        }
    }

    pub fn end(&self) -> usize {
        self.end.unwrap_or(self.start)
    }

    pub fn is_caret(&self) -> bool {
        self.end.is_none()
    }

    /// Lower and upper boundary, regardless of direction
    pub fn ordered(&self) -> (usize, usize) {
        let end = self.end();
        (self.start.min(end), self.start.max(end))
    }

    /// Transform through `changeset`, applying `bias` to both boundaries
    pub fn follow(&self, changeset: &Changeset, bias: Bias) -> Self {
        Self::new(
            changeset.follow_index(self.start, bias),
            changeset.follow_index(self.end(), bias),
        )
    }

    /// Transform through `changeset`, resolving each boundary's tie with
    /// `bias_at(position)`
    pub fn follow_with(&self, changeset: &Changeset, bias_at: impl Fn(usize) -> Bias) -> Self {
        let start = changeset.follow_index(self.start, bias_at(self.start));
        let end = self.end();
        Self::new(start, changeset.follow_index(end, bias_at(end)))
    }

    /// Clamp both boundaries to a text of `len` characters
    pub fn clamp(&self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end().min(len))
    }
}

impl Default for SelectionRange {
    fn default() -> Self {
        Self::caret(0)
    }
}
