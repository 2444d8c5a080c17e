//! Operational transform for concurrent changesets
//!
//! Both changesets are laid out on their shared source axis. Every retain
//! boundary and insertion anchor becomes a breakpoint; between two
//! breakpoints each side either keeps or drops the whole interval. Walking
//! breakpoints in order yields the rebased changeset directly in the first
//! side's output coordinates.
//!
//! An insertion is anchored to the start of the retain that follows it, or
//! to [`END`] when nothing follows. Deleting characters ahead of an
//! insertion therefore never moves its anchor, so transforming a run of
//! edits one by one orders insertions the same way as transforming their
//! composition.

use super::{char_len, Bias, Changeset, ChangesetBuilder, Strip};

/// Anchor of insertions with no retain after them
const END: usize = usize::MAX;

/// Retained source range and where it lands in the output
#[derive(Debug, Clone, Copy)]
struct PlacedRetain {
    start: usize,
    end: usize,
    out: usize,
}

/// Insertion, the source gap it is anchored to, and its output offset
#[derive(Debug, Clone, Copy)]
struct PlacedInsert<'a> {
    anchor: usize,
    text: &'a str,
    out: usize,
}

#[derive(Debug, Default)]
struct Layout<'a> {
    retains: Vec<PlacedRetain>,
    inserts: Vec<PlacedInsert<'a>>,
}

impl<'a> Layout<'a> {
    fn of(changeset: &'a Changeset) -> Self {
        let mut layout = Layout::default();
        let mut unanchored = 0;
        let mut out = 0;

        for strip in changeset.strips() {
            match strip {
                Strip::Retain { start, end } => {
                    for insert in &mut layout.inserts[unanchored..] {
                        insert.anchor = *start;
                    }
                    unanchored = layout.inserts.len();
                    layout.retains.push(PlacedRetain {
                        start: *start,
                        end: *end,
                        out,
                    });
                    out += end - start;
                }
                Strip::Insert(text) => {
                    layout.inserts.push(PlacedInsert { anchor: END, text, out });
                    out += char_len(text);
                }
            }
        }

        layout
    }

    fn breakpoints(&self) -> impl Iterator<Item = usize> + '_ {
        self.retains
            .iter()
            .flat_map(|r| [r.start, r.end])
            .chain(self.inserts.iter().map(|i| i.anchor))
    }
}

/// Cursor over placed retains, advanced with monotonically increasing positions
struct RetainCursor<'l> {
    retains: &'l [PlacedRetain],
    index: usize,
}

impl<'l> RetainCursor<'l> {
    fn new(retains: &'l [PlacedRetain]) -> Self {
        Self { retains, index: 0 }
    }

    /// Output position of source `pos`, if retained
    fn seek(&mut self, pos: usize) -> Option<usize> {
        while self.index < self.retains.len() && self.retains[self.index].end <= pos {
            self.index += 1;
        }
        self.retains
            .get(self.index)
            .filter(|r| r.start <= pos)
            .map(|r| r.out + (pos - r.start))
    }
}

/// Cursor over placed inserts
struct InsertCursor<'l, 'a> {
    inserts: &'l [PlacedInsert<'a>],
    index: usize,
}

impl<'l, 'a> InsertCursor<'l, 'a> {
    fn new(inserts: &'l [PlacedInsert<'a>]) -> Self {
        Self { inserts, index: 0 }
    }

    fn take_at(&mut self, anchor: usize) -> Option<PlacedInsert<'a>> {
        while self.index < self.inserts.len() && self.inserts[self.index].anchor < anchor {
            self.index += 1;
        }
        let found = self
            .inserts
            .get(self.index)
            .copied()
            .filter(|i| i.anchor == anchor);
        if found.is_some() {
            self.index += 1;
        }
        found
    }
}

/// Rebase `other` so it applies after `base`
///
/// The result retains every insertion of `base`, keeps source characters
/// both sides retained, and carries over `other`'s insertions. At a shared
/// anchor, `Bias::Before` emits `base`'s insertion first.
pub(super) fn follow(base: &Changeset, other: &Changeset, bias: Bias) -> Changeset {
    let mine = Layout::of(base);
    let theirs = Layout::of(other);

    let mut points: Vec<usize> = mine.breakpoints().chain(theirs.breakpoints()).collect();
    points.sort_unstable();
    points.dedup();

    let mut my_retains = RetainCursor::new(&mine.retains);
    let mut their_retains = RetainCursor::new(&theirs.retains);
    let mut my_inserts = InsertCursor::new(&mine.inserts);
    let mut their_inserts = InsertCursor::new(&theirs.inserts);

    let mut builder = ChangesetBuilder::new();

    for (i, &point) in points.iter().enumerate() {
        let my_insert = my_inserts.take_at(point);
        let their_insert = their_inserts.take_at(point);

        let keep_mine = |builder: &mut ChangesetBuilder| {
            if let Some(insert) = my_insert {
                builder.retain(insert.out, insert.out + char_len(insert.text));
            }
        };
        let add_theirs = |builder: &mut ChangesetBuilder| {
            if let Some(insert) = their_insert {
                builder.insert(insert.text);
            }
        };

        match bias {
            Bias::Before => {
                keep_mine(&mut builder);
                add_theirs(&mut builder);
            }
            Bias::After => {
                add_theirs(&mut builder);
                keep_mine(&mut builder);
            }
        }

        let Some(&next) = points.get(i + 1) else {
            break;
        };

        let mine_out = my_retains.seek(point);
        let theirs_kept = their_retains.seek(point).is_some();
        if let (Some(out), true) = (mine_out, theirs_kept) {
            builder.retain(out, out + (next - point));
        }
    }

    builder.finish()
}
