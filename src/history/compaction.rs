//! Log compaction passes
//!
//! Run after every mutating operation over one region of the log, in order,
//! restarting from the first pass after any change:
//!
//! 1. drop adjacent undo/redo pairs that cancel out
//! 2. drop an execute record immediately undone, once the undo can no
//!    longer be redone
//! 3. merge a squash-tagged execute record into its predecessor
//! 4. (server region) move permanent records towards the front and fold
//!    leading ones into the tail transform
//! 5. drop execute/permanent records that do not change the text
//!
//! Removed records hand their server record to a neighbour first.

use tracing::{debug, trace};

use super::record::{fold_server_records, RecordKind};
use super::state::{HistoryState, Region};
use super::undo::replay;
use super::CollabHistory;
use crate::changeset::Bias;
use crate::error::Result;

impl CollabHistory {
    /// Compact one region until no pass applies
    pub(crate) fn compact(&mut self, region: Region) -> Result<usize> {
        let changes = compact(&mut self.state, region)?;
        if changes > 0 {
            debug!(?region, changes, records = self.state.records.len(), "Compacted history");
        }
        Ok(changes)
    }
}

pub(crate) fn compact(state: &mut HistoryState, region: Region) -> Result<usize> {
    let mut changes = 0;
    loop {
        let changed = remove_cancelling_pair(state, region)?
            || remove_undone_execute(state, region)?
            || merge_squashed(state, region)?
            || (region == Region::Server && migrate_permanent(state)?)
            || remove_identity(state, region)?;
        if !changed {
            break;
        }
        changes += 1;
    }
    if changes > 0 {
        state.refresh_last_executed();
    }
    Ok(changes)
}

/// True if `records[index]` followed by `records[index + 1]` leaves the
/// text unchanged
fn pair_is_noop(state: &HistoryState, index: usize) -> Result<bool> {
    let before = state.text_at(index)?;
    let combined = state.records[index]
        .changeset
        .compose(&state.records[index + 1].changeset)?;
    Ok(combined.is_noop_after(&before))
}

fn adjacent_pairs(state: &HistoryState, region: Region) -> std::ops::Range<usize> {
    let range = state.region_range(region);
    range.start..range.end.saturating_sub(1).max(range.start)
}

fn remove_cancelling_pair(state: &mut HistoryState, region: Region) -> Result<bool> {
    let stacks = replay(&state.records);

    for i in adjacent_pairs(state, region) {
        let kinds = (state.records[i].kind, state.records[i + 1].kind);
        if !matches!(
            kinds,
            (RecordKind::Undo, RecordKind::Redo) | (RecordKind::Redo, RecordKind::Undo)
        ) {
            continue;
        }
        if stacks.targets[i + 1] != Some(i)
            || !stacks.targeted_only_by(i, i + 1)
            || stacks.is_targeted(i + 1)
            || !pair_is_noop(state, i)?
        {
            continue;
        }

        trace!(index = i, ?kinds, "Removing cancelling undo/redo pair");
        state.remove_record(i + 1, region);
        state.remove_record(i, region);
        return Ok(true);
    }
    Ok(false)
}

fn remove_undone_execute(state: &mut HistoryState, region: Region) -> Result<bool> {
    let stacks = replay(&state.records);

    for i in adjacent_pairs(state, region) {
        if state.records[i].kind != RecordKind::Execute || state.records[i + 1].kind != RecordKind::Undo {
            continue;
        }
        let framed = !stacks.redo.contains(&(i + 1)) && !stacks.is_targeted(i + 1);
        if stacks.targets[i + 1] != Some(i)
            || !stacks.targeted_only_by(i, i + 1)
            || !framed
            || !pair_is_noop(state, i)?
        {
            continue;
        }

        trace!(index = i, "Removing undone execute record");
        state.remove_record(i + 1, region);
        state.remove_record(i, region);
        return Ok(true);
    }
    Ok(false)
}

fn merge_squashed(state: &mut HistoryState, region: Region) -> Result<bool> {
    let stacks = replay(&state.records);

    for i in adjacent_pairs(state, region) {
        let (first, second) = (&state.records[i], &state.records[i + 1]);
        if first.kind != RecordKind::Execute
            || second.kind != RecordKind::Execute
            || !second.squash
            || stacks.is_targeted(i)
            || stacks.is_targeted(i + 1)
        {
            continue;
        }

        let changeset = first.changeset.compose(&second.changeset)?;
        let second = state.take_record(i + 1);
        let first = &mut state.records[i];
        first.changeset = changeset;
        first.after_selection = second.after_selection;
        first.server_record = match (first.server_record.take(), second.server_record) {
            (Some(earlier), Some(later)) => Some(fold_server_records(earlier, later)),
            (earlier, later) => later.or(earlier),
        };

        trace!(index = i, "Merged squashed execute record");
        return Ok(true);
    }
    Ok(false)
}

/// Move the first permanent record that can go one step left, or fold a
/// leading permanent record into the tail transform
fn migrate_permanent(state: &mut HistoryState) -> Result<bool> {
    for i in 0..state.server_index {
        if state.records[i].kind != RecordKind::Permanent {
            continue;
        }
        if i == 0 {
            absorb_leading_permanent(state)?;
            return Ok(true);
        }
        if state.records[i - 1].kind == RecordKind::Permanent {
            continue;
        }
        if transpose(state, i)? {
            trace!(index = i, "Moved permanent record left");
            return Ok(true);
        }
    }
    Ok(false)
}

fn absorb_leading_permanent(state: &mut HistoryState) -> Result<()> {
    let record = state.take_record(0);
    let tail = &state.server_tail_record.changeset;

    let transform = match state.server_to_local_history_transform.take() {
        Some(existing) => existing.compose(&record.changeset)?,
        None => record.changeset,
    };
    state.server_to_local_history_transform = (!transform.is_noop_after(tail)).then_some(transform);
    trace!("Folded leading permanent record into tail transform");

    if let Some(server_record) = record.server_record {
        state.fold_server_record(0, Region::Server, server_record);
    }
    Ok(())
}

/// Swap the permanent record at `index` with its predecessor if the
/// reordered pair produces the same text
fn transpose(state: &mut HistoryState, index: usize) -> Result<bool> {
    let before = state.text_at(index - 1)?;
    let earlier = &state.records[index - 1];
    let permanent = &state.records[index];

    let Ok(inverse) = earlier.changeset.inverse(&before) else {
        return Ok(false);
    };
    let moved_permanent = inverse.follow(&permanent.changeset);
    let moved_earlier = moved_permanent.follow(&earlier.changeset);

    let expected = before.compose(&earlier.changeset)?.compose(&permanent.changeset)?;
    let reordered = before
        .compose(&moved_permanent)
        .and_then(|text| text.compose(&moved_earlier));
    match reordered {
        Ok(text) if text == expected => {}
        _ => return Ok(false),
    }

    let mut new_first = permanent.clone();
    let mut new_second = earlier.clone();

    new_second.before_selection = earlier.before_selection.follow(&moved_permanent, Bias::Before);
    new_second.after_selection = earlier.after_selection.follow(&permanent.changeset, Bias::Before);
    new_second.changeset = moved_earlier;
    new_first.changeset = moved_permanent;

    // server records stay where they were so revisions keep increasing
    std::mem::swap(&mut new_first.server_record, &mut new_second.server_record);

    state.records[index - 1] = new_first;
    state.records[index] = new_second;
    Ok(true)
}

fn remove_identity(state: &mut HistoryState, region: Region) -> Result<bool> {
    let stacks = replay(&state.records);
    let range = state.region_range(region);

    for i in range {
        let record = &state.records[i];
        let removable = match record.kind {
            RecordKind::Permanent => true,
            RecordKind::Execute => !stacks.clears_redo[i],
            RecordKind::Undo | RecordKind::Redo => false,
        };
        if !removable || stacks.is_targeted(i) {
            continue;
        }
        if !record.changeset.is_noop_after(&state.text_at(i)?) {
            continue;
        }

        trace!(index = i, kind = ?record.kind, "Removing identity record");
        state.remove_record(i, region);
        return Ok(true);
    }
    Ok(false)
}
