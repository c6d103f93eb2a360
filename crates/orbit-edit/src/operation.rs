use std::hash::Hash;

use orbit_model::{
    ChainFamily, ChainRole, Chart, Gimmick, GimmickId, IdAllocator, MaskDirection, Note, NoteId,
    NoteType, POSITION_COUNT, clamp_size, wrap_position,
};
use serde::{Deserialize, Serialize};

use crate::error::EditError;
use crate::selection::Selection;

/// A chain neighbour and the type it had before the edit touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub id: NoteId,
    pub note_type: NoteType,
}

/// One reversible edit to a chart.
///
/// Each variant carries everything needed to apply and revert itself, so
/// `redo` followed by `undo` restores the chart exactly. Operations never
/// re-sort the chart; that is left to whoever drives the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    InsertNote {
        note: Note,
    },
    DeleteNote {
        note: Note,
    },
    EditNote {
        before: Note,
        after: Note,
    },
    /// Append `note` after the current tail of a chain.
    InsertHoldNote {
        note: Note,
        last_placed: NoteId,
        last_placed_type: NoteType,
    },
    /// Remove a chain member and heal the chain around it.
    DeleteHoldNote {
        note: Note,
        prev: Option<LinkSnapshot>,
        next: Option<LinkSnapshot>,
    },
    InsertHoldSegment {
        segment: Note,
        prev: NoteId,
        next: NoteId,
    },
    /// Replace a segment with an end/start pair, cutting the chain in two.
    SplitHold {
        segment: Note,
        new_end: Note,
        new_start: Note,
    },
    /// Join the tail of one chain to the head of another.
    StitchHold {
        end: Note,
        start: Note,
    },
    /// Insert generated segments between two adjacent chain members.
    BakeHold {
        start: NoteId,
        end: NoteId,
        segments: Vec<Note>,
    },
    ConvertToInstantMask {
        original: Note,
        replacements: Vec<Note>,
    },
    InsertGimmick {
        gimmick: Gimmick,
    },
    EditGimmick {
        before: Gimmick,
        after: Gimmick,
    },
    DeleteGimmick {
        gimmick: Gimmick,
    },
    /// Children are redone in order and undone in reverse.
    Composite {
        operations: Vec<Operation>,
    },
}

/// Entity ids an operation reads, creates and removes when redone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint<T> {
    pub required: Vec<T>,
    pub produced: Vec<T>,
    pub consumed: Vec<T>,
}

impl<T> Default for Footprint<T> {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            produced: Vec::new(),
            consumed: Vec::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> Footprint<T> {
    fn new(required: Vec<T>, produced: Vec<T>, consumed: Vec<T>) -> Self {
        Self {
            required,
            produced,
            consumed,
        }
    }

    /// Ids that exist once the operation has been redone.
    pub fn after_redo(&self) -> Vec<T> {
        let mut live: Vec<T> = self
            .required
            .iter()
            .copied()
            .filter(|id| !self.consumed.contains(id))
            .collect();
        for id in &self.produced {
            if !live.contains(id) {
                live.push(*id);
            }
        }
        live
    }

    /// Combine footprints of operations applied in sequence. Ids produced by
    /// an earlier part are not requirements of the whole.
    fn sequence(parts: impl IntoIterator<Item = Footprint<T>>) -> Self {
        let mut whole = Footprint::default();
        for part in parts {
            for id in part.required {
                if !whole.produced.contains(&id) && !whole.required.contains(&id) {
                    whole.required.push(id);
                }
            }
            for id in part.consumed {
                if let Some(pos) = whole.produced.iter().position(|p| *p == id) {
                    whole.produced.remove(pos);
                } else if !whole.consumed.contains(&id) {
                    whole.consumed.push(id);
                }
            }
            for id in part.produced {
                if !whole.produced.contains(&id) {
                    whole.produced.push(id);
                }
            }
        }
        whole
    }
}

fn existing(chart: &Chart, id: NoteId) -> Result<&Note, EditError> {
    chart.note(id).ok_or(EditError::UnknownNote(id))
}

fn family_of(note: &Note) -> Result<ChainFamily, EditError> {
    note.note_type
        .chain_family()
        .ok_or(EditError::NotChainMember(note.id))
}

/// Type a former interior or tail note takes when it becomes the tail.
fn as_tail(note_type: NoteType) -> NoteType {
    match (note_type.chain_family(), note_type.chain_role()) {
        (Some(family), Some(ChainRole::Segment)) => family.note_type(ChainRole::End),
        _ => note_type,
    }
}

/// Type a former tail takes when something is appended after it.
fn as_interior(note_type: NoteType) -> NoteType {
    match (note_type.chain_family(), note_type.chain_role()) {
        (Some(family), Some(ChainRole::End)) => family.note_type(ChainRole::Segment),
        _ => note_type,
    }
}

fn as_head(note_type: NoteType) -> NoteType {
    match note_type.chain_family() {
        Some(family) => family.note_type(ChainRole::Start),
        None => note_type,
    }
}

impl Operation {
    // --- construction ---

    /// Place a standalone note. Chains only grow through the hold commands,
    /// so the note must be unlinked and, if it is a chain type, a start.
    pub fn insert_note(chart: &Chart, note: Note) -> Result<Self, EditError> {
        if chart.contains_note(note.id) {
            return Err(EditError::DuplicateNote(note.id));
        }
        let unlinked = note.prev.is_none() && note.next.is_none();
        let role = note.note_type.chain_role();
        if !unlinked || role.is_some_and(|r| r != ChainRole::Start) {
            return Err(EditError::WrongRole(note.id));
        }
        Ok(Operation::InsertNote { note })
    }

    /// Delete a note, healing its chain if it belongs to one.
    pub fn delete_note(chart: &Chart, id: NoteId) -> Result<Self, EditError> {
        let note = existing(chart, id)?.clone();
        if !note.is_chain_member() || (note.prev.is_none() && note.next.is_none()) {
            return Ok(Operation::DeleteNote { note });
        }
        let snapshot = |link: Option<NoteId>| -> Result<Option<LinkSnapshot>, EditError> {
            link.map(|id| {
                existing(chart, id).map(|n| LinkSnapshot {
                    id,
                    note_type: n.note_type,
                })
            })
            .transpose()
        };
        Ok(Operation::DeleteHoldNote {
            prev: snapshot(note.prev)?,
            next: snapshot(note.next)?,
            note,
        })
    }

    /// Delete several notes at once. Each deletion is planned against the
    /// chart as left by the ones before it, so neighbouring chain members can
    /// be removed together.
    pub fn delete_notes(chart: &Chart, ids: &[NoteId]) -> Result<Self, EditError> {
        let mut unique: Vec<NoteId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if let [id] = unique.as_slice() {
            return Self::delete_note(chart, *id);
        }

        let mut scratch = chart.clone();
        let mut scratch_selection = Selection::default();
        let mut operations = Vec::with_capacity(unique.len());
        for id in unique {
            let operation = Self::delete_note(&scratch, id)?;
            operation.redo(&mut scratch, &mut scratch_selection);
            operations.push(operation);
        }
        Ok(Operation::Composite { operations })
    }

    /// Replace a note's content. Chain links are kept from the chart, so a
    /// chain member may neither change type nor move past its neighbours.
    pub fn edit_note(chart: &Chart, mut after: Note) -> Result<Self, EditError> {
        let before = existing(chart, after.id)?.clone();
        if after.note_type != before.note_type && (before.is_chain_member() || after.is_chain_member()) {
            return Err(EditError::WrongRole(after.id));
        }
        let tick = after.full_tick();
        let prev_ok = before
            .prev
            .and_then(|id| chart.note(id))
            .is_none_or(|prev| prev.full_tick() <= tick);
        let next_ok = before
            .next
            .and_then(|id| chart.note(id))
            .is_none_or(|next| tick <= next.full_tick());
        if !(prev_ok && next_ok) {
            return Err(EditError::OutOfOrder(after.id));
        }
        after.prev = before.prev;
        after.next = before.next;
        Ok(Operation::EditNote { before, after })
    }

    /// Append `note` to the chain whose tail is `last_placed`. The note
    /// becomes the new tail and is typed accordingly.
    pub fn insert_hold_note(chart: &Chart, mut note: Note, last_placed: NoteId) -> Result<Self, EditError> {
        let last = existing(chart, last_placed)?;
        let family = family_of(last)?;
        if last.next.is_some() {
            return Err(EditError::WrongRole(last_placed));
        }
        if note.note_type.chain_family().is_some_and(|f| f != family) {
            return Err(EditError::FamilyMismatch(last_placed, note.id));
        }
        if note.full_tick() < last.full_tick() {
            return Err(EditError::OutOfOrder(note.id));
        }
        note.note_type = family.note_type(ChainRole::End);
        note.prev = Some(last_placed);
        note.next = None;
        Ok(Operation::InsertHoldNote {
            note,
            last_placed,
            last_placed_type: last.note_type,
        })
    }

    /// Insert `segment` directly after `prev`, between it and its successor.
    pub fn insert_hold_segment(chart: &Chart, mut segment: Note, prev: NoteId) -> Result<Self, EditError> {
        let before = existing(chart, prev)?;
        let family = family_of(before)?;
        let next = before.next.ok_or(EditError::WrongRole(prev))?;
        let after = existing(chart, next)?;
        if segment.full_tick() < before.full_tick() || segment.full_tick() > after.full_tick() {
            return Err(EditError::OutOfOrder(segment.id));
        }
        segment.note_type = family.note_type(ChainRole::Segment);
        segment.prev = Some(prev);
        segment.next = Some(next);
        Ok(Operation::InsertHoldSegment { segment, prev, next })
    }

    pub fn split_hold(chart: &mut Chart, segment: NoteId) -> Result<Self, EditError> {
        let segment = existing(chart, segment)?.clone();
        let family = family_of(&segment)?;
        if segment.prev.is_none() || segment.next.is_none() {
            return Err(EditError::WrongRole(segment.id));
        }

        let mut new_end = segment.clone();
        new_end.id = chart.next_note_id();
        new_end.note_type = family.note_type(ChainRole::End);
        new_end.render_segment = true;
        new_end.next = None;

        let mut new_start = segment.clone();
        new_start.id = chart.next_note_id();
        new_start.note_type = family.note_type(ChainRole::Start);
        new_start.render_segment = true;
        new_start.prev = None;

        Ok(Operation::SplitHold {
            segment,
            new_end,
            new_start,
        })
    }

    pub fn stitch_hold(chart: &Chart, end: NoteId, start: NoteId) -> Result<Self, EditError> {
        let end_note = existing(chart, end)?;
        let start_note = existing(chart, start)?;
        if family_of(end_note)? != family_of(start_note)? {
            return Err(EditError::FamilyMismatch(end, start));
        }
        if end_note.next.is_some() {
            return Err(EditError::WrongRole(end));
        }
        if start_note.prev.is_some() {
            return Err(EditError::WrongRole(start));
        }
        if chart.chain_head(end).map(|n| n.id) == Some(start) {
            return Err(EditError::NotAdjacent(end, start));
        }
        if start_note.full_tick() < end_note.full_tick() {
            return Err(EditError::OutOfOrder(start));
        }
        Ok(Operation::StitchHold {
            end: end_note.clone(),
            start: start_note.clone(),
        })
    }

    /// Fill the gap after `start` with generated segments every `interval` ticks.
    pub fn bake_hold(chart: &mut Chart, start: NoteId, interval: i32) -> Result<Self, EditError> {
        let start_note = existing(chart, start)?.clone();
        family_of(&start_note)?;
        let end = start_note.next.ok_or(EditError::WrongRole(start))?;
        let end_note = existing(chart, end)?.clone();
        let segments = bake_hold_segments(&start_note, &end_note, interval, chart.ids_mut());
        Ok(Operation::BakeHold {
            start,
            end,
            segments,
        })
    }

    pub fn convert_to_instant_mask(chart: &mut Chart, mask: NoteId, chunk: i32) -> Result<Self, EditError> {
        let original = existing(chart, mask)?.clone();
        if !original.is_mask() {
            return Err(EditError::NotMask(mask));
        }
        let replacements = instant_mask_replacements(&original, chunk, chart.ids_mut());
        Ok(Operation::ConvertToInstantMask {
            original,
            replacements,
        })
    }

    pub fn edit_gimmick(chart: &Chart, after: Gimmick) -> Result<Self, EditError> {
        let before = chart
            .gimmick(after.id)
            .cloned()
            .ok_or(EditError::UnknownGimmick(after.id))?;
        Ok(Operation::EditGimmick { before, after })
    }

    pub fn delete_gimmick(chart: &Chart, id: GimmickId) -> Result<Self, EditError> {
        let gimmick = chart
            .gimmick(id)
            .cloned()
            .ok_or(EditError::UnknownGimmick(id))?;
        Ok(Operation::DeleteGimmick { gimmick })
    }

    // --- application ---

    pub fn redo(&self, chart: &mut Chart, selection: &mut Selection) {
        match self {
            Operation::InsertNote { note } => {
                chart.insert_note(note.clone());
            }
            Operation::DeleteNote { note } => {
                chart.remove_note(note.id);
                selection.remove(note.id);
            }
            Operation::EditNote { after, .. } => assign_note(chart, after),
            Operation::InsertHoldNote {
                note,
                last_placed,
                last_placed_type,
            } => {
                chart.insert_note(note.clone());
                chart.set_next(*last_placed, Some(note.id));
                chart.set_note_type(*last_placed, as_interior(*last_placed_type));
            }
            Operation::DeleteHoldNote { note, prev, next } => {
                chart.remove_note(note.id);
                selection.remove(note.id);
                match (prev, next) {
                    (Some(p), Some(n)) => {
                        chart.set_next(p.id, Some(n.id));
                        chart.set_prev(n.id, Some(p.id));
                    }
                    (Some(p), None) => {
                        chart.set_next(p.id, None);
                        chart.set_note_type(p.id, as_tail(p.note_type));
                    }
                    (None, Some(n)) => {
                        chart.set_prev(n.id, None);
                        chart.set_note_type(n.id, as_head(n.note_type));
                    }
                    (None, None) => {}
                }
            }
            Operation::InsertHoldSegment { segment, prev, next } => {
                chart.insert_note(segment.clone());
                chart.set_next(*prev, Some(segment.id));
                chart.set_prev(*next, Some(segment.id));
            }
            Operation::SplitHold {
                segment,
                new_end,
                new_start,
            } => {
                chart.remove_note(segment.id);
                selection.remove(segment.id);
                chart.insert_note(new_end.clone());
                chart.insert_note(new_start.clone());
                if let Some(prev) = segment.prev {
                    chart.set_next(prev, Some(new_end.id));
                }
                if let Some(next) = segment.next {
                    chart.set_prev(next, Some(new_start.id));
                }
            }
            Operation::StitchHold { end, start } => {
                let end_type = if end.prev.is_some() { as_interior(end.note_type) } else { end.note_type };
                let start_type = if start.next.is_some() {
                    start.note_type.chain_family().map_or(start.note_type, |f| f.note_type(ChainRole::Segment))
                } else {
                    start.note_type.chain_family().map_or(start.note_type, |f| f.note_type(ChainRole::End))
                };
                chart.set_next(end.id, Some(start.id));
                chart.set_note_type(end.id, end_type);
                chart.set_prev(start.id, Some(end.id));
                chart.set_note_type(start.id, start_type);
            }
            Operation::BakeHold { start, end, segments } => {
                let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
                    return;
                };
                for segment in segments {
                    chart.insert_note(segment.clone());
                }
                chart.set_next(*start, Some(first.id));
                chart.set_prev(*end, Some(last.id));
            }
            Operation::ConvertToInstantMask {
                original,
                replacements,
            } => {
                chart.remove_note(original.id);
                selection.remove(original.id);
                for mask in replacements {
                    chart.insert_note(mask.clone());
                }
            }
            Operation::InsertGimmick { gimmick } => {
                chart.insert_gimmick(gimmick.clone());
                chart.regenerate_timelines();
            }
            Operation::EditGimmick { after, .. } => {
                assign_gimmick(chart, after);
                chart.regenerate_timelines();
            }
            Operation::DeleteGimmick { gimmick } => {
                chart.remove_gimmick(gimmick.id);
                chart.regenerate_timelines();
            }
            Operation::Composite { operations } => {
                for operation in operations {
                    operation.redo(chart, selection);
                }
            }
        }
    }

    pub fn undo(&self, chart: &mut Chart, selection: &mut Selection) {
        match self {
            Operation::InsertNote { note } => {
                chart.remove_note(note.id);
                selection.remove(note.id);
            }
            Operation::DeleteNote { note } => {
                chart.insert_note(note.clone());
            }
            Operation::EditNote { before, .. } => assign_note(chart, before),
            Operation::InsertHoldNote {
                note,
                last_placed,
                last_placed_type,
            } => {
                chart.remove_note(note.id);
                selection.remove(note.id);
                chart.set_next(*last_placed, None);
                chart.set_note_type(*last_placed, *last_placed_type);
            }
            Operation::DeleteHoldNote { note, prev, next } => {
                chart.insert_note(note.clone());
                if let Some(p) = prev {
                    chart.set_next(p.id, Some(note.id));
                    chart.set_note_type(p.id, p.note_type);
                }
                if let Some(n) = next {
                    chart.set_prev(n.id, Some(note.id));
                    chart.set_note_type(n.id, n.note_type);
                }
            }
            Operation::InsertHoldSegment { segment, prev, next } => {
                chart.remove_note(segment.id);
                selection.remove(segment.id);
                chart.set_next(*prev, Some(*next));
                chart.set_prev(*next, Some(*prev));
            }
            Operation::SplitHold {
                segment,
                new_end,
                new_start,
            } => {
                for id in [new_end.id, new_start.id] {
                    chart.remove_note(id);
                    selection.remove(id);
                }
                chart.insert_note(segment.clone());
                if let Some(prev) = segment.prev {
                    chart.set_next(prev, Some(segment.id));
                }
                if let Some(next) = segment.next {
                    chart.set_prev(next, Some(segment.id));
                }
            }
            Operation::StitchHold { end, start } => {
                chart.set_next(end.id, None);
                chart.set_note_type(end.id, end.note_type);
                chart.set_prev(start.id, None);
                chart.set_note_type(start.id, start.note_type);
            }
            Operation::BakeHold { start, end, segments } => {
                if segments.is_empty() {
                    return;
                }
                for segment in segments {
                    chart.remove_note(segment.id);
                    selection.remove(segment.id);
                }
                chart.set_next(*start, Some(*end));
                chart.set_prev(*end, Some(*start));
            }
            Operation::ConvertToInstantMask {
                original,
                replacements,
            } => {
                for mask in replacements {
                    chart.remove_note(mask.id);
                    selection.remove(mask.id);
                }
                chart.insert_note(original.clone());
            }
            Operation::InsertGimmick { gimmick } => {
                chart.remove_gimmick(gimmick.id);
                chart.regenerate_timelines();
            }
            Operation::EditGimmick { before, .. } => {
                assign_gimmick(chart, before);
                chart.regenerate_timelines();
            }
            Operation::DeleteGimmick { gimmick } => {
                chart.insert_gimmick(gimmick.clone());
                chart.regenerate_timelines();
            }
            Operation::Composite { operations } => {
                for operation in operations.iter().rev() {
                    operation.undo(chart, selection);
                }
            }
        }
    }

    // --- introspection ---

    /// Stable name used in logs and replication messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::InsertNote { .. } => "insert_note",
            Operation::DeleteNote { .. } => "delete_note",
            Operation::EditNote { .. } => "edit_note",
            Operation::InsertHoldNote { .. } => "insert_hold_note",
            Operation::DeleteHoldNote { .. } => "delete_hold_note",
            Operation::InsertHoldSegment { .. } => "insert_hold_segment",
            Operation::SplitHold { .. } => "split_hold",
            Operation::StitchHold { .. } => "stitch_hold",
            Operation::BakeHold { .. } => "bake_hold",
            Operation::ConvertToInstantMask { .. } => "convert_to_instant_mask",
            Operation::InsertGimmick { .. } => "insert_gimmick",
            Operation::EditGimmick { .. } => "edit_gimmick",
            Operation::DeleteGimmick { .. } => "delete_gimmick",
            Operation::Composite { .. } => "composite",
        }
    }

    pub fn is_gimmick_operation(&self) -> bool {
        match self {
            Operation::InsertGimmick { .. } | Operation::EditGimmick { .. } | Operation::DeleteGimmick { .. } => true,
            Operation::Composite { operations } => operations.iter().any(Operation::is_gimmick_operation),
            _ => false,
        }
    }

    pub fn note_footprint(&self) -> Footprint<NoteId> {
        let links = |note: &Note| note.prev.into_iter().chain(note.next).collect::<Vec<_>>();
        match self {
            Operation::InsertNote { note } => Footprint::new(vec![], vec![note.id], vec![]),
            Operation::DeleteNote { note } => Footprint::new(vec![note.id], vec![], vec![note.id]),
            Operation::EditNote { before, .. } => Footprint::new(vec![before.id], vec![], vec![]),
            Operation::InsertHoldNote { note, last_placed, .. } => {
                Footprint::new(vec![*last_placed], vec![note.id], vec![])
            }
            Operation::DeleteHoldNote { note, prev, next } => {
                let mut required = vec![note.id];
                required.extend(prev.iter().chain(next.iter()).map(|l| l.id));
                Footprint::new(required, vec![], vec![note.id])
            }
            Operation::InsertHoldSegment { segment, prev, next } => {
                Footprint::new(vec![*prev, *next], vec![segment.id], vec![])
            }
            Operation::SplitHold {
                segment,
                new_end,
                new_start,
            } => {
                let mut required = vec![segment.id];
                required.extend(links(segment));
                Footprint::new(required, vec![new_end.id, new_start.id], vec![segment.id])
            }
            Operation::StitchHold { end, start } => Footprint::new(vec![end.id, start.id], vec![], vec![]),
            Operation::BakeHold { start, end, segments } => {
                Footprint::new(vec![*start, *end], segments.iter().map(|n| n.id).collect(), vec![])
            }
            Operation::ConvertToInstantMask {
                original,
                replacements,
            } => Footprint::new(
                vec![original.id],
                replacements.iter().map(|n| n.id).collect(),
                vec![original.id],
            ),
            Operation::InsertGimmick { .. } | Operation::EditGimmick { .. } | Operation::DeleteGimmick { .. } => {
                Footprint::default()
            }
            Operation::Composite { operations } => {
                Footprint::sequence(operations.iter().map(Operation::note_footprint))
            }
        }
    }

    pub fn gimmick_footprint(&self) -> Footprint<GimmickId> {
        match self {
            Operation::InsertGimmick { gimmick } => Footprint::new(vec![], vec![gimmick.id], vec![]),
            Operation::EditGimmick { before, .. } => Footprint::new(vec![before.id], vec![], vec![]),
            Operation::DeleteGimmick { gimmick } => {
                Footprint::new(vec![gimmick.id], vec![], vec![gimmick.id])
            }
            Operation::Composite { operations } => {
                Footprint::sequence(operations.iter().map(Operation::gimmick_footprint))
            }
            _ => Footprint::default(),
        }
    }

    /// Notes that must exist before `redo`.
    pub fn required_notes(&self) -> Vec<NoteId> {
        self.note_footprint().required
    }

    /// Gimmicks that must exist before `redo`.
    pub fn required_gimmicks(&self) -> Vec<GimmickId> {
        self.gimmick_footprint().required
    }
}

fn assign_note(chart: &mut Chart, content: &Note) {
    match chart.note_mut(content.id) {
        Some(note) => note.assign_content(content),
        None => tracing::debug!(id = %content.id, "edit on missing note"),
    }
}

fn assign_gimmick(chart: &mut Chart, content: &Gimmick) {
    match chart.gimmick_mut(content.id) {
        Some(gimmick) => gimmick.assign_content(content),
        None => tracing::debug!(id = %content.id, "edit on missing gimmick"),
    }
}

/// Signed shortest step around the ring from `from` to `to`.
fn shortest_arc(from: i32, to: i32) -> i32 {
    let half = POSITION_COUNT / 2;
    (to - from + half).rem_euclid(POSITION_COUNT) - half
}

/// Segments every `interval` ticks strictly between `start` and `end`,
/// interpolating position along the shorter arc and size linearly. The
/// result is already linked `start -> .. -> end`.
pub fn bake_hold_segments(start: &Note, end: &Note, interval: i32, ids: &mut IdAllocator) -> Vec<Note> {
    let interval = interval.max(1);
    let span = start.beat.ticks_until(&end.beat);
    let family = start.note_type.chain_family().unwrap_or(ChainFamily::Hold);
    let arc = shortest_arc(start.position, end.position);

    let mut segments = Vec::new();
    let mut offset = interval;
    while offset < span {
        let ratio = offset as f64 / span as f64;
        let position = wrap_position(start.position + (arc as f64 * ratio).round() as i32);
        let size = clamp_size(start.size + ((end.size - start.size) as f64 * ratio).round() as i32);
        let mut segment = Note::new(
            ids.next_note(),
            start.beat.offset(offset),
            family.note_type(ChainRole::Segment),
            position,
            size,
        )
        .with_layer(start.scroll_layer);
        segment.render_segment = false;
        segments.push(segment);
        offset += interval;
    }

    let chain: Vec<NoteId> = segments.iter().map(|n| n.id).collect();
    for (i, segment) in segments.iter_mut().enumerate() {
        segment.prev = Some(if i == 0 { start.id } else { chain[i - 1] });
        segment.next = Some(chain.get(i + 1).copied().unwrap_or(end.id));
    }
    segments
}

/// Split a mask into centre-animated pieces of at most `chunk` positions.
pub fn instant_mask_replacements(mask: &Note, chunk: i32, ids: &mut IdAllocator) -> Vec<Note> {
    let chunk = chunk.clamp(1, POSITION_COUNT);
    let mut replacements = Vec::new();
    let mut offset = 0;
    while offset < mask.size {
        let size = chunk.min(mask.size - offset);
        replacements.push(
            Note::new(ids.next_note(), mask.beat, mask.note_type, mask.position + offset, size)
                .with_layer(mask.scroll_layer)
                .with_mask_direction(MaskDirection::Center),
        );
        offset += chunk;
    }
    replacements
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_model::{BeatData, GimmickKind, TimeSig};

    /// Comparable snapshot of chart content, independent of storage order.
    fn content(chart: &Chart) -> (Vec<Note>, Vec<Gimmick>) {
        let mut notes: Vec<Note> = chart.notes().cloned().collect();
        notes.sort_by_key(|n| n.id);
        let mut gimmicks: Vec<Gimmick> = chart.gimmicks().to_vec();
        gimmicks.sort_by_key(|g| g.id);
        (notes, gimmicks)
    }

    fn assert_symmetric(chart: &mut Chart, operation: &Operation) {
        let mut selection = Selection::default();
        let before = content(chart);
        operation.redo(chart, &mut selection);
        chart.sort();
        assert!(chart.verify_chains().is_ok(), "{} broke chains: {:?}", operation.kind(), chart.verify_chains());
        operation.undo(chart, &mut selection);
        chart.sort();
        assert_eq!(content(chart), before, "{} did not undo cleanly", operation.kind());
    }

    fn base_chart() -> Chart {
        let mut chart = Chart::new();
        for kind in [GimmickKind::BpmChange { bpm: 120.0 }, GimmickKind::TimeSigChange(TimeSig::new(4, 4))] {
            let id = chart.next_gimmick_id();
            chart.insert_gimmick(Gimmick::new(id, BeatData::new(0, 0), kind));
        }
        chart.regenerate_timelines();
        chart
    }

    fn add(chart: &mut Chart, tick: i32, note_type: NoteType, position: i32) -> NoteId {
        let id = chart.next_note_id();
        chart.insert_note(Note::new(id, BeatData::from_full_tick(tick), note_type, position, 6));
        id
    }

    /// HoldStart(0) -> HoldSegment(480) -> HoldEnd(960)
    fn hold(chart: &mut Chart) -> [NoteId; 3] {
        let a = add(chart, 0, NoteType::HoldStart, 10);
        let b = add(chart, 480, NoteType::HoldSegment, 20);
        let c = add(chart, 960, NoteType::HoldEnd, 30);
        chart.set_next(a, Some(b));
        chart.set_prev(b, Some(a));
        chart.set_next(b, Some(c));
        chart.set_prev(c, Some(b));
        chart.sort();
        [a, b, c]
    }

    fn chain_types(chart: &Chart, id: NoteId) -> Vec<NoteType> {
        chart.references(id).iter().map(|n| n.note_type).collect()
    }

    #[test]
    fn insert_note_accepts_only_fresh_unlinked_notes() {
        let mut chart = base_chart();
        let [a, b, _] = hold(&mut chart);

        let existing = chart.note(a).unwrap().clone();
        assert_eq!(Operation::insert_note(&chart, existing), Err(EditError::DuplicateNote(a)));

        let beat = BeatData::from_full_tick(1920);
        let loose_end = Note::new(chart.next_note_id(), beat, NoteType::HoldEnd, 0, 6);
        assert_eq!(Operation::insert_note(&chart, loose_end.clone()), Err(EditError::WrongRole(loose_end.id)));

        let mut linked = Note::new(chart.next_note_id(), beat, NoteType::HoldStart, 0, 6);
        linked.next = Some(b);
        assert_eq!(Operation::insert_note(&chart, linked.clone()), Err(EditError::WrongRole(linked.id)));

        let head = Note::new(chart.next_note_id(), beat, NoteType::TraceStart, 0, 6);
        assert!(matches!(Operation::insert_note(&chart, head), Ok(Operation::InsertNote { .. })));
        let touch = Note::new(chart.next_note_id(), beat, NoteType::Touch, 0, 6);
        assert!(matches!(Operation::insert_note(&chart, touch), Ok(Operation::InsertNote { .. })));
    }

    #[test]
    fn insert_hold_note_then_undo() {
        let mut chart = base_chart();
        let mut selection = Selection::default();
        let start = add(&mut chart, 0, NoteType::HoldStart, 0);

        let end = Note::new(chart.next_note_id(), BeatData::from_full_tick(960), NoteType::HoldEnd, 0, 6);
        let end_id = end.id;
        let op = Operation::insert_hold_note(&chart, end, start).unwrap();
        op.redo(&mut chart, &mut selection);
        chart.sort();
        let chain: Vec<_> = chart.references(end_id).iter().map(|n| n.id).collect();
        assert_eq!(chain, vec![start, end_id]);
        assert_eq!(chart.references(start).len(), 2);

        op.undo(&mut chart, &mut selection);
        assert_eq!(chart.note(start).unwrap().next, None);
        assert!(!chart.contains_note(end_id));
    }

    #[test]
    fn appending_after_an_end_turns_it_into_a_segment() {
        let mut chart = base_chart();
        let [a, _, c] = hold(&mut chart);
        let tail = Note::new(chart.next_note_id(), BeatData::from_full_tick(1440), NoteType::Touch, 40, 6);
        let op = Operation::insert_hold_note(&chart, tail, c).unwrap();
        assert_symmetric(&mut chart.clone(), &op);

        op.redo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(
            chain_types(&chart, a),
            vec![NoteType::HoldStart, NoteType::HoldSegment, NoteType::HoldSegment, NoteType::HoldEnd]
        );
    }

    #[test]
    fn insert_hold_note_rejects_non_tail() {
        let mut chart = base_chart();
        let [a, _, _] = hold(&mut chart);
        let note = Note::new(chart.next_note_id(), BeatData::from_full_tick(2000), NoteType::HoldEnd, 0, 6);
        assert_eq!(Operation::insert_hold_note(&chart, note, a), Err(EditError::WrongRole(a)));
    }

    #[test]
    fn deleting_head_promotes_next() {
        let mut chart = base_chart();
        let [a, b, c] = hold(&mut chart);
        let op = Operation::delete_note(&chart, a).unwrap();
        assert_eq!(op.kind(), "delete_hold_note");
        let before = content(&chart);

        op.redo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(chain_types(&chart, b), vec![NoteType::HoldStart, NoteType::HoldEnd]);
        assert_eq!(chart.chain_head(c).map(|n| n.id), Some(b));
        assert!(chart.verify_chains().is_ok());

        op.undo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(content(&chart), before);
    }

    #[test]
    fn deleting_tail_promotes_prev() {
        let mut chart = base_chart();
        let [a, _, c] = hold(&mut chart);
        let op = Operation::delete_note(&chart, c).unwrap();
        assert_symmetric(&mut chart.clone(), &op);
        op.redo(&mut chart, &mut Selection::default());
        assert_eq!(chain_types(&chart, a), vec![NoteType::HoldStart, NoteType::HoldEnd]);
    }

    #[test]
    fn deleting_middle_splices_neighbours() {
        let mut chart = base_chart();
        let [a, b, c] = hold(&mut chart);
        let op = Operation::delete_note(&chart, b).unwrap();
        op.redo(&mut chart, &mut Selection::default());
        assert_eq!(chart.note(a).unwrap().next, Some(c));
        assert_eq!(chart.note(c).unwrap().prev, Some(a));
        assert!(chart.verify_chains().is_ok());
    }

    #[test]
    fn deleting_start_of_two_note_hold_leaves_lone_start() {
        let mut chart = base_chart();
        let a = add(&mut chart, 0, NoteType::HoldStart, 10);
        let c = add(&mut chart, 960, NoteType::HoldEnd, 10);
        chart.set_next(a, Some(c));
        chart.set_prev(c, Some(a));
        let op = Operation::delete_note(&chart, a).unwrap();
        op.redo(&mut chart, &mut Selection::default());
        assert_eq!(chart.note(c).unwrap().note_type, NoteType::HoldStart);
        assert!(chart.verify_chains().is_ok());
    }

    #[test]
    fn delete_notes_handles_adjacent_chain_members() {
        let mut chart = base_chart();
        let [a, b, c] = hold(&mut chart);
        let op = Operation::delete_notes(&chart, &[b, c, b]).unwrap();
        let before = content(&chart);
        op.redo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(chart.note_count(), 1);
        assert_eq!(chart.note(a).unwrap().next, None);
        assert_eq!(chart.note(a).unwrap().note_type, NoteType::HoldStart);
        assert!(chart.verify_chains().is_ok());
        op.undo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(content(&chart), before);
    }

    #[test]
    fn every_operation_undoes_exactly() {
        let fresh = || {
            let mut chart = base_chart();
            let ids = hold(&mut chart);
            let touch = add(&mut chart, 1920, NoteType::Touch, 5);
            let mask = add(&mut chart, 3840, NoteType::MaskAdd, 0);
            chart.note_mut(mask).unwrap().size = 15;
            (chart, ids, touch, mask)
        };

        let (mut chart, [a, b, _], touch, mask) = fresh();
        let mut ops = Vec::new();

        let new_touch = Note::new(chart.next_note_id(), BeatData::new(5, 0), NoteType::SnapForward, 7, 9);
        ops.push(Operation::InsertNote { note: new_touch });
        ops.push(Operation::delete_note(&chart, touch).unwrap());
        let mut edited = chart.note(touch).unwrap().clone();
        edited.position = 44;
        edited.beat = BeatData::new(1, 17);
        ops.push(Operation::edit_note(&chart, edited).unwrap());
        for id in [a, b] {
            ops.push(Operation::delete_note(&chart, id).unwrap());
        }
        let segment = Note::new(chart.next_note_id(), BeatData::from_full_tick(240), NoteType::Touch, 15, 6);
        ops.push(Operation::insert_hold_segment(&chart, segment, a).unwrap());
        ops.push(Operation::split_hold(&mut chart, b).unwrap());
        ops.push(Operation::bake_hold(&mut chart, a, 60).unwrap());
        ops.push(Operation::convert_to_instant_mask(&mut chart, mask, 4).unwrap());
        let gimmick = Gimmick::new(chart.next_gimmick_id(), BeatData::new(1, 0), GimmickKind::StopStart);
        ops.push(Operation::InsertGimmick { gimmick });
        let mut tempo = chart.gimmicks()[0].clone();
        tempo.kind = GimmickKind::BpmChange { bpm: 200.0 };
        ops.push(Operation::edit_gimmick(&chart, tempo).unwrap());
        let sig = chart.gimmicks()[1].id;
        ops.push(Operation::delete_gimmick(&chart, sig).unwrap());

        for op in &ops {
            assert_symmetric(&mut chart, op);
        }
    }

    #[test]
    fn stitch_and_split_are_inverse_shapes() {
        let mut chart = base_chart();
        let [a, b, c] = hold(&mut chart);
        let split = Operation::split_hold(&mut chart, b).unwrap();
        let Operation::SplitHold { new_end, new_start, .. } = &split else {
            unreachable!()
        };
        split.redo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(chain_types(&chart, a), vec![NoteType::HoldStart, NoteType::HoldEnd]);
        assert_eq!(chain_types(&chart, c), vec![NoteType::HoldStart, NoteType::HoldEnd]);
        assert!(chart.verify_chains().is_ok());

        let stitch = Operation::stitch_hold(&chart, new_end.id, new_start.id).unwrap();
        stitch.redo(&mut chart, &mut Selection::default());
        chart.sort();
        assert_eq!(
            chain_types(&chart, a),
            vec![NoteType::HoldStart, NoteType::HoldSegment, NoteType::HoldSegment, NoteType::HoldEnd]
        );
        assert!(chart.verify_chains().is_ok());
        assert_eq!(Operation::stitch_hold(&chart, c, a), Err(EditError::NotAdjacent(c, a)));
    }

    #[test]
    fn stitch_rejects_same_chain() {
        let mut chart = base_chart();
        let [a, _, c] = hold(&mut chart);
        chart.note_mut(c).unwrap().beat = BeatData::from_full_tick(0);
        assert_eq!(Operation::stitch_hold(&chart, c, a), Err(EditError::NotAdjacent(c, a)));
    }

    #[test]
    fn bake_interpolates_along_short_arc() {
        let mut ids = IdAllocator::new(0);
        let mut start = Note::new(NoteId(1000), BeatData::from_full_tick(0), NoteType::HoldStart, 58, 4);
        let end = Note::new(NoteId(1001), BeatData::from_full_tick(240), NoteType::HoldEnd, 2, 8);
        start.next = Some(end.id);

        let segments = bake_hold_segments(&start, &end, 60, &mut ids);
        assert_eq!(segments.len(), 3);
        let positions: Vec<i32> = segments.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![59, 0, 1]);
        let sizes: Vec<i32> = segments.iter().map(|n| n.size).collect();
        assert_eq!(sizes, vec![5, 6, 7]);
        assert_eq!(segments[0].prev, Some(start.id));
        assert_eq!(segments[2].next, Some(end.id));
        assert!(segments.iter().all(|n| n.note_type == NoteType::HoldSegment && !n.render_segment));
    }

    #[test]
    fn bake_on_short_gap_is_a_no_op() {
        let mut chart = base_chart();
        let [a, b, _] = hold(&mut chart);
        let op = Operation::bake_hold(&mut chart, a, 480).unwrap();
        let before = content(&chart);
        op.redo(&mut chart, &mut Selection::default());
        assert_eq!(content(&chart), before);
        assert_eq!(chart.note(a).unwrap().next, Some(b));
    }

    #[test]
    fn instant_mask_chunks_cover_the_mask() {
        let mut ids = IdAllocator::new(0);
        let mask = Note::new(NoteId(9), BeatData::new(2, 0), NoteType::MaskRemove, 55, 11)
            .with_mask_direction(MaskDirection::Clockwise);
        let pieces = instant_mask_replacements(&mask, 4, &mut ids);
        let shape: Vec<(i32, i32)> = pieces.iter().map(|n| (n.position, n.size)).collect();
        assert_eq!(shape, vec![(55, 4), (59, 4), (3, 3)]);
        assert!(pieces.iter().all(|n| n.mask_direction == Some(MaskDirection::Center)));
        assert!(pieces.iter().all(|n| n.note_type == NoteType::MaskRemove));
    }

    #[test]
    fn gimmick_operations_regenerate_timelines() {
        let mut chart = base_chart();
        let mut selection = Selection::default();
        let bpm = chart.gimmicks()[0].clone();
        let mut faster = bpm.clone();
        faster.kind = GimmickKind::BpmChange { bpm: 240.0 };
        let op = Operation::edit_gimmick(&chart, faster).unwrap();

        op.redo(&mut chart, &mut selection);
        assert!((chart.measure_decimal_to_timestamp(1.0) - 1000.0).abs() < 1e-9);
        op.undo(&mut chart, &mut selection);
        assert!((chart.measure_decimal_to_timestamp(1.0) - 2000.0).abs() < 1e-9);

        let delete = Operation::delete_gimmick(&chart, bpm.id).unwrap();
        delete.redo(&mut chart, &mut selection);
        assert!(chart.metre().is_empty());
        delete.undo(&mut chart, &mut selection);
        assert!(!chart.metre().is_empty());
    }

    #[test]
    fn delete_removes_from_selection() {
        let mut chart = base_chart();
        let id = add(&mut chart, 0, NoteType::Touch, 0);
        let mut selection = Selection::default();
        selection.select(id);
        Operation::delete_note(&chart, id).unwrap().redo(&mut chart, &mut selection);
        assert!(selection.is_empty());
    }

    #[test]
    fn composite_footprint_hides_internal_ids() {
        let mut chart = base_chart();
        let start = Note::new(chart.next_note_id(), BeatData::new(0, 0), NoteType::HoldStart, 0, 4);
        let start_id = start.id;
        let end = Note::new(chart.next_note_id(), BeatData::new(0, 960), NoteType::HoldEnd, 0, 4);
        let end_id = end.id;
        let mut scratch = chart.clone();
        let first = Operation::InsertNote { note: start };
        first.redo(&mut scratch, &mut Selection::default());
        let second = Operation::insert_hold_note(&scratch, end, start_id).unwrap();
        let composite = Operation::Composite {
            operations: vec![first, second],
        };

        assert!(composite.required_notes().is_empty());
        let footprint = composite.note_footprint();
        assert_eq!(footprint.after_redo(), vec![start_id, end_id]);
        assert_symmetric(&mut chart, &composite);
    }

    #[test]
    fn operations_serialize_with_kind_tag() {
        let note = Note::new(NoteId(7), BeatData::new(1, 0), NoteType::Touch, 3, 4);
        let op = Operation::InsertNote { note };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "insert_note");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
