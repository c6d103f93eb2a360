use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::beat::{BeatData, TimeSig};
use crate::gimmick::Gimmick;
use crate::ids::{GimmickId, IdAllocator, NoteId};
use crate::metre::MetreTimeline;
use crate::note::{Note, NoteType};
use crate::time_scale::ScrollScale;

/// Descriptive header data carried by chart files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartMetadata {
    pub title: String,
    pub rubi: String,
    pub artist: String,
    pub author: String,
    pub difficulty: i32,
    pub level: f64,
    pub clear_threshold: f64,
    pub bpm_text: String,
    pub preview_start: f64,
    pub preview_length: f64,
    pub bgm_file_path: String,
    /// Seconds the audio is shifted against the chart.
    pub bgm_offset: f64,
    pub bga_file_path: String,
    pub bga_offset: f64,
    pub comments: Vec<String>,
    /// Legacy dialect header fields.
    pub score_id: String,
    pub score_version: String,
    pub game_version: String,
}

impl Default for ChartMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            rubi: String::new(),
            artist: String::new(),
            author: String::new(),
            difficulty: 0,
            level: 0.0,
            clear_threshold: 0.83,
            bpm_text: String::new(),
            preview_start: 0.0,
            preview_length: 10.0,
            bgm_file_path: String::new(),
            bgm_offset: 0.0,
            bga_file_path: String::new(),
            bga_offset: 0.0,
            comments: Vec::new(),
            score_id: String::new(),
            score_version: String::new(),
            game_version: String::new(),
        }
    }
}

/// The chart aggregate: sole owner of notes and gimmicks, plus the timelines
/// derived from them.
///
/// Notes live in an id-keyed arena with a separate ordering index. After a
/// structural mutation the ordering is stale until [`Chart::sort`] runs, and
/// the timelines are stale until [`Chart::regenerate_timelines`] runs. Edits
/// are expected to go through the operation layer, which is the only place
/// that rewires chains.
#[derive(Debug, Clone, Default)]
pub struct Chart {
    pub metadata: ChartMetadata,
    notes: HashMap<NoteId, Note>,
    note_order: Vec<NoteId>,
    gimmicks: Vec<Gimmick>,
    metre: MetreTimeline,
    scroll_scale: ScrollScale,
    ids: IdAllocator,
}

impl Chart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(namespace: u16) -> Self {
        Self {
            ids: IdAllocator::new(namespace),
            ..Default::default()
        }
    }

    /// Drop all content. The id namespace is kept.
    pub fn clear(&mut self) {
        self.metadata = ChartMetadata::default();
        self.notes.clear();
        self.note_order.clear();
        self.gimmicks.clear();
        self.metre = MetreTimeline::default();
        self.scroll_scale = ScrollScale::default();
        self.ids.reset();
    }

    pub fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    pub fn next_note_id(&mut self) -> NoteId {
        self.ids.next_note()
    }

    pub fn next_gimmick_id(&mut self) -> GimmickId {
        self.ids.next_gimmick()
    }

    // --- notes ---

    /// Notes in FullTick order (as of the last [`Chart::sort`]).
    pub fn notes(&self) -> impl Iterator<Item = &Note> + '_ {
        self.note_order.iter().filter_map(|id| self.notes.get(id))
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn note_mut(&mut self, id: NoteId) -> Option<&mut Note> {
        self.notes.get_mut(&id)
    }

    pub fn contains_note(&self, id: NoteId) -> bool {
        self.notes.contains_key(&id)
    }

    /// Add a note, replacing any note with the same id.
    pub fn insert_note(&mut self, note: Note) -> Option<Note> {
        self.ids.observe(note.id.0);
        let id = note.id;
        let previous = self.notes.insert(id, note);
        if previous.is_none() {
            self.note_order.push(id);
        }
        previous
    }

    pub fn remove_note(&mut self, id: NoteId) -> Option<Note> {
        let removed = self.notes.remove(&id)?;
        self.note_order.retain(|other| *other != id);
        Some(removed)
    }

    pub fn set_next(&mut self, id: NoteId, next: Option<NoteId>) {
        if let Some(note) = self.notes.get_mut(&id) {
            note.next = next;
        } else {
            tracing::debug!(%id, "set_next on missing note");
        }
    }

    pub fn set_prev(&mut self, id: NoteId, prev: Option<NoteId>) {
        if let Some(note) = self.notes.get_mut(&id) {
            note.prev = prev;
        } else {
            tracing::debug!(%id, "set_prev on missing note");
        }
    }

    pub fn set_note_type(&mut self, id: NoteId, note_type: NoteType) {
        if let Some(note) = self.notes.get_mut(&id) {
            note.note_type = note_type;
        } else {
            tracing::debug!(%id, "set_note_type on missing note");
        }
    }

    /// Give externally produced notes (e.g. a clipboard paste) fresh ids,
    /// keeping links that point inside the batch and dropping the rest.
    pub fn adopt_notes(&mut self, notes: Vec<Note>) -> Vec<Note> {
        let mapping: HashMap<NoteId, NoteId> = notes
            .iter()
            .map(|n| (n.id, self.ids.next_note()))
            .collect();
        notes
            .into_iter()
            .map(|mut note| {
                note.id = mapping[&note.id];
                note.prev = note.prev.and_then(|p| mapping.get(&p).copied());
                note.next = note.next.and_then(|n| mapping.get(&n).copied());
                note
            })
            .collect()
    }

    // --- gimmicks ---

    /// Gimmicks in FullTick order (as of the last [`Chart::sort`]).
    pub fn gimmicks(&self) -> &[Gimmick] {
        &self.gimmicks
    }

    pub fn gimmick(&self, id: GimmickId) -> Option<&Gimmick> {
        self.gimmicks.iter().find(|g| g.id == id)
    }

    pub fn gimmick_mut(&mut self, id: GimmickId) -> Option<&mut Gimmick> {
        self.gimmicks.iter_mut().find(|g| g.id == id)
    }

    pub fn insert_gimmick(&mut self, gimmick: Gimmick) {
        self.ids.observe(gimmick.id.0);
        match self.gimmick_mut(gimmick.id) {
            Some(existing) => *existing = gimmick,
            None => self.gimmicks.push(gimmick),
        }
    }

    pub fn remove_gimmick(&mut self, id: GimmickId) -> Option<Gimmick> {
        let idx = self.gimmicks.iter().position(|g| g.id == id)?;
        Some(self.gimmicks.remove(idx))
    }

    // --- ordering & derived timelines ---

    /// Stable re-sort of notes and gimmicks by FullTick.
    pub fn sort(&mut self) {
        let notes = &self.notes;
        self.note_order
            .sort_by_key(|id| notes.get(id).map(Note::full_tick).unwrap_or(i32::MAX));
        self.gimmicks.sort_by_key(Gimmick::full_tick);
    }

    pub fn is_sorted(&self) -> bool {
        let notes_sorted = self
            .notes()
            .zip(self.notes().skip(1))
            .all(|(a, b)| a.full_tick() <= b.full_tick());
        let gimmicks_sorted = self
            .gimmicks
            .windows(2)
            .all(|w| w[0].full_tick() <= w[1].full_tick());
        notes_sorted && gimmicks_sorted
    }

    /// Rebuild the metre timeline and every scroll layer from the gimmicks,
    /// then refresh each gimmick's timestamp.
    pub fn regenerate_timelines(&mut self) {
        let mut sorted = self.gimmicks.clone();
        sorted.sort_by_key(Gimmick::full_tick);

        self.metre = MetreTimeline::build(&sorted);
        self.scroll_scale = ScrollScale::build(&sorted, &self.metre);
        for gimmick in &mut self.gimmicks {
            gimmick.timestamp = self
                .metre
                .measure_decimal_to_timestamp(gimmick.beat.measure_decimal());
        }
        tracing::debug!(
            metre_events = self.metre.events().len(),
            gimmicks = self.gimmicks.len(),
            "regenerated timelines"
        );
    }

    pub fn metre(&self) -> &MetreTimeline {
        &self.metre
    }

    pub fn scroll_scale(&self) -> &ScrollScale {
        &self.scroll_scale
    }

    pub fn start_bpm(&self) -> Option<f64> {
        self.gimmicks
            .iter()
            .find(|g| g.full_tick() == 0 && g.bpm().is_some())
            .and_then(Gimmick::bpm)
    }

    pub fn start_time_sig(&self) -> Option<TimeSig> {
        self.gimmicks
            .iter()
            .find(|g| g.full_tick() == 0 && g.time_sig().is_some())
            .and_then(Gimmick::time_sig)
    }

    pub fn measure_decimal_to_timestamp(&self, measure_decimal: f64) -> f64 {
        self.metre.measure_decimal_to_timestamp(measure_decimal)
    }

    pub fn timestamp_to_measure_decimal(&self, timestamp: f64) -> f64 {
        self.metre.timestamp_to_measure_decimal(timestamp)
    }

    pub fn beat_to_timestamp(&self, beat: &BeatData) -> f64 {
        self.measure_decimal_to_timestamp(beat.measure_decimal())
    }

    pub fn scaled_measure_decimal(&self, measure_decimal: f64, show_hi_speed: bool, layer: usize) -> f64 {
        self.scroll_scale
            .scaled_measure_decimal(measure_decimal, show_hi_speed, layer)
    }

    pub fn unscaled_measure_decimal(&self, scaled: f64, show_hi_speed: bool, layer: usize) -> f64 {
        self.scroll_scale
            .unscaled_measure_decimal(scaled, show_hi_speed, layer)
    }

    /// Position of the last note or gimmick.
    pub fn last_beat(&self) -> Option<BeatData> {
        let last_note = self.notes.values().map(|n| n.beat).max_by_key(BeatData::full_tick);
        let last_gimmick = self.gimmicks.iter().map(|g| g.beat).max_by_key(BeatData::full_tick);
        match (last_note, last_gimmick) {
            (Some(a), Some(b)) => Some(if a.full_tick() >= b.full_tick() { a } else { b }),
            (a, b) => a.or(b),
        }
    }
}
