use std::path::{Path, PathBuf};

use orbit_model::format::{self, clipboard};
use orbit_model::{
    BeatData, Chart, ChartError, ChartFormat, Gimmick, GimmickId, GimmickKind, LoadReport, Note, NoteId, TimeSig,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::error::{EditError, ReplicationError};
use crate::history::UndoRedoManager;
use crate::operation::Operation;
use crate::replication::{Direction, OperationMessage};
use crate::selection::Selection;

const EVENT_CAPACITY: usize = 64;

/// Where a history step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Sent to subscribers after every applied history step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub revision: u64,
    pub direction: Direction,
    pub kind: &'static str,
    pub origin: Origin,
}

/// An open chart document: the chart, its selection and its edit history.
///
/// Every mutation goes through an [`Operation`]. After each step the chart is
/// re-sorted, the revision is bumped and a [`HistoryEvent`] is broadcast.
/// Local steps are also forwarded to the outbox when one is attached.
pub struct ChartEditor {
    chart: Chart,
    selection: Selection,
    history: UndoRedoManager,
    config: EditorConfig,
    revision: u64,
    saved: bool,
    file_path: Option<PathBuf>,
    events: broadcast::Sender<HistoryEvent>,
    outbox: Option<mpsc::UnboundedSender<OperationMessage>>,
}

impl Default for ChartEditor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl ChartEditor {
    pub fn new(mut config: EditorConfig) -> Self {
        config.validate();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            chart: Chart::with_namespace(config.id_namespace),
            selection: Selection::default(),
            history: UndoRedoManager::new(config.undo_limit),
            config,
            revision: 0,
            saved: true,
            file_path: None,
            events,
            outbox: None,
        }
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn history(&self) -> &UndoRedoManager {
        &self.history
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn set_config(&mut self, mut config: EditorConfig) {
        config.validate();
        self.history.set_limit(config.undo_limit);
        self.chart.ids_mut().set_namespace(config.id_namespace);
        self.config = config;
    }

    pub fn next_note_id(&mut self) -> NoteId {
        self.chart.next_note_id()
    }

    pub fn next_gimmick_id(&mut self) -> GimmickId {
        self.chart.next_gimmick_id()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    pub fn set_outbox(&mut self, outbox: Option<mpsc::UnboundedSender<OperationMessage>>) {
        self.outbox = outbox;
    }

    // --- documents ---

    /// Start an empty chart with the mandatory tempo and time signature at tick 0.
    pub fn new_chart(&mut self, bpm: f64, time_sig: TimeSig) {
        self.chart.clear();
        for kind in [GimmickKind::BpmChange { bpm }, GimmickKind::TimeSigChange(time_sig)] {
            let id = self.chart.next_gimmick_id();
            self.chart.insert_gimmick(Gimmick::new(id, BeatData::new(0, 0), kind));
        }
        self.chart.regenerate_timelines();
        self.file_path = None;
        self.reset_document();
    }

    /// Replace the chart with decoded text. History and selection are reset.
    pub fn load_text(&mut self, text: &str) -> Result<LoadReport, ChartError> {
        let report = format::load_str(&mut self.chart, text)?;
        self.reset_document();
        Ok(report)
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport, ChartError> {
        let path = path.as_ref();
        let text = format::read_text(path)?;
        let report = self.load_text(&text)?;
        self.set_file_path(path);
        info!(path = %path.display(), skipped = report.skipped_lines.len(), "opened chart");
        Ok(report)
    }

    pub(crate) fn set_file_path(&mut self, path: &Path) {
        self.file_path = Some(path.to_path_buf());
    }

    /// Save to `path`. Without an explicit format the extension decides,
    /// then the configured default.
    pub fn save_file<P: AsRef<Path>>(&mut self, path: P, format: Option<ChartFormat>) -> Result<(), ChartError> {
        let path = path.as_ref();
        let format = format
            .or_else(|| ChartFormat::from_path(path))
            .unwrap_or(self.config.default_format);
        format::write_file(&self.chart, path, format)?;
        self.file_path = Some(path.to_path_buf());
        self.saved = true;
        Ok(())
    }

    fn reset_document(&mut self) {
        self.history.clear();
        self.selection.clear();
        self.revision += 1;
        self.saved = true;
    }

    // --- history ---

    /// Apply `operation` and record it in the undo history.
    pub fn invoke_and_push(&mut self, operation: Operation) {
        operation.redo(&mut self.chart, &mut self.selection);
        self.on_history_changed(Direction::Redo, &operation, Origin::Local);
        self.history.push(operation);
    }

    pub fn undo(&mut self) -> Result<&'static str, EditError> {
        let operation = self
            .history
            .undo(&mut self.chart, &mut self.selection)
            .cloned()
            .ok_or(EditError::EmptyHistory("undo"))?;
        self.on_history_changed(Direction::Undo, &operation, Origin::Local);
        Ok(operation.kind())
    }

    pub fn redo(&mut self) -> Result<&'static str, EditError> {
        let operation = self
            .history
            .redo(&mut self.chart, &mut self.selection)
            .cloned()
            .ok_or(EditError::EmptyHistory("redo"))?;
        self.on_history_changed(Direction::Redo, &operation, Origin::Local);
        Ok(operation.kind())
    }

    /// Apply a step received from a peer. Its operands must resolve against
    /// this chart. The step is not recorded locally and not echoed.
    pub fn apply_remote(&mut self, message: OperationMessage) -> Result<(), ReplicationError> {
        let OperationMessage { direction, operation } = message;
        let kind = operation.kind();
        let (notes, gimmicks) = match direction {
            Direction::Redo => (operation.required_notes(), operation.required_gimmicks()),
            Direction::Undo => (
                operation.note_footprint().after_redo(),
                operation.gimmick_footprint().after_redo(),
            ),
        };
        if let Some(id) = notes.into_iter().find(|id| !self.chart.contains_note(*id)) {
            return Err(ReplicationError::MissingNote { kind, id });
        }
        if let Some(id) = gimmicks.into_iter().find(|id| self.chart.gimmick(*id).is_none()) {
            return Err(ReplicationError::MissingGimmick { kind, id });
        }

        match direction {
            Direction::Redo => operation.redo(&mut self.chart, &mut self.selection),
            Direction::Undo => operation.undo(&mut self.chart, &mut self.selection),
        }
        self.on_history_changed(direction, &operation, Origin::Remote);
        Ok(())
    }

    fn on_history_changed(&mut self, direction: Direction, operation: &Operation, origin: Origin) {
        self.chart.sort();
        self.revision += 1;
        self.saved = false;
        debug!(
            revision = self.revision,
            kind = operation.kind(),
            ?direction,
            ?origin,
            "history changed"
        );

        // No subscribers is fine.
        let _ = self.events.send(HistoryEvent {
            revision: self.revision,
            direction,
            kind: operation.kind(),
            origin,
        });

        if origin == Origin::Local && self.config.broadcast_operations {
            let closed = self
                .outbox
                .as_ref()
                .is_some_and(|outbox| outbox.send(OperationMessage::new(direction, operation.clone())).is_err());
            if closed {
                warn!("Replication outbox closed; detaching");
                self.outbox = None;
            }
        }
    }

    // --- edits ---

    pub fn insert_note(&mut self, note: Note) -> Result<NoteId, EditError> {
        let id = note.id;
        let operation = Operation::insert_note(&self.chart, note)?;
        self.invoke_and_push(operation);
        Ok(id)
    }

    pub fn delete_note(&mut self, id: NoteId) -> Result<(), EditError> {
        let operation = Operation::delete_note(&self.chart, id)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    /// Delete every selected note as a single undo step.
    pub fn delete_selected(&mut self) -> Result<usize, EditError> {
        let ids: Vec<NoteId> = self.selection.ids().filter(|id| self.chart.contains_note(*id)).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let operation = Operation::delete_notes(&self.chart, &ids)?;
        self.invoke_and_push(operation);
        Ok(ids.len())
    }

    pub fn edit_note(&mut self, after: Note) -> Result<(), EditError> {
        let operation = Operation::edit_note(&self.chart, after)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    pub fn insert_hold_note(&mut self, note: Note, last_placed: NoteId) -> Result<NoteId, EditError> {
        let id = note.id;
        let operation = Operation::insert_hold_note(&self.chart, note, last_placed)?;
        self.invoke_and_push(operation);
        Ok(id)
    }

    pub fn insert_hold_segment(&mut self, segment: Note, prev: NoteId) -> Result<NoteId, EditError> {
        let id = segment.id;
        let operation = Operation::insert_hold_segment(&self.chart, segment, prev)?;
        self.invoke_and_push(operation);
        Ok(id)
    }

    pub fn split_hold(&mut self, segment: NoteId) -> Result<(), EditError> {
        let operation = Operation::split_hold(&mut self.chart, segment)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    pub fn stitch_hold(&mut self, end: NoteId, start: NoteId) -> Result<(), EditError> {
        let operation = Operation::stitch_hold(&self.chart, end, start)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    /// Generate segments between `start` and its successor at the configured interval.
    pub fn bake_hold(&mut self, start: NoteId) -> Result<(), EditError> {
        let operation = Operation::bake_hold(&mut self.chart, start, self.config.bake_hold_interval)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    pub fn convert_to_instant_mask(&mut self, mask: NoteId) -> Result<(), EditError> {
        let operation = Operation::convert_to_instant_mask(&mut self.chart, mask, self.config.instant_mask_chunk)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    pub fn insert_gimmick(&mut self, gimmick: Gimmick) -> GimmickId {
        let id = gimmick.id;
        self.invoke_and_push(Operation::InsertGimmick { gimmick });
        id
    }

    pub fn edit_gimmick(&mut self, after: Gimmick) -> Result<(), EditError> {
        let operation = Operation::edit_gimmick(&self.chart, after)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    pub fn delete_gimmick(&mut self, id: GimmickId) -> Result<(), EditError> {
        let operation = Operation::delete_gimmick(&self.chart, id)?;
        self.invoke_and_push(operation);
        Ok(())
    }

    // --- clipboard ---

    pub fn copy_selection(&self) -> String {
        let notes: Vec<Note> = self.selection.notes(&self.chart).into_iter().cloned().collect();
        clipboard::encode_notes(&notes)
    }

    /// Paste clipboard text shifted by `offset_ticks`, as one undo step.
    /// The pasted notes become the selection.
    pub fn paste(&mut self, text: &str, offset_ticks: i32) -> Vec<NoteId> {
        let notes = self.chart.adopt_notes(clipboard::decode_notes(text));
        if notes.is_empty() {
            return Vec::new();
        }
        let ids: Vec<NoteId> = notes.iter().map(|n| n.id).collect();
        let operations = notes
            .into_iter()
            .map(|mut note| {
                note.beat = note.beat.offset(offset_ticks);
                Operation::InsertNote { note }
            })
            .collect();
        self.invoke_and_push(Operation::Composite { operations });

        self.selection.clear();
        for id in &ids {
            self.selection.select(*id);
        }
        ids
    }
}
