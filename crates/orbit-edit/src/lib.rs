// Chart editing: reversible operations, undo/redo history, shared session, peer replication

mod config;
mod editor;
mod error;
mod history;
mod operation;
pub mod replication;
mod selection;
mod session;

pub use config::EditorConfig;
pub use editor::{ChartEditor, HistoryEvent, Origin};
pub use error::{EditError, ReplicationError};
pub use history::UndoRedoManager;
pub use operation::{Footprint, LinkSnapshot, Operation, bake_hold_segments, instant_mask_replacements};
pub use replication::{Direction, OperationMessage};
pub use selection::Selection;
pub use session::ChartSession;
