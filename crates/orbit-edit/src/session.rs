use std::path::Path;
use std::sync::Arc;

use orbit_model::format;
use orbit_model::{ChartError, LoadReport};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::editor::{ChartEditor, HistoryEvent};

/// A chart editor shared between the UI, renderers, timers and the
/// replication task.
///
/// Access is only through closures, so a guard never outlives the call and
/// can never be held across an `.await`.
#[derive(Clone)]
pub struct ChartSession {
    inner: Arc<RwLock<ChartEditor>>,
}

impl ChartSession {
    pub fn new(editor: ChartEditor) -> Self {
        Self {
            inner: Arc::new(RwLock::new(editor)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&ChartEditor) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut ChartEditor) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Read the file without holding the lock, then swap the chart in under
    /// the write lock. A read failure leaves the current chart untouched.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadReport, ChartError> {
        let path = path.as_ref();
        let text = format::read_text(path)?;
        self.write(|editor| {
            let report = editor.load_text(&text)?;
            editor.set_file_path(path);
            Ok(report)
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.read(ChartEditor::subscribe)
    }
}

impl Default for ChartSession {
    fn default() -> Self {
        Self::new(ChartEditor::default())
    }
}
