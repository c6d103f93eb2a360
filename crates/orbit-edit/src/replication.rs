use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ReplicationError;
use crate::operation::Operation;
use crate::session::ChartSession;

/// Which half of an operation a history step applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Undo,
    Redo,
}

/// One history step as exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMessage {
    pub direction: Direction,
    pub operation: Operation,
}

impl OperationMessage {
    pub fn new(direction: Direction, operation: Operation) -> Self {
        Self { direction, operation }
    }

    pub fn to_json(&self) -> Result<String, ReplicationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ReplicationError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Apply text frames from the relay to `session` until the channel closes.
/// Frames that fail to decode or resolve are logged and dropped. Returns the
/// number of operations applied.
pub async fn run_inbound(session: ChartSession, mut frames: mpsc::UnboundedReceiver<String>) -> usize {
    let mut applied = 0;
    while let Some(frame) = frames.recv().await {
        let result = OperationMessage::from_json(&frame).and_then(|message| {
            let kind = message.operation.kind();
            session.write(|editor| editor.apply_remote(message)).map(|()| kind)
        });
        match result {
            Ok(kind) => {
                applied += 1;
                debug!(kind, "applied remote operation");
            }
            Err(e) => warn!("Dropping remote operation: {}", e),
        }
    }
    applied
}

/// Serialize local history steps from an editor outbox into text frames for
/// the relay. Stops when either side closes. Returns the number of frames sent.
pub async fn run_outbound(
    mut outbox: mpsc::UnboundedReceiver<OperationMessage>,
    frames: mpsc::UnboundedSender<String>,
) -> usize {
    let mut sent = 0;
    while let Some(message) = outbox.recv().await {
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {} operation: {}", message.operation.kind(), e);
                continue;
            }
        };
        if frames.send(frame).is_err() {
            debug!("relay channel closed");
            break;
        }
        sent += 1;
    }
    sent
}
