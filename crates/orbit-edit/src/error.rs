use orbit_model::{GimmickId, NoteId};
use thiserror::Error;

/// Reasons an edit cannot be built against the current chart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("Note {0} does not exist")]
    UnknownNote(NoteId),

    #[error("Note {0} is already in the chart")]
    DuplicateNote(NoteId),

    #[error("Gimmick {0} does not exist")]
    UnknownGimmick(GimmickId),

    #[error("Note {0} is not part of a hold or trace")]
    NotChainMember(NoteId),

    #[error("Notes {0} and {1} are not neighbours in the same chain")]
    NotAdjacent(NoteId, NoteId),

    #[error("Note {0} has the wrong role in its chain for this edit")]
    WrongRole(NoteId),

    #[error("Notes {0} and {1} belong to different chain kinds")]
    FamilyMismatch(NoteId, NoteId),

    #[error("Note {0} would break the chain's tick order")]
    OutOfOrder(NoteId),

    #[error("Note {0} is not a mask")]
    NotMask(NoteId),

    #[error("Nothing to {0}")]
    EmptyHistory(&'static str),
}

/// Failures applying an operation received from a peer.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Malformed operation message")]
    Decode(#[from] serde_json::Error),

    #[error("Operation {kind} references note {id}, which is not in the chart")]
    MissingNote { kind: &'static str, id: NoteId },

    #[error("Operation {kind} references gimmick {id}, which is not in the chart")]
    MissingGimmick { kind: &'static str, id: GimmickId },
}
