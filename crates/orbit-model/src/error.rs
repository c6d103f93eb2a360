use std::path::PathBuf;

use thiserror::Error;

use crate::ids::NoteId;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Failed to read chart file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write chart file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Chart text is neither UTF-8 nor Shift-JIS")]
    Encoding,

    #[error("Unrecognized chart format (no version marker)")]
    UnknownFormat,

    #[error("Chart has no {0} section")]
    MissingSection(&'static str),
}

/// Broken note-chain invariants. These indicate a bug in whoever edited the
/// chart, never bad user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{from} links to missing note {to}")]
    Dangling { from: NoteId, to: NoteId },

    #[error("{from}.next = {to} but {to}.prev does not point back")]
    Asymmetric { from: NoteId, to: NoteId },

    #[error("Chain through {0} loops back on itself")]
    Cycle(NoteId),

    #[error("Chain link {0} is not a hold/trace note")]
    NotChainMember(NoteId),

    #[error("{0} has the wrong head/segment/end type for its place in the chain")]
    WrongRole(NoteId),

    #[error("Chain through {0} is not in ascending tick order")]
    Unordered(NoteId),
}

pub type Result<T> = std::result::Result<T, ChartError>;
