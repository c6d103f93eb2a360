// Chart data model: musical time, tempo/scroll timelines, notes and chains, file formats

mod beat;
mod chain;
mod chart;
mod error;
pub mod format;
mod gimmick;
mod ids;
mod metre;
mod note;
mod time_scale;

pub use beat::{BeatData, TICKS_PER_MEASURE, TimeSig, measure_decimal};
pub use chart::{Chart, ChartMetadata};
pub use error::{ChainError, ChartError, Result};
pub use format::{ChartFormat, LoadReport};
pub use gimmick::{Gimmick, GimmickKind, GimmickType};
pub use ids::{GimmickId, IdAllocator, NoteId};
pub use metre::{MetreEvent, MetreTimeline};
pub use note::{
    BonusType, ChainFamily, ChainRole, MaskDirection, Note, NoteType, POSITION_COUNT, clamp_size,
    wrap_position,
};
pub use time_scale::{SCROLL_LAYER_COUNT, ScrollScale, TimeScaleData};
