use serde::{Deserialize, Serialize};

use crate::beat::{BeatData, TimeSig};
use crate::ids::GimmickId;

/// Payload-free discriminant of a gimmick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GimmickType {
    BpmChange,
    TimeSigChange,
    HiSpeedChange,
    ReverseEffectStart,
    ReverseEffectEnd,
    ReverseNoteEnd,
    StopStart,
    StopEnd,
    EndOfChart,
}

/// Gimmick event with its type-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GimmickKind {
    BpmChange { bpm: f64 },
    TimeSigChange(TimeSig),
    HiSpeedChange { hi_speed: f64 },
    ReverseEffectStart,
    ReverseEffectEnd,
    ReverseNoteEnd,
    StopStart,
    StopEnd,
    EndOfChart,
}

impl GimmickKind {
    pub fn gimmick_type(&self) -> GimmickType {
        match self {
            GimmickKind::BpmChange { .. } => GimmickType::BpmChange,
            GimmickKind::TimeSigChange(_) => GimmickType::TimeSigChange,
            GimmickKind::HiSpeedChange { .. } => GimmickType::HiSpeedChange,
            GimmickKind::ReverseEffectStart => GimmickType::ReverseEffectStart,
            GimmickKind::ReverseEffectEnd => GimmickType::ReverseEffectEnd,
            GimmickKind::ReverseNoteEnd => GimmickType::ReverseNoteEnd,
            GimmickKind::StopStart => GimmickType::StopStart,
            GimmickKind::StopEnd => GimmickType::StopEnd,
            GimmickKind::EndOfChart => GimmickType::EndOfChart,
        }
    }
}

/// A non-note timeline event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gimmick {
    pub id: GimmickId,
    pub beat: BeatData,
    pub kind: GimmickKind,
    pub scroll_layer: u8,
    /// Milliseconds from chart start, filled in when timelines are regenerated.
    #[serde(default)]
    pub timestamp: f64,
}

impl Gimmick {
    pub fn new(id: GimmickId, beat: BeatData, kind: GimmickKind) -> Self {
        Self {
            id,
            beat,
            kind,
            scroll_layer: 0,
            timestamp: 0.0,
        }
    }

    pub fn with_layer(mut self, scroll_layer: u8) -> Self {
        self.scroll_layer = scroll_layer;
        self
    }

    pub fn gimmick_type(&self) -> GimmickType {
        self.kind.gimmick_type()
    }

    pub fn full_tick(&self) -> i32 {
        self.beat.full_tick()
    }

    pub fn bpm(&self) -> Option<f64> {
        match self.kind {
            GimmickKind::BpmChange { bpm } => Some(bpm),
            _ => None,
        }
    }

    pub fn time_sig(&self) -> Option<TimeSig> {
        match self.kind {
            GimmickKind::TimeSigChange(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn hi_speed(&self) -> Option<f64> {
        match self.kind {
            GimmickKind::HiSpeedChange { hi_speed } => Some(hi_speed),
            _ => None,
        }
    }

    pub fn is_reverse(&self) -> bool {
        matches!(
            self.kind,
            GimmickKind::ReverseEffectStart
                | GimmickKind::ReverseEffectEnd
                | GimmickKind::ReverseNoteEnd
        )
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.kind, GimmickKind::StopStart | GimmickKind::StopEnd)
    }

    pub fn is_metre(&self) -> bool {
        matches!(
            self.kind,
            GimmickKind::BpmChange { .. } | GimmickKind::TimeSigChange(_)
        )
    }

    /// Gimmicks that produce an entry in a scroll layer's time scale.
    pub fn is_time_scale_relevant(&self) -> bool {
        self.is_metre() || self.is_stop() || self.hi_speed().is_some()
    }

    /// Copy everything except identity and the derived timestamp.
    pub fn assign_content(&mut self, other: &Gimmick) {
        self.beat = other.beat;
        self.kind = other.kind;
        self.scroll_layer = other.scroll_layer;
    }
}
