use serde::{Deserialize, Serialize};

use crate::beat::BeatData;
use crate::ids::NoteId;

/// Number of positions around the ring.
pub const POSITION_COUNT: i32 = 60;

/// The type of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteType {
    Touch,
    SnapForward,
    SnapBackward,
    SlideClockwise,
    SlideCounterclockwise,
    Chain,
    Damage,
    HoldStart,
    HoldSegment,
    HoldEnd,
    TraceStart,
    TraceSegment,
    TraceEnd,
    MaskAdd,
    MaskRemove,
}

/// Which kind of multi-segment object a chain note belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    Hold,
    Trace,
}

/// Position of a note inside its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainRole {
    Start,
    Segment,
    End,
}

impl ChainFamily {
    pub fn note_type(self, role: ChainRole) -> NoteType {
        match (self, role) {
            (ChainFamily::Hold, ChainRole::Start) => NoteType::HoldStart,
            (ChainFamily::Hold, ChainRole::Segment) => NoteType::HoldSegment,
            (ChainFamily::Hold, ChainRole::End) => NoteType::HoldEnd,
            (ChainFamily::Trace, ChainRole::Start) => NoteType::TraceStart,
            (ChainFamily::Trace, ChainRole::Segment) => NoteType::TraceSegment,
            (ChainFamily::Trace, ChainRole::End) => NoteType::TraceEnd,
        }
    }
}

impl NoteType {
    pub fn chain_family(self) -> Option<ChainFamily> {
        match self {
            NoteType::HoldStart | NoteType::HoldSegment | NoteType::HoldEnd => {
                Some(ChainFamily::Hold)
            }
            NoteType::TraceStart | NoteType::TraceSegment | NoteType::TraceEnd => {
                Some(ChainFamily::Trace)
            }
            _ => None,
        }
    }

    pub fn chain_role(self) -> Option<ChainRole> {
        match self {
            NoteType::HoldStart | NoteType::TraceStart => Some(ChainRole::Start),
            NoteType::HoldSegment | NoteType::TraceSegment => Some(ChainRole::Segment),
            NoteType::HoldEnd | NoteType::TraceEnd => Some(ChainRole::End),
            _ => None,
        }
    }

    pub fn is_mask(self) -> bool {
        matches!(self, NoteType::MaskAdd | NoteType::MaskRemove)
    }

    /// Notes the player interacts with (everything except masks).
    pub fn is_playable(self) -> bool {
        !self.is_mask()
    }
}

/// Scoring modifier carried by playable notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BonusType {
    #[default]
    None,
    Bonus,
    RNote,
}

/// Direction a mask animates in from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskDirection {
    Counterclockwise,
    Clockwise,
    Center,
}

/// Wrap a ring position into `[0, 60)`.
pub fn wrap_position(position: i32) -> i32 {
    position.rem_euclid(POSITION_COUNT)
}

/// Clamp a note size into `[1, 60]`.
pub fn clamp_size(size: i32) -> i32 {
    size.clamp(1, POSITION_COUNT)
}

/// A single note in the chart.
///
/// `prev`/`next` are non-owning references by id; the chart's note arena is
/// the only owner. They are rewired only by the chain operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub beat: BeatData,
    pub note_type: NoteType,
    pub bonus_type: BonusType,
    /// Ring position in `[0, 60)`.
    pub position: i32,
    /// Size in `[1, 60]`.
    pub size: i32,
    /// False for chain control points that are not drawn.
    pub render_segment: bool,
    pub mask_direction: Option<MaskDirection>,
    pub scroll_layer: u8,
    pub prev: Option<NoteId>,
    pub next: Option<NoteId>,
}

impl Note {
    pub fn new(id: NoteId, beat: BeatData, note_type: NoteType, position: i32, size: i32) -> Self {
        Self {
            id,
            beat,
            note_type,
            bonus_type: BonusType::None,
            position: wrap_position(position),
            size: clamp_size(size),
            render_segment: true,
            mask_direction: note_type.is_mask().then_some(MaskDirection::Center),
            scroll_layer: 0,
            prev: None,
            next: None,
        }
    }

    pub fn with_bonus(mut self, bonus_type: BonusType) -> Self {
        self.bonus_type = bonus_type;
        self
    }

    pub fn with_layer(mut self, scroll_layer: u8) -> Self {
        self.scroll_layer = scroll_layer;
        self
    }

    pub fn with_mask_direction(mut self, direction: MaskDirection) -> Self {
        self.mask_direction = Some(direction);
        self
    }

    pub fn full_tick(&self) -> i32 {
        self.beat.full_tick()
    }

    pub fn is_chain_member(&self) -> bool {
        self.note_type.chain_family().is_some()
    }

    pub fn is_mask(&self) -> bool {
        self.note_type.is_mask()
    }

    /// Copy everything except identity and chain links from `other`.
    pub fn assign_content(&mut self, other: &Note) {
        self.beat = other.beat;
        self.note_type = other.note_type;
        self.bonus_type = other.bonus_type;
        self.position = other.position;
        self.size = other.size;
        self.render_segment = other.render_segment;
        self.mask_direction = other.mask_direction;
        self.scroll_layer = other.scroll_layer;
    }

    /// Whether two notes occupy overlapping ring positions.
    pub fn overlaps(&self, other: &Note) -> bool {
        if self.size >= POSITION_COUNT || other.size >= POSITION_COUNT {
            return true;
        }
        let covers = |note: &Note, pos: i32| {
            let offset = wrap_position(pos - note.position);
            offset < note.size
        };
        (0..other.size).any(|i| covers(self, other.position + i))
    }
}
