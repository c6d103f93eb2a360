use serde::{Deserialize, Serialize};

use crate::beat::{BeatData, TimeSig};
use crate::gimmick::{Gimmick, GimmickKind};

/// A tempo or signature change annotated with both axes and its wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetreEvent {
    pub beat: BeatData,
    pub bpm: f64,
    pub time_sig: TimeSig,
    /// Milliseconds from chart start.
    pub timestamp: f64,
}

impl MetreEvent {
    /// Wall-clock length of one measure under this event's tempo/signature.
    pub fn measure_length_ms(&self) -> f64 {
        4.0 * self.time_sig.ratio() * (60000.0 / self.bpm)
    }
}

/// Ordered list of metre events with absolute timestamps.
///
/// Empty when the chart lacks a BpmChange or TimeSigChange at tick 0; every
/// conversion then degrades to its sentinel value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetreTimeline {
    events: Vec<MetreEvent>,
}

impl MetreTimeline {
    /// Build from gimmicks already sorted by FullTick.
    pub fn build(gimmicks: &[Gimmick]) -> Self {
        let start_bpm = gimmicks
            .iter()
            .find(|g| g.full_tick() == 0 && g.bpm().is_some())
            .and_then(Gimmick::bpm);
        let start_sig = gimmicks
            .iter()
            .find(|g| g.full_tick() == 0 && g.time_sig().is_some())
            .and_then(Gimmick::time_sig);
        let (Some(mut bpm), Some(mut time_sig)) = (start_bpm, start_sig) else {
            tracing::debug!("no starting tempo or signature; metre timeline left empty");
            return Self::default();
        };

        let mut events: Vec<MetreEvent> = Vec::new();
        // Entries before tick 0 would precede the starting anchor.
        for gimmick in gimmicks.iter().filter(|g| g.is_metre() && g.full_tick() >= 0) {
            match gimmick.kind {
                GimmickKind::BpmChange { bpm: value } => bpm = value,
                GimmickKind::TimeSigChange(sig) => time_sig = sig,
                _ => {}
            }
            let timestamp = match events.last() {
                None => 0.0,
                Some(prev) => {
                    prev.timestamp
                        + (gimmick.beat.measure_decimal() - prev.beat.measure_decimal())
                            * prev.measure_length_ms()
                }
            };
            events.push(MetreEvent {
                beat: gimmick.beat,
                bpm,
                time_sig,
                timestamp,
            });
        }

        Self { events }
    }

    pub fn events(&self) -> &[MetreEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first(&self) -> Option<&MetreEvent> {
        self.events.first()
    }

    /// Last event at or before `full_tick`, falling back to the first event.
    pub fn event_at_tick(&self, full_tick: i32) -> Option<&MetreEvent> {
        let idx = self
            .events
            .partition_point(|e| e.beat.full_tick() <= full_tick);
        self.events.get(idx.saturating_sub(1))
    }

    fn event_at_measure(&self, measure_decimal: f64) -> Option<&MetreEvent> {
        let idx = self
            .events
            .partition_point(|e| e.beat.measure_decimal() <= measure_decimal);
        self.events.get(idx.saturating_sub(1))
    }

    fn event_at_timestamp(&self, timestamp: f64) -> Option<&MetreEvent> {
        let idx = self.events.partition_point(|e| e.timestamp <= timestamp);
        self.events.get(idx.saturating_sub(1))
    }

    /// Milliseconds at a decimal measure. Returns 0 on an empty timeline.
    pub fn measure_decimal_to_timestamp(&self, measure_decimal: f64) -> f64 {
        let Some(event) = self.event_at_measure(measure_decimal) else {
            return 0.0;
        };
        event.timestamp + (measure_decimal - event.beat.measure_decimal()) * event.measure_length_ms()
    }

    /// Decimal measure at a timestamp in milliseconds. Returns -1 on an empty timeline.
    pub fn timestamp_to_measure_decimal(&self, timestamp: f64) -> f64 {
        let Some(event) = self.event_at_timestamp(timestamp) else {
            return -1.0;
        };
        event.beat.measure_decimal() + (timestamp - event.timestamp) / event.measure_length_ms()
    }
}
