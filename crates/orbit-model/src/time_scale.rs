use serde::{Deserialize, Serialize};

use crate::beat::BeatData;
use crate::gimmick::{Gimmick, GimmickKind};
use crate::metre::MetreTimeline;

/// Independent scroll layers a chart's gimmicks can target.
pub const SCROLL_LAYER_COUNT: usize = 10;

/// One breakpoint of a scroll layer's piecewise-linear scale.
///
/// Between this entry and the next, a raw measure advances the unscaled
/// coordinate by `metre_multiplier` and the scaled coordinate by
/// `metre_multiplier * speed_multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeScaleData {
    pub raw_beat: BeatData,
    pub unscaled_measure_decimal: f64,
    pub scaled_measure_decimal: f64,
    pub metre_multiplier: f64,
    pub speed_multiplier: f64,
    /// Tail of the layer's sequence.
    pub is_last: bool,
}

impl TimeScaleData {
    fn sentinel() -> Self {
        Self {
            raw_beat: BeatData::new(0, 0),
            unscaled_measure_decimal: 0.0,
            scaled_measure_decimal: 0.0,
            metre_multiplier: 1.0,
            speed_multiplier: 1.0,
            is_last: true,
        }
    }

    fn coordinate(&self, show_hi_speed: bool) -> f64 {
        if show_hi_speed {
            self.scaled_measure_decimal
        } else {
            self.unscaled_measure_decimal
        }
    }

    fn slope(&self, show_hi_speed: bool) -> f64 {
        if show_hi_speed {
            self.metre_multiplier * self.speed_multiplier
        } else {
            self.metre_multiplier
        }
    }
}

/// Per-layer state while walking the gimmick list.
#[derive(Debug, Clone, Copy)]
struct LayerCursor {
    last_hi_speed: Option<f64>,
    in_stop: bool,
}

/// Scroll-scale timelines for all layers.
///
/// Metre changes apply to every layer; hi-speed and stop gimmicks only to the
/// layer they target. All layers are empty while the metre timeline is empty,
/// in which case lookups pass their input through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollScale {
    layers: [Vec<TimeScaleData>; SCROLL_LAYER_COUNT],
}

impl Default for ScrollScale {
    fn default() -> Self {
        Self {
            layers: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl ScrollScale {
    /// Build from gimmicks sorted by FullTick and the matching metre timeline.
    pub fn build(gimmicks: &[Gimmick], metre: &MetreTimeline) -> Self {
        let mut scale = Self::default();
        let Some(start) = metre.first() else {
            return scale;
        };
        let start_bpm = start.bpm;
        let start_ratio = start.time_sig.ratio();

        for layer in scale.layers.iter_mut() {
            layer.push(TimeScaleData::sentinel());
        }
        let mut cursors = [LayerCursor {
            last_hi_speed: None,
            in_stop: false,
        }; SCROLL_LAYER_COUNT];

        for gimmick in gimmicks.iter().filter(|g| g.is_time_scale_relevant()) {
            if gimmick.full_tick() < 0 {
                tracing::debug!(id = %gimmick.id, "ignoring gimmick before the tick-0 sentinel");
                continue;
            }
            let metre_multiplier = metre
                .event_at_tick(gimmick.full_tick())
                .map(|e| (start_bpm / e.bpm) * (e.time_sig.ratio() / start_ratio))
                .unwrap_or(1.0);

            if gimmick.is_metre() {
                for layer in scale.layers.iter_mut() {
                    let speed = layer.last().map(|e| e.speed_multiplier).unwrap_or(1.0);
                    push_entry(layer, gimmick.beat, metre_multiplier, speed);
                }
                continue;
            }

            let layer_index = gimmick.scroll_layer as usize;
            let Some(layer) = scale.layers.get_mut(layer_index) else {
                tracing::warn!(layer = layer_index, "gimmick targets unknown scroll layer");
                continue;
            };
            let cursor = &mut cursors[layer_index];
            let speed = match gimmick.kind {
                GimmickKind::HiSpeedChange { hi_speed } => {
                    cursor.last_hi_speed = Some(hi_speed);
                    if cursor.in_stop { 0.0 } else { hi_speed }
                }
                GimmickKind::StopStart => {
                    cursor.in_stop = true;
                    0.0
                }
                GimmickKind::StopEnd => {
                    cursor.in_stop = false;
                    cursor.last_hi_speed.unwrap_or(1.0)
                }
                _ => continue,
            };
            push_entry(layer, gimmick.beat, metre_multiplier, speed);
        }

        scale
    }

    pub fn layer(&self, layer: usize) -> &[TimeScaleData] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rightmost entry whose raw coordinate is at or before `measure_decimal`.
    pub fn floor_by_raw(&self, measure_decimal: f64, layer: usize) -> Option<&TimeScaleData> {
        let entries = self.layer(layer);
        let idx = entries.partition_point(|e| e.raw_beat.measure_decimal() <= measure_decimal);
        idx.checked_sub(1).map(|i| &entries[i])
    }

    /// Rightmost entry whose scaled (or unscaled) coordinate is at or before `value`.
    pub fn floor_by_scaled(
        &self,
        value: f64,
        show_hi_speed: bool,
        layer: usize,
    ) -> Option<&TimeScaleData> {
        let entries = self.layer(layer);
        let idx = entries.partition_point(|e| e.coordinate(show_hi_speed) <= value);
        idx.checked_sub(1).map(|i| &entries[i])
    }

    /// Map a raw measure decimal into the layer's scaled space (or unscaled
    /// space when `show_hi_speed` is false).
    pub fn scaled_measure_decimal(&self, measure_decimal: f64, show_hi_speed: bool, layer: usize) -> f64 {
        let Some(entry) = self.floor_by_raw(measure_decimal, layer) else {
            return measure_decimal;
        };
        entry.coordinate(show_hi_speed)
            + (measure_decimal - entry.raw_beat.measure_decimal()) * entry.slope(show_hi_speed)
    }

    /// Inverse of [`Self::scaled_measure_decimal`]: back to a raw measure decimal.
    pub fn unscaled_measure_decimal(&self, scaled: f64, show_hi_speed: bool, layer: usize) -> f64 {
        let Some(entry) = self.floor_by_scaled(scaled, show_hi_speed, layer) else {
            return scaled;
        };
        let slope = entry.slope(show_hi_speed);
        if slope == 0.0 {
            return entry.raw_beat.measure_decimal();
        }
        entry.raw_beat.measure_decimal() + (scaled - entry.coordinate(show_hi_speed)) / slope
    }
}

fn push_entry(layer: &mut Vec<TimeScaleData>, raw_beat: BeatData, metre_multiplier: f64, speed_multiplier: f64) {
    let Some(prev) = layer.last_mut() else {
        return;
    };
    if prev.raw_beat.full_tick() == raw_beat.full_tick() {
        prev.metre_multiplier = metre_multiplier;
        prev.speed_multiplier = speed_multiplier;
        return;
    }

    let delta = raw_beat.measure_decimal() - prev.raw_beat.measure_decimal();
    let entry = TimeScaleData {
        raw_beat,
        unscaled_measure_decimal: prev.unscaled_measure_decimal + delta * prev.metre_multiplier,
        scaled_measure_decimal: prev.scaled_measure_decimal
            + delta * prev.metre_multiplier * prev.speed_multiplier,
        metre_multiplier,
        speed_multiplier,
        is_last: true,
    };
    prev.is_last = false;
    layer.push(entry);
}
