use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Ticks in one measure, independent of time signature.
pub const TICKS_PER_MEASURE: i32 = 1920;

/// Continuous measure coordinate for a measure/tick pair.
pub fn measure_decimal(measure: i32, tick: i32) -> f64 {
    measure as f64 + tick as f64 / TICKS_PER_MEASURE as f64
}

/// A musical position.
///
/// All three constructors normalize to the same `full_tick` for the same
/// instant; `full_tick` is the canonical ordering key. A measure of -1 is
/// allowed as a "before the chart" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatData {
    measure: i32,
    tick: i32,
    full_tick: i32,
    measure_decimal: f64,
}

impl BeatData {
    /// Build from measure + tick. Ticks outside `[0, 1920)` carry into the measure.
    pub fn new(measure: i32, tick: i32) -> Self {
        let measure = measure + tick.div_euclid(TICKS_PER_MEASURE);
        let tick = tick.rem_euclid(TICKS_PER_MEASURE);
        Self {
            measure,
            tick,
            full_tick: measure * TICKS_PER_MEASURE + tick,
            measure_decimal: measure_decimal(measure, tick),
        }
    }

    /// Build from a decimal measure. The decimal value is kept as given so
    /// continuous coordinates survive; measure/tick are rounded to the tick grid.
    pub fn from_measure_decimal(value: f64) -> Self {
        let mut measure = value.floor() as i32;
        let mut tick = ((value - measure as f64) * TICKS_PER_MEASURE as f64).round() as i32;
        if tick >= TICKS_PER_MEASURE {
            measure += 1;
            tick -= TICKS_PER_MEASURE;
        }
        Self {
            measure,
            tick,
            full_tick: measure * TICKS_PER_MEASURE + tick,
            measure_decimal: value,
        }
    }

    pub fn from_full_tick(full_tick: i32) -> Self {
        Self::new(
            full_tick.div_euclid(TICKS_PER_MEASURE),
            full_tick.rem_euclid(TICKS_PER_MEASURE),
        )
    }

    pub fn measure(&self) -> i32 {
        self.measure
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn full_tick(&self) -> i32 {
        self.full_tick
    }

    pub fn measure_decimal(&self) -> f64 {
        self.measure_decimal
    }

    /// Shift by a signed tick count.
    pub fn offset(&self, ticks: i32) -> Self {
        Self::from_full_tick(self.full_tick + ticks)
    }

    pub fn ticks_until(&self, other: &BeatData) -> i32 {
        other.full_tick - self.full_tick
    }

    pub fn cmp_tick(&self, other: &BeatData) -> Ordering {
        self.full_tick.cmp(&other.full_tick)
    }
}

impl Default for BeatData {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Time signature as upper/lower integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSig {
    pub upper: i32,
    pub lower: i32,
}

impl TimeSig {
    pub fn new(upper: i32, lower: i32) -> Self {
        Self { upper, lower }
    }

    /// Returns `None` unless both parts are positive.
    pub fn checked(upper: i32, lower: i32) -> Option<Self> {
        (upper > 0 && lower > 0).then_some(Self { upper, lower })
    }

    pub fn ratio(&self) -> f64 {
        self.upper as f64 / self.lower as f64
    }
}

impl Default for TimeSig {
    fn default() -> Self {
        Self::new(4, 4)
    }
}
