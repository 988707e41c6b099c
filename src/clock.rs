//! Clock Measurement, Division and Multiplication
//!
//! Every sequencer in the crate derives its step timing from one of these
//! small state machines. They are plain values advanced once per sample, with
//! the sample period passed in so a sample-rate change needs no bookkeeping.

/// Integer clock ratio: a track steps `multiplication` times for every
/// `division` global clock periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivMult {
    pub division: u32,
    pub multiplication: u32,
}

/// Ratio table of the drum voice's second track, indexed by its knob
const RATIO_TABLE: [DivMult; 5] = [
    DivMult::new(2, 1),
    DivMult::new(1, 1),
    DivMult::new(2, 3),
    DivMult::new(1, 2),
    DivMult::new(1, 3),
];

impl DivMult {
    pub const UNITY: DivMult = DivMult::new(1, 1);

    pub const fn new(division: u32, multiplication: u32) -> Self {
        Self {
            division,
            multiplication,
        }
    }

    /// Signed knob mapping: `v > 0` multiplies by `v + 1`, `v < 0` divides
    /// by `-v + 1`.
    pub fn from_knob(value: i32) -> Self {
        if value > 0 {
            Self::new(1, value as u32 + 1)
        } else if value < 0 {
            Self::new(value.unsigned_abs() + 1, 1)
        } else {
            Self::UNITY
        }
    }

    /// Lookup in the five-entry ratio table; out-of-range indices clamp.
    pub fn from_ratio_index(index: i32) -> Self {
        RATIO_TABLE[index.clamp(0, RATIO_TABLE.len() as i32 - 1) as usize]
    }

    /// Steps per global period
    pub fn ratio(&self) -> f64 {
        self.multiplication as f64 / self.division as f64
    }

    /// Length of one step given the global clock period
    pub fn interval(&self, period: f64) -> f64 {
        period * self.division as f64 / self.multiplication as f64
    }

    pub fn label(&self) -> String {
        if self.multiplication == 1 && self.division > 1 {
            return format!("1/{}x", self.division);
        }
        let ratio = self.ratio();
        if ratio.fract() == 0.0 {
            format!("{}x", ratio as u32)
        } else {
            format!("{:.1}x", ratio)
        }
    }
}

impl Default for DivMult {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Measures the time between successive clock edges.
///
/// The first edge only arms the measurement; until a second edge arrives the
/// period stays at its initial half second.
#[derive(Debug, Clone, Copy)]
pub struct ClockPeriod {
    elapsed: Option<f64>,
    period: f64,
}

impl ClockPeriod {
    pub const DEFAULT_PERIOD: f64 = 0.5;
    pub const MIN_PERIOD: f64 = 0.01;
    pub const MAX_PERIOD: f64 = 10.0;

    pub fn new() -> Self {
        Self {
            elapsed: None,
            period: Self::DEFAULT_PERIOD,
        }
    }

    /// Advance one sample and return the current period estimate
    #[inline]
    pub fn process(&mut self, edge: bool, dt: f64) -> f64 {
        if let Some(elapsed) = self.elapsed.as_mut() {
            *elapsed += dt;
        }
        if edge {
            if let Some(elapsed) = self.elapsed {
                self.period = elapsed.clamp(Self::MIN_PERIOD, Self::MAX_PERIOD);
            }
            self.elapsed = Some(0.0);
        }
        self.period
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ClockPeriod {
    fn default() -> Self {
        Self::new()
    }
}

/// Phase-continuous clock divider/multiplier driven by global clock edges.
///
/// Division counts incoming edges; multiplication subdivides the divided
/// period by time, firing on the rising edge of each sub-period's gate. The
/// progress timer keeps running between edges, so a missed global edge does
/// not stall the multiplied sub-beats.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockDivMult {
    divider_count: u32,
    divided_progress: f64,
    prev_gate: bool,
}

impl ClockDivMult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true on samples where the track should step
    #[inline]
    pub fn process(&mut self, clock: bool, period: f64, dt: f64, ratio: DivMult) -> bool {
        let divided = period * ratio.division as f64;
        let multiplied = divided / ratio.multiplication as f64;
        let gate_seconds = (multiplied * 0.5).max(0.001);

        if clock {
            if self.divider_count < 1 {
                self.divided_progress = 0.0;
            } else {
                self.divided_progress += dt;
            }
            self.divider_count += 1;
            if self.divider_count >= ratio.division {
                self.divider_count = 0;
            }
        } else {
            self.divided_progress += dt;
        }

        if self.divided_progress >= divided {
            return false;
        }

        let sub_beats = self.divided_progress / multiplied;
        let progress = sub_beats.fract() * multiplied;
        let gate = progress <= gate_seconds;
        let step = gate && !self.prev_gate;
        self.prev_gate = gate;
        step
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Free-running per-track sub-clock: accumulates time and steps whenever a
/// whole interval has elapsed, keeping the remainder.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalClock {
    elapsed: f64,
}

impl IntervalClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, dt: f64, interval: f64) -> bool {
        self.elapsed += dt;
        if self.elapsed >= interval {
            self.elapsed -= interval;
            true
        } else {
            false
        }
    }

    /// Time since the last step
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

/// Phase-accumulator clock with swing.
///
/// Every other beat waits for a longer phase threshold of `1 + swing * 0.25`,
/// delaying the off-beats while keeping the on-beats in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwingClock {
    phase: f64,
    swing_beat: bool,
}

impl SwingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt` at `freq` Hz. On a beat, returns the length in seconds
    /// of the beat that just ended.
    #[inline]
    pub fn process(&mut self, freq: f64, swing: f64, dt: f64) -> Option<f64> {
        let swing = swing.clamp(0.0, 1.0);
        self.phase += freq * dt;

        let threshold = if self.swing_beat && swing > 0.0 {
            1.0 + swing * 0.25
        } else {
            1.0
        };

        if self.phase >= threshold {
            self.phase -= threshold;
            self.swing_beat = !self.swing_beat;
            Some(threshold / freq)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
