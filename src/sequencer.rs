//! Euclidean tracks, chained sequences and the knob CV sequencer

use crate::clock::{ClockDivMult, DivMult};
use crate::envelope::Envelope;
use crate::euclid::{fill_from_percent, Pattern};
use crate::rng::Rng;
use crate::trigger::PulseGenerator;

/// One Euclidean track: pattern, step cursor, clock ratio and the envelope
/// its hits fire.
#[derive(Debug, Clone)]
pub struct TrackState<E> {
    pattern: Pattern,
    step: usize,
    length: usize,
    ratio: DivMult,
    clock: ClockDivMult,
    trigger: PulseGenerator,
    just_triggered: bool,
    /// Rotation applied when the pattern is regenerated
    pub shift: i32,
    pub envelope: E,
}

impl<E: Envelope> TrackState<E> {
    pub fn new(envelope: E) -> Self {
        Self {
            pattern: Pattern::generate(16, 4, 0),
            step: 0,
            length: 16,
            ratio: DivMult::UNITY,
            clock: ClockDivMult::new(),
            trigger: PulseGenerator::new(),
            just_triggered: false,
            shift: 0,
            envelope,
        }
    }

    /// Regenerate the pattern for this frame
    pub fn configure(&mut self, length: usize, fill_percent: f64, ratio: DivMult) {
        self.length = length.max(1);
        self.ratio = ratio;
        let fill = fill_from_percent(fill_percent, self.length);
        self.pattern = Pattern::generate(self.length, fill, self.shift);
    }

    /// Run the divider/multiplier; true when the track should step
    #[inline]
    pub fn clock(&mut self, global_clock: bool, period: f64, dt: f64) -> bool {
        self.clock.process(global_clock, period, dt, self.ratio)
    }

    /// Move the cursor forward one step. On a hit, fires a trigger pulse of
    /// `pulse` seconds and returns true.
    pub fn advance(&mut self, pulse: f64) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        self.step = (self.step + 1) % self.length;
        let hit = self.pattern.get(self.step);
        if hit {
            self.trigger.trigger(pulse);
            self.just_triggered = true;
        }
        hit
    }

    /// Advance and start the envelope on a hit
    pub fn advance_and_fire(&mut self, pulse: f64, params: E::Params) -> bool {
        let hit = self.advance(pulse);
        if hit {
            self.envelope.trigger(params);
        }
        hit
    }

    /// Advance the trigger pulse; true while high
    #[inline]
    pub fn trigger_high(&mut self, dt: f64) -> bool {
        self.trigger.process(dt)
    }

    /// Whether a hit fired since the last call
    pub fn take_just_triggered(&mut self) -> bool {
        std::mem::take(&mut self.just_triggered)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn ratio(&self) -> DivMult {
        self.ratio
    }

    /// Clock ticks one full pass of the pattern takes
    pub fn cycle_ticks(&self) -> u64 {
        (self.length as u64 * self.ratio.division as u64) / self.ratio.multiplication as u64
    }

    /// Clear transient state; the shift and envelope settings survive.
    pub fn reset(&mut self) {
        self.step = 0;
        self.clock.reset();
        self.trigger.reset();
        self.just_triggered = false;
        self.envelope.reset();
    }
}

/// Longest track list a chain can hold
pub const MAX_CHAIN: usize = 4;

/// Round-robin over a fixed list of tracks, handing over to the next entry
/// once the active track has run for its whole cycle.
#[derive(Debug, Clone)]
pub struct ChainedSequence {
    indices: [usize; MAX_CHAIN],
    len: usize,
    cursor: usize,
    clock_count: u64,
    start_clock: [u64; MAX_CHAIN],
    pulse: PulseGenerator,
    pulse_high: bool,
}

impl ChainedSequence {
    /// Build from track indices; entries past [`MAX_CHAIN`] are dropped.
    pub fn new(indices: &[usize]) -> Self {
        let len = indices.len().min(MAX_CHAIN);
        let mut stored = [0; MAX_CHAIN];
        stored[..len].copy_from_slice(&indices[..len]);
        Self {
            indices: stored,
            len,
            cursor: 0,
            clock_count: 0,
            start_clock: [0; MAX_CHAIN],
            pulse: PulseGenerator::new(),
            pulse_high: false,
        }
    }

    /// Track index currently playing, if any
    pub fn active(&self) -> Option<usize> {
        (self.len > 0).then(|| self.indices[self.cursor % self.len])
    }

    /// Advance one sample. Returns the active track's envelope in volts and
    /// whether the chain moved on to the next track this sample.
    pub fn process<E: Envelope>(
        &mut self,
        tracks: &[TrackState<E>],
        clock: bool,
        dt: f64,
    ) -> (f64, bool) {
        self.pulse_high = self.pulse.process(dt);
        if self.len == 0 {
            return (0.0, false);
        }

        if clock {
            self.clock_count += 1;
        }
        if self.cursor >= self.len {
            self.cursor = 0;
        }

        let active = self.indices[self.cursor];
        let Some(track) = tracks.get(active) else {
            return (0.0, false);
        };

        let elapsed = self.clock_count - self.start_clock[active % MAX_CHAIN];
        let mut advanced = false;
        if elapsed >= track.cycle_ticks().max(1) {
            self.cursor = (self.cursor + 1) % self.len;
            let next = self.indices[self.cursor];
            self.start_clock[next % MAX_CHAIN] = self.clock_count;
            self.pulse.trigger(0.001);
            advanced = true;
        }

        let value = self
            .active()
            .and_then(|index| tracks.get(index))
            .map_or(0.0, |track| track.envelope.output() * 10.0);
        (value, advanced)
    }

    /// Whether the 1 ms advance pulse is high this sample
    pub fn trigger_high(&self) -> bool {
        self.pulse_high
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.clock_count = 0;
        self.start_clock = [0; MAX_CHAIN];
        self.pulse.reset();
        self.pulse_high = false;
    }
}

/// How sequencer steps are assigned to knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    Sequential,
    Minimalism,
    Jump,
}

impl SequenceMode {
    pub const LABELS: &'static [&'static str] = &["Sequential", "Minimalism", "Jump"];

    pub fn from_index(index: i32) -> Self {
        match index.rem_euclid(3) {
            0 => SequenceMode::Sequential,
            1 => SequenceMode::Minimalism,
            _ => SequenceMode::Jump,
        }
    }

    pub fn index(&self) -> i32 {
        match self {
            SequenceMode::Sequential => 0,
            SequenceMode::Minimalism => 1,
            SequenceMode::Jump => 2,
        }
    }

    pub fn next(&self) -> Self {
        Self::from_index(self.index() + 1)
    }
}

const MINIMALISM: [usize; 32] = [
    0, 1, 2, 0, 1, 2, 3, 4, 3, 4, 0, 1, 2, 0, 1, 2, 3, 4, 3, 4, 1, 3, 2, 4, 0, 2, 1, 3, 0, 4, 2, 1,
];
const JUMP: [usize; 5] = [0, 2, 4, 1, 3];

/// Number of knob voltages the sequencer chooses from
pub const KNOB_COUNT: usize = 5;
/// Capacity of the step mapping
pub const MAX_SEQUENCE: usize = 64;

/// Steps through a mapping of steps to knob voltages.
///
/// The mapping is rebuilt on every step from density (which sets the
/// sequence length and how many knobs take part), chaos (which jitters the
/// length and scrambles steps) and the mode.
#[derive(Debug, Clone)]
pub struct KnobSequencer {
    mapping: [usize; MAX_SEQUENCE],
    length: usize,
    step: usize,
    previous: Option<f64>,
    pulse: PulseGenerator,
    rng: Rng,
}

impl KnobSequencer {
    pub fn new(rng: Rng) -> Self {
        let mut seq = Self {
            mapping: [0; MAX_SEQUENCE],
            length: 16,
            step: 0,
            previous: None,
            pulse: PulseGenerator::new(),
            rng,
        };
        seq.generate(0.5, 0.0, SequenceMode::Minimalism);
        seq
    }

    /// Sequence length and active knob count for a density in 0..1
    pub fn density_bands(density: f64) -> (usize, usize) {
        let density = density.clamp(0.0, 1.0);
        let (length, knobs) = if density < 0.2 {
            (8 + (density * 20.0) as i32, 2)
        } else if density < 0.4 {
            (12 + ((density - 0.2) * 40.0) as i32, 3)
        } else if density < 0.6 {
            (20 + ((density - 0.4) * 40.0) as i32, 4)
        } else {
            (28 + ((density - 0.6) * 50.1) as i32, 5)
        };
        (length.clamp(8, 48) as usize, knobs)
    }

    /// Rebuild the step mapping
    pub fn generate(&mut self, density: f64, chaos: f64, mode: SequenceMode) {
        let chaos = chaos.clamp(0.0, 1.0);
        let (base_length, knobs) = Self::density_bands(density);
        let mut length = base_length as i32;

        if chaos > 0.0 {
            let range = chaos * length as f64 * 0.5;
            let offset = (self.rng.next_f64() - 0.5) * 2.0 * range;
            length = (length + offset as i32).clamp(4, MAX_SEQUENCE as i32);
        }
        self.length = length as usize;

        self.mapping = [0; MAX_SEQUENCE];
        for (i, slot) in self.mapping[..self.length].iter_mut().enumerate() {
            *slot = match mode {
                SequenceMode::Sequential => i % knobs,
                SequenceMode::Minimalism => MINIMALISM[i % MINIMALISM.len()] % knobs,
                SequenceMode::Jump => JUMP[i % JUMP.len()] % knobs,
            };
        }

        if chaos > 0.3 {
            let scrambled = (chaos * self.length as f64 * 0.3) as usize;
            for _ in 0..scrambled {
                let step = self.rng.next_index(self.length);
                self.mapping[step] = self.rng.next_index(KNOB_COUNT);
            }
        }
    }

    /// Step forward on a clock, regenerating the mapping. Fires a 10 ms
    /// trigger when the selected voltage differs from the previous step's.
    pub fn advance(
        &mut self,
        density: f64,
        chaos: f64,
        mode: SequenceMode,
        knobs: &[f64; KNOB_COUNT],
    ) -> f64 {
        self.step = (self.step + 1) % self.length.max(1);
        self.generate(density, chaos, mode);
        let voltage = self.voltage(knobs);
        if self.previous != Some(voltage) {
            self.pulse.trigger(0.01);
        }
        self.previous = Some(voltage);
        voltage
    }

    /// Voltage of the knob selected by the current step
    #[inline]
    pub fn voltage(&self, knobs: &[f64; KNOB_COUNT]) -> f64 {
        knobs[self.mapping[self.step % MAX_SEQUENCE] % KNOB_COUNT]
    }

    #[inline]
    pub fn trigger_high(&mut self, dt: f64) -> bool {
        self.pulse.process(dt)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping[..self.length]
    }

    pub fn reset(&mut self, density: f64, chaos: f64, mode: SequenceMode) {
        self.step = 0;
        self.previous = None;
        self.pulse.reset();
        self.generate(density, chaos, mode);
    }
}
