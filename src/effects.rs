//! Chaos-Modulated Effects
//!
//! The three stereo effect modules share one modulation source: a Lorenz
//! attractor scaled by an amount knob, plus a sample-and-hold that latches it
//! at ten times the attractor rate. Each effect core here is one channel of
//! one side; the modules instantiate them per polyphonic channel.

use crate::rng::Rng;
use std::f64::consts::PI;

/// Lorenz attractor stepped by forward Euler
#[derive(Debug, Clone, Copy)]
pub struct ChaosGenerator {
    x: f64,
    y: f64,
    z: f64,
}

impl ChaosGenerator {
    const SIGMA: f64 = 7.5;
    const RHO: f64 = 30.9;
    const BETA: f64 = 1.02;
    const START: f64 = 0.1;
    const LIMIT: f64 = 100.0;

    pub fn new() -> Self {
        Self {
            x: Self::START,
            y: Self::START,
            z: Self::START,
        }
    }

    /// Step once with `dt = rate * 0.001` and return `x / 10` in -1..1.
    /// A blown-up or NaN state restarts from the initial point.
    #[inline]
    pub fn process(&mut self, rate: f64) -> f64 {
        let dt = rate * 0.001;

        let dx = Self::SIGMA * (self.y - self.x);
        let dy = self.x * (Self::RHO - self.z) - self.y;
        let dz = self.x * self.y - Self::BETA * self.z;

        self.x += dx * dt;
        self.y += dy * dt;
        self.z += dz * dt;

        let escaped = [self.x, self.y, self.z]
            .iter()
            .any(|v| v.is_nan() || v.abs() > Self::LIMIT);
        if escaped {
            self.reset();
        }

        (self.x * 0.1).clamp(-1.0, 1.0)
    }

    pub fn state(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ChaosGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Latches a value whenever its phase accumulator wraps
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaosSampleHold {
    phase: f64,
    held: f64,
}

impl ChaosSampleHold {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, input: f64, freq: f64, dt: f64) -> f64 {
        self.phase += freq * dt;
        if self.phase >= 1.0 {
            self.held = input;
            self.phase = 0.0;
        }
        self.held
    }

    pub fn held(&self) -> f64 {
        self.held
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of one [`ChaosSource`] step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChaosFrame {
    /// Attractor output scaled by the amount, -1..1
    pub raw: f64,
    /// Last sampled value of `raw`
    pub held: f64,
    pub enabled: bool,
}

/// Per-channel chaos modulation: attractor plus sample-and-hold.
///
/// With zero amount neither part advances and both outputs read zero; the
/// held value survives and reappears when chaos is turned back on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaosSource {
    generator: ChaosGenerator,
    hold: ChaosSampleHold,
}

impl ChaosSource {
    pub const AMOUNT_CV_SCALE: f64 = 0.1;
    pub const RATE_CV_SCALE: f64 = 0.2;
    pub const MIN_RATE: f64 = 0.01;
    pub const MAX_RATE: f64 = 2.0;

    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, amount: f64, rate: f64, dt: f64) -> ChaosFrame {
        let amount = amount.clamp(0.0, 1.0);
        let rate = rate.clamp(Self::MIN_RATE, Self::MAX_RATE);
        if amount <= 0.0 {
            return ChaosFrame::default();
        }
        let raw = self.generator.process(rate) * amount;
        let held = self.hold.process(raw, rate * 10.0, dt);
        ChaosFrame {
            raw,
            held,
            enabled: true,
        }
    }

    pub fn reset(&mut self) {
        self.generator.reset();
        self.hold.reset();
    }
}

pub const GRAIN_BUFFER_SIZE: usize = 8192;
pub const MAX_GRAINS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Grain {
    active: bool,
    position: f64,
    size: f64,
    age: f64,
    direction: f64,
    pitch: f64,
}

impl Default for Grain {
    fn default() -> Self {
        Self {
            active: false,
            position: 0.0,
            size: 0.0,
            age: 0.0,
            direction: 1.0,
            pitch: 1.0,
        }
    }
}

/// Granular resynthesis over a rolling 8192-sample buffer with up to 16
/// Hann-windowed grains.
#[derive(Debug, Clone)]
pub struct GrainProcessor {
    buffer: Vec<f64>,
    write_index: usize,
    grains: [Grain; MAX_GRAINS],
    phase: f64,
    rng: Rng,
}

impl GrainProcessor {
    pub fn new(rng: Rng) -> Self {
        Self {
            buffer: vec![0.0; GRAIN_BUFFER_SIZE],
            write_index: 0,
            grains: [Grain::default(); MAX_GRAINS],
            phase: 0.0,
            rng,
        }
    }

    /// `size`, `density` and `position` are normalized 0..1
    pub fn process(
        &mut self,
        input: f64,
        size: f64,
        density: f64,
        position: f64,
        chaos: ChaosFrame,
        sample_rate: f64,
    ) -> f64 {
        self.buffer[self.write_index] = input;
        self.write_index = (self.write_index + 1) % GRAIN_BUFFER_SIZE;

        let grain_ms = size * 99.0 + 1.0;
        let grain_samples = grain_ms / 1000.0 * sample_rate;

        let mut density = density;
        if chaos.enabled {
            density += chaos.raw * 0.3;
        }
        let density = density.clamp(0.0, 1.0);

        self.phase += (density * 50.0 + 1.0) / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.spawn(grain_samples, density, position, chaos);
        }

        let mut output = 0.0;
        let mut active = 0;
        let len = GRAIN_BUFFER_SIZE as f64;
        for grain in self.grains.iter_mut().filter(|g| g.active) {
            let window_phase = grain.age / grain.size;
            if window_phase >= 1.0 {
                grain.active = false;
                continue;
            }

            let window = 0.5 * (1.0 - libm::cos(window_phase * 2.0 * PI));
            let read = (grain.position as i64).rem_euclid(GRAIN_BUFFER_SIZE as i64) as usize;
            output += self.buffer[read] * window;

            grain.position = (grain.position + grain.direction * grain.pitch).rem_euclid(len);
            grain.age += 1.0;
            active += 1;
        }

        if active > 0 {
            output /= (active as f64).sqrt();
        }
        output
    }

    fn spawn(&mut self, size: f64, density: f64, position: f64, chaos: ChaosFrame) {
        let Some(slot) = self.grains.iter().position(|g| !g.active) else {
            return;
        };

        let mut position = position;
        let mut direction = 1.0;
        let mut pitch = 1.0;
        if chaos.enabled {
            position += chaos.raw * 20.0;
            if self.rng.next_f64() < 0.3 {
                direction = -1.0;
            }
            if density > 0.7 && self.rng.next_f64() < 0.2 {
                pitch = if self.rng.next_f64() < 0.5 { 0.5 } else { 2.0 };
            }
        }

        self.grains[slot] = Grain {
            active: true,
            position: position.clamp(0.0, 1.0) * GRAIN_BUFFER_SIZE as f64,
            size,
            age: 0.0,
            direction,
            pitch,
        };
    }

    pub fn active_grains(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_index = 0;
        self.grains = [Grain::default(); MAX_GRAINS];
        self.phase = 0.0;
    }
}

/// Damped feedback comb
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f64>,
    index: usize,
    lowpass: f64,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
            lowpass: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64, feedback: f64, damping: f64) -> f64 {
        let out = self.buffer[self.index];
        self.lowpass += (out - self.lowpass) * damping;
        self.buffer[self.index] = input + self.lowpass * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }

    /// Sample `offset` slots behind the write cursor
    #[inline]
    fn tap_index(&self, offset: usize) -> usize {
        let len = self.buffer.len() as i64;
        (self.index as i64 - offset as i64).rem_euclid(len) as usize
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.index = 0;
        self.lowpass = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f64>,
    index: usize,
}

impl Allpass {
    const GAIN: f64 = 0.5;

    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let delayed = self.buffer[self.index];
        let out = -input * Self::GAIN + delayed;
        self.buffer[self.index] = input + delayed * Self::GAIN;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.index = 0;
    }
}

/// Stereo side of a [`ReverbProcessor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbSide {
    Left,
    Right,
}

impl ReverbSide {
    fn comb_sizes(self) -> [usize; 4] {
        match self {
            ReverbSide::Left => [1557, 1617, 1491, 1422],
            ReverbSide::Right => [1277, 1356, 1188, 1116],
        }
    }

    /// (room scale, chaos scale, gain) of the two early-reflection taps
    fn taps(self) -> [(f64, f64, f64); 2] {
        match self {
            ReverbSide::Left => [(400.0, 50.0, 0.15), (350.0, 40.0, 0.12)],
            ReverbSide::Right => [(380.0, 45.0, 0.13), (420.0, 55.0, 0.11)],
        }
    }
}

const ALLPASS_SIZES: [usize; 4] = [556, 441, 341, 225];

/// One side of a Freeverb-style reverb: four damped combs in parallel, two
/// room-size taps into the first two combs, four allpasses in series and a
/// 100 Hz one-pole high-pass.
#[derive(Debug, Clone)]
pub struct ReverbProcessor {
    side: ReverbSide,
    combs: [Comb; 4],
    allpasses: [Allpass; 4],
    highpass: f64,
}

impl ReverbProcessor {
    pub fn new(side: ReverbSide) -> Self {
        let sizes = side.comb_sizes();
        Self {
            side,
            combs: sizes.map(Comb::new),
            allpasses: ALLPASS_SIZES.map(Allpass::new),
            highpass: 0.0,
        }
    }

    pub fn side(&self) -> ReverbSide {
        self.side
    }

    /// `room`, `damping` and `decay` are normalized 0..1
    pub fn process(
        &mut self,
        input: f64,
        room: f64,
        damping: f64,
        decay: f64,
        chaos: ChaosFrame,
        sample_rate: f64,
    ) -> f64 {
        let mut feedback = 0.5 + decay * 0.485;
        if chaos.enabled {
            feedback = (feedback + chaos.raw * 0.5).clamp(0.0, 0.995);
        }
        let damping = 0.05 + damping * 0.9;
        let room_input = input * (0.3 + room * 1.4);

        let taps = self.side.taps();
        let tap_slots = [0, 1].map(|i| {
            let (room_scale, chaos_scale, _) = taps[i];
            let offset = (room * room_scale + chaos.raw * chaos_scale).max(0.0) as usize;
            self.combs[i].tap_index(offset)
        });

        let mut wet: f64 = self
            .combs
            .iter_mut()
            .map(|comb| comb.process(room_input, feedback, damping))
            .sum();
        for (i, slot) in tap_slots.into_iter().enumerate() {
            wet += self.combs[i].buffer[slot] * room * taps[i].2;
        }
        wet *= 0.25;

        let diffused = self
            .allpasses
            .iter_mut()
            .fold(wet, |signal, allpass| allpass.process(signal));

        let coeff = (100.0 / (sample_rate * 0.5)).clamp(0.001, 0.1);
        self.highpass += (diffused - self.highpass) * coeff;
        diffused - self.highpass
    }

    pub fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
        self.highpass = 0.0;
    }
}

pub const DELAY_BUFFER_SIZE: usize = 96000;

/// Feedback delay with an integer sample delay of 1..96000
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_index: usize,
}

impl DelayLine {
    pub fn new() -> Self {
        Self {
            buffer: vec![0.0; DELAY_BUFFER_SIZE],
            write_index: 0,
        }
    }

    /// Delay length in samples for `seconds` at `sample_rate`
    pub fn delay_samples(seconds: f64, sample_rate: f64) -> usize {
        ((seconds * sample_rate) as i64).clamp(1, DELAY_BUFFER_SIZE as i64 - 1) as usize
    }

    /// Read the delayed sample, then write `input + delayed * feedback`
    #[inline]
    pub fn process(&mut self, input: f64, delay: usize, feedback: f64) -> f64 {
        let delay = delay.clamp(1, DELAY_BUFFER_SIZE - 1);
        let read = (self.write_index + DELAY_BUFFER_SIZE - delay) % DELAY_BUFFER_SIZE;
        let delayed = self.buffer[read];
        self.buffer[self.write_index] = input + delayed * feedback;
        self.write_index = (self.write_index + 1) % DELAY_BUFFER_SIZE;
        delayed
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_index = 0;
    }
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Equal-sum wet/dry crossfade
#[inline]
pub fn crossfade(dry: f64, wet: f64, mix: f64) -> f64 {
    dry * (1.0 - mix) + wet * mix
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: f64 = 48000.0;

    #[test]
    fn test_chaos_generator_is_bounded() {
        let mut chaos = ChaosGenerator::new();
        let mut moved = false;
        for _ in 0..200_000 {
            let out = chaos.process(2.0);
            assert!((-1.0..=1.0).contains(&out));
            let (x, y, z) = chaos.state();
            assert!(x.abs() <= 100.0 && y.abs() <= 100.0 && z.abs() <= 100.0);
            moved |= out.abs() > 0.5;
        }
        assert!(moved);
    }

    #[test]
    fn test_chaos_generator_recovers_from_nan() {
        let mut chaos = ChaosGenerator::new();
        let out = chaos.process(f64::NAN);
        assert_eq!(chaos.state(), (0.1, 0.1, 0.1));
        assert_abs_diff_eq!(out, 0.01);
    }

    #[test]
    fn test_chaos_source_silent_at_zero_amount() {
        let mut source = ChaosSource::new();
        for _ in 0..1000 {
            assert_eq!(source.process(0.0, 1.0, 1.0 / SR), ChaosFrame::default());
        }
    }

    #[test]
    fn test_sample_hold_latch_rate() {
        let mut sh = ChaosSampleHold::new();
        let mut changes = 0;
        let mut last = sh.held();
        for i in 0..48000 {
            let held = sh.process(i as f64, 10.0, 1.0 / SR);
            if held != last {
                changes += 1;
                last = held;
            }
        }
        // 10 Hz, with the phase restarting from zero after each latch
        assert!((9..=10).contains(&changes), "changes {}", changes);
    }

    #[test]
    fn test_grains_reproduce_input() {
        let mut grains = GrainProcessor::new(Rng::from_seed(3));
        let mut peak: f64 = 0.0;
        for _ in 0..48000 {
            let out = grains.process(1.0, 0.3, 0.4, 0.5, ChaosFrame::default(), SR);
            peak = peak.max(out);
        }
        assert!(peak > 0.5);
        assert!(grains.active_grains() <= MAX_GRAINS);
        grains.reset();
        assert_eq!(grains.active_grains(), 0);
    }

    #[test]
    fn test_grains_silent_on_silence() {
        let mut grains = GrainProcessor::new(Rng::from_seed(3));
        let chaos = ChaosFrame {
            raw: 0.5,
            held: 0.0,
            enabled: true,
        };
        for _ in 0..10000 {
            assert_eq!(grains.process(0.0, 0.5, 1.0, 0.2, chaos, SR), 0.0);
        }
    }

    #[test]
    fn test_reverb_tail_decays() {
        let mut reverb = ReverbProcessor::new(ReverbSide::Left);
        let mut early = 0.0;
        let mut late = 0.0;
        for i in 0..(SR as usize * 4) {
            let input = if i == 0 { 1.0 } else { 0.0 };
            let out: f64 = reverb.process(input, 0.5, 0.4, 0.6, ChaosFrame::default(), SR);
            assert!(out.is_finite());
            if i < 24000 {
                early += out.abs();
            } else if i >= 168000 {
                late += out.abs();
            }
        }
        assert!(early > 0.0);
        assert!(late < early * 0.01);
    }

    #[test]
    fn test_reverb_sides_differ() {
        let mut left = ReverbProcessor::new(ReverbSide::Left);
        let mut right = ReverbProcessor::new(ReverbSide::Right);
        assert_eq!(right.side(), ReverbSide::Right);
        let mut differs = false;
        for i in 0..4000 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            let l = left.process(input, 0.5, 0.4, 0.6, ChaosFrame::default(), SR);
            let r = right.process(input, 0.5, 0.4, 0.6, ChaosFrame::default(), SR);
            differs |= (l - r).abs() > 1e-6;
        }
        assert!(differs);
    }

    #[test]
    fn test_delay_impulse_position() {
        let mut delay = DelayLine::new();
        let samples = DelayLine::delay_samples(0.5, SR);
        assert_eq!(samples, 24000);
        for i in 0..30000 {
            let out = delay.process(if i == 0 { 1.0 } else { 0.0 }, samples, 0.0);
            if i == 24000 {
                assert_eq!(out, 1.0);
            } else {
                assert_eq!(out, 0.0);
            }
        }
    }

    #[test]
    fn test_delay_feedback_repeats() {
        let mut delay = DelayLine::new();
        let mut repeats = Vec::new();
        for i in 0..400 {
            let out = delay.process(if i == 0 { 1.0 } else { 0.0 }, 100, 0.5);
            if out != 0.0 {
                repeats.push((i, out));
            }
        }
        assert_eq!(repeats, vec![(100, 1.0), (200, 0.5), (300, 0.25)]);
    }

    #[test]
    fn test_delay_samples_clamp() {
        assert_eq!(DelayLine::delay_samples(0.0, SR), 1);
        assert_eq!(DelayLine::delay_samples(2.0, SR), DELAY_BUFFER_SIZE - 1);
    }

    #[test]
    fn test_crossfade() {
        assert_abs_diff_eq!(crossfade(1.0, 3.0, 0.5), 2.0);
        assert_abs_diff_eq!(crossfade(1.0, 3.0, 0.0), 1.0);
    }
}
