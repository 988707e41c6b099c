//! One-shot envelopes and the low-pass gate
//!
//! Two curve families share the [`Envelope`] interface:
//!
//! - [`LatchedCurveEnvelope`]: attack/decay with a rational curve whose decay
//!   time and curvature are captured when the attack starts
//! - [`UnifiedEnvelope`]: fixed 1 ms attack into a decay whose curvature
//!   morphs from a front to a back shape over the decay
//!
//! [`SimpleLpg`] couples an instant-attack envelope to a low-pass filter.

use crate::filter::Biquad;
use crate::trigger::SchmittTrigger;

/// A triggered one-shot envelope producing 0..1
pub trait Envelope {
    /// Per-sample shaping controls
    type Params: Copy;

    /// Restart the attack from zero
    fn trigger(&mut self, params: Self::Params);

    /// Advance by `dt` seconds and return the new level
    fn process(&mut self, dt: f64, params: Self::Params) -> f64;

    /// Most recent level
    fn output(&self) -> f64;

    fn is_idle(&self) -> bool;

    fn reset(&mut self);
}

/// Rational curve warp of `x` in 0..1.
///
/// `k = 0` is linear; negative `k` bows the curve upward. Falls back to linear
/// when the denominator vanishes.
#[inline]
pub fn apply_curve(x: f64, k: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    if k == 0.0 {
        return x;
    }
    let denominator = k - 2.0 * k * x + 1.0;
    if denominator.abs() < 1e-6 {
        return x;
    }
    (x - k * x) / denominator
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
}

/// Attack/decay envelope with decay time and curvature latched at trigger.
///
/// The decay knob is read once per trigger: `decay^0.33` is mapped onto
/// `10^((m - 0.8) * 5)` seconds (at least 10 ms) and onto a curvature between
/// -0.8 and -0.45. Turning the knob mid-decay only affects the next hit.
#[derive(Debug, Clone, Copy)]
pub struct LatchedCurveEnvelope {
    stage: EnvelopeStage,
    stage_time: f64,
    output: f64,
    attack_time: f64,
    decay_time: f64,
    curve: f64,
}

impl LatchedCurveEnvelope {
    pub const DEFAULT_ATTACK: f64 = 0.006;

    pub fn new() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            stage_time: 0.0,
            output: 0.0,
            attack_time: Self::DEFAULT_ATTACK,
            decay_time: 1.0,
            curve: 0.0,
        }
    }

    pub fn attack_time(&self) -> f64 {
        self.attack_time
    }

    pub fn set_attack_time(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.attack_time = seconds;
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Decay time that will be used by the current cycle
    pub fn decay_time(&self) -> f64 {
        self.decay_time
    }

    /// Decay time and curvature for a knob value in 0..1
    pub fn latch(decay: f64) -> (f64, f64) {
        let decay = decay.clamp(0.0, 1.0);
        let mapped = decay.powf(0.33) * 0.8;
        let curve = -0.8 + decay * 0.35;
        let seconds = libm::pow(10.0, (mapped - 0.8) * 5.0).max(0.01);
        (seconds, curve)
    }
}

impl Default for LatchedCurveEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope for LatchedCurveEnvelope {
    type Params = f64;

    fn trigger(&mut self, decay: f64) {
        let (seconds, curve) = Self::latch(decay);
        self.decay_time = seconds;
        self.curve = curve;
        self.stage = EnvelopeStage::Attack;
        self.stage_time = 0.0;
    }

    fn process(&mut self, dt: f64, _decay: f64) -> f64 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.output = 0.0;
            }
            EnvelopeStage::Attack => {
                self.stage_time += dt;
                if self.stage_time >= self.attack_time {
                    self.stage = EnvelopeStage::Decay;
                    self.stage_time = 0.0;
                    self.output = 1.0;
                } else {
                    self.output = apply_curve(self.stage_time / self.attack_time, self.curve);
                }
            }
            EnvelopeStage::Decay => {
                self.stage_time += dt;
                if self.stage_time >= self.decay_time {
                    self.stage = EnvelopeStage::Idle;
                    self.stage_time = 0.0;
                    self.output = 0.0;
                } else {
                    self.output = 1.0 - apply_curve(self.stage_time / self.decay_time, self.curve);
                }
            }
        }
        self.output = self.output.clamp(0.0, 1.0);
        self.output
    }

    fn output(&self) -> f64 {
        self.output
    }

    fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.stage_time = 0.0;
        self.output = 0.0;
        self.decay_time = 1.0;
        self.curve = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayShape {
    /// Decay length in seconds
    pub decay: f64,
    /// Curve morph in 0..1
    pub shape: f64,
}

/// Percussive envelope with a 1 ms linear attack and a morphing decay curve.
///
/// Decay and shape are read every sample. The envelope can also be driven
/// straight from a trigger voltage through [`UnifiedEnvelope::process_gate`],
/// which detects edges with 0.1 V / 2 V hysteresis.
#[derive(Debug, Clone, Copy)]
pub struct UnifiedEnvelope {
    trigger: SchmittTrigger,
    phase: f64,
    active: bool,
    output: f64,
}

impl UnifiedEnvelope {
    pub const ATTACK_TIME: f64 = 0.001;

    pub fn new() -> Self {
        Self {
            trigger: SchmittTrigger::with_thresholds(0.1, 2.0),
            phase: 0.0,
            active: false,
            output: 0.0,
        }
    }

    /// Retrigger on a rising edge of `voltage`, then advance one sample
    pub fn process_gate(&mut self, dt: f64, voltage: f64, params: DecayShape) -> f64 {
        if self.trigger.process(voltage) {
            self.trigger(params);
        }
        self.process(dt, params)
    }

    /// Decay curve at time `t` into a decay of `total` seconds
    pub fn decay_curve(t: f64, total: f64, shape: f64) -> f64 {
        if t >= total {
            return 0.0;
        }
        let n = t / total;
        let front = -0.9 + shape * 0.5;
        let back = -1.0 + 1.6 * shape.max(0.0).powf(0.3);
        let transition = n * n * (3.0 - 2.0 * n);
        let k = front + (back - front) * transition;

        let denominator = k - 2.0 * k * n.abs() + 1.0;
        if denominator.abs() < 1e-10 {
            return 1.0 - n;
        }
        1.0 - (n - k * n) / denominator
    }
}

impl Default for UnifiedEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope for UnifiedEnvelope {
    type Params = DecayShape;

    fn trigger(&mut self, _params: DecayShape) {
        self.phase = 0.0;
        self.active = true;
    }

    fn process(&mut self, dt: f64, params: DecayShape) -> f64 {
        let mut level = 0.0;
        if self.active {
            if self.phase < Self::ATTACK_TIME {
                level = self.phase / Self::ATTACK_TIME;
            } else {
                let decay_phase = self.phase - Self::ATTACK_TIME;
                if decay_phase >= params.decay {
                    self.active = false;
                } else {
                    level = Self::decay_curve(decay_phase, params.decay, params.shape);
                }
            }
            self.phase += dt;
        }
        self.output = level.clamp(0.0, 1.0);
        self.output
    }

    fn output(&self) -> f64 {
        self.output
    }

    fn is_idle(&self) -> bool {
        !self.active
    }

    fn reset(&mut self) {
        self.trigger.reset();
        self.phase = 0.0;
        self.active = false;
        self.output = 0.0;
    }
}

/// Low-pass gate: instant-attack envelope opening a 2-pole low-pass filter
/// and a VCA together.
///
/// The decay lasts `0.01 + resonance * 0.5` seconds (exponential, cut off
/// below 0.001) and the cutoff tracks `200 + env * 18000` Hz.
#[derive(Debug, Clone, Copy)]
pub struct SimpleLpg {
    trigger: SchmittTrigger,
    lowpass: Biquad,
    env: f64,
    attacking: bool,
    decaying: bool,
    sample_rate: f64,
}

impl SimpleLpg {
    const ATTACK_TIME: f64 = 0.00001;

    pub fn new(sample_rate: f64) -> Self {
        Self {
            trigger: SchmittTrigger::new(),
            lowpass: Biquad::new(),
            env: 0.0,
            attacking: false,
            decaying: false,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn level(&self) -> f64 {
        self.env
    }

    pub fn process(&mut self, trigger: f64, resonance: f64, input: f64, amount: f64, dt: f64) -> f64 {
        if self.trigger.process(trigger) {
            self.attacking = true;
            self.decaying = false;
            self.env = 0.0;
        }

        if self.attacking {
            self.env += dt / Self::ATTACK_TIME;
            if self.env >= 1.0 {
                self.env = 1.0;
                self.attacking = false;
                self.decaying = true;
            }
        }

        if self.decaying {
            let decay_time = 0.01 + resonance * 0.5;
            self.env -= self.env * (1.0 / decay_time) * dt * 10.0;
            if self.env <= 0.001 {
                self.env = 0.0;
                self.decaying = false;
            }
        }

        let cutoff = 200.0 + self.env * 18000.0;
        self.lowpass
            .set_lowpass(cutoff / self.sample_rate, std::f64::consts::FRAC_1_SQRT_2);
        self.lowpass.process(input) * amount * self.env
    }

    pub fn reset(&mut self) {
        self.trigger.reset();
        self.lowpass.reset();
        self.env = 0.0;
        self.attacking = false;
        self.decaying = false;
    }
}

impl Default for SimpleLpg {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 1.0 / 48000.0;

    #[test]
    fn test_apply_curve_bounds() {
        assert_relative_eq!(apply_curve(0.0, -0.6), 0.0);
        assert_relative_eq!(apply_curve(1.0, -0.6), 1.0);
        assert_relative_eq!(apply_curve(0.3, 0.0), 0.3);
        assert!(apply_curve(0.5, -0.6) > 0.5);
        assert_relative_eq!(apply_curve(2.0, -0.6), 1.0);
    }

    #[test]
    fn test_latch_mapping() {
        let (seconds, curve) = LatchedCurveEnvelope::latch(1.0);
        assert_relative_eq!(seconds, 1.0);
        assert_relative_eq!(curve, -0.45);
        let (seconds, curve) = LatchedCurveEnvelope::latch(0.0);
        assert_relative_eq!(seconds, 0.01);
        assert_relative_eq!(curve, -0.8);
    }

    #[test]
    fn test_latched_envelope_cycle() {
        let mut env = LatchedCurveEnvelope::new();
        env.trigger(0.3);
        let mut peak: f64 = 0.0;
        let mut samples = 0;
        while !env.is_idle() && samples < 480000 {
            peak = peak.max(env.process(DT, 0.3));
            samples += 1;
        }
        assert_relative_eq!(peak, 1.0);
        assert!(env.is_idle());
        let expected = 0.006 + env.decay_time();
        assert!((samples as f64 * DT - expected).abs() < 0.001);
    }

    #[test]
    fn test_decay_is_latched_at_trigger() {
        let mut env = LatchedCurveEnvelope::new();
        env.trigger(1.0);
        let latched = env.decay_time();
        for _ in 0..1000 {
            env.process(DT, 0.0);
        }
        assert_relative_eq!(env.decay_time(), latched);
    }

    #[test]
    fn test_retrigger_restarts_from_zero() {
        let mut env = LatchedCurveEnvelope::new();
        env.trigger(0.5);
        for _ in 0..2000 {
            env.process(DT, 0.5);
        }
        assert!(env.output() > 0.1);

        env.trigger(0.5);
        let first = env.process(DT, 0.5);
        let slope_limit = apply_curve(DT / env.attack_time(), -0.8 + 0.5 * 0.35);
        assert!(first <= slope_limit + 1e-12);

        let mut last = first;
        while env.stage() == EnvelopeStage::Attack {
            let next = env.process(DT, 0.5);
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn test_attack_time_setter_rejects_invalid() {
        let mut env = LatchedCurveEnvelope::new();
        env.set_attack_time(0.02);
        env.set_attack_time(-1.0);
        env.set_attack_time(f64::NAN);
        assert_relative_eq!(env.attack_time(), 0.02);
    }

    #[test]
    fn test_unified_decay_curve_endpoints() {
        for shape in [0.0, 0.3, 0.99] {
            assert_relative_eq!(UnifiedEnvelope::decay_curve(0.0, 0.5, shape), 1.0);
            assert_relative_eq!(UnifiedEnvelope::decay_curve(0.5, 0.5, shape), 0.0);
            let mid = UnifiedEnvelope::decay_curve(0.25, 0.5, shape);
            assert!((0.0..=1.0).contains(&mid));
        }
    }

    #[test]
    fn test_unified_envelope_from_voltage() {
        let mut env = UnifiedEnvelope::new();
        let params = DecayShape {
            decay: 0.1,
            shape: 0.0,
        };
        env.process_gate(DT, 0.0, params);
        env.process_gate(DT, 10.0, params);
        assert!(!env.is_idle());

        // attack ramps linearly to 1 within 1 ms
        let mut peak: f64 = 0.0;
        for _ in 0..48 {
            peak = peak.max(env.process_gate(DT, 10.0, params));
        }
        assert!(peak > 0.95);

        for _ in 0..48000 {
            env.process_gate(DT, 0.0, params);
        }
        assert!(env.is_idle());
        assert_eq!(env.output(), 0.0);
    }

    #[test]
    fn test_unified_ignores_sub_threshold() {
        let mut env = UnifiedEnvelope::new();
        let params = DecayShape {
            decay: 0.1,
            shape: 0.5,
        };
        env.process_gate(DT, 0.0, params);
        env.process_gate(DT, 1.5, params);
        assert!(env.is_idle());
    }

    #[test]
    fn test_lpg_opens_and_closes() {
        let mut lpg = SimpleLpg::new(48000.0);
        let mut out = 0.0f64;
        lpg.process(0.0, 0.5, 1.0, 1.0, DT);
        for i in 0..200 {
            let trig = if i < 10 { 10.0 } else { 0.0 };
            out = out.max(lpg.process(trig, 0.5, 1.0, 1.0, DT).abs());
        }
        assert!(out > 0.1);
        for _ in 0..48000 {
            lpg.process(0.0, 0.5, 1.0, 1.0, DT);
        }
        assert_eq!(lpg.level(), 0.0);
        assert_eq!(lpg.process(0.0, 0.5, 1.0, 1.0, DT), 0.0);
    }
}
