//! Three-track Euclidean gate sequencer following an external clock

use super::{gate_voltage, modulated_mono};
use crate::clock::{ClockPeriod, DivMult, IntervalClock};
use crate::error::ModuleError;
use crate::euclid::{fill_from_percent, Pattern};
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamDisplay, ParamId, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use crate::trigger::{sanitize, PulseGenerator, SchmittTrigger, SlewLimiter};
use tracing::{debug, trace};

const TRACKS: usize = 3;
const PARAMS_PER_TRACK: ParamId = 9;

/// Per-track parameter offsets
const DIVMULT: ParamId = 0;
const LENGTH: ParamId = 1;
const FILL: ParamId = 2;
const SHIFT: ParamId = 3;
const LENGTH_ATTEN: ParamId = 4;
const FILL_ATTEN: ParamId = 5;
const SHIFT_ATTEN: ParamId = 6;
const RISE: ParamId = 7;
const FALL: ParamId = 8;

#[derive(Debug, Clone, Copy)]
struct EuclidTrack {
    pattern: Pattern,
    step: usize,
    gate: bool,
    clock: IntervalClock,
    slew: SlewLimiter,
    trigger: PulseGenerator,
}

impl EuclidTrack {
    fn new() -> Self {
        Self {
            pattern: Pattern::generate(16, 4, 0),
            step: 0,
            gate: false,
            clock: IntervalClock::new(),
            slew: SlewLimiter::new(),
            trigger: PulseGenerator::new(),
        }
    }

    /// Restart at step 0; a trigger already in flight finishes
    fn restart(&mut self) {
        self.step = 0;
        self.gate = false;
        self.clock.reset();
        self.slew.reset();
    }
}

/// Euclidean Rhythm
///
/// Each track steps on its own free-running sub-clock whose interval is the
/// measured input clock period scaled by the track's div/mult knob. Gates
/// are held for the first half of each step and shaped by a slew limiter.
/// Nothing fires until the clock input is patched.
pub struct EuclideanRhythm {
    tracks: [EuclidTrack; TRACKS],
    clock_trigger: SchmittTrigger,
    reset_trigger: SchmittTrigger,
    manual_reset: SchmittTrigger,
    clock_period: ClockPeriod,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl EuclideanRhythm {
    pub const CLOCK_INPUT: PortId = 0;
    pub const RESET_INPUT: PortId = 1;
    pub const GATE_OUTPUT: PortId = 10;
    pub const MASTER_OUTPUT: PortId = 13;
    pub const TRIG_OUTPUT: PortId = 14;
    pub const MASTER_TRIG_OUTPUT: PortId = 17;

    pub const MANUAL_RESET_PARAM: ParamId = 0;

    pub fn new(sample_rate: f64) -> Self {
        let mut inputs = vec![
            PortDef::new(Self::CLOCK_INPUT, "clock", SignalKind::Clock),
            PortDef::new(Self::RESET_INPUT, "reset", SignalKind::Trigger),
        ];
        let mut outputs = Vec::new();
        for t in 0..TRACKS as u32 {
            let n = t + 1;
            inputs.push(
                PortDef::new(Self::length_cv(t as usize), format!("t{}_length_cv", n), SignalKind::CvBipolar)
                    .with_attenuator(Self::param(t as usize, LENGTH_ATTEN)),
            );
            inputs.push(
                PortDef::new(Self::fill_cv(t as usize), format!("t{}_fill_cv", n), SignalKind::CvBipolar)
                    .with_attenuator(Self::param(t as usize, FILL_ATTEN)),
            );
            inputs.push(
                PortDef::new(Self::shift_cv(t as usize), format!("t{}_shift_cv", n), SignalKind::CvBipolar)
                    .with_attenuator(Self::param(t as usize, SHIFT_ATTEN)),
            );
            outputs.push(PortDef::new(Self::GATE_OUTPUT + t, format!("t{}_gate", n), SignalKind::Gate));
        }
        outputs.push(PortDef::new(Self::MASTER_OUTPUT, "master", SignalKind::CvUnipolar));
        for t in 0..TRACKS as u32 {
            outputs.push(PortDef::new(
                Self::TRIG_OUTPUT + t,
                format!("t{}_trig", t + 1),
                SignalKind::Trigger,
            ));
        }
        outputs.push(PortDef::new(Self::MASTER_TRIG_OUTPUT, "master_trig", SignalKind::Trigger));

        let mut defs = vec![ParamDef::new(Self::MANUAL_RESET_PARAM, "Manual Reset", 0.0, 1.0, 0.0)];
        for t in 0..TRACKS {
            let n = t + 1;
            let base = Self::param(t, 0);
            defs.extend([
                ParamDef::new(base + DIVMULT, format!("T{} Div/Mult", n), -3.0, 3.0, 0.0)
                    .snapped()
                    .with_display(ParamDisplay::DivMult),
                ParamDef::new(base + LENGTH, format!("T{} Length", n), 1.0, 32.0, 16.0).snapped(),
                ParamDef::new(base + FILL, format!("T{} Fill", n), 0.0, 100.0, 25.0).with_unit("%"),
                ParamDef::new(base + SHIFT, format!("T{} Shift", n), 0.0, 31.0, 0.0).snapped(),
                ParamDef::new(base + LENGTH_ATTEN, format!("T{} Length CV", n), -1.0, 1.0, 0.0),
                ParamDef::new(base + FILL_ATTEN, format!("T{} Fill CV", n), -1.0, 1.0, 0.0),
                ParamDef::new(base + SHIFT_ATTEN, format!("T{} Shift CV", n), -1.0, 1.0, 0.0),
                ParamDef::new(base + RISE, format!("T{} Rise", n), 0.0, 0.1, 0.0).with_unit("s"),
                ParamDef::new(base + FALL, format!("T{} Fall", n), 0.0, 0.1, 0.0).with_unit("s"),
            ]);
        }

        debug!(sample_rate, "euclidean rhythm created");
        Self {
            tracks: [EuclidTrack::new(); TRACKS],
            clock_trigger: SchmittTrigger::new(),
            reset_trigger: SchmittTrigger::new(),
            manual_reset: SchmittTrigger::new(),
            clock_period: ClockPeriod::new(),
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec { inputs, outputs },
        }
    }

    /// Parameter id of `offset` for `track`
    fn param(track: usize, offset: ParamId) -> ParamId {
        1 + track as ParamId * PARAMS_PER_TRACK + offset
    }

    fn length_cv(track: usize) -> PortId {
        2 + track as PortId * 3
    }

    fn fill_cv(track: usize) -> PortId {
        3 + track as PortId * 3
    }

    fn shift_cv(track: usize) -> PortId {
        4 + track as PortId * 3
    }

    pub fn track_param(track: usize, offset: ParamId) -> ParamId {
        Self::param(track, offset)
    }

    pub fn pattern(&self, track: usize) -> Option<&Pattern> {
        self.tracks.get(track).map(|t| &t.pattern)
    }

    pub fn step(&self, track: usize) -> Option<usize> {
        self.tracks.get(track).map(|t| t.step)
    }

    /// Measured clock period in seconds
    pub fn clock_period(&self) -> f64 {
        self.clock_period.period()
    }

    /// Knob plus attenuated CV for one track parameter
    fn cv_param(&self, inputs: &PortValues, track: usize, knob: ParamId, atten: ParamId, cv: PortId, scale: f64) -> f64 {
        let attenuation = self.params.get(Self::param(track, atten));
        modulated_mono(inputs, cv, self.params.get(Self::param(track, knob)), attenuation * scale)
    }
}

impl Default for EuclideanRhythm {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for EuclideanRhythm {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = 1.0 / self.sample_rate;

        let clock_patched = inputs.has(Self::CLOCK_INPUT);
        let clock_edge = clock_patched && self.clock_trigger.process(inputs.get_or(Self::CLOCK_INPUT, 0.0));
        let reset_edge = inputs.has(Self::RESET_INPUT)
            && self.reset_trigger.process(inputs.get_or(Self::RESET_INPUT, 0.0));
        let manual_edge = self.manual_reset.process(self.params.get(Self::MANUAL_RESET_PARAM));
        let period = self.clock_period.process(clock_edge, dt);

        let mut master = 0.0;
        let mut any_trigger = false;

        for t in 0..TRACKS {
            let ratio = DivMult::from_knob(self.params.get_int(Self::param(t, DIVMULT)));
            let interval = ratio.interval(period);

            let length = self
                .cv_param(inputs, t, LENGTH, LENGTH_ATTEN, Self::length_cv(t), 1.0)
                .clamp(1.0, 32.0)
                .round()
                .max(1.0) as usize;
            let fill_percent = self
                .cv_param(inputs, t, FILL, FILL_ATTEN, Self::fill_cv(t), 10.0)
                .clamp(0.0, 100.0);
            let shift = self
                .cv_param(inputs, t, SHIFT, SHIFT_ATTEN, Self::shift_cv(t), 1.0)
                .clamp(0.0, length as f64 - 1.0)
                .round() as i32;
            let rise = self.params.get(Self::param(t, RISE));
            let fall = self.params.get(Self::param(t, FALL));

            let track = &mut self.tracks[t];
            if reset_edge || manual_edge {
                track.restart();
            }
            track.slew.set_rise_time(rise);
            track.slew.set_fall_time(fall);

            let stepped = track.clock.process(dt, interval);
            track.pattern = Pattern::generate(length, fill_from_percent(fill_percent, length), shift);

            if stepped && !track.pattern.is_empty() {
                track.step = (track.step + 1) % length;
                track.gate = track.pattern.get(track.step);
                if track.gate && clock_patched {
                    track.trigger.trigger(0.001);
                }
            }

            let held = track.gate && clock_patched && track.clock.elapsed() < interval * 0.5;
            let gate = track.slew.process(dt, gate_voltage(held));
            let trig = track.trigger.process(dt);

            outputs.set(Self::GATE_OUTPUT + t as PortId, sanitize(gate));
            outputs.set(Self::TRIG_OUTPUT + t as PortId, gate_voltage(trig));
            master += sanitize(gate) * 0.4;
            any_trigger |= trig;
        }

        outputs.set(Self::MASTER_OUTPUT, sanitize(master));
        outputs.set(Self::MASTER_TRIG_OUTPUT, gate_voltage(any_trigger));
    }

    fn reset(&mut self) {
        trace!("euclidean rhythm reset");
        for track in &mut self.tracks {
            track.restart();
            track.trigger.reset();
        }
        self.clock_trigger.reset();
        self.reset_trigger.reset();
        self.manual_reset.reset();
        self.clock_period.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, "euclidean rhythm sample rate changed");
        self.sample_rate = sample_rate;
        self.reset();
    }

    fn params(&self) -> &[ParamDef] {
        self.params.defs()
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        self.params.value(id)
    }

    fn set_param(&mut self, id: ParamId, value: f64) -> Result<(), ModuleError> {
        self.params.set(id, value)
    }

    fn type_id(&self) -> &'static str {
        "euclidean_rhythm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f64 = 1000.0;

    /// Run with a 0.5 s clock, returning the number of rising trigger edges
    /// seen on each track's trigger output
    fn run(module: &mut EuclideanRhythm, inputs: &mut PortValues, samples: usize) -> [usize; TRACKS] {
        let mut outputs = PortValues::new();
        let mut counts = [0; TRACKS];
        let mut last = [0.0; TRACKS];
        for i in 0..samples {
            inputs.set(EuclideanRhythm::CLOCK_INPUT, if i % 500 < 10 { 10.0 } else { 0.0 });
            module.tick(inputs, &mut outputs);
            for t in 0..TRACKS {
                let trig = outputs.get_or(EuclideanRhythm::TRIG_OUTPUT + t as PortId, 0.0);
                if trig > 0.0 && last[t] == 0.0 {
                    counts[t] += 1;
                }
                last[t] = trig;
            }
        }
        counts
    }

    fn module() -> EuclideanRhythm {
        let mut module = EuclideanRhythm::default();
        module.set_sample_rate(SR);
        module
    }

    #[test]
    fn test_defaults() {
        let module = EuclideanRhythm::new(48000.0);
        assert_eq!(module.params().len(), 28);
        assert_eq!(module.get_param(EuclideanRhythm::track_param(1, LENGTH)), Some(16.0));
        assert_eq!(module.get_param(EuclideanRhythm::track_param(2, FILL)), Some(25.0));
        assert_eq!(module.port_spec().outputs.len(), 8);
    }

    #[test]
    fn test_silent_without_clock() {
        let mut module = module();
        let inputs = PortValues::new();
        let mut outputs = PortValues::new();
        for _ in 0..5000 {
            module.tick(&inputs, &mut outputs);
            assert_eq!(outputs.get(EuclideanRhythm::MASTER_OUTPUT), Some(0.0));
            assert_eq!(outputs.get(EuclideanRhythm::MASTER_TRIG_OUTPUT), Some(0.0));
        }
    }

    #[test]
    fn test_default_pattern_hits() {
        let mut module = module();
        let mut inputs = PortValues::new();
        // 32 steps of a 16-step, 4-hit pattern
        let counts = run(&mut module, &mut inputs, 16200);
        assert_eq!(counts, [8, 8, 8]);
        assert_relative_eq!(module.clock_period(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_div_mult_scales_step_rate() {
        let mut module = module();
        for t in 0..TRACKS {
            module.set_param(EuclideanRhythm::track_param(t, FILL), 100.0).unwrap();
        }
        module.set_param(EuclideanRhythm::track_param(1, DIVMULT), 1.0).unwrap();
        module.set_param(EuclideanRhythm::track_param(2, DIVMULT), -1.0).unwrap();
        let mut inputs = PortValues::new();
        let counts = run(&mut module, &mut inputs, 16200);
        assert_eq!(counts, [32, 64, 16]);
    }

    #[test]
    fn test_length_cv_uses_attenuator() {
        let mut module = module();
        let mut inputs = PortValues::new();
        inputs.set(EuclideanRhythm::length_cv(0), 5.0);
        run(&mut module, &mut inputs, 10);
        assert_eq!(module.pattern(0).map(|p| p.len()), Some(16));

        module.set_param(EuclideanRhythm::track_param(0, LENGTH_ATTEN), -1.0).unwrap();
        run(&mut module, &mut inputs, 10);
        assert_eq!(module.pattern(0).map(|p| p.len()), Some(11));
    }

    #[test]
    fn test_non_finite_cv_is_ignored() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            for atten in [0.0, 1.0, -1.0] {
                let mut module = module();
                let mut inputs = PortValues::new();
                for t in 0..TRACKS {
                    module.set_param(EuclideanRhythm::track_param(t, LENGTH_ATTEN), atten).unwrap();
                    module.set_param(EuclideanRhythm::track_param(t, FILL_ATTEN), atten).unwrap();
                    module.set_param(EuclideanRhythm::track_param(t, SHIFT_ATTEN), atten).unwrap();
                    inputs.set(EuclideanRhythm::length_cv(t), bad);
                    inputs.set(EuclideanRhythm::fill_cv(t), bad);
                    inputs.set(EuclideanRhythm::shift_cv(t), bad);
                }

                let mut outputs = PortValues::new();
                for i in 0..1200 {
                    inputs.set(EuclideanRhythm::CLOCK_INPUT, if i % 500 < 10 { 10.0 } else { 0.0 });
                    module.tick(&inputs, &mut outputs);
                    for port in &module.port_spec().outputs {
                        assert!(outputs.get_or(port.id, 0.0).is_finite(), "{}", port.name);
                    }
                }
                for t in 0..TRACKS {
                    assert_eq!(module.pattern(t).map(|p| p.len()), Some(16));
                }
            }
        }
    }

    #[test]
    fn test_shift_is_clamped_to_length() {
        let mut module = module();
        module.set_param(EuclideanRhythm::track_param(0, LENGTH), 4.0).unwrap();
        module.set_param(EuclideanRhythm::track_param(0, FILL), 25.0).unwrap();
        module.set_param(EuclideanRhythm::track_param(0, SHIFT), 20.0).unwrap();
        let mut inputs = PortValues::new();
        run(&mut module, &mut inputs, 1);
        let pattern = module.pattern(0).copied().unwrap();
        assert_eq!(pattern, Pattern::generate(4, 1, 3));
    }

    #[test]
    fn test_reset_input_restarts_tracks() {
        let mut module = module();
        let mut inputs = PortValues::new();
        run(&mut module, &mut inputs, 2600);
        assert_ne!(module.step(0), Some(0));

        inputs.set(EuclideanRhythm::RESET_INPUT, 0.0);
        run(&mut module, &mut inputs, 1);
        inputs.set(EuclideanRhythm::RESET_INPUT, 10.0);
        run(&mut module, &mut inputs, 1);
        assert_eq!(module.step(0), Some(0));
        assert_eq!(module.step(2), Some(0));
    }

    #[test]
    fn test_master_mix_sums_gates() {
        let mut module = module();
        for t in 0..TRACKS {
            module.set_param(EuclideanRhythm::track_param(t, FILL), 100.0).unwrap();
        }
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        let mut peak: f64 = 0.0;
        for i in 0..2000 {
            inputs.set(EuclideanRhythm::CLOCK_INPUT, if i % 500 < 10 { 10.0 } else { 0.0 });
            module.tick(&inputs, &mut outputs);
            peak = peak.max(outputs.get_or(EuclideanRhythm::MASTER_OUTPUT, 0.0));
        }
        assert_relative_eq!(peak, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_param_rejected() {
        let mut module = module();
        assert!(matches!(
            module.set_param(99, 1.0),
            Err(ModuleError::UnknownParam(99))
        ));
    }
}
