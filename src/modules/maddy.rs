//! Three-track Euclidean sequencer with a swing clock, track chains and a
//! five-knob CV sequencer

use super::gate_voltage;
use crate::clock::{DivMult, SwingClock};
use crate::envelope::{Envelope, LatchedCurveEnvelope};
use crate::error::ModuleError;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamDisplay, ParamId, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use crate::rng::Rng;
use crate::sequencer::{ChainedSequence, KnobSequencer, SequenceMode, TrackState, KNOB_COUNT};
use crate::serialize::{MaddyState, StateBlob};
use crate::trigger::{sanitize, PulseGenerator, RisingEdge, SchmittTrigger};
use serde_json::Value;
use tracing::{debug, trace, warn};

const TRACKS: usize = 3;
const CHAINS: usize = 3;

/// What advances the CV sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    Track1,
    Track2,
    Track3,
    Chain12,
    Chain23,
    Chain1213,
}

impl ClockSource {
    pub const COUNT: i32 = 7;
    pub const LABELS: &'static [&'static str] = &["LFO", "T1", "T2", "T3", "12", "23", "1213"];

    /// `None` outside 0..7
    pub fn from_index(index: i32) -> Option<Self> {
        Some(match index {
            0 => ClockSource::Internal,
            1 => ClockSource::Track1,
            2 => ClockSource::Track2,
            3 => ClockSource::Track3,
            4 => ClockSource::Chain12,
            5 => ClockSource::Chain23,
            6 => ClockSource::Chain1213,
            _ => return None,
        })
    }

    pub fn index(&self) -> i32 {
        *self as i32
    }

    pub fn next(&self) -> Self {
        Self::from_index((self.index() + 1) % Self::COUNT).unwrap_or(ClockSource::Internal)
    }

    pub fn label(&self) -> &'static str {
        Self::LABELS[self.index() as usize]
    }
}

/// MADDY
///
/// The internal clock runs at `2^FREQ` Hz with swing on alternate beats.
/// Each track divides or multiplies it and fires a latched-curve envelope on
/// every hit. Three chains hand the envelope from track to track once each
/// has played a full cycle. The CV sequencer picks one of five knob voltages
/// per step, clocked by the internal clock, a track or a chain.
pub struct Maddy {
    swing_clock: SwingClock,
    period: f64,
    clock_pulse: PulseGenerator,
    tracks: [TrackState<LatchedCurveEnvelope>; TRACKS],
    chains: [ChainedSequence; CHAINS],
    sequencer: KnobSequencer,
    mode: SequenceMode,
    clock_source: ClockSource,
    reset_edge: RisingEdge,
    mode_button: SchmittTrigger,
    clock_source_button: SchmittTrigger,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl Maddy {
    pub const RESET_INPUT: PortId = 0;

    pub const CLK_OUTPUT: PortId = 10;
    pub const ENV_OUTPUT: PortId = 11;
    pub const CHAIN_12_OUTPUT: PortId = 14;
    pub const CHAIN_23_OUTPUT: PortId = 15;
    pub const CHAIN_1213_OUTPUT: PortId = 16;
    pub const CV_OUTPUT: PortId = 17;
    pub const TRIG_OUTPUT: PortId = 18;
    pub const TRACK_TRIG_OUTPUT: PortId = 19;
    pub const CHAIN_TRIG_OUTPUT: PortId = 22;

    pub const FREQ_PARAM: ParamId = 0;
    pub const SWING_PARAM: ParamId = 1;
    pub const LENGTH_PARAM: ParamId = 2;
    pub const DECAY_PARAM: ParamId = 3;
    /// Fill and div/mult pairs, two per track
    pub const FILL_PARAM: ParamId = 4;
    pub const DIVMULT_PARAM: ParamId = 5;
    pub const KNOB_PARAM: ParamId = 10;
    pub const MODE_PARAM: ParamId = 15;
    pub const DENSITY_PARAM: ParamId = 16;
    pub const CHAOS_PARAM: ParamId = 17;
    pub const CLOCK_SOURCE_PARAM: ParamId = 18;

    const CHAIN_TRACKS: [&'static [usize]; CHAINS] = [&[0, 1], &[1, 2], &[0, 1, 0, 2]];

    pub fn new(sample_rate: f64) -> Self {
        Self::with_rng(sample_rate, Rng::default())
    }

    /// Construct with a specific random source for the CV sequencer's chaos
    pub fn with_rng(sample_rate: f64, rng: Rng) -> Self {
        let inputs = vec![PortDef::new(Self::RESET_INPUT, "reset", SignalKind::Trigger)];

        let mut outputs = vec![PortDef::new(Self::CLK_OUTPUT, "clk", SignalKind::Trigger)];
        for t in 0..TRACKS as PortId {
            outputs.push(PortDef::new(
                Self::ENV_OUTPUT + t,
                format!("t{}_env", t + 1),
                SignalKind::CvUnipolar,
            ));
        }
        outputs.extend([
            PortDef::new(Self::CHAIN_12_OUTPUT, "chain_12", SignalKind::CvUnipolar),
            PortDef::new(Self::CHAIN_23_OUTPUT, "chain_23", SignalKind::CvUnipolar),
            PortDef::new(Self::CHAIN_1213_OUTPUT, "chain_1213", SignalKind::CvUnipolar),
            PortDef::new(Self::CV_OUTPUT, "cv", SignalKind::CvBipolar),
            PortDef::new(Self::TRIG_OUTPUT, "trig", SignalKind::Trigger),
        ]);
        for t in 0..TRACKS as PortId {
            outputs.push(PortDef::new(
                Self::TRACK_TRIG_OUTPUT + t,
                format!("t{}_trig", t + 1),
                SignalKind::Trigger,
            ));
        }
        for (c, name) in ["chain_12_trig", "chain_23_trig", "chain_1213_trig"].iter().enumerate() {
            outputs.push(PortDef::new(
                Self::CHAIN_TRIG_OUTPUT + c as PortId,
                *name,
                SignalKind::Trigger,
            ));
        }

        let mut defs = vec![
            ParamDef::new(Self::FREQ_PARAM, "Frequency", -3.0, 7.0, 1.0)
                .with_unit(" Hz")
                .with_display(ParamDisplay::Exp2),
            ParamDef::new(Self::SWING_PARAM, "Swing", 0.0, 1.0, 0.0),
            ParamDef::new(Self::LENGTH_PARAM, "Length", 1.0, 32.0, 16.0).snapped(),
            ParamDef::new(Self::DECAY_PARAM, "Decay", 0.0, 1.0, 0.3),
        ];
        for t in 0..TRACKS {
            defs.push(
                ParamDef::new(Self::fill_param(t), format!("T{} Fill", t + 1), 0.0, 100.0, 25.0)
                    .with_unit("%"),
            );
            defs.push(
                ParamDef::new(Self::divmult_param(t), format!("T{} Div/Mult", t + 1), -3.0, 3.0, 0.0)
                    .snapped()
                    .with_display(ParamDisplay::DivMult),
            );
        }
        for k in 0..KNOB_COUNT {
            defs.push(
                ParamDef::new(
                    Self::KNOB_PARAM + k as ParamId,
                    format!("K{}", k + 1),
                    -10.0,
                    10.0,
                    k as f64 * 2.0,
                )
                .with_unit("V"),
            );
        }
        defs.extend([
            ParamDef::new(Self::MODE_PARAM, "Mode", 0.0, 1.0, 0.0),
            ParamDef::new(Self::DENSITY_PARAM, "Density", 0.0, 1.0, 0.5),
            ParamDef::new(Self::CHAOS_PARAM, "Chaos", 0.0, 1.0, 0.0),
            ParamDef::new(Self::CLOCK_SOURCE_PARAM, "Clock Source", 0.0, 1.0, 0.0),
        ]);

        debug!(sample_rate, "maddy created");
        Self {
            swing_clock: SwingClock::new(),
            period: 0.5,
            clock_pulse: PulseGenerator::new(),
            tracks: std::array::from_fn(|_| TrackState::new(LatchedCurveEnvelope::new())),
            chains: Self::CHAIN_TRACKS.map(ChainedSequence::new),
            sequencer: KnobSequencer::new(rng),
            mode: SequenceMode::Minimalism,
            clock_source: ClockSource::Internal,
            reset_edge: RisingEdge::new(2.0),
            mode_button: SchmittTrigger::new(),
            clock_source_button: SchmittTrigger::new(),
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec { inputs, outputs },
        }
    }

    pub fn fill_param(track: usize) -> ParamId {
        Self::FILL_PARAM + 2 * track as ParamId
    }

    pub fn divmult_param(track: usize) -> ParamId {
        Self::DIVMULT_PARAM + 2 * track as ParamId
    }

    pub fn mode(&self) -> SequenceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SequenceMode) {
        self.mode = mode;
        self.regenerate();
    }

    pub fn clock_source(&self) -> ClockSource {
        self.clock_source
    }

    pub fn set_clock_source(&mut self, source: ClockSource) {
        self.clock_source = source;
    }

    pub fn attack_time(&self, track: usize) -> Option<f64> {
        self.tracks.get(track).map(|t| t.envelope.attack_time())
    }

    /// Non-positive or non-finite times are ignored
    pub fn set_attack_time(&mut self, track: usize, seconds: f64) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.envelope.set_attack_time(seconds);
        }
    }

    pub fn shift(&self, track: usize) -> Option<i32> {
        self.tracks.get(track).map(|t| t.shift)
    }

    pub fn set_shift(&mut self, track: usize, shift: i32) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.shift = shift;
        }
    }

    pub fn track_step(&self, track: usize) -> Option<usize> {
        self.tracks.get(track).map(|t| t.step())
    }

    pub fn sequencer(&self) -> &KnobSequencer {
        &self.sequencer
    }

    /// Snapshot of everything saved alongside the knobs
    pub fn state(&self) -> MaddyState {
        MaddyState {
            mode_value: self.mode.index(),
            clock_source_value: self.clock_source.index(),
            attack_times: self.tracks.each_ref().map(|t| t.envelope.attack_time()),
            shifts: self.tracks.each_ref().map(|t| t.shift),
        }
    }

    /// Merge a saved document into the current state.
    ///
    /// Keys absent from the document keep their value. Out-of-range values
    /// for individual fields are skipped with a warning.
    pub fn load_state(&mut self, value: &Value) -> Result<(), ModuleError> {
        let mut state = self.state();
        state.merge_json(value)?;

        if (0..3).contains(&state.mode_value) {
            self.mode = SequenceMode::from_index(state.mode_value);
        } else {
            warn!(mode = state.mode_value, "ignoring out-of-range sequencer mode");
        }
        match ClockSource::from_index(state.clock_source_value) {
            Some(source) => self.clock_source = source,
            None => warn!(source = state.clock_source_value, "ignoring out-of-range clock source"),
        }
        for (t, (&attack, &shift)) in state.attack_times.iter().zip(&state.shifts).enumerate() {
            if attack.is_finite() && attack > 0.0 {
                self.tracks[t].envelope.set_attack_time(attack);
            } else {
                warn!(track = t, attack, "ignoring invalid attack time");
            }
            self.tracks[t].shift = shift;
        }

        self.regenerate();
        debug!(?state, "maddy state loaded");
        Ok(())
    }

    fn knobs(&self) -> [f64; KNOB_COUNT] {
        std::array::from_fn(|k| self.params.get(Self::KNOB_PARAM + k as ParamId))
    }

    fn regenerate(&mut self) {
        let density = self.params.get(Self::DENSITY_PARAM);
        let chaos = self.params.get(Self::CHAOS_PARAM);
        self.sequencer.generate(density, chaos, self.mode);
    }

    fn restart(&mut self) {
        self.swing_clock.reset();
        self.period = 0.5;
        for track in &mut self.tracks {
            track.reset();
        }
        for chain in &mut self.chains {
            chain.reset();
        }
        let density = self.params.get(Self::DENSITY_PARAM);
        let chaos = self.params.get(Self::CHAOS_PARAM);
        self.sequencer.reset(density, chaos, self.mode);
    }
}

impl Default for Maddy {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Maddy {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = 1.0 / self.sample_rate;

        if self.reset_edge.process(inputs.get_or(Self::RESET_INPUT, 0.0)) {
            self.restart();
        }

        let freq = libm::exp2(self.params.get(Self::FREQ_PARAM));
        let swing = self.params.get(Self::SWING_PARAM);
        let internal_clock = match self.swing_clock.process(freq, swing, dt) {
            Some(beat) => {
                self.period = beat;
                self.clock_pulse.trigger(0.001);
                true
            }
            None => false,
        };
        outputs.set(Self::CLK_OUTPUT, gate_voltage(self.clock_pulse.process(dt)));

        let length = self.params.get_int(Self::LENGTH_PARAM).clamp(1, 32) as usize;
        let decay = self.params.get(Self::DECAY_PARAM);
        let mut track_hits = [false; TRACKS];
        for (t, track) in self.tracks.iter_mut().enumerate() {
            let fill = self.params.get(Self::fill_param(t));
            let ratio = DivMult::from_knob(self.params.get_int(Self::divmult_param(t)));
            track.configure(length, fill, ratio);
            if track.clock(internal_clock, self.period, dt) {
                track.advance_and_fire(0.001, decay);
            }
            let env = track.envelope.process(dt, decay) * 10.0;
            outputs.set(Self::ENV_OUTPUT + t as PortId, sanitize(env));
            outputs.set(
                Self::TRACK_TRIG_OUTPUT + t as PortId,
                gate_voltage(track.trigger_high(dt)),
            );
            track_hits[t] = track.take_just_triggered();
        }

        let mut chain_advanced = [false; CHAINS];
        for (c, chain) in self.chains.iter_mut().enumerate() {
            let (env, advanced) = chain.process(&self.tracks, internal_clock, dt);
            outputs.set(Self::CHAIN_12_OUTPUT + c as PortId, sanitize(env));
            outputs.set(
                Self::CHAIN_TRIG_OUTPUT + c as PortId,
                gate_voltage(chain.trigger_high()),
            );
            chain_advanced[c] = advanced;
        }

        if self.mode_button.process(self.params.get(Self::MODE_PARAM)) {
            self.mode = self.mode.next();
            self.regenerate();
        }
        if self.clock_source_button.process(self.params.get(Self::CLOCK_SOURCE_PARAM)) {
            self.clock_source = self.clock_source.next();
        }

        let pattern_clock = match self.clock_source {
            ClockSource::Internal => internal_clock,
            ClockSource::Track1 => track_hits[0],
            ClockSource::Track2 => track_hits[1],
            ClockSource::Track3 => track_hits[2],
            ClockSource::Chain12 => chain_advanced[0],
            ClockSource::Chain23 => chain_advanced[1],
            ClockSource::Chain1213 => chain_advanced[2],
        };

        let knobs = self.knobs();
        if pattern_clock {
            let density = self.params.get(Self::DENSITY_PARAM);
            let chaos = self.params.get(Self::CHAOS_PARAM);
            self.sequencer.advance(density, chaos, self.mode, &knobs);
        }
        outputs.set(Self::CV_OUTPUT, sanitize(self.sequencer.voltage(&knobs)));
        outputs.set(Self::TRIG_OUTPUT, gate_voltage(self.sequencer.trigger_high(dt)));
    }

    fn reset(&mut self) {
        trace!("maddy reset");
        self.restart();
        self.clock_pulse.reset();
        self.reset_edge.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, "maddy sample rate changed");
        self.sample_rate = sample_rate;
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
        "maddy"
    }

    fn serialize_state(&self) -> Option<Value> {
        self.state().to_json().ok()
    }

    fn deserialize_state(&mut self, state: &Value) -> Result<(), ModuleError> {
        self.load_state(state)
    }
}
