//! Two-voice techno drum: a Euclidean kick and a hat track over one clock

use super::{gate_voltage, modulated_mono};
use crate::analog::noise::ColoredNoise;
use crate::analog::OversampledSineVco;
use crate::clock::{ClockPeriod, DivMult};
use crate::envelope::{DecayShape, Envelope, UnifiedEnvelope};
use crate::error::ModuleError;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamDisplay, ParamId, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use crate::rng::Rng;
use crate::sequencer::TrackState;
use crate::serialize::{PanelState, StateBlob};
use crate::trigger::{sanitize, PulseGenerator, SchmittTrigger};
use serde_json::Value;
use tracing::{debug, trace};

/// Four-step counter that fires a 10 ms accent once per bar of quarters
#[derive(Debug, Clone, Copy, Default)]
struct AccentClock {
    step: usize,
    pulse: PulseGenerator,
}

impl AccentClock {
    fn process(&mut self, clock: bool, shift: usize, dt: f64) -> f64 {
        if clock {
            self.step = (self.step + 1) % 4;
            if self.step == shift % 4 {
                self.pulse.trigger(0.01);
            }
        }
        gate_voltage(self.pulse.process(dt))
    }

    fn reset(&mut self) {
        self.step = 0;
    }
}

/// A sequenced sine voice with its own amplitude envelope and noise source
struct DrumVoice {
    /// The track envelope drives pitch FM on the kick; the hat ignores it
    track: TrackState<UnifiedEnvelope>,
    vca: UnifiedEnvelope,
    vco: OversampledSineVco,
    noise: ColoredNoise,
}

impl DrumVoice {
    fn new(sample_rate: f64, rng: Rng) -> Self {
        Self {
            track: TrackState::new(UnifiedEnvelope::new()),
            vca: UnifiedEnvelope::new(),
            vco: OversampledSineVco::new(sample_rate),
            noise: ColoredNoise::new(rng),
        }
    }

    fn restart(&mut self) {
        self.track.reset();
        self.vca.reset();
    }
}

/// TWNC
///
/// Track 1 is a kick: a sine with envelope and pink/blue noise FM, shaped by
/// its own VCA envelope and a quarter-note accent envelope. Track 2 is a
/// hat: a high sine with noise FM and a short VCA envelope, running at one
/// of five clock ratios. Neither track steps until the clock is patched.
pub struct Twnc {
    kick: DrumVoice,
    hat: DrumVoice,
    accent: AccentClock,
    main_vca: UnifiedEnvelope,
    clock_trigger: SchmittTrigger,
    reset_trigger: SchmittTrigger,
    manual_reset: SchmittTrigger,
    clock_period: ClockPeriod,
    panel: PanelState,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl Twnc {
    pub const CLOCK_INPUT: PortId = 0;
    pub const RESET_INPUT: PortId = 1;
    pub const KICK_FREQ_CV_INPUT: PortId = 2;
    pub const KICK_DECAY_CV_INPUT: PortId = 3;
    pub const HAT_FREQ_CV_INPUT: PortId = 4;
    pub const HAT_DECAY_CV_INPUT: PortId = 5;

    pub const KICK_OUTPUT: PortId = 10;
    pub const HAT_OUTPUT: PortId = 11;
    pub const ACCENT_ENV_OUTPUT: PortId = 12;
    pub const KICK_FM_ENV_OUTPUT: PortId = 13;
    pub const HAT_VCA_ENV_OUTPUT: PortId = 14;

    pub const LENGTH_PARAM: ParamId = 0;
    pub const MANUAL_RESET_PARAM: ParamId = 1;
    pub const KICK_FILL_PARAM: ParamId = 2;
    pub const KICK_FREQ_PARAM: ParamId = 3;
    pub const KICK_FM_AMOUNT_PARAM: ParamId = 4;
    pub const KICK_NOISE_MIX_PARAM: ParamId = 5;
    pub const ACCENT_SHIFT_PARAM: ParamId = 6;
    pub const ACCENT_DECAY_PARAM: ParamId = 7;
    pub const KICK_DECAY_PARAM: ParamId = 8;
    pub const KICK_SHAPE_PARAM: ParamId = 9;
    pub const HAT_SHIFT_PARAM: ParamId = 10;
    pub const HAT_FILL_PARAM: ParamId = 11;
    pub const HAT_RATIO_PARAM: ParamId = 12;
    pub const HAT_FREQ_PARAM: ParamId = 13;
    pub const HAT_DECAY_PARAM: ParamId = 14;
    pub const HAT_SHAPE_PARAM: ParamId = 15;
    pub const HAT_NOISE_FM_PARAM: ParamId = 16;

    const MAIN_VCA_SHAPE: f64 = 0.5;

    pub fn new(sample_rate: f64) -> Self {
        let mut rng = Rng::default();
        let kick_rng = Rng::from_seed(rng.next_u64());
        let hat_rng = Rng::from_seed(rng.next_u64());
        Self::with_rngs(sample_rate, kick_rng, hat_rng)
    }

    /// Construct with explicit noise sources for the two voices
    pub fn with_rngs(sample_rate: f64, kick_rng: Rng, hat_rng: Rng) -> Self {
        let inputs = vec![
            PortDef::new(Self::CLOCK_INPUT, "clock", SignalKind::Clock),
            PortDef::new(Self::RESET_INPUT, "reset", SignalKind::Trigger),
            PortDef::new(Self::KICK_FREQ_CV_INPUT, "kick_freq_cv", SignalKind::VoltPerOctave),
            PortDef::new(Self::KICK_DECAY_CV_INPUT, "kick_decay_cv", SignalKind::CvBipolar),
            PortDef::new(Self::HAT_FREQ_CV_INPUT, "hat_freq_cv", SignalKind::VoltPerOctave),
            PortDef::new(Self::HAT_DECAY_CV_INPUT, "hat_decay_cv", SignalKind::CvBipolar),
        ];
        let outputs = vec![
            PortDef::new(Self::KICK_OUTPUT, "kick", SignalKind::Audio),
            PortDef::new(Self::HAT_OUTPUT, "hat", SignalKind::Audio),
            PortDef::new(Self::ACCENT_ENV_OUTPUT, "accent_env", SignalKind::CvUnipolar),
            PortDef::new(Self::KICK_FM_ENV_OUTPUT, "kick_fm_env", SignalKind::CvUnipolar),
            PortDef::new(Self::HAT_VCA_ENV_OUTPUT, "hat_vca_env", SignalKind::CvUnipolar),
        ];

        let (min_freq, max_freq) = (libm::log2(20.0), libm::log2(20000.0));
        let defs = vec![
            ParamDef::new(Self::LENGTH_PARAM, "Length", 1.0, 32.0, 32.0).snapped(),
            ParamDef::new(Self::MANUAL_RESET_PARAM, "Manual Reset", 0.0, 1.0, 0.0),
            ParamDef::new(Self::KICK_FILL_PARAM, "Kick Fill", 0.0, 100.0, 84.5).with_unit("%"),
            ParamDef::new(Self::KICK_FREQ_PARAM, "Kick Frequency", min_freq, max_freq, 5.1989)
                .with_unit(" Hz")
                .with_display(ParamDisplay::Exp2),
            ParamDef::new(Self::KICK_FM_AMOUNT_PARAM, "Kick FM Amount", 0.0, 1.0, 0.65),
            ParamDef::new(Self::KICK_NOISE_MIX_PARAM, "Kick Noise Mix", 0.0, 1.0, 0.152),
            ParamDef::new(Self::ACCENT_SHIFT_PARAM, "Accent Shift", 1.0, 7.0, 1.0).snapped(),
            ParamDef::new(Self::ACCENT_DECAY_PARAM, "Accent Decay", 0.01, 2.0, 0.396).with_unit(" s"),
            ParamDef::new(Self::KICK_DECAY_PARAM, "Kick Decay", 0.01, 2.0, 0.7204).with_unit(" s"),
            ParamDef::new(Self::KICK_SHAPE_PARAM, "Kick Shape", 0.0, 0.99, 0.0),
            ParamDef::new(Self::HAT_SHIFT_PARAM, "Hat Shift", 0.0, 7.0, 2.0).snapped(),
            ParamDef::new(Self::HAT_FILL_PARAM, "Hat Fill", 0.0, 100.0, 25.0).with_unit("%"),
            ParamDef::new(Self::HAT_RATIO_PARAM, "Hat Div/Mult", 0.0, 4.0, 1.0)
                .snapped()
                .with_display(ParamDisplay::RatioTable),
            ParamDef::new(Self::HAT_FREQ_PARAM, "Hat Frequency", min_freq, max_freq, 14.2877)
                .with_unit(" Hz")
                .with_display(ParamDisplay::Exp2),
            ParamDef::new(Self::HAT_DECAY_PARAM, "Hat Decay", 0.01, 2.0, 0.1314).with_unit(" s"),
            ParamDef::new(Self::HAT_SHAPE_PARAM, "Hat Shape", 0.0, 0.99, 0.0554),
            ParamDef::new(Self::HAT_NOISE_FM_PARAM, "Hat Noise FM", 0.0, 1.0, 0.714),
        ];

        debug!(sample_rate, "twnc created");
        Self {
            kick: DrumVoice::new(sample_rate, kick_rng),
            hat: DrumVoice::new(sample_rate, hat_rng),
            accent: AccentClock::default(),
            main_vca: UnifiedEnvelope::new(),
            clock_trigger: SchmittTrigger::new(),
            reset_trigger: SchmittTrigger::new(),
            manual_reset: SchmittTrigger::new(),
            clock_period: ClockPeriod::new(),
            panel: PanelState::default(),
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec { inputs, outputs },
        }
    }

    pub fn panel(&self) -> PanelState {
        self.panel
    }

    pub fn load_panel(&mut self, value: &Value) -> Result<(), ModuleError> {
        self.panel.merge_json(value)?;
        debug!(panel = ?self.panel, "twnc panel state loaded");
        Ok(())
    }

    /// Cursor of track 0 (kick) or 1 (hat)
    pub fn step(&self, track: usize) -> Option<usize> {
        match track {
            0 => Some(self.kick.track.step()),
            1 => Some(self.hat.track.step()),
            _ => None,
        }
    }

    pub fn clock_period(&self) -> f64 {
        self.clock_period.period()
    }

    fn restart(&mut self) {
        self.clock_period.reset();
        self.kick.restart();
        self.hat.restart();
        self.accent.reset();
        self.main_vca.reset();
    }

    fn decay(&self, inputs: &PortValues, param: ParamId, cv: PortId) -> f64 {
        let knob = self.params.get(param);
        if inputs.has(cv) {
            modulated_mono(inputs, cv, knob, 0.1).clamp(0.01, 2.0)
        } else {
            knob
        }
    }

    fn silence(outputs: &mut PortValues) {
        for id in Self::KICK_OUTPUT..=Self::HAT_VCA_ENV_OUTPUT {
            outputs.set(id, 0.0);
        }
    }
}

impl Default for Twnc {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Twnc {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = 1.0 / self.sample_rate;

        let clock_patched = inputs.has(Self::CLOCK_INPUT);
        let clock_edge =
            clock_patched && self.clock_trigger.process(inputs.get_or(Self::CLOCK_INPUT, 0.0));
        let reset_edge = inputs.has(Self::RESET_INPUT)
            && self.reset_trigger.process(inputs.get_or(Self::RESET_INPUT, 0.0));
        let manual_edge = self.manual_reset.process(self.params.get(Self::MANUAL_RESET_PARAM));
        if reset_edge || manual_edge {
            self.restart();
            Self::silence(outputs);
            return;
        }

        let period = self.clock_period.process(clock_edge, dt);
        let length = self.params.get_int(Self::LENGTH_PARAM).clamp(1, 32) as usize;

        let accent_shift = self.params.get_int(Self::ACCENT_SHIFT_PARAM).max(0) as usize;
        let accent_trigger = self.accent.process(clock_edge, accent_shift, dt);

        // kick
        let kick_decay = self.decay(inputs, Self::KICK_DECAY_PARAM, Self::KICK_DECAY_CV_INPUT);
        let kick_shape = self.params.get(Self::KICK_SHAPE_PARAM);
        let noise_mix = self.params.get(Self::KICK_NOISE_MIX_PARAM);
        let fm_amount = self.params.get(Self::KICK_FM_AMOUNT_PARAM);
        let kick_freq = libm::exp2(modulated_mono(
            inputs,
            Self::KICK_FREQ_CV_INPUT,
            self.params.get(Self::KICK_FREQ_PARAM),
            1.0,
        ));
        let accent_decay = self.params.get(Self::ACCENT_DECAY_PARAM);

        let kick = &mut self.kick;
        kick.track.shift = 0;
        kick.track.configure(length, self.params.get(Self::KICK_FILL_PARAM), DivMult::UNITY);
        if kick.track.clock(clock_edge, period, dt) && clock_patched {
            kick.track.advance(0.01);
        }
        let trigger = gate_voltage(kick.track.trigger_high(dt));
        let fm_env = kick.track.envelope.process_gate(
            dt,
            trigger,
            DecayShape {
                decay: kick_decay * 0.5,
                shape: kick_shape,
            },
        );
        let (pink, blue) = kick.noise.process();
        let noise = pink * (1.0 - noise_mix) + blue * noise_mix;
        let fm = fm_env * fm_amount * 4.0 + noise * noise_mix * 0.5;
        let audio = kick.vco.process(kick_freq, fm);
        let vca = kick.vca.process_gate(
            dt,
            trigger,
            DecayShape {
                decay: kick_decay,
                shape: kick_shape,
            },
        );
        let main = self.main_vca.process_gate(
            dt,
            accent_trigger,
            DecayShape {
                decay: accent_decay,
                shape: Self::MAIN_VCA_SHAPE,
            },
        );
        outputs.set(Self::KICK_OUTPUT, sanitize(audio * vca * main * 1.4));
        outputs.set(Self::ACCENT_ENV_OUTPUT, sanitize(main * 10.0));
        outputs.set(Self::KICK_FM_ENV_OUTPUT, sanitize(fm_env * 10.0));

        // hat
        let hat_decay = self.decay(inputs, Self::HAT_DECAY_PARAM, Self::HAT_DECAY_CV_INPUT);
        let hat_shape = self.params.get(Self::HAT_SHAPE_PARAM);
        let noise_fm = self.params.get(Self::HAT_NOISE_FM_PARAM);
        let hat_freq = libm::exp2(modulated_mono(
            inputs,
            Self::HAT_FREQ_CV_INPUT,
            self.params.get(Self::HAT_FREQ_PARAM),
            1.0,
        ));
        let ratio = DivMult::from_ratio_index(self.params.get_int(Self::HAT_RATIO_PARAM));

        let hat = &mut self.hat;
        hat.track.shift = self.params.get_int(Self::HAT_SHIFT_PARAM).clamp(0, 7);
        hat.track.configure(length, self.params.get(Self::HAT_FILL_PARAM), ratio);
        if hat.track.clock(clock_edge, period, dt) && clock_patched {
            hat.track.advance(0.01);
        }
        let trigger = gate_voltage(hat.track.trigger_high(dt));
        let fm = if noise_fm > 0.0 {
            let (pink, blue) = hat.noise.process();
            let selected = if noise_fm < 0.5 { pink } else { blue };
            selected * noise_fm * 0.5
        } else {
            0.0
        };
        let audio = hat.vco.process(hat_freq, fm);
        let vca = hat.vca.process_gate(
            dt,
            trigger,
            DecayShape {
                decay: hat_decay * 0.5,
                shape: hat_shape,
            },
        );
        outputs.set(Self::HAT_OUTPUT, sanitize(audio * vca * 0.7));
        outputs.set(Self::HAT_VCA_ENV_OUTPUT, sanitize(vca * 10.0));
    }

    fn reset(&mut self) {
        trace!("twnc reset");
        self.restart();
        self.clock_trigger.reset();
        self.reset_trigger.reset();
        self.manual_reset.reset();
        self.kick.vco.reset();
        self.hat.vco.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, "twnc sample rate changed");
        self.sample_rate = sample_rate;
        self.kick.vco.set_sample_rate(sample_rate);
        self.hat.vco.set_sample_rate(sample_rate);
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
        "twnc"
    }

    fn serialize_state(&self) -> Option<Value> {
        self.panel.to_json().ok()
    }

    fn deserialize_state(&mut self, state: &Value) -> Result<(), ModuleError> {
        self.load_panel(state)
    }
}
