//! Shared frame for the polyphonic stereo chaos effects
//!
//! Facehugger, Ovomorph and Runner differ only in their audio core and the
//! three knobs that drive it. Everything else (chaos source, wet/dry mix,
//! poly channel handling, NaN scrubbing at the jacks, bypass and panel
//! state) lives here.

use super::{modulated, stereo_channels, stereo_input};
use crate::effects::{crossfade, ChaosFrame, ChaosSource};
use crate::error::ModuleError;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, PortDef, PortId, PortSpec, PortValues, SignalKind,
    MAX_POLY,
};
use crate::rng::Rng;
use crate::serialize::{PanelState, StateBlob};
use crate::trigger::sanitize;
use serde_json::Value;
use tracing::{debug, trace};

/// Static description of one core knob
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectControl {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Volts-to-knob scale of the matching CV input
    pub cv_scale: f64,
    pub unit: &'static str,
}

impl EffectControl {
    pub const fn unit_range(name: &'static str, default: f64) -> Self {
        Self {
            name,
            min: 0.0,
            max: 1.0,
            default,
            cv_scale: 0.1,
            unit: "",
        }
    }

    /// Lower-case port-friendly name, e.g. "time_l" for "Time L"
    fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }
}

/// Stereo audio core of one poly channel
pub trait StereoCore: Send + Sync + Sized {
    /// Host type identifier of the wrapping module
    const TYPE_ID: &'static str;

    const CONTROLS: [EffectControl; 3];

    /// `rng` seeds any randomness the core owns
    fn new(rng: &mut Rng) -> Self;

    /// Hook for chaos modulation of a control, applied after CV and before
    /// the control is clamped to its range
    #[inline]
    fn modulate(_index: usize, value: f64, _chaos: ChaosFrame) -> f64 {
        value
    }

    /// Wet signal for one stereo frame
    fn process(
        &mut self,
        left: f64,
        right: f64,
        controls: [f64; 3],
        chaos: ChaosFrame,
        sample_rate: f64,
    ) -> (f64, f64);

    fn reset(&mut self);
}

/// Polyphonic stereo effect with a built-in chaos modulator.
///
/// Every channel of the wider stereo input gets its own chaos source and
/// core. Channels past the active count are left untouched.
pub struct ChaosEffect<C: StereoCore> {
    cores: Vec<C>,
    chaos: [ChaosSource; MAX_POLY],
    panel: PanelState,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl<C: StereoCore> ChaosEffect<C> {
    pub const LEFT_INPUT: PortId = 0;
    pub const RIGHT_INPUT: PortId = 1;
    /// CV for core control `i` is `CONTROL_CV_INPUT + i`
    pub const CONTROL_CV_INPUT: PortId = 2;
    pub const MIX_CV_INPUT: PortId = 5;
    pub const CHAOS_CV_INPUT: PortId = 6;
    pub const RATE_CV_INPUT: PortId = 7;

    pub const LEFT_OUTPUT: PortId = 10;
    pub const RIGHT_OUTPUT: PortId = 11;
    pub const CHAOS_OUTPUT: PortId = 12;
    pub const SH_OUTPUT: PortId = 13;

    /// Core control `i` is `CONTROL_PARAM + i`
    pub const CONTROL_PARAM: ParamId = 0;
    pub const MIX_PARAM: ParamId = 3;
    pub const CHAOS_PARAM: ParamId = 4;
    pub const RATE_PARAM: ParamId = 5;

    const MIX_CV_SCALE: f64 = 0.1;
    const CHAOS_OUTPUT_SCALE: f64 = 5.0;

    pub fn new(sample_rate: f64) -> Self {
        Self::with_rng(sample_rate, Rng::default())
    }

    pub fn with_rng(sample_rate: f64, mut rng: Rng) -> Self {
        let mut inputs = vec![
            PortDef::new(Self::LEFT_INPUT, "left", SignalKind::Audio).polyphonic(),
            PortDef::new(Self::RIGHT_INPUT, "right", SignalKind::Audio)
                .polyphonic()
                .normalled_to(Self::LEFT_INPUT),
        ];
        for (i, control) in C::CONTROLS.iter().enumerate() {
            inputs.push(
                PortDef::new(
                    Self::CONTROL_CV_INPUT + i as PortId,
                    format!("{}_cv", control.slug()),
                    SignalKind::CvBipolar,
                )
                .polyphonic(),
            );
        }
        inputs.extend([
            PortDef::new(Self::MIX_CV_INPUT, "mix_cv", SignalKind::CvBipolar).polyphonic(),
            PortDef::new(Self::CHAOS_CV_INPUT, "chaos_cv", SignalKind::CvBipolar).polyphonic(),
            PortDef::new(Self::RATE_CV_INPUT, "rate_cv", SignalKind::CvBipolar).polyphonic(),
        ]);

        let outputs = vec![
            PortDef::new(Self::LEFT_OUTPUT, "left", SignalKind::Audio).polyphonic(),
            PortDef::new(Self::RIGHT_OUTPUT, "right", SignalKind::Audio).polyphonic(),
            PortDef::new(Self::CHAOS_OUTPUT, "chaos", SignalKind::CvBipolar).polyphonic(),
            PortDef::new(Self::SH_OUTPUT, "sample_hold", SignalKind::CvBipolar).polyphonic(),
        ];

        let mut defs: Vec<ParamDef> = C::CONTROLS
            .iter()
            .enumerate()
            .map(|(i, c)| {
                ParamDef::new(Self::CONTROL_PARAM + i as ParamId, c.name, c.min, c.max, c.default)
                    .with_unit(c.unit)
            })
            .collect();
        defs.extend([
            ParamDef::new(Self::MIX_PARAM, "Mix", 0.0, 1.0, 0.5).with_unit("%"),
            ParamDef::new(Self::CHAOS_PARAM, "Chaos", 0.0, 1.0, 0.0).with_unit("%"),
            ParamDef::new(
                Self::RATE_PARAM,
                "Rate",
                ChaosSource::MIN_RATE,
                ChaosSource::MAX_RATE,
                0.5,
            )
            .with_unit("x"),
        ]);

        let cores = (0..MAX_POLY).map(|_| C::new(&mut rng)).collect();

        debug!(sample_rate, module = C::TYPE_ID, "chaos effect created");
        Self {
            cores,
            chaos: [ChaosSource::default(); MAX_POLY],
            panel: PanelState::default(),
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec { inputs, outputs },
        }
    }

    pub fn core(&self, channel: usize) -> Option<&C> {
        self.cores.get(channel)
    }

    pub fn panel(&self) -> PanelState {
        self.panel
    }

    pub fn load_panel(&mut self, value: &Value) -> Result<(), ModuleError> {
        self.panel.merge_json(value)?;
        debug!(module = C::TYPE_ID, panel = ?self.panel, "panel state loaded");
        Ok(())
    }

    fn controls(&self, inputs: &PortValues, channel: usize, chaos: ChaosFrame) -> [f64; 3] {
        std::array::from_fn(|i| {
            let control = &C::CONTROLS[i];
            let knob = self.params.get(Self::CONTROL_PARAM + i as ParamId);
            let value = modulated(
                inputs,
                Self::CONTROL_CV_INPUT + i as PortId,
                channel,
                knob,
                control.cv_scale,
            );
            C::modulate(i, value, chaos).clamp(control.min, control.max)
        })
    }

    fn set_channel_counts(outputs: &mut PortValues, channels: usize, ids: &[PortId]) {
        for &id in ids {
            outputs.set_channels(id, channels);
        }
    }
}

impl<C: StereoCore> Default for ChaosEffect<C> {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl<C: StereoCore> GraphModule for ChaosEffect<C> {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        if self.sample_rate <= 0.0 {
            return;
        }
        let dt = 1.0 / self.sample_rate;
        let channels = stereo_channels(inputs, Self::LEFT_INPUT, Self::RIGHT_INPUT).min(MAX_POLY);
        Self::set_channel_counts(
            outputs,
            channels,
            &[Self::LEFT_OUTPUT, Self::RIGHT_OUTPUT, Self::CHAOS_OUTPUT, Self::SH_OUTPUT],
        );

        let amount_knob = self.params.get(Self::CHAOS_PARAM);
        let rate_knob = self.params.get(Self::RATE_PARAM);
        let mix_knob = self.params.get(Self::MIX_PARAM);

        for c in 0..channels {
            let amount = modulated(
                inputs,
                Self::CHAOS_CV_INPUT,
                c,
                amount_knob,
                ChaosSource::AMOUNT_CV_SCALE,
            );
            let rate = modulated(inputs, Self::RATE_CV_INPUT, c, rate_knob, ChaosSource::RATE_CV_SCALE);
            let chaos = self.chaos[c].process(amount, rate, dt);
            outputs.set_channel(Self::CHAOS_OUTPUT, c, chaos.raw * Self::CHAOS_OUTPUT_SCALE);
            outputs.set_channel(Self::SH_OUTPUT, c, chaos.held * Self::CHAOS_OUTPUT_SCALE);

            let (left, right) = stereo_input(inputs, Self::LEFT_INPUT, Self::RIGHT_INPUT, c);
            let (left, right) = (sanitize(left), sanitize(right));

            let controls = self.controls(inputs, c, chaos);
            let (wet_l, wet_r) = self.cores[c].process(left, right, controls, chaos, self.sample_rate);

            let mix = modulated(inputs, Self::MIX_CV_INPUT, c, mix_knob, Self::MIX_CV_SCALE)
                .clamp(0.0, 1.0);
            outputs.set_channel(Self::LEFT_OUTPUT, c, sanitize(crossfade(left, wet_l, mix)));
            outputs.set_channel(Self::RIGHT_OUTPUT, c, sanitize(crossfade(right, wet_r, mix)));
        }
    }

    fn bypass(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let channels = stereo_channels(inputs, Self::LEFT_INPUT, Self::RIGHT_INPUT).min(MAX_POLY);
        Self::set_channel_counts(
            outputs,
            channels,
            &[Self::LEFT_OUTPUT, Self::RIGHT_OUTPUT, Self::CHAOS_OUTPUT, Self::SH_OUTPUT],
        );
        for c in 0..channels {
            let (left, right) = stereo_input(inputs, Self::LEFT_INPUT, Self::RIGHT_INPUT, c);
            outputs.set_channel(Self::LEFT_OUTPUT, c, left);
            outputs.set_channel(Self::RIGHT_OUTPUT, c, right);
            outputs.set_channel(Self::CHAOS_OUTPUT, c, 0.0);
            outputs.set_channel(Self::SH_OUTPUT, c, 0.0);
        }
    }

    fn reset(&mut self) {
        trace!(module = C::TYPE_ID, "chaos effect reset");
        self.cores.iter_mut().for_each(C::reset);
        self.chaos.iter_mut().for_each(ChaosSource::reset);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, module = C::TYPE_ID, "chaos effect sample rate changed");
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
        C::TYPE_ID
    }

    fn serialize_state(&self) -> Option<Value> {
        self.panel.to_json().ok()
    }

    fn deserialize_state(&mut self, state: &Value) -> Result<(), ModuleError> {
        self.load_panel(state)
    }
}
