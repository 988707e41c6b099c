//! Eight-speaker cube panner with a sweep filter and a send/return loop

use super::modulated_mono;
use crate::error::ModuleError;
use crate::filter::SweepFilter;
use crate::panner::{cube_gains, SPEAKERS};
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamId, PortDef, PortId, PortSpec, PortValues, SignalKind,
};
use crate::trigger::sanitize;
use tracing::{debug, trace};

/// Pyramid
///
/// Places a mono source inside a cube of eight speakers. The source is
/// scaled by the level knob and run through a bipolar sweep filter before
/// panning; the send tap is taken ahead of the filter. The stereo return is
/// panned alongside it, left on the even outputs and right on the odd ones.
pub struct Pyramid {
    filter: SweepFilter,
    send_pre_level: bool,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl Pyramid {
    pub const AUDIO_INPUT: PortId = 0;
    pub const X_CV_INPUT: PortId = 1;
    pub const Y_CV_INPUT: PortId = 2;
    pub const Z_CV_INPUT: PortId = 3;
    pub const FILTER_CV_INPUT: PortId = 4;
    pub const RETURN_L_INPUT: PortId = 5;
    pub const RETURN_R_INPUT: PortId = 6;

    /// First of the eight speaker outputs, in panner order
    pub const SPEAKER_OUTPUT: PortId = 10;
    pub const SEND_OUTPUT: PortId = 18;

    pub const X_PARAM: ParamId = 0;
    pub const Y_PARAM: ParamId = 1;
    pub const Z_PARAM: ParamId = 2;
    pub const LEVEL_PARAM: ParamId = 3;
    pub const FILTER_PARAM: ParamId = 4;
    pub const SEND_PARAM: ParamId = 5;

    const CV_SCALE: f64 = 0.2;

    pub fn new(sample_rate: f64) -> Self {
        let inputs = vec![
            PortDef::new(Self::AUDIO_INPUT, "audio", SignalKind::Audio),
            PortDef::new(Self::X_CV_INPUT, "x_cv", SignalKind::CvBipolar),
            PortDef::new(Self::Y_CV_INPUT, "y_cv", SignalKind::CvBipolar),
            PortDef::new(Self::Z_CV_INPUT, "z_cv", SignalKind::CvBipolar),
            PortDef::new(Self::FILTER_CV_INPUT, "filter_cv", SignalKind::CvBipolar),
            PortDef::new(Self::RETURN_L_INPUT, "return_l", SignalKind::Audio),
            PortDef::new(Self::RETURN_R_INPUT, "return_r", SignalKind::Audio),
        ];
        let mut outputs: Vec<PortDef> = SPEAKERS
            .iter()
            .enumerate()
            .map(|(i, speaker)| {
                PortDef::new(
                    Self::SPEAKER_OUTPUT + i as PortId,
                    speaker.name.to_lowercase().replace(' ', "_"),
                    SignalKind::Audio,
                )
            })
            .collect();
        outputs.push(PortDef::new(Self::SEND_OUTPUT, "send", SignalKind::Audio));

        let defs = vec![
            ParamDef::new(Self::X_PARAM, "X Position", -1.0, 1.0, 0.0),
            ParamDef::new(Self::Y_PARAM, "Y Position", -1.0, 1.0, 0.0),
            ParamDef::new(Self::Z_PARAM, "Z Position", -1.0, 1.0, 0.0),
            ParamDef::new(Self::LEVEL_PARAM, "Level", 0.0, 1.0, 0.7),
            ParamDef::new(Self::FILTER_PARAM, "Filter", -1.0, 1.0, 0.0),
            ParamDef::new(Self::SEND_PARAM, "Send", 0.0, 1.0, 0.0),
        ];

        debug!(sample_rate, "pyramid created");
        Self {
            filter: SweepFilter::new(),
            send_pre_level: false,
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec { inputs, outputs },
        }
    }

    pub fn send_pre_level(&self) -> bool {
        self.send_pre_level
    }

    /// Take the send from the raw input instead of after the level knob
    pub fn set_send_pre_level(&mut self, pre: bool) {
        self.send_pre_level = pre;
    }

    /// Knob plus scaled CV, clamped to -1..1 when the CV is patched
    fn position(&self, inputs: &PortValues, param: ParamId, cv: PortId) -> f64 {
        let knob = self.params.get(param);
        if inputs.has(cv) {
            modulated_mono(inputs, cv, knob, Self::CV_SCALE).clamp(-1.0, 1.0)
        } else {
            knob
        }
    }
}

impl Default for Pyramid {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Pyramid {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let x = self.position(inputs, Self::X_PARAM, Self::X_CV_INPUT);
        let y = self.position(inputs, Self::Y_PARAM, Self::Y_CV_INPUT);
        let z = self.position(inputs, Self::Z_PARAM, Self::Z_CV_INPUT);
        let sweep = self.position(inputs, Self::FILTER_PARAM, Self::FILTER_CV_INPUT);
        let send = self.params.get(Self::SEND_PARAM);

        let raw = sanitize(inputs.get_or(Self::AUDIO_INPUT, 0.0));
        let audio = raw * self.params.get(Self::LEVEL_PARAM);
        let send_out = if self.send_pre_level { raw * send } else { audio * send };
        let audio = self.filter.process(audio, sweep, self.sample_rate);
        outputs.set(Self::SEND_OUTPUT, sanitize(send_out));

        let return_l = sanitize(inputs.get_or(Self::RETURN_L_INPUT, 0.0));
        let return_r = sanitize(inputs.get_or(Self::RETURN_R_INPUT, 0.0));
        let gains = cube_gains(x, y, z);
        for (i, gain) in gains.iter().enumerate() {
            let ret = if i % 2 == 0 { return_l } else { return_r };
            outputs.set(Self::SPEAKER_OUTPUT + i as PortId, sanitize((audio + ret) * gain));
        }
    }

    fn reset(&mut self) {
        trace!("pyramid reset");
        self.filter.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, "pyramid sample rate changed");
        self.sample_rate = sample_rate;
        self.filter.reset();
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
        "pyramid"
    }
}
