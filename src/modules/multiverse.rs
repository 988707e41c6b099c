//! Multiverse: four-channel display capture

use super::modulated_mono;
use crate::error::ModuleError;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamDisplay, ParamId, PortDef, PortId, PortSpec, PortValues,
    SignalKind,
};
use crate::scope::{samples_per_pixel, ChannelParams, DisplaySink, MixMode, ScopeChannel};
use crate::trigger::SchmittTrigger;
use tracing::{debug, trace};

pub const CHANNEL_COUNT: usize = 4;

/// Multiverse
///
/// Decimates up to four audio inputs into display buffers and hands them to
/// an attached [`DisplaySink`] at a fixed frame rate. It has no outputs; with
/// no sink attached it only keeps its buffers current.
pub struct Multiverse {
    channels: [ScopeChannel; CHANNEL_COUNT],
    sink: Option<Box<dyn DisplaySink>>,
    trigger_enabled: bool,
    trigger_button: SchmittTrigger,
    external_trigger: SchmittTrigger,
    publish_counter: usize,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl Multiverse {
    /// Audio input of channel `c` is `AUDIO_INPUT + c`
    pub const AUDIO_INPUT: PortId = 0;
    /// Channel `c` CVs start at `CV_INPUT + 4c`: phase, ratio, angle, intensity
    pub const CV_INPUT: PortId = 4;
    pub const TRIGGER_INPUT: PortId = 20;
    pub const MIX_CV_INPUT: PortId = 21;

    /// Channel `c` knobs start at `4c`: phase, ratio, angle, intensity
    pub const PHASE_PARAM: ParamId = 0;
    pub const RATIO_PARAM: ParamId = 1;
    pub const ANGLE_PARAM: ParamId = 2;
    pub const INTENSITY_PARAM: ParamId = 3;
    pub const TRIGGER_PARAM: ParamId = 16;
    pub const MIX_PARAM: ParamId = 17;

    /// Samples between frames handed to the sink, 60 fps at 48 kHz
    pub const PUBLISH_INTERVAL: usize = 800;

    pub fn new(sample_rate: f64) -> Self {
        let mut inputs: Vec<PortDef> = (0..CHANNEL_COUNT)
            .map(|c| {
                PortDef::new(
                    Self::AUDIO_INPUT + c as PortId,
                    format!("audio_{}", c + 1),
                    SignalKind::Audio,
                )
            })
            .collect();
        let mut defs = Vec::with_capacity(CHANNEL_COUNT * 4 + 2);
        for c in 0..CHANNEL_COUNT {
            let n = c + 1;
            for (offset, name) in ["phase", "ratio", "angle", "intensity"].iter().enumerate() {
                inputs.push(PortDef::new(
                    Self::cv_input(c, offset as PortId),
                    format!("{}_cv_{}", name, n),
                    SignalKind::CvBipolar,
                ));
            }
            defs.extend([
                ParamDef::new(Self::param(c, Self::PHASE_PARAM), format!("Phase {}", n), 0.0, 360.0, 0.0)
                    .with_unit("°"),
                ParamDef::new(Self::param(c, Self::RATIO_PARAM), format!("Ratio {}", n), 0.0, 1.0, 0.5),
                ParamDef::new(Self::param(c, Self::ANGLE_PARAM), format!("Angle {}", n), 0.0, 1.0, 0.5),
                ParamDef::new(
                    Self::param(c, Self::INTENSITY_PARAM),
                    format!("Intensity {}", n),
                    0.0,
                    1.0,
                    0.5,
                ),
            ]);
        }
        inputs.push(PortDef::new(Self::TRIGGER_INPUT, "trigger", SignalKind::Trigger));
        inputs.push(PortDef::new(Self::MIX_CV_INPUT, "mix_cv", SignalKind::CvBipolar));
        defs.push(ParamDef::new(Self::TRIGGER_PARAM, "Trigger", 0.0, 1.0, 0.0));
        defs.push(
            ParamDef::new(Self::MIX_PARAM, "Mix Mode", 0.0, 3.0, 0.0)
                .with_display(ParamDisplay::Labels(MixMode::LABELS)),
        );

        debug!(sample_rate, "multiverse created");
        Self {
            channels: std::array::from_fn(|_| ScopeChannel::new()),
            sink: None,
            trigger_enabled: false,
            trigger_button: SchmittTrigger::new(),
            external_trigger: SchmittTrigger::new(),
            publish_counter: 0,
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec {
                inputs,
                outputs: Vec::new(),
            },
        }
    }

    /// Knob `kind` of channel `c`
    pub fn param(channel: usize, kind: ParamId) -> ParamId {
        channel as ParamId * 4 + kind
    }

    /// CV input `kind` (0 phase .. 3 intensity) of channel `c`
    pub fn cv_input(channel: usize, kind: PortId) -> PortId {
        Self::CV_INPUT + channel as PortId * 4 + kind
    }

    /// Attach or detach the renderer
    pub fn set_sink(&mut self, sink: Option<Box<dyn DisplaySink>>) {
        debug!(attached = sink.is_some(), "multiverse display sink changed");
        self.sink = sink;
        self.publish_counter = 0;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn trigger_enabled(&self) -> bool {
        self.trigger_enabled
    }

    pub fn channel(&self, channel: usize) -> Option<&ScopeChannel> {
        self.channels.get(channel)
    }

    /// Display time ratio, -2..2 decades around 10 ms per screen
    fn ratio(&self, inputs: &PortValues, c: usize) -> f64 {
        let ratio = (self.params.get(Self::param(c, Self::RATIO_PARAM)) - 0.5) * 4.0;
        let cv = Self::cv_input(c, 1);
        if inputs.has(cv) {
            modulated_mono(inputs, cv, ratio, 0.4).clamp(-2.0, 2.0)
        } else {
            ratio
        }
    }

    /// Renderer parameters of channel `c`, normalized to turns
    pub fn channel_params(&self, inputs: &PortValues, c: usize) -> ChannelParams {
        let phase_cv = Self::cv_input(c, 0);
        let angle_cv = Self::cv_input(c, 2);
        let intensity_cv = Self::cv_input(c, 3);

        let mut phase = self.params.get(Self::param(c, Self::PHASE_PARAM));
        if inputs.has(phase_cv) {
            phase = modulated_mono(inputs, phase_cv, phase, 36.0) % 360.0;
        }
        let mut angle = (self.params.get(Self::param(c, Self::ANGLE_PARAM)) - 0.5) * 360.0;
        if inputs.has(angle_cv) {
            angle = modulated_mono(inputs, angle_cv, angle, 18.0).clamp(-180.0, 180.0);
        }
        let mut intensity = self.params.get(Self::param(c, Self::INTENSITY_PARAM)) * 2.0;
        if inputs.has(intensity_cv) {
            intensity = modulated_mono(inputs, intensity_cv, intensity, 0.2).clamp(0.0, 2.0);
        }

        ChannelParams {
            phase: phase / 360.0,
            angle: angle / 360.0,
            intensity,
            frequency: self.channels[c].dominant_frequency(),
        }
    }

    /// Continuous 0..3 layering control, see [`MixMode::from_value`]
    pub fn mix_mode(&self, inputs: &PortValues) -> f64 {
        let mix = self.params.get(Self::MIX_PARAM);
        if inputs.has(Self::MIX_CV_INPUT) {
            modulated_mono(inputs, Self::MIX_CV_INPUT, mix, 0.4).clamp(0.0, 3.0)
        } else {
            mix
        }
    }

    fn publish(&mut self, inputs: &PortValues) {
        let params: [ChannelParams; CHANNEL_COUNT] =
            std::array::from_fn(|c| self.channel_params(inputs, c));
        let mix = self.mix_mode(inputs);
        if let Some(sink) = self.sink.as_mut() {
            for (c, channel) in self.channels.iter().enumerate() {
                sink.update_channel(c, channel.buffer(), params[c]);
            }
            sink.update_global(mix);
        }
    }
}

impl Default for Multiverse {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Multiverse {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, _outputs: &mut PortValues) {
        if self.trigger_button.process(self.params.get(Self::TRIGGER_PARAM)) {
            self.trigger_enabled = !self.trigger_enabled;
        }

        let external = inputs.has(Self::TRIGGER_INPUT);
        let external_edge = self.trigger_enabled
            && external
            && self
                .external_trigger
                .process(inputs.get_or(Self::TRIGGER_INPUT, 0.0));

        for c in 0..CHANNEL_COUNT {
            let Some(voltage) = inputs.get(Self::AUDIO_INPUT + c as PortId) else {
                continue;
            };
            let spp = samples_per_pixel(self.ratio(inputs, c), self.sample_rate);
            let channel = &mut self.channels[c];

            if self.trigger_enabled {
                let synced = if external {
                    external_edge
                } else {
                    channel.self_trigger(voltage)
                };
                if synced {
                    channel.restart();
                }
            }

            channel.track_frequency(voltage, self.sample_rate);
            channel.capture(voltage, spp);
        }

        if self.sink.is_some() {
            self.publish_counter += 1;
            if self.publish_counter >= Self::PUBLISH_INTERVAL {
                self.publish_counter = 0;
                self.publish(inputs);
            }
        }
    }

    fn reset(&mut self) {
        trace!("multiverse reset");
        self.channels.iter_mut().for_each(ScopeChannel::reset);
        self.publish_counter = 0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, "multiverse sample rate changed");
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
        "multiverse"
    }
}
