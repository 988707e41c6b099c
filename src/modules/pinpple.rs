//! Pinged band-pass voice built on the four-cell OTA filter model

use super::modulated_mono;
use crate::analog::noise::ColoredNoise;
use crate::analog::RipplesBpfEngine;
use crate::envelope::SimpleLpg;
use crate::error::ModuleError;
use crate::port::{
    GraphModule, ParamBank, ParamDef, ParamDisplay, ParamId, PortDef, PortId, PortSpec,
    PortValues, SignalKind,
};
use crate::rng::Rng;
use crate::trigger::{sanitize, PulseGenerator, SchmittTrigger};
use tracing::{debug, trace};

/// Standard deviation of the per-hit frequency and decay jitter
const DETUNE_SIGMA: f64 = 0.00006;

/// Pinpple
///
/// Every trigger pings the filter with a one-sample 10 V impulse and a
/// small Gaussian detune, and opens a low-pass gate on the FM path. The FM
/// source is the FM input crossfaded with pink noise below the middle of the
/// noise knob and with blue noise above it.
pub struct Pinpple {
    engine: RipplesBpfEngine,
    lpg: SimpleLpg,
    noise: ColoredNoise,
    trigger: SchmittTrigger,
    ping: PulseGenerator,
    mute_button: SchmittTrigger,
    muted: bool,
    freq_offset: f64,
    decay_offset: f64,
    rng: Rng,
    params: ParamBank,
    sample_rate: f64,
    spec: PortSpec,
}

impl Pinpple {
    pub const FM_INPUT: PortId = 0;
    pub const FREQ_CV_INPUT: PortId = 1;
    pub const RESONANCE_CV_INPUT: PortId = 2;
    pub const TRIG_INPUT: PortId = 3;
    pub const FM_AMOUNT_CV_INPUT: PortId = 4;

    pub const OUTPUT: PortId = 10;

    pub const FREQ_PARAM: ParamId = 0;
    pub const RESONANCE_PARAM: ParamId = 1;
    pub const FM_AMOUNT_PARAM: ParamId = 2;
    pub const FREQ_CV_ATTEN_PARAM: ParamId = 3;
    pub const RESONANCE_CV_ATTEN_PARAM: ParamId = 4;
    pub const FM_AMOUNT_CV_ATTEN_PARAM: ParamId = 5;
    pub const MUTE_PARAM: ParamId = 6;
    pub const VOLUME_PARAM: ParamId = 7;
    pub const NOISE_MIX_PARAM: ParamId = 8;

    const FREQ_MIN: f64 = 20.0;
    const FREQ_MAX: f64 = 20000.0;

    pub fn new(sample_rate: f64) -> Self {
        Self::with_rng(sample_rate, Rng::default())
    }

    /// Construct with a specific random source; the filter dither and the
    /// noise generator are seeded from it
    pub fn with_rng(sample_rate: f64, mut rng: Rng) -> Self {
        let inputs = vec![
            PortDef::new(Self::FM_INPUT, "fm", SignalKind::Audio),
            PortDef::new(Self::FREQ_CV_INPUT, "freq_cv", SignalKind::VoltPerOctave)
                .with_attenuator(Self::FREQ_CV_ATTEN_PARAM),
            PortDef::new(Self::RESONANCE_CV_INPUT, "decay_cv", SignalKind::CvBipolar)
                .with_attenuator(Self::RESONANCE_CV_ATTEN_PARAM),
            PortDef::new(Self::TRIG_INPUT, "trigger", SignalKind::Trigger),
            PortDef::new(Self::FM_AMOUNT_CV_INPUT, "fm_amount_cv", SignalKind::CvBipolar)
                .with_attenuator(Self::FM_AMOUNT_CV_ATTEN_PARAM),
        ];
        let outputs = vec![PortDef::new(Self::OUTPUT, "out", SignalKind::Audio)];

        let (lo, hi) = (libm::log2(Self::FREQ_MIN), libm::log2(Self::FREQ_MAX));
        let defs = vec![
            ParamDef::new(Self::FREQ_PARAM, "Frequency", lo, hi, hi)
                .with_unit(" Hz")
                .with_display(ParamDisplay::Exp2),
            ParamDef::new(Self::RESONANCE_PARAM, "Decay", 0.0, 1.0, 0.5),
            ParamDef::new(Self::FM_AMOUNT_PARAM, "FM Amount", 0.0, 1.0, 0.0),
            ParamDef::new(Self::FREQ_CV_ATTEN_PARAM, "Freq CV", -1.0, 1.0, 0.0),
            ParamDef::new(Self::RESONANCE_CV_ATTEN_PARAM, "Decay CV", -1.0, 1.0, 0.0),
            ParamDef::new(Self::FM_AMOUNT_CV_ATTEN_PARAM, "FM Amount CV", -1.0, 1.0, 0.0),
            ParamDef::new(Self::MUTE_PARAM, "Mute", 0.0, 1.0, 0.0),
            ParamDef::new(Self::VOLUME_PARAM, "Volume", 0.0, 1.0, 0.7),
            ParamDef::new(Self::NOISE_MIX_PARAM, "Noise Mix", 0.0, 1.0, 0.5),
        ];

        let engine = RipplesBpfEngine::new(sample_rate, Rng::from_seed(rng.next_u64()));
        let noise = ColoredNoise::new(Rng::from_seed(rng.next_u64()));

        debug!(sample_rate, "pinpple created");
        Self {
            engine,
            lpg: SimpleLpg::new(sample_rate),
            noise,
            trigger: SchmittTrigger::new(),
            ping: PulseGenerator::new(),
            mute_button: SchmittTrigger::new(),
            muted: false,
            freq_offset: 0.0,
            decay_offset: 0.0,
            rng,
            params: ParamBank::new(defs),
            sample_rate,
            spec: PortSpec { inputs, outputs },
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Frequency knob rescaled onto 0..1
    fn freq_knob(&self) -> f64 {
        let (lo, hi) = (libm::log2(Self::FREQ_MIN), libm::log2(Self::FREQ_MAX));
        (self.params.get(Self::FREQ_PARAM) - lo) / (hi - lo)
    }

    /// Attenuated CV offset, 0 when unpatched
    fn attenuated(&self, inputs: &PortValues, cv: PortId, atten: ParamId, scale: f64) -> f64 {
        modulated_mono(inputs, cv, 0.0, self.params.get(atten) * scale)
    }
}

impl Default for Pinpple {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Pinpple {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = 1.0 / self.sample_rate;

        if self.mute_button.process(self.params.get(Self::MUTE_PARAM)) {
            self.muted = !self.muted;
        }

        let hit = self.trigger.process(inputs.get_or(Self::TRIG_INPUT, 0.0));
        if hit {
            self.ping.trigger(0.002);
            self.freq_offset = self.rng.next_normal() * DETUNE_SIGMA;
            self.decay_offset = self.rng.next_normal() * DETUNE_SIGMA;
        }
        let gate = if self.ping.process(dt) { 10.0 } else { 0.0 };

        let freq = (self.freq_knob()
            + self.attenuated(inputs, Self::FREQ_CV_INPUT, Self::FREQ_CV_ATTEN_PARAM, 0.1)
            + self.freq_offset)
            .clamp(0.0, 1.0);
        let resonance = (self.params.get(Self::RESONANCE_PARAM)
            + self.attenuated(inputs, Self::RESONANCE_CV_INPUT, Self::RESONANCE_CV_ATTEN_PARAM, 0.1)
            + self.decay_offset)
            .clamp(0.0, 1.0);
        let fm_amount = (self.params.get(Self::FM_AMOUNT_PARAM)
            + self.attenuated(inputs, Self::FM_AMOUNT_CV_INPUT, Self::FM_AMOUNT_CV_ATTEN_PARAM, 0.1))
            .clamp(0.0, 1.0);

        let (pink, blue) = self.noise.process();
        let fm_input = sanitize(inputs.get_or(Self::FM_INPUT, 0.0));
        let noise_mix = self.params.get(Self::NOISE_MIX_PARAM);
        let fm_source = if noise_mix <= 0.5 {
            let mix = noise_mix * 2.0;
            pink * (1.0 - mix) + fm_input * mix
        } else {
            let mix = (noise_mix - 0.5) * 2.0;
            fm_input * (1.0 - mix) + blue * mix
        };
        let fm = self.lpg.process(gate, resonance, fm_source, fm_amount, dt);

        let ping = if hit { 10.0 } else { 0.0 };
        let filtered = self.engine.process(ping, freq, resonance, fm);

        let out = if self.muted {
            0.0
        } else {
            filtered * self.params.get(Self::VOLUME_PARAM)
        };
        outputs.set(Self::OUTPUT, sanitize(out));
    }

    fn reset(&mut self) {
        trace!("pinpple reset");
        self.engine.reset();
        self.lpg.reset();
        self.trigger.reset();
        self.ping.reset();
        self.freq_offset = 0.0;
        self.decay_offset = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        debug!(sample_rate, "pinpple sample rate changed");
        self.sample_rate = sample_rate;
        self.engine.set_sample_rate(sample_rate);
        self.lpg.set_sample_rate(sample_rate);
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
        "pinpple"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f64 = 48000.0;

    fn module(seed: u64) -> Pinpple {
        let mut module = Pinpple::with_rng(SR, Rng::from_seed(seed));
        module.set_param(Pinpple::FREQ_PARAM, libm::log2(1000.0)).unwrap();
        module
    }

    /// Ping once after a short lead-in and return every output sample
    fn ping(module: &mut Pinpple, samples: usize) -> Vec<f64> {
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        (0..samples)
            .map(|i| {
                inputs.set(Pinpple::TRIG_INPUT, if (10..20).contains(&i) { 10.0 } else { 0.0 });
                module.tick(&inputs, &mut outputs);
                outputs.get_or(Pinpple::OUTPUT, f64::NAN)
            })
            .collect()
    }

    fn peak(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_defaults() {
        let module = Pinpple::new(SR);
        assert_eq!(module.params().len(), 9);
        assert_eq!(module.port_spec().inputs.len(), 5);
        assert_relative_eq!(module.freq_knob(), 1.0);
        assert!(!module.is_muted());
    }

    #[test]
    fn test_ping_rings_above_idle() {
        let mut idle = module(1);
        let inputs = PortValues::new();
        let mut outputs = PortValues::new();
        let mut quiet: f64 = 0.0;
        for _ in 0..4800 {
            idle.tick(&inputs, &mut outputs);
            quiet = quiet.max(outputs.get_or(Pinpple::OUTPUT, 0.0).abs());
        }

        let mut pinged = module(1);
        let out = ping(&mut pinged, 4800);
        assert!(out.iter().all(|s| s.is_finite()));
        assert!(peak(&out) > 1e-3, "peak {}", peak(&out));
        // only the filter's input dither moves an unpinged voice
        assert!(quiet * 100.0 < peak(&out), "idle {} vs {}", quiet, peak(&out));
    }

    #[test]
    fn test_non_finite_inputs_do_not_silence_voice() {
        let mut module = module(4);
        for id in [
            Pinpple::FM_INPUT,
            Pinpple::FREQ_CV_INPUT,
            Pinpple::RESONANCE_CV_INPUT,
            Pinpple::FM_AMOUNT_CV_INPUT,
        ] {
            module.set_param(Pinpple::FREQ_CV_ATTEN_PARAM, 1.0).unwrap();
            let mut inputs = PortValues::new();
            let mut outputs = PortValues::new();
            for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
                inputs.set(id, bad);
                inputs.set(Pinpple::TRIG_INPUT, 10.0);
                module.tick(&inputs, &mut outputs);
                assert!(outputs.get_or(Pinpple::OUTPUT, f64::NAN).is_finite());
                inputs.set(Pinpple::TRIG_INPUT, 0.0);
                module.tick(&inputs, &mut outputs);
            }
        }

        let out = ping(&mut module, 4800);
        assert!(out.iter().all(|s| s.is_finite()));
        assert!(peak(&out) > 1e-3, "peak {}", peak(&out));
    }

    #[test]
    fn test_volume_scales_output() {
        let mut loud = module(3);
        let mut soft = module(3);
        soft.set_param(Pinpple::VOLUME_PARAM, 0.35).unwrap();
        let a = ping(&mut loud, 2000);
        let b = ping(&mut soft, 2000);
        for (x, y) in a.iter().zip(&b) {
            assert_relative_eq!(*x, y * 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mute_button_toggles() {
        let mut module = module(1);
        let inputs = PortValues::new();
        let mut outputs = PortValues::new();
        module.tick(&inputs, &mut outputs);
        module.set_param(Pinpple::MUTE_PARAM, 1.0).unwrap();
        module.tick(&inputs, &mut outputs);
        assert!(module.is_muted());

        let out = ping(&mut module, 2000);
        assert!(out.iter().all(|s| *s == 0.0));

        module.set_param(Pinpple::MUTE_PARAM, 0.0).unwrap();
        module.tick(&inputs, &mut outputs);
        module.set_param(Pinpple::MUTE_PARAM, 1.0).unwrap();
        module.tick(&inputs, &mut outputs);
        assert!(!module.is_muted());
    }

    #[test]
    fn test_attenuated_cv_ignored_when_unpatched() {
        let mut module = module(1);
        module.set_param(Pinpple::FREQ_CV_ATTEN_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        assert_eq!(
            module.attenuated(&inputs, Pinpple::FREQ_CV_INPUT, Pinpple::FREQ_CV_ATTEN_PARAM, 0.1),
            0.0
        );
        inputs.set(Pinpple::FREQ_CV_INPUT, -5.0);
        assert_relative_eq!(
            module.attenuated(&inputs, Pinpple::FREQ_CV_INPUT, Pinpple::FREQ_CV_ATTEN_PARAM, 0.1),
            -0.5
        );
    }
}
