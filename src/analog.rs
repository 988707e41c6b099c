//! Analog Modeling Primitives
//!
//! Circuit-level models used by the percussion voices: coloured noise
//! sources, the OTA and voltage-to-current stages of a band-pass filter
//! board, the four-cell filter core itself, and an oversampled sine VCO.

use crate::filter::{AntiAliasFilter, RcFilter, SosFilter};
use crate::rng::Rng;
use crate::trigger::sanitize;
use std::f64::consts::{PI, TAU};

/// Noise generators
pub mod noise {
    use crate::rng::Rng;

    /// Voss–McCartney pink noise with `Q` octave rows.
    ///
    /// Each sample refreshes the rows whose bit changed in the frame counter,
    /// so row `i` updates every `2^i` samples. Output lies within `±Q/2`.
    #[derive(Debug, Clone)]
    pub struct PinkNoise<const Q: usize> {
        frame: i64,
        rows: [f64; Q],
        rng: Rng,
    }

    impl<const Q: usize> PinkNoise<Q> {
        pub fn new(rng: Rng) -> Self {
            Self {
                frame: -1,
                rows: [0.0; Q],
                rng,
            }
        }

        #[inline]
        pub fn process(&mut self) -> f64 {
            let last = self.frame;
            self.frame += 1;
            if self.frame >= 1 << Q {
                self.frame = 0;
            }
            let changed = last ^ self.frame;

            let mut sum = 0.0;
            for (i, row) in self.rows.iter_mut().enumerate() {
                if changed & (1 << i) != 0 {
                    *row = self.rng.next_f64() - 0.5;
                }
                sum += *row;
            }
            sum
        }
    }

    /// Pink noise plus blue noise derived from its first difference, both
    /// scaled to roughly ±5 V.
    #[derive(Debug, Clone)]
    pub struct ColoredNoise {
        pink: PinkNoise<8>,
        last_pink: f64,
    }

    impl ColoredNoise {
        const PINK_NORM: f64 = 0.816;
        const BLUE_NORM: f64 = 0.705;

        pub fn new(rng: Rng) -> Self {
            Self {
                pink: PinkNoise::new(rng),
                last_pink: 0.0,
            }
        }

        /// Returns `(pink, blue)`
        #[inline]
        pub fn process(&mut self) -> (f64, f64) {
            let pink = self.pink.process() / Self::PINK_NORM;
            let blue = (pink - self.last_pink) / Self::BLUE_NORM;
            self.last_pink = pink;

            let gain = 5.0 / std::f64::consts::SQRT_2;
            (pink * gain * 0.8, blue * gain * 1.5)
        }
    }
}

/// Transfer functions of the filter board's active stages
pub mod circuit {
    /// Saturation voltage of the V-to-I converter's output transistor
    const COLLECTOR_VSAT: f64 = -10.0;

    /// Thermal voltage at 40 °C
    const VT: f64 = 8.617333262145e-5 * (40.0 + 273.15);

    /// Clamp of the rational tanh approximation, `2√3`
    const Z_LIMIT: f64 = 3.4641016151377544;

    /// Differential-pair OTA: output current for input voltages `vp`, `vn`
    /// and bias current `i_abc`, using a rational approximation of tanh.
    #[inline]
    pub fn ota_vca(vp: f64, vn: f64, i_abc: f64) -> f64 {
        let z = ((vp - vn) / (2.0 * VT)).clamp(-Z_LIMIT, Z_LIMIT);
        let z2 = z * z;
        let q = 12.0 + z2;
        let p = 12.0 * z * q / (36.0 * z2 + q * q);
        i_abc * p
    }

    /// Inverting op-amp voltage-to-current converter with a saturating
    /// output. `rfb` feedback, `vc`/`rc` control input, `vp`/`rp` offset
    /// input. Never sources negative current.
    #[inline]
    pub fn v_to_i(rfb: f64, vc: f64, rc: f64, vp: f64, rp: f64) -> f64 {
        let vnom = -(vc * rfb / rc + vp * rfb / rp);
        let vout = vnom.max(COLLECTOR_VSAT);
        let nrc = rp * rfb;
        let nrp = rc * rfb;
        let nrfb = rc * rp;
        let vneg = (vc * nrc + vp * nrp + vout * nrfb) / (nrc + nrp + nrfb);
        ((vneg - vout) / rfb).max(0.0)
    }
}

/// Octaves spanned by a frequency knob covering 20 Hz – 20 kHz
pub const FREQ_KNOB_OCTAVES: f64 = 9.965784284662087;

const PLUS_6DB: f64 = 6.020599913279624;
const FREQ_AMP_R: f64 = 0.033 * PLUS_6DB * 100e3;
const FREQ_AMP_C: f64 = 560e-12;

const RES_INPUT_R: f64 = 22e3;
const RES_KNOB_V: f64 = 12.0;
const RES_KNOB_R: f64 = 62e3;
const RES_AMP_R: f64 = 47e3;
const RES_AMP_C: f64 = 560e-12;

const CELL_R: f64 = 33e3;
const CELL_RC: f64 = 1.0 / (2.0 * PI * 20000.0);
const CELL_INPUT_GAIN: f64 = CELL_R / 100e3;
const CELL_SELF_MODULATION: f64 = 0.01;

const FEEDBACK_GAIN: f64 = 1e3 / (22e3 + 1e3);
const FEEDFORWARD_R: f64 = 300e3 + 1e3;
const FEEDFORWARD_GAIN: f64 = 1e3 / FEEDFORWARD_R;
const FEEDFORWARD_C: f64 = 220e-9;

const BP2_GAIN: f64 = -100e3 / 39e3;
const OPAMP_SAT_V: f64 = 10.6;

/// Four-cell OTA band-pass filter core, run at 3x oversampling.
///
/// Control voltages and the audio input are upsampled together, smoothed by
/// the board's RC stages and integrated with a midpoint Runge–Kutta step.
/// Cell voltages are clamped to the op-amp rails after every step.
#[derive(Debug, Clone)]
pub struct RipplesBpfEngine {
    sample_time: f64,
    cells: [f64; 4],
    upsample: [SosFilter; 3],
    downsample: SosFilter,
    feedforward: RcFilter,
    freq_cv: RcFilter,
    res_cv: RcFilter,
    rng: Rng,
}

impl RipplesBpfEngine {
    pub fn new(sample_rate: f64, rng: Rng) -> Self {
        let mut engine = Self {
            sample_time: 1.0 / sample_rate,
            cells: [0.0; 4],
            upsample: [SosFilter::anti_alias(); 3],
            downsample: SosFilter::anti_alias(),
            feedforward: RcFilter::new(),
            freq_cv: RcFilter::new(),
            res_cv: RcFilter::new(),
            rng,
        };
        engine.set_sample_rate(sample_rate);
        engine
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_time = 1.0 / sample_rate;
        self.reset();

        let oversampled = sample_rate * AntiAliasFilter::FACTOR as f64;
        let freq_cut = 1.0 / (TAU * FREQ_AMP_R * FREQ_AMP_C);
        let res_cut = 1.0 / (TAU * RES_AMP_R * RES_AMP_C);
        let ff_cut = 1.0 / (TAU * FEEDFORWARD_R * FEEDFORWARD_C);
        self.feedforward.set_cutoff_freq(ff_cut / oversampled);
        self.freq_cv.set_cutoff_freq(freq_cut / oversampled);
        self.res_cv.set_cutoff_freq(res_cut / oversampled);
    }

    pub fn reset(&mut self) {
        self.cells = [0.0; 4];
        for filter in &mut self.upsample {
            filter.reset();
        }
        self.downsample.reset();
        self.feedforward.reset();
        self.freq_cv.reset();
        self.res_cv.reset();
    }

    pub fn cells(&self) -> &[f64; 4] {
        &self.cells
    }

    /// `freq_knob` and `res_knob` are 0..1; `fm_cv` adds octaves.
    pub fn process(&mut self, input: f64, freq_knob: f64, res_knob: f64, fm_cv: f64) -> f64 {
        let v_oct = ((freq_knob - 1.0) * FREQ_KNOB_OCTAVES + fm_cv).min(0.0);
        let i_reso = circuit::v_to_i(RES_AMP_R, 0.0, RES_INPUT_R, res_knob * RES_KNOB_V, RES_KNOB_R);

        let factor = AntiAliasFilter::FACTOR;
        let timestep = self.sample_time / factor as f64;
        let dither = 1e-6 * (self.rng.next_f64() - 0.5);
        let drive = [
            (input + dither) * factor as f64,
            v_oct * factor as f64,
            i_reso * factor as f64,
        ];

        let mut output = 0.0;
        for i in 0..factor {
            let mut lanes = [0.0; 3];
            for ((lane, filter), source) in lanes.iter_mut().zip(&mut self.upsample).zip(drive) {
                *lane = filter.process(if i == 0 { source } else { 0.0 });
            }
            let bp = self.core(lanes, timestep);
            output = self.downsample.process(bp);
        }

        if self.cells.iter().any(|c| !c.is_finite()) {
            self.reset();
            return 0.0;
        }
        sanitize(output)
    }

    fn core(&mut self, lanes: [f64; 3], timestep: f64) -> f64 {
        let [audio, v_oct, i_reso] = lanes;
        self.feedforward.process(audio);
        self.freq_cv.process(v_oct);
        self.res_cv.process(i_reso);

        let v_oct = self.freq_cv.lowpass();
        let i_reso = self.res_cv.lowpass();
        let feedforward = self.feedforward.highpass();
        let rad_per_s = -libm::exp2(v_oct) / CELL_RC;

        let derivative = |vout: [f64; 4]| -> [f64; 4] {
            let vp = feedforward * FEEDFORWARD_GAIN;
            let vn = vout[3] * FEEDBACK_GAIN;
            let res = CELL_R * circuit::ota_vca(vp, vn, i_reso);
            let vin = [audio * CELL_INPUT_GAIN + res, vout[0], vout[1], vout[2]];

            let mut dv = [0.0; 4];
            for n in 0..4 {
                let vsum = vin[n] + vout[n];
                dv[n] = rad_per_s * vsum * (1.0 + vsum * CELL_SELF_MODULATION);
            }
            dv
        };

        let y = self.cells;
        let k1 = derivative(y);
        let mid = std::array::from_fn(|n| y[n] + k1[n] * timestep / 2.0);
        let k2 = derivative(mid);
        for n in 0..4 {
            self.cells[n] = (y[n] + timestep * k2[n]).clamp(-OPAMP_SAT_V, OPAMP_SAT_V);
        }

        (self.cells[0] + self.cells[1]) * BP2_GAIN
    }
}

/// Sine oscillator with exponential FM, rendered at 3x and decimated.
///
/// The modulated frequency is clamped to `[1, 0.45 * sr * 3]` Hz.
#[derive(Debug, Clone)]
pub struct OversampledSineVco {
    phase: f64,
    sample_rate: f64,
    aa: AntiAliasFilter,
}

impl OversampledSineVco {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
            aa: AntiAliasFilter::new(),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.aa.reset();
    }

    /// `fm` is in octaves; output is ±5 V
    pub fn process(&mut self, freq: f64, fm: f64) -> f64 {
        let factor = AntiAliasFilter::FACTOR as f64;
        let rate = self.sample_rate * factor;
        let ceiling = (rate * 0.45).max(1.0);
        let modulated = freq * libm::exp2(fm);
        let modulated = if modulated.is_finite() {
            modulated.clamp(1.0, ceiling)
        } else {
            1.0
        };
        let delta = modulated / rate;

        let mut output = 0.0;
        for _ in 0..AntiAliasFilter::FACTOR {
            self.phase += delta;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            let up = self.aa.process_up((TAU * self.phase).sin());
            output = self.aa.process_down(up);
        }

        if !self.phase.is_finite() || !output.is_finite() {
            self.reset();
            return 0.0;
        }
        output * 5.0
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.aa.reset();
    }
}
