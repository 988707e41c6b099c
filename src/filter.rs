//! IIR Building Blocks
//!
//! Cascaded second-order sections for the oversampling anti-alias filters, a
//! bilinear one-pole RC filter and a direct-form biquad for low/high-pass
//! duty.

use std::f64::consts::PI;

/// One second-order section: `b` numerator, `a` denominator without the
/// leading 1
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SosCoefficients {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl SosCoefficients {
    pub const fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }
}

/// Elliptic low-pass for 3x oversampling at 48 kHz. The same design is used
/// at every host rate.
pub const ANTI_ALIAS_48K_X3: [SosCoefficients; 6] = [
    SosCoefficients::new(
        [1.96007199e-04, 3.15285921e-04, 1.96007199e-04],
        [-1.49750952e+00, 5.79487424e-01],
    ),
    SosCoefficients::new(
        [1.00000000e+00, 1.64502383e-01, 1.00000000e+00],
        [-1.43900370e+00, 6.63196513e-01],
    ),
    SosCoefficients::new(
        [1.00000000e+00, -5.92180251e-01, 1.00000000e+00],
        [-1.36241892e+00, 7.75058824e-01],
    ),
    SosCoefficients::new(
        [1.00000000e+00, -9.07488127e-01, 1.00000000e+00],
        [-1.30223398e+00, 8.69165582e-01],
    ),
    SosCoefficients::new(
        [1.00000000e+00, -1.04177534e+00, 1.00000000e+00],
        [-1.26951947e+00, 9.34679234e-01],
    ),
    SosCoefficients::new(
        [1.00000000e+00, -1.09276235e+00, 1.00000000e+00],
        [-1.26454687e+00, 9.80322986e-01],
    ),
];

/// Maximum number of sections in a [`SosFilter`]
pub const MAX_SECTIONS: usize = 7;

/// Cascade of up to [`MAX_SECTIONS`] direct-form sections sharing their
/// intermediate state rows.
#[derive(Debug, Clone, Copy)]
pub struct SosFilter {
    num_sections: usize,
    sections: [SosCoefficients; MAX_SECTIONS],
    state: [[f64; 3]; MAX_SECTIONS + 1],
}

impl SosFilter {
    /// Build from up to [`MAX_SECTIONS`] sections; extras are ignored.
    pub fn new(sections: &[SosCoefficients]) -> Self {
        let num_sections = sections.len().min(MAX_SECTIONS);
        let mut stored = [SosCoefficients::default(); MAX_SECTIONS];
        stored[..num_sections].copy_from_slice(&sections[..num_sections]);
        Self {
            num_sections,
            sections: stored,
            state: [[0.0; 3]; MAX_SECTIONS + 1],
        }
    }

    pub fn anti_alias() -> Self {
        Self::new(&ANTI_ALIAS_48K_X3)
    }

    pub fn num_sections(&self) -> usize {
        self.num_sections
    }

    #[inline]
    pub fn process(&mut self, mut input: f64) -> f64 {
        for n in 0..self.num_sections {
            let section = self.sections[n];
            let row = &mut self.state[n];
            row[2] = row[1];
            row[1] = row[0];
            row[0] = input;

            let mut out = section.b[0] * row[0] + section.b[1] * row[1] + section.b[2] * row[2];
            let next = &self.state[n + 1];
            out -= section.a[0] * next[0] + section.a[1] * next[1];
            input = out;
        }
        let last = &mut self.state[self.num_sections];
        last[2] = last[1];
        last[1] = last[0];
        last[0] = input;
        input
    }

    pub fn reset(&mut self) {
        self.state = [[0.0; 3]; MAX_SECTIONS + 1];
    }
}

/// Matched up/down filter pair for 3x oversampling
#[derive(Debug, Clone, Copy)]
pub struct AntiAliasFilter {
    up: SosFilter,
    down: SosFilter,
}

impl AntiAliasFilter {
    pub const FACTOR: usize = 3;

    pub fn new() -> Self {
        Self {
            up: SosFilter::anti_alias(),
            down: SosFilter::anti_alias(),
        }
    }

    #[inline]
    pub fn process_up(&mut self, input: f64) -> f64 {
        self.up.process(input)
    }

    #[inline]
    pub fn process_down(&mut self, input: f64) -> f64 {
        self.down.process(input)
    }

    pub fn reset(&mut self) {
        self.up.reset();
        self.down.reset();
    }
}

impl Default for AntiAliasFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bilinear one-pole RC section with low-pass and high-pass taps
#[derive(Debug, Clone, Copy, Default)]
pub struct RcFilter {
    c: f64,
    x: f64,
    y: f64,
}

impl RcFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cutoff as a fraction of the sample rate
    pub fn set_cutoff_freq(&mut self, normalized: f64) {
        self.c = 2.0 / (2.0 * PI * normalized);
    }

    #[inline]
    pub fn process(&mut self, x: f64) {
        let y = (x + self.x - self.y * (1.0 - self.c)) / (1.0 + self.c);
        self.x = x;
        self.y = y;
    }

    #[inline]
    pub fn lowpass(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn highpass(&self) -> f64 {
        self.x - self.y
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
    }
}

/// Direct form I biquad with bilinear low/high-pass designs
#[derive(Debug, Clone, Copy, Default)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    x: [f64; 2],
    y: [f64; 2],
}

impl Biquad {
    /// A pass-through filter
    pub fn new() -> Self {
        Self {
            b: [1.0, 0.0, 0.0],
            ..Self::default()
        }
    }

    /// `freq` is normalized to the sample rate and clamped below Nyquist
    pub fn set_lowpass(&mut self, freq: f64, q: f64) {
        let k = Self::prewarp(freq);
        let norm = 1.0 / (1.0 + k / q + k * k);
        let b0 = k * k * norm;
        self.b = [b0, 2.0 * b0, b0];
        self.a = [2.0 * (k * k - 1.0) * norm, (1.0 - k / q + k * k) * norm];
    }

    pub fn set_highpass(&mut self, freq: f64, q: f64) {
        let k = Self::prewarp(freq);
        let norm = 1.0 / (1.0 + k / q + k * k);
        self.b = [norm, -2.0 * norm, norm];
        self.a = [2.0 * (k * k - 1.0) * norm, (1.0 - k / q + k * k) * norm];
    }

    #[inline]
    fn prewarp(freq: f64) -> f64 {
        libm::tan(PI * freq.clamp(1e-6, 0.499))
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let out = self.b[0] * input + self.b[1] * self.x[0] + self.b[2] * self.x[1]
            - self.a[0] * self.y[0]
            - self.a[1] * self.y[1];
        self.x[1] = self.x[0];
        self.x[0] = input;
        self.y[1] = self.y[0];
        self.y[0] = out;
        out
    }

    pub fn reset(&mut self) {
        self.x = [0.0; 2];
        self.y = [0.0; 2];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    LowPass,
    #[default]
    Off,
    HighPass,
}

/// Single-knob filter: negative settings sweep a low-pass from 20 Hz up to
/// 22 kHz, positive ones a high-pass from 10 Hz up to 8 kHz. Both are two
/// cascaded Butterworth biquads; the cascade is cleared whenever the mode
/// flips.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepFilter {
    stages: [Biquad; 2],
    mode: SweepMode,
}

impl SweepFilter {
    pub const DEAD_BAND: f64 = 0.001;
    const Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

    pub fn new() -> Self {
        Self {
            stages: [Biquad::new(); 2],
            mode: SweepMode::Off,
        }
    }

    pub fn mode(&self) -> SweepMode {
        self.mode
    }

    /// `amount` in -1..1
    #[inline]
    pub fn process(&mut self, input: f64, amount: f64, sample_rate: f64) -> f64 {
        let mode = if amount < -Self::DEAD_BAND {
            SweepMode::LowPass
        } else if amount > Self::DEAD_BAND {
            SweepMode::HighPass
        } else {
            SweepMode::Off
        };

        if mode != self.mode && mode != SweepMode::Off {
            self.stages.iter_mut().for_each(Biquad::reset);
        }
        self.mode = mode;

        match mode {
            SweepMode::Off => return input,
            SweepMode::LowPass => {
                let freq = 20.0 + (amount + 1.0) * (22000.0 - 20.0);
                for stage in &mut self.stages {
                    stage.set_lowpass(freq / sample_rate, Self::Q);
                }
            }
            SweepMode::HighPass => {
                let freq = 10.0 + amount * (8000.0 - 10.0);
                for stage in &mut self.stages {
                    stage.set_highpass(freq / sample_rate, Self::Q);
                }
            }
        }
        self.stages
            .iter_mut()
            .fold(input, |signal, stage| stage.process(signal))
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn steady_gain(filter: &mut Biquad, freq: f64) -> f64 {
        let mut peak: f64 = 0.0;
        for i in 0..20000 {
            let out = filter.process((2.0 * PI * freq * i as f64).sin());
            if i > 10000 {
                peak = peak.max(out.abs());
            }
        }
        peak
    }

    #[test]
    fn test_anti_alias_dc_gain() {
        let mut filter = SosFilter::anti_alias();
        assert_eq!(filter.num_sections(), 6);
        let mut out = 0.0;
        for _ in 0..20000 {
            out = filter.process(1.0);
        }
        assert_abs_diff_eq!(out, 1.0, epsilon = 0.05);
    }

    #[test]
    fn test_anti_alias_rejects_image_band() {
        let mut filter = SosFilter::anti_alias();
        let mut peak: f64 = 0.0;
        // a tone at 40 kHz in the 144 kHz oversampled domain
        let freq = 40000.0 / 144000.0;
        for i in 0..20000 {
            let out = filter.process((2.0 * PI * freq * i as f64).sin());
            if i > 10000 {
                peak = peak.max(out.abs());
            }
        }
        assert!(peak < 0.05, "stopband leak {}", peak);
    }

    #[test]
    fn test_sos_section_limit_and_reset() {
        let sections = [SosCoefficients::new([1.0, 0.0, 0.0], [0.0, 0.0]); 9];
        let mut filter = SosFilter::new(&sections);
        assert_eq!(filter.num_sections(), MAX_SECTIONS);
        assert_eq!(filter.process(0.5), 0.5);
        filter.reset();
        assert_eq!(filter.process(0.0), 0.0);
    }

    #[test]
    fn test_rc_filter_taps() {
        let mut rc = RcFilter::new();
        rc.set_cutoff_freq(100.0 / 48000.0);
        for _ in 0..48000 {
            rc.process(1.0);
        }
        assert_abs_diff_eq!(rc.lowpass(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rc.highpass(), 0.0, epsilon = 1e-6);
        rc.reset();
        assert_eq!(rc.lowpass(), 0.0);
    }

    #[test]
    fn test_biquad_lowpass() {
        let mut lp = Biquad::new();
        lp.set_lowpass(1000.0 / 48000.0, std::f64::consts::FRAC_1_SQRT_2);
        assert!(steady_gain(&mut lp, 100.0 / 48000.0) > 0.95);
        lp.reset();
        assert!(steady_gain(&mut lp, 10000.0 / 48000.0) < 0.05);
    }

    #[test]
    fn test_biquad_highpass() {
        let mut hp = Biquad::new();
        hp.set_highpass(1000.0 / 48000.0, std::f64::consts::FRAC_1_SQRT_2);
        assert!(steady_gain(&mut hp, 100.0 / 48000.0) < 0.05);
        hp.reset();
        assert!(steady_gain(&mut hp, 10000.0 / 48000.0) > 0.95);
    }

    #[test]
    fn test_sweep_filter_dead_band_passes() {
        let mut sweep = SweepFilter::new();
        assert_eq!(sweep.process(0.3, 0.0005, 48000.0), 0.3);
        assert_eq!(sweep.mode(), SweepMode::Off);
    }

    #[test]
    fn test_sweep_filter_modes() {
        let mut sweep = SweepFilter::new();
        let mut peak: f64 = 0.0;
        for i in 0..20000 {
            let x = (2.0 * PI * 5000.0 / 48000.0 * i as f64).sin();
            let out = sweep.process(x, -0.99, 48000.0);
            if i > 10000 {
                peak = peak.max(out.abs());
            }
        }
        assert_eq!(sweep.mode(), SweepMode::LowPass);
        assert!(peak < 0.05, "low-pass leak {}", peak);

        let mut out = 0.0;
        for _ in 0..20000 {
            out = sweep.process(1.0, 0.5, 48000.0);
        }
        assert_eq!(sweep.mode(), SweepMode::HighPass);
        assert_abs_diff_eq!(out, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_biquad_passthrough_by_default() {
        let mut bq = Biquad::new();
        assert_eq!(bq.process(0.7), 0.7);
    }
}
