//! Edge detection, pulse generation and slew primitives shared by every module.

/// Rising-edge detector with hysteresis
///
/// Fires once when the input climbs to `high` and re-arms only after it has
/// dropped to `low`. It starts in the high state, so a signal that is already
/// high at power-on does not fire.
#[derive(Debug, Clone, Copy)]
pub struct SchmittTrigger {
    high_state: bool,
    low: f64,
    high: f64,
}

impl SchmittTrigger {
    pub fn new() -> Self {
        Self::with_thresholds(0.0, 1.0)
    }

    pub fn with_thresholds(low: f64, high: f64) -> Self {
        Self {
            high_state: true,
            low,
            high,
        }
    }

    /// Returns true on the low-to-high transition
    #[inline]
    pub fn process(&mut self, input: f64) -> bool {
        if self.high_state {
            if input <= self.low {
                self.high_state = false;
            }
            false
        } else if input >= self.high {
            self.high_state = true;
            true
        } else {
            false
        }
    }

    pub fn is_high(&self) -> bool {
        self.high_state
    }

    pub fn reset(&mut self) {
        self.high_state = true;
    }
}

impl Default for SchmittTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain threshold crossing detector without hysteresis
#[derive(Debug, Clone, Copy)]
pub struct RisingEdge {
    last: f64,
    threshold: f64,
}

impl RisingEdge {
    pub fn new(threshold: f64) -> Self {
        Self {
            last: 0.0,
            threshold,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> bool {
        let fired = input >= self.threshold && self.last < self.threshold;
        self.last = input;
        fired
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }
}

/// Fixed-duration pulse source
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseGenerator {
    remaining: f64,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pulse, keeping the longer of the pending and requested durations
    #[inline]
    pub fn trigger(&mut self, duration: f64) {
        if duration > self.remaining {
            self.remaining = duration;
        }
    }

    /// Advance by `dt` seconds; true while the pulse is high
    #[inline]
    pub fn process(&mut self, dt: f64) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}

/// Linear-in-error slew with independent rise and fall times
///
/// A time of zero passes the input straight through.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlewLimiter {
    rise_rate: Option<f64>,
    fall_rate: Option<f64>,
    out: f64,
}

impl SlewLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rise_time(&mut self, seconds: f64) {
        self.rise_rate = (seconds > 0.0).then(|| 1.0 / seconds);
    }

    pub fn set_fall_time(&mut self, seconds: f64) {
        self.fall_rate = (seconds > 0.0).then(|| 1.0 / seconds);
    }

    pub fn process(&mut self, dt: f64, input: f64) -> f64 {
        if input > self.out {
            self.out = match self.rise_rate {
                Some(rate) => (self.out + (input - self.out) * rate * dt).min(input),
                None => input,
            };
        } else if input < self.out {
            self.out = match self.fall_rate {
                Some(rate) => (self.out - (self.out - input) * rate * dt).max(input),
                None => input,
            };
        }
        self.out
    }

    pub fn value(&self) -> f64 {
        self.out
    }

    pub fn reset(&mut self) {
        self.out = 0.0;
    }
}

/// Replace NaN and infinities with 0
#[inline]
pub fn sanitize(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schmitt_fires_once_per_edge() {
        let mut trig = SchmittTrigger::new();
        assert!(!trig.process(0.0));
        assert!(trig.process(5.0));
        assert!(!trig.process(5.0));
        // hysteresis: dipping to 0.5 does not re-arm
        assert!(!trig.process(0.5));
        assert!(!trig.process(5.0));
        assert!(!trig.process(0.0));
        assert!(trig.process(1.0));
    }

    #[test]
    fn test_schmitt_high_at_start_does_not_fire() {
        let mut trig = SchmittTrigger::new();
        assert!(!trig.process(10.0));
    }

    #[test]
    fn test_schmitt_custom_thresholds() {
        let mut trig = SchmittTrigger::with_thresholds(0.1, 2.0);
        trig.process(0.0);
        assert!(!trig.process(1.9));
        assert!(trig.process(2.0));
    }

    #[test]
    fn test_rising_edge() {
        let mut edge = RisingEdge::new(2.0);
        assert!(edge.process(3.0));
        assert!(!edge.process(3.0));
        assert!(!edge.process(1.0));
        assert!(edge.process(2.0));
    }

    #[test]
    fn test_pulse_duration() {
        let mut pulse = PulseGenerator::new();
        let dt = 1.0 / 1000.0;
        pulse.trigger(0.01);
        let high = (0..100).filter(|_| pulse.process(dt)).count();
        assert!((10..=11).contains(&high), "high for {} samples", high);
    }

    #[test]
    fn test_pulse_keeps_longer_duration() {
        let mut pulse = PulseGenerator::new();
        pulse.trigger(0.01);
        pulse.trigger(0.001);
        let high = (0..100).filter(|_| pulse.process(0.001)).count();
        assert!(high >= 10);
    }

    #[test]
    fn test_slew_zero_time_passes_through() {
        let mut slew = SlewLimiter::new();
        slew.set_rise_time(0.0);
        slew.set_fall_time(0.0);
        assert_eq!(slew.process(0.001, 10.0), 10.0);
        assert_eq!(slew.process(0.001, 0.0), 0.0);
    }

    #[test]
    fn test_slew_rises_gradually() {
        let mut slew = SlewLimiter::new();
        slew.set_rise_time(0.1);
        let first = slew.process(0.001, 10.0);
        assert!(first > 0.0 && first < 10.0);
        for _ in 0..5000 {
            slew.process(0.001, 10.0);
        }
        assert!((slew.value() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::INFINITY), 0.0);
        assert_eq!(sanitize(-2.5), -2.5);
    }
}
