//! Display Capture
//!
//! Decimates audio into fixed-width display buffers and estimates each
//! channel's dominant frequency from zero crossings. Rendering happens
//! elsewhere: captured frames are handed to a [`DisplaySink`] that the host
//! attaches, so this module never touches a window or GPU.

use crate::trigger::SchmittTrigger;

/// Width of a display buffer in samples
pub const DISPLAY_WIDTH: usize = 1024;

/// Samples between frequency estimates
pub const FREQUENCY_WINDOW: usize = 512;

pub const DEFAULT_FREQUENCY: f64 = 440.0;

/// Per-channel rendering parameters, normalized for the renderer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelParams {
    /// Phase offset in turns, 0..1
    pub phase: f64,
    /// Rotation in turns, -0.5..0.5
    pub angle: f64,
    /// 0..2
    pub intensity: f64,
    /// Estimated dominant frequency in Hz
    pub frequency: f64,
}

/// How the renderer layers the channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixMode {
    Add,
    Screen,
    Difference,
    ColorDodge,
}

impl MixMode {
    pub const LABELS: &'static [&'static str] = &["Add", "Screen", "Difference", "Color Dodge"];

    /// Nearest mode to a continuous 0..3 control value
    pub fn from_value(value: f64) -> Self {
        match value.round().clamp(0.0, 3.0) as u8 {
            0 => MixMode::Add,
            1 => MixMode::Screen,
            2 => MixMode::Difference,
            _ => MixMode::ColorDodge,
        }
    }

    pub fn label(&self) -> &'static str {
        Self::LABELS[*self as usize]
    }
}

/// Receiver for captured display frames.
///
/// Called from the audio thread at the publish rate; implementations should
/// copy the data out and return without blocking.
pub trait DisplaySink: Send + Sync {
    fn update_channel(&mut self, channel: usize, buffer: &[f64], params: ChannelParams);

    /// `mix_mode` is the continuous 0..3 control; see [`MixMode::from_value`]
    fn update_global(&mut self, mix_mode: f64);
}

/// Time-per-pixel for a ratio in -2..2: the screen spans `10^ratio * 10` ms
pub fn samples_per_pixel(ratio: f64, sample_rate: f64) -> f64 {
    let ms_per_screen = libm::pow(10.0, ratio) * 10.0;
    sample_rate * ms_per_screen / 1000.0 / DISPLAY_WIDTH as f64
}

/// One captured channel
#[derive(Debug, Clone)]
pub struct ScopeChannel {
    buffer: [f64; DISPLAY_WIDTH],
    write_index: usize,
    frame_index: usize,
    dominant_frequency: f64,
    last_voltage: f64,
    zero_crossings: usize,
    sample_count: usize,
    signal_trigger: SchmittTrigger,
}

impl ScopeChannel {
    pub fn new() -> Self {
        Self {
            buffer: [0.0; DISPLAY_WIDTH],
            write_index: 0,
            frame_index: 0,
            dominant_frequency: DEFAULT_FREQUENCY,
            last_voltage: 0.0,
            zero_crossings: 0,
            sample_count: 0,
            signal_trigger: SchmittTrigger::new(),
        }
    }

    /// Rising edge of the signal through 0 V, for self-triggered sync
    #[inline]
    pub fn self_trigger(&mut self, voltage: f64) -> bool {
        self.signal_trigger.process(voltage * 100.0)
    }

    /// Restart the write cursor at the left edge
    pub fn restart(&mut self) {
        self.write_index = 0;
    }

    /// Count sign changes and publish a new estimate every
    /// [`FREQUENCY_WINDOW`] samples. Estimates outside 20 Hz..20 kHz are
    /// discarded and the previous one kept.
    #[inline]
    pub fn track_frequency(&mut self, voltage: f64, sample_rate: f64) {
        if (self.last_voltage < 0.0) != (voltage < 0.0) {
            self.zero_crossings += 1;
        }
        self.last_voltage = voltage;
        self.sample_count += 1;

        if self.sample_count >= FREQUENCY_WINDOW {
            let estimate =
                self.zero_crossings as f64 / 2.0 * (sample_rate / FREQUENCY_WINDOW as f64);
            if estimate > 20.0 && estimate < 20000.0 {
                self.dominant_frequency = estimate;
            }
            self.zero_crossings = 0;
            self.sample_count = 0;
        }
    }

    /// Write one display sample every `samples_per_pixel` input samples,
    /// wrapping at the right edge
    #[inline]
    pub fn capture(&mut self, voltage: f64, samples_per_pixel: f64) {
        self.frame_index += 1;
        if self.frame_index >= samples_per_pixel as usize {
            if self.write_index >= DISPLAY_WIDTH {
                self.write_index = 0;
            }
            self.buffer[self.write_index] = voltage;
            self.write_index += 1;
            self.frame_index = 0;
        }
    }

    pub fn buffer(&self) -> &[f64] {
        &self.buffer
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn dominant_frequency(&self) -> f64 {
        self.dominant_frequency
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ScopeChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_samples_per_pixel() {
        // centered ratio: 10 ms over 1024 pixels at 48 kHz
        assert_relative_eq!(samples_per_pixel(0.0, 48000.0), 480.0 / 1024.0);
        assert_relative_eq!(samples_per_pixel(2.0, 48000.0), 48000.0 / 1024.0);
    }

    #[test]
    fn test_frequency_estimate() {
        let mut channel = ScopeChannel::new();
        let sr = 48000.0;
        for i in 0..(FREQUENCY_WINDOW * 20) {
            // offset phase so no sample lands exactly on zero
            let v = (2.0 * PI * 375.0 * (i as f64 + 0.25) / sr).sin();
            channel.track_frequency(v, sr);
        }
        // 375 Hz is exactly 4 cycles per window
        assert_relative_eq!(channel.dominant_frequency(), 375.0, epsilon = 47.0);
    }

    #[test]
    fn test_frequency_estimate_rejects_dc() {
        let mut channel = ScopeChannel::new();
        for _ in 0..(FREQUENCY_WINDOW * 4) {
            channel.track_frequency(1.0, 48000.0);
        }
        assert_eq!(channel.dominant_frequency(), DEFAULT_FREQUENCY);
    }

    #[test]
    fn test_capture_wraps() {
        let mut channel = ScopeChannel::new();
        for i in 0..(DISPLAY_WIDTH + 10) {
            channel.capture(i as f64, 0.5);
        }
        assert_eq!(channel.write_index(), 10);
        assert_eq!(channel.buffer()[9], (DISPLAY_WIDTH + 9) as f64);
        assert_eq!(channel.buffer()[10], 10.0);
    }

    #[test]
    fn test_capture_decimates() {
        let mut channel = ScopeChannel::new();
        for i in 0..40 {
            channel.capture(i as f64, 4.0);
        }
        assert_eq!(channel.write_index(), 10);
        assert_eq!(channel.buffer()[0], 3.0);
        assert_eq!(channel.buffer()[1], 7.0);
    }

    #[test]
    fn test_self_trigger_on_rising_zero_crossing() {
        let mut channel = ScopeChannel::new();
        assert!(!channel.self_trigger(1.0));
        assert!(!channel.self_trigger(-1.0));
        assert!(channel.self_trigger(0.5));
        assert!(!channel.self_trigger(0.6));
    }

    #[test]
    fn test_mix_mode_from_value() {
        assert_eq!(MixMode::from_value(1.4), MixMode::Screen);
        assert_eq!(MixMode::from_value(7.0).label(), "Color Dodge");
        assert_eq!(MixMode::from_value(-1.0), MixMode::Add);
    }
}
