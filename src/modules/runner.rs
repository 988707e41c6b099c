//! Runner: polyphonic stereo delay

use super::chaos_effect::{ChaosEffect, EffectControl, StereoCore};
use crate::effects::{ChaosFrame, DelayLine};
use crate::rng::Rng;

/// A feedback delay line per side, each with its own time
pub struct DelayCore {
    left: DelayLine,
    right: DelayLine,
}

impl DelayCore {
    pub const TIME_L: usize = 0;
    pub const TIME_R: usize = 1;
    pub const FEEDBACK: usize = 2;

    const CHAOS_DEPTH: f64 = 0.1;
}

impl StereoCore for DelayCore {
    const TYPE_ID: &'static str = "runner";

    const CONTROLS: [EffectControl; 3] = [
        EffectControl {
            name: "Time L",
            min: 0.001,
            max: 2.0,
            default: 0.25,
            cv_scale: 0.2,
            unit: " s",
        },
        EffectControl {
            name: "Time R",
            min: 0.001,
            max: 2.0,
            default: 0.25,
            cv_scale: 0.2,
            unit: " s",
        },
        EffectControl {
            name: "Feedback",
            min: 0.0,
            max: 0.95,
            default: 0.3,
            cv_scale: 0.1,
            unit: "%",
        },
    ];

    fn new(_rng: &mut Rng) -> Self {
        Self {
            left: DelayLine::new(),
            right: DelayLine::new(),
        }
    }

    /// Chaos nudges both times and the feedback
    #[inline]
    fn modulate(_index: usize, value: f64, chaos: ChaosFrame) -> f64 {
        if chaos.enabled {
            value + chaos.raw * Self::CHAOS_DEPTH
        } else {
            value
        }
    }

    #[inline]
    fn process(
        &mut self,
        left: f64,
        right: f64,
        controls: [f64; 3],
        _chaos: ChaosFrame,
        sample_rate: f64,
    ) -> (f64, f64) {
        let [time_l, time_r, feedback] = controls;
        let delay_l = DelayLine::delay_samples(time_l, sample_rate);
        let delay_r = DelayLine::delay_samples(time_r, sample_rate);
        (
            self.left.process(left, delay_l, feedback),
            self.right.process(right, delay_r, feedback),
        )
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Runner
///
/// Independent left and right delay times up to two seconds with shared
/// feedback. Right is normalled to left, so a mono source with different
/// times gives a ping-pong-like spread.
pub type Runner = ChaosEffect<DelayCore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{GraphModule, ParamId, PortValues};
    use approx::assert_relative_eq;

    const SR: f64 = 48000.0;

    fn param(index: usize) -> ParamId {
        Runner::CONTROL_PARAM + index as ParamId
    }

    #[test]
    fn test_defaults() {
        let module = Runner::new(SR);
        assert_eq!(module.type_id(), "runner");
        assert_eq!(module.get_param(param(DelayCore::TIME_L)), Some(0.25));
        assert_eq!(module.get_param(param(DelayCore::FEEDBACK)), Some(0.3));
        assert!(module.port_spec().input_by_name("time_r_cv").is_some());
    }

    #[test]
    fn test_impulse_returns_after_delay_time() {
        let mut module = Runner::new(SR);
        module.set_param(param(DelayCore::TIME_L), 0.5).unwrap();
        module.set_param(param(DelayCore::FEEDBACK), 0.0).unwrap();
        module.set_param(Runner::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();

        inputs.set(Runner::LEFT_INPUT, 1.0);
        module.tick(&inputs, &mut outputs);
        inputs.set(Runner::LEFT_INPUT, 0.0);
        for n in 1..=24000 {
            module.tick(&inputs, &mut outputs);
            let out = outputs.get_or(Runner::LEFT_OUTPUT, 0.0);
            if n == 24000 {
                assert_relative_eq!(out, 1.0);
            } else {
                assert_eq!(out, 0.0, "early output at frame {}", n);
            }
        }
    }

    #[test]
    fn test_sides_use_their_own_time() {
        let mut module = Runner::new(1000.0);
        module.set_param(param(DelayCore::TIME_L), 0.01).unwrap();
        module.set_param(param(DelayCore::TIME_R), 0.02).unwrap();
        module.set_param(param(DelayCore::FEEDBACK), 0.0).unwrap();
        module.set_param(Runner::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        inputs.set(Runner::LEFT_INPUT, 1.0);
        module.tick(&inputs, &mut outputs);
        inputs.set(Runner::LEFT_INPUT, 0.0);

        let mut hits = (None, None);
        for n in 1..=30 {
            module.tick(&inputs, &mut outputs);
            if outputs.get_or(Runner::LEFT_OUTPUT, 0.0) > 0.5 {
                hits.0 = Some(n);
            }
            if outputs.get_or(Runner::RIGHT_OUTPUT, 0.0) > 0.5 {
                hits.1 = Some(n);
            }
        }
        assert_eq!(hits, (Some(10), Some(20)));
    }

    #[test]
    fn test_feedback_repeats_decay() {
        let mut module = Runner::new(1000.0);
        module.set_param(param(DelayCore::TIME_L), 0.01).unwrap();
        module.set_param(param(DelayCore::FEEDBACK), 0.5).unwrap();
        module.set_param(Runner::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        inputs.set(Runner::LEFT_INPUT, 1.0);
        module.tick(&inputs, &mut outputs);
        inputs.set(Runner::LEFT_INPUT, 0.0);

        let mut repeats = Vec::new();
        for n in 1..=30 {
            module.tick(&inputs, &mut outputs);
            if n % 10 == 0 {
                repeats.push(outputs.get_or(Runner::LEFT_OUTPUT, 0.0));
            }
        }
        assert_relative_eq!(repeats[0], 1.0);
        assert_relative_eq!(repeats[1], 0.5);
        assert_relative_eq!(repeats[2], 0.25);
    }

    #[test]
    fn test_time_cv_scale_and_clamp() {
        let mut module = Runner::new(1000.0);
        module.set_param(param(DelayCore::TIME_L), 0.01).unwrap();
        module.set_param(param(DelayCore::FEEDBACK), 0.0).unwrap();
        module.set_param(Runner::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        // 0.01 s + 0.05 V * 0.2 = 20 ms
        inputs.set(Runner::CONTROL_CV_INPUT, 0.05);
        inputs.set(Runner::LEFT_INPUT, 1.0);
        module.tick(&inputs, &mut outputs);
        inputs.set(Runner::LEFT_INPUT, 0.0);
        let mut hit = None;
        for n in 1..=30 {
            module.tick(&inputs, &mut outputs);
            if outputs.get_or(Runner::LEFT_OUTPUT, 0.0) > 0.5 {
                hit = Some(n);
            }
        }
        assert_eq!(hit, Some(20));
    }
}
