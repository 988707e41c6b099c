//! Ovomorph: polyphonic stereo reverb

use super::chaos_effect::{ChaosEffect, EffectControl, StereoCore};
use crate::effects::{ChaosFrame, ReverbProcessor, ReverbSide};
use crate::rng::Rng;

/// Left and right reverb networks with their own comb tunings
pub struct ReverbCore {
    left: ReverbProcessor,
    right: ReverbProcessor,
}

impl ReverbCore {
    pub const ROOM: usize = 0;
    pub const TONE: usize = 1;
    pub const DECAY: usize = 2;
}

impl StereoCore for ReverbCore {
    const TYPE_ID: &'static str = "ovomorph";

    const CONTROLS: [EffectControl; 3] = [
        EffectControl::unit_range("Room", 0.5),
        EffectControl::unit_range("Tone", 0.4),
        EffectControl::unit_range("Decay", 0.6),
    ];

    fn new(_rng: &mut Rng) -> Self {
        Self {
            left: ReverbProcessor::new(ReverbSide::Left),
            right: ReverbProcessor::new(ReverbSide::Right),
        }
    }

    #[inline]
    fn process(
        &mut self,
        left: f64,
        right: f64,
        controls: [f64; 3],
        chaos: ChaosFrame,
        sample_rate: f64,
    ) -> (f64, f64) {
        // tone is the comb damping
        let [room, damping, decay] = controls;
        (
            self.left.process(left, room, damping, decay, chaos, sample_rate),
            self.right.process(right, room, damping, decay, chaos, sample_rate),
        )
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Ovomorph
///
/// Room scales the input drive and the early taps, tone damps the combs and
/// decay sets their feedback. Chaos pushes the feedback around and wobbles
/// the tap positions.
pub type Ovomorph = ChaosEffect<ReverbCore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{GraphModule, ParamId, PortValues};

    const SR: f64 = 48000.0;

    #[test]
    fn test_defaults() {
        let module = Ovomorph::new(SR);
        assert_eq!(module.type_id(), "ovomorph");
        assert_eq!(module.get_param(ReverbCore::DECAY as ParamId), Some(0.6));
        assert_eq!(module.get_param(Ovomorph::MIX_PARAM), Some(0.5));
        assert!(module.port_spec().input_by_name("tone_cv").is_some());
    }

    #[test]
    fn test_impulse_leaves_a_tail() {
        let mut module = Ovomorph::new(SR);
        module.set_param(Ovomorph::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        inputs.set(Ovomorph::LEFT_INPUT, 5.0);
        module.tick(&inputs, &mut outputs);
        inputs.set(Ovomorph::LEFT_INPUT, 0.0);

        let mut tail_l: f64 = 0.0;
        let mut tail_r: f64 = 0.0;
        let mut differs = false;
        for _ in 0..SR as usize / 4 {
            module.tick(&inputs, &mut outputs);
            let l = outputs.get_or(Ovomorph::LEFT_OUTPUT, 0.0);
            let r = outputs.get_or(Ovomorph::RIGHT_OUTPUT, 0.0);
            assert!(l.is_finite() && r.is_finite());
            tail_l = tail_l.max(l.abs());
            tail_r = tail_r.max(r.abs());
            differs |= (l - r).abs() > 1e-9;
        }
        assert!(tail_l > 1e-3);
        assert!(tail_r > 1e-3);
        // the mono impulse reaches both sides with different comb tunings
        assert!(differs);
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut module = Ovomorph::new(SR);
        module.set_param(Ovomorph::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        inputs.set(Ovomorph::LEFT_INPUT, 5.0);
        for _ in 0..2000 {
            module.tick(&inputs, &mut outputs);
        }
        module.reset();
        inputs.set(Ovomorph::LEFT_INPUT, 0.0);
        for _ in 0..2000 {
            module.tick(&inputs, &mut outputs);
            assert_eq!(outputs.get(Ovomorph::LEFT_OUTPUT), Some(0.0));
        }
    }
}
