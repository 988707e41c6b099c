//! Facehugger: polyphonic stereo granular effect

use super::chaos_effect::{ChaosEffect, EffectControl, StereoCore};
use crate::effects::{ChaosFrame, GrainProcessor};
use crate::rng::Rng;

/// Two independent grain clouds, one per side
pub struct GranularCore {
    left: GrainProcessor,
    right: GrainProcessor,
}

impl GranularCore {
    pub const SIZE: usize = 0;
    pub const BREAK: usize = 1;
    pub const SHIFT: usize = 2;

    pub fn active_grains(&self) -> (usize, usize) {
        (self.left.active_grains(), self.right.active_grains())
    }
}

impl StereoCore for GranularCore {
    const TYPE_ID: &'static str = "facehugger";

    const CONTROLS: [EffectControl; 3] = [
        EffectControl::unit_range("Size", 0.3),
        EffectControl::unit_range("Break", 0.4),
        EffectControl::unit_range("Shift", 0.5),
    ];

    fn new(rng: &mut Rng) -> Self {
        Self {
            left: GrainProcessor::new(Rng::from_seed(rng.next_u64())),
            right: GrainProcessor::new(Rng::from_seed(rng.next_u64())),
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
        let [size, density, position] = controls;
        (
            self.left.process(left, size, density, position, chaos, sample_rate),
            self.right.process(right, size, density, position, chaos, sample_rate),
        )
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Facehugger
///
/// Size sets the grain length (1 to 100 ms), break the spawn rate and shift
/// the read position in the 8192-sample history. Chaos jitters density and
/// position and may reverse grains or throw them an octave up or down.
pub type Facehugger = ChaosEffect<GranularCore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{GraphModule, ParamId, PortValues};

    const SR: f64 = 48000.0;

    fn run(module: &mut Facehugger, inputs: &PortValues, frames: usize) -> f64 {
        let mut outputs = PortValues::new();
        let mut peak: f64 = 0.0;
        for _ in 0..frames {
            module.tick(inputs, &mut outputs);
            peak = peak.max(outputs.get_or(Facehugger::LEFT_OUTPUT, 0.0).abs());
        }
        peak
    }

    #[test]
    fn test_defaults() {
        let module = Facehugger::with_rng(SR, Rng::from_seed(1));
        assert_eq!(module.type_id(), "facehugger");
        let names: Vec<&str> = module.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Size", "Break", "Shift", "Mix", "Chaos", "Rate"]);
        assert_eq!(module.get_param(GranularCore::SIZE as ParamId), Some(0.3));
        assert!(module.port_spec().input_by_name("break_cv").is_some());
    }

    #[test]
    fn test_grains_spawn_on_signal() {
        let mut module = Facehugger::with_rng(SR, Rng::from_seed(7));
        module.set_param(Facehugger::MIX_PARAM, 1.0).unwrap();
        let mut inputs = PortValues::new();
        inputs.set(Facehugger::LEFT_INPUT, 1.0);
        let mut outputs = PortValues::new();
        let mut peak: f64 = 0.0;
        let mut most_grains = 0;
        for _ in 0..SR as usize / 2 {
            module.tick(&inputs, &mut outputs);
            peak = peak.max(outputs.get_or(Facehugger::LEFT_OUTPUT, 0.0).abs());
            let (left, right) = module.core(0).map(GranularCore::active_grains).unwrap();
            // without chaos both sides spawn in lockstep
            assert_eq!(left, right);
            most_grains = most_grains.max(left);
        }
        assert!(peak > 0.1);
        assert!(most_grains > 0);
    }

    #[test]
    fn test_reset_clears_grains() {
        let mut module = Facehugger::with_rng(SR, Rng::from_seed(7));
        let mut inputs = PortValues::new();
        inputs.set(Facehugger::LEFT_INPUT, 1.0);
        run(&mut module, &inputs, 4800);
        module.reset();
        assert_eq!(module.core(0).map(GranularCore::active_grains), Some((0, 0)));
    }

    #[test]
    fn test_chaos_output_stays_bounded() {
        let mut module = Facehugger::with_rng(SR, Rng::from_seed(3));
        module.set_param(Facehugger::MIX_PARAM, 1.0).unwrap();
        module.set_param(Facehugger::CHAOS_PARAM, 1.0).unwrap();
        module.set_param(GranularCore::BREAK as ParamId, 1.0).unwrap();
        let mut inputs = PortValues::new();
        inputs.set(Facehugger::LEFT_INPUT, 1.0);
        let peak = run(&mut module, &inputs, SR as usize);
        assert!(peak.is_finite());
        // grains are windowed copies of a 1 V input, normalized by sqrt(active)
        assert!(peak <= 4.0 + 1e-9);
    }
}
