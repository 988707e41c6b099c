//! Modules
//!
//! Every host-facing module implements [`GraphModule`](crate::port::GraphModule).
//! Input port ids start at 0 and output ids at 10; parameter ids are the
//! module's knob indices.

mod chaos_effect;
mod euclidean_rhythm;
mod facehugger;
mod maddy;
mod multiverse;
mod ovomorph;
mod pinpple;
mod pyramid;
mod runner;
mod twnc;

pub use chaos_effect::{ChaosEffect, EffectControl, StereoCore};
pub use euclidean_rhythm::EuclideanRhythm;
pub use facehugger::{Facehugger, GranularCore};
pub use maddy::{ClockSource, Maddy};
pub use multiverse::Multiverse;
pub use ovomorph::{Ovomorph, ReverbCore};
pub use pinpple::Pinpple;
pub use pyramid::Pyramid;
pub use runner::{DelayCore, Runner};
pub use twnc::Twnc;

use crate::port::{PortId, PortValues};
use crate::trigger::sanitize;

/// `base + cv * scale` when the CV input is patched, `base` otherwise.
///
/// An unpatched jack leaves the knob alone; a patched jack at 0 V is still
/// a modulation source of zero. Non-finite voltages read as 0 V, and a sum
/// that overflows falls back to `base`.
#[inline]
pub(crate) fn modulated(inputs: &PortValues, id: PortId, channel: usize, base: f64, scale: f64) -> f64 {
    match inputs.poly_voltage(id, channel) {
        Some(cv) => {
            let value = base + sanitize(cv) * scale;
            if value.is_finite() {
                value
            } else {
                base
            }
        }
        None => base,
    }
}

/// Mono variant of [`modulated`]
#[inline]
pub(crate) fn modulated_mono(inputs: &PortValues, id: PortId, base: f64, scale: f64) -> f64 {
    modulated(inputs, id, 0, base, scale)
}

/// Polyphony of a stereo pair: the wider of the two, at least one channel
#[inline]
pub(crate) fn stereo_channels(inputs: &PortValues, left: PortId, right: PortId) -> usize {
    inputs.channels(left).max(inputs.channels(right)).max(1)
}

/// Left and right voltages for `channel`, with right normalled to left when
/// its jack is empty
#[inline]
pub(crate) fn stereo_input(
    inputs: &PortValues,
    left: PortId,
    right: PortId,
    channel: usize,
) -> (f64, f64) {
    let l = inputs.voltage(left, channel);
    let r = if inputs.has(right) {
        inputs.voltage(right, channel)
    } else {
        l
    };
    (l, r)
}

#[inline]
pub(crate) fn gate_voltage(high: bool) -> f64 {
    if high {
        10.0
    } else {
        0.0
    }
}
