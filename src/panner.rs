//! Cube Panning
//!
//! Distance-based amplitude panning over eight speakers at the corners of a
//! cube. This is a distance law with edge fades, not triangulated VBAP: each
//! speaker's gain is `1 / (1 + d + 2d²)` of its distance to the source, and
//! the set is normalized to unit power.

/// A speaker position in the unit cube
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speaker {
    pub name: &'static str,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Speaker {
    const fn new(name: &'static str, x: f64, y: f64, z: f64) -> Self {
        Self { name, x, y, z }
    }

    fn distance_to(&self, x: f64, y: f64, z: f64) -> f64 {
        let (dx, dy, dz) = (self.x - x, self.y - y, self.z - z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

pub const SPEAKER_COUNT: usize = 8;

/// Output order: upper ring front-left, front-right, back-left, back-right,
/// then the lower ring in the same order. Upper is `y = -1`, front is `z = 1`.
pub const SPEAKERS: [Speaker; SPEAKER_COUNT] = [
    Speaker::new("FL Upper", -1.0, -1.0, 1.0),
    Speaker::new("FR Upper", 1.0, -1.0, 1.0),
    Speaker::new("BL Upper", -1.0, -1.0, -1.0),
    Speaker::new("BR Upper", 1.0, -1.0, -1.0),
    Speaker::new("FL Lower", -1.0, 1.0, 1.0),
    Speaker::new("FR Lower", 1.0, 1.0, 1.0),
    Speaker::new("BL Lower", -1.0, 1.0, -1.0),
    Speaker::new("BR Lower", 1.0, 1.0, -1.0),
];

/// Attenuation of a speaker on the far side of one axis once the source is
/// within 0.2 of that axis's face
#[inline]
fn edge_fade(source: f64, speaker: f64) -> f64 {
    if source <= -0.8 && speaker > 0.0 {
        ((source + 1.0) / 0.2).max(0.0)
    } else if source >= 0.8 && speaker < 0.0 {
        ((1.0 - source) / 0.2).max(0.0)
    } else {
        1.0
    }
}

/// Per-speaker gains for a source at `(x, y, z)` in `[-1, 1]³`.
///
/// The result has unit sum of squares unless every gain faded to zero, in
/// which case it is returned unnormalized.
pub fn cube_gains(x: f64, y: f64, z: f64) -> [f64; SPEAKER_COUNT] {
    let mut gains = SPEAKERS.map(|speaker| {
        let d = speaker.distance_to(x, y, z).max(0.001);
        let law = 1.0 / (1.0 + d + d * d * 2.0);
        law * edge_fade(x, speaker.x) * edge_fade(y, speaker.y) * edge_fade(z, speaker.z)
    });

    let power: f64 = gains.iter().map(|g| g * g).sum();
    if power > 0.0 {
        let norm = 1.0 / power.sqrt();
        gains.iter_mut().for_each(|g| *g *= norm);
    }
    gains
}
