//! Euclidean rhythm patterns
//!
//! A [`Pattern`] is a fixed-capacity boolean rhythm mask stored as a bitset,
//! so regenerating it every frame costs a few integer operations and never
//! touches the heap.

/// Longest pattern that can be generated
pub const MAX_PATTERN_LENGTH: usize = 64;

/// Rhythm mask of up to [`MAX_PATTERN_LENGTH`] steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pattern {
    bits: u64,
    length: usize,
}

impl Pattern {
    /// All-off pattern of the given length (clamped to the capacity)
    pub fn silent(length: usize) -> Self {
        Self {
            bits: 0,
            length: length.min(MAX_PATTERN_LENGTH),
        }
    }

    /// Distribute `fill` hits as evenly as possible over `length` steps, then
    /// rotate left by `shift`.
    ///
    /// Total over its clamped domain: `fill` above `length` becomes a full
    /// pattern and any shift, negative included, wraps modulo `length`.
    pub fn generate(length: usize, fill: usize, shift: i32) -> Self {
        let length = length.min(MAX_PATTERN_LENGTH);
        if fill == 0 || length == 0 {
            return Self::silent(length);
        }
        let fill = fill.min(length);

        let mut raw = 0u64;
        for i in 0..fill {
            raw |= 1 << (i * length / fill);
        }

        let shift = shift.rem_euclid(length as i32) as usize;
        let mut bits = 0u64;
        for step in 0..length {
            if raw & (1 << ((step + shift) % length)) != 0 {
                bits |= 1 << step;
            }
        }
        Self { bits, length }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether step `index` is a hit; out-of-range steps are rests.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < self.length && self.bits & (1 << index) != 0
    }

    pub fn hits(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.length).map(move |i| self.get(i))
    }
}

/// Convert a fill percentage into a hit count for `length` steps
pub fn fill_from_percent(percent: f64, length: usize) -> usize {
    let percent = percent.clamp(0.0, 100.0);
    (percent / 100.0 * length as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_vec(pattern: &Pattern) -> Vec<bool> {
        pattern.iter().collect()
    }

    #[test]
    fn test_four_on_the_floor() {
        let pattern = Pattern::generate(16, 4, 0);
        let expected = [
            true, false, false, false, true, false, false, false, true, false, false, false, true,
            false, false, false,
        ];
        assert_eq!(as_vec(&pattern), expected);
    }

    #[test]
    fn test_hit_count_matches_fill() {
        for length in 1..=32 {
            for fill in 0..=length {
                let pattern = Pattern::generate(length, fill, 0);
                assert_eq!(pattern.len(), length);
                assert_eq!(pattern.hits(), fill, "length {} fill {}", length, fill);
            }
        }
    }

    #[test]
    fn test_fill_above_length_clamps_to_full() {
        let pattern = Pattern::generate(8, 12, 3);
        assert_eq!(pattern.hits(), 8);
    }

    #[test]
    fn test_rotation_wraps_by_length() {
        for length in 1..=32usize {
            for fill in 0..=length {
                for shift in -3..(length as i32 + 3) {
                    assert_eq!(
                        Pattern::generate(length, fill, shift),
                        Pattern::generate(length, fill, shift + length as i32),
                        "length {} fill {} shift {}",
                        length,
                        fill,
                        shift
                    );
                }
            }
        }
    }

    #[test]
    fn test_shift_rotates_left() {
        let base = Pattern::generate(8, 3, 0);
        let shifted = Pattern::generate(8, 3, 2);
        for step in 0..8 {
            assert_eq!(shifted.get(step), base.get((step + 2) % 8));
        }
    }

    #[test]
    fn test_negative_shift_rotates_right() {
        let base = Pattern::generate(8, 3, 0);
        let shifted = Pattern::generate(8, 3, -1);
        assert_eq!(shifted.get(1), base.get(0));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(Pattern::generate(0, 4, 0).is_empty());
        let silent = Pattern::generate(12, 0, 5);
        assert_eq!(silent.len(), 12);
        assert_eq!(silent.hits(), 0);
        assert!(!silent.get(40));
    }

    #[test]
    fn test_capacity_limit() {
        let full = Pattern::generate(200, 200, 0);
        assert_eq!(full.len(), MAX_PATTERN_LENGTH);
        assert_eq!(full.hits(), MAX_PATTERN_LENGTH);
    }

    #[test]
    fn test_fill_from_percent() {
        assert_eq!(fill_from_percent(25.0, 16), 4);
        assert_eq!(fill_from_percent(84.5, 16), 14);
        assert_eq!(fill_from_percent(150.0, 10), 10);
        assert_eq!(fill_from_percent(-5.0, 10), 0);
    }
}
