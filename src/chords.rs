pub const CHORD_NUM_VOICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChordArchetype {
    Unison,
    Octaves,
    Power,
    #[default]
    MajorTriad,
    MinorTriad,
    Sus2,
    Sus4,
    Diminished,
    Augmented,
}

impl ChordArchetype {
    pub fn all() -> &'static [ChordArchetype] {
        &[
            ChordArchetype::Unison,
            ChordArchetype::Octaves,
            ChordArchetype::Power,
            ChordArchetype::MajorTriad,
            ChordArchetype::MinorTriad,
            ChordArchetype::Sus2,
            ChordArchetype::Sus4,
            ChordArchetype::Diminished,
            ChordArchetype::Augmented,
        ]
    }

    pub fn from_normalized(x: f32) -> Self {
        let all = Self::all();
        all[discretize(x, all.len())]
    }

    pub fn to_normalized(self) -> f32 {
        let all = Self::all();
        let index = all.iter().position(|&c| c == self).unwrap_or(0);
        (index as f32 + 0.5) / all.len() as f32
    }

    pub fn intervals(self) -> [i32; CHORD_NUM_VOICES] {
        match self {
            ChordArchetype::Unison => [0, 0, 0],
            ChordArchetype::Octaves => [0, 12, -12],
            ChordArchetype::Power => [0, 7, 12],
            ChordArchetype::MajorTriad => [0, 4, 7],
            ChordArchetype::MinorTriad => [0, 3, 7],
            ChordArchetype::Sus2 => [0, 2, 7],
            ChordArchetype::Sus4 => [0, 5, 7],
            ChordArchetype::Diminished => [0, 3, 6],
            ChordArchetype::Augmented => [0, 4, 8],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChordArchetype::Unison => "Unison",
            ChordArchetype::Octaves => "Octaves",
            ChordArchetype::Power => "Power",
            ChordArchetype::MajorTriad => "Major",
            ChordArchetype::MinorTriad => "Minor",
            ChordArchetype::Sus2 => "Sus2",
            ChordArchetype::Sus4 => "Sus4",
            ChordArchetype::Diminished => "Diminished",
            ChordArchetype::Augmented => "Augmented",
        }
    }
}

pub fn intervals_for_chord(archetype: ChordArchetype) -> [i32; CHORD_NUM_VOICES] {
    archetype.intervals()
}

/// Root key as a pitch class, C = 0 .. B = 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Key(u8);

impl Key {
    pub const C: Key = Key(0);

    pub fn new(pitch_class: i32) -> Self {
        Key(pitch_class.rem_euclid(12) as u8)
    }

    pub fn from_normalized(x: f32) -> Self {
        Key(discretize(x, 12) as u8)
    }

    pub fn to_normalized(self) -> f32 {
        (self.0 as f32 + 0.5) / 12.0
    }

    pub fn semitone(self) -> i32 {
        self.0 as i32
    }

    pub fn name(self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        NAMES[self.0 as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    /// No quantization.
    #[default]
    Chromatic,
    Major,
    NaturalMinor,
    HarmonicMinor,
    Dorian,
    Mixolydian,
    PentatonicMajor,
    PentatonicMinor,
}

impl Scale {
    pub fn all() -> &'static [Scale] {
        &[
            Scale::Chromatic,
            Scale::Major,
            Scale::NaturalMinor,
            Scale::HarmonicMinor,
            Scale::Dorian,
            Scale::Mixolydian,
            Scale::PentatonicMajor,
            Scale::PentatonicMinor,
        ]
    }

    pub fn from_normalized(x: f32) -> Self {
        let all = Self::all();
        all[discretize(x, all.len())]
    }

    pub fn to_normalized(self) -> f32 {
        let all = Self::all();
        let index = all.iter().position(|&s| s == self).unwrap_or(0);
        (index as f32 + 0.5) / all.len() as f32
    }

    /// Semitone offsets from the root; empty for [`Scale::Chromatic`].
    pub fn degrees(self) -> &'static [i32] {
        match self {
            Scale::Chromatic => &[],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
        }
    }

    pub fn contains(self, semitone: i32, key: Key) -> bool {
        let pitch_class = (semitone - key.semitone()).rem_euclid(12);
        self.degrees().contains(&pitch_class)
    }
}

/// Snaps `interval` to the nearest member of `key`'s `scale`. Equidistant
/// candidates resolve to the higher one. With [`Scale::Chromatic`] the
/// interval is only transposed by the key.
pub fn quantize_to_scale(interval: i32, scale: Scale, key: Key) -> i32 {
    if scale == Scale::Chromatic {
        return interval + key.semitone();
    }

    // Every scale has a degree within six semitones of any pitch.
    for distance in 0..=6 {
        if scale.contains(interval + distance, key) {
            return interval + distance;
        }
        if scale.contains(interval - distance, key) {
            return interval - distance;
        }
    }
    interval
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSpec {
    pub intervals: [i32; CHORD_NUM_VOICES],
}

impl ChordSpec {
    pub fn resolve(chord: ChordArchetype, key: Key, scale: Scale) -> Self {
        let mut intervals = chord.intervals();
        for interval in intervals.iter_mut() {
            *interval = quantize_to_scale(*interval, scale, key);
        }
        Self { intervals }
    }

    pub fn ratios(&self, octave_offset: i32) -> [f32; CHORD_NUM_VOICES] {
        self.intervals.map(|semitones| {
            crate::float::semitones_to_ratio((semitones + 12 * octave_offset) as f32)
        })
    }
}

/// Maps `[0, 1]` onto `0..count`; out-of-range and NaN inputs clamp.
pub fn discretize(x: f32, count: usize) -> usize {
    let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
    ((x * count as f32) as usize).min(count - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_major_triad_chromatic_in_c() {
        let spec = ChordSpec::resolve(ChordArchetype::MajorTriad, Key::C, Scale::Chromatic);
        assert_eq!(spec.intervals, [0, 4, 7]);

        let ratios = spec.ratios(0);
        assert_relative_eq!(ratios[0], 1.0);
        assert_relative_eq!(ratios[1], 1.259_921, epsilon = 1e-5);
        assert_relative_eq!(ratios[2], 1.498_307, epsilon = 1e-5);
    }

    #[test]
    fn test_chromatic_adds_key_offset() {
        assert_eq!(quantize_to_scale(4, Scale::Chromatic, Key::new(2)), 6);
        assert_eq!(quantize_to_scale(-12, Scale::Chromatic, Key::new(11)), -1);
    }

    #[test]
    fn test_quantize_tie_favours_higher() {
        assert_eq!(quantize_to_scale(3, Scale::Major, Key::C), 4);
        assert_eq!(quantize_to_scale(1, Scale::Major, Key::C), 2);
    }

    #[test]
    fn test_quantize_nearest() {
        assert_eq!(quantize_to_scale(4, Scale::Major, Key::C), 4);
        assert_eq!(quantize_to_scale(6, Scale::NaturalMinor, Key::C), 7);
        assert_eq!(quantize_to_scale(-1, Scale::Major, Key::C), -1);
        assert_eq!(quantize_to_scale(-2, Scale::PentatonicMajor, Key::C), -3);
    }

    #[test]
    fn test_quantize_respects_key() {
        // D major: D E F# G A B C#
        assert_eq!(quantize_to_scale(0, Scale::Major, Key::new(2)), 1);
        assert_eq!(quantize_to_scale(5, Scale::Major, Key::new(2)), 6);
    }

    #[test]
    fn test_quantized_values_are_in_scale() {
        for &scale in &Scale::all()[1..] {
            for key in 0..12 {
                let key = Key::new(key);
                for interval in -24..=24 {
                    let q = quantize_to_scale(interval, scale, key);
                    assert!(scale.contains(q, key));
                    assert!((q - interval).abs() <= 2);
                }
            }
        }
    }

    #[test]
    fn test_discretizers_cover_range() {
        assert_eq!(ChordArchetype::from_normalized(0.0), ChordArchetype::Unison);
        assert_eq!(ChordArchetype::from_normalized(1.0), ChordArchetype::Augmented);
        assert_eq!(Key::from_normalized(0.0), Key::C);
        assert_eq!(Key::from_normalized(1.0).semitone(), 11);
        assert_eq!(Scale::from_normalized(0.0), Scale::Chromatic);
        assert_eq!(Scale::from_normalized(1.0), Scale::PentatonicMinor);
        assert_eq!(Scale::from_normalized(f32::NAN), Scale::Chromatic);
    }

    #[test]
    fn test_normalized_round_trip() {
        for &chord in ChordArchetype::all() {
            assert_eq!(ChordArchetype::from_normalized(chord.to_normalized()), chord);
        }
        for &scale in Scale::all() {
            assert_eq!(Scale::from_normalized(scale.to_normalized()), scale);
        }
        for k in 0..12 {
            assert_eq!(Key::from_normalized(Key::new(k).to_normalized()), Key::new(k));
        }
    }
}
