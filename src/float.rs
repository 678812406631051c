use rustfft::{num_traits, FftNum};

pub trait Float: FftNum + num_traits::Float + num_traits::FloatConst {}

impl<T: FftNum + num_traits::Float + num_traits::FloatConst> Float for T {}

/// Primitive-to-float conversion. Only NaN-producing for values no float
/// can represent.
#[inline]
pub fn cast<T: Float, U: num_traits::ToPrimitive>(x: U) -> T {
    <T as num_traits::NumCast>::from(x).unwrap_or_else(T::nan)
}

/// Magnitudes below this are treated as denormal and flushed to zero.
pub const DENORMAL_THRESHOLD: f32 = 1.0e-15;

#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        x
    }
}

/// Maps NaN and infinities to silence.
#[inline]
pub fn sanitize(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    (semitones / 12.0).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flush_denormal() {
        assert_eq!(flush_denormal(1.0e-30), 0.0);
        assert_eq!(flush_denormal(-1.0e-20), 0.0);
        assert_eq!(flush_denormal(0.25), 0.25);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(f32::NAN), 0.0);
        assert_eq!(sanitize(f32::INFINITY), 0.0);
        assert_eq!(sanitize(-0.5), -0.5);
    }

    #[test]
    fn test_semitones_to_ratio() {
        assert_relative_eq!(semitones_to_ratio(0.0), 1.0);
        assert_relative_eq!(semitones_to_ratio(12.0), 2.0);
        assert_relative_eq!(semitones_to_ratio(-12.0), 0.5);
        assert_relative_eq!(semitones_to_ratio(7.0), 1.498_307, epsilon = 1e-5);
    }
}
