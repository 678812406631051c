use crate::float::{cast, Float};

/// Periodic Hann window.
pub fn hann_window<T: Float>(size: usize) -> Vec<T> {
    (0..size)
        .map(|i| {
            cast::<T, _>(0.5) * (T::one() - (cast::<T, _>(i) * T::TAU() / cast(size)).cos())
        })
        .collect()
}

/// Sum of `window[n]^2` over all frames overlapping sample `n` at the given hop,
/// averaged over one hop. Constant for Hann at 75% overlap (1.5).
pub fn overlap_gain<T: Float>(window: &[T], hop_size: usize) -> T {
    let mut total = T::zero();
    for n in 0..hop_size {
        let mut i = n;
        while i < window.len() {
            total = total + window[i] * window[i];
            i += hop_size;
        }
    }
    total / cast(hop_size)
}
