use std::sync::Arc;

use rustfft::{num_complex::Complex32, num_traits::Zero};

/// Forward/inverse plan pair with preallocated scratch, so that transforms on
/// the audio thread never allocate.
pub struct Fft {
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl Fft {
    pub fn new(size: usize) -> Self {
        let mut planner = rustfft::FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            forward,
            inverse,
            scratch: vec![Complex32::zero(); scratch_len],
        }
    }

    pub fn forward(&mut self, buffer: &mut [Complex32]) {
        self.forward.process_with_scratch(buffer, &mut self.scratch);
    }

    /// Unnormalized.
    pub fn inverse(&mut self, buffer: &mut [Complex32]) {
        self.inverse.process_with_scratch(buffer, &mut self.scratch);
    }
}

/// Mirrors bins `1..len/2` into the upper half as complex conjugates so the
/// inverse transform of the spectrum is real.
pub fn fill_right_part_of_spectrum(spectrum: &mut [Complex32]) {
    let len = spectrum.len();
    for i in 1..len / 2 {
        spectrum[len - i] = spectrum[i].conj();
    }
}
