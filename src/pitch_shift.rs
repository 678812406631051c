//! Streaming phase-vocoder pitch shifter, one sample in and one sample out.

use std::f32::consts::TAU;

use rustfft::{num_complex::Complex32, num_traits::Zero};

use crate::{
    fft::{fill_right_part_of_spectrum, Fft},
    float::{flush_denormal, Float},
    ring_buffer::{OverlappedAddable, RingBuffer},
    windows::{hann_window, overlap_gain},
};

pub const OVERLAP_FACTOR: usize = 4;

pub const MIN_RATIO: f32 = 0.25;
pub const MAX_RATIO: f32 = 4.0;

const NO_SOURCE: usize = usize::MAX;

/// Input at or below this level counts as silence when locating an onset.
const SILENCE_THRESHOLD: f32 = 1.0e-6;
/// A bin this quiet in the previous frame has no phase worth continuing.
const MAGNITUDE_FLOOR: f32 = 1.0e-6;

pub struct PitchShifter {
    window_size: usize,
    hop_size: usize,
    fft: Fft,
    window: Vec<f32>,
    output_scale: f32,

    input_ring: RingBuffer<f32>,
    output_ring: RingBuffer<f32>,

    frame: Vec<f32>,
    spectrum: Vec<Complex32>,

    analysis_magnitudes: Vec<f32>,
    analysis_phases: Vec<f32>,
    analysis_frequencies: Vec<f32>,
    prev_input_phases: Vec<f32>,

    synthesis_magnitudes: Vec<f32>,
    synthesis_frequencies: Vec<f32>,
    synthesis_sources: Vec<usize>,
    synthesis_phases: Vec<f32>,
    prev_output_phases: Vec<f32>,
    prev_magnitudes: Vec<f32>,
    leading_silence: usize,

    is_peak: Vec<bool>,
    nearest_peak: Vec<usize>,

    ratio: f32,
    phase_locking: bool,
}

impl PitchShifter {
    /// Allocates every buffer the shifter will ever use. `window_size` must be
    /// a power of two of at least 16 samples.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size.is_power_of_two() && window_size >= 16);

        let hop_size = window_size / OVERLAP_FACTOR;
        let num_bins = window_size / 2 + 1;
        let window: Vec<f32> = hann_window(window_size);
        let output_scale = 1.0 / (window_size as f32 * overlap_gain(&window, hop_size));

        let mut shifter = Self {
            window_size,
            hop_size,
            fft: Fft::new(window_size),
            window,
            output_scale,
            input_ring: RingBuffer::new(window_size, 0.0),
            output_ring: RingBuffer::new(window_size, 0.0),
            frame: vec![0.0; window_size],
            spectrum: vec![Complex32::zero(); window_size],
            analysis_magnitudes: vec![0.0; num_bins],
            analysis_phases: vec![0.0; num_bins],
            analysis_frequencies: vec![0.0; num_bins],
            prev_input_phases: vec![0.0; num_bins],
            synthesis_magnitudes: vec![0.0; num_bins],
            synthesis_frequencies: vec![0.0; num_bins],
            synthesis_sources: vec![NO_SOURCE; num_bins],
            synthesis_phases: vec![0.0; num_bins],
            prev_output_phases: vec![0.0; num_bins],
            prev_magnitudes: vec![0.0; num_bins],
            leading_silence: 0,
            is_peak: vec![false; num_bins],
            nearest_peak: vec![0; num_bins],
            ratio: 1.0,
            phase_locking: false,
        };
        shifter.reset();
        shifter
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Input-to-output delay in samples. A frame can only be resynthesized
    /// once its last input sample has arrived, and its first hop is complete
    /// from that moment on, so every output sample trails its input by
    /// `window_size - 1`, whatever the ratio.
    pub fn latency_samples(&self) -> usize {
        self.window_size - 1
    }

    pub fn set_phase_locking(&mut self, enabled: bool) {
        self.phase_locking = enabled;
    }

    pub fn phase_locking(&self) -> bool {
        self.phase_locking
    }

    /// Clears all phase and accumulation state. Buffers are kept.
    pub fn reset(&mut self) {
        self.input_ring.discard_all();
        self.input_ring.fill(self.window_size - self.hop_size, 0.0);
        self.output_ring.discard_all();
        self.output_ring.fill(self.window_size - 1, 0.0);

        self.prev_input_phases.fill(0.0);
        self.prev_output_phases.fill(0.0);
        self.prev_magnitudes.fill(0.0);
    }

    /// Pushes one input sample and returns one output sample. `ratio` is
    /// latched at the next frame boundary and must already be clamped to
    /// `[MIN_RATIO, MAX_RATIO]`.
    #[inline]
    pub fn process_sample(&mut self, input: f32, ratio: f32) -> f32 {
        self.ratio = ratio;
        self.input_ring.push(input);

        if self.input_ring.is_full() {
            self.input_ring.read(&mut self.frame);
            self.input_ring.discard(self.hop_size);
            self.process_frame();
        }

        self.output_ring.pop().unwrap_or(0.0)
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32], ratio: f32) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.process_sample(*x, ratio);
        }
    }

    fn process_frame(&mut self) {
        // A frame that starts in silence holds an onset. Its phases are taken
        // from the analysis so the transient stays where it was, and nothing
        // is synthesized ahead of it.
        self.leading_silence = self
            .frame
            .iter()
            .position(|x| x.abs() > SILENCE_THRESHOLD)
            .unwrap_or(self.window_size);
        let onset = self.leading_silence > 0;

        self.analyze();
        self.shift_bins();
        self.integrate_phases(onset);
        if self.phase_locking && !onset {
            self.lock_phases();
        }
        self.synthesize();
    }

    /// Phase advance of bin `k` over one hop, reduced modulo a full turn
    /// before converting to float.
    #[inline]
    fn bin_advance(&self, k: usize) -> f32 {
        ((k * self.hop_size) % self.window_size) as f32 * TAU / self.window_size as f32
    }

    fn analyze(&mut self) {
        // Rotate by half a window so the frame centre sits at time zero; bins of
        // one partial then share a phase instead of alternating by pi.
        let half = self.window_size / 2;
        for (i, (&s, &w)) in self.frame.iter().zip(self.window.iter()).enumerate() {
            self.spectrum[(i + half) % self.window_size] = Complex32::new(s * w, 0.0);
        }
        self.fft.forward(&mut self.spectrum);

        let bins_per_radian = self.window_size as f32 / (self.hop_size as f32 * TAU);
        for k in 0..self.analysis_magnitudes.len() {
            let (magnitude, phase) = self.spectrum[k].to_polar();
            let deviation = wrap_phase(phase - self.prev_input_phases[k] - self.bin_advance(k));
            self.prev_input_phases[k] = phase;

            self.analysis_magnitudes[k] = flush_denormal(magnitude);
            self.analysis_phases[k] = phase;
            self.analysis_frequencies[k] = k as f32 + deviation * bins_per_radian;
        }
    }

    fn shift_bins(&mut self) {
        let half = self.window_size / 2;
        let ratio = self.ratio;

        for k in 0..=half {
            let source = (k as f32 / ratio).round() as usize;
            if source > half {
                self.synthesis_magnitudes[k] = 0.0;
                self.synthesis_frequencies[k] = k as f32;
                self.synthesis_sources[k] = NO_SOURCE;
                continue;
            }
            self.synthesis_magnitudes[k] = self.analysis_magnitudes[source];
            self.synthesis_frequencies[k] = self.analysis_frequencies[source] * ratio;
            self.synthesis_sources[k] = source;
        }
    }

    fn integrate_phases(&mut self, onset: bool) {
        let radians_per_bin = TAU * self.hop_size as f32 / self.window_size as f32;

        for k in 0..self.synthesis_frequencies.len() {
            let phase = if onset || self.prev_magnitudes[k] < MAGNITUDE_FLOOR {
                self.analysis_phases[k]
            } else {
                let deviation = self.synthesis_frequencies[k] - k as f32;
                let advance = self.bin_advance(k) + deviation * radians_per_bin;
                wrap_phase(self.prev_output_phases[k] + advance)
            };
            self.prev_output_phases[k] = phase;
            self.synthesis_phases[k] = phase;
            self.prev_magnitudes[k] = self.synthesis_magnitudes[k];
        }
    }

    /// Identity phase locking: bins around a spectral peak keep the phase
    /// offset they had to that peak in the analysis frame.
    fn lock_phases(&mut self) {
        let num_bins = self.synthesis_magnitudes.len();
        let mags = &self.synthesis_magnitudes;

        self.is_peak[0] = true;
        self.is_peak[num_bins - 1] = true;
        for j in 1..num_bins - 1 {
            self.is_peak[j] = mags[j] > mags[j - 1] && mags[j] >= mags[j + 1];
        }

        let mut last_peak = 0;
        for j in 0..num_bins {
            if self.is_peak[j] {
                last_peak = j;
            }
            self.nearest_peak[j] = last_peak;
        }
        let mut next_peak = num_bins - 1;
        for j in (0..num_bins).rev() {
            if self.is_peak[j] {
                next_peak = j;
            }
            if next_peak - j < j - self.nearest_peak[j] {
                self.nearest_peak[j] = next_peak;
            }
        }

        for j in 0..num_bins {
            let peak = self.nearest_peak[j];
            let (src_j, src_peak) = (self.synthesis_sources[j], self.synthesis_sources[peak]);
            if peak == j || src_j == NO_SOURCE || src_peak == NO_SOURCE {
                continue;
            }
            let offset = self.analysis_phases[src_j] - self.analysis_phases[src_peak];
            self.synthesis_phases[j] = wrap_phase(self.prev_output_phases[peak] + offset);
        }
    }

    fn synthesize(&mut self) {
        let half = self.window_size / 2;

        for k in 0..=half {
            let magnitude = self.synthesis_magnitudes[k];
            self.spectrum[k] = if magnitude > 0.0 {
                Complex32::from_polar(magnitude, self.synthesis_phases[k])
            } else {
                Complex32::zero()
            };
        }
        self.spectrum[0].im = 0.0;
        self.spectrum[half].im = 0.0;
        fill_right_part_of_spectrum(&mut self.spectrum);

        self.fft.inverse(&mut self.spectrum);

        for (i, (y, &w)) in self.frame.iter_mut().zip(self.window.iter()).enumerate() {
            let x = self.spectrum[(i + half) % self.window_size].re;
            *y = flush_denormal(x * w * self.output_scale);
        }
        self.frame[..self.leading_silence].fill(0.0);

        self.output_ring
            .overlap_add(&self.frame, self.window_size - self.hop_size);
    }
}

pub fn wrap_phase<T: Float>(phase: T) -> T {
    if phase >= T::zero() {
        (phase + T::PI()) % T::TAU() - T::PI()
    } else {
        (phase - T::PI()) % T::TAU() + T::PI()
    }
}

/// Clamps a pitch ratio into the range the shifter is stable for.
pub fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() {
        ratio.clamp(MIN_RATIO, MAX_RATIO)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (TAU * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    /// Dominant frequency estimated from positive-going zero crossings.
    fn zero_crossing_freq(buf: &[f32], sample_rate: f32) -> f32 {
        let crossings: Vec<usize> = (1..buf.len())
            .filter(|&i| buf[i - 1] < 0.0 && buf[i] >= 0.0)
            .collect();
        let periods = (crossings.len() - 1) as f32;
        let span = (crossings[crossings.len() - 1] - crossings[0]) as f32;
        sample_rate * periods / span
    }

    #[test]
    fn test_wrap_phase() {
        let pi = std::f32::consts::PI;
        assert_abs_diff_eq!(wrap_phase(3.0 * pi).abs(), pi, epsilon = 1e-5);
        assert_abs_diff_eq!(wrap_phase(-0.5f32), -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(wrap_phase(TAU + 0.25), 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(wrap_phase(-TAU - 0.25), -0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_clamp_ratio() {
        assert_eq!(clamp_ratio(0.0), MIN_RATIO);
        assert_eq!(clamp_ratio(100.0), MAX_RATIO);
        assert_eq!(clamp_ratio(f32::NAN), 1.0);
        assert_eq!(clamp_ratio(1.5), 1.5);
    }

    #[test]
    fn test_latency_is_window_minus_one() {
        let shifter = PitchShifter::new(1024);
        assert_eq!(shifter.hop_size(), 256);
        assert_eq!(shifter.latency_samples(), 1023);
    }

    #[test]
    fn test_impulse_arrives_at_latency() {
        let mut shifter = PitchShifter::new(256);
        let latency = shifter.latency_samples();

        let mut input = vec![0.0; 2048];
        input[0] = 1.0;
        let mut output = vec![0.0; 2048];
        shifter.process(&input, &mut output, 1.0);

        for &y in &output[..latency] {
            assert!(y.abs() < 1e-4);
        }
        assert_abs_diff_eq!(output[latency], 1.0, epsilon = 1e-3);
        for &y in &output[latency + 1..] {
            assert!(y.abs() < 1e-3);
        }
    }

    #[test]
    fn test_impulse_onset_is_ratio_independent() {
        let onset = 100;
        for ratio in [0.5, 0.75, 1.5, 2.0] {
            for phase_locking in [false, true] {
                let mut shifter = PitchShifter::new(1024);
                shifter.set_phase_locking(phase_locking);
                let arrival = onset + shifter.latency_samples();

                let mut input = vec![0.0; 4096];
                input[onset] = 1.0;
                let mut output = vec![0.0; input.len()];
                shifter.process(&input, &mut output, ratio);

                assert!(
                    output[..arrival].iter().all(|y| y.abs() < 1e-6),
                    "ratio={ratio}"
                );
                let peak = (0..output.len())
                    .max_by(|&a, &b| output[a].abs().total_cmp(&output[b].abs()))
                    .unwrap();
                assert_eq!(peak, arrival, "ratio={ratio}");
                assert!(output[arrival] > 0.4, "ratio={ratio}");
                if ratio >= 1.0 {
                    assert_abs_diff_eq!(output[arrival], 1.0, epsilon = 1e-3);
                }
            }
        }
    }

    #[test]
    fn test_onset_after_silence_keeps_latency() {
        let mut shifter = PitchShifter::new(512);
        let latency = shifter.latency_samples();

        let mut input = sine(400.0, 48000.0, 6000);
        input[3000..4000].fill(0.0);
        input[4000] = 0.8;
        input[4001..].fill(0.0);
        let mut output = vec![0.0; input.len()];
        shifter.process(&input, &mut output, 1.5);

        // The second onset is preceded by a full window of silence.
        let quiet = 3000 + latency + 512..4000 + latency;
        assert!(output[quiet].iter().all(|y| y.abs() < 1e-6));
        assert_abs_diff_eq!(output[4000 + latency], 0.8, epsilon = 1e-3);
    }

    #[test]
    fn test_unity_ratio_reconstructs_input() {
        for phase_locking in [false, true] {
            let mut shifter = PitchShifter::new(1024);
            shifter.set_phase_locking(phase_locking);
            let latency = shifter.latency_samples();

            let input = sine(440.0, 44100.0, 16384);
            let mut output = vec![0.0; input.len()];
            shifter.process(&input, &mut output, 1.0);

            let errors: Vec<f32> = (latency..input.len())
                .map(|i| output[i] - input[i - latency])
                .collect();
            assert!(power(&errors) < 1e-3, "phase_locking={phase_locking}");
        }
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let sample_rate = 44100.0;
        let mut shifter = PitchShifter::new(2048);
        let input = sine(220.0, sample_rate, 44100);
        let mut output = vec![0.0; input.len()];
        shifter.process(&input, &mut output, 2.0);

        let steady = &output[8192..];
        let freq = zero_crossing_freq(steady, sample_rate);
        assert!((freq - 440.0).abs() < 10.0, "estimated {freq}");
        assert!(power(steady) > 0.1);
    }

    #[test]
    fn test_fifth_down_lowers_frequency() {
        let sample_rate = 44100.0;
        let mut shifter = PitchShifter::new(2048);
        shifter.set_phase_locking(true);
        let input = sine(660.0, sample_rate, 44100);
        let mut output = vec![0.0; input.len()];
        let ratio = crate::float::semitones_to_ratio(-7.0);
        shifter.process(&input, &mut output, ratio);

        let freq = zero_crossing_freq(&output[8192..], sample_rate);
        assert!((freq - 660.0 * ratio).abs() < 10.0, "estimated {freq}");
    }

    #[test]
    fn test_output_length_matches_input_across_block_sizes() {
        let input = sine(300.0, 48000.0, 5000);
        let mut whole = vec![0.0; input.len()];
        PitchShifter::new(512).process(&input, &mut whole, 1.5);

        let mut shifter = PitchShifter::new(512);
        let mut chunked = vec![0.0; input.len()];
        for (x, y) in input.chunks(37).zip(chunked.chunks_mut(37)) {
            shifter.process(x, y, 1.5);
        }
        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let input = sine(500.0, 48000.0, 3000);
        let mut first = vec![0.0; input.len()];
        let mut shifter = PitchShifter::new(512);
        shifter.process(&input, &mut first, 0.75);

        shifter.reset();
        let mut second = vec![0.0; input.len()];
        shifter.process(&input, &mut second, 0.75);
        assert_eq!(first, second);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut shifter = PitchShifter::new(512);
        let input = vec![0.0; 4096];
        let mut output = vec![1.0; 4096];
        shifter.process(&input, &mut output, 3.0);
        assert!(output.iter().all(|&y| y == 0.0));
    }
}
