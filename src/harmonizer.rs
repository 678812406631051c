use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::{
    chords::CHORD_NUM_VOICES,
    config::{validate_sample_rate, HarmonizerConfig},
    diagnostics::{diagnostics_channel, DiagnosticEvent, DiagnosticsDrain, DiagnosticsProducer},
    float::{flush_denormal, sanitize},
    params::{ControlState, HarmonizerController, ParamMap, VoiceSettings},
    pitch_shift::{clamp_ratio, PitchShifter},
    smoothing::SmoothedParam,
    Error, Result,
};

pub const NUM_VOICES: usize = CHORD_NUM_VOICES;

/// A voice with this little gain and this close to unity pitch contributes
/// nothing, so its shifter is not run.
const SILENT_GAIN: f32 = 1.0e-6;
const UNITY_TOLERANCE: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonizerState {
    Bypassed,
    Active,
}

struct Voice {
    pitch_ratio: SmoothedParam,
    volume: SmoothedParam,
    shifter: Option<PitchShifter>,
}

impl Voice {
    fn new(ratio: f32, volume: f32) -> Self {
        Self {
            pitch_ratio: SmoothedParam::new(ratio),
            volume: SmoothedParam::new(volume),
            shifter: None,
        }
    }
}

#[derive(Default)]
struct BlockCounters {
    limited: u32,
    non_finite: u32,
}

pub struct Harmonizer {
    config: HarmonizerConfig,
    voices: [Voice; NUM_VOICES],
    master_mix: SmoothedParam,
    controls: Arc<ControlState>,
    controller: HarmonizerController,
    diagnostics: DiagnosticsProducer,
    drain: Option<DiagnosticsDrain>,
    state: HarmonizerState,
    sample_rate: f64,
    max_block_samples: usize,
    latency: usize,
    prepared: bool,
}

impl Harmonizer {
    pub fn new(config: HarmonizerConfig) -> Result<Self> {
        config.validate()?;

        let defaults = VoiceSettings::default();
        let voices = [0, 1, 2].map(|i| Voice::new(defaults.ratios[i], defaults.volumes[i]));
        let master_mix = SmoothedParam::new(defaults.master_mix);
        let controls = Arc::new(ControlState::new());
        let controller = HarmonizerController::new(
            controls.clone(),
            voices.each_ref().map(|v| v.pitch_ratio.handle()),
            voices.each_ref().map(|v| v.volume.handle()),
            master_mix.handle(),
            config.bypass_threshold,
        );
        let (diagnostics, drain) = diagnostics_channel(config.diagnostics_capacity);

        Ok(Self {
            config,
            voices,
            master_mix,
            controls,
            controller,
            diagnostics,
            drain: Some(drain),
            state: HarmonizerState::Bypassed,
            sample_rate: 0.0,
            max_block_samples: 0,
            latency: 0,
            prepared: false,
        })
    }

    pub fn config(&self) -> &HarmonizerConfig {
        &self.config
    }

    pub fn controller(&self) -> HarmonizerController {
        self.controller.clone()
    }

    /// The diagnostics drain. Only the first call returns it.
    pub fn take_diagnostics(&mut self) -> Option<DiagnosticsDrain> {
        self.drain.take()
    }

    pub fn update_parameters(&self, params: &ParamMap) {
        self.controller.update_parameters(params);
    }

    /// Allocates the shifters for `sample_rate` and settles every smoothed
    /// parameter on its current target. Must be called off the audio thread.
    pub fn prepare(&mut self, sample_rate: f64, max_block_samples: usize) -> Result<()> {
        validate_sample_rate(sample_rate)?;
        if max_block_samples == 0 {
            return Err(Error::InvalidBlockSize(max_block_samples));
        }

        let window_size = self.config.window_size(sample_rate);
        let phase_locking = self.controls.phase_locking.load(Ordering::Relaxed);
        for voice in self.voices.iter_mut() {
            let reusable = voice
                .shifter
                .as_ref()
                .is_some_and(|s| s.window_size() == window_size);
            if !reusable {
                voice.shifter = Some(PitchShifter::new(window_size));
            }
            if let Some(shifter) = voice.shifter.as_mut() {
                shifter.reset();
                shifter.set_phase_locking(phase_locking);
            }

            voice
                .pitch_ratio
                .set_smoothing_time(self.config.smoothing_time_ms, sample_rate as f32);
            voice
                .volume
                .set_smoothing_time(self.config.smoothing_time_ms, sample_rate as f32);
            let ratio = voice.pitch_ratio.target();
            voice.pitch_ratio.snap(ratio);
            let volume = voice.volume.target();
            voice.volume.snap(volume);
        }
        self.master_mix
            .set_smoothing_time(self.config.smoothing_time_ms, sample_rate as f32);
        let mix = self.master_mix.target();
        self.master_mix.snap(mix);

        self.state = if mix < self.config.bypass_threshold {
            HarmonizerState::Bypassed
        } else {
            HarmonizerState::Active
        };
        self.sample_rate = sample_rate;
        self.max_block_samples = max_block_samples;
        self.latency = window_size - 1;
        self.prepared = true;

        log::info!(
            "harmonizer prepared: {} Hz, block {}, window {}, latency {} samples",
            sample_rate,
            max_block_samples,
            window_size,
            self.latency
        );
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block_samples(&self) -> usize {
        self.max_block_samples
    }

    pub fn state(&self) -> HarmonizerState {
        self.state
    }

    /// Constant for a prepared harmonizer regardless of ratios, voice count
    /// or mix. Zero before `prepare`.
    pub fn latency_samples(&self) -> usize {
        self.latency
    }

    pub fn reset(&mut self) {
        for shifter in self.voices.iter_mut().filter_map(|v| v.shifter.as_mut()) {
            shifter.reset();
        }
        self.diagnostics.push(DiagnosticEvent::Reset);
    }

    /// Processes `min(input.len(), output.len())` samples. Before `prepare`
    /// the input is copied through unchanged.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let len = input.len().min(output.len());
        if !self.prepared {
            output[..len].copy_from_slice(&input[..len]);
            return;
        }

        let num_voices = self.begin_block();
        let mut counters = BlockCounters::default();
        for (y, &x) in output[..len].iter_mut().zip(input[..len].iter()) {
            *y = self.process_sample(x, num_voices, &mut counters);
        }
        self.end_block(&counters);
    }

    /// Same as [`process_block`](Self::process_block) on a single buffer.
    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        if !self.prepared {
            return;
        }

        let num_voices = self.begin_block();
        let mut counters = BlockCounters::default();
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample, num_voices, &mut counters);
        }
        self.end_block(&counters);
    }

    /// Reads the selector fields once. Returns the active voice count.
    fn begin_block(&mut self) -> usize {
        let num_voices = self
            .controls
            .num_voices
            .load(Ordering::Relaxed)
            .clamp(1, NUM_VOICES);
        let phase_locking = self.controls.phase_locking.load(Ordering::Relaxed);
        for shifter in self.voices.iter_mut().filter_map(|v| v.shifter.as_mut()) {
            shifter.set_phase_locking(phase_locking);
        }
        num_voices
    }

    fn end_block(&mut self, counters: &BlockCounters) {
        if counters.limited > 0 {
            self.diagnostics.push(DiagnosticEvent::LimiterEngaged {
                samples: counters.limited,
            });
        }
        if counters.non_finite > 0 {
            self.diagnostics.push(DiagnosticEvent::NonFiniteInput {
                samples: counters.non_finite,
            });
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f32, num_voices: usize, counters: &mut BlockCounters) -> f32 {
        let dry = if input.is_finite() {
            input
        } else {
            counters.non_finite += 1;
            0.0
        };

        let mix = self.master_mix.tick();
        if mix < self.config.bypass_threshold {
            if self.state == HarmonizerState::Active {
                self.state = HarmonizerState::Bypassed;
                self.diagnostics.push(DiagnosticEvent::BypassEntered);
            }
            return dry;
        }
        if self.state == HarmonizerState::Bypassed {
            self.state = HarmonizerState::Active;
            for shifter in self.voices.iter_mut().filter_map(|v| v.shifter.as_mut()) {
                shifter.reset();
            }
            self.diagnostics.push(DiagnosticEvent::BypassExited);
        }

        let mut wet = 0.0;
        for (slot, voice) in self.voices.iter_mut().enumerate() {
            let ratio = clamp_ratio(voice.pitch_ratio.tick());
            let volume = voice.volume.tick();
            let enabled = slot < num_voices;
            if enabled && volume.abs() < SILENT_GAIN && (ratio - 1.0).abs() < UNITY_TOLERANCE {
                continue;
            }

            let gain = if enabled { volume } else { 0.0 };
            if let Some(shifter) = voice.shifter.as_mut() {
                wet += shifter.process_sample(dry, ratio) * gain;
            }
        }

        let mixed = dry * (1.0 - mix) + wet * mix;
        self.limit(mixed, counters)
    }

    #[inline]
    fn limit(&self, x: f32, counters: &mut BlockCounters) -> f32 {
        let ceiling = self.config.limiter_ceiling;
        let x = sanitize(x);
        if x.abs() > ceiling {
            counters.limited += 1;
            x.clamp(-ceiling, ceiling)
        } else {
            flush_denormal(x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamIndex;

    fn prepared() -> Harmonizer {
        let mut harmonizer = Harmonizer::new(HarmonizerConfig::default()).unwrap();
        harmonizer.prepare(44100.0, 512).unwrap();
        harmonizer
    }

    #[test]
    fn test_unprepared_passes_through() {
        let mut harmonizer = Harmonizer::new(HarmonizerConfig::default()).unwrap();
        let input = [0.1, -0.2, 0.3, 2.0];
        let mut output = [0.0; 4];
        harmonizer.process_block(&input, &mut output);
        assert_eq!(output, input);
        assert_eq!(harmonizer.latency_samples(), 0);
    }

    #[test]
    fn test_prepare_rejects_bad_arguments() {
        let mut harmonizer = Harmonizer::new(HarmonizerConfig::default()).unwrap();
        assert_eq!(
            harmonizer.prepare(100.0, 512),
            Err(Error::InvalidSampleRate(100.0))
        );
        assert_eq!(
            harmonizer.prepare(44100.0, 0),
            Err(Error::InvalidBlockSize(0))
        );
        assert!(!harmonizer.is_prepared());
    }

    #[test]
    fn test_latency_after_prepare() {
        let harmonizer = prepared();
        assert_eq!(harmonizer.latency_samples(), 2047);
        assert_eq!(harmonizer.state(), HarmonizerState::Active);
    }

    #[test]
    fn test_zero_mix_is_bypass() {
        let mut harmonizer = prepared();
        harmonizer
            .controller()
            .set_parameter(ParamIndex::MasterMix, 0.0);

        let input: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.05).sin() * 0.9).collect();
        let mut output = vec![0.0; input.len()];
        harmonizer.process_block(&input, &mut output);

        assert_eq!(output, input);
        assert_eq!(harmonizer.state(), HarmonizerState::Bypassed);

        let mut drain = harmonizer.take_diagnostics().unwrap();
        assert_eq!(drain.pop(), Some(DiagnosticEvent::BypassEntered));
    }

    #[test]
    fn test_limiter_bounds_output() {
        let mut harmonizer = prepared();
        let controller = harmonizer.controller();
        controller.set_parameter(ParamIndex::MasterMix, 1.0);
        controller.set_parameter(ParamIndex::Voice2Volume, 1.0);
        controller.set_parameter(ParamIndex::Voice3Volume, 1.0);

        let input: Vec<f32> = (0..8192)
            .map(|i| if (i / 50) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let mut output = vec![0.0; input.len()];
        for (x, y) in input.chunks(512).zip(output.chunks_mut(512)) {
            harmonizer.process_block(x, y);
        }

        assert!(output.iter().all(|y| y.is_finite() && y.abs() <= 0.95));
    }

    #[test]
    fn test_non_finite_input_is_silenced() {
        let mut harmonizer = prepared();
        let input = [f32::NAN, f32::INFINITY, 0.5, f32::NEG_INFINITY];
        let mut output = [0.0; 4];
        harmonizer.process_block(&input, &mut output);
        assert!(output.iter().all(|y| y.is_finite()));

        let mut drain = harmonizer.take_diagnostics().unwrap();
        assert_eq!(
            drain.pop(),
            Some(DiagnosticEvent::NonFiniteInput { samples: 3 })
        );
    }

    #[test]
    fn test_in_place_matches_block() {
        let mut a = prepared();
        let mut b = prepared();
        let input: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.031).sin() * 0.5).collect();

        let mut out_a = vec![0.0; input.len()];
        a.process_block(&input, &mut out_a);
        let mut out_b = input.clone();
        b.process_in_place(&mut out_b);

        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_reset_is_deterministic() {
        let mut harmonizer = prepared();
        let input: Vec<f32> = (0..3000).map(|i| (i as f32 * 0.02).sin() * 0.5).collect();

        let mut first = vec![0.0; input.len()];
        harmonizer.process_block(&input, &mut first);
        harmonizer.reset();
        let mut second = vec![0.0; input.len()];
        harmonizer.process_block(&input, &mut second);

        assert_eq!(first, second);
    }

    fn run_blocks(harmonizer: &mut Harmonizer, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        for (x, y) in input.chunks(512).zip(output.chunks_mut(512)) {
            harmonizer.process_block(x, y);
        }
        output
    }

    #[test]
    fn test_muted_shifted_voice_keeps_running() {
        let input: Vec<f32> = (0..8192).map(|i| (i as f32 * 0.037).sin() * 0.4).collect();

        let mut muted = prepared();
        muted
            .controller()
            .set_parameter(ParamIndex::Voice2Volume, 0.0);
        let mut steady = prepared();
        steady
            .controller()
            .set_parameter(ParamIndex::Voice2Volume, 0.6);
        assert!((muted.controller().settings().ratios[1] - 1.0).abs() > 0.1);

        run_blocks(&mut muted, &input);
        run_blocks(&mut steady, &input);

        muted
            .controller()
            .set_parameter(ParamIndex::Voice2Volume, 0.6);
        // Long enough for the volume ramp to land exactly on its target.
        let settle: Vec<f32> = input.iter().cycle().take(16384).copied().collect();
        run_blocks(&mut muted, &settle);
        run_blocks(&mut steady, &settle);

        assert_eq!(run_blocks(&mut muted, &input), run_blocks(&mut steady, &input));
    }

    #[test]
    fn test_disabled_slots_keep_running() {
        let input: Vec<f32> = (0..8192).map(|i| (i as f32 * 0.029).sin() * 0.3).collect();

        let mut one = prepared();
        one.controller().set_parameter(ParamIndex::Voices, 0.0);
        let mut three = prepared();

        let first_one = run_blocks(&mut one, &input);
        let first_three = run_blocks(&mut three, &input);
        assert_ne!(first_one, first_three);

        one.controller().set_parameter(ParamIndex::Voices, 1.0);
        assert_eq!(run_blocks(&mut one, &input), run_blocks(&mut three, &input));
    }

    #[test]
    fn test_reprepare_keeps_parameters() {
        let mut harmonizer = prepared();
        harmonizer
            .controller()
            .set_parameter(ParamIndex::Voices, 0.0);
        harmonizer.prepare(48000.0, 256).unwrap();
        assert_eq!(harmonizer.controller().settings().num_voices, 1);
        assert_eq!(harmonizer.latency_samples(), 2047);
    }
}
