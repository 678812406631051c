pub mod chords;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fft;
pub mod float;
pub mod harmonizer;
pub mod params;
pub mod pitch_shift;
pub mod ring_buffer;
pub mod smoothing;
pub mod windows;

pub use config::HarmonizerConfig;
pub use engine::{create_engine, Engine, EngineKind, HarmonizerEngine};
pub use error::{Error, Result};
pub use harmonizer::{Harmonizer, HarmonizerState};
pub use params::{HarmonizerController, ParamIndex, ParamMap, VoiceSettings};
pub use pitch_shift::PitchShifter;

/// RMS level of `buf`; zero for an empty buffer.
pub fn power<T: float::Float + std::iter::Sum>(buf: &[T]) -> T {
    if buf.is_empty() {
        return T::zero();
    }
    (buf.iter().map(|&x| x.powi(2)).sum::<T>() / float::cast(buf.len())).sqrt()
}
