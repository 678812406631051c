use crate::{Error, Result};

pub const MIN_SAMPLE_RATE: f64 = 8000.0;
pub const MAX_SAMPLE_RATE: f64 = 384000.0;

/// Settings fixed at `prepare` time.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizerConfig {
    pub smoothing_time_ms: f32,
    /// Halves the analysis window, trading frequency resolution for latency.
    pub low_latency: bool,
    /// Master mix below this is treated as bypass.
    pub bypass_threshold: f32,
    pub limiter_ceiling: f32,
    pub diagnostics_capacity: usize,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            smoothing_time_ms: 10.0,
            low_latency: false,
            bypass_threshold: 1.0e-4,
            limiter_ceiling: 0.95,
            diagnostics_capacity: 256,
        }
    }
}

impl HarmonizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_time_ms.is_finite() && self.smoothing_time_ms > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "smoothing_time_ms must be positive, got {}",
                self.smoothing_time_ms
            )));
        }
        if !(self.bypass_threshold >= 0.0 && self.bypass_threshold < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bypass_threshold {} out of range [0, 1)",
                self.bypass_threshold
            )));
        }
        if !(self.limiter_ceiling > 0.0 && self.limiter_ceiling <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "limiter_ceiling {} out of range (0, 1]",
                self.limiter_ceiling
            )));
        }
        if self.diagnostics_capacity == 0 {
            return Err(Error::InvalidConfig(
                "diagnostics_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn window_size(&self, sample_rate: f64) -> usize {
        let base = if self.low_latency { 1024 } else { 2048 };
        if sample_rate > 96000.0 {
            base * 2
        } else {
            base
        }
    }
}

pub fn validate_sample_rate(sample_rate: f64) -> Result<()> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(Error::InvalidSampleRate(sample_rate));
    }
    Ok(())
}
