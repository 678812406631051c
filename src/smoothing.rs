//! One-pole smoothed parameters. The audio thread owns a [`SmoothedParam`];
//! other threads write its target through a [`ParamHandle`].
//!
//! # Example
//!
//! ```
//! use voiche_harmonizer::smoothing::SmoothedParam;
//!
//! let mut gain = SmoothedParam::new(1.0);
//! gain.set_smoothing_time(10.0, 44100.0);
//!
//! let handle = gain.handle();
//! handle.set(0.5);
//!
//! # let mut buffer = [1.0f32; 64];
//! for sample in buffer.iter_mut() {
//!     *sample *= gain.tick();
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;

/// Residual distance at which the current value lands exactly on the target.
const SETTLE_EPSILON: f32 = 1.0e-7;

#[derive(Debug)]
struct SharedTarget {
    value: AtomicF32,
    snap_pending: AtomicBool,
}

/// Control-side view of a smoothed parameter.
#[derive(Debug, Clone)]
pub struct ParamHandle {
    shared: Arc<SharedTarget>,
}

impl ParamHandle {
    #[inline]
    pub fn set(&self, value: f32) {
        self.shared.value.store(value, Ordering::Relaxed);
    }

    /// Sets the target and asks the audio side to jump to it on its next tick.
    pub fn snap(&self, value: f32) {
        self.shared.value.store(value, Ordering::Relaxed);
        self.shared.snap_pending.store(true, Ordering::Release);
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.shared.value.load(Ordering::Relaxed)
    }
}

/// Audio-side exponential smoother.
///
/// `current = target + decay * (current - target)` on every tick, which
/// converges geometrically and never overshoots.
#[derive(Debug)]
pub struct SmoothedParam {
    shared: Arc<SharedTarget>,
    current: f32,
    decay: f32,
}

impl SmoothedParam {
    /// Starts settled at `initial` with no smoothing until
    /// [`set_smoothing_time`](Self::set_smoothing_time) is called.
    pub fn new(initial: f32) -> Self {
        Self {
            shared: Arc::new(SharedTarget {
                value: AtomicF32::new(initial),
                snap_pending: AtomicBool::new(false),
            }),
            current: initial,
            decay: 0.0,
        }
    }

    pub fn handle(&self) -> ParamHandle {
        ParamHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn set_smoothing_time(&mut self, time_ms: f32, sample_rate: f32) {
        let samples = time_ms * 0.001 * sample_rate;
        self.decay = if samples > 0.0 {
            (-1.0 / samples).exp()
        } else {
            0.0
        };
    }

    #[inline]
    pub fn decay(&self) -> f32 {
        self.decay
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.shared.value.store(value, Ordering::Relaxed);
    }

    pub fn snap(&mut self, value: f32) {
        self.shared.value.store(value, Ordering::Relaxed);
        self.shared.snap_pending.store(false, Ordering::Relaxed);
        self.current = value;
    }

    #[inline]
    pub fn tick(&mut self) -> f32 {
        let target = self.shared.value.load(Ordering::Relaxed);
        if self.shared.snap_pending.load(Ordering::Acquire) {
            self.shared.snap_pending.store(false, Ordering::Relaxed);
            self.current = target;
            return target;
        }

        let next = target + self.decay * (self.current - target);
        self.current = if (next - target).abs() < SETTLE_EPSILON {
            target
        } else {
            next
        };
        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.shared.value.load(Ordering::Relaxed)
    }

    pub fn is_smoothing(&self) -> bool {
        self.current != self.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decay_coefficient() {
        let mut p = SmoothedParam::new(0.0);
        p.set_smoothing_time(10.0, 48000.0);
        assert_relative_eq!(p.decay(), (-1.0f32 / 480.0).exp());
    }

    #[test]
    fn test_tick_approaches_target() {
        let mut p = SmoothedParam::new(0.0);
        p.set_smoothing_time(1.0, 48000.0);
        p.set(1.0);

        let first = p.tick();
        assert!(first > 0.0 && first < 1.0);

        for _ in 0..48000 {
            p.tick();
        }
        assert_eq!(p.current(), 1.0);
        assert!(!p.is_smoothing());
    }

    #[test]
    fn test_distance_never_increases() {
        let mut p = SmoothedParam::new(-0.7);
        p.set_smoothing_time(10.0, 44100.0);
        p.set(0.3);

        let mut last = (p.current() - 0.3).abs();
        for _ in 0..10000 {
            let d = (p.tick() - 0.3).abs();
            assert!(d <= last);
            last = d;
        }
    }

    #[test]
    fn test_snap_is_immediate() {
        let mut p = SmoothedParam::new(0.0);
        p.set_smoothing_time(10.0, 44100.0);
        p.snap(0.8);
        assert_eq!(p.current(), 0.8);
        assert_eq!(p.tick(), 0.8);
    }

    #[test]
    fn test_handle_snap_lands_on_next_tick() {
        let mut p = SmoothedParam::new(1.0);
        p.set_smoothing_time(10.0, 44100.0);
        let handle = p.handle();

        handle.snap(0.0);
        assert_eq!(p.current(), 1.0);
        assert_eq!(p.tick(), 0.0);
    }

    #[test]
    fn test_handle_set_is_visible_from_other_thread() {
        let p = SmoothedParam::new(0.0);
        let handle = p.handle();
        std::thread::spawn(move || handle.set(0.25))
            .join()
            .unwrap();
        assert_eq!(p.target(), 0.25);
    }

    #[test]
    fn test_zero_smoothing_time_jumps() {
        let mut p = SmoothedParam::new(0.0);
        p.set_smoothing_time(0.0, 44100.0);
        p.set(0.5);
        assert_eq!(p.tick(), 0.5);
    }
}
