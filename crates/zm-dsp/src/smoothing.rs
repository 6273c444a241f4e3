//! Lock-free parameter smoothing
//!
//! Click-free parameter changes between the control thread and the audio
//! thread. Targets are published through atomics; the ramp itself runs on
//! the audio thread with no allocation and no locks.

use portable_atomic::{AtomicBool, AtomicF64, Ordering};
use zm_core::Sample;

/// Smoothing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingType {
    /// Linear ramp (constant rate)
    #[default]
    Linear,
    /// Exponential decay (RC filter style)
    Exponential,
    /// No smoothing (instant change)
    None,
}

/// Lock-free smoothed parameter
///
/// `set_target` is safe from any thread; everything else belongs to the
/// audio thread.
#[derive(Debug)]
pub struct SmoothedParam {
    target: AtomicF64,
    dirty: AtomicBool,
    current: Sample,
    smoothing_type: SmoothingType,
    smoothing_samples: f64,
    coeff: f64,
    linear_step: Sample,
    linear_remaining: i32,
    sample_rate: f64,
    min_value: Sample,
    max_value: Sample,
}

impl SmoothedParam {
    pub fn new(
        initial_value: Sample,
        smoothing_time_ms: f64,
        sample_rate: f64,
        smoothing_type: SmoothingType,
    ) -> Self {
        let smoothing_samples = (smoothing_time_ms / 1000.0) * sample_rate;
        Self {
            target: AtomicF64::new(initial_value),
            dirty: AtomicBool::new(false),
            current: initial_value,
            smoothing_type,
            smoothing_samples,
            coeff: Self::calculate_coeff(smoothing_samples),
            linear_step: 0.0,
            linear_remaining: 0,
            sample_rate,
            min_value: f64::NEG_INFINITY,
            max_value: f64::INFINITY,
        }
    }

    /// Create with a clamped value range
    pub fn with_range(
        initial_value: Sample,
        smoothing_time_ms: f64,
        sample_rate: f64,
        smoothing_type: SmoothingType,
        min: Sample,
        max: Sample,
    ) -> Self {
        let mut param = Self::new(initial_value, smoothing_time_ms, sample_rate, smoothing_type);
        param.min_value = min;
        param.max_value = max;
        param
    }

    // Time constant: reach ~63% of the way in smoothing_samples.
    fn calculate_coeff(samples: f64) -> f64 {
        if samples <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / samples).exp()
        }
    }

    pub fn set_smoothing_time(&mut self, time_ms: f64) {
        self.smoothing_samples = (time_ms / 1000.0) * self.sample_rate;
        self.coeff = Self::calculate_coeff(self.smoothing_samples);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        let time_ms = if self.sample_rate > 0.0 {
            self.smoothing_samples / self.sample_rate * 1000.0
        } else {
            0.0
        };
        self.sample_rate = sample_rate;
        self.set_smoothing_time(time_ms);
    }

    /// Publish a new target (any thread)
    pub fn set_target(&self, value: Sample) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.target.store(clamped, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
    }

    /// Jump straight to a value, skipping the ramp (audio thread)
    pub fn snap_to(&mut self, value: Sample) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.target.store(clamped, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.current = clamped;
        self.linear_remaining = 0;
    }

    #[inline]
    pub fn current(&self) -> Sample {
        self.current
    }

    #[inline]
    pub fn target_value(&self) -> Sample {
        self.target.load(Ordering::Acquire)
    }

    /// True while the ramp has not yet converged
    #[inline]
    pub fn is_smoothing(&self) -> bool {
        match self.smoothing_type {
            SmoothingType::Linear => self.linear_remaining > 0,
            SmoothingType::Exponential => {
                (self.current - self.target.load(Ordering::Acquire)).abs() > 1e-10
            }
            SmoothingType::None => false,
        }
    }

    /// Advance one sample (audio thread)
    #[inline]
    pub fn next_value(&mut self) -> Sample {
        if self.dirty.swap(false, Ordering::AcqRel) {
            self.begin_ramp();
        }

        match self.smoothing_type {
            SmoothingType::Linear => {
                if self.linear_remaining > 0 {
                    self.current += self.linear_step;
                    self.linear_remaining -= 1;
                    if self.linear_remaining == 0 {
                        self.current = self.target.load(Ordering::Acquire);
                    }
                }
            }
            SmoothingType::Exponential => {
                let target = self.target.load(Ordering::Acquire);
                self.current += (target - self.current) * self.coeff;
            }
            SmoothingType::None => {
                self.current = self.target.load(Ordering::Acquire);
            }
        }

        self.current
    }

    /// Advance the ramp by `n` samples without producing intermediates
    pub fn skip(&mut self, n: usize) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            self.begin_ramp();
        }

        match self.smoothing_type {
            SmoothingType::Linear => {
                let steps = (n as i32).min(self.linear_remaining);
                self.current += self.linear_step * steps as Sample;
                self.linear_remaining -= steps;
                if self.linear_remaining == 0 {
                    self.current = self.target.load(Ordering::Acquire);
                }
            }
            SmoothingType::Exponential => {
                let target = self.target.load(Ordering::Acquire);
                let decay = (1.0 - self.coeff).powi(n as i32);
                self.current = target + (self.current - target) * decay;
            }
            SmoothingType::None => {
                self.current = self.target.load(Ordering::Acquire);
            }
        }
    }

    fn begin_ramp(&mut self) {
        let target = self.target.load(Ordering::Acquire);
        if self.smoothing_type == SmoothingType::Linear {
            let samples = self.smoothing_samples.max(1.0);
            self.linear_step = (target - self.current) / samples;
            self.linear_remaining = samples as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_instant_when_unsmoothing() {
        let mut p = SmoothedParam::new(0.0, 0.0, 48000.0, SmoothingType::None);
        p.set_target(1.0);
        assert_eq!(p.next_value(), 1.0);
    }

    #[test]
    fn test_linear_ramp_reaches_target() {
        let mut p = SmoothedParam::new(0.0, 1.0, 48000.0, SmoothingType::Linear);
        p.set_target(1.0);
        let steps = 48; // 1 ms at 48 kHz
        let mut last = 0.0;
        for _ in 0..steps {
            let v = p.next_value();
            assert!(v >= last - 1e-12, "linear ramp must be monotonic");
            last = v;
        }
        assert_relative_eq!(p.current(), 1.0, epsilon = 1e-9);
        assert!(!p.is_smoothing());
    }

    #[test]
    fn test_linear_ramp_no_overshoot() {
        let mut p = SmoothedParam::new(0.2, 5.0, 44100.0, SmoothingType::Linear);
        p.set_target(0.9);
        for _ in 0..2000 {
            let v = p.next_value();
            assert!(v <= 0.9 + 1e-9 && v >= 0.2 - 1e-9);
        }
        assert_relative_eq!(p.current(), 0.9, epsilon = 1e-9);
    }

    #[test]
    fn test_exponential_converges() {
        let mut p = SmoothedParam::new(0.0, 1.0, 48000.0, SmoothingType::Exponential);
        p.set_target(1.0);
        for _ in 0..48000 {
            p.next_value();
        }
        assert_relative_eq!(p.current(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_skip_matches_stepping() {
        let mut a = SmoothedParam::new(0.0, 2.0, 48000.0, SmoothingType::Linear);
        let mut b = SmoothedParam::new(0.0, 2.0, 48000.0, SmoothingType::Linear);
        a.set_target(0.7);
        b.set_target(0.7);

        for _ in 0..50 {
            a.next_value();
        }
        b.skip(50);
        assert_relative_eq!(a.current(), b.current(), epsilon = 1e-9);
    }

    #[test]
    fn test_range_clamps_target() {
        let p = SmoothedParam::with_range(0.5, 1.0, 48000.0, SmoothingType::Linear, 0.0, 1.0);
        p.set_target(3.0);
        assert_eq!(p.target_value(), 1.0);
        p.set_target(-2.0);
        assert_eq!(p.target_value(), 0.0);
    }

    #[test]
    fn test_snap_to() {
        let mut p = SmoothedParam::new(0.0, 10.0, 48000.0, SmoothingType::Linear);
        p.set_target(1.0);
        p.next_value();
        p.snap_to(0.25);
        assert_eq!(p.current(), 0.25);
        assert!(!p.is_smoothing());
    }
}
