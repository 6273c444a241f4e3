//! Drive nonlinearities and auto-makeup gain
//!
//! Memoryless tanh-based shaping applied around the cascade, and a
//! block-rate RMS-matching makeup stage so resonant morph positions do not
//! swing the output level.

use zm_core::{rms, Sample};

/// Rational tanh approximation for saturation duty
///
/// Pade form `x(27 + x²) / (27 + 9x²)`; monotonic and bounded for |x| ≤ 3,
/// hard-limited beyond that so it never exceeds ±1. Worst-case error
/// against `tanh` is ~2.4e-2 near |x| ≈ 1.6, under 1e-3 for |x| ≤ 0.3
/// where filter state usually lives; plenty for a soft clipper, not a
/// substitute for `tanh` where exactness matters.
#[inline(always)]
pub fn fast_tanh(x: Sample) -> Sample {
    if x.abs() >= 3.0 {
        return x.signum();
    }
    let x2 = x * x;
    x * (27.0 + x2) / (27.0 + 9.0 * x2)
}

/// Pre-filter drive: tanh curve scaled by linear gain
///
/// Unity gain passes near-transparently for small signals since
/// `tanh(x) ≈ x` below ~0.3.
#[inline(always)]
pub fn drive_sample(x: Sample, drive_linear: Sample) -> Sample {
    (x * drive_linear).tanh()
}

/// Apply drive to a whole buffer
pub fn apply_drive(buffer: &mut [Sample], drive_linear: Sample) {
    for x in buffer.iter_mut() {
        *x = drive_sample(*x, drive_linear);
    }
}

/// Post-stage saturation: dry/shaped crossfade by `amount` in 0..1
#[inline(always)]
pub fn saturate_sample(x: Sample, amount: Sample) -> Sample {
    x + amount * (fast_tanh(x) - x)
}

/// Apply saturation to a whole buffer
pub fn apply_saturation(buffer: &mut [Sample], amount: Sample) {
    let amount = amount.clamp(0.0, 1.0);
    for x in buffer.iter_mut() {
        *x = saturate_sample(*x, amount);
    }
}

/// Block-rate RMS-matching makeup gain with ~1 ms one-pole smoothing
#[derive(Debug, Clone)]
pub struct AutoMakeup {
    gain: Sample,
    alpha: f64,
    enabled: bool,
}

impl AutoMakeup {
    /// Gain target clamp, keeps makeup corrective rather than creative
    pub const MIN_GAIN: Sample = 0.5;
    pub const MAX_GAIN: Sample = 2.0;

    /// RMS floor below which the target is left alone (silence, fades)
    const RMS_FLOOR: Sample = 1e-3;

    pub fn new(sample_rate: f64) -> Self {
        Self {
            gain: 1.0,
            alpha: Self::calculate_alpha(sample_rate),
            enabled: false,
        }
    }

    // One-pole coefficient for a 1 ms time constant.
    fn calculate_alpha(sample_rate: f64) -> f64 {
        1.0 - (-1.0 / (0.001 * sample_rate.max(1.0))).exp()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.alpha = Self::calculate_alpha(sample_rate);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.gain = 1.0;
        }
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn gain(&self) -> Sample {
        self.gain
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }

    /// Update the gain target from the block just processed
    ///
    /// Both levels must clear the floor; otherwise the gain holds, so
    /// silence never drags makeup toward the clamp rails.
    pub fn update_from_block(&mut self, input: &[Sample], output: &[Sample]) {
        self.update_from_rms(rms(input), rms(output), input.len());
    }

    /// Same update from pre-computed RMS levels (no buffer copies needed)
    pub fn update_from_rms(&mut self, in_rms: Sample, out_rms: Sample, block_len: usize) {
        if !self.enabled {
            return;
        }
        if in_rms <= Self::RMS_FLOOR || out_rms <= Self::RMS_FLOOR {
            return;
        }

        let target = (in_rms / out_rms).clamp(Self::MIN_GAIN, Self::MAX_GAIN);
        // Block-rate one-pole toward the target, per-sample equivalent
        // folded into a single step of block length.
        let block_alpha = 1.0 - (1.0 - self.alpha).powi(block_len as i32);
        self.gain += (target - self.gain) * block_alpha;
    }

    /// Apply the current gain in place
    pub fn apply(&self, buffer: &mut [Sample]) {
        if !self.enabled {
            return;
        }
        for x in buffer.iter_mut() {
            *x *= self.gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fast_tanh_accuracy() {
        // The 3/2 Pade form peaks at ~2.4e-2 error near |x| = 1.6 and
        // tightens rapidly toward zero (1.6e-2 at 1.0, 3.7e-3 at 0.5,
        // 9.2e-4 at 0.3).
        for i in -300..=300 {
            let x = i as Sample * 0.01;
            let err = (fast_tanh(x) - x.tanh()).abs();
            assert!(err < 2.5e-2, "fast_tanh error {err} at x={x}");
            if x.abs() <= 0.3 {
                assert!(err < 1e-3, "fast_tanh error {err} at x={x}");
            }
        }
    }

    #[test]
    fn test_fast_tanh_bounded_and_odd() {
        for i in 0..2000 {
            let x = i as Sample * 0.01;
            let y = fast_tanh(x);
            assert!(y.abs() <= 1.0);
            assert_relative_eq!(fast_tanh(-x), -y, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_drive_transparent_at_unity_small_signal() {
        let y = drive_sample(0.01, 1.0);
        assert_relative_eq!(y, 0.01, max_relative = 1e-3);
    }

    #[test]
    fn test_drive_limits_hot_signal() {
        let y = drive_sample(10.0, 4.0);
        assert!(y <= 1.0);
    }

    #[test]
    fn test_saturation_zero_amount_is_identity() {
        let mut buf = vec![0.3, -0.8, 1.5, 0.0];
        let orig = buf.clone();
        apply_saturation(&mut buf, 0.0);
        assert_eq!(buf, orig);
    }

    #[test]
    fn test_makeup_disabled_holds_unity() {
        let mut m = AutoMakeup::new(48000.0);
        let input = vec![0.5; 256];
        let output = vec![0.1; 256];
        m.update_from_block(&input, &output);
        assert_eq!(m.gain(), 1.0);
    }

    #[test]
    fn test_makeup_compensates_attenuation() {
        let mut m = AutoMakeup::new(48000.0);
        m.set_enabled(true);
        let input = vec![0.5; 512];
        let output = vec![0.25; 512]; // cascade cut level in half
        for _ in 0..100 {
            m.update_from_block(&input, &output);
        }
        assert_relative_eq!(m.gain(), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_makeup_clamps_extreme_ratio() {
        let mut m = AutoMakeup::new(48000.0);
        m.set_enabled(true);
        let input = vec![0.9; 512];
        let output = vec![0.01; 512];
        for _ in 0..200 {
            m.update_from_block(&input, &output);
        }
        assert!(m.gain() <= AutoMakeup::MAX_GAIN + 1e-9);
    }

    #[test]
    fn test_makeup_ignores_silence() {
        let mut m = AutoMakeup::new(48000.0);
        m.set_enabled(true);
        let silent = vec![0.0; 256];
        let output = vec![0.5; 256];
        m.update_from_block(&silent, &output);
        assert_eq!(m.gain(), 1.0);
    }
}
