//! TDF-II biquad sections with gated feedback saturation
//!
//! TDF-II is numerically optimal for floating-point arithmetic. Each section
//! additionally sanitizes its state every sample (denormal flush, non-finite
//! replacement) because automated morph/intensity changes can transiently
//! produce edge-case coefficients, and applies an optional tanh stage inside
//! the feedback path to model analog-style soft clipping.

use zm_core::Sample;

use crate::saturation::fast_tanh;
use crate::{MonoProcessor, PerformanceMode, Processor, DENORMAL_THRESHOLD, NUM_SECTIONS, SAT_GATE_THRESHOLD};

/// Biquad coefficients (normalized, a0 == 1)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: Sample,
    pub b1: Sample,
    pub b2: Sample,
    pub a1: Sample,
    pub a2: Sample,
}

impl BiquadCoeffs {
    /// Unity gain, no filtering
    pub const fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Flush denormals and non-finite values out of a state variable
#[inline(always)]
fn sanitize(v: Sample) -> Sample {
    if !v.is_finite() || v.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        v
    }
}

/// One second-order section of the Z-plane cascade
#[derive(Debug, Clone)]
pub struct ZSection {
    pub coeffs: BiquadCoeffs,
    z1: Sample,
    z2: Sample,
    sat: Sample,
    mode: PerformanceMode,
}

impl Default for ZSection {
    fn default() -> Self {
        Self {
            coeffs: BiquadCoeffs::bypass(),
            z1: 0.0,
            z2: 0.0,
            sat: 0.0,
            mode: PerformanceMode::default(),
        }
    }
}

impl ZSection {
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Feedback saturation amount, 0..1; gated off below the threshold
    #[inline]
    pub fn set_saturation(&mut self, amount: Sample) {
        self.sat = amount.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn set_performance_mode(&mut self, mode: PerformanceMode) {
        self.mode = mode;
    }

    #[inline]
    pub fn state(&self) -> (Sample, Sample) {
        (self.z1, self.z2)
    }

    #[inline]
    pub fn set_state(&mut self, z1: Sample, z2: Sample) {
        self.z1 = sanitize(z1);
        self.z2 = sanitize(z2);
    }

    /// Nudge live coefficients by a per-sample interpolation step
    #[inline(always)]
    pub fn step_coeffs(&mut self, delta: &BiquadCoeffs) {
        self.coeffs.b0 += delta.b0;
        self.coeffs.b1 += delta.b1;
        self.coeffs.b2 += delta.b2;
        self.coeffs.a1 += delta.a1;
        self.coeffs.a2 += delta.a2;
    }
}

impl Processor for ZSection {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for ZSection {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;

        self.z1 = sanitize(self.z1);
        self.z2 = sanitize(self.z2);

        // Gated: tanh dominates section cost when saturation is active,
        // so skip it entirely when it would be inaudible.
        if self.sat > SAT_GATE_THRESHOLD {
            let g = 1.0 + 4.0 * self.sat;
            match self.mode {
                PerformanceMode::Authentic => {
                    self.z1 = (self.z1 * g).tanh();
                    self.z2 = (self.z2 * g).tanh();
                }
                PerformanceMode::Efficient => {
                    self.z1 = fast_tanh(self.z1 * g);
                    self.z2 = fast_tanh(self.z2 * g);
                }
            }
        }

        if output.is_finite() {
            output
        } else {
            0.0
        }
    }
}

/// Fixed six-deep series cascade, one per audio channel
#[derive(Debug, Clone, Default)]
pub struct Cascade {
    pub sections: [ZSection; NUM_SECTIONS],
}

impl Cascade {
    #[inline(always)]
    pub fn process(&mut self, mut x: Sample) -> Sample {
        for s in &mut self.sections {
            x = s.process_sample(x);
        }
        x
    }

    pub fn set_saturation(&mut self, amount: Sample) {
        for s in &mut self.sections {
            s.set_saturation(amount);
        }
    }

    pub fn set_performance_mode(&mut self, mode: PerformanceMode) {
        for s in &mut self.sections {
            s.set_performance_mode(mode);
        }
    }

    /// Apply one per-sample coefficient interpolation step to every section
    #[inline(always)]
    pub fn step_coeffs(&mut self, deltas: &[BiquadCoeffs; NUM_SECTIONS]) {
        for (s, d) in self.sections.iter_mut().zip(deltas.iter()) {
            s.step_coeffs(d);
        }
    }
}

impl Processor for Cascade {
    fn reset(&mut self) {
        for s in &mut self.sections {
            s.reset();
        }
    }
}
