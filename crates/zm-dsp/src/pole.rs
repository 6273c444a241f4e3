//! Pole math: polar interpolation, sample-rate remapping, biquad conversion
//!
//! Shapes are captured at a 48 kHz reference rate as conjugate pole pairs
//! `r·e^{±jθ}`. Everything here is pure math on one pole of the pair; the
//! conjugate is implicit.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use zm_core::Sample;

use crate::biquad::BiquadCoeffs;
use crate::{MAX_POLE_RADIUS, MIN_POLE_RADIUS, REFERENCE_SR};

/// One pole of a conjugate pair, in polar form
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pole {
    pub r: Sample,
    pub theta: Sample,
}

impl Pole {
    #[inline]
    pub const fn new(r: Sample, theta: Sample) -> Self {
        Self { r, theta }
    }

    /// Clamp the radius into the stable range
    #[inline]
    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(MIN_POLE_RADIUS, MAX_POLE_RADIUS),
            theta: self.theta,
        }
    }
}

/// Wrap an angle into `(-π, π]`
///
/// Inputs are small multiples of π in practice, so the loop is bounded.
/// Non-finite angles collapse to zero rather than spinning the loop.
#[inline]
pub fn wrap_angle(mut a: Sample) -> Sample {
    if !a.is_finite() {
        return 0.0;
    }
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest-path angle interpolation
#[inline]
pub fn interp_angle_shortest(a: Sample, b: Sample, t: Sample) -> Sample {
    a + t * wrap_angle(b - a)
}

/// Geodesic (log-space) pole interpolation
///
/// The radius blends geometrically, `exp((1-t)·ln rA + t·ln rB)`, which
/// tracks perceived resonance bandwidth and can never exceed the larger
/// endpoint. The angle takes the shortest path around the circle.
pub fn interpolate_log_space(a: Pole, b: Pole, t: Sample) -> Pole {
    let ra = a.r.clamp(MIN_POLE_RADIUS, MAX_POLE_RADIUS);
    let rb = b.r.clamp(MIN_POLE_RADIUS, MAX_POLE_RADIUS);

    let ln_r = (1.0 - t) * ra.ln() + t * rb.ln();
    let r = ln_r.exp();
    let theta = interp_angle_shortest(a.theta, b.theta, t);

    Pole::new(r, wrap_angle(theta))
}

/// Linear-radius pole interpolation (Efficient mode)
pub fn interpolate_linear(a: Pole, b: Pole, t: Sample) -> Pole {
    let ra = a.r.clamp(MIN_POLE_RADIUS, MAX_POLE_RADIUS);
    let rb = b.r.clamp(MIN_POLE_RADIUS, MAX_POLE_RADIUS);

    let r = ra + t * (rb - ra);
    let theta = interp_angle_shortest(a.theta, b.theta, t);

    Pole::new(r, wrap_angle(theta))
}

/// Remap a pole from the 48 kHz reference rate to the host sample rate
///
/// Exact bilinear round trip: z@48k → s-domain → z@fs, so formant
/// frequencies land in the same place at any host rate. No-op at the
/// reference rate and for degenerate rates below 1 kHz.
pub fn remap_48k_to_fs(pole: Pole, target_fs: f64) -> Pole {
    if (target_fs - REFERENCE_SR).abs() < 0.1 {
        return pole;
    }
    if target_fs < 1e3 {
        return pole;
    }

    let r48 = pole.r.clamp(0.0, 0.999_999);
    let z48 = Complex64::from_polar(r48, pole.theta);

    // s = 2*Fref * (z - 1) / (z + 1)
    let denom = z48 + Complex64::new(1.0, 0.0);
    if denom.norm() < 1e-12 {
        return pole;
    }
    let s = (z48 - Complex64::new(1.0, 0.0)) / denom * (2.0 * REFERENCE_SR);

    // z' = (2*Ft + s) / (2*Ft - s)
    let denom_fwd = Complex64::new(2.0 * target_fs, 0.0) - s;
    if denom_fwd.norm() < 1e-12 {
        return pole;
    }
    let z_new = (Complex64::new(2.0 * target_fs, 0.0) + s) / denom_fwd;

    Pole::new(
        z_new.norm().clamp(MIN_POLE_RADIUS, MAX_POLE_RADIUS),
        wrap_angle(z_new.im.atan2(z_new.re)),
    )
}

/// Convert a conjugate pole pair into biquad coefficients
///
/// Denominator is exact: `a1 = -2r·cosθ`, `a2 = r²`. The numerator places a
/// detuned zero at radius `0.9·r` on the same angle, then normalizes by the
/// absolute coefficient sum so the cascade gain stays bounded.
pub fn pole_to_biquad(pole: Pole) -> BiquadCoeffs {
    let a1 = -2.0 * pole.r * pole.theta.cos();
    let a2 = pole.r * pole.r;

    let rz = (0.9 * pole.r).clamp(0.0, 0.999);
    let c = pole.theta.cos();
    let mut b0: Sample = 1.0;
    let mut b1 = -2.0 * rz * c;
    let mut b2 = rz * rz;

    let norm = 1.0 / (b0.abs() + b1.abs() + b2.abs()).max(0.25);
    b0 *= norm;
    b1 *= norm;
    b2 *= norm;

    BiquadCoeffs { b0, b1, b2, a1, a2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_wrap_angle_range() {
        for i in -100..=100 {
            let a = i as Sample * 0.37;
            let w = wrap_angle(a);
            assert!(w > -PI && w <= PI, "wrap_angle({a}) = {w} out of range");
        }
    }

    #[test]
    fn test_wrap_angle_identity_inside_range() {
        assert_abs_diff_eq!(wrap_angle(1.0), 1.0);
        assert_abs_diff_eq!(wrap_angle(-3.0), -3.0);
    }

    #[test]
    fn test_wrap_angle_non_finite_terminates() {
        assert_eq!(wrap_angle(Sample::NAN), 0.0);
        assert_eq!(wrap_angle(Sample::INFINITY), 0.0);
        assert_eq!(wrap_angle(Sample::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_interpolation_endpoints() {
        let a = Pole::new(0.95, 0.3);
        let b = Pole::new(0.88, 1.2);

        let at_a = interpolate_log_space(a, b, 0.0);
        let at_b = interpolate_log_space(a, b, 1.0);

        assert_relative_eq!(at_a.r, a.r, epsilon = 1e-12);
        assert_relative_eq!(at_a.theta, a.theta, epsilon = 1e-12);
        assert_relative_eq!(at_b.r, b.r, epsilon = 1e-12);
        assert_relative_eq!(at_b.theta, b.theta, epsilon = 1e-12);
    }

    #[test]
    fn test_log_space_radius_never_exceeds_endpoints() {
        let a = Pole::new(0.92, 0.1);
        let b = Pole::new(0.9995, 0.5);
        for i in 0..=100 {
            let t = i as Sample / 100.0;
            let p = interpolate_log_space(a, b, t);
            assert!(p.r <= b.r.max(a.r) + 1e-12);
            assert!(p.r >= a.r.min(b.r) - 1e-12);
        }
    }

    #[test]
    fn test_shortest_path_across_pi() {
        // Interpolating from just below π to just above -π should go
        // through π, not back through zero.
        let a = Pole::new(0.9, PI - 0.1);
        let b = Pole::new(0.9, -PI + 0.1);
        let mid = interpolate_log_space(a, b, 0.5);
        assert!(
            mid.theta.abs() > PI - 0.11,
            "midpoint {} did not take the short path",
            mid.theta
        );
    }

    #[test]
    fn test_remap_noop_at_reference() {
        let p = Pole::new(0.97, 0.42);
        let remapped = remap_48k_to_fs(p, 48000.0);
        assert_eq!(remapped, p);
    }

    #[test]
    fn test_remap_stays_stable() {
        for &fs in &[22050.0, 44100.0, 88200.0, 96000.0, 192000.0] {
            for &r in &[0.85, 0.95, 0.9995] {
                for i in 0..12 {
                    let theta = 0.001 + i as Sample * 0.25;
                    let p = remap_48k_to_fs(Pole::new(r, theta), fs);
                    assert!(p.r < 1.0, "unstable pole after remap to {fs}");
                    assert!(p.r >= MIN_POLE_RADIUS);
                    assert!(p.theta > -PI && p.theta <= PI);
                }
            }
        }
    }

    #[test]
    fn test_remap_preserves_frequency() {
        // theta maps to frequency f = theta*fs/(2π); remapping to another
        // rate should keep f approximately fixed (exact for the bilinear
        // transform away from Nyquist warping extremes).
        let p48 = Pole::new(0.98, 0.3);
        let f48 = p48.theta * REFERENCE_SR / (2.0 * PI);

        let p96 = remap_48k_to_fs(p48, 96000.0);
        let f96 = p96.theta * 96000.0 / (2.0 * PI);

        // Bilinear warping keeps low-frequency poles nearly put.
        assert_relative_eq!(f96, f48, max_relative = 0.01);
    }

    #[test]
    fn test_pole_to_biquad_denominator() {
        let p = Pole::new(0.95, 0.5);
        let c = pole_to_biquad(p);
        assert_relative_eq!(c.a1, -2.0 * 0.95 * 0.5_f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(c.a2, 0.95 * 0.95, epsilon = 1e-12);
    }

    #[test]
    fn test_pole_to_biquad_numerator_bounded() {
        for i in 0..24 {
            let p = Pole::new(0.85 + (i % 4) as Sample * 0.03, 0.05 + i as Sample * 0.12);
            let c = pole_to_biquad(p);
            let sum = c.b0.abs() + c.b1.abs() + c.b2.abs();
            assert!(sum <= 1.0 + 1e-9, "numerator sum {sum} exceeds unity");
        }
    }
}
