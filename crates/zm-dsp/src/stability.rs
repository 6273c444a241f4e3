//! Reflection-coefficient denominator stabilization
//!
//! Step-down (Levinson) recursion converts a monic denominator into
//! reflection coefficients; clamping each coefficient's magnitude below 1
//! and stepping back up guarantees every root lies strictly inside the unit
//! circle, regardless of upstream arithmetic error. This is the last line of
//! defense against filter instability.
//!
//! The general-order recursions allocate and are for offline/verification
//! use; the audio thread only ever calls the closed-form second-order
//! `stabilize_sos`.

use zm_core::Sample;

use crate::REFLECTION_CLAMP;

/// Step-down recursion: monic denominator -> reflection coefficients
///
/// `a` is `[1, a1, ..., aN]`; returns `k` with `k[0]` unused, matching the
/// classical indexing. Coefficients with `|k| >= 1` are pinned just inside
/// the unit interval.
pub fn step_down_to_reflection(a: &[Sample]) -> Vec<Sample> {
    debug_assert!(!a.is_empty() && (a[0] - 1.0).abs() < 1e-12, "denominator must be monic");

    let n = a.len() - 1;
    let mut k = vec![0.0; n + 1];
    let mut current = a.to_vec();

    for m in (1..=n).rev() {
        let mut km = -current[m];
        if km.abs() >= 1.0 {
            km = 0.999_999_f64.copysign(km);
        }
        k[m] = km;
        if m == 1 {
            break;
        }

        let denom = 1.0 - km * km;
        let mut prev = vec![0.0; m];
        for i in 1..m {
            prev[i] = (current[i] + km * current[m - i]) / denom;
        }

        current.truncate(m);
        current[1..m].copy_from_slice(&prev[1..m]);
    }

    k
}

/// Step-up recursion: reflection coefficients -> monic denominator
pub fn step_up_from_reflection(k: &[Sample]) -> Vec<Sample> {
    let n = k.len() - 1;
    let mut a = vec![1.0, -k[1]];

    for m in 2..=n {
        let mut next = vec![0.0; m + 1];
        next[0] = 1.0;
        for i in 1..m {
            next[i] = a[i] - k[m] * a[m - i];
        }
        next[m] = -k[m];
        a = next;
    }

    a
}

/// Stabilize a general-order monic denominator in place
pub fn stabilize_denominator(a: &mut [Sample], k_max: Sample) {
    let mut k = step_down_to_reflection(a);
    for ki in k.iter_mut().skip(1) {
        *ki = ki.clamp(-k_max, k_max);
    }
    let out = step_up_from_reflection(&k);
    a.copy_from_slice(&out);
}

/// Closed-form step-down for a second-order section
///
/// Returns `(k1, k2)` for denominator `1 + a1·z^-1 + a2·z^-2`.
#[inline]
pub fn step_down_sos(a1: Sample, a2: Sample) -> (Sample, Sample) {
    let mut k2 = -a2;
    if k2.abs() >= 1.0 {
        k2 = 0.999_999_f64.copysign(k2);
    }
    let denom = 1.0 - k2;
    let k1 = if denom.abs() > 1e-12 { -a1 / denom } else { 0.0 };
    (k1.clamp(-0.999_999, 0.999_999), k2)
}

/// Closed-form step-up for a second-order section
#[inline]
pub fn step_up_sos(k1: Sample, k2: Sample) -> (Sample, Sample) {
    let a1 = -k1 * (1.0 - k2);
    let a2 = -k2;
    (a1, a2)
}

/// Clamp a second-order denominator's reflection coefficients
///
/// Allocation-free; safe to call per block on the audio thread.
#[inline]
pub fn stabilize_sos(a1: Sample, a2: Sample) -> (Sample, Sample) {
    let (k1, k2) = step_down_sos(a1, a2);
    step_up_sos(
        k1.clamp(-REFLECTION_CLAMP, REFLECTION_CLAMP),
        k2.clamp(-REFLECTION_CLAMP, REFLECTION_CLAMP),
    )
}
