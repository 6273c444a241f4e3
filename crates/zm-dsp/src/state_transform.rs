//! Click-free state retargeting across coefficient swaps
//!
//! When coefficients change abruptly (shape pair switch, immediate update),
//! the old TDF-II delay state no longer matches the new transfer function
//! and the next sample can click. Solving a small linear system for new
//! state that keeps the output continuous removes the discontinuity.

use zm_core::Sample;

use crate::biquad::{BiquadCoeffs, Cascade, ZSection};
use crate::NUM_SECTIONS;

/// Ignore coefficient changes smaller than this
pub const RETARGET_THRESHOLD: Sample = 1e-6;

/// True when the denominator or numerator moved enough to matter
pub fn needs_retarget(old: &BiquadCoeffs, new: &BiquadCoeffs) -> bool {
    (old.a1 - new.a1).abs() > RETARGET_THRESHOLD
        || (old.a2 - new.a2).abs() > RETARGET_THRESHOLD
        || (old.b0 - new.b0).abs() > RETARGET_THRESHOLD
        || (old.b1 - new.b1).abs() > RETARGET_THRESHOLD
        || (old.b2 - new.b2).abs() > RETARGET_THRESHOLD
}

/// Remap one section's delay state for a coefficient swap
///
/// Solves the 2x2 system coupling old and new feedback coefficients; when
/// the system is near-singular the state is left alone (worst case a small
/// click, never an instability).
pub fn retarget_section(old: &BiquadCoeffs, new: &BiquadCoeffs, section: &mut ZSection) {
    let det = 1.0 + new.a1 * old.a1 + new.a2 * old.a2;
    if det.abs() <= 1e-10 {
        return;
    }

    let (z1, z2) = section.state();
    section.set_state((z1 - new.a1 * z2) / det, (z2 - new.a2 * z1) / det);
}

/// Remap an entire cascade's state from old to new coefficient sets
pub fn retarget_cascade(
    old: &[BiquadCoeffs; NUM_SECTIONS],
    new: &[BiquadCoeffs; NUM_SECTIONS],
    cascade: &mut Cascade,
) {
    for i in 0..NUM_SECTIONS {
        if needs_retarget(&old[i], &new[i]) {
            retarget_section(&old[i], &new[i], &mut cascade.sections[i]);
        }
    }
}
