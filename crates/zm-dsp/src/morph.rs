//! Per-block coefficient computation and zipper-free interpolation
//!
//! Once per block the updater turns the smoothed morph/intensity values
//! into six biquad coefficient sets, then hands the cascade a per-sample
//! delta so the live coefficients glide to the new targets across the
//! block instead of jumping at block boundaries.

use std::f64::consts::TAU;

use zm_core::Sample;

use crate::biquad::BiquadCoeffs;
use crate::pole::{interpolate_linear, interpolate_log_space, pole_to_biquad, remap_48k_to_fs, Pole};
use crate::shapes::{ShapeBank, ShapePair};
use crate::stability::stabilize_sos;
use crate::{PerformanceMode, MAX_POLE_RADIUS, NUM_SECTIONS};

/// Radius boost per unit intensity
const INTENSITY_RADIUS_GAIN: Sample = 0.06;

/// Skip the block update entirely below this parameter delta
const UPDATE_EPSILON: Sample = 1e-4;

/// Smoothstep easing, biases dwell time toward the endpoints
#[inline]
pub fn smoothstep(t: Sample) -> Sample {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// One block's worth of coefficient motion for the cascade
#[derive(Debug, Clone, Copy)]
pub struct BlockUpdate {
    /// Final coefficients, exact values to land on at block end
    pub end: [BiquadCoeffs; NUM_SECTIONS],
    /// Per-sample increment for each live coefficient
    pub delta: [BiquadCoeffs; NUM_SECTIONS],
}

/// Computes cascade coefficients from morph position and intensity
#[derive(Debug, Clone)]
pub struct CoefficientUpdater {
    bank: ShapeBank,
    pair: ShapePair,
    mode: PerformanceMode,
    sample_rate: f64,

    current: [BiquadCoeffs; NUM_SECTIONS],
    current_poles: [Pole; NUM_SECTIONS],
    last_morph: Sample,
    last_intensity: Sample,
    primed: bool,

    lfo_phase: f64,
    lfo_rate: f64,
    lfo_depth: Sample,
    effective_morph: Sample,
}

impl CoefficientUpdater {
    pub fn new(bank: ShapeBank, sample_rate: f64) -> Self {
        Self {
            bank,
            pair: ShapePair::default(),
            mode: PerformanceMode::default(),
            sample_rate,
            current: [BiquadCoeffs::bypass(); NUM_SECTIONS],
            current_poles: [Pole::default(); NUM_SECTIONS],
            last_morph: -1.0, // force the first update through
            last_intensity: -1.0,
            primed: false,
            lfo_phase: 0.0,
            lfo_rate: 0.0,
            lfo_depth: 0.0,
            effective_morph: 0.0,
        }
    }

    pub fn bank(&self) -> &ShapeBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut ShapeBank {
        &mut self.bank
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if (sample_rate - self.sample_rate).abs() > f64::EPSILON {
            self.sample_rate = sample_rate;
            self.primed = false;
        }
    }

    pub fn set_pair(&mut self, pair: ShapePair) {
        if pair != self.pair {
            self.pair = pair;
            self.primed = false;
        }
    }

    pub fn set_mode(&mut self, mode: PerformanceMode) {
        if mode != self.mode {
            self.mode = mode;
            self.primed = false;
        }
    }

    /// LFO perturbs the morph target, never the audio directly
    pub fn set_lfo(&mut self, rate_hz: f64, depth: Sample) {
        self.lfo_rate = rate_hz.clamp(0.02, 8.0);
        self.lfo_depth = depth.clamp(0.0, 1.0);
    }

    /// Morph position after LFO modulation, as used by the last update
    pub fn effective_morph(&self) -> Sample {
        self.effective_morph
    }

    /// Live coefficients as of the end of the last block
    pub fn current_coeffs(&self) -> &[BiquadCoeffs; NUM_SECTIONS] {
        &self.current
    }

    /// Poles backing the current coefficients (for diagnostics)
    pub fn current_poles(&self) -> &[Pole; NUM_SECTIONS] {
        &self.current_poles
    }

    pub fn reset(&mut self) {
        self.lfo_phase = 0.0;
        self.primed = false;
    }

    /// Compute coefficients for a fixed morph/intensity (no LFO, no ramp)
    pub fn compute(&self, morph: Sample, intensity: Sample) -> [BiquadCoeffs; NUM_SECTIONS] {
        self.compute_with_poles(morph, intensity).0
    }

    fn compute_with_poles(
        &self,
        morph: Sample,
        intensity: Sample,
    ) -> ([BiquadCoeffs; NUM_SECTIONS], [Pole; NUM_SECTIONS]) {
        let t = match self.mode {
            PerformanceMode::Authentic => smoothstep(morph),
            PerformanceMode::Efficient => morph.clamp(0.0, 1.0),
        };

        let (shape_a, shape_b) = self.bank.endpoints(self.pair);
        let intensity = intensity.clamp(0.0, 1.0);

        let mut coeffs = [BiquadCoeffs::bypass(); NUM_SECTIONS];
        let mut poles = [Pole::default(); NUM_SECTIONS];
        for i in 0..NUM_SECTIONS {
            let pole = self.morphed_pole(shape_a[i], shape_b[i], t, intensity);
            let raw = pole_to_biquad(pole);
            let (a1, a2) = stabilize_sos(raw.a1, raw.a2);
            coeffs[i] = BiquadCoeffs { a1, a2, ..raw };
            poles[i] = pole;
        }
        (coeffs, poles)
    }

    fn morphed_pole(&self, a: Pole, b: Pole, t: Sample, intensity: Sample) -> Pole {
        let mut pole = match self.mode {
            PerformanceMode::Authentic => interpolate_log_space(a, b, t),
            PerformanceMode::Efficient => interpolate_linear(a, b, t),
        };
        pole.r = (pole.r * (1.0 + intensity * INTENSITY_RADIUS_GAIN)).min(MAX_POLE_RADIUS);
        remap_48k_to_fs(pole, self.sample_rate)
    }

    /// Per-block update
    ///
    /// Advances the LFO by `num_samples`, applies it to the morph target,
    /// and returns the interpolation plan for the block. `None` means
    /// nothing changed beyond the epsilon threshold and the cascade should
    /// keep its live coefficients untouched (the idle fast path).
    pub fn update_block(
        &mut self,
        morph: Sample,
        intensity: Sample,
        num_samples: usize,
    ) -> Option<BlockUpdate> {
        let morph = morph.clamp(0.0, 1.0);
        let intensity = intensity.clamp(0.0, 1.0);

        let effective = if self.lfo_depth > 0.0 {
            let offset = (self.lfo_phase).sin() * self.lfo_depth * 0.5;
            self.lfo_phase += TAU * self.lfo_rate * num_samples as f64 / self.sample_rate;
            self.lfo_phase %= TAU;
            (morph + offset).clamp(0.0, 1.0)
        } else {
            morph
        };
        self.effective_morph = effective;

        if self.primed
            && (effective - self.last_morph).abs() < UPDATE_EPSILON
            && (intensity - self.last_intensity).abs() < UPDATE_EPSILON
        {
            return None;
        }

        let (end, poles) = self.compute_with_poles(effective, intensity);
        let start = self.current;
        let inv_n = 1.0 / num_samples.max(1) as Sample;

        let mut delta = [BiquadCoeffs::default(); NUM_SECTIONS];
        for i in 0..NUM_SECTIONS {
            delta[i] = BiquadCoeffs {
                b0: (end[i].b0 - start[i].b0) * inv_n,
                b1: (end[i].b1 - start[i].b1) * inv_n,
                b2: (end[i].b2 - start[i].b2) * inv_n,
                a1: (end[i].a1 - start[i].a1) * inv_n,
                a2: (end[i].a2 - start[i].a2) * inv_n,
            };
        }

        self.current = end;
        self.current_poles = poles;
        self.last_morph = effective;
        self.last_intensity = intensity;
        self.primed = true;

        Some(BlockUpdate { end, delta })
    }

    /// Immediate snapshot: land on the target now, no per-sample ramp
    pub fn update_immediate(&mut self, morph: Sample, intensity: Sample) -> [BiquadCoeffs; NUM_SECTIONS] {
        let (end, poles) = self.compute_with_poles(morph.clamp(0.0, 1.0), intensity.clamp(0.0, 1.0));
        self.current = end;
        self.current_poles = poles;
        self.last_morph = morph;
        self.last_intensity = intensity;
        self.effective_morph = morph;
        self.primed = true;
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REFERENCE_SR;
    use approx::assert_relative_eq;

    fn updater(mode: PerformanceMode) -> CoefficientUpdater {
        let mut u = CoefficientUpdater::new(ShapeBank::new(), REFERENCE_SR);
        u.set_mode(mode);
        u
    }

    #[test]
    fn test_smoothstep_shape() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_relative_eq!(smoothstep(0.5), 0.5, epsilon = 1e-12);
        assert!(smoothstep(0.1) < 0.1); // slow start
        assert!(smoothstep(0.9) > 0.9); // slow end
    }

    #[test]
    fn test_all_pairs_stable_over_parameter_grid() {
        for mode in [PerformanceMode::Authentic, PerformanceMode::Efficient] {
            let mut u = updater(mode);
            for pair in ShapePair::ALL {
                u.set_pair(pair);
                for m in 0..=10 {
                    for i in 0..=10 {
                        let coeffs = u.compute(m as Sample / 10.0, i as Sample / 10.0);
                        for c in &coeffs {
                            // Conjugate pair radius is sqrt(a2).
                            assert!(c.a2 >= 0.0 && c.a2.sqrt() < 1.0, "{pair:?} unstable: a2 = {}", c.a2);
                            assert!(c.a1.is_finite() && c.b0.is_finite());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_stable_at_arbitrary_rates() {
        for &fs in &[22050.0, 44100.0, 96000.0, 192000.0] {
            let mut u = updater(PerformanceMode::Authentic);
            u.set_sample_rate(fs);
            for pair in ShapePair::ALL {
                u.set_pair(pair);
                let coeffs = u.compute(0.5, 1.0);
                for c in &coeffs {
                    assert!(c.a2.sqrt() < 1.0, "unstable at {fs} Hz");
                }
            }
        }
    }

    #[test]
    fn test_epsilon_fast_path() {
        let mut u = updater(PerformanceMode::Efficient);
        assert!(u.update_block(0.5, 0.5, 128).is_some()); // first block always computes
        assert!(u.update_block(0.5, 0.5, 128).is_none()); // idle
        assert!(u.update_block(0.5 + 5e-5, 0.5, 128).is_none()); // sub-epsilon
        assert!(u.update_block(0.6, 0.5, 128).is_some());
    }

    #[test]
    fn test_delta_lands_on_end() {
        let mut u = updater(PerformanceMode::Efficient);
        u.update_immediate(0.0, 0.0);
        let n = 64;
        let update = u.update_block(1.0, 0.3, n).unwrap();

        let start = {
            // Reconstruct start from end - n*delta.
            let mut s = update.end;
            for i in 0..NUM_SECTIONS {
                s[i].b0 -= update.delta[i].b0 * n as Sample;
                s[i].a1 -= update.delta[i].a1 * n as Sample;
                s[i].a2 -= update.delta[i].a2 * n as Sample;
            }
            s
        };
        // Walking n deltas from start must land on end.
        for i in 0..NUM_SECTIONS {
            assert_relative_eq!(
                start[i].a1 + update.delta[i].a1 * n as Sample,
                update.end[i].a1,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_lfo_perturbs_target_morph() {
        let mut u = updater(PerformanceMode::Efficient);
        u.set_lfo(2.0, 1.0);
        let mut morphs = Vec::new();
        for _ in 0..64 {
            u.update_block(0.5, 0.0, 512);
            morphs.push(u.effective_morph());
        }
        let min = morphs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = morphs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max > 0.6 && min < 0.4, "LFO did not move the morph target ({min}..{max})");
        assert!(morphs.iter().all(|m| (0.0..=1.0).contains(m)));
    }

    #[test]
    fn test_pair_change_forces_update() {
        let mut u = updater(PerformanceMode::Efficient);
        u.update_block(0.5, 0.5, 128);
        assert!(u.update_block(0.5, 0.5, 128).is_none());
        u.set_pair(ShapePair::Bell);
        assert!(u.update_block(0.5, 0.5, 128).is_some());
    }

    #[test]
    fn test_morph_sweep_coefficients_move_smoothly() {
        let u = updater(PerformanceMode::Authentic);
        let mut prev = u.compute(0.0, 0.0);
        for step in 1..=200 {
            let m = step as Sample / 200.0;
            let next = u.compute(m, 0.0);
            for i in 0..NUM_SECTIONS {
                let jump = (next[i].a1 - prev[i].a1).abs();
                assert!(jump < 0.05, "a1 jumped {jump} at morph {m}");
            }
            prev = next;
        }
    }
}
