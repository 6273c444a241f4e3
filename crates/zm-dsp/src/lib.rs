//! zm-dsp: Morphable Z-plane filter engine
//!
//! A cascade of six second-order sections whose coefficients are derived
//! from pole positions interpolated between hardware-derived shapes.
//!
//! ## Modules
//! - `pole` - polar pole math: log-space interpolation, bilinear SR remap, pole→biquad
//! - `stability` - reflection-coefficient denominator stabilization
//! - `shapes` - shape bank (embedded tables + optional JSON runtime data)
//! - `biquad` - TDF-II sections with gated feedback saturation, 6-deep cascade
//! - `smoothing` - lock-free smoothed parameters (UI → audio)
//! - `morph` - per-block coefficient update with per-sample interpolation
//! - `saturation` - drive/saturation nonlinearities, auto-makeup gain
//! - `state_transform` - click-free state retargeting across coefficient swaps
//! - `snapshot` - wait-free diagnostic snapshot (audio → UI)
//! - `engine` - stereo engine façade

pub mod biquad;
pub mod engine;
pub mod morph;
pub mod pole;
pub mod saturation;
pub mod shapes;
pub mod smoothing;
pub mod snapshot;
pub mod stability;
pub mod state_transform;

use zm_core::Sample;

/// Reference sample rate the shape tables were captured at
pub const REFERENCE_SR: f64 = 48000.0;

/// Pole radius clamps: all poles live strictly inside the unit circle
pub const MIN_POLE_RADIUS: Sample = 0.10;
pub const MAX_POLE_RADIUS: Sample = 0.9995;

/// Reflection-coefficient magnitude ceiling for denominator stabilization
pub const REFLECTION_CLAMP: Sample = 0.995;

/// Skip the feedback tanh entirely below this saturation amount
pub const SAT_GATE_THRESHOLD: Sample = 1.0e-6;

/// Flush state values below this magnitude to zero (denormal defense)
pub const DENORMAL_THRESHOLD: Sample = 1.0e-20;

/// Number of second-order sections in the cascade
pub const NUM_SECTIONS: usize = 6;

/// Performance mode, selected at configuration time (never per-sample)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceMode {
    /// Geodesic radius, exact tanh, smoothstep morph easing (highest quality)
    Authentic,
    /// Linear radius, fast tanh, gated saturation (2-5x faster)
    #[default]
    Efficient,
}

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Stereo processor trait
pub trait StereoProcessor: Processor {
    /// Process a stereo sample pair
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample);

    /// Process stereo blocks
    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
