//! Stereo morphing filter engine
//!
//! Owns the per-channel cascades, the coefficient updater, the drive and
//! makeup stages, and the parameter smoothers, and wires them together
//! once per audio block. Control-thread writes go through a shared
//! [`ZPlaneParams`] handle; diagnostics come back through a wait-free
//! snapshot buffer. The audio path never allocates or locks.

use std::sync::Arc;

use portable_atomic::{AtomicBool, AtomicF64, AtomicU32, AtomicU8, Ordering};
use zm_core::{db_to_gain, BufferSize, Sample, SampleRate, ZmError, ZmResult};

use crate::biquad::Cascade;
use crate::morph::CoefficientUpdater;
use crate::saturation::{drive_sample, AutoMakeup};
use crate::shapes::{ShapeBank, ShapePair};
use crate::smoothing::{SmoothedParam, SmoothingType};
use crate::snapshot::{EngineSnapshot, TripleBuffer};
use crate::state_transform::retarget_cascade;
use crate::{PerformanceMode, Processor, ProcessorConfig, StereoProcessor, REFERENCE_SR};

/// Morph/intensity ramp time constant
const MORPH_SMOOTHING_MS: f64 = 20.0;

/// Gain-style parameter ramp time
const GAIN_SMOOTHING_MS: f64 = 5.0;

const DEFAULT_BLOCK_SIZE: usize = 512;

/// Shared parameter targets, written by the control thread and polled by
/// the audio thread at block boundaries
#[derive(Debug)]
pub struct ZPlaneParams {
    morph: AtomicF64,
    intensity: AtomicF64,
    drive_db: AtomicF64,
    saturation: AtomicF64,
    mix: AtomicF64,
    lfo_rate: AtomicF64,
    lfo_depth: AtomicF64,
    pair: AtomicU32,
    auto_makeup: AtomicBool,
    mode: AtomicU8,
}

impl Default for ZPlaneParams {
    fn default() -> Self {
        Self {
            morph: AtomicF64::new(0.0),
            intensity: AtomicF64::new(0.0),
            drive_db: AtomicF64::new(0.0),
            saturation: AtomicF64::new(0.0),
            mix: AtomicF64::new(1.0),
            lfo_rate: AtomicF64::new(1.0),
            lfo_depth: AtomicF64::new(0.0),
            pair: AtomicU32::new(0),
            auto_makeup: AtomicBool::new(false),
            mode: AtomicU8::new(PerformanceMode::Efficient as u8),
        }
    }
}

impl ZPlaneParams {
    pub fn set_morph(&self, morph: Sample) {
        self.morph.store(morph.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn set_intensity(&self, intensity: Sample) {
        self.intensity.store(intensity.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn set_drive_db(&self, db: Sample) {
        self.drive_db.store(db.clamp(-12.0, 12.0), Ordering::Release);
    }

    pub fn set_saturation(&self, amount: Sample) {
        self.saturation.store(amount.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn set_mix(&self, mix: Sample) {
        self.mix.store(mix.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn set_lfo(&self, rate_hz: f64, depth: Sample) {
        self.lfo_rate.store(rate_hz.clamp(0.02, 8.0), Ordering::Release);
        self.lfo_depth.store(depth.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn set_shape_pair(&self, pair: ShapePair) {
        self.pair.store(pair.index() as u32, Ordering::Release);
    }

    /// Numeric variant for hosts that hand over a raw parameter index
    pub fn set_shape_pair_index(&self, index: usize) {
        self.set_shape_pair(ShapePair::from_index(index));
    }

    pub fn set_auto_makeup(&self, enabled: bool) {
        self.auto_makeup.store(enabled, Ordering::Release);
    }

    /// Quality/CPU trade-off; takes effect at the next block boundary
    pub fn set_performance_mode(&self, mode: PerformanceMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    fn mode(&self) -> PerformanceMode {
        match self.mode.load(Ordering::Acquire) {
            m if m == PerformanceMode::Authentic as u8 => PerformanceMode::Authentic,
            _ => PerformanceMode::Efficient,
        }
    }
}

/// Stereo Z-plane morphing filter
///
/// Ready to process at 48 kHz / 512 samples out of the box; call
/// [`prepare`](Self::prepare) to match the host configuration.
pub struct ZPlaneEngine {
    params: Arc<ZPlaneParams>,
    snapshot: Arc<TripleBuffer<EngineSnapshot>>,

    updater: CoefficientUpdater,
    cascade_l: Cascade,
    cascade_r: Cascade,
    makeup: AutoMakeup,

    morph: SmoothedParam,
    intensity: SmoothedParam,
    drive: SmoothedParam,
    saturation: SmoothedParam,
    mix: SmoothedParam,

    mode: PerformanceMode,
    pair: ShapePair,
    sample_rate: f64,
    block_size: usize,
    block_count: u64,
}

impl Default for ZPlaneEngine {
    fn default() -> Self {
        Self::new(ShapeBank::new())
    }
}

impl ZPlaneEngine {
    pub fn new(bank: ShapeBank) -> Self {
        let sample_rate = REFERENCE_SR;
        Self {
            params: Arc::new(ZPlaneParams::default()),
            snapshot: Arc::new(TripleBuffer::new(EngineSnapshot::default())),
            updater: CoefficientUpdater::new(bank, sample_rate),
            cascade_l: Cascade::default(),
            cascade_r: Cascade::default(),
            makeup: AutoMakeup::new(sample_rate),
            morph: SmoothedParam::with_range(0.0, MORPH_SMOOTHING_MS, sample_rate, SmoothingType::Exponential, 0.0, 1.0),
            intensity: SmoothedParam::with_range(0.0, MORPH_SMOOTHING_MS, sample_rate, SmoothingType::Exponential, 0.0, 1.0),
            drive: SmoothedParam::new(1.0, GAIN_SMOOTHING_MS, sample_rate, SmoothingType::Linear),
            saturation: SmoothedParam::with_range(0.0, GAIN_SMOOTHING_MS, sample_rate, SmoothingType::Linear, 0.0, 1.0),
            mix: SmoothedParam::with_range(1.0, GAIN_SMOOTHING_MS, sample_rate, SmoothingType::Linear, 0.0, 1.0),
            mode: PerformanceMode::default(),
            pair: ShapePair::default(),
            sample_rate,
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: 0,
        }
    }

    /// Parameter handle for the control thread
    pub fn params(&self) -> Arc<ZPlaneParams> {
        Arc::clone(&self.params)
    }

    /// Snapshot handle for the control thread
    pub fn snapshot_handle(&self) -> Arc<TripleBuffer<EngineSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Freshest published snapshot
    pub fn snapshot(&self) -> EngineSnapshot {
        *self.snapshot.read()
    }

    /// Morph position after LFO modulation, as of the last block
    pub fn effective_morph(&self) -> Sample {
        self.updater.effective_morph()
    }

    /// True when the wet path is fully mixed out and settled
    ///
    /// Hosts can skip `process` entirely in this state; the dry signal
    /// would pass through untouched anyway.
    pub fn is_effectively_bypassed(&self) -> bool {
        self.mix.target_value() <= 1e-6 && !self.mix.is_smoothing()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Configure for the host sample rate and maximum block size
    ///
    /// Not realtime-safe; call from the setup thread before processing.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize) -> ZmResult<()> {
        if !sample_rate.is_finite() || sample_rate < 1000.0 {
            return Err(ZmError::InvalidSampleRate(sample_rate));
        }
        if block_size == 0 {
            return Err(ZmError::InvalidParam("block size must be nonzero".into()));
        }

        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.updater.set_sample_rate(sample_rate);
        self.makeup.set_sample_rate(sample_rate);
        self.morph.set_sample_rate(sample_rate);
        self.intensity.set_sample_rate(sample_rate);
        self.drive.set_sample_rate(sample_rate);
        self.saturation.set_sample_rate(sample_rate);
        self.mix.set_sample_rate(sample_rate);

        log::debug!("engine prepared: {sample_rate} Hz, block {block_size}");
        self.reset();
        Ok(())
    }

    /// `prepare` for hosts that expose the standard rate/size enums
    pub fn prepare_config(&mut self, sample_rate: SampleRate, block_size: BufferSize) {
        // Enum values are always valid, so this cannot fail.
        let _ = self.prepare(sample_rate.as_f64(), block_size.as_usize());
    }

    /// Shape bank access for startup-time data loading
    pub fn bank_mut(&mut self) -> &mut ShapeBank {
        self.updater.bank_mut()
    }

    // Pull control-thread targets into the audio-side smoothers. Returns
    // true when the shape pair switched, which needs special handling.
    fn poll_params(&mut self) -> bool {
        let p = &self.params;
        self.morph.set_target(p.morph.load(Ordering::Acquire));
        self.intensity.set_target(p.intensity.load(Ordering::Acquire));
        self.drive
            .set_target(db_to_gain(p.drive_db.load(Ordering::Acquire)));
        self.saturation
            .set_target(p.saturation.load(Ordering::Acquire));
        self.mix.set_target(p.mix.load(Ordering::Acquire));

        let pair = ShapePair::from_index(p.pair.load(Ordering::Acquire) as usize);
        let pair_changed = pair != self.pair;
        if pair_changed {
            self.pair = pair;
            self.updater.set_pair(pair);
        }
        self.updater.set_lfo(
            p.lfo_rate.load(Ordering::Acquire),
            p.lfo_depth.load(Ordering::Acquire),
        );
        self.makeup.set_enabled(p.auto_makeup.load(Ordering::Acquire));

        let mode = p.mode();
        if mode != self.mode {
            self.mode = mode;
            self.updater.set_mode(mode);
            self.cascade_l.set_performance_mode(mode);
            self.cascade_r.set_performance_mode(mode);
        }

        pair_changed
    }

    /// Process one stereo block in place
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        let n = left.len().min(right.len());
        if n == 0 {
            return;
        }

        let pair_changed = self.poll_params();

        let makeup_enabled = self.makeup.enabled();
        let mut in_sumsq = 0.0;
        if makeup_enabled {
            for i in 0..n {
                in_sumsq += left[i] * left[i] + right[i] * right[i];
            }
        }

        self.morph.skip(n);
        self.intensity.skip(n);
        self.saturation.skip(n);
        self.mix.skip(n);

        let sat = self.saturation.current();
        self.cascade_l.set_saturation(sat);
        self.cascade_r.set_saturation(sat);

        // A pair switch is a discontinuous coefficient jump; swap
        // immediately and remap the delay state for output continuity
        // instead of ramping through unrelated intermediate filters.
        let update = if pair_changed {
            let old = *self.updater.current_coeffs();
            let end = self
                .updater
                .update_immediate(self.morph.current(), self.intensity.current());
            retarget_cascade(&old, &end, &mut self.cascade_l);
            retarget_cascade(&old, &end, &mut self.cascade_r);
            for i in 0..end.len() {
                self.cascade_l.sections[i].set_coeffs(end[i]);
                self.cascade_r.sections[i].set_coeffs(end[i]);
            }
            None
        } else {
            self.updater
                .update_block(self.morph.current(), self.intensity.current(), n)
        };

        let mix = self.mix.current();
        let wet_gain = mix.sqrt();
        let dry_gain = (1.0 - mix).sqrt();
        let makeup_gain = if makeup_enabled { self.makeup.gain() } else { 1.0 };

        let mut out_sumsq = 0.0;
        for i in 0..n {
            let drive_gain = self.drive.next_value();
            let dry_l = left[i];
            let dry_r = right[i];

            let mut wet_l = self.cascade_l.process(drive_sample(dry_l, drive_gain));
            let mut wet_r = self.cascade_r.process(drive_sample(dry_r, drive_gain));

            if let Some(u) = &update {
                self.cascade_l.step_coeffs(&u.delta);
                self.cascade_r.step_coeffs(&u.delta);
            }

            wet_l *= makeup_gain;
            wet_r *= makeup_gain;

            // Equal-power wet/dry crossfade, then the output safety clamp.
            // The clamp is the last operation, always.
            let out_l = (wet_gain * wet_l + dry_gain * dry_l).clamp(-1.0, 1.0);
            let out_r = (wet_gain * wet_r + dry_gain * dry_r).clamp(-1.0, 1.0);

            if makeup_enabled {
                out_sumsq += out_l * out_l + out_r * out_r;
            }
            left[i] = out_l;
            right[i] = out_r;
        }

        // Per-sample deltas accumulate rounding error; land exactly on the
        // block's target coefficients.
        if let Some(u) = &update {
            for i in 0..u.end.len() {
                self.cascade_l.sections[i].set_coeffs(u.end[i]);
                self.cascade_r.sections[i].set_coeffs(u.end[i]);
            }
        }

        if makeup_enabled {
            let samples = (2 * n) as Sample;
            let in_rms = (in_sumsq / samples).sqrt();
            let out_rms = (out_sumsq / samples).sqrt();
            self.makeup.update_from_rms(in_rms, out_rms, n);
        }

        self.block_count += 1;
        self.publish_snapshot();
    }

    fn publish_snapshot(&mut self) {
        let snap = self.snapshot.write();
        snap.effective_morph = self.updater.effective_morph();
        snap.intensity = self.intensity.current();
        snap.pair = ShapePair::from_index(self.params.pair.load(Ordering::Acquire) as usize);
        snap.poles = *self.updater.current_poles();
        snap.coeffs = *self.updater.current_coeffs();
        snap.makeup_gain = self.makeup.gain();
        snap.block_count = self.block_count;
        self.snapshot.publish();
    }
}

impl Processor for ZPlaneEngine {
    fn reset(&mut self) {
        self.cascade_l.reset();
        self.cascade_r.reset();
        self.updater.reset();
        self.makeup.reset();
        self.morph.snap_to(self.params.morph.load(Ordering::Acquire));
        self.intensity
            .snap_to(self.params.intensity.load(Ordering::Acquire));
        self.drive
            .snap_to(db_to_gain(self.params.drive_db.load(Ordering::Acquire)));
        self.saturation
            .snap_to(self.params.saturation.load(Ordering::Acquire));
        self.mix.snap_to(self.params.mix.load(Ordering::Acquire));
    }
}

impl ProcessorConfig for ZPlaneEngine {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let block = self.block_size;
        if let Err(e) = self.prepare(sample_rate, block) {
            log::warn!("ignoring invalid sample rate: {e}");
        }
    }
}

impl StereoProcessor for ZPlaneEngine {
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let mut l = [left];
        let mut r = [right];
        self.process(&mut l, &mut r);
        (l[0], r[0])
    }

    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.process(left, right);
    }
}
