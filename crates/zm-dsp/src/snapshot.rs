//! Wait-free diagnostic snapshots (audio → control thread)
//!
//! The audio thread publishes its pole positions and live coefficients
//! once per block through a triple buffer; the control thread reads the
//! freshest complete snapshot whenever it likes. Neither side ever blocks
//! or allocates.

use std::cell::UnsafeCell;

use portable_atomic::{AtomicU32, Ordering};
use serde::{Deserialize, Serialize};
use zm_core::Sample;

use crate::biquad::BiquadCoeffs;
use crate::pole::Pole;
use crate::shapes::ShapePair;
use crate::NUM_SECTIONS;

/// What the engine looked like at the end of a block
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Morph position after LFO modulation
    pub effective_morph: Sample,
    pub intensity: Sample,
    pub pair: ShapePair,
    /// Interpolated, boosted, rate-remapped poles driving the cascade
    pub poles: [Pole; NUM_SECTIONS],
    /// Coefficients the cascade will hold at the start of the next block
    #[serde(skip)]
    pub coeffs: [BiquadCoeffs; NUM_SECTIONS],
    /// Current auto-makeup gain (1.0 when disabled)
    pub makeup_gain: Sample,
    /// Monotonic block counter, lets readers detect staleness
    pub block_count: u64,
}

/// Triple buffer for single-producer single-consumer state handoff
///
/// Index state packs three 2-bit slots: bits 0-1 write, 2-3 ready,
/// 4-5 read, plus a freshness bit. Writer swaps write/ready on publish;
/// reader swaps ready/read only when the freshness bit says the ready slot
/// holds unconsumed data. Both swaps are a single CAS, so neither side
/// waits.
pub struct TripleBuffer<T> {
    buffers: [UnsafeCell<T>; 3],
    state: AtomicU32,
}

const FRESH_BIT: u32 = 1 << 6;

// Access is controlled through the atomic index state: the writer only
// touches the write slot, the reader only the read slot.
unsafe impl<T: Send> Send for TripleBuffer<T> {}
unsafe impl<T: Send> Sync for TripleBuffer<T> {}

impl<T: Clone + Default> TripleBuffer<T> {
    pub fn new(initial: T) -> Self {
        Self {
            buffers: [
                UnsafeCell::new(initial.clone()),
                UnsafeCell::new(initial.clone()),
                UnsafeCell::new(initial),
            ],
            state: AtomicU32::new(0b00_01_10), // write=0, ready=1, read=2
        }
    }

    /// Mutable reference to the write slot (producer side only)
    #[allow(clippy::mut_from_ref)]
    pub fn write(&self) -> &mut T {
        let state = self.state.load(Ordering::Acquire);
        let write_idx = (state & 0b11) as usize;
        unsafe { &mut *self.buffers[write_idx].get() }
    }

    /// Swap write and ready slots, making the last write visible
    pub fn publish(&self) {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let write_idx = state & 0b11;
            let ready_idx = (state >> 2) & 0b11;
            let read_idx = (state >> 4) & 0b11;

            let new_state = ready_idx | (write_idx << 2) | (read_idx << 4) | FRESH_BIT;
            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Freshest published value (consumer side only)
    ///
    /// Re-reading without an intervening publish returns the same value.
    pub fn read(&self) -> &T {
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state & FRESH_BIT == 0 {
                break;
            }
            let write_idx = state & 0b11;
            let ready_idx = (state >> 2) & 0b11;
            let read_idx = (state >> 4) & 0b11;

            let new_state = write_idx | (read_idx << 2) | (ready_idx << 4);
            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let state = self.state.load(Ordering::Acquire);
        let read_idx = ((state >> 4) & 0b11) as usize;
        unsafe { &*self.buffers[read_idx].get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_read() {
        let tb = TripleBuffer::new(42u64);
        assert_eq!(*tb.read(), 42);
    }

    #[test]
    fn test_publish_then_read() {
        let tb = TripleBuffer::new(0u64);
        *tb.write() = 7;
        tb.publish();
        assert_eq!(*tb.read(), 7);

        *tb.write() = 8;
        tb.publish();
        assert_eq!(*tb.read(), 8);
    }

    #[test]
    fn test_read_without_new_publish_keeps_latest() {
        let tb = TripleBuffer::new(0u64);
        *tb.write() = 3;
        tb.publish();
        assert_eq!(*tb.read(), 3);
        assert_eq!(*tb.read(), 3); // no new publish, same value
    }

    #[test]
    fn test_snapshot_round_trip() {
        let tb = TripleBuffer::new(EngineSnapshot::default());
        let snap = tb.write();
        snap.effective_morph = 0.75;
        snap.block_count = 12;
        tb.publish();

        let read = tb.read();
        assert_eq!(read.effective_morph, 0.75);
        assert_eq!(read.block_count, 12);
    }

    #[test]
    fn test_concurrent_writer_reader() {
        let tb = Arc::new(TripleBuffer::new(0u64));
        let writer = {
            let tb = Arc::clone(&tb);
            std::thread::spawn(move || {
                for i in 1..=10_000u64 {
                    *tb.write() = i;
                    tb.publish();
                }
            })
        };

        let mut last = 0;
        for _ in 0..10_000 {
            let v = *tb.read();
            assert!(v >= last, "reads must be monotonic: {v} after {last}");
            last = v;
        }
        writer.join().unwrap();
        assert_eq!(*tb.read(), 10_000);
    }
}
