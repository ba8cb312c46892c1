//! Fixed-capacity SPSC ring buffer.
//!
//! Capacity is a `const` power of two so index wrap is a mask instead of a
//! modulo. `rd`/`wr` are monotonically increasing counters (never wrapped to
//! `0..N`); the physical slot is `counter & (N - 1)`. A single `Ring` is split
//! once into a `Producer` and a `Consumer` so the single-producer/
//! single-consumer contract is a type-level fact rather than a convention,
//! the way `heapless::spsc::Queue::split` does it.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A fixed-capacity ring of `N` elements of type `T`. `N` must be a power of
/// two; construction panics otherwise (this is a programmer error, not a
/// runtime condition, so it belongs at the type/constructor boundary rather
/// than threaded through every operation as a `Result`).
pub struct Ring<T, const N: usize> {
    buf: UnsafeCell<[MaybeUninit<T>; N]>,
    rd: AtomicUsize,
    wr: AtomicUsize,
}

unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}

impl<T, const N: usize> Ring<T, N> {
    const MASK: usize = N - 1;

    /// Build an empty ring. `N` must be a nonzero power of two.
    pub const fn new() -> Self {
        assert!(N > 0 && N & (N - 1) == 0, "ring capacity must be a power of two");
        Self {
            buf: UnsafeCell::new([const { MaybeUninit::uninit() }; N]),
            rd: AtomicUsize::new(0),
            wr: AtomicUsize::new(0),
        }
    }

    /// Split into a producer and consumer handle. Each handle may only be
    /// used from one side of the queue; there is no way to obtain a second
    /// producer or consumer for the same ring.
    pub fn split(&mut self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        (Producer { ring: self }, Consumer { ring: self })
    }

    fn occupancy(&self) -> usize {
        self.wr.load(Ordering::Acquire).wrapping_sub(self.rd.load(Ordering::Acquire))
    }
}

impl<T, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer half: the only handle allowed to advance `wr`.
pub struct Producer<'a, T, const N: usize> {
    ring: &'a Ring<T, N>,
}

/// Consumer half: the only handle allowed to advance `rd`.
pub struct Consumer<'a, T, const N: usize> {
    ring: &'a Ring<T, N>,
}

impl<'a, T: Copy, const N: usize> Producer<'a, T, N> {
    /// Remaining free slots.
    pub fn remain_space(&self) -> usize {
        N - self.ring.occupancy()
    }

    pub fn is_full(&self) -> bool {
        self.remain_space() == 0
    }

    /// Copy up to `min(src.len(), remain_space())` elements in; returns the
    /// count actually written.
    pub fn add(&mut self, src: &[T]) -> usize {
        let n = src.len().min(self.remain_space());
        if n < src.len() {
            crate::fmt::warn_log!("ring overflow: dropping {} of {} elements", src.len() - n, src.len());
        }
        let wr = self.ring.wr.load(Ordering::Relaxed);
        // SAFETY: only the producer writes to slots at or after `wr`, and
        // those slots are not visible to the consumer until `wr` advances.
        let buf = unsafe { &mut *self.ring.buf.get() };
        for (i, item) in src.iter().take(n).enumerate() {
            let slot = (wr.wrapping_add(i)) & Ring::<T, N>::MASK;
            buf[slot].write(*item);
        }
        self.ring.wr.store(wr.wrapping_add(n), Ordering::Release);
        n
    }

    /// DMA-style producer: the backing bytes were already written by an
    /// external agent (e.g. a DMA engine); this just publishes the new write
    /// index. Clamps `k` to the available free space rather than trusting
    /// the caller blindly.
    pub fn advance_wr(&mut self, k: usize) -> usize {
        let k = k.min(self.remain_space());
        let wr = self.ring.wr.load(Ordering::Relaxed);
        self.ring.wr.store(wr.wrapping_add(k), Ordering::Release);
        k
    }

    /// Direct access to the backing slots so a DMA engine can be pointed at
    /// them; caller must follow with `advance_wr`.
    pub fn write_slot_ptr(&mut self) -> *mut T {
        let wr = self.ring.wr.load(Ordering::Relaxed);
        let buf = unsafe { &mut *self.ring.buf.get() };
        buf[wr & Ring::<T, N>::MASK].as_mut_ptr()
    }
}

impl<'a, T: Copy, const N: usize> Consumer<'a, T, N> {
    pub fn occupancy(&self) -> usize {
        self.ring.occupancy()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// Copy up to `min(dst.len(), occupancy())` elements out and advance
    /// `rd`; returns the count actually read.
    pub fn get(&mut self, dst: &mut [T]) -> usize {
        let n = self.peek(dst);
        let rd = self.ring.rd.load(Ordering::Relaxed);
        self.ring.rd.store(rd.wrapping_add(n), Ordering::Release);
        n
    }

    /// Same as `get` but does not advance `rd`.
    pub fn peek(&self, dst: &mut [T]) -> usize {
        let n = dst.len().min(self.occupancy());
        let rd = self.ring.rd.load(Ordering::Relaxed);
        let buf = unsafe { &*self.ring.buf.get() };
        for (i, slot) in dst.iter_mut().take(n).enumerate() {
            let idx = (rd.wrapping_add(i)) & Ring::<T, N>::MASK;
            *slot = unsafe { buf[idx].assume_init() };
        }
        n
    }

    /// Discard `k` elements (clamped to occupancy) without copying them out.
    pub fn advance_rd(&mut self, k: usize) -> usize {
        let k = k.min(self.occupancy());
        let rd = self.ring.rd.load(Ordering::Relaxed);
        self.ring.rd.store(rd.wrapping_add(k), Ordering::Release);
        k
    }

    /// The current read counter, in the ring's monotonic index space. Used
    /// by the frame parser to anchor its sliding window.
    pub fn rd_counter(&self) -> usize {
        self.ring.rd.load(Ordering::Relaxed)
    }

    /// The current write counter, in the ring's monotonic index space.
    pub fn wr_counter(&self) -> usize {
        self.ring.wr.load(Ordering::Acquire)
    }

    /// Non-destructively read the element at absolute index `idx` (in the
    /// ring's monotonic index space). Returns `None` if `idx` is outside
    /// `[rd, wr)`.
    pub fn peek_at(&self, idx: usize) -> Option<T> {
        let rd = self.rd_counter();
        let wr = self.wr_counter();
        if idx < rd || idx >= wr {
            return None;
        }
        let buf = unsafe { &*self.ring.buf.get() };
        Some(unsafe { buf[idx & Ring::<T, N>::MASK].assume_init() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_add_get() {
        let mut ring: Ring<u8, 8> = Ring::new();
        let (mut p, mut c) = ring.split();
        let wrote = p.add(&[1, 2, 3, 4]);
        assert_eq!(wrote, 4);
        let mut out = [0u8; 4];
        let read = c.get(&mut out);
        assert_eq!(read, 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(c.is_empty());
    }

    #[test]
    fn peek_does_not_advance() {
        let mut ring: Ring<u8, 4> = Ring::new();
        let (mut p, mut c) = ring.split();
        p.add(&[9, 8]);
        let mut out = [0u8; 2];
        assert_eq!(c.peek(&mut out), 2);
        assert_eq!(out, [9, 8]);
        assert_eq!(c.occupancy(), 2);
        assert_eq!(c.get(&mut out), 2);
        assert_eq!(c.occupancy(), 0);
    }

    #[test]
    fn full_queue_rejects_excess() {
        let mut ring: Ring<u8, 4> = Ring::new();
        let (mut p, _c) = ring.split();
        let wrote = p.add(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(wrote, 4);
        assert!(p.is_full());
    }

    #[test]
    fn wraparound_preserves_order() {
        let mut ring: Ring<u8, 4> = Ring::new();
        let (mut p, mut c) = ring.split();
        p.add(&[1, 2, 3]);
        let mut out = [0u8; 2];
        c.get(&mut out);
        p.add(&[4, 5]);
        let mut rest = [0u8; 3];
        let n = c.get(&mut rest);
        assert_eq!(n, 3);
        assert_eq!(rest, [3, 4, 5]);
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let mut ring: Ring<u8, 8> = Ring::new();
        let (mut p, mut c) = ring.split();
        for round in 0..50u8 {
            p.add(&[round; 3]);
            assert!(c.occupancy() <= 8);
            let mut buf = [0u8; 2];
            c.get(&mut buf);
        }
    }

    #[test]
    fn advance_wr_clamps_to_free_space() {
        let mut ring: Ring<u8, 4> = Ring::new();
        let (mut p, c) = ring.split();
        let advanced = p.advance_wr(10);
        assert_eq!(advanced, 4);
        assert_eq!(c.occupancy(), 4);
    }
}
