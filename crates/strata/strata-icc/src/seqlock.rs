//! Sequence locks for single-writer, multi-reader shared memory.
//!
//! # Protocol
//!
//! **Writer:**
//! 1. Bump seq to odd (write in progress), then a release fence
//! 2. Write the protected bytes
//! 3. Store seq + 2 (even) with Release
//!
//! **Reader:**
//! 1. Load seq with Acquire; spin while odd
//! 2. Copy the protected bytes
//! 3. Acquire fence, reload seq; if it moved, the copy may be torn, retry
//!
//! [`SeqCounter`] is the bare counter, used directly by the frame buffer where
//! the protected region is a variable-length byte range next to the counter.
//! [`SeqlockSlot`] bundles a counter with one `Copy` value, used by the id
//! broadcast ring.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Sequence counter: odd = write in progress, even = stable.
#[repr(transparent)]
pub struct SeqCounter(AtomicU64);

impl SeqCounter {
    #[inline(always)]
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Marks a write as started and returns the token for [`SeqCounter::write_end`].
    ///
    /// Only one writer may hold a token for a given counter at a time.
    #[inline(always)]
    pub fn write_begin(&self) -> u64 {
        let s0 = self.0.load(Ordering::Relaxed);
        self.0.store(s0.wrapping_add(1), Ordering::Relaxed);
        // Keeps the protected writes from being reordered before the odd marker.
        fence(Ordering::Release);
        s0
    }

    #[inline(always)]
    pub fn write_end(&self, s0: u64) {
        self.0.store(s0.wrapping_add(2), Ordering::Release);
    }

    /// Waits for a stable (even) sequence and returns it.
    #[inline(always)]
    pub fn read_begin(&self) -> u64 {
        loop {
            let s = self.0.load(Ordering::Acquire);
            if s & 1 == 0 {
                return s;
            }
            std::hint::spin_loop();
        }
    }

    /// `true` if a write overlapped the read that started at `s1`.
    #[inline(always)]
    pub fn read_retry(&self, s1: u64) -> bool {
        fence(Ordering::Acquire);
        self.0.load(Ordering::Relaxed) != s1
    }
}

/// A single `Copy` value protected by a [`SeqCounter`].
///
/// ```text
/// ┌──────────────────┬──────────────────┐
/// │  seq (8B atomic) │  data: T         │
/// └──────────────────┴──────────────────┘
/// ```
#[repr(C, align(64))]
pub struct SeqlockSlot<T: Copy> {
    seq: SeqCounter,
    /// Left uninitialized until the first `write()`.
    data: MaybeUninit<T>,
}

impl<T: Copy> SeqlockSlot<T> {
    #[inline(always)]
    pub fn init(&mut self) {
        self.seq.reset();
    }

    #[inline(always)]
    pub fn write(&mut self, value: T) {
        let s0 = self.seq.write_begin();
        // SAFETY: single writer per slot; the pointer is valid for the slot's lifetime.
        unsafe { self.data.as_mut_ptr().write_volatile(value) };
        self.seq.write_end(s0);
    }

    /// Reads a consistent snapshot, spinning while a write is in flight.
    ///
    /// Must only be called on slots that have been written at least once; the
    /// broadcast ring guarantees this by never reading past `write_seq`.
    #[inline(always)]
    pub fn read(&self) -> T {
        loop {
            let s1 = self.seq.read_begin();
            // SAFETY: the slot was written before `write_seq` advanced past it;
            // a torn copy is detected and discarded below.
            let v = unsafe { self.data.as_ptr().read_volatile() };
            if !self.seq.read_retry(s1) {
                return v;
            }
            std::hint::spin_loop();
        }
    }
}
