//! Index arithmetic shared by the two shared-memory rings in this crate.
//!
//! - The id broadcast ring is sequence-addressed: capacity is a power of two and
//!   `seq & mask` picks the slot. Readers that fall more than `capacity` behind are
//!   fast-forwarded (see [`apply_overrun_policy`]).
//! - The frame buffer is id-addressed: any slot count is allowed and the frame id
//!   picks the slot with `id % n_slots` (see [`slot_index`]).

/// Configuration for a sequence-addressed broadcast ring.
#[derive(Debug, Copy, Clone)]
pub struct RingConfig {
    /// Number of slots in the ring. Must be a power of 2.
    pub capacity: usize,
}

impl RingConfig {
    /// # Panics
    /// Panics if `capacity` is not a power of 2.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "Capacity must be power of 2");
        Self { capacity }
    }

    /// Smallest valid configuration holding at least `min_capacity` entries.
    ///
    /// ```
    /// use strata_icc::RingConfig;
    /// assert_eq!(RingConfig::at_least(1000).capacity, 1024);
    /// assert_eq!(RingConfig::at_least(0).capacity, 1);
    /// ```
    pub fn at_least(min_capacity: usize) -> Self {
        Self::new(min_capacity.max(1).next_power_of_two())
    }

    /// `capacity - 1`; `seq & mask` is equivalent to `seq % capacity`.
    #[inline(always)]
    pub fn mask(&self) -> u64 {
        (self.capacity as u64) - 1
    }
}

/// Maps a broadcast sequence number to a slot in `[0, capacity)`.
///
/// ```text
/// capacity = 8 (mask = 0b111)
/// seq =  5 → 5
/// seq =  8 → 0  (wraps)
/// seq = 15 → 7
/// ```
#[inline(always)]
pub fn seq_to_index(seq: u64, mask: u64) -> u64 {
    seq & mask
}

/// Maps a frame id to its buffer slot.
///
/// This is the only address arithmetic of the frame buffer: frame `k` and frame
/// `n_slots + k` share a slot, and the later write wins.
#[inline(always)]
pub fn slot_index(id: u64, n_slots: usize) -> usize {
    (id % n_slots as u64) as usize
}

/// Fast-forwards a reader that the writer has lapped.
///
/// If the reader is more than `capacity` entries behind, the skipped entries are
/// added to `overruns` and `read_seq` jumps to the oldest entry still present:
///
/// ```text
/// capacity = 8, write_seq = 20, read_seq = 5
/// behind = 15 > 8 → overruns += 7, read_seq = 12
/// ```
#[inline(always)]
pub fn apply_overrun_policy(write_seq: u64, read_seq: &mut u64, capacity: u64, overruns: &mut u64) {
    let behind = write_seq.saturating_sub(*read_seq);
    if behind > capacity {
        *overruns += behind - capacity;
        *read_seq = write_seq - capacity;
    }
}
