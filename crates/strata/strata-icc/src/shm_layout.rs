//! Binary layouts of the two shared-memory regions.
//!
//! # Id broadcast ring
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ BroadcastHeader: magic | version | capacity | elem_size |    │
//! │                  write_seq (atomic) | epoch (atomic)         │
//! │                  (padded to 64B)                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ SeqlockSlot<T>[0] .. SeqlockSlot<T>[capacity-1]              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Frame buffer
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ BufferHeader: magic | version | n_slots | meta_bytes |       │
//! │               data_bytes | slot_stride     (padded to 64B)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ slot 0: SlotHeader (64B) | meta[meta_bytes] | data[data_bytes]│
//! │         padded to slot_stride                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ slot 1 ..                                                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The broadcast header carries an epoch that every writer bumps when it
//! (re)creates the ring on an existing file, so readers attached to the
//! previous writer can tell that `write_seq` started over.
//!
//! Every slot records the id that owns it so readers can tell a fresh slot from
//! one that has since been recycled for `id + k * n_slots`.

use crate::seqlock::{SeqCounter, SeqlockSlot};
use std::mem::{align_of, size_of};
use std::sync::atomic::AtomicU64;

/// ASCII "STRATAID".
pub const BROADCAST_MAGIC: u64 = 0x5354_5241_5441_4944;

/// ASCII "STRATABF".
pub const BUFFER_MAGIC: u64 = 0x5354_5241_5441_4246;

/// Bump on any incompatible layout change; readers reject mismatches.
pub const LAYOUT_VERSION: u64 = 1;

/// Owner id of a slot that has never been written.
pub const EMPTY_SLOT: u64 = u64::MAX;

const CACHE_LINE: usize = 64;

/// Cache-line aligned so the slot array that follows starts on a boundary
/// matching `SeqlockSlot`'s alignment.
#[repr(C, align(64))]
pub struct BroadcastHeader {
    pub magic: u64,
    pub version: u64,
    /// Number of slots. Must be a power of 2.
    pub capacity: u64,
    /// `size_of::<T>()` of the published element type.
    pub elem_size: u64,
    /// Count of published items since the current writer created the ring.
    pub write_seq: AtomicU64,
    /// Incremented by every writer that (re)initialises the ring.
    pub epoch: AtomicU64,
}

impl BroadcastHeader {
    pub fn validate<T: Copy>(&self) -> Result<(), &'static str> {
        if self.magic != BROADCAST_MAGIC {
            return Err("Bad magic");
        }
        if self.version != LAYOUT_VERSION {
            return Err("Wrong version");
        }
        if !(self.capacity as usize).is_power_of_two() {
            return Err("Capacity must be power of two");
        }
        if self.elem_size as usize != size_of::<T>() {
            return Err("Element size mismatch");
        }
        Ok(())
    }
}

/// Byte offset of the first `SeqlockSlot<T>` in a broadcast region.
#[inline(always)]
pub const fn broadcast_slots_offset<T: Copy>() -> usize {
    round_up(size_of::<BroadcastHeader>(), align_of::<SeqlockSlot<T>>())
}

pub fn bytes_for_broadcast<T: Copy>(capacity: usize) -> usize {
    broadcast_slots_offset::<T>() + capacity * size_of::<SeqlockSlot<T>>()
}

#[repr(C)]
pub struct BufferHeader {
    pub magic: u64,
    pub version: u64,
    pub n_slots: u64,
    pub meta_bytes: u64,
    pub data_bytes: u64,
    pub slot_stride: u64,
}

/// Bytes reserved for [`BufferHeader`]; slots start on the next cache line.
pub const BUFFER_HEADER_BYTES: usize = round_up(size_of::<BufferHeader>(), CACHE_LINE);

impl BufferHeader {
    pub fn validate(&self) -> Result<SlotLayout, &'static str> {
        if self.magic != BUFFER_MAGIC {
            return Err("Bad magic");
        }
        if self.version != LAYOUT_VERSION {
            return Err("Wrong version");
        }
        if self.n_slots == 0 {
            return Err("Buffer has no slots");
        }
        let layout = SlotLayout::new(
            self.n_slots as usize,
            self.meta_bytes as usize,
            self.data_bytes as usize,
        );
        if layout.stride as u64 != self.slot_stride {
            return Err("Slot stride mismatch");
        }
        Ok(layout)
    }
}

/// Per-slot bookkeeping, one cache line ahead of the slot's payload.
#[repr(C, align(64))]
pub struct SlotHeader {
    pub seq: SeqCounter,
    /// Frame id that last wrote this slot, or [`EMPTY_SLOT`].
    pub owner: AtomicU64,
    pub meta_len: AtomicU64,
    pub data_len: AtomicU64,
}

const _: () = assert!(size_of::<SlotHeader>() == CACHE_LINE);
const _: () = assert!(BUFFER_HEADER_BYTES == CACHE_LINE);
const _: () = assert!(size_of::<BroadcastHeader>() == CACHE_LINE);

/// Derived geometry of the frame buffer region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub n_slots: usize,
    pub meta_bytes: usize,
    pub data_bytes: usize,
    pub stride: usize,
}

impl SlotLayout {
    pub fn new(n_slots: usize, meta_bytes: usize, data_bytes: usize) -> Self {
        let stride = round_up(size_of::<SlotHeader>() + meta_bytes + data_bytes, CACHE_LINE);
        Self {
            n_slots,
            meta_bytes,
            data_bytes,
            stride,
        }
    }

    #[inline(always)]
    pub fn slot_offset(&self, idx: usize) -> usize {
        BUFFER_HEADER_BYTES + idx * self.stride
    }

    #[inline(always)]
    pub fn meta_offset(&self, idx: usize) -> usize {
        self.slot_offset(idx) + size_of::<SlotHeader>()
    }

    #[inline(always)]
    pub fn data_offset(&self, idx: usize) -> usize {
        self.meta_offset(idx) + self.meta_bytes
    }

    pub fn total_bytes(&self) -> usize {
        BUFFER_HEADER_BYTES + self.n_slots * self.stride
    }
}

const fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_cache_line_aligned() {
        let layout = SlotLayout::new(3, 64, 1000);
        assert_eq!(layout.stride % 64, 0);
        assert!(layout.stride >= 64 + 64 + 1000);
        assert_eq!(layout.slot_offset(0), 64);
        assert_eq!(layout.slot_offset(2) % 64, 0);
        assert_eq!(layout.data_offset(1), layout.slot_offset(1) + 64 + 64);
        assert_eq!(layout.total_bytes(), 64 + 3 * layout.stride);
    }

    #[test]
    fn broadcast_slots_are_aligned() {
        let offset = broadcast_slots_offset::<u64>();
        assert_eq!(offset % align_of::<SeqlockSlot<u64>>(), 0);
        assert!(offset >= size_of::<BroadcastHeader>());
        assert_eq!(
            bytes_for_broadcast::<u64>(8),
            offset + 8 * size_of::<SeqlockSlot<u64>>()
        );

        // Larger elements spill into a second cache line per slot.
        let offset = broadcast_slots_offset::<[u64; 12]>();
        assert_eq!(offset % align_of::<SeqlockSlot<[u64; 12]>>(), 0);
        assert_eq!(size_of::<SeqlockSlot<[u64; 12]>>() % 64, 0);
    }

    #[test]
    fn header_rejects_foreign_regions() {
        let layout = SlotLayout::new(4, 64, 128);
        let mut h = BufferHeader {
            magic: BUFFER_MAGIC,
            version: LAYOUT_VERSION,
            n_slots: 4,
            meta_bytes: 64,
            data_bytes: 128,
            slot_stride: layout.stride as u64,
        };
        assert_eq!(h.validate(), Ok(layout));

        h.slot_stride += 64;
        assert_eq!(h.validate(), Err("Slot stride mismatch"));

        h.magic = BROADCAST_MAGIC;
        assert_eq!(h.validate(), Err("Bad magic"));
    }
}
