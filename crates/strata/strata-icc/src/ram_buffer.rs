//! Id-indexed frame buffer in shared memory.
//!
//! A fixed number of slots, each holding up to `meta_bytes` of frame metadata
//! and `data_bytes` of frame payload. Frame `id` always lives in slot
//! `id % n_slots`; writing it overwrites whatever was there, without waiting for
//! readers. Readers copy a slot out under its seqlock and get
//! [`RingError::Stale`] when the slot has been recycled for another id.
//!
//! One process owns the writable [`RingBuffer`]; any number of processes open
//! the same region read-only with [`RingReader`].

use crate::error::RingError;
use crate::ring::slot_index;
use crate::shm_layout::{
    BUFFER_HEADER_BYTES, BUFFER_MAGIC, BufferHeader, EMPTY_SLOT, LAYOUT_VERSION, SlotHeader,
    SlotLayout,
};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::Ordering;
use strata_mmap::{MmapFile, MmapFileMut};

/// Sizing of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub n_slots: usize,
    pub meta_bytes: usize,
    pub data_bytes: usize,
}

/// Result of a successful slot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRead {
    pub id: u64,
    pub meta_len: usize,
    pub data_len: usize,
}

/// Writable side of a frame buffer.
pub struct RingBuffer {
    _mm: MmapFileMut,
    base: *mut u8,
    layout: SlotLayout,
    path: PathBuf,
}

/// Read-only view of a frame buffer created by another process (or this one).
pub struct RingReader {
    _mm: MmapFile,
    base: *const u8,
    layout: SlotLayout,
}

unsafe impl Send for RingBuffer {}
unsafe impl Send for RingReader {}

impl RingBuffer {
    /// Creates (truncating) the region at `path`, writes the header and marks
    /// every slot empty.
    pub fn create(path: impl AsRef<Path>, cfg: BufferConfig) -> Result<Self, RingError> {
        let path = path.as_ref().to_path_buf();
        if cfg.n_slots == 0 {
            return Err(RingError::Layout {
                path,
                reason: "Buffer has no slots",
            });
        }
        let layout = SlotLayout::new(cfg.n_slots, cfg.meta_bytes, cfg.data_bytes);
        let mut mm = MmapFileMut::create_rw(&path, layout.total_bytes() as u64).map_err(|source| {
            RingError::Map {
                path: path.clone(),
                source,
            }
        })?;
        let base = mm.as_mut_ptr();

        // SAFETY: the mapping covers at least `total_bytes`, sized from `layout`.
        // A region left by a previous writer is fully reinitialised here.
        unsafe {
            ptr::write(
                base as *mut BufferHeader,
                BufferHeader {
                    magic: BUFFER_MAGIC,
                    version: LAYOUT_VERSION,
                    n_slots: layout.n_slots as u64,
                    meta_bytes: layout.meta_bytes as u64,
                    data_bytes: layout.data_bytes as u64,
                    slot_stride: layout.stride as u64,
                },
            );
            for idx in 0..layout.n_slots {
                let h = &*(base.add(layout.slot_offset(idx)) as *const SlotHeader);
                h.seq.reset();
                h.owner.store(EMPTY_SLOT, Ordering::Relaxed);
                h.meta_len.store(0, Ordering::Relaxed);
                h.data_len.store(0, Ordering::Relaxed);
            }
        }

        tracing::debug!(
            path = %path.display(),
            n_slots = layout.n_slots,
            meta_bytes = layout.meta_bytes,
            data_bytes = layout.data_bytes,
            "frame buffer created"
        );

        Ok(Self {
            _mm: mm,
            base,
            layout,
            path,
        })
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies `meta` and `data` into the slot of `id`, replacing its contents.
    pub fn write(&mut self, id: u64, meta: &[u8], data: &[u8]) -> Result<(), RingError> {
        if meta.len() > self.layout.meta_bytes {
            return Err(RingError::TooLarge {
                what: "meta",
                len: meta.len(),
                max: self.layout.meta_bytes,
            });
        }
        if data.len() > self.layout.data_bytes {
            return Err(RingError::TooLarge {
                what: "data",
                len: data.len(),
                max: self.layout.data_bytes,
            });
        }
        self.write_with(id, |m, d| {
            m[..meta.len()].copy_from_slice(meta);
            d[..data.len()].copy_from_slice(data);
            (meta.len(), data.len())
        })
    }

    /// Fills the slot of `id` in place.
    ///
    /// `fill` receives the full meta and data regions of the slot and returns how
    /// many bytes of each it populated (clamped to the region sizes).
    pub fn write_with<F>(&mut self, id: u64, fill: F) -> Result<(), RingError>
    where
        F: FnOnce(&mut [u8], &mut [u8]) -> (usize, usize),
    {
        if id == EMPTY_SLOT {
            return Err(RingError::ReservedId(id));
        }
        let idx = slot_index(id, self.layout.n_slots);

        // SAFETY: idx < n_slots, so every offset lies inside the mapping. This is
        // the only writer; concurrent readers detect the overlap via the seqlock.
        unsafe {
            let h = &*(self.base.add(self.layout.slot_offset(idx)) as *const SlotHeader);
            let meta = std::slice::from_raw_parts_mut(
                self.base.add(self.layout.meta_offset(idx)),
                self.layout.meta_bytes,
            );
            let data = std::slice::from_raw_parts_mut(
                self.base.add(self.layout.data_offset(idx)),
                self.layout.data_bytes,
            );

            let token = h.seq.write_begin();
            h.owner.store(id, Ordering::Relaxed);
            let (meta_len, data_len) = fill(meta, data);
            h.meta_len
                .store(meta_len.min(self.layout.meta_bytes) as u64, Ordering::Relaxed);
            h.data_len
                .store(data_len.min(self.layout.data_bytes) as u64, Ordering::Relaxed);
            h.seq.write_end(token);
        }
        Ok(())
    }

    pub fn get_data(&self, id: u64) -> Result<Vec<u8>, RingError> {
        // SAFETY: base/layout describe the mapping we own.
        unsafe { copy_out(self.base, &self.layout, id, Region::Data) }
    }

    pub fn get_meta(&self, id: u64) -> Result<Vec<u8>, RingError> {
        // SAFETY: as above.
        unsafe { copy_out(self.base, &self.layout, id, Region::Meta) }
    }

    pub fn read_into(&self, id: u64, meta: &mut [u8], data: &mut [u8]) -> Result<SlotRead, RingError> {
        // SAFETY: as above.
        unsafe { read_slot(self.base, &self.layout, id, Some(meta), Some(data)) }
    }

    /// Id currently owning the slot that `id` maps to.
    pub fn slot_owner(&self, id: u64) -> Option<u64> {
        // SAFETY: as above.
        unsafe { slot_owner(self.base, &self.layout, id) }
    }
}

impl RingReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RingError> {
        let path = path.as_ref();
        let mm = MmapFile::open_ro(path).map_err(|source| RingError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        let layout_err = |reason| RingError::Layout {
            path: path.to_path_buf(),
            reason,
        };
        if mm.len() < BUFFER_HEADER_BYTES {
            return Err(layout_err("Region smaller than header"));
        }
        let base = mm.as_ptr();

        // SAFETY: length checked above; validate() rejects foreign contents.
        let header = unsafe { &*(base as *const BufferHeader) };
        let layout = header.validate().map_err(layout_err)?;
        if mm.len() < layout.total_bytes() {
            return Err(layout_err("Region smaller than declared slots"));
        }

        Ok(Self {
            _mm: mm,
            base,
            layout,
        })
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub fn get_data(&self, id: u64) -> Result<Vec<u8>, RingError> {
        // SAFETY: layout was validated against the mapping length in `open`.
        unsafe { copy_out(self.base, &self.layout, id, Region::Data) }
    }

    pub fn get_meta(&self, id: u64) -> Result<Vec<u8>, RingError> {
        // SAFETY: as above.
        unsafe { copy_out(self.base, &self.layout, id, Region::Meta) }
    }

    /// Allocation-free read of both regions. Either output must be at least as
    /// large as the stored length, otherwise [`RingError::BufferTooSmall`].
    pub fn read_into(&self, id: u64, meta: &mut [u8], data: &mut [u8]) -> Result<SlotRead, RingError> {
        // SAFETY: as above.
        unsafe { read_slot(self.base, &self.layout, id, Some(meta), Some(data)) }
    }

    /// Reads only the metadata region.
    pub fn read_meta_into(&self, id: u64, meta: &mut [u8]) -> Result<SlotRead, RingError> {
        // SAFETY: as above.
        unsafe { read_slot(self.base, &self.layout, id, Some(meta), None) }
    }

    pub fn slot_owner(&self, id: u64) -> Option<u64> {
        // SAFETY: as above.
        unsafe { slot_owner(self.base, &self.layout, id) }
    }
}

#[derive(Clone, Copy)]
enum Region {
    Meta,
    Data,
}

unsafe fn copy_out(base: *const u8, layout: &SlotLayout, id: u64, region: Region) -> Result<Vec<u8>, RingError> {
    let mut out = match region {
        Region::Meta => vec![0u8; layout.meta_bytes],
        Region::Data => vec![0u8; layout.data_bytes],
    };
    let read = unsafe {
        match region {
            Region::Meta => read_slot(base, layout, id, Some(out.as_mut_slice()), None)?,
            Region::Data => read_slot(base, layout, id, None, Some(out.as_mut_slice()))?,
        }
    };
    out.truncate(match region {
        Region::Meta => read.meta_len,
        Region::Data => read.data_len,
    });
    Ok(out)
}

unsafe fn slot_owner(base: *const u8, layout: &SlotLayout, id: u64) -> Option<u64> {
    let idx = slot_index(id, layout.n_slots);
    let h = unsafe { &*(base.add(layout.slot_offset(idx)) as *const SlotHeader) };
    loop {
        let s1 = h.seq.read_begin();
        let owner = h.owner.load(Ordering::Relaxed);
        if !h.seq.read_retry(s1) {
            return (owner != EMPTY_SLOT).then_some(owner);
        }
        std::hint::spin_loop();
    }
}

/// Seqlock-consistent copy of one slot, with the ownership check.
///
/// # Safety
/// `base` must point to a mapped frame buffer described by `layout`.
unsafe fn read_slot(
    base: *const u8,
    layout: &SlotLayout,
    id: u64,
    mut meta_out: Option<&mut [u8]>,
    mut data_out: Option<&mut [u8]>,
) -> Result<SlotRead, RingError> {
    let idx = slot_index(id, layout.n_slots);
    let h = unsafe { &*(base.add(layout.slot_offset(idx)) as *const SlotHeader) };
    let meta_src = unsafe { base.add(layout.meta_offset(idx)) };
    let data_src = unsafe { base.add(layout.data_offset(idx)) };

    loop {
        let s1 = h.seq.read_begin();
        let owner = h.owner.load(Ordering::Relaxed);
        let meta_len = (h.meta_len.load(Ordering::Relaxed) as usize).min(layout.meta_bytes);
        let data_len = (h.data_len.load(Ordering::Relaxed) as usize).min(layout.data_bytes);

        if owner != id {
            if h.seq.read_retry(s1) {
                continue;
            }
            return Err(RingError::Stale {
                expected: id,
                found: (owner != EMPTY_SLOT).then_some(owner),
            });
        }

        let needed = [
            (meta_out.as_deref().map(<[u8]>::len), meta_len),
            (data_out.as_deref().map(<[u8]>::len), data_len),
        ];
        if let Some(&(Some(len), needed)) = needed.iter().find(|(len, n)| len.is_some_and(|l| l < *n)) {
            if h.seq.read_retry(s1) {
                continue;
            }
            return Err(RingError::BufferTooSmall { needed, len });
        }

        // SAFETY: lengths are clamped to the region sizes and the outputs were
        // checked to be large enough.
        unsafe {
            if let Some(out) = meta_out.as_deref_mut() {
                ptr::copy_nonoverlapping(meta_src, out.as_mut_ptr(), meta_len);
            }
            if let Some(out) = data_out.as_deref_mut() {
                ptr::copy_nonoverlapping(data_src, out.as_mut_ptr(), data_len);
            }
        }

        if h.seq.read_retry(s1) {
            std::hint::spin_loop();
            continue;
        }
        return Ok(SlotRead {
            id,
            meta_len,
            data_len,
        });
    }
}
