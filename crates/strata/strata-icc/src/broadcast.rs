//! Single-producer, multi-consumer broadcast ring over shared memory.
//!
//! Carries frame-id notifications from a frame producer to any number of
//! subscribers in other processes. The writer never waits for readers: the ring
//! capacity is the high-water mark, and a reader lagging by more than that many
//! entries loses the oldest ones (counted in [`BroadcastReader::overruns`]).
//!
//! A writer that restarts reuses the existing file and bumps the header epoch.
//! Readers notice the new epoch on their next `try_read`, remap the region and
//! continue from the first item of the new writer.
//!
//! `BroadcastWriter` and `BroadcastReader` are `Send` but not `Sync`.

use crate::ring::{RingConfig, apply_overrun_policy, seq_to_index};
use crate::seqlock::SeqlockSlot;
use crate::shm_layout::{
    BROADCAST_MAGIC, BroadcastHeader, LAYOUT_VERSION, broadcast_slots_offset, bytes_for_broadcast,
};
use std::io;
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::ptr::addr_of_mut;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_mmap::{MmapFile, MmapFileMut};

pub struct BroadcastWriter<T: Copy> {
    /// Owns the mapping; `base` points into it.
    _mm: MmapFileMut,
    base: *mut u8,
    mask: u64,
    _pd: PhantomData<T>,
}

pub struct BroadcastReader<T: Copy> {
    path: PathBuf,
    mm: MmapFile,
    /// Writer epoch this reader is attached to.
    epoch: u64,
    /// Sequence number of the next item to read.
    read_seq: u64,
    mask: u64,
    capacity: u64,
    overruns: u64,
    restarts: u64,
    _pd: PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for BroadcastWriter<T> {}
unsafe impl<T: Copy + Send> Send for BroadcastReader<T> {}

impl<T: Copy> BroadcastWriter<T> {
    /// Creates the ring file at `path`, or takes over the one left by a previous
    /// writer, and initialises header and slots.
    pub fn create<P: AsRef<Path>>(path: P, cfg: RingConfig) -> io::Result<Self> {
        let bytes = bytes_for_broadcast::<T>(cfg.capacity);
        let mut mm = MmapFileMut::create_rw(path, bytes as u64)?;
        let base = mm.as_mut_ptr();
        let hdr = base as *mut BroadcastHeader;

        // SAFETY: the mapping covers at least `bytes` bytes. Readers of a previous
        // writer may still map it; they only look at the atomics until the epoch
        // changes, and the epoch is published last.
        unsafe {
            let epoch = if (*hdr).magic == BROADCAST_MAGIC {
                (*hdr).epoch.load(Ordering::Acquire).wrapping_add(1)
            } else {
                1
            };

            addr_of_mut!((*hdr).magic).write(BROADCAST_MAGIC);
            addr_of_mut!((*hdr).version).write(LAYOUT_VERSION);
            addr_of_mut!((*hdr).capacity).write(cfg.capacity as u64);
            addr_of_mut!((*hdr).elem_size).write(size_of::<T>() as u64);
            (*hdr).write_seq.store(0, Ordering::Release);

            let slots = base.add(broadcast_slots_offset::<T>()) as *mut SeqlockSlot<T>;
            for i in 0..cfg.capacity {
                (*slots.add(i)).init();
            }

            (*hdr).epoch.store(epoch, Ordering::Release);
        }

        Ok(Self {
            _mm: mm,
            base,
            mask: cfg.mask(),
            _pd: PhantomData,
        })
    }

    #[inline(always)]
    fn header(&self) -> &BroadcastHeader {
        // SAFETY: initialised in `create`.
        unsafe { &*(self.base as *const BroadcastHeader) }
    }

    #[inline(always)]
    fn slot_mut(&mut self, idx: u64) -> &mut SeqlockSlot<T> {
        // SAFETY: idx is masked to be within capacity.
        unsafe {
            let slots = self.base.add(broadcast_slots_offset::<T>()) as *mut SeqlockSlot<T>;
            &mut *slots.add(idx as usize)
        }
    }

    /// Publishes one item. Never blocks.
    #[inline(always)]
    pub fn publish(&mut self, value: T) {
        let seq = self.header().write_seq.load(Ordering::Relaxed);
        let idx = seq_to_index(seq, self.mask);
        self.slot_mut(idx).write(value);
        // Readers only look at slots below `write_seq`, so advance it after the write.
        self.header().write_seq.store(seq + 1, Ordering::Release);
    }

    /// Total number of items published since creation.
    pub fn published(&self) -> u64 {
        self.header().write_seq.load(Ordering::Relaxed)
    }

    /// Epoch of this writer, as seen by readers.
    pub fn epoch(&self) -> u64 {
        self.header().epoch.load(Ordering::Relaxed)
    }
}

/// Maps `path` and checks that it holds an initialised ring of `T`.
fn map_ring<T: Copy>(path: &Path) -> io::Result<(MmapFile, u64)> {
    let mm = MmapFile::open_ro(path)?;
    if mm.len() < size_of::<BroadcastHeader>() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Region smaller than header",
        ));
    }

    // SAFETY: length checked above; validate() rejects garbage.
    let h = unsafe { &*(mm.as_ptr() as *const BroadcastHeader) };
    h.validate::<T>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if h.epoch.load(Ordering::Acquire) == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Ring not initialised yet",
        ));
    }
    if mm.len() < bytes_for_broadcast::<T>(h.capacity as usize) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Region smaller than declared capacity",
        ));
    }
    let capacity = h.capacity;
    Ok((mm, capacity))
}

impl<T: Copy> BroadcastReader<T> {
    /// Opens an existing ring in tail-follow mode: only items published after
    /// this call are returned.
    ///
    /// Fails with `InvalidData` if the file is not a ring of `T` (or is still
    /// being initialised by its writer; callers may retry).
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (mm, capacity) = map_ring::<T>(&path)?;

        let mut reader = Self {
            path,
            mm,
            epoch: 0,
            read_seq: 0,
            mask: capacity - 1,
            capacity,
            overruns: 0,
            restarts: 0,
            _pd: PhantomData,
        };
        reader.epoch = reader.header().epoch.load(Ordering::Acquire);
        reader.read_seq = reader.header().write_seq.load(Ordering::Acquire);
        Ok(reader)
    }

    #[inline(always)]
    fn header(&self) -> &BroadcastHeader {
        // SAFETY: validated in `map_ring`.
        unsafe { &*(self.mm.as_ptr() as *const BroadcastHeader) }
    }

    #[inline(always)]
    fn slot(&self, idx: u64) -> &SeqlockSlot<T> {
        // SAFETY: idx is masked to be within capacity.
        unsafe {
            let slots = self.mm.as_ptr().add(broadcast_slots_offset::<T>()) as *const SeqlockSlot<T>;
            &*slots.add(idx as usize)
        }
    }

    /// Attaches to the writer that published `epoch`, starting at its first item.
    ///
    /// The region is remapped since the new writer may have grown it.
    fn rejoin(&mut self, epoch: u64) -> io::Result<()> {
        let (mm, capacity) = map_ring::<T>(&self.path)?;
        self.mm = mm;
        self.capacity = capacity;
        self.mask = capacity - 1;
        self.epoch = epoch;
        self.read_seq = 0;
        self.restarts += 1;
        tracing::info!(
            path = %self.path.display(),
            epoch,
            "Broadcast writer restarted, following new epoch"
        );
        Ok(())
    }

    /// Non-blocking read of the next item.
    #[inline(always)]
    pub fn try_read(&mut self) -> Option<T> {
        loop {
            let epoch = self.header().epoch.load(Ordering::Acquire);
            if epoch != self.epoch {
                if let Err(e) = self.rejoin(epoch) {
                    tracing::debug!(path = %self.path.display(), error = %e, "Cannot rejoin ring yet");
                    return None;
                }
                continue;
            }

            let w = self.header().write_seq.load(Ordering::Acquire);
            apply_overrun_policy(w, &mut self.read_seq, self.capacity, &mut self.overruns);
            if self.read_seq >= w {
                return None;
            }

            let idx = seq_to_index(self.read_seq, self.mask);
            let v = self.slot(idx).read();

            // The writer may have lapped us (or restarted) while we copied; the
            // value would then belong to a newer sequence number.
            let w_after = self.header().write_seq.load(Ordering::Acquire);
            if w_after.saturating_sub(self.read_seq) > self.capacity
                || self.header().epoch.load(Ordering::Acquire) != self.epoch
            {
                continue;
            }
            self.read_seq += 1;
            return Some(v);
        }
    }

    /// Items lost because the writer lapped this reader.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Number of writer restarts this reader has followed.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }
}
