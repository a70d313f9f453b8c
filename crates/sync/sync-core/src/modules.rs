// ModuleSynchronizer: waits for every module of an image before releasing it
//
// Each module process announces (frame_id, module_id, missing_packets) on its
// own channel, with no ordering between modules. An image is the set of module
// frames sharing one frame_id; it may leave only once all expected modules
// reported, and images leave strictly in id order.
//
// State per pending image:
//     remaining:  u128 bit mask of modules still expected (bit m = module m)
//     missing:    worst missing_packets reported by any module so far
//
// Pending images live in a BTreeMap keyed by id, so the oldest one is always
// the first entry. The map is bounded by `n_images_buffer`; overflowing it
// evicts the oldest incomplete image. An image whose oldest predecessor never
// completes is therefore held back until that predecessor is evicted.
//
// Counting: `process` returns how many images it gave up on (eviction or a
// module reporting twice). A module of an image at or below the release floor
// (already released, or older than an evicted image) is late and ignored.

use std::collections::BTreeMap;

/// One image whose modules all arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedImage {
    pub image_id: u64,
    /// Worst per-module missing packet count; 0 means a complete image.
    pub n_missing_packets: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    remaining: u128,
    missing: u64,
}

pub struct ModuleSynchronizer {
    pending: BTreeMap<u64, Pending>,
    n_images_buffer: usize,
    new_image_mask: u128,
    floor: Option<u64>,
}

impl ModuleSynchronizer {
    /// Waits for the modules set in `module_mask`. Bits above bit 127 do not
    /// exist, so at most 128 modules are synchronized.
    pub fn new(module_mask: u128, n_images_buffer: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            n_images_buffer: n_images_buffer.max(1),
            new_image_mask: module_mask,
            floor: None,
        }
    }

    /// Mask covering modules `0..n_modules`.
    pub fn all_modules(n_modules: u16) -> u128 {
        match n_modules {
            0 => 0,
            n if n >= 128 => u128::MAX,
            n => (1u128 << n) - 1,
        }
    }

    /// Records that `module_id` delivered frame `id`. Returns the number of
    /// images given up on by this call.
    pub fn process(&mut self, id: u64, module_id: u16, missing_packets: u64) -> usize {
        let bit = match 1u128.checked_shl(u32::from(module_id)) {
            Some(bit) if bit & self.new_image_mask != 0 => bit,
            _ => {
                tracing::trace!(frame_id = id, module_id, "module not synchronized");
                return 0;
            }
        };

        let mut dropped = 0;
        if !self.pending.contains_key(&id) {
            if self.floor.is_some_and(|floor| id <= floor) {
                tracing::trace!(frame_id = id, module_id, "late module frame");
                return 0;
            }
            self.pending.insert(
                id,
                Pending {
                    remaining: self.new_image_mask,
                    missing: 0,
                },
            );
            if self.pending.len() > self.n_images_buffer {
                dropped += self.drop_oldest_incomplete();
            }
        }

        let Some(image) = self.pending.get_mut(&id) else {
            // The new image itself was the oldest and got evicted.
            return dropped;
        };

        if image.remaining & bit == 0 {
            self.pending.remove(&id);
            tracing::debug!(frame_id = id, module_id, "module delivered twice, image discarded");
            return dropped + 1;
        }

        image.remaining &= !bit;
        image.missing = image.missing.max(missing_packets);
        dropped
    }

    /// Releases the oldest pending image if all of its modules arrived.
    pub fn pop_next_full_image(&mut self) -> Option<SyncedImage> {
        let entry = self.pending.first_entry()?;
        if entry.get().remaining != 0 {
            return None;
        }
        let (image_id, image) = entry.remove_entry();
        self.floor = Some(image_id);
        Some(SyncedImage {
            image_id,
            n_missing_packets: image.missing,
        })
    }

    /// Images waiting for at least one module.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn module_mask(&self) -> u128 {
        self.new_image_mask
    }

    fn drop_oldest_incomplete(&mut self) -> usize {
        match self.pending.pop_first() {
            Some((id, image)) => {
                self.floor = Some(self.floor.map_or(id, |floor| floor.max(id)));
                tracing::debug!(
                    frame_id = id,
                    remaining_modules = image.remaining.count_ones(),
                    "image buffer full, oldest image dropped"
                );
                1
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_modules() -> ModuleSynchronizer {
        ModuleSynchronizer::new(ModuleSynchronizer::all_modules(2), 3)
    }

    #[test]
    fn releases_image_once_all_modules_arrived() {
        let mut sync = two_modules();
        assert_eq!(sync.pop_next_full_image(), None);

        assert_eq!(sync.process(1, 0, 0), 0);
        assert_eq!(sync.pop_next_full_image(), None);

        assert_eq!(sync.process(1, 1, 0), 0);
        assert_eq!(
            sync.pop_next_full_image(),
            Some(SyncedImage {
                image_id: 1,
                n_missing_packets: 0
            })
        );
        assert_eq!(sync.pop_next_full_image(), None);
    }

    #[test]
    fn same_module_twice_discards_image() {
        let mut sync = two_modules();
        assert_eq!(sync.process(33, 0, 0), 0);
        assert_eq!(sync.process(33, 0, 0), 1);
        assert_eq!(sync.pop_next_full_image(), None);
        assert!(sync.is_empty());
    }

    #[test]
    fn full_buffer_drops_oldest_image() {
        let mut sync = two_modules();
        for id in 0..3 {
            assert_eq!(sync.process(id, 0, 0), 0);
        }
        assert_eq!(sync.process(42, 0, 0), 1);
        assert_eq!(sync.len(), 3);

        // 0 was evicted; its second module is late.
        assert_eq!(sync.process(0, 1, 0), 0);
        assert_eq!(sync.len(), 3);
    }

    #[test]
    fn images_leave_in_id_order() {
        let mut sync = two_modules();
        for id in 0..3 {
            assert_eq!(sync.process(id, 0, 0), 0);
        }
        assert_eq!(sync.process(2, 1, 0), 0);
        assert_eq!(sync.process(1, 1, 0), 0);
        assert_eq!(sync.pop_next_full_image(), None);

        assert_eq!(sync.process(0, 1, 0), 0);
        for id in 0..3 {
            assert_eq!(sync.pop_next_full_image().map(|img| img.image_id), Some(id));
        }
        assert_eq!(sync.pop_next_full_image(), None);
    }

    #[test]
    fn waits_only_for_masked_modules() {
        let mut sync = ModuleSynchronizer::new(0b101101, 3);
        for module_id in [0, 2, 3] {
            assert_eq!(sync.process(1, module_id, 0), 0);
        }
        assert_eq!(sync.process(1, 1, 0), 0);
        assert_eq!(sync.pop_next_full_image(), None);

        assert_eq!(sync.process(1, 5, 0), 0);
        assert_eq!(sync.pop_next_full_image().map(|img| img.image_id), Some(1));
        assert_eq!(sync.pop_next_full_image(), None);
    }

    #[test]
    fn reports_worst_module_loss() {
        let mut sync = ModuleSynchronizer::new(0b111, 8);
        sync.process(7, 0, 2);
        sync.process(7, 1, 5);
        sync.process(7, 2, 0);
        assert_eq!(
            sync.pop_next_full_image(),
            Some(SyncedImage {
                image_id: 7,
                n_missing_packets: 5
            })
        );

        // Released: a repeated module for 7 is late, not a new image.
        assert_eq!(sync.process(7, 0, 0), 0);
        assert!(sync.is_empty());
    }

    #[test]
    fn covers_all_128_modules() {
        assert_eq!(ModuleSynchronizer::all_modules(128), u128::MAX);
        assert_eq!(ModuleSynchronizer::all_modules(3), 0b111);

        let mut sync = ModuleSynchronizer::new(u128::MAX, 4);
        for module_id in 0..128 {
            sync.process(9, module_id, 0);
        }
        assert_eq!(sync.process(9, 128, 0), 0);
        assert_eq!(sync.pop_next_full_image().map(|img| img.image_id), Some(9));
    }
}
