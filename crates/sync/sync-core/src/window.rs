use std::collections::VecDeque;

use crate::modules::SyncedImage;

/// Bounded-lookahead matching of frame ids seen on two streams.
///
/// The first sighting of an id parks it in the window; the second one
/// releases it. Once `drop_after` ids are parked, each new one evicts the
/// oldest, which is then counted as dropped and never matched.
///
/// Each parked id keeps the missing-packet count of its first sighting, so a
/// match reports the worse of the two streams.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    /// `(frame_id, missing_packets)` of the first sighting.
    pending: VecDeque<(u64, u64)>,
    drop_after: usize,
    dropped: u64,
}

impl Synchronizer {
    /// `drop_after` is clamped to at least one pending id.
    pub fn new(drop_after: usize) -> Self {
        let drop_after = drop_after.max(1);
        Self {
            pending: VecDeque::with_capacity(drop_after),
            drop_after,
            dropped: 0,
        }
    }

    /// `true` when `id` completes a match (it was pending and is now removed).
    pub fn is_ready_to_send(&mut self, id: u64) -> bool {
        self.match_frame(id, 0).is_some()
    }

    /// Feeds one sighting of `id` that lost `missing_packets` packets.
    ///
    /// Returns the matched image on the second sighting, carrying the larger
    /// missing count of the two.
    pub fn match_frame(&mut self, id: u64, missing_packets: u64) -> Option<SyncedImage> {
        if let Some(pos) = self.pending.iter().position(|&(p, _)| p == id) {
            let (_, first_missing) = self.pending.remove(pos)?;
            return Some(SyncedImage {
                image_id: id,
                n_missing_packets: first_missing.max(missing_packets),
            });
        }

        if self.pending.len() == self.drop_after {
            if let Some((evicted, _)) = self.pending.pop_front() {
                self.dropped += 1;
                tracing::trace!(frame_id = evicted, "no match within window");
            }
        }
        self.pending.push_back((id, missing_packets));
        None
    }

    /// Ids given up on since the last reset.
    pub fn dropped_packages(&self) -> u64 {
        self.dropped
    }

    pub fn reset_dropped_packages(&mut self) {
        self.dropped = 0;
    }

    /// Ids waiting for their match, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.iter().map(|&(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drop_after(&self) -> usize {
        self.drop_after
    }
}
