use sync_core::{ModuleSynchronizer, SyncedImage, Synchronizer};

/// Matching strategy of the sync process.
pub enum Reconciler {
    /// Release an image once every synchronized module delivered it.
    Modules(ModuleSynchronizer),
    /// Release an id on its second sighting, across two streams.
    Window(Synchronizer),
}

impl Reconciler {
    /// Feeds one module frame. Released images are appended to `released`;
    /// returns the number of images given up on.
    pub fn process(
        &mut self,
        frame_id: u64,
        module_id: u16,
        missing_packets: u64,
        released: &mut Vec<SyncedImage>,
    ) -> usize {
        match self {
            Reconciler::Modules(sync) => {
                let dropped = sync.process(frame_id, module_id, missing_packets);
                while let Some(image) = sync.pop_next_full_image() {
                    released.push(image);
                }
                dropped
            }
            Reconciler::Window(sync) => {
                if let Some(image) = sync.match_frame(frame_id, missing_packets) {
                    released.push(image);
                }
                let dropped = sync.dropped_packages();
                sync.reset_dropped_packages();
                dropped as usize
            }
        }
    }

    pub fn pending(&self) -> usize {
        match self {
            Reconciler::Modules(sync) => sync.len(),
            Reconciler::Window(sync) => sync.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(released: &[SyncedImage]) -> Vec<u64> {
        released.iter().map(|img| img.image_id).collect()
    }

    #[test]
    fn window_releases_on_second_stream() {
        let mut reconciler = Reconciler::Window(Synchronizer::new(2));
        let mut released = Vec::new();

        assert_eq!(reconciler.process(1, 0, 0, &mut released), 0);
        assert_eq!(reconciler.process(2, 0, 0, &mut released), 0);
        assert_eq!(reconciler.process(1, 1, 3, &mut released), 0);
        assert_eq!(ids(&released), vec![1]);
        assert_eq!(released[0].n_missing_packets, 3);

        // Window of two: 2 and 3 are parked, 4 pushes 2 out.
        assert_eq!(reconciler.process(3, 0, 0, &mut released), 0);
        assert_eq!(reconciler.process(4, 0, 0, &mut released), 1);
        assert_eq!(reconciler.pending(), 2);
    }

    #[test]
    fn window_keeps_missing_packets_of_first_stream() {
        let mut reconciler = Reconciler::Window(Synchronizer::new(4));
        let mut released = Vec::new();

        reconciler.process(1, 0, 5, &mut released);
        reconciler.process(1, 1, 0, &mut released);
        assert_eq!(ids(&released), vec![1]);
        assert_eq!(released[0].n_missing_packets, 5);
    }

    #[test]
    fn modules_release_every_completed_image() {
        let mut reconciler = Reconciler::Modules(ModuleSynchronizer::new(0b11, 8));
        let mut released = Vec::new();
        for id in [5, 6] {
            reconciler.process(id, 1, 0, &mut released);
        }
        reconciler.process(6, 0, 0, &mut released);
        assert!(released.is_empty());

        reconciler.process(5, 0, 0, &mut released);
        assert_eq!(ids(&released), vec![5, 6]);
        assert_eq!(reconciler.pending(), 0);
    }
}
