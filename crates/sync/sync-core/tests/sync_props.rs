use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use sync_core::{ModuleSynchronizer, Synchronizer};

const N_MODULES: u16 = 4;

/// (frame id, module) deliveries in arbitrary order.
fn arb_deliveries() -> impl Strategy<Value = Vec<(u64, u16)>> {
    prop::collection::vec((0u64..40, 0u16..N_MODULES), 0..300)
}

proptest! {
    #[test]
    fn window_stays_bounded(ids in prop::collection::vec(0u64..50, 0..300), w in 1usize..8) {
        let mut sync = Synchronizer::new(w);
        let mut matched = 0u64;
        for &id in &ids {
            if sync.is_ready_to_send(id) {
                matched += 1;
            }
            prop_assert!(sync.len() <= w);
        }
        // Every sighting is parked, matched away (two sightings) or dropped.
        prop_assert_eq!(sync.len() as u64 + 2 * matched + sync.dropped_packages(), ids.len() as u64);
    }

    #[test]
    fn released_images_are_complete_and_ordered(deliveries in arb_deliveries(), buffer in 1usize..10) {
        let mut sync = ModuleSynchronizer::new(ModuleSynchronizer::all_modules(N_MODULES), buffer);
        let mut seen: BTreeMap<u64, BTreeSet<u16>> = BTreeMap::new();
        let mut released = Vec::new();

        for &(id, module_id) in &deliveries {
            seen.entry(id).or_default().insert(module_id);
            sync.process(id, module_id, 0);
            while let Some(image) = sync.pop_next_full_image() {
                released.push(image.image_id);
            }
            prop_assert!(sync.len() <= buffer);
        }

        prop_assert!(released.windows(2).all(|w| w[0] < w[1]));
        for id in released {
            prop_assert_eq!(seen[&id].len(), N_MODULES as usize);
        }
    }
}
