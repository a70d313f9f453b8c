use proptest::prelude::*;
use std::collections::BTreeSet;
use strata_detectors::{FrameGeometry, FrameMeta, eiger};
use udp_recv_core::FrameAssembler;

/// 4-bit Eiger: 16 packets of 4096 bytes per frame.
fn geometry() -> FrameGeometry {
    FrameGeometry::eiger(4).unwrap()
}

fn fill(id: u64, seq: u32) -> u8 {
    (id.wrapping_mul(31) as u8).wrapping_add(seq as u8) | 1
}

fn datagram(id: u64, seq: u32) -> Vec<u8> {
    let payload = vec![fill(id, seq); eiger::PAYLOAD_BYTES];
    let mut out = vec![0u8; eiger::PACKET_BYTES];
    eiger::LAYOUT.encode(id, seq, 0, &payload, &mut out).unwrap();
    out
}

/// Non-decreasing ids starting at 1, each with a packet sequence number.
fn arb_stream() -> impl Strategy<Value = Vec<(u64, u32)>> {
    prop::collection::vec((0u64..3, 0u32..16), 1..200).prop_map(|steps| {
        let mut id = 1;
        steps
            .into_iter()
            .map(|(step, seq)| {
                id += step;
                (id, seq)
            })
            .collect()
    })
}

/// Distinct ids in order, with the packet numbers seen for each.
fn model(stream: &[(u64, u32)]) -> Vec<(u64, BTreeSet<u32>)> {
    let mut frames: Vec<(u64, BTreeSet<u32>)> = Vec::new();
    for &(id, seq) in stream {
        match frames.last_mut() {
            Some((last, seqs)) if *last == id => {
                seqs.insert(seq);
            }
            _ => frames.push((id, BTreeSet::from([seq]))),
        }
    }
    frames
}

proptest! {
    #[test]
    fn one_frame_per_distinct_id(stream in arb_stream()) {
        let g = geometry();
        let mut asm = FrameAssembler::new(g, 1);
        let mut emitted: Vec<(FrameMeta, Vec<u8>)> = Vec::new();

        for &(id, seq) in &stream {
            asm.push(&datagram(id, seq), |meta, data| emitted.push((*meta, data.to_vec())));
        }
        asm.flush(|meta, data| emitted.push((*meta, data.to_vec())));

        let expected = model(&stream);
        prop_assert_eq!(emitted.len(), expected.len());
        for ((meta, data), (id, seqs)) in emitted.iter().zip(&expected) {
            prop_assert_eq!(meta.common.frame_id, *id);
            prop_assert_eq!(meta.common.module_id, 1);
            prop_assert_eq!(meta.common.missing_packets, (g.packets_per_frame - seqs.len()) as u64);

            for seq in 0..g.packets_per_frame as u32 {
                let at = seq as usize * eiger::PAYLOAD_BYTES;
                let want = if seqs.contains(&seq) { fill(*id, seq) } else { 0 };
                prop_assert!(data[at..at + eiger::PAYLOAD_BYTES].iter().all(|&b| b == want));
            }
        }
    }

    #[test]
    fn redelivery_never_changes_state(stream in arb_stream(), pick in any::<prop::sample::Index>()) {
        let mut asm = FrameAssembler::new(geometry(), 0);
        let mut emitted = 0usize;
        for &(id, seq) in &stream {
            asm.push(&datagram(id, seq), |_, _| emitted += 1);
        }

        let before = (asm.current_id(), asm.last_emitted(), emitted);
        let (id, seq) = stream[pick.index(stream.len())];
        let disposition = asm.push(&datagram(id, seq), |_, _| emitted += 1);

        prop_assert!(disposition.is_dropped());
        prop_assert_eq!((asm.current_id(), asm.last_emitted(), emitted), before);
    }
}
