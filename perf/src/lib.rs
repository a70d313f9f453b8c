//! Fixtures shared by the criterion benches.

use std::path::PathBuf;
use strata_detectors::{CommonFrame, DetectorFamily, FrameDetail, FrameGeometry, FrameMeta, jungfrau};

/// Scratch directory for bench buffers, unique per process.
pub fn temp_shm_root(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("strata_bench_{label}_{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

pub fn jungfrau_geometry() -> FrameGeometry {
    FrameGeometry::jungfrau()
}

/// Every datagram of Jungfrau frame `id`, in order.
pub fn jungfrau_frame(id: u64, module_id: u16) -> Vec<Vec<u8>> {
    let g = jungfrau_geometry();
    (0..g.packets_per_frame as u32)
        .map(|seq| {
            let payload = vec![seq as u8; jungfrau::PAYLOAD_BYTES];
            let mut out = vec![0u8; jungfrau::PACKET_BYTES];
            // Payload and output are sized from the layout, so encode cannot fail.
            let _ = jungfrau::LAYOUT.encode(id, seq, module_id, &payload, &mut out);
            out
        })
        .collect()
}

pub fn jungfrau_meta(id: u64, module_id: u16) -> [u8; 64] {
    FrameMeta {
        common: CommonFrame {
            frame_id: id,
            missing_packets: 0,
            module_id,
        },
        detail: FrameDetail::empty(DetectorFamily::Jungfrau),
    }
    .encode()
}
