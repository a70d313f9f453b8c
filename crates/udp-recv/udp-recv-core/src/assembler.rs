//! Reassembly of one module's packet stream into frames.
//!
//! The assembler holds at most one frame in progress. A packet of a newer
//! frame closes the current one, whether or not it is complete; a complete
//! frame is closed as soon as its last missing packet arrives. Packets of
//! frames already closed are dropped.
//!
//! ```text
//!   id == current       copy payload, mark packet present
//!   id >  current       emit current (missing = expected - received), start id
//!   id <  current       stale
//!   id <= last emitted  stale
//! ```

use strata_detectors::{
    CommonFrame, DecodeError, FrameDetail, FrameGeometry, FrameMeta, INVALID_FRAME_ID, PacketLayout,
};

/// Why a datagram could not be placed in any frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Decode(DecodeError),
    /// The frame id is the buffer's empty-slot marker.
    ReservedId,
    /// The sequence value names no packet of the frame.
    Sequence(u32),
    ShortPayload { len: usize, expected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Stored in the frame in progress.
    Accepted,
    /// Stored, and it completed the frame, which was emitted.
    Completed,
    /// Belongs to a frame already emitted or older than the current one.
    Stale,
    /// Already received for the frame in progress.
    Duplicate,
    Rejected(Rejection),
}

impl Disposition {
    /// `true` if the packet left no trace in the assembler.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Stale | Self::Duplicate | Self::Rejected(_))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerCounters {
    pub frames: u64,
    pub stale: u64,
    pub duplicate: u64,
    pub rejected: u64,
}

impl AssemblerCounters {
    pub fn dropped(&self) -> u64 {
        self.stale + self.duplicate + self.rejected
    }
}

#[derive(Debug)]
struct InProgress {
    id: u64,
    detail: FrameDetail,
    received: usize,
}

pub struct FrameAssembler {
    geometry: FrameGeometry,
    layout: &'static PacketLayout,
    module_id: u16,
    current: Option<InProgress>,
    /// Indexed by packet index within the frame.
    present: Vec<bool>,
    frame: Vec<u8>,
    last_emitted: Option<u64>,
    counters: AssemblerCounters,
}

impl FrameAssembler {
    /// `module_id` is the configured id; records carry
    /// [`FrameGeometry::record_module_id`] of it.
    pub fn new(geometry: FrameGeometry, module_id: u16) -> Self {
        Self {
            layout: geometry.family.layout(),
            module_id: geometry.record_module_id(module_id),
            current: None,
            present: vec![false; geometry.packets_per_frame],
            frame: vec![0; geometry.frame_bytes],
            last_emitted: None,
            counters: AssemblerCounters::default(),
            geometry,
        }
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn module_id(&self) -> u16 {
        self.module_id
    }

    /// Id of the frame in progress.
    pub fn current_id(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.id)
    }

    pub fn last_emitted(&self) -> Option<u64> {
        self.last_emitted
    }

    pub fn counters(&self) -> AssemblerCounters {
        self.counters
    }

    /// Feeds one datagram. Every frame closed by this packet is handed to
    /// `emit` together with the full frame buffer.
    pub fn push<F>(&mut self, datagram: &[u8], mut emit: F) -> Disposition
    where
        F: FnMut(&FrameMeta, &[u8]),
    {
        let packet = match self.layout.decode(datagram) {
            Ok(packet) => packet,
            Err(e) => return self.reject(Rejection::Decode(e)),
        };
        let id = packet.frame_id;
        if id == INVALID_FRAME_ID {
            return self.reject(Rejection::ReservedId);
        }
        let Some(place) = self.geometry.place(packet.sequence) else {
            return self.reject(Rejection::Sequence(packet.sequence));
        };
        if packet.payload.len() < place.len {
            return self.reject(Rejection::ShortPayload {
                len: packet.payload.len(),
                expected: place.len,
            });
        }
        if self.last_emitted.is_some_and(|last| id <= last) {
            self.counters.stale += 1;
            return Disposition::Stale;
        }

        match self.current_id() {
            Some(current) if id < current => {
                self.counters.stale += 1;
                return Disposition::Stale;
            }
            Some(current) if id == current => {
                if self.present[place.index] {
                    self.counters.duplicate += 1;
                    return Disposition::Duplicate;
                }
            }
            Some(_) => self.finish(&mut emit),
            None => {}
        }

        if self.current.is_none() {
            self.current = Some(InProgress {
                id,
                detail: FrameDetail::from_packet(&self.geometry, packet.header),
                received: 0,
            });
        }

        self.frame[place.offset..place.offset + place.len].copy_from_slice(&packet.payload[..place.len]);
        self.present[place.index] = true;

        let complete = match self.current.as_mut() {
            Some(current) => {
                current.received += 1;
                current.received == self.geometry.packets_per_frame
            }
            None => false,
        };
        if complete {
            self.finish(&mut emit);
            Disposition::Completed
        } else {
            Disposition::Accepted
        }
    }

    /// Emits the frame in progress, if any, however incomplete.
    pub fn flush<F>(&mut self, mut emit: F) -> bool
    where
        F: FnMut(&FrameMeta, &[u8]),
    {
        let had_frame = self.current.is_some();
        self.finish(&mut emit);
        had_frame
    }

    fn finish<F>(&mut self, emit: &mut F)
    where
        F: FnMut(&FrameMeta, &[u8]),
    {
        let Some(frame) = self.current.take() else {
            return;
        };

        // Missing packets would otherwise leave bytes of an older frame behind.
        for index in 0..self.geometry.packets_per_frame {
            if self.present[index] {
                continue;
            }
            if let Some(p) = self.geometry.place(self.geometry.sequence_of(index)) {
                self.frame[p.offset..p.offset + p.len].fill(0);
            }
        }

        let meta = FrameMeta {
            common: CommonFrame {
                frame_id: frame.id,
                missing_packets: (self.geometry.packets_per_frame - frame.received) as u64,
                module_id: self.module_id,
            },
            detail: frame.detail,
        };
        emit(&meta, &self.frame);

        self.present.fill(false);
        self.last_emitted = Some(frame.id);
        self.counters.frames += 1;
    }

    fn reject(&mut self, reason: Rejection) -> Disposition {
        self.counters.rejected += 1;
        tracing::trace!(?reason, module_id = self.module_id, "packet rejected");
        Disposition::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_detectors::sls::{self, SlsHeader};
    use strata_detectors::{DetectorFamily, jungfrau};

    /// Jungfrau packets, three to a frame.
    fn small_geometry() -> FrameGeometry {
        let mut g = FrameGeometry::jungfrau();
        g.packets_per_frame = 3;
        g.frame_bytes = 3 * jungfrau::PAYLOAD_BYTES;
        g
    }

    fn packet(id: u64, seq: u32) -> Vec<u8> {
        let payload = vec![(id as u8).wrapping_add(seq as u8); jungfrau::PAYLOAD_BYTES];
        let mut out = vec![0u8; jungfrau::PACKET_BYTES];
        jungfrau::LAYOUT
            .encode(id, seq, 0, &payload, &mut out)
            .unwrap();
        out
    }

    fn collect(frames: &mut Vec<(FrameMeta, Vec<u8>)>) -> impl FnMut(&FrameMeta, &[u8]) + '_ {
        move |meta: &FrameMeta, data: &[u8]| frames.push((*meta, data.to_vec()))
    }

    #[test]
    fn complete_frame_is_emitted_on_last_packet() {
        let mut asm = FrameAssembler::new(small_geometry(), 0);
        let mut frames = Vec::new();

        assert_eq!(asm.push(&packet(100, 0), collect(&mut frames)), Disposition::Accepted);
        assert_eq!(asm.push(&packet(100, 2), collect(&mut frames)), Disposition::Accepted);
        assert_eq!(asm.push(&packet(100, 1), collect(&mut frames)), Disposition::Completed);

        assert_eq!(frames.len(), 1);
        let (meta, data) = &frames[0];
        assert_eq!(
            meta.common,
            CommonFrame {
                frame_id: 100,
                missing_packets: 0,
                module_id: 0
            }
        );
        assert_eq!(meta.family(), DetectorFamily::Jungfrau);
        let p = jungfrau::PAYLOAD_BYTES;
        assert!(data[..p].iter().all(|&b| b == 100));
        assert!(data[p..2 * p].iter().all(|&b| b == 101));
        assert!(data[2 * p..].iter().all(|&b| b == 102));
        assert_eq!(asm.current_id(), None);
        assert_eq!(asm.last_emitted(), Some(100));
    }

    #[test]
    fn jungfrau_frames_carry_the_pulse_id() {
        let mut asm = FrameAssembler::new(FrameGeometry::jungfrau(), 2);
        let mut frames = Vec::new();
        let payload = vec![0u8; jungfrau::PAYLOAD_BYTES];
        let mut out = vec![0u8; jungfrau::PACKET_BYTES];
        for seq in 0..jungfrau::PACKETS_PER_FRAME as u32 {
            let header = SlsHeader {
                framenum: 7,
                bunchid: 1000.0,
                packetnum: seq,
                module_id: 2,
                ..Default::default()
            };
            header.encode(&mut out);
            out[sls::HEADER_BYTES..].copy_from_slice(&payload);
            asm.push(&out, collect(&mut frames));
        }

        let ids: Vec<u64> = frames.iter().map(|(m, _)| m.common.frame_id).collect();
        assert_eq!(ids, [1000]);
        let (meta, _) = &frames[0];
        assert_eq!(meta.common.missing_packets, 0);
        match meta.detail {
            FrameDetail::Jungfrau(d) => {
                assert_eq!(d.pulse_id, 1000);
                assert_eq!(d.frame_index, 7);
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn newer_id_closes_incomplete_frame() {
        let mut asm = FrameAssembler::new(small_geometry(), 4);
        let mut frames = Vec::new();

        asm.push(&packet(7, 0), collect(&mut frames));
        asm.push(&packet(7, 0), collect(&mut frames));
        asm.push(&packet(9, 1), collect(&mut frames));

        assert_eq!(frames.len(), 1);
        let (meta, data) = &frames[0];
        assert_eq!(meta.common.frame_id, 7);
        assert_eq!(meta.common.missing_packets, 2);
        assert_eq!(meta.common.module_id, 4);
        let p = jungfrau::PAYLOAD_BYTES;
        assert!(data[p..].iter().all(|&b| b == 0), "missing packets are zeroed");
        assert_eq!(asm.current_id(), Some(9));
        assert_eq!(asm.counters().duplicate, 1);
    }

    #[test]
    fn stale_and_duplicate_packets_change_nothing() {
        let mut asm = FrameAssembler::new(small_geometry(), 0);
        let mut frames = Vec::new();
        for seq in 0..3 {
            asm.push(&packet(5, seq), collect(&mut frames));
        }
        asm.push(&packet(6, 0), collect(&mut frames));

        assert_eq!(asm.push(&packet(5, 1), collect(&mut frames)), Disposition::Stale);
        assert_eq!(asm.push(&packet(4, 0), collect(&mut frames)), Disposition::Stale);
        assert_eq!(asm.push(&packet(6, 0), collect(&mut frames)), Disposition::Duplicate);
        assert_eq!(frames.len(), 1);
        assert_eq!(asm.current_id(), Some(6));
        assert_eq!(asm.counters().stale, 2);
    }

    #[test]
    fn malformed_packets_are_rejected() {
        let mut asm = FrameAssembler::new(small_geometry(), 0);
        let mut frames = Vec::new();

        assert!(matches!(
            asm.push(&[0u8; 10], collect(&mut frames)),
            Disposition::Rejected(Rejection::Decode(_))
        ));
        assert_eq!(
            asm.push(&packet(1, 3), collect(&mut frames)),
            Disposition::Rejected(Rejection::Sequence(3))
        );
        assert_eq!(
            asm.push(&packet(INVALID_FRAME_ID, 0), collect(&mut frames)),
            Disposition::Rejected(Rejection::ReservedId)
        );
        assert_eq!(asm.counters().rejected, 3);
        assert_eq!(asm.current_id(), None);
        assert!(frames.is_empty());
    }

    #[test]
    fn flush_emits_partial_frame_once() {
        let mut asm = FrameAssembler::new(small_geometry(), 0);
        let mut frames = Vec::new();
        asm.push(&packet(11, 2), collect(&mut frames));

        assert!(asm.flush(collect(&mut frames)));
        assert!(!asm.flush(collect(&mut frames)));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.common.missing_packets, 2);
    }

    #[test]
    fn gigafrost_last_packet_drops_padding() {
        // 36 x 151 module: 136 rows, then 15 rows sent with 36 bytes of padding.
        let geometry = FrameGeometry::gigafrost(604, 72).unwrap();
        let layout = DetectorFamily::Gigafrost.layout();
        let mut asm = FrameAssembler::new(geometry, 2);
        let mut frames = Vec::new();

        for index in 0..geometry.packets_per_frame {
            let seq = geometry.sequence_of(index);
            let payload = vec![index as u8 + 1; geometry.wire_payload_bytes(index)];
            let mut out = vec![0u8; layout.packet_bytes];
            let len = layout.encode(77, seq, 0, &payload, &mut out).unwrap();
            asm.push(&out[..len], collect(&mut frames));
        }

        assert_eq!(geometry.wire_payload_bytes(1), 15 * 54 + 36);
        assert_eq!(frames.len(), 1);
        let (meta, data) = &frames[0];
        assert!(meta.common.is_complete());
        assert_eq!(data.len(), geometry.frame_bytes);
        assert!(data[geometry.packet_bytes..].iter().all(|&b| b == 2));
        assert_eq!(meta.common.module_id, 2);
    }

    #[test]
    fn gigafrost_records_carry_module_within_detector() {
        let geometry = FrameGeometry::gigafrost(600, 72).unwrap();
        let layout = DetectorFamily::Gigafrost.layout();
        let mut asm = FrameAssembler::new(geometry, 11);
        assert_eq!(asm.module_id(), 3);

        let mut frames = Vec::new();
        let payload = vec![1u8; geometry.wire_payload_bytes(0)];
        let mut out = vec![0u8; layout.packet_bytes];
        let len = layout.encode(5, 0, 0, &payload, &mut out).unwrap();
        asm.push(&out[..len], collect(&mut frames));
        assert!(asm.flush(collect(&mut frames)));
        assert_eq!(frames[0].0.common.module_id, 3);
    }
}
