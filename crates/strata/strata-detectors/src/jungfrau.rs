use crate::family::DetectorFamily;
use crate::field::Field;
use crate::packet::{FrameIdField, PacketLayout, SequenceField};
use crate::sls::{self, SlsHeader};

pub const PACKET_BYTES: usize = 8240;
pub const PAYLOAD_BYTES: usize = 8192;
pub const PACKETS_PER_FRAME: usize = 128;

pub const MODULE_COLS: usize = 1024;
pub const MODULE_ROWS: usize = 512;
pub const PIXEL_BYTES: usize = 2;
pub const FRAME_BYTES: usize = MODULE_COLS * MODULE_ROWS * PIXEL_BYTES;

const _: () = assert!(sls::HEADER_BYTES + PAYLOAD_BYTES == PACKET_BYTES);
const _: () = assert!(PACKETS_PER_FRAME * PAYLOAD_BYTES == FRAME_BYTES);

pub static LAYOUT: PacketLayout = PacketLayout {
    family: DetectorFamily::Jungfrau,
    packet_bytes: PACKET_BYTES,
    header_bytes: sls::HEADER_BYTES,
    fixed_size: true,
    // Frames are keyed on the machine pulse id so that every module (and
    // every other detector) files the same shot under the same id.
    frame_id: FrameIdField::PulseId(sls::field::BUNCHID),
    sequence: SequenceField::PacketNumber(sls::field::PACKETNUM),
    module_id: Some(sls::field::MODULE_ID),
};

// Record offsets, after the 18-byte common part.
mod rec {
    use crate::field::Field;

    pub const PULSE_ID: Field = Field::new(18, 8);
    pub const FRAME_INDEX: Field = Field::new(26, 8);
    pub const DAQ_REC: Field = Field::new(34, 8);
    pub const MODULE_ID: Field = Field::new(42, 8);
}

const _: () = assert!(rec::MODULE_ID.end() <= crate::frame::FAMILY_TAG_OFFSET);

/// Jungfrau part of a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JungfrauDetail {
    /// Machine pulse id (`bunchid`).
    pub pulse_id: u64,
    /// Detector frame counter (`framenum`).
    pub frame_index: u64,
    /// `debug` word: DAQ receiver status bits.
    pub daq_rec: u64,
    /// Module id as reported by the detector.
    pub module_id: u64,
}

impl JungfrauDetail {
    pub fn from_header(h: &SlsHeader) -> Self {
        Self {
            pulse_id: h.bunchid as u64,
            frame_index: h.framenum,
            daq_rec: h.debug as u64,
            module_id: h.module_id as u64,
        }
    }

    pub(crate) fn encode(&self, bytes: &mut [u8]) {
        rec::PULSE_ID.write(bytes, self.pulse_id);
        rec::FRAME_INDEX.write(bytes, self.frame_index);
        rec::DAQ_REC.write(bytes, self.daq_rec);
        rec::MODULE_ID.write(bytes, self.module_id);
    }

    pub(crate) fn decode(bytes: &[u8]) -> Self {
        let u = |f: Field| f.read(bytes);
        Self {
            pulse_id: u(rec::PULSE_ID),
            frame_index: u(rec::FRAME_INDEX),
            daq_rec: u(rec::DAQ_REC),
            module_id: u(rec::MODULE_ID),
        }
    }
}
