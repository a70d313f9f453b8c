use crate::family::DetectorFamily;
use crate::field::Field;
use crate::packet::{FrameIdField, PacketLayout, SequenceField};
use crate::sls::{self, SlsHeader};

pub const PACKET_BYTES: usize = 4144;
pub const PAYLOAD_BYTES: usize = 4096;

pub const MODULE_COLS: usize = 512;
pub const MODULE_ROWS: usize = 256;
pub const MODULE_PIXELS: usize = MODULE_COLS * MODULE_ROWS;

pub const BIT_DEPTHS: [u16; 4] = [4, 8, 16, 32];

const _: () = assert!(sls::HEADER_BYTES + PAYLOAD_BYTES == PACKET_BYTES);

pub static LAYOUT: PacketLayout = PacketLayout {
    family: DetectorFamily::Eiger,
    packet_bytes: PACKET_BYTES,
    header_bytes: sls::HEADER_BYTES,
    fixed_size: true,
    frame_id: FrameIdField::Counter(sls::field::FRAMENUM),
    sequence: SequenceField::PacketNumber(sls::field::PACKETNUM),
    module_id: Some(sls::field::MODULE_ID),
};

/// Bytes of one module frame at `bit_depth` bits per pixel.
pub const fn frame_bytes(bit_depth: u16) -> usize {
    MODULE_PIXELS * bit_depth as usize / 8
}

mod rec {
    use crate::field::Field;

    pub const BIT_DEPTH: Field = Field::new(18, 2);
    pub const POS_Y: Field = Field::new(20, 2);
    pub const POS_X: Field = Field::new(22, 2);
    pub const EXPTIME: Field = Field::new(24, 4);
    pub const BUNCHID: Field = Field::new(28, 8);
    pub const DEBUG: Field = Field::new(36, 4);
}

const _: () = assert!(rec::DEBUG.end() <= crate::frame::FAMILY_TAG_OFFSET);

/// Eiger part of a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EigerDetail {
    pub bit_depth: u16,
    pub pos_y: u16,
    pub pos_x: u16,
    pub exptime: u32,
    pub bunchid: f64,
    pub debug: u32,
}

impl EigerDetail {
    /// The half-module position travels in the packet's row/column words, with
    /// `row` giving x and `column` giving y.
    pub fn from_header(h: &SlsHeader, bit_depth: u16) -> Self {
        Self {
            bit_depth,
            pos_y: h.column,
            pos_x: h.row,
            exptime: h.exptime,
            bunchid: h.bunchid,
            debug: h.debug,
        }
    }

    pub(crate) fn encode(&self, bytes: &mut [u8]) {
        rec::BIT_DEPTH.write(bytes, self.bit_depth as u64);
        rec::POS_Y.write(bytes, self.pos_y as u64);
        rec::POS_X.write(bytes, self.pos_x as u64);
        rec::EXPTIME.write(bytes, self.exptime as u64);
        rec::BUNCHID.write_f64(bytes, self.bunchid);
        rec::DEBUG.write(bytes, self.debug as u64);
    }

    pub(crate) fn decode(bytes: &[u8]) -> Self {
        let u = |f: Field| f.read(bytes);
        Self {
            bit_depth: u(rec::BIT_DEPTH) as u16,
            pos_y: u(rec::POS_Y) as u16,
            pos_x: u(rec::POS_X) as u16,
            exptime: u(rec::EXPTIME) as u32,
            bunchid: rec::BUNCHID.read_f64(bytes),
            debug: u(rec::DEBUG) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_scales_with_bit_depth() {
        assert_eq!(frame_bytes(16), 262_144);
        assert_eq!(frame_bytes(16) / PAYLOAD_BYTES, 64);
        assert_eq!(frame_bytes(4) / PAYLOAD_BYTES, 16);
        assert_eq!(frame_bytes(32) / PAYLOAD_BYTES, 128);
    }
}
