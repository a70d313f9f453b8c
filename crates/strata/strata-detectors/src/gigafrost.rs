//! Gigafrost: 12-bit pixels, four quadrants, each quadrant split across two
//! UDP links sending interleaved rows. One "module" is one link of one quadrant.
//!
//! Packets carry whole rows; the number of rows per packet is derived from the
//! image size exactly as the detector firmware does, so the rounding in
//! [`rows_per_packet`] must not be simplified.

use crate::error::GeometryError;
use crate::family::DetectorFamily;
use crate::field::Field;
use crate::packet::{FrameIdField, PacketLayout, SequenceField};

pub const HEADER_BYTES: usize = 32;
pub const MAX_PAYLOAD_BYTES: usize = 7400;
pub const PACKET_BYTES: usize = HEADER_BYTES + MAX_PAYLOAD_BYTES;
pub const PROTOCOL_ID: u8 = 0xCB;

/// Four quadrants of two links each. Frame records number the modules of one
/// detector `0..MODULES_PER_DETECTOR`, whatever ids the config assigns.
pub const MODULES_PER_DETECTOR: u16 = 8;

pub mod field {
    use crate::field::Field;

    pub const PROTOCOL_ID: Field = Field::new(0, 1);
    /// Quadrant row length in 12-pixel blocks.
    pub const QUADRANT_ROW_LENGTH: Field = Field::new(1, 1);
    /// Bit 0 is the row swap flag.
    pub const QUADRANT_ROWS: Field = Field::new(2, 1);
    /// bits 6-7 quadrant, bit 5 link, bits 2-4 correction mode.
    pub const STATUS_FLAGS: Field = Field::new(3, 1);
    pub const SCAN_ID: Field = Field::new(4, 4);
    pub const FRAME_INDEX: Field = Field::new(8, 4);
    /// Bit 15 = do not store.
    pub const IMAGE_STATUS_FLAGS: Field = Field::new(12, 2);
    pub const PACKET_STARTING_ROW: Field = Field::new(14, 2);
    /// Bytes 0-4 timestamp, bytes 5-7 exposure time.
    pub const IMAGE_TIMING: Field = Field::new(16, 8);
    pub const SYNC_TIME: Field = Field::new(24, 4);
    pub const SCAN_TIME: Field = Field::new(28, 4);
}

const _: () = assert!(field::SCAN_TIME.end() == HEADER_BYTES);

pub static LAYOUT: PacketLayout = PacketLayout {
    family: DetectorFamily::Gigafrost,
    packet_bytes: PACKET_BYTES,
    header_bytes: HEADER_BYTES,
    fixed_size: false,
    frame_id: FrameIdField::Counter(field::FRAME_INDEX),
    sequence: SequenceField::StartingRow(field::PACKET_STARTING_ROW),
    module_id: None,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GigafrostHeader {
    pub protocol_id: u8,
    pub quadrant_row_length: u8,
    pub quadrant_rows: u8,
    pub status_flags: u8,
    pub scan_id: u32,
    pub frame_index: u32,
    pub image_status_flags: u16,
    pub packet_starting_row: u16,
    pub image_timing: u64,
    pub sync_time: u32,
    pub scan_time: u32,
}

impl GigafrostHeader {
    /// # Panics
    /// Panics if `header` is shorter than [`HEADER_BYTES`].
    pub fn decode(header: &[u8]) -> Self {
        let u = |f: Field| f.read(header);
        Self {
            protocol_id: u(field::PROTOCOL_ID) as u8,
            quadrant_row_length: u(field::QUADRANT_ROW_LENGTH) as u8,
            quadrant_rows: u(field::QUADRANT_ROWS) as u8,
            status_flags: u(field::STATUS_FLAGS) as u8,
            scan_id: u(field::SCAN_ID) as u32,
            frame_index: u(field::FRAME_INDEX) as u32,
            image_status_flags: u(field::IMAGE_STATUS_FLAGS) as u16,
            packet_starting_row: u(field::PACKET_STARTING_ROW) as u16,
            image_timing: u(field::IMAGE_TIMING),
            sync_time: u(field::SYNC_TIME) as u32,
            scan_time: u(field::SCAN_TIME) as u32,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        field::PROTOCOL_ID.write(out, self.protocol_id as u64);
        field::QUADRANT_ROW_LENGTH.write(out, self.quadrant_row_length as u64);
        field::QUADRANT_ROWS.write(out, self.quadrant_rows as u64);
        field::STATUS_FLAGS.write(out, self.status_flags as u64);
        field::SCAN_ID.write(out, self.scan_id as u64);
        field::FRAME_INDEX.write(out, self.frame_index as u64);
        field::IMAGE_STATUS_FLAGS.write(out, self.image_status_flags as u64);
        field::PACKET_STARTING_ROW.write(out, self.packet_starting_row as u64);
        field::IMAGE_TIMING.write(out, self.image_timing);
        field::SYNC_TIME.write(out, self.sync_time as u64);
        field::SCAN_TIME.write(out, self.scan_time as u64);
    }

    pub fn quadrant_id(&self) -> u8 {
        (self.status_flags & 0b1100_0000) >> 6
    }

    pub fn link_id(&self) -> u8 {
        (self.status_flags & 0b0010_0000) >> 5
    }

    pub fn corr_mode(&self) -> u8 {
        (self.status_flags & 0b0001_1100) >> 2
    }

    pub fn swapped_rows(&self) -> bool {
        self.quadrant_rows & 1 == 1
    }

    pub fn do_not_store(&self) -> bool {
        self.image_status_flags & 0x8000 != 0
    }

    pub fn frame_timestamp(&self) -> u64 {
        self.image_timing & 0x0000_00FF_FFFF_FFFF
    }

    pub fn exposure_time(&self) -> u64 {
        self.image_timing >> 40
    }
}

mod rec {
    use crate::field::Field;

    pub const SWAPPED_ROWS: Field = Field::new(18, 1);
    pub const LINK_ID: Field = Field::new(19, 1);
    pub const CORR_MODE: Field = Field::new(20, 1);
    pub const QUADRANT_ID: Field = Field::new(21, 1);
    // byte 22 reserved
    pub const DO_NOT_STORE: Field = Field::new(23, 1);
    pub const SCAN_ID: Field = Field::new(24, 4);
    pub const SIZE_X: Field = Field::new(28, 4);
    pub const SIZE_Y: Field = Field::new(32, 4);
    pub const SCAN_TIME: Field = Field::new(36, 4);
    pub const SYNC_TIME: Field = Field::new(40, 4);
    pub const FRAME_TIMESTAMP: Field = Field::new(44, 8);
    pub const EXPOSURE_TIME: Field = Field::new(52, 8);
}

const _: () = assert!(rec::EXPOSURE_TIME.end() <= crate::frame::FAMILY_TAG_OFFSET);

/// Gigafrost part of a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GigafrostDetail {
    pub swapped_rows: bool,
    pub link_id: u8,
    pub corr_mode: u8,
    pub quadrant_id: u8,
    pub do_not_store: bool,
    pub scan_id: u32,
    /// Module width in pixels.
    pub size_x: u32,
    /// Module height in pixels.
    pub size_y: u32,
    pub scan_time: u32,
    pub sync_time: u32,
    pub frame_timestamp: u64,
    pub exposure_time: u64,
}

impl GigafrostDetail {
    pub fn from_header(h: &GigafrostHeader, size_x: u32, size_y: u32) -> Self {
        Self {
            swapped_rows: h.swapped_rows(),
            link_id: h.link_id(),
            corr_mode: h.corr_mode(),
            quadrant_id: h.quadrant_id(),
            do_not_store: h.do_not_store(),
            scan_id: h.scan_id,
            size_x,
            size_y,
            scan_time: h.scan_time,
            sync_time: h.sync_time,
            frame_timestamp: h.frame_timestamp(),
            exposure_time: h.exposure_time(),
        }
    }

    pub(crate) fn encode(&self, bytes: &mut [u8]) {
        rec::SWAPPED_ROWS.write(bytes, self.swapped_rows as u64);
        rec::LINK_ID.write(bytes, self.link_id as u64);
        rec::CORR_MODE.write(bytes, self.corr_mode as u64);
        rec::QUADRANT_ID.write(bytes, self.quadrant_id as u64);
        rec::DO_NOT_STORE.write(bytes, self.do_not_store as u64);
        rec::SCAN_ID.write(bytes, self.scan_id as u64);
        rec::SIZE_X.write(bytes, self.size_x as u64);
        rec::SIZE_Y.write(bytes, self.size_y as u64);
        rec::SCAN_TIME.write(bytes, self.scan_time as u64);
        rec::SYNC_TIME.write(bytes, self.sync_time as u64);
        rec::FRAME_TIMESTAMP.write(bytes, self.frame_timestamp);
        rec::EXPOSURE_TIME.write(bytes, self.exposure_time);
    }

    pub(crate) fn decode(bytes: &[u8]) -> Self {
        let u = |f: Field| f.read(bytes);
        Self {
            swapped_rows: u(rec::SWAPPED_ROWS) != 0,
            link_id: u(rec::LINK_ID) as u8,
            corr_mode: u(rec::CORR_MODE) as u8,
            quadrant_id: u(rec::QUADRANT_ID) as u8,
            do_not_store: u(rec::DO_NOT_STORE) != 0,
            scan_id: u(rec::SCAN_ID) as u32,
            size_x: u(rec::SIZE_X) as u32,
            size_y: u(rec::SIZE_Y) as u32,
            scan_time: u(rec::SCAN_TIME) as u32,
            sync_time: u(rec::SYNC_TIME) as u32,
            frame_timestamp: u(rec::FRAME_TIMESTAMP),
            exposure_time: u(rec::EXPOSURE_TIME),
        }
    }
}

/// Each image row is two quadrants side by side.
pub fn module_cols(image_width: u32) -> u32 {
    image_width / 2
}

/// Two quadrants per column, each split over two links.
pub fn module_rows(image_height: u32) -> u32 {
    image_height / 2 / 2
}

/// Bytes of one module frame (12-bit pixels).
pub fn module_bytes(image_height: u32, image_width: u32) -> usize {
    module_cols(image_width) as usize * module_rows(image_height) as usize * 3 / 2
}

/// Rows carried by every packet but possibly the last.
pub fn rows_per_packet(image_height: u32, image_width: u32) -> Result<u32, GeometryError> {
    let cols = module_cols(image_width);
    let rows = module_rows(image_height);
    let err = || GeometryError::ImageSize {
        family: DetectorFamily::Gigafrost,
        height: image_height,
        width: image_width,
    };

    let n_12pixel_blocks = cols / 12;
    if n_12pixel_blocks == 0 || rows == 0 {
        return Err(err());
    }
    // A 64-byte cache line holds 48 12-bit pixels.
    let n_cache_line_blocks =
        (MAX_PAYLOAD_BYTES as u32 / (36 * n_12pixel_blocks)) * n_12pixel_blocks / 2;
    let per_packet = (n_cache_line_blocks * 48 / cols).min(rows);
    if per_packet == 0 {
        return Err(err());
    }
    Ok(per_packet)
}

/// Wire payload size of a packet carrying `n_rows` rows; odd row counts are
/// padded to a cache line unless the row already is a multiple of one.
pub fn payload_bytes_for_rows(n_rows: u32, image_width: u32) -> usize {
    let cols = module_cols(image_width);
    let mut bytes = cols as usize * n_rows as usize * 3 / 2;
    if n_rows % 2 == 1 && cols % 48 != 0 {
        bytes += 36;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_size_image_splits_into_four_row_packets() {
        assert_eq!(module_cols(2016), 1008);
        assert_eq!(module_rows(2016), 504);
        assert_eq!(rows_per_packet(2016, 2016), Ok(4));
        assert_eq!(payload_bytes_for_rows(4, 2016), 6048);
        assert_eq!(module_bytes(2016, 2016), 126 * 6048);
    }

    #[test]
    fn narrow_image_is_capped_by_payload() {
        // 36 columns: 136 rows fit one packet.
        assert_eq!(rows_per_packet(600, 72), Ok(136));
        assert_eq!(payload_bytes_for_rows(136, 72), 7344);
        assert_eq!(payload_bytes_for_rows(13, 72), 36 * 13 * 3 / 2 + 36);
    }

    #[test]
    fn degenerate_images_are_rejected() {
        assert!(rows_per_packet(8, 2).is_err());
        assert!(rows_per_packet(2, 2016).is_err());
    }

    #[test]
    fn status_flags_unpack() {
        let h = GigafrostHeader {
            status_flags: 0b1110_1100,
            quadrant_rows: 0b11,
            image_status_flags: 0x8001,
            image_timing: (7u64 << 40) | 0x12_3456_789A,
            ..Default::default()
        };
        assert_eq!(h.quadrant_id(), 3);
        assert_eq!(h.link_id(), 1);
        assert_eq!(h.corr_mode(), 0b011);
        assert!(h.swapped_rows());
        assert!(h.do_not_store());
        assert_eq!(h.frame_timestamp(), 0x12_3456_789A);
        assert_eq!(h.exposure_time(), 7);
    }
}
