//! 48-byte packet header shared by Jungfrau and Eiger.

use crate::field::Field;

pub const HEADER_BYTES: usize = 48;

pub mod field {
    use crate::field::Field;

    pub const FRAMENUM: Field = Field::new(0, 8);
    pub const EXPTIME: Field = Field::new(8, 4);
    pub const PACKETNUM: Field = Field::new(12, 4);
    pub const BUNCHID: Field = Field::new(16, 8);
    pub const TIMESTAMP: Field = Field::new(24, 8);
    pub const MODULE_ID: Field = Field::new(32, 2);
    pub const ROW: Field = Field::new(34, 2);
    pub const COLUMN: Field = Field::new(36, 2);
    /// `zCoord` on Jungfrau, reserved on Eiger.
    pub const Z_COORD: Field = Field::new(38, 2);
    pub const DEBUG: Field = Field::new(40, 4);
    pub const ROUND_ROBIN: Field = Field::new(44, 2);
    pub const DETECTOR_TYPE: Field = Field::new(46, 1);
    pub const HEADER_VERSION: Field = Field::new(47, 1);
}

const _: () = assert!(field::HEADER_VERSION.end() == HEADER_BYTES);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlsHeader {
    pub framenum: u64,
    pub exptime: u32,
    pub packetnum: u32,
    pub bunchid: f64,
    pub timestamp: u64,
    pub module_id: u16,
    pub row: u16,
    pub column: u16,
    pub z_coord: u16,
    pub debug: u32,
    pub round_robin: u16,
    pub detector_type: u8,
    pub header_version: u8,
}

impl SlsHeader {
    /// # Panics
    /// Panics if `header` is shorter than [`HEADER_BYTES`].
    pub fn decode(header: &[u8]) -> Self {
        let u = |f: Field| f.read(header);
        Self {
            framenum: u(field::FRAMENUM),
            exptime: u(field::EXPTIME) as u32,
            packetnum: u(field::PACKETNUM) as u32,
            bunchid: field::BUNCHID.read_f64(header),
            timestamp: u(field::TIMESTAMP),
            module_id: u(field::MODULE_ID) as u16,
            row: u(field::ROW) as u16,
            column: u(field::COLUMN) as u16,
            z_coord: u(field::Z_COORD) as u16,
            debug: u(field::DEBUG) as u32,
            round_robin: u(field::ROUND_ROBIN) as u16,
            detector_type: u(field::DETECTOR_TYPE) as u8,
            header_version: u(field::HEADER_VERSION) as u8,
        }
    }

    /// # Panics
    /// Panics if `out` is shorter than [`HEADER_BYTES`].
    pub fn encode(&self, out: &mut [u8]) {
        field::FRAMENUM.write(out, self.framenum);
        field::EXPTIME.write(out, self.exptime as u64);
        field::PACKETNUM.write(out, self.packetnum as u64);
        field::BUNCHID.write_f64(out, self.bunchid);
        field::TIMESTAMP.write(out, self.timestamp);
        field::MODULE_ID.write(out, self.module_id as u64);
        field::ROW.write(out, self.row as u64);
        field::COLUMN.write(out, self.column as u64);
        field::Z_COORD.write(out, self.z_coord as u64);
        field::DEBUG.write(out, self.debug as u64);
        field::ROUND_ROBIN.write(out, self.round_robin as u64);
        field::DETECTOR_TYPE.write(out, self.detector_type as u64);
        field::HEADER_VERSION.write(out, self.header_version as u64);
    }
}
