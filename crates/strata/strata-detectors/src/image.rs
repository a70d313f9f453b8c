//! Record published by the sync process for every released image.
//!
//! ```text
//! 0        8                 16     20     24   26   27      32
//! ┌────────┬─────────────────┬──────┬──────┬────┬────┬───────┐
//! │image_id│n_missing_packets│height│width │bits│stat│ zero  │
//! └────────┴─────────────────┴──────┴──────┴────┴────┴───────┘
//! ```

use crate::error::DecodeError;
use crate::field::Field;

pub const IMAGE_META_BYTES: usize = 32;

const IMAGE_ID: Field = Field::new(0, 8);
const MISSING_PACKETS: Field = Field::new(8, 8);
const HEIGHT: Field = Field::new(16, 4);
const WIDTH: Field = Field::new(20, 4);
const BIT_DEPTH: Field = Field::new(24, 2);
const STATUS: Field = Field::new(26, 1);

const _: () = assert!(STATUS.end() <= IMAGE_META_BYTES);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ImageStatus {
    #[default]
    Good = 0,
    /// At least one module frame of the image lost packets.
    MissingPackets = 1,
}

impl ImageStatus {
    pub fn from_missing(n_missing_packets: u64) -> Self {
        if n_missing_packets == 0 {
            Self::Good
        } else {
            Self::MissingPackets
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Good),
            1 => Some(Self::MissingPackets),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageMeta {
    pub image_id: u64,
    pub status: ImageStatus,
    /// Worst missing packet count over the image's module frames.
    pub n_missing_packets: u64,
    pub height: u32,
    pub width: u32,
    pub bit_depth: u16,
}

impl ImageMeta {
    pub fn encode(&self) -> [u8; IMAGE_META_BYTES] {
        let mut bytes = [0u8; IMAGE_META_BYTES];
        IMAGE_ID.write(&mut bytes, self.image_id);
        MISSING_PACKETS.write(&mut bytes, self.n_missing_packets);
        HEIGHT.write(&mut bytes, self.height as u64);
        WIDTH.write(&mut bytes, self.width as u64);
        BIT_DEPTH.write(&mut bytes, self.bit_depth as u64);
        STATUS.write(&mut bytes, self.status as u64);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < IMAGE_META_BYTES {
            return Err(DecodeError::ImageRecord {
                len: bytes.len(),
                expected: IMAGE_META_BYTES,
            });
        }
        let status = STATUS.read(bytes) as u8;
        Ok(Self {
            image_id: IMAGE_ID.read(bytes),
            status: ImageStatus::from_u8(status).ok_or(DecodeError::ImageStatus(status))?,
            n_missing_packets: MISSING_PACKETS.read(bytes),
            height: HEIGHT.read(bytes) as u32,
            width: WIDTH.read(bytes) as u32,
            bit_depth: BIT_DEPTH.read(bytes) as u16,
        })
    }

    pub fn is_good(&self) -> bool {
        self.status == ImageStatus::Good
    }
}
