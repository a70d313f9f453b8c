//! The 64-byte (one cache line) frame record stored next to each frame.
//!
//! ```text
//! 0        8                16   18                           63  64
//! ┌────────┬────────────────┬────┬────────────────────────────┬───┐
//! │frame_id│missing_packets │mod │ family detail, zero padded │tag│
//! └────────┴────────────────┴────┴────────────────────────────┴───┘
//! ```
//!
//! The first 18 bytes are common to all families; consumers that only need
//! the frame id, loss count and module (the synchronizer) decode just those.

use crate::eiger::EigerDetail;
use crate::error::DecodeError;
use crate::family::DetectorFamily;
use crate::field::Field;
use crate::geometry::FrameGeometry;
use crate::gigafrost::{GigafrostDetail, GigafrostHeader};
use crate::jungfrau::JungfrauDetail;
use crate::sls::SlsHeader;

pub const FRAME_META_BYTES: usize = 64;
pub const COMMON_FRAME_BYTES: usize = 18;

/// Frame id that never names a real frame.
pub const INVALID_FRAME_ID: u64 = u64::MAX;

pub(crate) const FAMILY_TAG_OFFSET: usize = FRAME_META_BYTES - 1;

const FRAME_ID: Field = Field::new(0, 8);
const MISSING_PACKETS: Field = Field::new(8, 8);
const MODULE_ID: Field = Field::new(16, 2);

const _: () = assert!(MODULE_ID.end() == COMMON_FRAME_BYTES);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommonFrame {
    pub frame_id: u64,
    pub missing_packets: u64,
    pub module_id: u16,
}

impl CommonFrame {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < COMMON_FRAME_BYTES {
            return Err(DecodeError::FrameRecord {
                len: bytes.len(),
                expected: COMMON_FRAME_BYTES,
            });
        }
        Ok(Self {
            frame_id: FRAME_ID.read(bytes),
            missing_packets: MISSING_PACKETS.read(bytes),
            module_id: MODULE_ID.read(bytes) as u16,
        })
    }

    fn encode(&self, bytes: &mut [u8]) {
        FRAME_ID.write(bytes, self.frame_id);
        MISSING_PACKETS.write(bytes, self.missing_packets);
        MODULE_ID.write(bytes, self.module_id as u64);
    }

    pub fn is_complete(&self) -> bool {
        self.missing_packets == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDetail {
    Jungfrau(JungfrauDetail),
    Eiger(EigerDetail),
    Gigafrost(GigafrostDetail),
}

impl FrameDetail {
    /// Detail of a new frame, taken from the first packet seen for it.
    ///
    /// # Panics
    /// Panics if `header` is shorter than the family's header; pass
    /// [`crate::WirePacket::header`] of a decoded packet.
    pub fn from_packet(geometry: &FrameGeometry, header: &[u8]) -> Self {
        match geometry.family {
            DetectorFamily::Jungfrau => Self::Jungfrau(JungfrauDetail::from_header(&SlsHeader::decode(header))),
            DetectorFamily::Eiger => Self::Eiger(EigerDetail::from_header(
                &SlsHeader::decode(header),
                geometry.bit_depth,
            )),
            DetectorFamily::Gigafrost => Self::Gigafrost(GigafrostDetail::from_header(
                &GigafrostHeader::decode(header),
                geometry.module_cols,
                geometry.module_rows,
            )),
        }
    }

    pub fn family(&self) -> DetectorFamily {
        match self {
            Self::Jungfrau(_) => DetectorFamily::Jungfrau,
            Self::Eiger(_) => DetectorFamily::Eiger,
            Self::Gigafrost(_) => DetectorFamily::Gigafrost,
        }
    }

    pub fn empty(family: DetectorFamily) -> Self {
        match family {
            DetectorFamily::Jungfrau => Self::Jungfrau(JungfrauDetail::default()),
            DetectorFamily::Eiger => Self::Eiger(EigerDetail::default()),
            DetectorFamily::Gigafrost => Self::Gigafrost(GigafrostDetail::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeta {
    pub common: CommonFrame,
    pub detail: FrameDetail,
}

impl FrameMeta {
    pub fn family(&self) -> DetectorFamily {
        self.detail.family()
    }

    pub fn encode(&self) -> [u8; FRAME_META_BYTES] {
        let mut bytes = [0u8; FRAME_META_BYTES];
        self.common.encode(&mut bytes);
        match &self.detail {
            FrameDetail::Jungfrau(d) => d.encode(&mut bytes),
            FrameDetail::Eiger(d) => d.encode(&mut bytes),
            FrameDetail::Gigafrost(d) => d.encode(&mut bytes),
        }
        bytes[FAMILY_TAG_OFFSET] = self.family().tag();
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != FRAME_META_BYTES {
            return Err(DecodeError::FrameRecord {
                len: bytes.len(),
                expected: FRAME_META_BYTES,
            });
        }
        let common = CommonFrame::decode(bytes)?;
        let tag = bytes[FAMILY_TAG_OFFSET];
        let detail = match DetectorFamily::from_tag(tag) {
            Some(DetectorFamily::Jungfrau) => FrameDetail::Jungfrau(JungfrauDetail::decode(bytes)),
            Some(DetectorFamily::Eiger) => FrameDetail::Eiger(EigerDetail::decode(bytes)),
            Some(DetectorFamily::Gigafrost) => FrameDetail::Gigafrost(GigafrostDetail::decode(bytes)),
            None => {
                return Err(DecodeError::FrameRecord {
                    len: bytes.len(),
                    expected: FRAME_META_BYTES,
                });
            }
        };
        Ok(Self { common, detail })
    }

    /// [`FrameMeta::decode`], also checking the record belongs to `family`.
    pub fn decode_as(family: DetectorFamily, bytes: &[u8]) -> Result<Self, DecodeError> {
        let meta = Self::decode(bytes)?;
        if meta.family() != family {
            return Err(DecodeError::FamilyMismatch {
                found: meta.family(),
                expected: family,
            });
        }
        Ok(meta)
    }
}
