#![forbid(unsafe_code)]

//! Wire formats of the supported detectors, the frame record written for
//! every assembled module frame and the image record of the sync process.

pub mod eiger;
pub mod gigafrost;
pub mod jungfrau;
pub mod sls;

mod error;
mod family;
mod field;
mod frame;
mod geometry;
mod image;
mod packet;

pub use error::{DecodeError, GeometryError};
pub use family::DetectorFamily;
pub use field::Field;
pub use frame::{
    COMMON_FRAME_BYTES, CommonFrame, FRAME_META_BYTES, FrameDetail, FrameMeta, INVALID_FRAME_ID,
};
pub use geometry::{FrameGeometry, PacketPlacement, SequenceMapping};
pub use image::{IMAGE_META_BYTES, ImageMeta, ImageStatus};
pub use packet::{FrameIdField, PacketLayout, SequenceField, WirePacket};
