use crate::family::DetectorFamily;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{family} datagram of {len} bytes is shorter than its {header} byte header")]
    Truncated {
        family: DetectorFamily,
        len: usize,
        header: usize,
    },

    #[error("{family} datagram of {len} bytes, expected {expected}")]
    WrongSize {
        family: DetectorFamily,
        len: usize,
        expected: usize,
    },

    #[error("frame record of {len} bytes, expected {expected}")]
    FrameRecord { len: usize, expected: usize },

    #[error("image record of {len} bytes, expected {expected}")]
    ImageRecord { len: usize, expected: usize },

    #[error("image record with unknown status {0}")]
    ImageStatus(u8),

    #[error("frame record tagged {found}, expected {expected}")]
    FamilyMismatch {
        found: DetectorFamily,
        expected: DetectorFamily,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("unknown detector type '{0}'")]
    UnknownDetector(String),

    #[error("unsupported bit depth {bit_depth} for {family}")]
    BitDepth {
        family: DetectorFamily,
        bit_depth: u16,
    },

    #[error("image of {height}x{width} pixels cannot be split into {family} packets")]
    ImageSize {
        family: DetectorFamily,
        height: u32,
        width: u32,
    },
}
