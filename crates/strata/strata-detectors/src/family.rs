use crate::error::GeometryError;
use crate::packet::PacketLayout;
use crate::{eiger, gigafrost, jungfrau};
use std::fmt;
use std::str::FromStr;

/// Detector families with a known UDP packet layout.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorFamily {
    Jungfrau = 1,
    Eiger = 2,
    Gigafrost = 3,
}

impl DetectorFamily {
    pub const ALL: [DetectorFamily; 3] = [Self::Jungfrau, Self::Eiger, Self::Gigafrost];

    pub fn layout(self) -> &'static PacketLayout {
        match self {
            Self::Jungfrau => &jungfrau::LAYOUT,
            Self::Eiger => &eiger::LAYOUT,
            Self::Gigafrost => &gigafrost::LAYOUT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jungfrau => "jungfrau",
            Self::Eiger => "eiger",
            Self::Gigafrost => "gigafrost",
        }
    }

    /// Tag stored in byte 63 of a frame record.
    pub(crate) fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.tag() == tag)
    }
}

impl fmt::Display for DetectorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorFamily {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jungfrau" | "jf" => Ok(Self::Jungfrau),
            "eiger" | "eg" => Ok(Self::Eiger),
            "gigafrost" | "gf" => Ok(Self::Gigafrost),
            _ => Err(GeometryError::UnknownDetector(s.to_string())),
        }
    }
}
