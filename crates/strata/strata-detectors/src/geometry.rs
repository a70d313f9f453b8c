use crate::error::GeometryError;
use crate::family::DetectorFamily;
use crate::{eiger, gigafrost, jungfrau};

/// How a packet's raw sequence value maps to its place in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMapping {
    /// Sequence is the packet index; packet `i` starts at `i * packet_bytes`.
    PacketNumber,
    /// Sequence is the first row of the packet; rows are `row_bytes` wide.
    StartingRow { rows_per_packet: u32, row_bytes: usize },
}

/// Where one packet's payload lands in the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketPlacement {
    /// Packet index in `0..packets_per_frame`.
    pub index: usize,
    pub offset: usize,
    /// Bytes to copy from the payload.
    pub len: usize,
}

/// Per-module frame geometry of one detector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub family: DetectorFamily,
    pub packets_per_frame: usize,
    /// Frame bytes carried by every packet but the last.
    pub packet_bytes: usize,
    /// Frame bytes carried by the last packet.
    pub last_packet_bytes: usize,
    pub frame_bytes: usize,
    pub module_cols: u32,
    pub module_rows: u32,
    pub bit_depth: u16,
    pub sequence: SequenceMapping,
}

impl FrameGeometry {
    pub fn jungfrau() -> Self {
        Self {
            family: DetectorFamily::Jungfrau,
            packets_per_frame: jungfrau::PACKETS_PER_FRAME,
            packet_bytes: jungfrau::PAYLOAD_BYTES,
            last_packet_bytes: jungfrau::PAYLOAD_BYTES,
            frame_bytes: jungfrau::FRAME_BYTES,
            module_cols: jungfrau::MODULE_COLS as u32,
            module_rows: jungfrau::MODULE_ROWS as u32,
            bit_depth: 16,
            sequence: SequenceMapping::PacketNumber,
        }
    }

    pub fn eiger(bit_depth: u16) -> Result<Self, GeometryError> {
        if !eiger::BIT_DEPTHS.contains(&bit_depth) {
            return Err(GeometryError::BitDepth {
                family: DetectorFamily::Eiger,
                bit_depth,
            });
        }
        let frame_bytes = eiger::frame_bytes(bit_depth);
        Ok(Self {
            family: DetectorFamily::Eiger,
            packets_per_frame: frame_bytes / eiger::PAYLOAD_BYTES,
            packet_bytes: eiger::PAYLOAD_BYTES,
            last_packet_bytes: eiger::PAYLOAD_BYTES,
            frame_bytes,
            module_cols: eiger::MODULE_COLS as u32,
            module_rows: eiger::MODULE_ROWS as u32,
            bit_depth,
            sequence: SequenceMapping::PacketNumber,
        })
    }

    pub fn gigafrost(image_height: u32, image_width: u32) -> Result<Self, GeometryError> {
        let rows_per_packet = gigafrost::rows_per_packet(image_height, image_width)?;
        let module_cols = gigafrost::module_cols(image_width);
        let module_rows = gigafrost::module_rows(image_height);
        let row_bytes = module_cols as usize * 3 / 2;

        let packets_per_frame = module_rows.div_ceil(rows_per_packet) as usize;
        let last_rows = match module_rows % rows_per_packet {
            0 => rows_per_packet,
            rem => rem,
        };

        Ok(Self {
            family: DetectorFamily::Gigafrost,
            packets_per_frame,
            packet_bytes: rows_per_packet as usize * row_bytes,
            last_packet_bytes: last_rows as usize * row_bytes,
            frame_bytes: gigafrost::module_bytes(image_height, image_width),
            module_cols,
            module_rows,
            bit_depth: 12,
            sequence: SequenceMapping::StartingRow {
                rows_per_packet,
                row_bytes,
            },
        })
    }

    /// Module id written into the frame records of module `module_id`.
    ///
    /// Gigafrost configs may number modules past one detector; the record
    /// keeps the position inside the detector (quadrant and link).
    pub fn record_module_id(&self, module_id: u16) -> u16 {
        match self.family {
            DetectorFamily::Gigafrost => module_id % gigafrost::MODULES_PER_DETECTOR,
            DetectorFamily::Jungfrau | DetectorFamily::Eiger => module_id,
        }
    }

    /// Geometry for a detector described by its configuration values.
    pub fn for_detector(
        family: DetectorFamily,
        bit_depth: u16,
        image_height: u32,
        image_width: u32,
    ) -> Result<Self, GeometryError> {
        match family {
            DetectorFamily::Jungfrau => Ok(Self::jungfrau()),
            DetectorFamily::Eiger => Self::eiger(bit_depth),
            DetectorFamily::Gigafrost => Self::gigafrost(image_height, image_width),
        }
    }

    /// Places a packet by its raw sequence value; `None` if the value does not
    /// name a packet of this frame.
    pub fn place(&self, sequence: u32) -> Option<PacketPlacement> {
        let (index, offset) = match self.sequence {
            SequenceMapping::PacketNumber => {
                let index = sequence as usize;
                (index, index * self.packet_bytes)
            }
            SequenceMapping::StartingRow {
                rows_per_packet,
                row_bytes,
            } => {
                if sequence % rows_per_packet != 0 {
                    return None;
                }
                ((sequence / rows_per_packet) as usize, sequence as usize * row_bytes)
            }
        };
        if index >= self.packets_per_frame {
            return None;
        }
        let len = if index + 1 == self.packets_per_frame {
            self.last_packet_bytes
        } else {
            self.packet_bytes
        };
        Some(PacketPlacement {
            index,
            offset,
            len: len.min(self.frame_bytes.saturating_sub(offset)),
        })
    }

    /// Raw sequence value of packet `index` (inverse of [`FrameGeometry::place`]).
    pub fn sequence_of(&self, index: usize) -> u32 {
        match self.sequence {
            SequenceMapping::PacketNumber => index as u32,
            SequenceMapping::StartingRow {
                rows_per_packet, ..
            } => index as u32 * rows_per_packet,
        }
    }

    /// Wire payload size of packet `index`.
    pub fn wire_payload_bytes(&self, index: usize) -> usize {
        match self.sequence {
            SequenceMapping::PacketNumber => self.packet_bytes,
            SequenceMapping::StartingRow {
                rows_per_packet, ..
            } => {
                let rows = if index + 1 == self.packets_per_frame {
                    self.module_rows - rows_per_packet * index as u32
                } else {
                    rows_per_packet
                };
                gigafrost::payload_bytes_for_rows(rows, self.module_cols * 2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jungfrau_packets_tile_the_frame() {
        let g = FrameGeometry::jungfrau();
        let last = g.place(127).unwrap();
        assert_eq!(last.index, 127);
        assert_eq!(last.offset + last.len, g.frame_bytes);
        assert_eq!(g.place(128), None);
    }

    #[test]
    fn gigafrost_records_wrap_module_ids() {
        let g = FrameGeometry::gigafrost(600, 72).unwrap();
        assert_eq!(g.record_module_id(3), 3);
        assert_eq!(g.record_module_id(8), 0);
        assert_eq!(g.record_module_id(13), 5);
        assert_eq!(FrameGeometry::jungfrau().record_module_id(13), 13);
    }

    #[test]
    fn eiger_rejects_unknown_bit_depth() {
        assert!(FrameGeometry::eiger(12).is_err());
        assert_eq!(FrameGeometry::eiger(8).unwrap().packets_per_frame, 32);
    }

    #[test]
    fn gigafrost_places_packets_by_row() {
        // 36 x 150 module: one packet of 136 rows, one of 14.
        let g = FrameGeometry::gigafrost(600, 72).unwrap();
        assert_eq!(g.packets_per_frame, 2);
        assert_eq!(g.frame_bytes, 36 * 150 * 3 / 2);

        let first = g.place(0).unwrap();
        assert_eq!((first.index, first.offset, first.len), (0, 0, 136 * 54));
        let last = g.place(136).unwrap();
        assert_eq!((last.index, last.offset, last.len), (1, 136 * 54, 14 * 54));
        assert_eq!(last.offset + last.len, g.frame_bytes);

        assert_eq!(g.place(5), None);
        assert_eq!(g.place(272), None);
        assert_eq!(g.sequence_of(1), 136);
        assert_eq!(g.wire_payload_bytes(1), 14 * 54);
    }
}
