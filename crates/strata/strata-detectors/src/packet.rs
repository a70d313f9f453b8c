//! Shared decode/encode contract for detector UDP datagrams.
//!
//! Each family exports one static [`PacketLayout`] naming where the three
//! fields the assembler needs (frame id, packet sequence, module id) live in
//! its header. Everything else in the header is family detail, decoded by the
//! typed header of that family.

use crate::error::DecodeError;
use crate::family::DetectorFamily;
use crate::field::Field;

/// Where a packet carries the id its frame is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIdField {
    /// Unsigned frame counter.
    Counter(Field),
    /// Machine pulse id, sent as an `f64` and truncated to an integer.
    PulseId(Field),
}

impl FrameIdField {
    #[inline]
    pub fn read(&self, header: &[u8]) -> u64 {
        match self {
            Self::Counter(f) => f.read(header),
            Self::PulseId(f) => f.read_f64(header) as u64,
        }
    }

    #[inline]
    pub fn write(&self, header: &mut [u8], frame_id: u64) {
        match self {
            Self::Counter(f) => f.write(header, frame_id),
            Self::PulseId(f) => f.write_f64(header, frame_id as f64),
        }
    }
}

/// How a packet states its position inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceField {
    /// Packet index `0..packets_per_frame`.
    PacketNumber(Field),
    /// First image row carried by the packet.
    StartingRow(Field),
}

impl SequenceField {
    pub const fn field(&self) -> Field {
        match self {
            Self::PacketNumber(f) | Self::StartingRow(f) => *f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    pub family: DetectorFamily,
    /// Largest datagram of this family.
    pub packet_bytes: usize,
    pub header_bytes: usize,
    /// Datagrams are always exactly `packet_bytes` long.
    pub fixed_size: bool,
    pub frame_id: FrameIdField,
    pub sequence: SequenceField,
    pub module_id: Option<Field>,
}

/// A decoded view of one datagram. Borrows the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WirePacket<'a> {
    pub frame_id: u64,
    /// Raw sequence value; its meaning is given by [`PacketLayout::sequence`].
    pub sequence: u32,
    pub module_id: Option<u16>,
    pub header: &'a [u8],
    pub payload: &'a [u8],
}

impl PacketLayout {
    pub const fn max_payload_bytes(&self) -> usize {
        self.packet_bytes - self.header_bytes
    }

    pub fn decode<'a>(&self, datagram: &'a [u8]) -> Result<WirePacket<'a>, DecodeError> {
        let len = datagram.len();
        if len < self.header_bytes {
            return Err(DecodeError::Truncated {
                family: self.family,
                len,
                header: self.header_bytes,
            });
        }
        if (self.fixed_size && len != self.packet_bytes) || len > self.packet_bytes {
            return Err(DecodeError::WrongSize {
                family: self.family,
                len,
                expected: self.packet_bytes,
            });
        }

        let (header, payload) = datagram.split_at(self.header_bytes);
        Ok(WirePacket {
            frame_id: self.frame_id.read(header),
            sequence: self.sequence.field().read(header) as u32,
            module_id: self.module_id.map(|f| f.read(header) as u16),
            header,
            payload,
        })
    }

    /// Writes the routing fields and `payload` into `out`; returns the datagram
    /// length. Other header bytes are left untouched.
    pub fn encode(
        &self,
        frame_id: u64,
        sequence: u32,
        module_id: u16,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<usize, DecodeError> {
        let len = self.header_bytes + payload.len();
        if len > self.packet_bytes || (self.fixed_size && len != self.packet_bytes) {
            return Err(DecodeError::WrongSize {
                family: self.family,
                len,
                expected: self.packet_bytes,
            });
        }
        if out.len() < len {
            return Err(DecodeError::Truncated {
                family: self.family,
                len: out.len(),
                header: len,
            });
        }

        self.frame_id.write(out, frame_id);
        self.sequence.field().write(out, sequence as u64);
        if let Some(f) = self.module_id {
            f.write(out, module_id as u64);
        }
        out[self.header_bytes..len].copy_from_slice(payload);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sls::SlsHeader;
    use crate::{gigafrost, jungfrau};

    #[test]
    fn routing_fields_round_trip() {
        let layout = &jungfrau::LAYOUT;
        let payload = vec![0x5A; jungfrau::PAYLOAD_BYTES];
        let mut out = vec![0u8; jungfrau::PACKET_BYTES];

        let len = layout.encode(100, 7, 3, &payload, &mut out).unwrap();
        assert_eq!(len, jungfrau::PACKET_BYTES);

        let p = layout.decode(&out).unwrap();
        assert_eq!(p.frame_id, 100);
        assert_eq!(p.sequence, 7);
        assert_eq!(p.module_id, Some(3));
        assert_eq!(p.payload, &payload[..]);
    }

    #[test]
    fn jungfrau_is_keyed_on_the_pulse_id() {
        let mut out = vec![0u8; jungfrau::PACKET_BYTES];
        let header = SlsHeader {
            framenum: 7,
            bunchid: 1000.0,
            packetnum: 5,
            ..Default::default()
        };
        header.encode(&mut out);

        let p = jungfrau::LAYOUT.decode(&out).unwrap();
        assert_eq!(p.frame_id, 1000);
        assert_eq!(p.sequence, 5);

        jungfrau::LAYOUT.encode(1001, 5, 0, &[0; jungfrau::PAYLOAD_BYTES], &mut out).unwrap();
        let h = SlsHeader::decode(&out);
        assert_eq!(h.bunchid, 1001.0);
        assert_eq!(h.framenum, 7);
    }

    #[test]
    fn fixed_size_families_reject_short_datagrams() {
        let datagram = vec![0u8; jungfrau::PACKET_BYTES - 1];
        assert!(matches!(
            jungfrau::LAYOUT.decode(&datagram),
            Err(DecodeError::WrongSize { len, .. }) if len == jungfrau::PACKET_BYTES - 1
        ));
        assert!(matches!(
            jungfrau::LAYOUT.decode(&datagram[..10]),
            Err(DecodeError::Truncated { header: 48, .. })
        ));
    }

    #[test]
    fn variable_size_families_accept_short_payloads() {
        let mut out = vec![0u8; gigafrost::PACKET_BYTES];
        let len = gigafrost::LAYOUT.encode(9, 40, 0, &[1; 100], &mut out).unwrap();
        let p = gigafrost::LAYOUT.decode(&out[..len]).unwrap();
        assert_eq!(p.frame_id, 9);
        assert_eq!(p.sequence, 40);
        assert_eq!(p.module_id, None);
        assert_eq!(p.payload.len(), 100);

        assert!(gigafrost::LAYOUT.decode(&vec![0u8; gigafrost::PACKET_BYTES + 1]).is_err());
    }
}
