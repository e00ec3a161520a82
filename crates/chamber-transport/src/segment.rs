use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// CRC-32 (ISO-HDLC polynomial) as computed by zlib and the controller firmware.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Header size: flags (1) + sequence number (4) + ack number (4).
pub const HEADER_SIZE: usize = 9;

/// Trailing checksum size.
pub const CHECKSUM_SIZE: usize = 4;

/// Bytes a segment adds around its data.
pub const SEGMENT_OVERHEAD: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Segment flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub ack: bool,
    pub syn: bool,
}

impl Flags {
    const ACK_BIT: u8 = 0b01;
    const SYN_BIT: u8 = 0b10;

    pub fn bits(self) -> u8 {
        let mut bits = 0;
        if self.ack {
            bits |= Self::ACK_BIT;
        }
        if self.syn {
            bits |= Self::SYN_BIT;
        }
        bits
    }

    /// Unknown high bits are ignored.
    pub fn from_bits(bits: u8) -> Self {
        Self {
            ack: bits & Self::ACK_BIT != 0,
            syn: bits & Self::SYN_BIT != 0,
        }
    }
}

/// Errors produced when decoding a segment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    /// Fewer bytes than a header plus checksum.
    #[error("segment truncated ({len} bytes, minimum {SEGMENT_OVERHEAD})")]
    Truncated { len: usize },

    /// The trailing checksum does not match the content.
    #[error("received checksum {received:#010x} does not match computed {computed:#010x}")]
    Checksum { received: u32, computed: u32 },
}

/// Transport-layer protocol data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: u32,
    pub ack_number: u32,
    pub flags: Flags,
    pub data: Bytes,
}

impl Segment {
    /// A data segment carrying `data` under sequence number `seq`.
    pub fn data(seq: u32, data: impl Into<Bytes>) -> Self {
        Self {
            seq,
            ack_number: 0,
            flags: Flags::default(),
            data: data.into(),
        }
    }

    /// An acknowledgement of the peer's segment `ack_number`.
    pub fn ack(seq: u32, ack_number: u32) -> Self {
        Self {
            seq,
            ack_number,
            flags: Flags {
                ack: true,
                syn: false,
            },
            data: Bytes::new(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags.ack
    }

    /// Encoded size of this segment.
    pub fn encoded_len(&self) -> usize {
        SEGMENT_OVERHEAD + self.data.len()
    }

    /// Encode into the wire layout:
    ///
    /// ```text
    /// ┌──────────┬────────────┬────────────┬──────────┬─────────────┐
    /// │ flags u8 │ seq u32 LE │ ack u32 LE │ data ... │ crc32 u32 LE│
    /// └──────────┴────────────┴────────────┴──────────┴─────────────┘
    /// ```
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.flags.bits());
        buf.put_u32_le(self.seq);
        buf.put_u32_le(self.ack_number);
        buf.put_slice(&self.data);
        let crc = checksum(&buf);
        buf.put_u32_le(crc);
        buf.freeze()
    }

    /// Decode and verify a segment. Nothing in a segment with a bad checksum
    /// is trusted.
    pub fn decode(raw: &[u8]) -> Result<Self, SegmentError> {
        if raw.len() < SEGMENT_OVERHEAD {
            return Err(SegmentError::Truncated { len: raw.len() });
        }

        let (content, mut trailer) = raw.split_at(raw.len() - CHECKSUM_SIZE);
        let received = trailer.get_u32_le();
        let computed = checksum(content);
        if received != computed {
            return Err(SegmentError::Checksum { received, computed });
        }

        let mut header = content;
        let flags = Flags::from_bits(header.get_u8());
        let seq = header.get_u32_le();
        let ack_number = header.get_u32_le();

        Ok(Self {
            seq,
            ack_number,
            flags,
            data: Bytes::copy_from_slice(header),
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<seq={},ack_num={},ACK={},SYN={},{:?}>",
            self.seq,
            self.ack_number,
            u8::from(self.flags.ack),
            u8::from(self.flags.syn),
            self.data
        )
    }
}
