use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodeError;

/// Start-of-frame marker used by RapidHA modules.
pub const START_MARKER: u8 = 0xF1;

/// Frame header: marker (1) + command id (2) + sequence (1) + length (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Checksum over the region between the marker and the checksum field.
pub type ChecksumFn = fn(&[u8]) -> u16;

/// RapidHA checksum: 16-bit sum of every byte, transmitted little-endian.
pub fn additive16(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}

/// Single-byte XOR of every byte.
pub fn xor8(bytes: &[u8]) -> u16 {
    u16::from(bytes.iter().fold(0u8, |acc, byte| acc ^ byte))
}

/// Width of the trailing checksum field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumWidth {
    One,
    /// Two bytes, little-endian.
    Two,
}

impl ChecksumWidth {
    pub fn len(self) -> usize {
        match self {
            ChecksumWidth::One => 1,
            ChecksumWidth::Two => 2,
        }
    }

    fn mask(self, value: u16) -> u16 {
        match self {
            ChecksumWidth::One => value & 0x00FF,
            ChecksumWidth::Two => value,
        }
    }
}

/// Wire constants of the codec.
///
/// The reassembly logic only ever sees a `FrameFormat`, so a different
/// protocol revision can be validated by swapping the format without
/// touching the decoder.
#[derive(Clone, Copy)]
pub struct FrameFormat {
    /// Byte that opens every frame.
    pub start_marker: u8,
    /// Checksum over command id, sequence, length and payload.
    pub checksum: ChecksumFn,
    /// Width of the checksum field.
    pub checksum_width: ChecksumWidth,
    /// Maximum payload accepted on encode and decode (capped at [`MAX_PAYLOAD`]).
    pub max_payload: usize,
}

impl FrameFormat {
    /// The RapidHA serial protocol: `0xF1` marker, 16-bit additive checksum.
    pub const fn rapidha() -> Self {
        Self {
            start_marker: START_MARKER,
            checksum: additive16,
            checksum_width: ChecksumWidth::Two,
            max_payload: MAX_PAYLOAD,
        }
    }

    /// Effective payload limit after applying the length-field capacity.
    pub fn payload_limit(&self) -> usize {
        self.max_payload.min(MAX_PAYLOAD)
    }

    /// Total wire size of a frame carrying `payload_len` bytes.
    pub fn wire_size(&self, payload_len: usize) -> usize {
        HEADER_SIZE + payload_len + self.checksum_width.len()
    }

    /// Largest frame this format can put on the wire.
    pub fn max_frame_size(&self) -> usize {
        self.wire_size(self.payload_limit())
    }

    fn compute_checksum(&self, region: &[u8]) -> u16 {
        self.checksum_width.mask((self.checksum)(region))
    }

    fn put_checksum(&self, value: u16, dst: &mut BytesMut) {
        match self.checksum_width {
            ChecksumWidth::One => dst.put_u8(value as u8),
            ChecksumWidth::Two => dst.put_u16_le(value),
        }
    }

    fn read_checksum(&self, field: &[u8]) -> u16 {
        match self.checksum_width {
            ChecksumWidth::One => u16::from(field[0]),
            ChecksumWidth::Two => u16::from_le_bytes([field[0], field[1]]),
        }
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::rapidha()
    }
}

impl fmt::Debug for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameFormat")
            .field("start_marker", &format_args!("{:#04x}", self.start_marker))
            .field("checksum_width", &self.checksum_width)
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}

/// One decoded, checksum-valid protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Primary byte in the high half, secondary byte in the low half.
    pub command_id: u16,
    /// Sequence byte. The host increments it per command; replies echo it.
    pub sequence: u8,
    /// Opaque payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command_id: u16, sequence: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            command_id,
            sequence,
            payload: payload.into(),
        }
    }

    /// Primary command byte (the command group).
    pub fn primary(&self) -> u8 {
        (self.command_id >> 8) as u8
    }

    /// Secondary command byte.
    pub fn secondary(&self) -> u8 {
        self.command_id as u8
    }

    /// The total wire size of this frame in the RapidHA format.
    pub fn wire_size(&self) -> usize {
        FrameFormat::rapidha().wire_size(self.payload.len())
    }
}

/// Why a complete candidate frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFrame {
    /// The checksum field does not match the recomputed checksum.
    ChecksumMismatch {
        command_id: u16,
        expected: u16,
        found: u16,
    },
    /// The length field exceeds the format's payload limit.
    LengthExceeded { length: usize, max: usize },
}

/// Result of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete, valid frame.
    Frame(Frame),
    /// More bytes are needed.
    Incomplete,
    /// The candidate at the marker was rejected; only the marker was consumed.
    Invalid(InvalidFrame),
}

/// Outcome of [`try_decode_one`] plus how far the caller must advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub outcome: DecodeOutcome,
    /// Bytes to drop from the front of the buffer.
    pub consumed: usize,
    /// Leading bytes before the start marker, included in `consumed`.
    pub skipped: usize,
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬─────────┬───────────┬──────────┬────────┬─────────────┬──────────┐
/// │ Marker │ Primary │ Secondary │ Sequence │ Length │ Payload     │ Checksum │
/// │ 0xF1   │ (1B)    │ (1B)      │ (1B)     │ (1B)   │ (Length B)  │ (2B LE)  │
/// └────────┴─────────┴───────────┴──────────┴────────┴─────────────┴──────────┘
/// ```
///
/// The checksum covers everything between the marker and the checksum.
pub fn encode(
    format: &FrameFormat,
    command_id: u16,
    sequence: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<(), EncodeError> {
    let max = format.payload_limit();
    if payload.len() > max {
        return Err(EncodeError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }

    dst.reserve(format.wire_size(payload.len()));
    dst.put_u8(format.start_marker);
    let region_start = dst.len();
    dst.put_u16(command_id);
    dst.put_u8(sequence);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    let checksum = format.compute_checksum(&dst[region_start..]);
    format.put_checksum(checksum, dst);
    Ok(())
}

/// Encode an existing [`Frame`].
pub fn encode_frame(
    format: &FrameFormat,
    frame: &Frame,
    dst: &mut BytesMut,
) -> Result<(), EncodeError> {
    encode(format, frame.command_id, frame.sequence, &frame.payload, dst)
}

/// Try to extract exactly one frame from the front of `src`.
///
/// Pure function of the bytes given: the caller drops `consumed` bytes.
/// Bytes before the first start marker are always consumed. A rejected
/// candidate consumes only its marker byte so a later marker can still be
/// found.
pub fn try_decode_one(format: &FrameFormat, src: &[u8]) -> Decoded {
    let Some(skipped) = src.iter().position(|b| *b == format.start_marker) else {
        return Decoded {
            outcome: DecodeOutcome::Incomplete,
            consumed: src.len(),
            skipped: src.len(),
        };
    };

    let candidate = &src[skipped..];
    let incomplete = Decoded {
        outcome: DecodeOutcome::Incomplete,
        consumed: skipped,
        skipped,
    };

    if candidate.len() < HEADER_SIZE {
        return incomplete;
    }

    let payload_len = usize::from(candidate[4]);
    let max = format.payload_limit();
    if payload_len > max {
        return Decoded {
            outcome: DecodeOutcome::Invalid(InvalidFrame::LengthExceeded {
                length: payload_len,
                max,
            }),
            consumed: skipped + 1,
            skipped,
        };
    }

    let total = format.wire_size(payload_len);
    if candidate.len() < total {
        return incomplete;
    }

    let body_end = HEADER_SIZE + payload_len;
    let command_id = u16::from_be_bytes([candidate[1], candidate[2]]);
    let expected = format.compute_checksum(&candidate[1..body_end]);
    let found = format.read_checksum(&candidate[body_end..total]);

    if expected != found {
        return Decoded {
            outcome: DecodeOutcome::Invalid(InvalidFrame::ChecksumMismatch {
                command_id,
                expected,
                found,
            }),
            consumed: skipped + 1,
            skipped,
        };
    }

    Decoded {
        outcome: DecodeOutcome::Frame(Frame {
            command_id,
            sequence: candidate[3],
            payload: Bytes::copy_from_slice(&candidate[HEADER_SIZE..body_end]),
        }),
        consumed: skipped + total,
        skipped,
    }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Wire constants.
    pub format: FrameFormat,
    /// Bytes requested per transport read. Default: 256.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            format: FrameFormat::rapidha(),
            read_chunk_size: 256,
        }
    }
}
