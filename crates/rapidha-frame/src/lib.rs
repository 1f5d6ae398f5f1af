//! Framing for the RapidHA serial protocol.
//!
//! Every message on the wire is framed as:
//! - A 1-byte start marker (`0xF1`) for stream synchronization
//! - A 2-byte command id (primary group byte, then secondary byte)
//! - A 1-byte sequence number echoed by the module in its response
//! - A 1-byte payload length
//! - A 2-byte little-endian additive checksum
//!
//! The serial line may split, merge or corrupt frames. [`StreamReassembler`]
//! and [`FrameReader`] turn that into a clean sequence of valid frames,
//! skipping garbage and resynchronizing after corruption.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod reassembler;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::RapidHaCodec;
pub use codec::{
    additive16, encode, encode_frame, try_decode_one, xor8, ChecksumFn, ChecksumWidth,
    DecodeOutcome, Decoded, Frame, FrameConfig, FrameFormat, InvalidFrame, HEADER_SIZE,
    MAX_PAYLOAD, START_MARKER,
};
pub use command::{command_id, command_name, direction, is_response, Direction};
pub use error::{EncodeError, FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::{ReassemblyStats, StreamReassembler};
pub use writer::FrameWriter;
