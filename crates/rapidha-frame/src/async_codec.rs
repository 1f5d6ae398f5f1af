//! `tokio_util` codec for RapidHA frames.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{encode_frame, try_decode_one, DecodeOutcome, Decoded, Frame, FrameFormat};
use crate::error::FrameError;

/// Decodes and encodes frames on an async byte stream.
///
/// Invalid candidates are dropped and decoding resynchronizes on the next
/// start marker, so the stream only ever yields valid frames.
#[derive(Debug, Clone, Default)]
pub struct RapidHaCodec {
    format: FrameFormat,
}

impl RapidHaCodec {
    pub fn new(format: FrameFormat) -> Self {
        Self { format }
    }
}

impl Decoder for RapidHaCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            let Decoded {
                outcome, consumed, ..
            } = try_decode_one(&self.format, src);
            src.advance(consumed);

            match outcome {
                DecodeOutcome::Frame(frame) => return Ok(Some(frame)),
                DecodeOutcome::Invalid(reason) => {
                    warn!(?reason, "dropping invalid frame, resynchronizing");
                }
                DecodeOutcome::Incomplete => {
                    src.reserve(self.format.max_frame_size().saturating_sub(src.len()));
                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<Frame> for RapidHaCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(&self.format, &frame, dst)?;
        Ok(())
    }
}
