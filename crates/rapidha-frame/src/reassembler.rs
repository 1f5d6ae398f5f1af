use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{try_decode_one, DecodeOutcome, Decoded, Frame, FrameFormat};

/// Counters describing what the reassembler has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Valid frames emitted.
    pub frames: u64,
    /// Candidates rejected (bad checksum or length).
    pub invalid: u64,
    /// Bytes dropped while searching for a start marker.
    pub discarded_bytes: u64,
}

/// Turns arbitrarily chunked input into whole frames.
///
/// Between calls the buffer holds at most one partially received frame:
/// it is either empty or starts with a start marker and is shorter than
/// that frame's full wire size.
pub struct StreamReassembler {
    buf: BytesMut,
    format: FrameFormat,
    stats: ReassemblyStats,
}

impl StreamReassembler {
    /// Create a reassembler for the RapidHA format.
    pub fn new() -> Self {
        Self::with_format(FrameFormat::rapidha())
    }

    /// Create a reassembler for an explicit wire format.
    pub fn with_format(format: FrameFormat) -> Self {
        Self {
            buf: BytesMut::with_capacity(format.max_frame_size()),
            format,
            stats: ReassemblyStats::default(),
        }
    }

    /// Append `chunk` and hand every frame it completes to `emit`, in order.
    ///
    /// Returns the number of frames emitted. Never blocks.
    pub fn ingest<F>(&mut self, chunk: &[u8], mut emit: F) -> usize
    where
        F: FnMut(Frame),
    {
        self.buf.extend_from_slice(chunk);

        let mut emitted = 0usize;
        loop {
            let Decoded {
                outcome,
                consumed,
                skipped,
            } = try_decode_one(&self.format, &self.buf);

            if skipped > 0 {
                self.stats.discarded_bytes += skipped as u64;
                debug!(skipped, "discarded bytes before start marker");
            }
            self.buf.advance(consumed);

            match outcome {
                DecodeOutcome::Frame(frame) => {
                    self.stats.frames += 1;
                    emitted += 1;
                    debug!(
                        command_id = format_args!("{:#06x}", frame.command_id),
                        sequence = frame.sequence,
                        len = frame.payload.len(),
                        "frame decoded"
                    );
                    emit(frame);
                }
                DecodeOutcome::Invalid(reason) => {
                    self.stats.invalid += 1;
                    warn!(?reason, "dropping invalid frame, resynchronizing");
                }
                DecodeOutcome::Incomplete => break,
            }
        }

        emitted
    }

    /// Append `chunk` and collect the frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.ingest(chunk, |frame| frames.push(frame));
        frames
    }

    /// Bytes waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Counters since creation.
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Wire format in use.
    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Drop any partially received frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode, START_MARKER};

    fn wire(command_id: u16, sequence: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode(&FrameFormat::rapidha(), command_id, sequence, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn whole_frame_in_one_chunk() {
        let mut r = StreamReassembler::new();
        let frames = r.push(&wire(0x5521, 0, &[0x00, 0x02]));
        assert_eq!(frames, vec![Frame::new(0x5521, 0, vec![0x00, 0x02])]);
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn split_at_every_boundary_yields_same_frame() {
        let bytes = wire(0x0109, 5, &[0x01, 0x02, 0x0B, 0x00, 0x00, 0x34, 0x12]);
        let expected = Frame::new(0x0109, 5, bytes[5..bytes.len() - 2].to_vec());

        for split in 1..bytes.len() {
            let mut r = StreamReassembler::new();
            assert!(r.push(&bytes[..split]).is_empty(), "split {split}");
            let frames = r.push(&bytes[split..]);
            assert_eq!(frames, vec![expected.clone()], "split {split}");
            assert_eq!(r.buffered_len(), 0);
        }
    }

    #[test]
    fn byte_at_a_time_yields_same_frame() {
        let bytes = wire(0x5580, 9, &[0x00]);
        let mut r = StreamReassembler::new();
        let mut frames = Vec::new();
        for b in &bytes {
            frames.extend(r.push(std::slice::from_ref(b)));
        }
        assert_eq!(frames, vec![Frame::new(0x5580, 9, vec![0x00])]);
    }

    #[test]
    fn many_frames_in_one_chunk_keep_order() {
        let mut chunk = Vec::new();
        for seq in 0..10u8 {
            chunk.extend(wire(0x0503, seq, &[0x00, seq]));
        }
        let mut r = StreamReassembler::new();
        let frames = r.push(&chunk);
        let seqs: Vec<u8> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, (0..10).collect::<Vec<_>>());
        assert_eq!(r.stats().frames, 10);
    }

    #[test]
    fn resyncs_after_corrupt_frame() {
        let mut corrupt = wire(0x0531, 1, &[0xAA, 0xBB]);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        let good = wire(0x0531, 2, &[0xCC]);

        let mut chunk = vec![0x00, 0x11];
        chunk.extend(&corrupt);
        chunk.extend(&good);

        let mut r = StreamReassembler::new();
        let frames = r.push(&chunk);
        assert_eq!(frames, vec![Frame::new(0x0531, 2, vec![0xCC])]);
        let stats = r.stats();
        assert_eq!(stats.invalid, 1);
        assert!(stats.discarded_bytes >= 2);
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn false_marker_inside_garbage_does_not_hide_next_frame() {
        // A stray marker whose length field claims more than follows.
        let mut chunk = vec![START_MARKER, 0x01, 0x09, 0x00, 0x03, 0xEE];
        let good = wire(0x0109, 3, &[0x01]);
        chunk.extend(&good);

        let mut r = StreamReassembler::new();
        let frames = r.push(&chunk);
        assert_eq!(frames, vec![Frame::new(0x0109, 3, vec![0x01])]);
    }

    #[test]
    fn partial_frame_is_retained_until_completed() {
        let bytes = wire(0x5503, 4, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut r = StreamReassembler::new();
        assert!(r.push(&[0x99, 0x98]).is_empty());
        assert_eq!(r.buffered_len(), 0, "garbage without a marker is dropped");

        assert!(r.push(&bytes[..6]).is_empty());
        assert_eq!(r.buffered_len(), 6);
        assert_eq!(r.push(&bytes[6..]).len(), 1);
    }

    #[test]
    fn buffer_never_exceeds_one_partial_frame() {
        let format = FrameFormat::rapidha();
        let mut r = StreamReassembler::new();
        let noise: Vec<u8> = (0u16..2048)
            .map(|i| if i % 7 == 0 { START_MARKER } else { (i * 13) as u8 })
            .collect();
        for chunk in noise.chunks(17) {
            r.push(chunk);
            assert!(r.buffered_len() < format.max_frame_size());
        }
    }

    #[test]
    fn ingest_callback_sees_frames_in_order() {
        let mut chunk = wire(0x0109, 1, &[]);
        chunk.extend(wire(0x5521, 2, &[]));
        let mut seen = Vec::new();
        let mut r = StreamReassembler::default();
        let n = r.ingest(&chunk, |f| seen.push(f.command_id));
        assert_eq!(n, 2);
        assert_eq!(seen, vec![0x0109, 0x5521]);
    }

    #[test]
    fn clear_drops_partial_frame() {
        let bytes = wire(0x5503, 4, &[1, 2, 3]);
        let mut r = StreamReassembler::new();
        r.push(&bytes[..4]);
        r.clear();
        assert_eq!(r.buffered_len(), 0);
        assert!(r.push(&bytes[4..]).is_empty());
    }
}
