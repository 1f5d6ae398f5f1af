use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reassembler::{ReassemblyStats, StreamReassembler};

/// Reads complete frames from any `Read` stream.
///
/// Partial reads, line noise and corrupt frames are handled internally.
/// Callers only ever see valid frames.
pub struct FrameReader<T> {
    inner: T,
    reassembler: StreamReassembler,
    pending: VecDeque<Frame>,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: StreamReassembler::with_format(config.format),
            pending: VecDeque::new(),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts surface as `FrameError::Io`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            let pending = &mut self.pending;
            self.reassembler
                .ingest(&self.chunk[..read], |frame| pending.push_back(frame));
        }
    }

    /// Perform at most one transport read and pass completed frames to `emit`.
    ///
    /// Frames left over from an earlier `read_frame` are delivered first.
    /// A read that times out, would block or is interrupted is not an
    /// error: it returns `Ok(0)` so a polling loop can check for shutdown.
    pub fn pump<F>(&mut self, mut emit: F) -> Result<usize>
    where
        F: FnMut(Frame),
    {
        let mut delivered = 0usize;
        while let Some(frame) = self.pending.pop_front() {
            emit(frame);
            delivered += 1;
        }

        let read = match self.inner.read(&mut self.chunk) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                return Ok(delivered)
            }
            Err(err) => return Err(FrameError::Io(err)),
        };

        Ok(delivered + self.reassembler.ingest(&self.chunk[..read], emit))
    }

    /// Reassembly counters.
    pub fn stats(&self) -> ReassemblyStats {
        self.reassembler.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
