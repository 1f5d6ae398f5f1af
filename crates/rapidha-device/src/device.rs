use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rapidha_frame::{command_name, Frame, FrameError, FrameReader, FrameWriter};
use rapidha_transport::{SerialConfig, SerialStream, TransportError};
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::correlator::{Correlator, PendingRequest};
use crate::dispatch::DispatchRegistry;
use crate::error::{DeviceError, Result};
use crate::predicate::{FrameHandler, FramePredicate};

type BoxReader = Box<dyn Read + Send>;
type BoxWriter = Box<dyn Write + Send>;

/// Name of the background reader thread.
pub const READER_THREAD_NAME: &str = "rapidha-reader";

/// Cloneable handle for transmitting commands.
///
/// Writes are serialized, so frames from different threads never
/// interleave on the wire. Handlers may hold one to reply from the reader
/// thread.
#[derive(Clone)]
pub struct FrameSender {
    writer: Arc<Mutex<FrameWriter<BoxWriter>>>,
    sequence: Arc<AtomicU8>,
}

impl FrameSender {
    fn new(writer: FrameWriter<BoxWriter>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            sequence: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Allocate the next sequence number. Wraps after 255.
    pub fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Sequence number used by the most recent command.
    pub fn last_sequence(&self) -> u8 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Transmit a command and return the sequence number it carried.
    pub fn send(&self, command_id: u16, payload: &[u8]) -> Result<u8> {
        let mut writer = self.writer.lock();
        let sequence = self.next_sequence();
        write_command(&mut writer, command_id, sequence, payload)?;
        Ok(sequence)
    }

    /// Transmit a pre-built frame unchanged, sequence number included.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        let mut writer = self.writer.lock();
        write_command(&mut writer, frame.command_id, frame.sequence, &frame.payload)
    }

    /// Register `expected` with `correlator` and transmit, both under the
    /// write lock so the reply cannot arrive before the waiter exists.
    fn send_registered<P>(
        &self,
        correlator: &Correlator,
        command_id: u16,
        payload: &[u8],
        expected: P,
    ) -> Result<PendingRequest>
    where
        P: FramePredicate + 'static,
    {
        let mut writer = self.writer.lock();
        let pending = correlator.register(expected)?;
        let sequence = self.next_sequence();
        write_command(&mut writer, command_id, sequence, payload)?;
        Ok(pending)
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("last_sequence", &self.last_sequence())
            .finish_non_exhaustive()
    }
}

fn write_command(
    writer: &mut FrameWriter<BoxWriter>,
    command_id: u16,
    sequence: u8,
    payload: &[u8],
) -> Result<()> {
    writer.send(command_id, sequence, payload)?;
    debug!(
        command = command_name(command_id),
        command_id = format_args!("{:#06x}", command_id),
        sequence,
        len = payload.len(),
        "frame sent"
    );
    Ok(())
}

struct ReaderWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<FrameReader<BoxReader>>,
}

/// A RapidHA module attached over a byte stream.
///
/// Owns the write half, the background reader thread, the handler registry
/// and the response correlator. Every frame the reader decodes is first
/// dispatched to matching handlers, then offered to pending synchronous
/// requests.
pub struct Device {
    sender: FrameSender,
    registry: Arc<DispatchRegistry>,
    correlator: Correlator,
    config: DeviceConfig,
    // Parked here while the reader thread is stopped.
    reader: Mutex<Option<FrameReader<BoxReader>>>,
    worker: Option<ReaderWorker>,
}

impl Device {
    /// Open a serial device. The reader is not started.
    ///
    /// The port's read timeout is the configured poll interval.
    pub fn open(path: impl AsRef<Path>, config: DeviceConfig) -> Result<Self> {
        let serial = SerialConfig {
            read_timeout: Some(config.poll_interval),
            ..config.serial
        };
        let stream = SerialStream::open(path.as_ref(), &serial)?;
        info!(path = ?path.as_ref(), "device opened");
        Self::from_serial(stream, config)
    }

    /// Build a device over an already opened serial stream.
    ///
    /// The stream's read timeout is set to the poll interval.
    pub fn from_serial(mut stream: SerialStream, config: DeviceConfig) -> Result<Self> {
        stream.set_read_timeout(Some(config.poll_interval))?;
        let writer = stream.try_clone()?;
        Ok(Self::from_parts(stream, writer, config))
    }

    /// Build a device from independent read and write halves.
    ///
    /// The read half should report `WouldBlock` or `TimedOut` periodically,
    /// e.g. via a read timeout, or [`stop`](Self::stop) blocks until the
    /// next byte arrives.
    pub fn from_parts<R, W>(reader: R, writer: W, config: DeviceConfig) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let frame_config = config.frame.clone();
        let reader: BoxReader = Box::new(reader);
        let writer: BoxWriter = Box::new(writer);
        Self {
            sender: FrameSender::new(FrameWriter::with_config(writer, frame_config.clone())),
            registry: Arc::new(DispatchRegistry::with_slow_handler_threshold(
                config.slow_handler_threshold,
            )),
            correlator: Correlator::new(),
            reader: Mutex::new(Some(FrameReader::with_config(reader, frame_config))),
            worker: None,
            config,
        }
    }

    /// Spawn the background reader thread.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(DeviceError::AlreadyStarted);
        }
        let mut reader = self
            .reader
            .get_mut()
            .take()
            .ok_or(DeviceError::ReaderPanicked)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let registry = Arc::clone(&self.registry);
        let correlator = self.correlator.clone();

        let spawned = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || {
                read_loop(&mut reader, &thread_stop, &registry, &correlator);
                reader
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => return Err(DeviceError::Transport(TransportError::Io(err))),
        };
        info!("reader started");
        self.worker = Some(ReaderWorker { stop, handle });
        Ok(())
    }

    /// Stop the reader thread and wait for it to exit.
    ///
    /// The device can be started again afterwards.
    pub fn stop(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(DeviceError::NotStarted)?;
        worker.stop.store(true, Ordering::Release);
        match worker.handle.join() {
            Ok(reader) => {
                *self.reader.get_mut() = Some(reader);
                info!("reader stopped");
                Ok(())
            }
            Err(_) => Err(DeviceError::ReaderPanicked),
        }
    }

    /// True while the reader thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Register a named handler. See [`DispatchRegistry::register`].
    pub fn register<P, H>(&self, name: impl Into<String>, predicate: P, handler: H)
    where
        P: FramePredicate + 'static,
        H: FrameHandler + 'static,
    {
        self.registry.register(name, predicate, handler);
    }

    /// Register a handler that runs for one matching frame only.
    pub fn register_once<P, H>(&self, name: impl Into<String>, predicate: P, handler: H)
    where
        P: FramePredicate + 'static,
        H: FrameHandler + 'static,
    {
        self.registry.register_once(name, predicate, handler);
    }

    /// Register a one-shot handler that is dropped unfired at `deadline`.
    pub fn register_once_until<P, H>(
        &self,
        name: impl Into<String>,
        predicate: P,
        handler: H,
        deadline: Instant,
    ) where
        P: FramePredicate + 'static,
        H: FrameHandler + 'static,
    {
        self.registry
            .register_once_until(name, predicate, handler, deadline);
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// Transmit a command without waiting. Returns its sequence number.
    pub fn send(&self, command_id: u16, payload: &[u8]) -> Result<u8> {
        self.sender.send(command_id, payload)
    }

    /// Transmit a pre-built frame unchanged.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.sender.send_frame(frame)
    }

    /// Transmit a command and block until a frame matching `expected`
    /// arrives or `timeout` elapses.
    ///
    /// Frames that do not match are still dispatched to handlers as usual.
    pub fn send_and_wait<P>(
        &self,
        command_id: u16,
        payload: &[u8],
        expected: P,
        timeout: Duration,
    ) -> Result<Frame>
    where
        P: FramePredicate + 'static,
    {
        if self.worker.is_none() {
            warn!(
                command = command_name(command_id),
                "waiting for a response while the reader is stopped"
            );
        }
        let pending =
            self.sender
                .send_registered(&self.correlator, command_id, payload, expected)?;
        pending.wait(timeout)
    }

    /// Cloneable handle for transmitting from other threads or handlers.
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// The handler registry.
    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    /// The response correlator.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            let _ = worker.handle.join();
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("running", &self.is_running())
            .field("registry", &self.registry)
            .field("correlator", &self.correlator)
            .field("config", &self.config)
            .finish()
    }
}

fn read_loop(
    reader: &mut FrameReader<BoxReader>,
    stop: &AtomicBool,
    registry: &DispatchRegistry,
    correlator: &Correlator,
) {
    while !stop.load(Ordering::Acquire) {
        let result = reader.pump(|frame| {
            registry.dispatch(&frame);
            correlator.offer(&frame);
        });

        match result {
            Ok(_) => {
                registry.prune_expired();
            }
            Err(FrameError::ConnectionClosed) => {
                info!("transport closed");
                correlator.close();
                return;
            }
            Err(err) => {
                warn!(error = %err, "transport read failed");
                correlator.close();
                return;
            }
        }
    }
    debug!(stats = ?reader.stats(), "reader exiting on stop request");
}
