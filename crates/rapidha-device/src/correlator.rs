use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use rapidha_frame::Frame;
use tracing::{debug, error};

use crate::dispatch::panic_message;
use crate::error::{DeviceError, Result};
use crate::predicate::FramePredicate;

enum Delivery {
    Frame(Frame),
    Closed,
}

struct Waiter {
    id: u64,
    predicate: Box<dyn FramePredicate>,
    tx: Sender<Delivery>,
}

#[derive(Default)]
struct State {
    waiters: Vec<Waiter>,
    next_id: u64,
    closed: bool,
}

/// Pairs outgoing commands with the response frames they wait for.
///
/// Each waiter gets its own one-shot channel. A frame resolves at most one
/// waiter: the oldest whose predicate matches.
#[derive(Clone, Default)]
pub struct Correlator {
    state: Arc<Mutex<State>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a frame matching `predicate`.
    ///
    /// Register before transmitting the command so a fast reply cannot be
    /// missed. Fails with `TransportClosed` once [`close`](Self::close) ran.
    pub fn register<P>(&self, predicate: P) -> Result<PendingRequest>
    where
        P: FramePredicate + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut state = self.state.lock();
        if state.closed {
            return Err(DeviceError::TransportClosed);
        }
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.waiters.push(Waiter {
            id,
            predicate: Box::new(predicate),
            tx,
        });
        debug!(waiter = id, pending = state.waiters.len(), "registered response waiter");

        Ok(PendingRequest {
            id,
            rx,
            state: Arc::clone(&self.state),
        })
    }

    /// Offer a received frame. Resolves the first matching waiter, if any.
    pub fn offer(&self, frame: &Frame) -> bool {
        let mut state = self.state.lock();
        let position = state.waiters.iter().position(|waiter| {
            match catch_unwind(AssertUnwindSafe(|| waiter.predicate.matches(frame))) {
                Ok(matched) => matched,
                Err(panic) => {
                    error!(
                        waiter = waiter.id,
                        panic = panic_message(panic.as_ref()),
                        "response predicate panicked"
                    );
                    false
                }
            }
        });

        let Some(position) = position else {
            return false;
        };
        let waiter = state.waiters.remove(position);
        debug!(
            waiter = waiter.id,
            command_id = format_args!("{:#06x}", frame.command_id),
            sequence = frame.sequence,
            "response matched"
        );
        // Capacity one and a single send per waiter: this cannot block.
        let _ = waiter.tx.try_send(Delivery::Frame(frame.clone()));
        true
    }

    /// Fail every pending waiter with `TransportClosed` and refuse new ones.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let waiters = std::mem::take(&mut state.waiters);
        if !waiters.is_empty() {
            debug!(count = waiters.len(), "failing pending waiters, transport closed");
        }
        for waiter in waiters {
            let _ = waiter.tx.try_send(Delivery::Closed);
        }
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of waiters not yet resolved.
    pub fn pending(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Correlator")
            .field("pending", &state.waiters.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// One outstanding synchronous request.
///
/// Dropping it without waiting withdraws the waiter.
pub struct PendingRequest {
    id: u64,
    rx: Receiver<Delivery>,
    state: Arc<Mutex<State>>,
}

impl PendingRequest {
    /// Block until the matching frame arrives, the transport closes, or
    /// `timeout` elapses.
    ///
    /// If a match races the timeout the match wins: exactly one outcome is
    /// reported and a timed-out waiter is never resolved later.
    pub fn wait(self, timeout: Duration) -> Result<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(delivery) => delivered(delivery),
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::TransportClosed),
            Err(RecvTimeoutError::Timeout) => {
                let withdrawn = {
                    let mut state = self.state.lock();
                    let before = state.waiters.len();
                    state.waiters.retain(|w| w.id != self.id);
                    state.waiters.len() != before
                };
                if withdrawn {
                    debug!(waiter = self.id, ?timeout, "response wait timed out");
                    return Err(DeviceError::Timeout(timeout));
                }
                // Resolved between the timeout and taking the lock.
                match self.rx.try_recv() {
                    Ok(delivery) => delivered(delivery),
                    Err(TryRecvError::Empty) => Err(DeviceError::Timeout(timeout)),
                    Err(TryRecvError::Disconnected) => Err(DeviceError::TransportClosed),
                }
            }
        }
    }

    /// Waiter id, unique within its correlator.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.state.lock().waiters.retain(|w| w.id != self.id);
    }
}

fn delivered(delivery: Delivery) -> Result<Frame> {
    match delivery {
        Delivery::Frame(frame) => Ok(frame),
        Delivery::Closed => Err(DeviceError::TransportClosed),
    }
}
