use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rapidha_frame::Frame;
use tracing::{debug, error, warn};

use crate::predicate::{FrameHandler, FramePredicate};

struct HandlerEntry {
    name: String,
    predicate: Box<dyn FramePredicate>,
    handler: Box<dyn FrameHandler>,
    once: bool,
    fired: AtomicBool,
    expires_at: Option<Instant>,
}

impl HandlerEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Ordered set of named frame handlers.
///
/// Handlers run in registration order. Each call to [`dispatch`] works on a
/// snapshot of the entries, so handlers may register or unregister
/// (themselves included) without deadlocking; such changes apply from the
/// next frame on.
///
/// [`dispatch`]: DispatchRegistry::dispatch
pub struct DispatchRegistry {
    entries: RwLock<Vec<Arc<HandlerEntry>>>,
    slow_handler_threshold: Duration,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::with_slow_handler_threshold(Duration::from_millis(50))
    }

    /// Handlers taking longer than `threshold` are logged at warn level.
    pub fn with_slow_handler_threshold(threshold: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            slow_handler_threshold: threshold,
        }
    }

    /// Register a handler. An existing handler with the same name is
    /// replaced in place and keeps its position.
    pub fn register<P, H>(&self, name: impl Into<String>, predicate: P, handler: H)
    where
        P: FramePredicate + 'static,
        H: FrameHandler + 'static,
    {
        self.insert(name.into(), Box::new(predicate), Box::new(handler), false, None);
    }

    /// Register a handler that removes itself after its first matching frame.
    pub fn register_once<P, H>(&self, name: impl Into<String>, predicate: P, handler: H)
    where
        P: FramePredicate + 'static,
        H: FrameHandler + 'static,
    {
        self.insert(name.into(), Box::new(predicate), Box::new(handler), true, None);
    }

    /// Like [`register_once`](Self::register_once), but the handler is
    /// dropped unfired once `deadline` passes.
    ///
    /// An expired handler never runs. It is removed by the next
    /// [`dispatch`](Self::dispatch) or [`prune_expired`](Self::prune_expired).
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
        self.insert(
            name.into(),
            Box::new(predicate),
            Box::new(handler),
            true,
            Some(deadline),
        );
    }

    fn insert(
        &self,
        name: String,
        predicate: Box<dyn FramePredicate>,
        handler: Box<dyn FrameHandler>,
        once: bool,
        expires_at: Option<Instant>,
    ) {
        let entry = Arc::new(HandlerEntry {
            name,
            predicate,
            handler,
            once,
            fired: AtomicBool::new(false),
            expires_at,
        });

        let mut entries = self.entries.write();
        if let Some(slot) = entries.iter_mut().find(|e| e.name == entry.name) {
            debug!(name = %entry.name, "replacing handler");
            *slot = entry;
        } else {
            debug!(name = %entry.name, once, "registering handler");
            entries.push(entry);
        }
    }

    /// Remove a handler by name. Returns false if no such handler exists.
    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        let removed = entries.len() != before;
        if removed {
            debug!(name, "unregistered handler");
        }
        removed
    }

    /// Remove handlers whose deadline has passed. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        if !self.entries.read().iter().any(|e| e.is_expired(now)) {
            return 0;
        }
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| {
            let expired = e.is_expired(now);
            if expired {
                debug!(name = %e.name, "handler expired");
            }
            !expired
        });
        before - entries.len()
    }

    /// Deliver `frame` to every matching handler, in registration order.
    ///
    /// A panic in a predicate or handler is caught and logged; the remaining
    /// handlers still run. Returns the number of handlers invoked.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let snapshot: Vec<Arc<HandlerEntry>> = self.entries.read().clone();
        let now = Instant::now();

        let mut invoked = 0usize;
        for entry in snapshot {
            if entry.is_expired(now) {
                self.entries.write().retain(|e| !Arc::ptr_eq(e, &entry));
                debug!(name = %entry.name, "handler expired");
                continue;
            }
            let matched = match catch_unwind(AssertUnwindSafe(|| entry.predicate.matches(frame)))
            {
                Ok(matched) => matched,
                Err(panic) => {
                    error!(
                        name = %entry.name,
                        panic = panic_message(panic.as_ref()),
                        "handler predicate panicked"
                    );
                    continue;
                }
            };
            if !matched {
                continue;
            }

            if entry.once {
                if entry.fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                self.entries.write().retain(|e| !Arc::ptr_eq(e, &entry));
            }

            let started = Instant::now();
            let outcome =
                catch_unwind(AssertUnwindSafe(|| entry.handler.handle(&entry.name, frame)));
            let elapsed = started.elapsed();
            invoked += 1;

            if let Err(panic) = outcome {
                error!(
                    name = %entry.name,
                    command_id = format_args!("{:#06x}", frame.command_id),
                    panic = panic_message(panic.as_ref()),
                    "handler panicked"
                );
            }
            if elapsed > self.slow_handler_threshold {
                warn!(
                    name = %entry.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow frame handler delays the reader"
                );
            }
        }
        invoked
    }

    /// True if a live handler with `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .any(|e| e.name == name && !e.is_expired(now))
    }

    /// Live handler names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("handlers", &self.names())
            .field("slow_handler_threshold", &self.slow_handler_threshold)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
