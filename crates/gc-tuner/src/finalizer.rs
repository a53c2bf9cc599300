//! Callback re-armed once per reclamation cycle.
//!
//! With [`Driver::Cycles`] no thread or timer is involved: a [`Marker`] is
//! handed to the runtime as a one-shot finalization subject. When a cycle
//! reclaims it the runtime calls [`Marker::fire`], which runs the callback and
//! hands the marker back for the next cycle. Nothing but the runtime owns the
//! marker, which is what lets the next cycle find it unreachable again.
//!
//! [`Driver::Interval`] covers runtimes without such a hook with a single
//! background thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use crate::backend::CycleHook;
use crate::{Result, TunerError};

type Callback = Box<dyn Fn() + Send + Sync>;

/// What triggers each callback invocation.
#[derive(Clone)]
pub enum Driver {
    /// Once per reclamation cycle, through the runtime's finalization hook.
    Cycles(Arc<dyn CycleHook>),
    /// Once per interval, from a dedicated background thread.
    Interval(Duration),
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Cycles(_) => f.write_str("Cycles"),
            Driver::Interval(interval) => f.debug_tuple("Interval").field(interval).finish(),
        }
    }
}

struct Shared {
    callback: Callback,
    stopped: AtomicBool,
    cycles: AtomicU64,
}

impl Shared {
    /// Returns false once stopped, without invoking the callback.
    fn fire(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        (self.callback)();
        self.cycles.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Finalization subject registered with a [`CycleHook`].
pub struct Marker {
    shared: Arc<Shared>,
    hook: Weak<dyn CycleHook>,
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marker")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Marker {
    /// Run the callback for the cycle that reclaimed this marker, then
    /// re-register it for the next one.
    ///
    /// A stopped marker, or one whose hook is gone, is dropped here and the
    /// loop ends.
    pub fn fire(self) {
        if !self.shared.fire() {
            tracing::trace!("finalizer stopped, marker released");
            return;
        }
        if let Some(hook) = self.hook.upgrade() {
            hook.set_finalizer(self);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

/// Handle to a periodically re-armed callback.
///
/// Dropping the handle stops the callback.
pub struct Finalizer {
    shared: Arc<Shared>,
    ticker: Option<Thread>,
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer")
            .field("stopped", &self.is_stopped())
            .field("cycles", &self.cycles())
            .field("ticker", &self.ticker.as_ref().and_then(Thread::name))
            .finish()
    }
}

impl Finalizer {
    pub fn new(driver: &Driver, callback: impl Fn() + Send + Sync + 'static) -> Result<Self> {
        let shared = Arc::new(Shared {
            callback: Box::new(callback),
            stopped: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        });

        let ticker = match driver {
            Driver::Cycles(hook) => {
                let marker = Marker {
                    shared: Arc::clone(&shared),
                    hook: Arc::downgrade(hook),
                };
                // the hook becomes the marker's only owner
                hook.set_finalizer(marker);
                None
            }
            Driver::Interval(interval) => Some(spawn_ticker(Arc::clone(&shared), *interval)?),
        };

        Ok(Self { shared, ticker })
    }

    /// Stop invoking the callback. Idempotent.
    ///
    /// A firing already in progress completes, so the callback may run once
    /// more after this returns.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(ticker) = &self.ticker {
            ticker.unpark();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Number of callback invocations so far.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_ticker(shared: Arc<Shared>, interval: Duration) -> Result<Thread> {
    if interval.is_zero() {
        return Err(error_stack::report!(TunerError::invalid_config(
            "tuning interval must be greater than zero"
        )));
    }

    let handle = thread::Builder::new()
        .name("gc-tuner".to_string())
        .spawn(move || {
            let mut deadline = Instant::now() + interval;
            loop {
                let now = Instant::now();
                if now < deadline {
                    // woken early by stop() or spuriously
                    thread::park_timeout(deadline - now);
                    if shared.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    continue;
                }
                if !shared.fire() {
                    break;
                }
                deadline = Instant::now() + interval;
            }
            tracing::debug!("gc-tuner ticker exited");
        })
        .map_err(|err| {
            error_stack::report!(TunerError::DriverSpawn {
                reason: err.to_string()
            })
        })?;

    Ok(handle.thread().clone())
}
