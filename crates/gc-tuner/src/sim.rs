//! In-process model of a managed runtime.
//!
//! [`SimulatedRuntime`] implements both [`RuntimeBackend`] and [`CycleHook`]:
//! heap usage is set by the caller, the GC percent is stored as applied, and
//! [`SimulatedRuntime::collect`] plays the part of one reclamation cycle by
//! firing every marker registered before it started.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::backend::{CycleHook, RuntimeBackend};
use crate::bounds::DEFAULT_GC_PERCENT;
use crate::finalizer::Marker;

#[derive(Debug)]
pub struct SimulatedRuntime {
    heap_in_use: AtomicU64,
    gc_percent: AtomicU32,
    cycles: AtomicU64,
    percent_updates: AtomicU64,
    pending: Mutex<Vec<Marker>>,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::with_gc_percent(DEFAULT_GC_PERCENT)
    }

    pub fn with_gc_percent(gc_percent: u32) -> Self {
        Self {
            heap_in_use: AtomicU64::new(0),
            gc_percent: AtomicU32::new(gc_percent),
            cycles: AtomicU64::new(0),
            percent_updates: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn set_heap_in_use(&self, bytes: u64) {
        self.heap_in_use.store(bytes, Ordering::Release);
    }

    /// Currently applied GC percent.
    pub fn gc_percent(&self) -> u32 {
        self.gc_percent.load(Ordering::Acquire)
    }

    /// Number of [`RuntimeBackend::set_gc_percent`] calls.
    pub fn percent_updates(&self) -> u64 {
        self.percent_updates.load(Ordering::Relaxed)
    }

    /// Completed reclamation cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Markers waiting for the next cycle.
    pub fn pending_markers(&self) -> usize {
        self.lock_pending().len()
    }

    /// Run one reclamation cycle.
    ///
    /// Markers registered while this cycle fires wait for the next one.
    pub fn collect(&self) {
        let markers = std::mem::take(&mut *self.lock_pending());
        self.cycles.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(markers = markers.len(), "simulated reclamation cycle");

        for marker in markers {
            marker.fire();
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<Marker>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RuntimeBackend for SimulatedRuntime {
    fn heap_in_use(&self) -> u64 {
        self.heap_in_use.load(Ordering::Acquire)
    }

    fn set_gc_percent(&self, percent: u32) -> u32 {
        self.percent_updates.fetch_add(1, Ordering::Relaxed);
        self.gc_percent.swap(percent, Ordering::AcqRel)
    }
}

impl CycleHook for SimulatedRuntime {
    fn set_finalizer(&self, marker: Marker) {
        self.lock_pending().push(marker);
    }
}
