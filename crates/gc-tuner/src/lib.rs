//! Adaptive pacing for a managed runtime's reclaimer.
//!
//! The crate keeps a runtime's GC percent tuned to a live-heap ceiling:
//! - [`calc_gc_percent`]: bounded mapping from (heap in use, threshold) to a percent
//! - [`Finalizer`]: callback re-armed once per reclamation cycle (or per interval)
//! - [`Tuner`]: samples the heap on every cycle and applies the new percent
//! - [`Controller`]: at most one active tuner, plus the process-wide free functions
//!
//! The runtime itself is reached only through the [`RuntimeBackend`] and
//! [`CycleHook`] traits, so the same controller drives a real collector or the
//! in-process [`sim::SimulatedRuntime`].

use error_stack::Report;

mod backend;
mod bounds;
mod calc;
mod controller;
mod error;
mod finalizer;
pub mod sim;
mod tuner;

/// Result type using error-stack for context-rich error reporting
pub type Result<T, C = TunerError> = core::result::Result<T, Report<C>>;

pub use backend::{CycleHook, RuntimeBackend};
pub use bounds::{
    Bounds, SharedBounds, DEFAULT_GC_PERCENT, DEFAULT_PERCENT_ENV, MAX_GC_PERCENT,
    MAX_PERCENT_ENV, MIN_GC_PERCENT, MIN_PERCENT_ENV,
};
pub use calc::calc_gc_percent;
pub use controller::{
    get_default_gc_percent, get_gc_percent, get_max_gc_percent, get_min_gc_percent, install,
    set_max_gc_percent, set_min_gc_percent, tuning, Controller,
};
pub use error::TunerError;
pub use finalizer::{Driver, Finalizer, Marker};
pub use tuner::Tuner;
