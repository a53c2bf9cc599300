use crate::finalizer::Marker;

/// Minimal interface the tuner expects from the managed runtime.
///
/// Both calls are made from inside a reclamation notification, so
/// implementations must return promptly and must not block on locks held
/// by the collector.
pub trait RuntimeBackend: Send + Sync {
    /// Snapshot of live-heap bytes, in the runtime's own accounting.
    fn heap_in_use(&self) -> u64;

    /// Apply a new GC percent. Returns the previous value.
    fn set_gc_percent(&self, percent: u32) -> u32;
}

/// One-shot reclamation notification.
pub trait CycleHook: Send + Sync {
    /// Take ownership of `marker` and call [`Marker::fire`] once the next
    /// reclamation cycle finds it unreachable.
    ///
    /// The hook must not hold any other reference that would keep the marker
    /// alive past that cycle.
    fn set_finalizer(&self, marker: Marker);
}
