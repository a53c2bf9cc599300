use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::RuntimeBackend;
use crate::bounds::SharedBounds;
use crate::calc::calc_gc_percent;
use crate::finalizer::{Driver, Finalizer};
use crate::Result;

/// State read and written from inside the reclamation callback.
///
/// Every field is its own atomic so the callback never takes a lock.
struct TunerState {
    /// High-water mark in bytes; 0 pauses tuning without stopping.
    threshold: AtomicU64,
    gc_percent: AtomicU32,
    /// Set by [`Tuner::release`]; the percent the runtime must end on.
    released: AtomicBool,
    release_percent: AtomicU32,
    bounds: Arc<SharedBounds>,
    // weak so a pending marker never keeps the runtime alive
    runtime: Weak<dyn RuntimeBackend>,
}

impl TunerState {
    /// Sample the heap and apply the percent that keeps the next trigger
    /// at the threshold.
    fn tuning(&self) {
        let threshold = self.threshold.load(Ordering::Acquire);
        if threshold == 0 {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };

        let in_use = runtime.heap_in_use();
        let bounds = self.bounds.snapshot();
        let percent = calc_gc_percent(in_use, threshold, bounds);

        self.gc_percent.store(percent, Ordering::Release);
        let previous = runtime.set_gc_percent(percent);

        // a release that landed during this pass wrote first, overwrite back
        if self.released.load(Ordering::SeqCst) {
            let release_percent = self.release_percent.load(Ordering::SeqCst);
            runtime.set_gc_percent(release_percent);
            tracing::debug!(
                gc_percent = percent,
                release_percent,
                "tuning pass raced with release, percent restored"
            );
            return;
        }

        tracing::debug!(
            in_use = in_use,
            threshold = threshold,
            min_percent = bounds.min_percent,
            max_percent = bounds.max_percent,
            previous = previous,
            gc_percent = percent,
            "GC percent tuned"
        );
    }
}

/// Keeps one runtime's GC percent tuned to a live-heap threshold.
///
/// Dropping the tuner stops it.
pub struct Tuner {
    state: Arc<TunerState>,
    finalizer: Finalizer,
    // owning reference; the callback only holds a weak one
    runtime: Arc<dyn RuntimeBackend>,
}

impl fmt::Debug for Tuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuner")
            .field("threshold", &self.threshold())
            .field("gc_percent", &self.gc_percent())
            .field("finalizer", &self.finalizer)
            .finish()
    }
}

impl Tuner {
    /// Create a tuner starting at the default percent and register its
    /// tuning routine with `driver`.
    pub fn new(
        threshold: u64,
        runtime: Arc<dyn RuntimeBackend>,
        bounds: Arc<SharedBounds>,
        driver: &Driver,
    ) -> Result<Self> {
        let state = Arc::new(TunerState {
            threshold: AtomicU64::new(threshold),
            gc_percent: AtomicU32::new(bounds.default_percent()),
            released: AtomicBool::new(false),
            release_percent: AtomicU32::new(bounds.default_percent()),
            bounds,
            runtime: Arc::downgrade(&runtime),
        });

        let callback_state = Arc::clone(&state);
        let finalizer = Finalizer::new(driver, move || callback_state.tuning())?;

        tracing::info!(threshold, driver = ?driver, "GC tuner started");

        Ok(Self {
            state,
            finalizer,
            runtime,
        })
    }

    /// Takes effect on the next cycle.
    pub fn set_threshold(&self, threshold: u64) {
        self.state.threshold.store(threshold, Ordering::Release);
    }

    pub fn threshold(&self) -> u64 {
        self.state.threshold.load(Ordering::Acquire)
    }

    /// Last percent computed and applied.
    pub fn gc_percent(&self) -> u32 {
        self.state.gc_percent.load(Ordering::Acquire)
    }

    /// Stop tuning. Idempotent; at most one more tuning pass may still run.
    pub fn stop(&self) {
        if !self.finalizer.is_stopped() {
            tracing::info!(threshold = self.threshold(), "GC tuner stopped");
        }
        self.finalizer.stop();
    }

    /// Stop tuning and leave the runtime on `percent`.
    ///
    /// A tuning pass already running when this is called re-applies `percent`
    /// after its own write, so the runtime ends on `percent` either way.
    pub fn release(&self, percent: u32) {
        self.state.release_percent.store(percent, Ordering::SeqCst);
        self.state.released.store(true, Ordering::SeqCst);
        self.stop();
        self.runtime.set_gc_percent(percent);
    }

    pub fn is_stopped(&self) -> bool {
        self.finalizer.is_stopped()
    }

    /// Number of tuning passes run so far.
    pub fn cycles(&self) -> u64 {
        self.finalizer.cycles()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use std::sync::Mutex;

    use super::*;
    use crate::backend::CycleHook;
    use crate::bounds::Bounds;
    use crate::finalizer::Marker;
    use crate::sim::SimulatedRuntime;

    type Interleave = Box<dyn FnOnce() + Send>;

    /// Runs `on_sample` inside the next heap sample, which is the point where
    /// a tuning pass has started but not yet written its percent.
    #[derive(Default)]
    struct InterleavingRuntime {
        inner: SimulatedRuntime,
        on_sample: Mutex<Option<Interleave>>,
    }

    impl RuntimeBackend for InterleavingRuntime {
        fn heap_in_use(&self) -> u64 {
            let interleave = self.on_sample.lock().expect("poisoned").take();
            if let Some(interleave) = interleave {
                interleave();
            }
            self.inner.heap_in_use()
        }

        fn set_gc_percent(&self, percent: u32) -> u32 {
            self.inner.set_gc_percent(percent)
        }
    }

    impl CycleHook for InterleavingRuntime {
        fn set_finalizer(&self, marker: Marker) {
            self.inner.set_finalizer(marker);
        }
    }

    const MB: u64 = 1024 * 1024;

    fn start(threshold: u64) -> (Arc<SimulatedRuntime>, Tuner) {
        let runtime = Arc::new(SimulatedRuntime::new());
        let tuner = Tuner::new(
            threshold,
            runtime.clone(),
            Arc::new(SharedBounds::default()),
            &Driver::Cycles(runtime.clone()),
        )
        .expect("should start tuner");
        (runtime, tuner)
    }

    #[test]
    fn starts_at_default_percent() {
        let (runtime, tuner) = start(100 * MB);

        assert_eq!(tuner.threshold(), 100 * MB);
        assert_eq!(tuner.gc_percent(), 100);
        assert_eq!(tuner.cycles(), 0);
        assert_eq!(runtime.pending_markers(), 1);
    }

    #[test]
    fn each_cycle_applies_a_new_percent() {
        let (runtime, tuner) = start(100 * MB);

        runtime.set_heap_in_use(25 * MB);
        runtime.collect();
        assert_eq!(tuner.gc_percent(), 300);
        assert_eq!(runtime.gc_percent(), 300);

        runtime.set_heap_in_use(80 * MB);
        runtime.collect();
        assert_eq!(tuner.gc_percent(), 50);
        assert_eq!(runtime.gc_percent(), 50);
        assert_eq!(tuner.cycles(), 2);
    }

    #[test]
    fn threshold_change_applies_next_cycle() {
        let (runtime, tuner) = start(100 * MB);
        runtime.set_heap_in_use(50 * MB);

        runtime.collect();
        assert_eq!(tuner.gc_percent(), 100);

        tuner.set_threshold(200 * MB);
        assert_eq!(tuner.threshold(), 200 * MB);
        assert_eq!(tuner.gc_percent(), 100, "not applied before the next cycle");

        runtime.collect();
        assert_eq!(tuner.gc_percent(), 300);
    }

    #[test]
    fn zero_threshold_pauses_without_stopping() {
        let (runtime, tuner) = start(100 * MB);
        runtime.set_heap_in_use(10 * MB);
        runtime.collect();
        assert_eq!(tuner.gc_percent(), 500);

        tuner.set_threshold(0);
        runtime.set_heap_in_use(90 * MB);
        runtime.collect();

        assert_eq!(tuner.gc_percent(), 500);
        assert!(!tuner.is_stopped());
        assert_eq!(runtime.pending_markers(), 1);
    }

    #[test]
    fn bounds_changes_affect_later_cycles_only() {
        let runtime = Arc::new(SimulatedRuntime::new());
        let bounds = Arc::new(SharedBounds::new(Bounds::default()));
        let tuner = Tuner::new(
            100 * MB,
            runtime.clone(),
            bounds.clone(),
            &Driver::Cycles(runtime.clone()),
        )
        .expect("should start tuner");

        runtime.set_heap_in_use(MB);
        runtime.collect();
        assert_eq!(tuner.gc_percent(), 500);

        bounds.set_max_percent(250);
        assert_eq!(tuner.gc_percent(), 500, "applied value is not re-clamped");

        runtime.collect();
        assert_eq!(tuner.gc_percent(), 250);
    }

    #[test]
    fn stop_is_idempotent() {
        let (runtime, tuner) = start(100 * MB);
        runtime.set_heap_in_use(25 * MB);
        runtime.collect();

        tuner.stop();
        tuner.stop();
        assert!(tuner.is_stopped());

        runtime.set_heap_in_use(90 * MB);
        runtime.collect();
        runtime.collect();

        assert_eq!(tuner.gc_percent(), 300);
        assert_eq!(tuner.cycles(), 1);
        assert_eq!(runtime.pending_markers(), 0);
    }

    #[test]
    fn dropped_tuner_releases_runtime() {
        let (runtime, tuner) = start(100 * MB);
        drop(tuner);

        runtime.collect();
        assert_eq!(runtime.pending_markers(), 0);
        assert_eq!(Arc::strong_count(&runtime), 1);
    }

    #[test]
    fn release_wins_over_an_in_flight_pass() {
        let runtime = Arc::new(InterleavingRuntime::default());
        runtime.inner.set_heap_in_use(25 * MB);
        let tuner = Arc::new(
            Tuner::new(
                100 * MB,
                runtime.clone(),
                Arc::new(SharedBounds::default()),
                &Driver::Cycles(runtime.clone()),
            )
            .expect("should start tuner"),
        );

        let releasing = Arc::clone(&tuner);
        *runtime.on_sample.lock().expect("poisoned") = Some(Box::new(move || {
            releasing.release(100);
        }));
        runtime.inner.collect();

        assert!(tuner.is_stopped());
        assert_eq!(runtime.inner.gc_percent(), 100);

        runtime.inner.set_heap_in_use(10 * MB);
        runtime.inner.collect();
        assert_eq!(runtime.inner.gc_percent(), 100);
        assert_eq!(runtime.inner.pending_markers(), 0);
    }

    #[test]
    fn release_applies_the_given_percent() {
        let (runtime, tuner) = start(100 * MB);
        runtime.set_heap_in_use(25 * MB);
        runtime.collect();
        assert_eq!(runtime.gc_percent(), 300);

        tuner.release(80);
        assert!(tuner.is_stopped());
        assert_eq!(runtime.gc_percent(), 80);

        runtime.collect();
        assert_eq!(runtime.gc_percent(), 80);
    }
}
