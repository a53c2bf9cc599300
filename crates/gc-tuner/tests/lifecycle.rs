//! A tuner driven by simulated reclamation cycles while the heap moves
//! through the bands below and above its threshold.

use std::sync::Arc;

use gc_tuner::sim::SimulatedRuntime;
use gc_tuner::{Bounds, Driver, SharedBounds, Tuner};
use similar_asserts::assert_eq;

const MB: u64 = 1024 * 1024;
const CYCLES: usize = 100;

fn start(threshold: u64) -> (Arc<SimulatedRuntime>, Arc<SharedBounds>, Tuner) {
    let runtime = Arc::new(SimulatedRuntime::new());
    let bounds = Arc::new(SharedBounds::new(Bounds::default()));
    let tuner = Tuner::new(
        threshold,
        runtime.clone(),
        bounds.clone(),
        &Driver::Cycles(runtime.clone()),
    )
    .expect("should start tuner");
    (runtime, bounds, tuner)
}

#[test_log::test]
fn percent_follows_heap_bands() {
    let mem_limit = 100 * MB;
    let threshold = mem_limit / 2;
    let (runtime, bounds, tuner) = start(threshold);
    let Bounds {
        min_percent,
        max_percent,
        default_percent,
    } = bounds.snapshot();

    assert_eq!(tuner.threshold(), threshold);
    assert_eq!(tuner.gc_percent(), default_percent);

    // almost no heap
    runtime.set_heap_in_use(1);
    for _ in 0..CYCLES {
        runtime.collect();
        assert_eq!(tuner.gc_percent(), max_percent);
    }

    // 1/4 threshold
    runtime.set_heap_in_use(threshold / 4);
    for _ in 0..CYCLES {
        runtime.collect();
        assert!(tuner.gc_percent() >= default_percent);
        assert!(tuner.gc_percent() <= max_percent);
    }

    // 1/2 threshold
    runtime.set_heap_in_use(threshold / 2);
    for _ in 0..CYCLES {
        runtime.collect();
        assert!(tuner.gc_percent() >= min_percent);
        assert!(tuner.gc_percent() <= default_percent);
    }

    // 3/4 threshold
    runtime.set_heap_in_use(threshold / 4 * 3);
    for _ in 0..CYCLES {
        runtime.collect();
        assert_eq!(tuner.gc_percent(), min_percent);
    }

    // out of threshold
    runtime.set_heap_in_use(threshold + 1024);
    for _ in 0..CYCLES {
        runtime.collect();
        assert_eq!(tuner.gc_percent(), min_percent);
    }

    assert_eq!(tuner.cycles(), (5 * CYCLES) as u64);
    assert_eq!(runtime.gc_percent(), min_percent);
}

#[test_log::test]
fn stop_during_pressure_freezes_percent() {
    let (runtime, _bounds, tuner) = start(64 * MB);

    runtime.set_heap_in_use(16 * MB);
    runtime.collect();
    assert_eq!(tuner.gc_percent(), 300);

    tuner.stop();
    let updates = runtime.percent_updates();

    for heap in [32 * MB, 60 * MB, 128 * MB] {
        runtime.set_heap_in_use(heap);
        runtime.collect();
    }

    assert_eq!(tuner.gc_percent(), 300);
    assert_eq!(runtime.percent_updates(), updates);
}

#[test_log::test]
fn cycles_from_many_threads_stay_bounded() {
    let (runtime, bounds, tuner) = start(256 * MB);
    let snapshot = bounds.snapshot();

    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let runtime = Arc::clone(&runtime);
            std::thread::spawn(move || {
                for step in 0..200u64 {
                    runtime.set_heap_in_use((i * 200 + step + 1) * MB);
                    runtime.collect();
                }
            })
        })
        .collect();

    for step in 0..200u64 {
        tuner.set_threshold((128 + step) * MB);
        let percent = tuner.gc_percent();
        assert!(percent >= snapshot.min_percent && percent <= snapshot.max_percent);
    }

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let percent = tuner.gc_percent();
    assert!(percent >= snapshot.min_percent && percent <= snapshot.max_percent);
    assert_eq!(runtime.pending_markers(), 1);
}
