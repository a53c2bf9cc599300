//! Allocation workload paced by the simulated runtime's GC percent.

use gc_tuner::sim::SimulatedRuntime;

use crate::config::Profile;

/// State right after one simulated reclamation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRecord {
    pub cycle: u64,
    pub step: u64,
    pub live: u64,
    /// Heap size that triggered the cycle.
    pub heap: u64,
    /// Percent applied by the tuner during this cycle.
    pub gc_percent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub cycles: u64,
    pub peak_heap: u64,
    pub final_percent: u32,
}

/// Grows the heap with garbage on top of a live set and runs a cycle each
/// time it reaches `live_after_last_cycle * (1 + percent / 100)`.
#[derive(Debug)]
pub struct Workload<'a> {
    runtime: &'a SimulatedRuntime,
    profile: Profile,
    base_live: u64,
    garbage_per_step: u64,
    steps: u64,
}

impl<'a> Workload<'a> {
    pub fn new(
        runtime: &'a SimulatedRuntime,
        profile: Profile,
        base_live: u64,
        garbage_per_step: u64,
        steps: u64,
    ) -> Self {
        Self {
            runtime,
            profile,
            base_live,
            garbage_per_step,
            steps,
        }
    }

    pub fn run(&self, mut on_cycle: impl FnMut(&CycleRecord)) -> Summary {
        let mut live_after_cycle = self.base_live.max(1);
        let mut garbage = 0u64;
        let mut peak_heap = 0u64;
        let mut cycles = 0u64;

        self.runtime.set_heap_in_use(self.base_live);

        for step in 0..self.steps {
            let live = self.profile.live_at(self.base_live, step, self.steps);
            garbage = garbage.saturating_add(self.garbage_per_step);
            let heap = live.saturating_add(garbage);
            peak_heap = peak_heap.max(heap);

            let percent = u64::from(self.runtime.gc_percent());
            let trigger =
                live_after_cycle.saturating_add(live_after_cycle.saturating_mul(percent) / 100);
            if heap < trigger {
                continue;
            }

            // the sampler sees what survived marking
            self.runtime.set_heap_in_use(live);
            self.runtime.collect();
            cycles += 1;
            garbage = 0;
            live_after_cycle = live.max(1);

            let record = CycleRecord {
                cycle: cycles,
                step,
                live,
                heap,
                gc_percent: self.runtime.gc_percent(),
            };
            tracing::debug!(?record, trigger, "simulated cycle");
            on_cycle(&record);
        }

        Summary {
            cycles,
            peak_heap,
            final_percent: self.runtime.gc_percent(),
        }
    }
}
