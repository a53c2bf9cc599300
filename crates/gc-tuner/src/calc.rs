use crate::bounds::Bounds;

/* Heap
 _______________  => limit: host/cgroup memory hard limit
|               |
|---------------| => threshold: raise the GC percent while the trigger stays under it
|               |
|---------------| => trigger: in_use + in_use * percent / 100
|               |
|---------------|
|    in_use     |
|_______________|

The reclaimer starts a cycle once the heap reaches the trigger, so the percent
that puts the trigger exactly on the threshold is
    percent = (threshold - in_use) / in_use * 100
threshold <= 2 * in_use gives percent <= 100 and reclaims eagerly to avoid OOM;
anything above gives percent > 100 and fewer cycles.
*/

/// Compute the GC percent that keeps the next trigger at `threshold`.
///
/// * `in_use == 0` or `threshold == 0`: no signal, `default_percent`.
/// * `threshold <= in_use`: already over budget, `min_percent`.
/// * otherwise the floored headroom ratio, clamped to `min_percent` first and
///   then `max_percent`, so inverted bounds never panic.
pub fn calc_gc_percent(in_use: u64, threshold: u64, bounds: Bounds) -> u32 {
    if in_use == 0 || threshold == 0 {
        return bounds.default_percent;
    }
    if threshold <= in_use {
        return bounds.min_percent;
    }

    // exact floor for any u64 pair
    let percent = u128::from(threshold - in_use) * 100 / u128::from(in_use);

    if percent < u128::from(bounds.min_percent) {
        bounds.min_percent
    } else if percent > u128::from(bounds.max_percent) {
        bounds.max_percent
    } else {
        percent as u32
    }
}
