//! Per-CPU load estimation from consecutive accounting snapshots.

use crate::proc::CpuTimes;

/// Utilization percentage for one CPU over the interval between two
/// snapshots: `100 * (1 - idle_delta / total_delta)`, clamped to [0, 100].
///
/// Returns 0.0 when the CPU index is outside either snapshot or when the
/// total delta is not positive (counter reset, identical snapshots).
pub fn per_cpu_load(prev: &[CpuTimes], curr: &[CpuTimes], cpu: u32) -> f64 {
    let cpu = cpu as usize;
    if cpu >= prev.len() || cpu >= curr.len() {
        return 0.0;
    }
    let p = &prev[cpu];
    let c = &curr[cpu];

    let total_delta = c.total() as i64 - p.total() as i64;
    if total_delta <= 0 {
        return 0.0;
    }
    let idle_delta = c.idle as i64 - p.idle as i64;

    let load = 100.0 * (1.0 - idle_delta as f64 / total_delta as f64);
    load.clamp(0.0, 100.0)
}

/// Load for every CPU up to `num_cpus`, computed once per tick.
pub fn per_cpu_loads(prev: &[CpuTimes], curr: &[CpuTimes], num_cpus: u32) -> Vec<f64> {
    (0..num_cpus).map(|cpu| per_cpu_load(prev, curr, cpu)).collect()
}
