//! Task and CPU-time enumeration (reads /proc on Linux)

pub mod linux;

pub use linux::ProcTaskSource;

use anyhow::Result;

/// Per-CPU cumulative time counters since boot, in clock ticks.
///
/// Consumed in (previous, current) pairs to derive a load percentage for
/// the interval between two snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CpuTimes {
    /// Sum of all seven counters.
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }
}

/// One task observed at its current CPU during a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskObservation {
    pub pid: u32,
    pub comm: String,
    pub cpu: u32,
    pub state: char,
}

/// Why a task was not observed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The task exited between enumeration and read.
    Vanished,
    /// Task state is neither running nor sleeping this tick.
    UnsupportedState,
    /// The stat line did not parse.
    Malformed,
    /// Reported CPU is outside the known CPU range.
    CpuOutOfRange,
}

/// Outcome of reading one task. Skips are typed rather than silently
/// dropped so callers (and tests) can tell "no data" from "broken".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSample {
    Observed(TaskObservation),
    Ignored(IgnoreReason),
}

/// Point-in-time supplier of task placement and CPU accounting state.
///
/// The snapshot loop is generic over this so tests can script sequences of
/// samples without a live /proc.
pub trait TaskSource {
    fn num_cpus(&self) -> u32;

    /// Whole-system per-CPU accounting counters, indexed by CPU id.
    fn cpu_times(&mut self) -> Result<Vec<CpuTimes>>;

    /// One sample per task visible right now, observed or typed-skip.
    fn sample_tasks(&mut self) -> Result<Vec<TaskSample>>;
}
