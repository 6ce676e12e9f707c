//! Labeled record construction and the negative-sampling policy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::topology::TopologyResolver;

/// Every Nth non-migrating observation becomes a negative example. Without
/// this throttle the dataset would be overwhelmingly "stayed" records;
/// with it the negative rate is roughly 1-in-5 of observations, which
/// approximates balance but does not guarantee it — downstream consumers
/// must still check class ratios.
pub const NEGATIVE_STRIDE: u64 = 5;

/// A CPU with load below this percentage is reported as idle.
pub const IDLE_THRESHOLD: f64 = 5.0;

/// One labeled training example. Immutable once written.
///
/// `decision = 1` records come from an observed CPU change between two
/// consecutive samples. `decision = 0` records are synthetic: `dst_cpu` is
/// the deterministically chosen candidate `(src_cpu + 1) % num_cpus`, not
/// the task's actual location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub timestamp: i64,
    pub pid: u32,
    pub comm: String,

    pub src_cpu: u32,
    pub src_load: f64,
    pub src_runqueue_len: u32,
    pub src_numa_node: u32,
    pub src_cpu_idle: bool,

    pub dst_cpu: u32,
    pub dst_load: f64,
    pub dst_runqueue_len: u32,
    pub dst_numa_node: u32,
    pub dst_cpu_idle: bool,

    pub cross_node: bool,
    pub load_diff: f64,
    pub load_imbalance: f64,

    pub decision: u8,
}

/// Per-tick feature inputs shared by all records built in that tick.
pub struct TickFeatures<'a> {
    pub timestamp: i64,
    /// Load percentage per CPU, indexed by CPU id.
    pub loads: &'a [f64],
    /// Count of observed tasks per CPU in the current sample.
    pub runqueues: &'a HashMap<u32, u32>,
    pub topology: &'a TopologyResolver,
}

impl TickFeatures<'_> {
    fn load_at(&self, cpu: u32) -> f64 {
        self.loads.get(cpu as usize).copied().unwrap_or(0.0)
    }

    fn runqueue_at(&self, cpu: u32) -> u32 {
        self.runqueues.get(&cpu).copied().unwrap_or(0)
    }
}

/// Builds labeled records and applies the stride policy for negatives.
///
/// Carries the cumulative observation counter and running class tallies as
/// explicit instance state; independently constructible and testable.
pub struct MigrationLabeler {
    num_cpus: u32,
    observations: u64,
    positives: u64,
    negatives: u64,
}

impl MigrationLabeler {
    pub fn new(num_cpus: u32) -> Self {
        Self {
            num_cpus: num_cpus.max(1),
            observations: 0,
            positives: 0,
            negatives: 0,
        }
    }

    /// Label an observed CPU change. Always produces a record.
    pub fn migration(
        &mut self,
        pid: u32,
        comm: &str,
        src_cpu: u32,
        dst_cpu: u32,
        features: &TickFeatures,
    ) -> MigrationRecord {
        self.observations += 1;
        self.positives += 1;
        self.build(pid, comm, src_cpu, dst_cpu, 1, features)
    }

    /// Label a non-migrating observation. Emits a synthetic negative only
    /// when the cumulative observation counter lands on the stride, so N
    /// consecutive stationary observations yield floor(N / 5) records.
    pub fn stationary(
        &mut self,
        pid: u32,
        comm: &str,
        cpu: u32,
        features: &TickFeatures,
    ) -> Option<MigrationRecord> {
        self.observations += 1;
        if self.observations % NEGATIVE_STRIDE != 0 {
            return None;
        }
        self.negatives += 1;
        let dst_cpu = (cpu + 1) % self.num_cpus;
        Some(self.build(pid, comm, cpu, dst_cpu, 0, features))
    }

    fn build(
        &self,
        pid: u32,
        comm: &str,
        src_cpu: u32,
        dst_cpu: u32,
        decision: u8,
        features: &TickFeatures,
    ) -> MigrationRecord {
        let src_load = round2(features.load_at(src_cpu));
        let dst_load = round2(features.load_at(dst_cpu));
        let src_numa_node = features.topology.node_of(src_cpu);
        let dst_numa_node = features.topology.node_of(dst_cpu);

        MigrationRecord {
            timestamp: features.timestamp,
            pid,
            comm: comm.to_string(),

            src_cpu,
            src_load,
            src_runqueue_len: features.runqueue_at(src_cpu),
            src_numa_node,
            src_cpu_idle: src_load < IDLE_THRESHOLD,

            dst_cpu,
            dst_load,
            dst_runqueue_len: features.runqueue_at(dst_cpu),
            dst_numa_node,
            dst_cpu_idle: dst_load < IDLE_THRESHOLD,

            cross_node: src_numa_node != dst_numa_node,
            load_diff: round2((src_load - dst_load).abs()),
            load_imbalance: round2(src_load - dst_load),

            decision,
        }
    }

    pub fn positives(&self) -> u64 {
        self.positives
    }

    pub fn negatives(&self) -> u64 {
        self.negatives
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
