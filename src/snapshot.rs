//! Periodic snapshot loop: samples task placement, detects migrations,
//! and streams labeled records to the append-only log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::clock;
use crate::labeler::{MigrationLabeler, MigrationRecord, TickFeatures};
use crate::load;
use crate::proc::{CpuTimes, TaskSample, TaskSource};
use crate::sink::JsonlSink;
use crate::topology::TopologyResolver;
use crate::tracker::TaskLocationTracker;

/// Buffered records are flushed once this many accumulate.
pub const FLUSH_THRESHOLD: usize = 50;

/// The loop is either running or terminally stopped; `Stopped` is reached
/// by the shutdown flag or the configured duration elapsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Counts for one tick, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickStats {
    pub observed: usize,
    pub ignored: usize,
    pub records: usize,
}

/// The snapshot-driven state collector.
///
/// All mutable collection state (previous accounting snapshot, task
/// locations, comm cache, record buffer, stride counters) lives on this
/// instance; each collector is independently constructible and testable.
pub struct StateCollector<S: TaskSource> {
    source: S,
    topology: TopologyResolver,
    tracker: TaskLocationTracker,
    labeler: MigrationLabeler,
    sink: JsonlSink,
    prev_times: Option<Vec<CpuTimes>>,
    comms: HashMap<u32, String>,
    buffer: Vec<MigrationRecord>,
    state: LoopState,
}

impl<S: TaskSource> StateCollector<S> {
    pub fn new(source: S, topology: TopologyResolver, sink: JsonlSink) -> Self {
        let num_cpus = source.num_cpus();
        Self {
            source,
            topology,
            tracker: TaskLocationTracker::new(),
            labeler: MigrationLabeler::new(num_cpus),
            sink,
            prev_times: None,
            comms: HashMap::new(),
            buffer: Vec::new(),
            state: LoopState::Running,
        }
    }

    /// Take one snapshot: enumerate tasks, diff against the previous
    /// placement, label transitions and stride-selected non-transitions,
    /// and buffer the results.
    pub fn tick(&mut self) -> Result<TickStats> {
        let timestamp = clock::monotonic_ns();
        let curr_times = self.source.cpu_times()?;
        let samples = self.source.sample_tasks()?;

        let mut stats = TickStats::default();
        let mut current: HashMap<u32, u32> = HashMap::new();
        let mut runqueues: HashMap<u32, u32> = HashMap::new();

        for sample in samples {
            match sample {
                TaskSample::Observed(task) => {
                    stats.observed += 1;
                    current.insert(task.pid, task.cpu);
                    *runqueues.entry(task.cpu).or_insert(0) += 1;
                    self.comms.entry(task.pid).or_insert(task.comm);
                }
                TaskSample::Ignored(reason) => {
                    stats.ignored += 1;
                    debug!("ignored task sample: {:?}", reason);
                }
            }
        }

        // First tick has no previous accounting snapshot; loads are zero
        // and the tracker diff is empty anyway.
        let num_cpus = self.source.num_cpus();
        let loads = match &self.prev_times {
            Some(prev) => load::per_cpu_loads(prev, &curr_times, num_cpus),
            None => vec![0.0; num_cpus as usize],
        };

        let features = TickFeatures {
            timestamp,
            loads: &loads,
            runqueues: &runqueues,
            topology: &self.topology,
        };

        let buffered_before = self.buffer.len();
        for transition in self.tracker.diff(&current) {
            let comm = self
                .comms
                .get(&transition.pid)
                .map(String::as_str)
                .unwrap_or("unknown");
            if transition.prev_cpu != transition.curr_cpu {
                let record = self.labeler.migration(
                    transition.pid,
                    comm,
                    transition.prev_cpu,
                    transition.curr_cpu,
                    &features,
                );
                self.buffer.push(record);
            } else if let Some(record) =
                self.labeler
                    .stationary(transition.pid, comm, transition.curr_cpu, &features)
            {
                self.buffer.push(record);
            }
        }
        stats.records = self.buffer.len() - buffered_before;

        // Drop cached names for tasks no longer observed
        self.comms.retain(|pid, _| current.contains_key(pid));

        // Accounting snapshot advances only after the whole tick
        self.prev_times = Some(curr_times);

        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(stats)
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        for record in &self.buffer {
            self.sink.append(record)?;
        }
        self.sink.flush()?;

        let positives = self.labeler.positives();
        let negatives = self.labeler.negatives();
        let total = positives + negatives;
        if total > 0 {
            info!(
                "flushed {} records (positive: {} {:.1}%, negative: {} {:.1}%)",
                self.buffer.len(),
                positives,
                positives as f64 / total as f64 * 100.0,
                negatives,
                negatives as f64 / total as f64 * 100.0,
            );
        }
        self.buffer.clear();
        Ok(())
    }

    /// Transition to `Stopped` and perform the guaranteed final flush.
    pub fn stop(&mut self) -> Result<()> {
        self.state = LoopState::Stopped;
        self.flush()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn labeler(&self) -> &MigrationLabeler {
        &self.labeler
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drive the loop at a fixed interval until the shutdown flag is set
    /// or the configured duration elapses. No record is silently dropped
    /// on shutdown.
    pub async fn run(
        &mut self,
        interval: Duration,
        duration: Option<Duration>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        info!(
            "starting state snapshot collection (interval {:?}, cpus {})",
            interval,
            self.source.num_cpus()
        );

        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(interval);
        while self.state == LoopState::Running {
            ticker.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.tick()?;
            if let Some(limit) = duration {
                if started.elapsed() >= limit {
                    break;
                }
            }
        }

        self.stop()?;
        info!(
            "state collection stopped ({} positive, {} negative)",
            self.labeler.positives(),
            self.labeler.negatives()
        );
        Ok(())
    }
}
