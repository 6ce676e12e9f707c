//! Package energy counter collection (powercap/RAPL style).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock;
use crate::sink::JsonlSink;
use crate::snapshot::FLUSH_THRESHOLD;

pub const DEFAULT_POWERCAP_ROOT: &str = "/sys/class/powercap/intel-rapl";

/// One energy sample for one package domain.
///
/// `energy_uj` is the raw wrapping counter reading; `delta_uj` is the
/// wrap-corrected increment since the previous reading; `total_uj` is the
/// running sum of deltas and never decreases, even across wraps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRecord {
    pub timestamp: i64,
    pub package: String,
    pub energy_uj: u64,
    pub delta_uj: u64,
    pub total_uj: u64,
}

struct EnergyDomain {
    name: String,
    energy_path: PathBuf,
    /// Counter value at which the hardware wraps to zero, read once from
    /// the domain's capability files at discovery.
    max_energy_uj: u64,
    prev_uj: u64,
    total_uj: u64,
}

impl EnergyDomain {
    /// Wrap-corrected delta: when the counter went backwards it wrapped,
    /// so the increment is the distance to the wrap point plus the new
    /// reading.
    fn advance(&mut self, current: u64) -> u64 {
        let delta = if current < self.prev_uj {
            self.max_energy_uj.saturating_sub(self.prev_uj) + current
        } else {
            current - self.prev_uj
        };
        self.total_uj += delta;
        self.prev_uj = current;
        delta
    }
}

/// Reads monotonically increasing per-domain energy counters, surviving
/// counter wraparound and accumulating lifetime totals.
///
/// Carries mutable per-domain accumulator state, so it belongs to exactly
/// one timer loop; it is not safe to share across threads.
pub struct EnergyReader {
    domains: Vec<EnergyDomain>,
}

impl EnergyReader {
    /// Enumerate package domains under a powercap-style hierarchy. An
    /// absent hierarchy is a supported condition yielding zero domains,
    /// not an error.
    pub fn discover(root: &Path) -> Self {
        let mut domains = Vec::new();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(_) => {
                warn!(
                    "energy counters unavailable at {}, continuing without energy data",
                    root.display()
                );
                return Self { domains };
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(dir_name) = file_name.to_str() else {
                continue;
            };
            if !dir_name.starts_with("intel-rapl:") {
                continue;
            }
            let domain_path = entry.path();
            let Ok(name) = fs::read_to_string(domain_path.join("name")) else {
                continue;
            };
            let name = name.trim().to_string();
            if !name.starts_with("package-") {
                continue;
            }
            let max_energy_uj = match fs::read_to_string(domain_path.join("max_energy_range_uj"))
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
            {
                Some(max) => max,
                None => {
                    warn!("domain {} has no readable wrap limit, skipping", name);
                    continue;
                }
            };
            info!("found energy domain {}", name);
            domains.push(EnergyDomain {
                name,
                energy_path: domain_path.join("energy_uj"),
                max_energy_uj,
                prev_uj: 0,
                total_uj: 0,
            });
        }
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        Self { domains }
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// One record per domain. A failed read for a single domain records
    /// a raw value of 0 for that sample rather than aborting the loop.
    pub fn read_sample(&mut self, timestamp: i64) -> Vec<EnergyRecord> {
        let mut records = Vec::with_capacity(self.domains.len());
        for domain in &mut self.domains {
            let current = fs::read_to_string(&domain.energy_path)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(0);
            let delta = domain.advance(current);
            records.push(EnergyRecord {
                timestamp,
                package: domain.name.clone(),
                energy_uj: current,
                delta_uj: delta,
                total_uj: domain.total_uj,
            });
        }
        records
    }

    /// Lifetime totals in joules per package.
    pub fn totals_joules(&self) -> Vec<(String, f64)> {
        self.domains
            .iter()
            .map(|d| (d.name.clone(), d.total_uj as f64 / 1_000_000.0))
            .collect()
    }
}

/// Timer loop draining the reader into an append-only log. Same buffer,
/// flush-threshold, and final-flush behavior as the state collector.
pub struct EnergyCollector {
    reader: EnergyReader,
    sink: JsonlSink,
    buffer: Vec<EnergyRecord>,
    samples: u64,
}

impl EnergyCollector {
    pub fn new(reader: EnergyReader, sink: JsonlSink) -> Self {
        Self {
            reader,
            sink,
            buffer: Vec::new(),
            samples: 0,
        }
    }

    pub fn tick(&mut self) -> Result<()> {
        let records = self.reader.read_sample(clock::monotonic_ns());
        self.buffer.extend(records);
        self.samples += 1;
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        for record in &self.buffer {
            self.sink.append(record)?;
        }
        self.sink.flush()?;
        debug!("flushed {} energy records", self.buffer.len());
        self.buffer.clear();
        Ok(())
    }

    pub async fn run(
        &mut self,
        interval: Duration,
        duration: Option<Duration>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        if self.reader.domain_count() == 0 {
            warn!("no energy domains available, skipping energy collection");
            return Ok(());
        }
        info!(
            "collecting energy data every {:?} across {} domain(s)",
            interval,
            self.reader.domain_count()
        );

        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(interval);
        loop {
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

        // Final flush: no buffered record is dropped on shutdown
        self.flush()?;
        info!("collected {} energy samples", self.samples);
        for (package, joules) in self.reader.totals_joules() {
            info!("{}: {:.2} J", package, joules);
        }
        Ok(())
    }
}
