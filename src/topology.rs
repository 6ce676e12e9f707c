//! CPU to NUMA node resolution.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Assumed CPUs per node when the topology source is unavailable. This is
/// an approximation, not a guarantee of topological correctness.
pub const CPUS_PER_NODE_FALLBACK: u32 = 8;

/// Maps a CPU id to its NUMA node via the sysfs per-CPU node id, falling
/// back to `cpu / CPUS_PER_NODE_FALLBACK` when the source is absent,
/// unreadable, or malformed.
pub struct TopologyResolver {
    base: PathBuf,
    warned: AtomicBool,
}

impl TopologyResolver {
    pub fn new() -> Self {
        Self::with_base("/sys/devices/system/cpu")
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            warned: AtomicBool::new(false),
        }
    }

    pub fn node_of(&self, cpu: u32) -> u32 {
        let path = self.base.join(format!("cpu{}", cpu)).join("node_id");
        match fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            Some(node) => node,
            None => {
                // Log the degraded path once, not per lookup
                if !self.warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        "topology source unavailable at {:?}, assuming {} CPUs per node",
                        path, CPUS_PER_NODE_FALLBACK
                    );
                }
                cpu / CPUS_PER_NODE_FALLBACK
            }
        }
    }
}

impl Default for TopologyResolver {
    fn default() -> Self {
        Self::new()
    }
}
