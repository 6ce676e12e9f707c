use super::{CpuTimes, IgnoreReason, TaskObservation, TaskSample, TaskSource};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Reads task placement and CPU accounting from a procfs hierarchy.
///
/// The root is injectable so tests can point it at a fabricated tree;
/// production use is `/proc`.
pub struct ProcTaskSource {
    root: PathBuf,
    num_cpus: u32,
}

impl ProcTaskSource {
    pub fn new() -> Self {
        let num_cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) as u32 }.max(1);
        Self {
            root: PathBuf::from("/proc"),
            num_cpus,
        }
    }

    pub fn with_root(root: impl Into<PathBuf>, num_cpus: u32) -> Self {
        Self {
            root: root.into(),
            num_cpus: num_cpus.max(1),
        }
    }

    fn parse_task(&self, pid: u32) -> TaskSample {
        let stat_path = self.root.join(pid.to_string()).join("stat");
        let content = match fs::read_to_string(&stat_path) {
            Ok(c) => c,
            // Listed a moment ago but gone now: normal process churn
            Err(_) => return TaskSample::Ignored(IgnoreReason::Vanished),
        };
        parse_stat_line(&content, self.num_cpus)
    }
}

impl Default for ProcTaskSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSource for ProcTaskSource {
    fn num_cpus(&self) -> u32 {
        self.num_cpus
    }

    fn cpu_times(&mut self) -> Result<Vec<CpuTimes>> {
        let stat = fs::read_to_string(self.root.join("stat"))
            .with_context(|| format!("reading {}/stat", self.root.display()))?;
        Ok(parse_cpu_times(&stat))
    }

    fn sample_tasks(&mut self) -> Result<Vec<TaskSample>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("enumerating tasks under {}", self.root.display()))?;
        let mut samples = Vec::new();
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(pid) = name.parse::<u32>() {
                    samples.push(self.parse_task(pid));
                }
            }
        }
        Ok(samples)
    }
}

/// Parse the per-CPU lines of a /proc/stat dump ("cpu0 ...", "cpu1 ...").
/// The aggregate "cpu " line is skipped. Counters beyond softirq (steal,
/// guest) are ignored.
pub fn parse_cpu_times(stat: &str) -> Vec<CpuTimes> {
    let mut times = Vec::new();
    for line in stat.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let fields: Vec<u64> = rest
            .split_whitespace()
            .skip(1)
            .filter_map(|f| f.parse().ok())
            .collect();
        if fields.len() < 7 {
            continue;
        }
        times.push(CpuTimes {
            user: fields[0],
            nice: fields[1],
            system: fields[2],
            idle: fields[3],
            iowait: fields[4],
            irq: fields[5],
            softirq: fields[6],
        });
    }
    times
}

/// Parse one /proc/<pid>/stat line into a task sample.
///
/// comm is delimited by the outermost parentheses and may itself contain
/// spaces or ')', so the line is split at the last ')'. Only tasks that are
/// running (R) or sleeping (S) are observed; everything else is a typed
/// skip for this tick.
pub fn parse_stat_line(line: &str, num_cpus: u32) -> TaskSample {
    let Some(open) = line.find('(') else {
        return TaskSample::Ignored(IgnoreReason::Malformed);
    };
    let Some(close) = line.rfind(')') else {
        return TaskSample::Ignored(IgnoreReason::Malformed);
    };
    let Ok(pid) = line[..open].trim().parse::<u32>() else {
        return TaskSample::Ignored(IgnoreReason::Malformed);
    };
    let comm = line[open + 1..close].to_string();

    // Fields after the comm, 0-indexed: [0]=state ... [36]=processor
    let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();
    if rest.len() < 37 {
        return TaskSample::Ignored(IgnoreReason::Malformed);
    }
    let state = rest[0].chars().next().unwrap_or('?');
    if state != 'R' && state != 'S' {
        return TaskSample::Ignored(IgnoreReason::UnsupportedState);
    }
    let Ok(cpu) = rest[36].parse::<u32>() else {
        return TaskSample::Ignored(IgnoreReason::Malformed);
    };
    if cpu >= num_cpus {
        return TaskSample::Ignored(IgnoreReason::CpuOutOfRange);
    }

    TaskSample::Observed(TaskObservation {
        pid,
        comm,
        cpu,
        state,
    })
}

/// Build a fake /proc/<pid>/stat line for tests.
pub fn fake_stat_line(pid: u32, comm: &str, state: char, cpu: u32) -> String {
    let mut fields: Vec<String> = vec![state.to_string()];
    // Fields 4..=38 of proc(5); only the state and processor matter here
    for _ in 0..35 {
        fields.push("0".to_string());
    }
    fields.push(cpu.to_string());
    format!("{} ({}) {}", pid, comm, fields.join(" "))
}
