//! Task location tracking across samples.

use std::collections::HashMap;

/// A task seen in both the previous and current sample, with its CPU in
/// each. `prev_cpu != curr_cpu` means the task migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub pid: u32,
    pub prev_cpu: u32,
    pub curr_cpu: u32,
}

/// Holds the previous sample's `pid -> cpu` map. Tasks that newly appear
/// or disappear produce no transition; no migration is inferred for a task
/// that vanishes. History is exactly one step deep.
#[derive(Default)]
pub struct TaskLocationTracker {
    prev: HashMap<u32, u32>,
}

impl TaskLocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs every surviving pid with its previous and current CPU, then
    /// replaces the internal state with `current` wholesale.
    ///
    /// Output is sorted by pid so downstream sampling decisions are
    /// reproducible for a given input.
    pub fn diff(&mut self, current: &HashMap<u32, u32>) -> Vec<Transition> {
        let mut transitions: Vec<Transition> = current
            .iter()
            .filter_map(|(&pid, &curr_cpu)| {
                self.prev.get(&pid).map(|&prev_cpu| Transition {
                    pid,
                    prev_cpu,
                    curr_cpu,
                })
            })
            .collect();
        transitions.sort_by_key(|t| t.pid);
        self.prev = current.clone();
        transitions
    }

    pub fn tracked(&self) -> usize {
        self.prev.len()
    }
}
