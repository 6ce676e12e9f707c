//! migset — builds labeled training datasets describing when the Linux
//! scheduler migrates a runnable task between CPUs.
//!
//! Two collector loops sample live system state into append-only JSONL logs
//! (task placement snapshots and package energy counters), and an offline
//! merge stage time-aligns those logs with a hardware-counter log into one
//! flat feature table.

pub mod clock;
pub mod config;
pub mod energy;
pub mod labeler;
pub mod load;
pub mod merge;
pub mod proc;
pub mod sink;
pub mod snapshot;
pub mod topology;
pub mod tracker;
