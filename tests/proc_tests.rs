use std::fs;

use migset::proc::linux::{fake_stat_line, parse_cpu_times, parse_stat_line};
use migset::proc::{IgnoreReason, ProcTaskSource, TaskSample, TaskSource};
use tempfile::tempdir;

#[test]
fn test_parse_cpu_times_skips_aggregate_line() {
    let stat = "cpu  100 200 300 400 500 600 700 0 0 0\n\
                cpu0 10 20 30 40 50 60 70 0 0 0\n\
                cpu1 11 21 31 41 51 61 71 0 0 0\n\
                intr 12345\n";
    let times = parse_cpu_times(stat);
    assert_eq!(times.len(), 2);
    assert_eq!(times[0].user, 10);
    assert_eq!(times[0].softirq, 70);
    assert_eq!(times[1].idle, 41);
    assert_eq!(times[0].total(), 10 + 20 + 30 + 40 + 50 + 60 + 70);
}

#[test]
fn test_parse_stat_line_running_task() {
    let line = fake_stat_line(1234, "worker", 'R', 3);
    match parse_stat_line(&line, 8) {
        TaskSample::Observed(task) => {
            assert_eq!(task.pid, 1234);
            assert_eq!(task.comm, "worker");
            assert_eq!(task.cpu, 3);
            assert_eq!(task.state, 'R');
        }
        other => panic!("expected observed task, got {:?}", other),
    }
}

#[test]
fn test_comm_with_spaces_and_parens() {
    let line = fake_stat_line(99, "tmux: server (1)", 'S', 0);
    match parse_stat_line(&line, 8) {
        TaskSample::Observed(task) => assert_eq!(task.comm, "tmux: server (1)"),
        other => panic!("expected observed task, got {:?}", other),
    }
}

#[test]
fn test_non_runnable_states_are_typed_skips() {
    for state in ['Z', 'D', 'T', 'I'] {
        let line = fake_stat_line(5, "odd", state, 0);
        assert_eq!(
            parse_stat_line(&line, 8),
            TaskSample::Ignored(IgnoreReason::UnsupportedState)
        );
    }
}

#[test]
fn test_cpu_out_of_range_is_a_typed_skip() {
    let line = fake_stat_line(5, "wide", 'R', 64);
    assert_eq!(
        parse_stat_line(&line, 8),
        TaskSample::Ignored(IgnoreReason::CpuOutOfRange)
    );
}

#[test]
fn test_truncated_line_is_malformed() {
    assert_eq!(
        parse_stat_line("1234 (worker) R 0 0", 8),
        TaskSample::Ignored(IgnoreReason::Malformed)
    );
    assert_eq!(
        parse_stat_line("gibberish", 8),
        TaskSample::Ignored(IgnoreReason::Malformed)
    );
}

#[test]
fn test_source_reads_fabricated_proc_tree() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("stat"),
        "cpu  1 1 1 1 1 1 1 0 0 0\ncpu0 10 0 0 90 0 0 0 0 0 0\n",
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("100")).unwrap();
    fs::write(
        dir.path().join("100/stat"),
        fake_stat_line(100, "alpha", 'R', 0),
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("200")).unwrap();
    fs::write(
        dir.path().join("200/stat"),
        fake_stat_line(200, "beta", 'Z', 0),
    )
    .unwrap();
    // Non-numeric entries are not tasks
    fs::create_dir_all(dir.path().join("sys")).unwrap();

    let mut source = ProcTaskSource::with_root(dir.path(), 1);
    let times = source.cpu_times().unwrap();
    assert_eq!(times.len(), 1);
    assert_eq!(times[0].idle, 90);

    let samples = source.sample_tasks().unwrap();
    assert_eq!(samples.len(), 2);
    let observed: Vec<_> = samples
        .iter()
        .filter_map(|s| match s {
            TaskSample::Observed(t) => Some(t.pid),
            TaskSample::Ignored(_) => None,
        })
        .collect();
    assert_eq!(observed, [100]);
}

#[test]
fn test_source_fails_without_proc_root() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let mut source = ProcTaskSource::with_root(&missing, 4);
    assert!(source.cpu_times().is_err());
    assert!(source.sample_tasks().is_err());
}
