use std::fs;
use std::path::{Path, PathBuf};

use migset::merge::{load_stream, merge_files, nearest_index};
use tempfile::tempdir;

fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

#[test]
fn test_nearest_index_picks_closest_either_side() {
    let ts = vec![9i64, 21];
    assert_eq!(nearest_index(&ts, 10), Some(0)); // 9 is nearer than 21
    assert_eq!(nearest_index(&ts, 20), Some(1));
    assert_eq!(nearest_index(&ts, 30), Some(1)); // nearest even at distance 9
    assert_eq!(nearest_index(&ts, 5), Some(0));
    assert_eq!(nearest_index(&ts, 100), Some(1));
    assert_eq!(nearest_index(&[], 5), None);
}

#[test]
fn test_nearest_index_tie_goes_to_earlier() {
    let ts = vec![10i64, 20];
    assert_eq!(nearest_index(&ts, 15), Some(0));
}

#[test]
fn test_missing_input_fails_fast() {
    let dir = tempdir().unwrap();
    assert!(load_stream(&dir.path().join("absent.jsonl")).is_err());
}

#[test]
fn test_unsorted_stream_is_fatal() {
    let dir = tempdir().unwrap();
    let path = write_jsonl(
        dir.path(),
        "unsorted.jsonl",
        &[
            r#"{"timestamp": 20, "v": 1}"#,
            r#"{"timestamp": 10, "v": 2}"#,
        ],
    );
    let err = load_stream(&path).unwrap_err();
    assert!(err.to_string().contains("not sorted"));
}

#[test]
fn test_merge_aligns_nearest_timestamps() {
    let dir = tempdir().unwrap();
    let state = write_jsonl(
        dir.path(),
        "state.jsonl",
        &[
            r#"{"timestamp": 10, "pid": 1, "decision": 1}"#,
            r#"{"timestamp": 20, "pid": 2, "decision": 0}"#,
            r#"{"timestamp": 30, "pid": 3, "decision": 1}"#,
        ],
    );
    let counters = write_jsonl(
        dir.path(),
        "counters.jsonl",
        &[
            r#"{"timestamp": 8, "cycles": 111}"#,
            r#"{"timestamp": 19, "cycles": 222}"#,
            r#"{"timestamp": 31, "cycles": 333}"#,
        ],
    );
    let energy = write_jsonl(
        dir.path(),
        "energy.jsonl",
        &[
            r#"{"timestamp": 9, "package": "package-0", "delta_uj": 100}"#,
            r#"{"timestamp": 21, "package": "package-0", "delta_uj": 200}"#,
        ],
    );
    let output = dir.path().join("merged.csv");

    let stats = merge_files(&state, &counters, &energy, &output).unwrap();
    assert_eq!(stats.rows, 3);

    let csv = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "timestamp,pid,decision,cycles,package,delta_uj");
    // State 10 -> counters 8, energy 9; state 20 -> 19, 21; state 30 -> 31, 21
    assert_eq!(lines[1], "10,1,1,111,package-0,100");
    assert_eq!(lines[2], "20,2,0,222,package-0,200");
    assert_eq!(lines[3], "30,3,1,333,package-0,200");
}

#[test]
fn test_merge_with_empty_enrichment_stream() {
    let dir = tempdir().unwrap();
    let state = write_jsonl(
        dir.path(),
        "state.jsonl",
        &[r#"{"timestamp": 10, "pid": 1}"#],
    );
    let counters = write_jsonl(
        dir.path(),
        "counters.jsonl",
        &[r#"{"timestamp": 8, "cycles": 111}"#],
    );
    let energy = dir.path().join("energy.jsonl");
    fs::write(&energy, "").unwrap();
    let output = dir.path().join("merged.csv");

    let stats = merge_files(&state, &counters, &energy, &output).unwrap();
    assert_eq!(stats.rows, 1);
    let csv = fs::read_to_string(&output).unwrap();
    assert_eq!(csv.lines().next().unwrap(), "timestamp,pid,cycles");
}

#[test]
fn test_column_clash_gets_stream_prefix() {
    let dir = tempdir().unwrap();
    let state = write_jsonl(
        dir.path(),
        "state.jsonl",
        &[r#"{"timestamp": 10, "pid": 1}"#],
    );
    let counters = write_jsonl(
        dir.path(),
        "counters.jsonl",
        &[r#"{"timestamp": 8, "pid": 99, "cycles": 111}"#],
    );
    let energy = write_jsonl(
        dir.path(),
        "energy.jsonl",
        &[r#"{"timestamp": 9, "delta_uj": 5}"#],
    );
    let output = dir.path().join("merged.csv");

    merge_files(&state, &counters, &energy, &output).unwrap();
    let csv = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,pid,ctr_pid,cycles,delta_uj");
    assert_eq!(lines[1], "10,1,99,111,5");
}

#[test]
fn test_csv_quoting_of_awkward_strings() {
    let dir = tempdir().unwrap();
    let state = write_jsonl(
        dir.path(),
        "state.jsonl",
        &[r#"{"timestamp": 10, "comm": "a,b \"c\""}"#],
    );
    let counters = write_jsonl(
        dir.path(),
        "counters.jsonl",
        &[r#"{"timestamp": 8}"#],
    );
    let energy = write_jsonl(
        dir.path(),
        "energy.jsonl",
        &[r#"{"timestamp": 9}"#],
    );
    let output = dir.path().join("merged.csv");

    merge_files(&state, &counters, &energy, &output).unwrap();
    let csv = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[1], r#"10,"a,b ""c""""#);
}
