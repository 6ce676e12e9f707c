//! Offline nearest-timestamp alignment of collector logs.
//!
//! The state stream defines the output cardinality: each state record is
//! enriched with the nearest-in-time record from the hardware-counter and
//! energy streams. Nearest means closest in either direction, with ties
//! broken toward the earlier record; no interpolation is performed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::info;

use crate::sink::read_jsonl;

/// One loaded, validated input stream.
#[derive(Debug)]
pub struct Stream {
    pub rows: Vec<Map<String, Value>>,
    pub timestamps: Vec<i64>,
    pub columns: Vec<String>,
}

/// Load a JSONL stream and validate it. A missing path or a stream not
/// sorted by timestamp is a configuration error: fatal, no retry.
pub fn load_stream(path: &Path) -> Result<Stream> {
    if !path.exists() {
        bail!("input file not found: {}", path.display());
    }
    let rows = read_jsonl(path)?;

    let mut timestamps = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let ts = row
            .get("timestamp")
            .and_then(Value::as_i64)
            .with_context(|| format!("{}: row {} has no integer timestamp", path.display(), i))?;
        if let Some(&prev) = timestamps.last() {
            if ts < prev {
                bail!(
                    "{}: not sorted by timestamp at row {} ({} < {})",
                    path.display(),
                    i,
                    ts,
                    prev
                );
            }
        }
        timestamps.push(ts);
    }

    // Column order: first row's key order, then any keys only later rows have
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    Ok(Stream {
        rows,
        timestamps,
        columns,
    })
}

/// Index of the row whose timestamp is nearest to `target`. Ties go to the
/// earlier row. None only for an empty stream.
pub fn nearest_index(timestamps: &[i64], target: i64) -> Option<usize> {
    if timestamps.is_empty() {
        return None;
    }
    let idx = timestamps.partition_point(|&ts| ts < target);
    if idx == 0 {
        return Some(0);
    }
    if idx == timestamps.len() {
        return Some(timestamps.len() - 1);
    }
    let before = timestamps[idx - 1];
    let after = timestamps[idx];
    if target - before <= after - target {
        Some(idx - 1)
    } else {
        Some(idx)
    }
}

/// Merge summary, for logging and tests.
pub struct MergeStats {
    pub rows: usize,
    pub columns: usize,
}

/// Join the three streams and write one flat CSV table, one row per state
/// record. Joined streams contribute their columns minus `timestamp`; any
/// other name clash is disambiguated with a stream prefix.
pub fn merge_streams(
    state: &Stream,
    counters: &Stream,
    energy: &Stream,
    output: &Path,
) -> Result<MergeStats> {
    let mut header: Vec<String> = state.columns.clone();
    let counter_cols = joined_columns(&counters.columns, &header, "ctr");
    header.extend(counter_cols.iter().map(|(out, _)| out.clone()));
    let energy_cols = joined_columns(&energy.columns, &header, "nrg");
    header.extend(energy_cols.iter().map(|(out, _)| out.clone()));

    let file =
        File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", header.join(","))?;

    for (row, &ts) in state.rows.iter().zip(&state.timestamps) {
        let mut fields: Vec<String> = state
            .columns
            .iter()
            .map(|col| csv_field(row.get(col)))
            .collect();

        let counter_row = nearest_index(&counters.timestamps, ts).map(|i| &counters.rows[i]);
        for (_, src) in &counter_cols {
            fields.push(csv_field(counter_row.and_then(|r| r.get(src))));
        }
        let energy_row = nearest_index(&energy.timestamps, ts).map(|i| &energy.rows[i]);
        for (_, src) in &energy_cols {
            fields.push(csv_field(energy_row.and_then(|r| r.get(src))));
        }

        writeln!(writer, "{}", fields.join(","))?;
    }
    writer.flush()?;

    Ok(MergeStats {
        rows: state.rows.len(),
        columns: header.len(),
    })
}

/// Load all three inputs and write the merged table.
pub fn merge_files(
    state_path: &Path,
    counters_path: &Path,
    energy_path: &Path,
    output: &Path,
) -> Result<MergeStats> {
    info!("loading datasets");
    let state = load_stream(state_path)?;
    let counters = load_stream(counters_path)?;
    let energy = load_stream(energy_path)?;

    info!(
        "merging {} state rows with {} counter rows and {} energy rows",
        state.rows.len(),
        counters.rows.len(),
        energy.rows.len()
    );
    let stats = merge_streams(&state, &counters, &energy, output)?;
    info!(
        "wrote {} rows x {} columns to {}",
        stats.rows,
        stats.columns,
        output.display()
    );
    Ok(stats)
}

/// (output name, source key) pairs for a joined stream: drop `timestamp`,
/// prefix anything that clashes with an existing column.
fn joined_columns(
    columns: &[String],
    existing: &[String],
    prefix: &str,
) -> Vec<(String, String)> {
    columns
        .iter()
        .filter(|c| c.as_str() != "timestamp")
        .map(|c| {
            if existing.iter().any(|e| e == c) {
                (format!("{}_{}", prefix, c), c.clone())
            } else {
                (c.clone(), c.clone())
            }
        })
        .collect()
}

/// Render one CSV cell. Strings holding commas, quotes, or newlines are
/// quoted with doubled inner quotes; absent values are empty cells.
fn csv_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => {
            if s.contains(',') || s.contains('"') || s.contains('\n') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        Some(other) => other.to_string(),
    }
}
