//! Fixed-width, whitespace-delimited dataset tables.

use core::fmt::Write as _;
use std::path::Path;

use super::Sample;
use crate::error::{Error, Result};
use crate::storage;

/// Parse every non-blank, non-comment row of the table at `path`.
pub(super) fn read(path: &Path, n_params: usize) -> Result<Vec<Sample>> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| Error::from_io(e, path, "loading a dataset"))?;

    let mut samples = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let table_err = |reason: String| Error::Table {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        };

        let row: Vec<f64> = line
            .split_whitespace()
            .map(|field| {
                field
                    .parse::<f64>()
                    .map_err(|e| table_err(format!("'{field}': {e}")))
            })
            .collect::<Result<_>>()?;

        if row.len() != n_params + 1 {
            return Err(table_err(format!(
                "expected {} columns, found {}",
                n_params + 1,
                row.len()
            )));
        }
        let (params, value) = row.split_at(n_params);
        samples.push(Sample::new(params.to_vec(), value[0]));
    }
    Ok(samples)
}

/// Render `samples` in table form.
pub(super) fn render(samples: &[Sample]) -> String {
    let mut out = String::new();
    for sample in samples {
        for p in &sample.parameters {
            // Writing into a String cannot fail.
            let _ = write!(out, " {p:10.5}");
        }
        let _ = writeln!(out, " {:15.8}", sample.value);
    }
    out
}

/// Write `samples` to `path`, keeping the previous table as `<path>_prev`.
pub(super) fn write(path: &Path, samples: &[Sample]) -> Result<()> {
    storage::backup_previous(path)?;
    storage::atomic_write(path, render(samples).as_bytes())
}
