//! JSONL serialization for canonical records.
//!
//! One JSON object per line, `content` + `metadata` exactly as defined by
//! [`CanonicalRecord`]. This shape is the on-disk file-format contract and
//! must round-trip losslessly.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use zenrag_shared::{CanonicalRecord, Result, ZenragError};

/// Write records to `path`, one JSON object per line, in order.
pub fn write_jsonl(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ZenragError::io(parent, e))?;
    }

    let file = std::fs::File::create(path).map_err(|e| ZenragError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| ZenragError::validation(format!("record serialization failed: {e}")))?;
        writeln!(writer, "{line}").map_err(|e| ZenragError::io(path, e))?;
    }

    writer.flush().map_err(|e| ZenragError::io(path, e))?;
    Ok(())
}

/// Read every record from a JSONL file; any invalid line fails the read.
pub fn read_jsonl(path: &Path) -> Result<Vec<CanonicalRecord>> {
    let file = std::fs::File::open(path).map_err(|e| ZenragError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ZenragError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: CanonicalRecord = serde_json::from_str(&line).map_err(|e| {
            ZenragError::validation(format!("line {}: {e}", idx + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Per-line validation outcome for an existing JSONL file.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Number of lines that parsed as valid records.
    pub valid: usize,
    /// `(line number, error)` for each invalid line.
    pub errors: Vec<(usize, String)>,
}

/// Validate a JSONL file line-by-line, collecting rather than aborting on
/// bad lines.
pub fn validate_jsonl(path: &Path) -> Result<ValidationReport> {
    let file = std::fs::File::open(path).map_err(|e| ZenragError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut report = ValidationReport::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ZenragError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CanonicalRecord>(&line) {
            Ok(_) => report.valid += 1,
            Err(e) => report.errors.push((idx + 1, e.to_string())),
        }
    }
    Ok(report)
}
