//! Validation report files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::AccuracyReport;

/// A report together with the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Dataset name, e.g. `sintel-final`.
    pub dataset: String,
    pub model: PathBuf,
    pub iters: u32,
    pub warm_start: bool,
    /// Wall time of the pass in seconds.
    pub elapsed_s: f64,
    pub report: AccuracyReport,
}

/// Writes `validation_<dataset>.txt` and `validation_<dataset>.json` under a
/// result directory.
pub struct ReportExporter;

impl ReportExporter {
    /// Export the summary line as plain text.
    pub fn export_summary(record: &ValidationRecord, result_dir: &Path) -> Result<PathBuf> {
        let path = result_dir.join(format!("validation_{}.txt", record.dataset));
        std::fs::write(&path, format!("{}\n", record.report.summary_line()))?;
        Ok(path)
    }

    /// Export the full record as JSON.
    pub fn export_json(record: &ValidationRecord, result_dir: &Path) -> Result<PathBuf> {
        let path = result_dir.join(format!("validation_{}.json", record.dataset));
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Export both files, creating the result directory if needed.
    pub fn export_all(record: &ValidationRecord, result_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(result_dir)?;

        let paths = vec![
            Self::export_summary(record, result_dir)?,
            Self::export_json(record, result_dir)?,
        ];
        for path in &paths {
            tracing::info!(path = %path.display(), "Exported validation report");
        }
        Ok(paths)
    }
}

/// Load a JSON record written by [`ReportExporter::export_json`].
pub fn load_record(path: &Path) -> Result<ValidationRecord> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
