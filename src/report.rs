// pcap-flowmeter/src/report.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::capture::CaptureInfo;

/// Shape of the produced flow CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCsvSummary {
    pub columns: usize,
    pub flows: u64,
    pub has_label: bool,
}

impl FlowCsvSummary {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let mut flows = 0u64;
        for record in reader.records() {
            record?;
            flows += 1;
        }

        Ok(FlowCsvSummary {
            columns: headers.len(),
            flows,
            has_label: headers.iter().any(|h| h.trim() == "Label"),
        })
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub capture: PathBuf,
    pub capture_info: Option<CaptureInfo>,
    pub expected_csv: String,
    pub output: PathBuf,
    pub renamed_from: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub file_found: bool,
    pub flow_summary: Option<FlowCsvSummary>,
    pub elapsed_ms: u128,
    pub finished_at: String,
}

impl RunReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Capture: {}", self.capture.display())?;
        if let Some(info) = &self.capture_info {
            writeln!(
                f,
                "Packets: {} ({} bytes over {:.2}s)",
                info.packets, info.total_bytes, info.duration_seconds
            )?;
        }
        writeln!(f, "Flow CSV: {}", self.output.display())?;
        if let Some(from) = &self.renamed_from {
            writeln!(f, "Renamed from: {}", from.display())?;
        }
        if let Some(summary) = &self.flow_summary {
            writeln!(f, "Flows: {} ({} columns)", summary.flows, summary.columns)?;
        }
        write!(f, "Elapsed: {:.1}s", self.elapsed_ms as f64 / 1000.0)
    }
}
