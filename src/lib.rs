// pcap-flowmeter/src/lib.rs
use std::path::Path;

pub mod capture;
pub mod config;
pub mod error;
pub mod extractor;
pub mod locate;
pub mod naming;
pub mod orchestrator;
pub mod preflight;
pub mod report;

pub use capture::{latest_capture, resolve_input, CaptureFile, CaptureInfo};
pub use config::{CompletionStrategy, Config, Paths};
pub use error::{FlowmeterError, Result};
pub use naming::expected_csv_name;
pub use orchestrator::{Orchestrator, Stage};
pub use report::{FlowCsvSummary, RunReport};

/// Run the extractor over `pcap` (or the newest inbox capture) with default settings
/// rooted at `base`.
pub async fn process_capture<P: AsRef<Path>>(base: P, pcap: Option<&Path>) -> Result<RunReport> {
    let base = base.as_ref();
    Orchestrator::new(Config::default(), base, base).run(pcap).await
}
