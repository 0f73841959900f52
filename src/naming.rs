// pcap-flowmeter/src/naming.rs
use std::path::Path;

pub const FLOW_CSV_SUFFIX: &str = "_Flow.csv";

/// CSV name the extractor output is normalized to for a given capture.
///
/// `capture 2024.01.pcap` becomes `capture_2024_01_Flow.csv`.
pub fn expected_csv_name<P: AsRef<Path>>(capture: P) -> String {
    let base = capture
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stem = base.strip_suffix(".pcap").unwrap_or(&base);
    let normalized: String = stem
        .chars()
        .map(|c| match c {
            '.' | '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    format!("{}{}", normalized, FLOW_CSV_SUFFIX)
}

/// Loose match for extractor output whose name we do not control.
pub fn is_flow_csv(name: &str, marker: &str) -> bool {
    name.ends_with(".csv") && name.contains(marker)
}
