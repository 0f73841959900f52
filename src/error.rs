// pcap-flowmeter/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowmeterError {
    #[error("no .pcap capture found in inbox {}", .0.display())]
    NoInputFound(PathBuf),

    #[error("flow extractor not found at {}", .0.display())]
    ExtractorMissing(PathBuf),

    #[error("extractor native library directory not found at {}", .0.display())]
    DependencyMissing(PathBuf),

    #[error("input capture {} does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to launch extractor {}: {source}", .path.display())]
    ExtractorInvocationFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no flow CSV produced in {} (exit code: {}, file found: {file_found})", .dir.display(), fmt_code(.code))]
    OutputNotFound {
        dir: PathBuf,
        code: Option<i32>,
        file_found: bool,
    },

    #[error("extractor reported failure (exit code: {}, file found: {file_found})", fmt_code(.code))]
    ExitCodeNonZero { code: Option<i32>, file_found: bool },

    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot watch output directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowmeterError>;

// A child killed by a signal has no exit code.
fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".to_string(),
    }
}
