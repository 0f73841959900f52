// pcap-flowmeter/src/orchestrator.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::capture::resolve_input;
use crate::config::{CompletionStrategy, Config, Paths};
use crate::error::{FlowmeterError, Result};
use crate::extractor::Extractor;
use crate::locate::{grace_delay, locate_output, OutputLocation, OutputWatch};
use crate::naming::expected_csv_name;
use crate::preflight::{ensure_output_dir, Preflight};
use crate::report::{FlowCsvSummary, RunReport};

/// Stages of a run. Entered in order, never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolvingInput,
    ValidatingPreconditions,
    InvokingExtractor,
    AwaitingExit,
    GraceDelay,
    WatchingOutput,
    LocatingOutput,
    RenamingOutput,
    Success,
    Failure,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolvingInput => "resolving input",
            Stage::ValidatingPreconditions => "validating preconditions",
            Stage::InvokingExtractor => "invoking extractor",
            Stage::AwaitingExit => "awaiting exit",
            Stage::GraceDelay => "grace delay",
            Stage::WatchingOutput => "watching output",
            Stage::LocatingOutput => "locating output",
            Stage::RenamingOutput => "renaming output",
            Stage::Success => "success",
            Stage::Failure => "failure",
        };
        f.write_str(name)
    }
}

fn enter(stage: Stage) {
    log::debug!("stage: {}", stage);
}

pub struct Orchestrator {
    config: Config,
    paths: Paths,
    cwd: PathBuf,
}

impl Orchestrator {
    /// `base` anchors relative config paths, `cwd` anchors a relative capture argument.
    pub fn new(config: Config, base: &Path, cwd: &Path) -> Self {
        let paths = config.resolve_paths(base);
        Orchestrator {
            config,
            paths,
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// One forward pass from capture to flow CSV.
    pub async fn run(&self, explicit: Option<&Path>) -> Result<RunReport> {
        let result = self.execute(explicit).await;
        enter(terminal_stage(&result));
        result
    }

    async fn execute(&self, explicit: Option<&Path>) -> Result<RunReport> {
        let started = Instant::now();
        let completion = &self.config.completion;

        enter(Stage::ResolvingInput);
        let capture = resolve_input(explicit, &self.paths.inbox_dir, &self.cwd)?;
        log::info!("Capture: {}", capture.path.display());

        enter(Stage::ValidatingPreconditions);
        Preflight::check(&self.paths, &capture)?;
        ensure_output_dir(&self.paths.output_dir)?;

        let capture_info = match capture.inspect() {
            Ok(info) => {
                log::info!(
                    "{} packets, {} bytes, {:.2}s",
                    info.packets,
                    info.total_bytes,
                    info.duration_seconds
                );
                Some(info)
            }
            Err(e) => {
                log::warn!("Could not read {}: {}", capture.file_name(), e);
                None
            }
        };

        let expected = expected_csv_name(&capture.path);
        log::debug!("Expecting {}", expected);

        let mut watch = match completion.strategy {
            CompletionStrategy::Watch => Some(OutputWatch::arm(&self.paths.output_dir)?),
            CompletionStrategy::Grace => None,
        };

        enter(Stage::InvokingExtractor);
        let extractor = Extractor::new(&self.config.extractor, &self.paths);
        enter(Stage::AwaitingExit);
        let exit = extractor.run(&capture.path, &self.paths.output_dir).await?;

        let since = completion.scope_to_launch.then_some(exit.launched_at);
        let location = match watch.as_mut() {
            Some(watch) => {
                enter(Stage::WatchingOutput);
                watch
                    .wait_for_output(
                        &expected,
                        &completion.marker,
                        since,
                        Duration::from_secs(completion.watch_timeout_secs),
                        Duration::from_millis(completion.settle_ms),
                    )
                    .await?
            }
            None => {
                enter(Stage::GraceDelay);
                grace_delay(Duration::from_millis(completion.grace_delay_ms)).await;
                enter(Stage::LocatingOutput);
                locate_output(&self.paths.output_dir, &expected, &completion.marker, since)?
            }
        };

        if let Some(from) = location.as_ref().and_then(|l| l.renamed_from.as_ref()) {
            enter(Stage::RenamingOutput);
            log::debug!("Output normalized from {}", from.display());
        }

        let location = judge(exit.code, location, &self.paths.output_dir)?;

        let flow_summary = match FlowCsvSummary::read(&location.path) {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::warn!("Could not summarize {}: {}", location.path.display(), e);
                None
            }
        };

        Ok(RunReport {
            capture: capture.path,
            capture_info,
            expected_csv: expected,
            output: location.path,
            renamed_from: location.renamed_from,
            exit_code: exit.code,
            file_found: true,
            flow_summary,
            elapsed_ms: started.elapsed().as_millis(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn terminal_stage<T>(result: &Result<T>) -> Stage {
    match result {
        Ok(_) => Stage::Success,
        Err(_) => Stage::Failure,
    }
}

/// Success needs both a zero exit code and a located file.
pub fn judge(
    code: Option<i32>,
    location: Option<OutputLocation>,
    output_dir: &Path,
) -> Result<OutputLocation> {
    match (code, location) {
        (_, None) => Err(FlowmeterError::OutputNotFound {
            dir: output_dir.to_path_buf(),
            code,
            file_found: false,
        }),
        (Some(0), Some(location)) => Ok(location),
        (code, Some(_)) => Err(FlowmeterError::ExitCodeNonZero {
            code,
            file_found: true,
        }),
    }
}
