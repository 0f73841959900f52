// pcap-flowmeter/src/locate.rs
use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::Result;
use crate::naming::is_flow_csv;

/// Filesystems with coarse mtimes can stamp a fresh file slightly before launch.
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// Pending wake-ups kept while nobody reads; the rest are dropped.
const WATCH_QUEUE: usize = 16;

#[derive(Debug, Clone, Serialize)]
pub struct OutputLocation {
    /// Where the CSV is now.
    pub path: PathBuf,
    pub expected_path: PathBuf,
    pub renamed_from: Option<PathBuf>,
    pub rename_error: Option<String>,
}

/// Find the flow CSV for this run, renaming a loose match to `expected`.
pub fn locate_output(
    output_dir: &Path,
    expected: &str,
    marker: &str,
    since: Option<SystemTime>,
) -> Result<Option<OutputLocation>> {
    let expected_path = output_dir.join(expected);
    if expected_path.is_file() {
        log::info!("Flow CSV present: {}", expected);
        return Ok(Some(OutputLocation {
            path: expected_path.clone(),
            expected_path,
            renamed_from: None,
            rename_error: None,
        }));
    }

    let Some(found) = newest_flow_csv(output_dir, marker, since)? else {
        return Ok(None);
    };

    if found.file_name().map(|n| n == expected).unwrap_or(false) {
        return Ok(Some(OutputLocation {
            path: found,
            expected_path,
            renamed_from: None,
            rename_error: None,
        }));
    }

    log::debug!("Renaming {} -> {}", found.display(), expected_path.display());
    match fs::rename(&found, &expected_path) {
        Ok(()) => {
            log::info!(
                "Flow CSV renamed: {} -> {}",
                found.file_name().unwrap_or_default().to_string_lossy(),
                expected
            );
            Ok(Some(OutputLocation {
                path: expected_path.clone(),
                expected_path,
                renamed_from: Some(found),
                rename_error: None,
            }))
        }
        Err(e) => {
            log::warn!("Could not rename {}: {}", found.display(), e);
            Ok(Some(OutputLocation {
                path: found,
                expected_path,
                renamed_from: None,
                rename_error: Some(e.to_string()),
            }))
        }
    }
}

fn newest_flow_csv(dir: &Path, marker: &str, since: Option<SystemTime>) -> Result<Option<PathBuf>> {
    let cutoff = since.map(|t| t.checked_sub(MTIME_SLACK).unwrap_or(t));
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(dir)?.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_flow_csv(name, marker) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if let Some(cutoff) = cutoff {
            if modified < cutoff {
                log::debug!("Ignoring {} from before launch", name);
                continue;
            }
        }
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Fixed wait after exit: process exit does not guarantee the file is visible.
pub async fn grace_delay(delay: Duration) {
    if !delay.is_zero() {
        log::debug!("Waiting {} ms before scanning output", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

/// Directory watch armed before the extractor starts.
pub struct OutputWatch {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
}

impl OutputWatch {
    pub fn arm(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel(WATCH_QUEUE);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if matches!(&res, Ok(event) if !is_csv_event(event)) {
                    return;
                }
                // A full queue already holds a wake-up.
                let _ = tx.try_send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        log::debug!("Watching {}", dir.display());

        Ok(OutputWatch {
            dir: dir.to_path_buf(),
            _watcher: watcher,
            events: rx,
        })
    }

    /// Scan now, then re-scan on each CSV event until `timeout` elapses.
    pub async fn wait_for_output(
        &mut self,
        expected: &str,
        marker: &str,
        since: Option<SystemTime>,
        timeout: Duration,
        settle: Duration,
    ) -> Result<Option<OutputLocation>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(found) = locate_output(&self.dir, expected, marker, since)? {
                return Ok(Some(found));
            }

            loop {
                match tokio::time::timeout_at(deadline, self.events.recv()).await {
                    Ok(Some(Ok(_))) => break,
                    Ok(Some(Err(e))) => log::warn!("Watch error: {}", e),
                    Ok(None) | Err(_) => {
                        log::debug!("No flow CSV event within {:?}", timeout);
                        return Ok(None);
                    }
                }
            }

            tokio::time::sleep(settle).await;
        }
    }
}

fn is_csv_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
}
