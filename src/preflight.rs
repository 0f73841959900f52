// pcap-flowmeter/src/preflight.rs
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::CaptureFile;
use crate::config::Paths;
use crate::error::{FlowmeterError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub name: &'static str,
    pub path: PathBuf,
    pub ok: bool,
}

impl fmt::Display for CheckItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.ok { "ok" } else { "MISSING" };
        write!(f, "{:<8} {:<16} {}", mark, self.name, self.path.display())
    }
}

pub struct Preflight;

impl Preflight {
    /// Fatal checks run before the extractor is launched.
    pub fn check(paths: &Paths, capture: &CaptureFile) -> Result<()> {
        if !paths.extractor.is_file() {
            return Err(FlowmeterError::ExtractorMissing(paths.extractor.clone()));
        }
        if !paths.native_lib_dir.is_dir() {
            return Err(FlowmeterError::DependencyMissing(paths.native_lib_dir.clone()));
        }
        if !capture.exists() {
            return Err(FlowmeterError::InputNotFound(capture.path.clone()));
        }
        Ok(())
    }

    /// Non-failing view of the environment for the `check` command.
    pub fn report(paths: &Paths) -> Vec<CheckItem> {
        vec![
            CheckItem {
                name: "extractor",
                path: paths.extractor.clone(),
                ok: paths.extractor.is_file(),
            },
            CheckItem {
                name: "native libs",
                path: paths.native_lib_dir.clone(),
                ok: paths.native_lib_dir.is_dir(),
            },
            CheckItem {
                name: "inbox",
                path: paths.inbox_dir.clone(),
                ok: paths.inbox_dir.is_dir(),
            },
            CheckItem {
                name: "output dir",
                path: paths.output_dir.clone(),
                ok: paths.output_dir.is_dir(),
            },
        ]
    }
}

pub fn ensure_output_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    log::info!("Creating output directory {}", path.display());
    fs::create_dir_all(path).map_err(|source| FlowmeterError::OutputDirUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(root: &Path) -> Paths {
        Paths {
            inbox_dir: root.join("creados"),
            output_dir: root.join("creados"),
            extractor: root.join("flowmeter/bin/cfm"),
            native_lib_dir: root.join("flowmeter/lib/native"),
        }
    }

    fn install(paths: &Paths) {
        fs::create_dir_all(paths.extractor.parent().unwrap()).unwrap();
        fs::write(&paths.extractor, "#!/bin/sh\n").unwrap();
        fs::create_dir_all(&paths.native_lib_dir).unwrap();
    }

    #[test]
    fn test_missing_extractor_checked_first() {
        let dir = tempfile::tempdir().unwrap();
        let paths = layout(dir.path());
        let capture = CaptureFile::new(dir.path().join("none.pcap"));

        assert!(matches!(
            Preflight::check(&paths, &capture),
            Err(FlowmeterError::ExtractorMissing(_))
        ));
    }

    #[test]
    fn test_missing_native_libs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = layout(dir.path());
        install(&paths);
        fs::remove_dir(&paths.native_lib_dir).unwrap();
        let capture = CaptureFile::new(dir.path().join("none.pcap"));

        assert!(matches!(
            Preflight::check(&paths, &capture),
            Err(FlowmeterError::DependencyMissing(_))
        ));
    }

    #[test]
    fn test_missing_capture() {
        let dir = tempfile::tempdir().unwrap();
        let paths = layout(dir.path());
        install(&paths);
        let capture = CaptureFile::new(dir.path().join("none.pcap"));

        assert!(matches!(
            Preflight::check(&paths, &capture),
            Err(FlowmeterError::InputNotFound(_))
        ));

        fs::write(&capture.path, b"").unwrap();
        assert!(Preflight::check(&paths, &capture).is_ok());
    }

    #[test]
    fn test_report_and_output_dir_creation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = layout(dir.path());
        install(&paths);

        let report = Preflight::report(&paths);
        assert_eq!(report.iter().filter(|item| !item.ok).count(), 2);

        ensure_output_dir(&paths.output_dir).unwrap();
        assert!(Preflight::report(&paths).iter().all(|item| item.ok));
    }
}
