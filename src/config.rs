// pcap-flowmeter/src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FlowmeterError, Result};

/// File name looked up when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pcap-flowmeter.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub extractor: ExtractorSettings,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where things live. Relative entries resolve against the base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub inbox_dir: PathBuf,
    /// Defaults to the inbox when unset.
    pub output_dir: Option<PathBuf>,
    pub extractor: PathBuf,
    pub native_lib_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let launcher = if cfg!(windows) { "cfm.bat" } else { "cfm" };
        PathsConfig {
            inbox_dir: PathBuf::from("creados"),
            output_dir: None,
            extractor: Path::new("flowmeter").join("bin").join(launcher),
            native_lib_dir: Path::new("flowmeter").join("lib").join("native"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Program the extractor is run through, e.g. `sh` or `cmd`.
    pub launcher: Option<String>,
    pub launcher_args: Vec<String>,
    pub library_env_var: String,
    /// `{lib}` is replaced by the native library directory.
    pub library_env_value: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        ExtractorSettings {
            launcher: None,
            launcher_args: Vec::new(),
            library_env_var: "JAVA_OPTS".to_string(),
            library_env_value: "-Djava.library.path={lib}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStrategy {
    /// Fixed sleep after exit, then a single scan.
    Grace,
    /// Watch the output directory for CSV events until a timeout.
    Watch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub strategy: CompletionStrategy,
    pub grace_delay_ms: u64,
    pub watch_timeout_secs: u64,
    pub settle_ms: u64,
    pub marker: String,
    pub scope_to_launch: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            strategy: CompletionStrategy::Grace,
            grace_delay_ms: 3000,
            watch_timeout_secs: 30,
            settle_ms: 250,
            marker: "Flow".to_string(),
            scope_to_launch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Absolute paths derived from [`PathsConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub inbox_dir: PathBuf,
    pub output_dir: PathBuf,
    pub extractor: PathBuf,
    pub native_lib_dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| FlowmeterError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
            .map_err(|e| FlowmeterError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Find a config file next to the executable, then in `cwd`.
    pub fn discover(cwd: &Path) -> Option<PathBuf> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        exe_dir
            .into_iter()
            .chain(std::iter::once(cwd.to_path_buf()))
            .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    pub fn resolve_paths(&self, base: &Path) -> Paths {
        let inbox_dir = absolutize(base, &self.paths.inbox_dir);
        let output_dir = self
            .paths
            .output_dir
            .as_ref()
            .map(|p| absolutize(base, p))
            .unwrap_or_else(|| inbox_dir.clone());

        Paths {
            inbox_dir,
            output_dir,
            extractor: absolutize(base, &self.paths.extractor),
            native_lib_dir: absolutize(base, &self.paths.native_lib_dir),
        }
    }
}

pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
