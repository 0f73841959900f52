// pcap-flowmeter/src/extractor.rs
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::config::{ExtractorSettings, Paths};
use crate::error::{FlowmeterError, Result};

/// How the extractor child finished.
#[derive(Debug, Clone)]
pub struct ExtractorExit {
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub launched_at: SystemTime,
    pub elapsed: Duration,
}

impl ExtractorExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// One CICFlowMeter invocation per capture.
pub struct Extractor {
    program: PathBuf,
    settings: ExtractorSettings,
    native_lib_dir: PathBuf,
}

impl Extractor {
    pub fn new(settings: &ExtractorSettings, paths: &Paths) -> Self {
        Extractor {
            program: paths.extractor.clone(),
            settings: settings.clone(),
            native_lib_dir: paths.native_lib_dir.clone(),
        }
    }

    pub fn library_env(&self) -> (String, String) {
        let lib = self.native_lib_dir.to_string_lossy();
        (
            self.settings.library_env_var.clone(),
            self.settings.library_env_value.replace("{lib}", &lib),
        )
    }

    /// Child command: `[launcher args..] extractor <capture> <output_dir>`.
    pub fn command(&self, capture: &Path, output_dir: &Path) -> Command {
        let mut cmd = match &self.settings.launcher {
            Some(launcher) => {
                let mut cmd = Command::new(launcher);
                cmd.args(&self.settings.launcher_args).arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };

        let (key, value) = self.library_env();
        cmd.env(key, value)
            .arg(capture)
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    /// Launch, forward stderr line by line, wait for exit.
    pub async fn run(&self, capture: &Path, output_dir: &Path) -> Result<ExtractorExit> {
        let launched_at = SystemTime::now();
        let started = Instant::now();

        log::info!(
            "Running {} on {} -> {}",
            self.program.display(),
            capture.display(),
            output_dir.display()
        );

        let mut child = self
            .command(capture, output_dir)
            .spawn()
            .map_err(|source| FlowmeterError::ExtractorInvocationFailure {
                path: self.program.clone(),
                source,
            })?;

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stderr(stderr)));

        let status = child.wait().await?;

        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let elapsed = started.elapsed();
        log::info!(
            "Extractor exited with {:?} after {:.1}s",
            status.code(),
            elapsed.as_secs_f64()
        );

        Ok(ExtractorExit {
            code: status.code(),
            launched_at,
            elapsed,
        })
    }
}

/// Copy the child's stderr to ours. Undecodable bytes are replaced; reading
/// stops only at EOF or an I/O error.
async fn forward_stderr<R: AsyncRead + Unpin>(stderr: R) -> usize {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut forwarded = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                eprintln!("extractor: {}", line.trim_end_matches(['\r', '\n']));
                forwarded += 1;
            }
            Err(e) => {
                log::warn!("Extractor stderr closed: {}", e);
                break;
            }
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    fn paths(root: &Path) -> Paths {
        Config::default().resolve_paths(root)
    }

    #[test]
    fn test_library_env_substitutes_dir() {
        let paths = paths(Path::new("/opt/backend"));
        let extractor = Extractor::new(&ExtractorSettings::default(), &paths);

        let (key, value) = extractor.library_env();
        assert_eq!(key, "JAVA_OPTS");
        assert_eq!(value, "-Djava.library.path=/opt/backend/flowmeter/lib/native");
    }

    #[test]
    fn test_command_shape_with_launcher() {
        let paths = paths(Path::new("/opt/backend"));
        let settings = ExtractorSettings {
            launcher: Some("sh".to_string()),
            launcher_args: vec!["-e".to_string()],
            ..Default::default()
        };
        let cmd = Extractor::new(&settings, &paths).command(
            Path::new("/data/in.pcap"),
            Path::new("/data/out"),
        );

        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "sh");
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], "-e");
        assert_eq!(PathBuf::from(&args[1]), paths.extractor);
        assert_eq!(args[2], "/data/in.pcap");
        assert_eq!(args[3], "/data/out");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_invocation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(dir.path());
        let extractor = Extractor::new(&ExtractorSettings::default(), &paths);

        let result = extractor.run(&dir.path().join("in.pcap"), dir.path()).await;
        assert!(matches!(
            result,
            Err(FlowmeterError::ExtractorInvocationFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_forward_stderr_survives_invalid_utf8() {
        let input: &[u8] = b"Error en la captura \xe9\nsegunda linea\r\nsin salto";
        assert_eq!(forward_stderr(input).await, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_latin1_stderr_does_not_break_child() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(dir.path());
        fs::create_dir_all(paths.extractor.parent().unwrap()).unwrap();
        fs::write(
            &paths.extractor,
            "printf 'Error en la captura \\351\\n' >&2\nsleep 0.3\necho 'segunda linea' >&2\nprintf 'Flow ID,Label\\na,b\\n' > \"$2/cap_Flow.csv\"\nexit 0\n",
        )
        .unwrap();

        let settings = ExtractorSettings {
            launcher: Some("sh".to_string()),
            ..Default::default()
        };
        let exit = Extractor::new(&settings, &paths)
            .run(&dir.path().join("cap.pcap"), dir.path())
            .await
            .unwrap();

        assert_eq!(exit.code, Some(0));
        assert!(dir.path().join("cap_Flow.csv").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_and_args_reach_child() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(dir.path());
        fs::create_dir_all(paths.extractor.parent().unwrap()).unwrap();
        fs::write(
            &paths.extractor,
            "echo \"$JAVA_OPTS\" > \"$2/env.txt\"\necho \"$1\" > \"$2/arg.txt\"\necho oops >&2\nexit 3\n",
        )
        .unwrap();

        let settings = ExtractorSettings {
            launcher: Some("sh".to_string()),
            ..Default::default()
        };
        let capture = dir.path().join("in.pcap");
        let exit = Extractor::new(&settings, &paths)
            .run(&capture, dir.path())
            .await
            .unwrap();

        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        let env = fs::read_to_string(dir.path().join("env.txt")).unwrap();
        assert!(env.trim().ends_with("flowmeter/lib/native"));
        let arg = fs::read_to_string(dir.path().join("arg.txt")).unwrap();
        assert_eq!(arg.trim(), capture.to_string_lossy());
    }
}
