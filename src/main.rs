// pcap-flowmeter/src/main.rs
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pcap_flowmeter::config::{absolutize, CompletionStrategy, Config};
use pcap_flowmeter::preflight::Preflight;
use pcap_flowmeter::{latest_capture, FlowmeterError, Orchestrator};
use std::path::{Path, PathBuf};

fn cli() -> Command {
    Command::new("pcap-flowmeter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert a pcap capture into a CICFlowMeter flow CSV")
        .arg(Arg::new("pcap")
            .help("Capture to process (default: newest .pcap in the inbox)")
            .value_parser(value_parser!(PathBuf))
            .index(1))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("YAML configuration file")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("inbox")
            .long("inbox")
            .value_name("DIR")
            .help("Directory scanned for captures")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("output-dir")
            .long("output-dir")
            .value_name("DIR")
            .help("Directory the flow CSV is written to (default: inbox)")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("extractor")
            .long("extractor")
            .value_name("PATH")
            .help("CICFlowMeter launcher script")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("native-lib")
            .long("native-lib")
            .value_name("DIR")
            .help("Native library directory passed to the extractor")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("grace-ms")
            .long("grace-ms")
            .value_name("MS")
            .help("Wait after extractor exit before scanning")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new("watch")
            .long("watch")
            .help("Wait for output directory events instead of a fixed delay")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("timeout")
            .long("timeout")
            .value_name("SECS")
            .help("Upper bound on waiting for output in watch mode")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new("json")
            .long("json")
            .help("Print the run report as JSON")
            .action(ArgAction::SetTrue))
        .subcommand(Command::new("check")
            .about("Verify the extractor installation"))
        .subcommand(Command::new("latest")
            .about("Show the capture that would be processed"))
}

/// Config file plus the directory its relative paths resolve against.
fn load_config(matches: &ArgMatches, cwd: &Path) -> Result<(Config, PathBuf), FlowmeterError> {
    let path = matches
        .get_one::<PathBuf>("config")
        .map(|p| absolutize(cwd, p))
        .or_else(|| Config::discover(cwd));

    let (mut config, base) = match path {
        Some(path) => {
            let config = Config::load(&path)?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
            (config, base)
        }
        None => (Config::default(), cwd.to_path_buf()),
    };

    // Command-line paths are relative to the cwd, not the config file.
    if let Some(dir) = matches.get_one::<PathBuf>("inbox") {
        config.paths.inbox_dir = absolutize(cwd, dir);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("output-dir") {
        config.paths.output_dir = Some(absolutize(cwd, dir));
    }
    if let Some(path) = matches.get_one::<PathBuf>("extractor") {
        config.paths.extractor = absolutize(cwd, path);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("native-lib") {
        config.paths.native_lib_dir = absolutize(cwd, dir);
    }
    if let Some(ms) = matches.get_one::<u64>("grace-ms") {
        config.completion.grace_delay_ms = *ms;
    }
    if matches.get_flag("watch") {
        config.completion.strategy = CompletionStrategy::Watch;
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config.completion.watch_timeout_secs = *secs;
    }

    Ok((config, base))
}

async fn run(matches: ArgMatches) -> Result<bool, FlowmeterError> {
    let cwd = std::env::current_dir()?;
    let (config, base) = load_config(&matches, &cwd)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    log::debug!("Paths resolve against {}", base.display());

    let orchestrator = Orchestrator::new(config, &base, &cwd);

    match matches.subcommand() {
        Some(("check", _)) => {
            let items = Preflight::report(orchestrator.paths());
            for item in &items {
                println!("{}", item);
            }
            // The output directory is created on demand.
            Ok(items.iter().all(|i| i.ok || i.name == "output dir"))
        }
        Some(("latest", _)) => {
            let capture = latest_capture(&orchestrator.paths().inbox_dir)?;
            println!("{}", capture.path.display());
            Ok(true)
        }
        _ => {
            let pcap = matches.get_one::<PathBuf>("pcap");
            let report = orchestrator.run(pcap.map(PathBuf::as_path)).await?;

            if matches.get_flag("json") {
                println!("{}", report.to_json().map_err(std::io::Error::from)?);
            } else {
                println!("{}", report);
            }
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    std::process::exit(exit_code(run(matches).await));
}

/// The single place a fatal error reaches stderr.
fn exit_code(result: Result<bool, FlowmeterError>) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_overrides_resolve_against_cwd() {
        let matches = cli()
            .try_get_matches_from([
                "pcap-flowmeter",
                "--config",
                "/nonexistent/pcap-flowmeter.yaml",
            ])
            .unwrap();
        assert!(matches!(
            load_config(&matches, Path::new("/work")),
            Err(FlowmeterError::Config(_))
        ));

        let matches = cli()
            .try_get_matches_from([
                "pcap-flowmeter",
                "--inbox",
                "caps",
                "--grace-ms",
                "0",
                "--watch",
                "run.pcap",
            ])
            .unwrap();
        let (config, _) = load_config(&matches, Path::new("/work")).unwrap();
        assert_eq!(config.paths.inbox_dir, PathBuf::from("/work/caps"));
        assert_eq!(config.completion.grace_delay_ms, 0);
        assert_eq!(config.completion.strategy, CompletionStrategy::Watch);
        assert_eq!(
            matches.get_one::<PathBuf>("pcap"),
            Some(&PathBuf::from("run.pcap"))
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(Ok(true)), 0);
        assert_eq!(exit_code(Ok(false)), 1);
        assert_eq!(
            exit_code(Err(FlowmeterError::NoInputFound(PathBuf::from("/srv/creados")))),
            1
        );
    }

    #[test]
    fn test_subcommands_parse() {
        let matches = cli().try_get_matches_from(["pcap-flowmeter", "check"]).unwrap();
        assert_eq!(matches.subcommand_name(), Some("check"));
        assert!(matches.get_one::<PathBuf>("pcap").is_none());
    }
}
