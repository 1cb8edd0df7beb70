use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Engine: headless\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Linked-viewport camera synchronization, driven by a scripted session
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Scenario JSON to play (viewports + steps). Runs the built-in demo if omitted
    #[arg(value_name = "SCENARIO")]
    pub scenario: Option<PathBuf>,

    /// Camera near-equality tolerance (overrides the settings file)
    #[arg(short = 't', long = "tolerance", value_name = "EPS")]
    pub tolerance: Option<f32>,

    /// Don't align newly linked viewports to the group
    #[arg(long = "no-catch-up")]
    pub no_catch_up: bool,

    /// Print the final state as JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,

    /// Enable debug logging to file (default: viewsync.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = Args::try_parse_from(["viewsync"]).unwrap();
        assert!(args.scenario.is_none());
        assert!(args.tolerance.is_none());
        assert!(!args.no_catch_up);
        assert!(args.log_file.is_none());
        assert_eq!(args.verbosity, 0);
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "viewsync", "session.json", "-t", "0.01", "--no-catch-up", "--json", "-vv", "--log",
        ])
        .unwrap();
        assert_eq!(args.scenario, Some(PathBuf::from("session.json")));
        assert_eq!(args.tolerance, Some(0.01));
        assert!(args.no_catch_up);
        assert!(args.json);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
    }
}
