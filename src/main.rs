use viewsync::cli::Args;
use viewsync::config::{self, LOG_FILE, SETTINGS_FILE, SyncSettings};
use viewsync::scenario::{Scenario, ScenarioRunner};

use anyhow::Context;
use clap::Parser;
use log::{debug, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());

    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // Initialize logger based on --log flag
    if let Some(log_path_opt) = &args.log_file {
        if let Err(e) = config::ensure_dirs(&path_config) {
            eprintln!("Warning: Failed to create application directories: {}", e);
        }
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(LOG_FILE, &path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }

    info!("viewsync starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());

    let mut settings = SyncSettings::load(&settings_path)?;
    if let Some(tolerance) = args.tolerance {
        settings.tolerance = tolerance;
    }
    if args.no_catch_up {
        settings.catch_up = false;
    }
    settings.validate()?;
    info!(
        "Tolerance: {}, catch-up: {}",
        settings.tolerance, settings.catch_up
    );

    let scenario = match &args.scenario {
        Some(path) => {
            info!("Scenario: {}", path.display());
            Scenario::load(path)?
        }
        None => {
            info!("No scenario provided, running built-in demo");
            Scenario::demo()
        }
    };

    let report = ScenarioRunner::new(settings)?.run(&scenario)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    info!("viewsync finished");
    Ok(())
}
