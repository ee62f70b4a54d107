use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use std::process;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use weekly_report::config::LoggingConfig;
use weekly_report::{Cli, OutputFormatter, OutputMode, ReportError, UserFriendlyError, WeeklyReport};

const DEFAULT_CONFIG_FILE: &str = "weekly-report.toml";

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if let Err(e) = init_logging(&config.logging, cli.verbosity_level(), cli.quiet) {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    let report = WeeklyReport::from_cli(&cli, config);
    let request = cli.build_request(report.config());

    if cli.dry_run {
        return match report.plan(&request) {
            Ok(_) => 0,
            Err(e) => {
                report.handle_error(&e);
                exit_code_for(&e)
            }
        };
    }

    match report.generate(request).await {
        Ok(summary) if summary.is_clean() => 0,
        // Reports were written but some days or templates are incomplete
        Ok(_) => 2,
        Err(e) => {
            report.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &ReportError) -> i32 {
    if !error.is_fatal() {
        return 1;
    }

    match error {
        ReportError::Validation { .. } => 3,
        ReportError::DirectoryNotFound { .. } => 4,
        ReportError::OutputCreate { .. } => 5,
        ReportError::Config { .. } => 6,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    match WeeklyReport::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  weekly-report --config {}", config_path);
            println!("\nEdit the [paths] section to point at your template and source folders.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn print_startup_error(error: &ReportError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

/// Filter used when `RUST_LOG` is not set.
fn default_directive(config_level: &str, verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => config_level,
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    format!("weekly_report={}", level)
}

fn init_logging(logging: &LoggingConfig, verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&logging.level, verbose, quiet)));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("weekly_report=debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(())
}
