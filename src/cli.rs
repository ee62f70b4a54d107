use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::report::ReportRequest;
use chrono::{Days, Local, NaiveDate};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "weekly-report")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregate dated daily spreadsheets into weekly reports")]
#[command(
    long_about = "weekly-report copies a fixed block of values from per-day source workbooks, \
                  found in dated folders, into one weekly copy of every template workbook."
)]
#[command(after_help = "EXAMPLES:\n  \
    weekly-report --templates ./templates --sources ./daily --output ./reports --start 03.06.2024\n  \
    weekly-report -t ./templates -s ./daily -o ./reports --dry-run\n  \
    weekly-report --config station.toml --output-format json\n  \
    weekly-report --generate-config --config weekly-report.toml")]
pub struct Cli {
    /// Directory containing template workbooks
    #[arg(short, long, env = "WEEKLY_REPORT_TEMPLATES")]
    pub templates: Option<PathBuf>,

    /// Root of the dated source directory tree
    #[arg(short, long, env = "WEEKLY_REPORT_SOURCES")]
    pub sources: Option<PathBuf>,

    /// Directory in which the weekly report folder is created
    #[arg(short, long, env = "WEEKLY_REPORT_OUTPUT")]
    pub output: Option<PathBuf>,

    /// First day of the week (dd.mm.yyyy or yyyy-mm-dd, defaults to tomorrow)
    #[arg(long, value_parser = parse_start_date)]
    pub start: Option<NaiveDate>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Number of templates processed concurrently
    #[arg(short = 'j', long, help = "Concurrent template tasks (defaults to CPU count)")]
    pub workers: Option<usize>,

    /// Label placed before the dates in the output folder name
    #[arg(long)]
    pub label: Option<String>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show which sources would be used without writing anything)
    #[arg(long, help = "Resolve sources and print the plan without writing reports")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON lines output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_template_dir(self.templates.clone())
            .with_source_root(self.sources.clone())
            .with_output_root(self.output.clone())
            .with_workers(self.workers)
            .with_folder_label(self.label.clone())
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.unwrap_or_else(default_start_date)
    }

    /// Paths not given anywhere stay empty and are rejected when the run starts.
    pub fn build_request(&self, config: &Config) -> ReportRequest {
        ReportRequest::new(
            config.paths.template_dir.clone().unwrap_or_default(),
            config.paths.source_root.clone().unwrap_or_default(),
            config.paths.output_root.clone().unwrap_or_default(),
            self.start_date(),
        )
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

pub fn default_start_date() -> NaiveDate {
    let today = Local::now().date_naive();
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

pub fn parse_start_date(s: &str) -> std::result::Result<NaiveDate, String> {
    let s = s.trim();

    NaiveDate::parse_from_str(s, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("Invalid date '{}': expected dd.mm.yyyy or yyyy-mm-dd", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_parse_start_date() {
        assert_eq!(parse_start_date("03.06.2024").unwrap(), date(2024, 6, 3));
        assert_eq!(parse_start_date("2024-06-03").unwrap(), date(2024, 6, 3));
        assert_eq!(parse_start_date(" 03.06.2024 ").unwrap(), date(2024, 6, 3));

        assert!(parse_start_date("31.02.2024").is_err());
        assert!(parse_start_date("tomorrow").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "weekly-report",
            "-t",
            "templates",
            "--sources",
            "daily",
            "-o",
            "out",
            "--start",
            "03.06.2024",
            "-j",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.templates, Some(PathBuf::from("templates")));
        assert_eq!(cli.start_date(), date(2024, 6, 3));
        assert_eq!(cli.workers, Some(2));
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_build_request_from_config() {
        let cli = Cli::try_parse_from(["weekly-report", "-t", "templates", "--start", "2024-06-03"])
            .unwrap();

        let mut config = Config::default();
        config.paths.source_root = Some(PathBuf::from("daily"));
        config.merge_with_cli_args(&cli.create_cli_overrides());

        let request = cli.build_request(&config);
        assert_eq!(request.template_dir, PathBuf::from("templates"));
        assert_eq!(request.source_root, PathBuf::from("daily"));
        assert!(request.output_root.as_os_str().is_empty());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_default_start_is_tomorrow() {
        let cli = Cli::try_parse_from(["weekly-report"]).unwrap();
        let today = Local::now().date_naive();
        assert!(cli.start_date() > today);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["weekly-report", "-q", "-v"]).is_err());
        let cli = Cli::try_parse_from(["weekly-report", "-q"]).unwrap();
        assert_eq!(cli.verbosity_level(), 0);
    }
}
