pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod scanner;
pub mod ui;
pub mod workbook;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, LayoutConfig, OutputConfig, SourceConfig, TemplateConfig};
pub use error::{ReportError, Result, UserFriendlyError};

// Core functionality re-exports
pub use report::{
    EventSink, ReportEvent, ReportOrchestrator, ReportPlan, ReportRequest, RunState, RunSummary,
    WeekWindow,
};
pub use scanner::{SourceMatch, SourceResolver, TemplateDescriptor, TemplateEnumerator};
pub use ui::{OutputFormatter, OutputMode, ProgressManager};
pub use workbook::{CellRangeCopier, CellValue, ReportWorkbook, SourceSheet};

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Main library interface: runs report generation and renders its events.
pub struct WeeklyReport {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl WeeklyReport {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        // JSON mode streams events instead of drawing a bar
        let progress_manager = ProgressManager::new(!quiet && output_mode != OutputMode::Json);

        Self {
            config,
            output_formatter,
            progress_manager,
        }
    }

    /// Create an instance from already-parsed CLI arguments and merged config.
    pub fn from_cli(cli_args: &Cli, config: Config) -> Self {
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(
            config,
            output_mode,
            cli_args.verbosity_level(),
            cli_args.quiet,
        )
    }

    /// Generate the weekly reports, showing progress while templates finish.
    pub async fn generate(&self, request: ReportRequest) -> Result<RunSummary> {
        self.output_formatter.start_operation(&format!(
            "Generating weekly report from {}",
            request.start.format(scanner::DATE_FORMAT)
        ));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = ReportOrchestrator::new(self.config.clone(), Arc::new(tx));
        let progress_bar = self.progress_manager.create_report_progress();

        let run = async move {
            let result = orchestrator.run(request).await;
            // Dropping the orchestrator closes the channel and ends the event loop
            drop(orchestrator);
            result
        };

        let render = async {
            while let Some(event) = rx.recv().await {
                ui::progress::apply_report_event(&progress_bar, &event);
                self.output_formatter.print_event(&event);
            }
        };

        let (result, ()) = tokio::join!(run, render);

        let summary = result?;
        self.output_formatter.print_run_summary(&summary);
        Ok(summary)
    }

    /// Resolve sources for every template without writing anything.
    pub fn plan(&self, request: &ReportRequest) -> Result<ReportPlan> {
        let orchestrator = ReportOrchestrator::new(self.config.clone(), Arc::new(report::NullSink));
        self.output_formatter
            .info("Dry run: reports are listed, nothing is written");
        let spinner = self.progress_manager.create_spinner("Resolving source files");
        let plan = orchestrator.plan(request);
        spinner.finish_and_clear();

        let plan = plan?;
        self.output_formatter.print_plan(&plan);
        Ok(plan)
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        Config::default().save_to_file(output_path)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &ReportError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Convenience function to generate reports with default settings and no terminal output.
pub async fn generate_weekly_report(request: ReportRequest) -> Result<RunSummary> {
    ReportOrchestrator::new(Config::default(), Arc::new(report::NullSink))
        .run(request)
        .await
}
