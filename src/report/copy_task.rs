use crate::error::ReportError;
use crate::report::events::{EventSink, ReportEvent};
use crate::report::week::WeekWindow;
use crate::scanner::{SourceResolver, TemplateDescriptor, DATE_FORMAT};
use crate::workbook::{CellRangeCopier, ReportWorkbook};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Read-only state shared by every template task of one run.
pub struct TaskContext {
    pub resolver: SourceResolver,
    pub copier: CellRangeCopier,
    pub window: WeekWindow,
    pub output_folder: PathBuf,
    pub sink: Arc<dyn EventSink>,
}

/// What one template task reports back to the orchestrator.
#[derive(Debug)]
pub struct TaskOutcome {
    pub template: String,
    pub missing: Vec<NaiveDate>,
    pub output: Option<PathBuf>,
    pub error: Option<ReportError>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Builds the weekly report for a single template.
///
/// The task owns its destination workbook for its whole lifetime, so the seven
/// day copies need no synchronisation. Every failure is converted into the
/// returned outcome instead of being propagated.
pub struct CopyTask {
    template: TemplateDescriptor,
}

impl CopyTask {
    pub fn new(template: TemplateDescriptor) -> Self {
        Self { template }
    }

    pub fn run(self, ctx: &TaskContext) -> TaskOutcome {
        let name = self.template.filename.clone();
        let span = info_span!("template", name = %name);
        let _guard = span.enter();

        ctx.sink.emit(ReportEvent::Status {
            text: format!("Processing {}", name),
        });
        debug!(path = %self.template.path.display(), "processing template");

        let mut report = match ReportWorkbook::open(&self.template.path) {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "cannot open template");
                return TaskOutcome {
                    template: name,
                    missing: Vec::new(),
                    output: None,
                    error: Some(e),
                };
            }
        };

        let mut missing = Vec::new();
        for (day_index, date) in ctx.window.days() {
            let day = date.format(DATE_FORMAT).to_string();

            let Some(source) = ctx.resolver.find_source(&name, date) else {
                warn!(date = %day, "source file not found");
                missing.push(date);
                continue;
            };

            if let Err(e) = ctx.copier.copy_day(&source, &mut report, day_index) {
                // An unreadable source counts the same as an absent one
                warn!(date = %day, source = %source.display(), error = %e, "source file skipped");
                missing.push(date);
            }
        }

        let output = ctx.output_folder.join(&name);
        if let Err(e) = report.save(&output) {
            error!(path = %output.display(), error = %e, "cannot save report");
            return TaskOutcome {
                template: name,
                missing,
                output: None,
                error: Some(e),
            };
        }

        info!(path = %output.display(), missing = missing.len(), "saved report");
        TaskOutcome {
            template: name,
            missing,
            output: Some(output),
            error: None,
        }
    }
}
