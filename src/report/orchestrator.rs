use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::report::copy_task::{CopyTask, TaskContext, TaskOutcome};
use crate::report::events::{completion_message, EventSink, ReportEvent};
use crate::report::week::WeekWindow;
use crate::scanner::{SourceMatch, SourceResolver, TemplateEnumerator};
use crate::workbook::CellRangeCopier;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Inputs of one report run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub template_dir: PathBuf,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub start: NaiveDate,
}

impl ReportRequest {
    pub fn new<T, S, O>(template_dir: T, source_root: S, output_root: O, start: NaiveDate) -> Self
    where
        T: Into<PathBuf>,
        S: Into<PathBuf>,
        O: Into<PathBuf>,
    {
        Self {
            template_dir: template_dir.into(),
            source_root: source_root.into(),
            output_root: output_root.into(),
            start,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("template directory", &self.template_dir),
            ("source directory", &self.source_root),
            ("output directory", &self.output_root),
        ]
        .into_iter()
        .filter(|(_, path)| path.as_os_str().is_empty())
        .map(|(label, _)| label)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::Validation {
                message: format!("please specify the {}", missing.join(", ")),
            })
        }
    }
}

/// Completed-count bookkeeping, owned by the aggregation loop.
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
    pub status: String,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            status: String::new(),
        }
    }

    pub fn finish_one<S: Into<String>>(&mut self, status: S) {
        self.completed = (self.completed + 1).min(self.total);
        self.status = status.into();
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.completed * 100 / self.total) as u8
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub window: WeekWindow,
    pub output_folder: PathBuf,
    pub templates_total: usize,
    pub reports_written: usize,
    pub failed_templates: usize,
    pub missing: Vec<NaiveDate>,
    pub message: String,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.failed_templates == 0
    }
}

/// Source lookups for one template, produced without touching any files.
#[derive(Debug, Clone)]
pub struct TemplatePlan {
    pub template: String,
    pub sources: Vec<SourceMatch>,
}

#[derive(Debug, Clone)]
pub struct ReportPlan {
    pub window: WeekWindow,
    pub output_folder: PathBuf,
    pub templates: Vec<TemplatePlan>,
}

/// Drives a full run: validation, output folder, one task per template,
/// aggregation of missing dates and the final message.
pub struct ReportOrchestrator {
    config: Config,
    sink: Arc<dyn EventSink>,
    state: Mutex<RunState>,
}

impl ReportOrchestrator {
    pub fn new(config: Config, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(RunState::Failed)
    }

    fn set_state(&self, next: RunState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    pub fn output_folder(&self, output_root: &Path, window: &WeekWindow) -> PathBuf {
        output_root.join(window.folder_name(&self.config.output.folder_label))
    }

    pub async fn run(&self, request: ReportRequest) -> Result<RunSummary> {
        self.set_state(RunState::Running);

        match self.execute(request).await {
            Ok(summary) => {
                info!(
                    written = summary.reports_written,
                    failed = summary.failed_templates,
                    missing = summary.missing.len(),
                    "report generation finished"
                );
                self.set_state(RunState::Completed);
                self.sink.emit(ReportEvent::Completed {
                    message: summary.message.clone(),
                    missing: summary.missing.clone(),
                });
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "report generation failed");
                self.set_state(RunState::Failed);
                self.sink.emit(ReportEvent::Failed {
                    message: format!("Error: {}", e),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, request: ReportRequest) -> Result<RunSummary> {
        let started = Instant::now();
        request.validate()?;
        self.config.validate()?;

        let window = WeekWindow::new(request.start);
        let output_folder = self.output_folder(&request.output_root, &window);
        fs::create_dir_all(&output_folder).map_err(|e| ReportError::OutputCreate {
            path: output_folder.display().to_string(),
            message: e.to_string(),
        })?;
        info!(folder = %output_folder.display(), "created report folder");

        let templates =
            TemplateEnumerator::new(&self.config.templates).enumerate(&request.template_dir)?;
        let total = templates.len();
        let mut progress = ProgressState::new(total);

        if templates.is_empty() {
            warn!(dir = %request.template_dir.display(), "no templates found");
            self.sink.emit(ReportEvent::Progress { percent: 100 });
        } else {
            self.sink.emit(ReportEvent::Progress { percent: 0 });
        }

        let ctx = Arc::new(TaskContext {
            resolver: SourceResolver::new(&request.source_root, &self.config.sources),
            copier: CellRangeCopier::new(self.config.layout),
            window,
            output_folder: output_folder.clone(),
            sink: Arc::clone(&self.sink),
        });
        let semaphore = Arc::new(Semaphore::new(self.config.runtime.worker_count()));

        let mut tasks = JoinSet::new();
        for template in templates {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let name = template.filename.clone();
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = task::spawn_blocking(move || CopyTask::new(template).run(&ctx)).await;
                (name, outcome)
            });
        }

        let mut missing = BTreeSet::new();
        let mut reports_written = 0;
        let mut failed_templates = 0;

        while let Some(joined) = tasks.join_next().await {
            let status = match joined {
                Ok((_, Ok(outcome))) => self.merge_outcome(
                    outcome,
                    &mut missing,
                    &mut reports_written,
                    &mut failed_templates,
                ),
                Ok((name, Err(e))) => {
                    let err = ReportError::TaskFailed {
                        message: e.to_string(),
                    };
                    error!(template = %name, error = %err, "template task aborted");
                    failed_templates += 1;
                    format!("Failed {}", name)
                }
                Err(e) => {
                    error!(error = %e, "template task aborted");
                    failed_templates += 1;
                    "Template task aborted".to_string()
                }
            };

            progress.finish_one(status);
            self.sink.emit(ReportEvent::Progress {
                percent: progress.percent(),
            });
            self.sink.emit(ReportEvent::Status {
                text: progress.status.clone(),
            });
        }

        let missing: Vec<NaiveDate> = missing.into_iter().collect();
        Ok(RunSummary {
            window,
            output_folder,
            templates_total: total,
            reports_written,
            failed_templates,
            message: completion_message(&missing),
            missing,
            elapsed: started.elapsed(),
        })
    }

    fn merge_outcome(
        &self,
        outcome: TaskOutcome,
        missing: &mut BTreeSet<NaiveDate>,
        reports_written: &mut usize,
        failed_templates: &mut usize,
    ) -> String {
        missing.extend(outcome.missing.iter().copied());

        if outcome.succeeded() {
            *reports_written += 1;
            format!("Finished {}", outcome.template)
        } else {
            *failed_templates += 1;
            format!("Failed {}", outcome.template)
        }
    }

    /// Resolves every (template, day) source without creating or writing files.
    pub fn plan(&self, request: &ReportRequest) -> Result<ReportPlan> {
        request.validate()?;

        let window = WeekWindow::new(request.start);
        let templates =
            TemplateEnumerator::new(&self.config.templates).enumerate(&request.template_dir)?;
        let resolver = SourceResolver::new(&request.source_root, &self.config.sources);

        let templates = templates
            .iter()
            .map(|template| TemplatePlan {
                template: template.filename.clone(),
                sources: window
                    .days()
                    .map(|(_, date)| resolver.resolve(&template.filename, date))
                    .collect(),
            })
            .collect();

        Ok(ReportPlan {
            window,
            output_folder: self.output_folder(&request.output_root, &window),
            templates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::events::{CallbackSink, NullSink};
    use crate::workbook::fixtures::write_workbook;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_request_validation_names_missing_paths() {
        let request = ReportRequest::new("", "src", "", date(2024, 6, 3));
        let err = request.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("template directory"));
        assert!(text.contains("output directory"));
        assert!(!text.contains("source directory"));
    }

    #[test]
    fn test_progress_state_percent() {
        let mut progress = ProgressState::new(3);
        assert_eq!(progress.percent(), 0);
        progress.finish_one("a");
        assert_eq!(progress.percent(), 33);
        progress.finish_one("b");
        progress.finish_one("c");
        assert_eq!(progress.percent(), 100);
        progress.finish_one("extra");
        assert_eq!(progress.percent(), 100);
        assert_eq!(ProgressState::new(0).percent(), 100);
    }

    #[tokio::test]
    async fn test_validation_failure_does_no_work() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(tx));
        assert_eq!(orchestrator.state(), RunState::Idle);

        let request = ReportRequest::new(temp_dir.path(), "", temp_dir.path(), date(2024, 6, 3));
        let result = orchestrator.run(request).await;

        assert!(matches!(result, Err(ReportError::Validation { .. })));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ReportEvent::Failed { ref message } if message.starts_with("Error:")));
    }

    #[tokio::test]
    async fn test_missing_template_directory_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(NullSink));

        let request = ReportRequest::new(
            temp_dir.path().join("no-templates"),
            temp_dir.path(),
            temp_dir.path().join("out"),
            date(2024, 6, 3),
        );
        let result = orchestrator.run(request).await;

        assert!(matches!(result, Err(ReportError::DirectoryNotFound { .. })));
        assert_eq!(orchestrator.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_output_folder_creation_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(NullSink));
        let request = ReportRequest::new(temp_dir.path(), temp_dir.path(), &blocker, date(2024, 6, 3));
        let result = orchestrator.run(request).await;

        assert!(matches!(result, Err(ReportError::OutputCreate { .. })));
    }

    #[tokio::test]
    async fn test_empty_template_directory_completes() {
        let temp_dir = TempDir::new().unwrap();
        let templates = temp_dir.path().join("templates");
        std::fs::create_dir(&templates).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(tx));
        let request = ReportRequest::new(
            &templates,
            temp_dir.path(),
            temp_dir.path().join("out"),
            date(2024, 6, 3),
        );
        let summary = orchestrator.run(request).await.unwrap();
        drop(orchestrator);

        assert_eq!(summary.templates_total, 0);
        assert!(summary.output_folder.is_dir());
        assert_eq!(summary.message, "Report generation complete!");

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events[0], ReportEvent::Progress { percent: 100 });
        assert!(events.last().unwrap().is_terminal());
    }

    #[test]
    fn test_output_folder_name() {
        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(NullSink));
        let window = WeekWindow::new(date(2024, 6, 3));
        assert_eq!(
            orchestrator.output_folder(Path::new("/reports"), &window),
            PathBuf::from("/reports/Weekly report 03.06.2024-09.06.2024")
        );
    }

    #[tokio::test]
    async fn test_invalid_layout_is_rejected_before_any_work() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.layout.destination_row_offset = u32::MAX;

        let orchestrator = ReportOrchestrator::new(config, Arc::new(NullSink));
        let request = ReportRequest::new(
            temp_dir.path(),
            temp_dir.path(),
            temp_dir.path().join("out"),
            date(2024, 6, 3),
        );
        let result = orchestrator.run(request).await;

        assert!(matches!(result, Err(ReportError::Config { .. })));
        assert!(!temp_dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_panicking_task_is_counted_as_failed() {
        let temp_dir = TempDir::new().unwrap();
        let templates = temp_dir.path().join("templates");
        std::fs::create_dir(&templates).unwrap();
        for name in ["A.xlsx", "B.xlsx", "C.xlsx"] {
            write_workbook(&templates.join(name), &[]);
        }

        // The sink is called from inside each template task, so a panic
        // there unwinds the task for B.xlsx only.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = CallbackSink(move |event: ReportEvent| {
            if matches!(&event, ReportEvent::Status { text } if text == "Processing B.xlsx") {
                panic!("sink rejected B.xlsx");
            }
            let _ = tx.send(event);
        });

        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(sink));
        let request = ReportRequest::new(
            &templates,
            temp_dir.path().join("daily"),
            temp_dir.path().join("out"),
            date(2024, 6, 3),
        );
        let summary = orchestrator.run(request).await.unwrap();
        drop(orchestrator);

        assert_eq!(summary.templates_total, 3);
        assert_eq!(summary.reports_written, 2);
        assert_eq!(summary.failed_templates, 1);
        assert_eq!(summary.missing.len(), 7);
        assert!(!summary.output_folder.join("B.xlsx").exists());

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Progress { percent } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0, 33, 66, 100]);
        assert!(events.contains(&ReportEvent::Status {
            text: "Failed B.xlsx".to_string()
        }));
        assert!(matches!(events.last(), Some(ReportEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_status_follows_each_finished_template() {
        let temp_dir = TempDir::new().unwrap();
        let templates = temp_dir.path().join("templates");
        std::fs::create_dir(&templates).unwrap();
        write_workbook(&templates.join("A.xlsx"), &[]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = ReportOrchestrator::new(Config::default(), Arc::new(tx));
        let request = ReportRequest::new(
            &templates,
            temp_dir.path(),
            temp_dir.path().join("out"),
            date(2024, 6, 3),
        );
        orchestrator.run(request).await.unwrap();
        drop(orchestrator);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let finished = events
            .iter()
            .position(|event| *event == ReportEvent::Status { text: "Finished A.xlsx".to_string() })
            .unwrap();
        assert_eq!(events[finished - 1], ReportEvent::Progress { percent: 100 });
    }
}
