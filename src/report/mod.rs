pub mod copy_task;
pub mod events;
pub mod orchestrator;
pub mod week;

/// Number of day columns in a weekly report.
pub const DAYS_PER_WEEK: usize = 7;

pub use copy_task::{CopyTask, TaskContext, TaskOutcome};
pub use events::{completion_message, CallbackSink, EventSink, NullSink, ReportEvent};
pub use orchestrator::{
    ProgressState, ReportOrchestrator, ReportPlan, ReportRequest, RunState, RunSummary,
    TemplatePlan,
};
pub use week::WeekWindow;
