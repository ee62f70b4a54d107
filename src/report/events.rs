use crate::scanner::DATE_FORMAT;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;

/// Notifications emitted while a report run is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    /// Integer percentage of finished templates; never decreases within a run.
    Progress { percent: u8 },
    /// Best-effort description of what is being worked on.
    Status { text: String },
    Completed {
        message: String,
        missing: Vec<NaiveDate>,
    },
    Failed { message: String },
}

impl ReportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportEvent::Completed { .. } | ReportEvent::Failed { .. })
    }
}

/// Receiver side of the event stream.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ReportEvent);
}

impl EventSink for mpsc::UnboundedSender<ReportEvent> {
    fn emit(&self, event: ReportEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Adapts a closure into an [`EventSink`].
pub struct CallbackSink<F>(pub F);

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(ReportEvent) + Send + Sync,
{
    fn emit(&self, event: ReportEvent) {
        (self.0)(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ReportEvent) {}
}

pub fn format_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn completion_message(missing: &[NaiveDate]) -> String {
    if missing.is_empty() {
        "Report generation complete!".to_string()
    } else {
        format!(
            "Report generation complete! Missing source files for dates: {}",
            format_dates(missing)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_completion_messages() {
        assert_eq!(completion_message(&[]), "Report generation complete!");
        assert_eq!(
            completion_message(&[date(2024, 6, 3), date(2024, 6, 5)]),
            "Report generation complete! Missing source files for dates: 03.06.2024, 05.06.2024"
        );
    }

    #[test]
    fn test_callback_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = CallbackSink(|event: ReportEvent| seen.lock().unwrap().push(event));
        sink.emit(ReportEvent::Progress { percent: 50 });
        sink.emit(ReportEvent::Status {
            text: "Processing A.xlsx".to_string(),
        });
        drop(sink);

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ReportEvent::Progress { percent: 50 });
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(ReportEvent::Progress { percent: 100 });
    }

    #[test]
    fn test_event_json_shape() {
        let event = ReportEvent::Completed {
            message: "done".to_string(),
            missing: vec![date(2024, 6, 3)],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["missing"][0], "2024-06-03");
        assert!(event.is_terminal());
    }
}
