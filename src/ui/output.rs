use crate::error::{ReportError, UserFriendlyError};
use crate::report::{ReportEvent, ReportPlan, RunSummary};
use crate::scanner::DATE_FORMAT;
use crate::ui::progress::format_duration;
use console::{style, Emoji, Term};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static CALENDAR: Emoji = Emoji("📅 ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &ReportError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// JSON mode streams every run event as one line; other modes render a bar instead.
    pub fn print_event(&self, event: &ReportEvent) {
        if self.mode == OutputMode::Json {
            self.print_json_object(&serde_json::to_value(event).unwrap_or_default());
        }
    }

    pub fn print_run_summary(&self, summary: &RunSummary) {
        match self.mode {
            OutputMode::Human => self.print_human_summary(summary),
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "summary",
                    "output_folder": summary.output_folder.display().to_string(),
                    "start": summary.window.start(),
                    "end": summary.window.end(),
                    "templates": summary.templates_total,
                    "reports_written": summary.reports_written,
                    "failed_templates": summary.failed_templates,
                    "missing": summary.missing,
                    "duration_ms": summary.elapsed.as_millis(),
                    "message": summary.message,
                }));
            }
            OutputMode::Plain => {
                println!("COMPLETED: {}", summary.message);
                println!("Output folder: {}", summary.output_folder.display());
                println!(
                    "Reports written: {}/{}",
                    summary.reports_written, summary.templates_total
                );
                if summary.failed_templates > 0 {
                    println!("Failed templates: {}", summary.failed_templates);
                }
                println!("Duration: {}", format_duration(summary.elapsed));
            }
        }
    }

    pub fn print_plan(&self, plan: &ReportPlan) {
        if self.mode == OutputMode::Json {
            let templates: Vec<_> = plan
                .templates
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "template": t.template,
                        "sources": t.sources.iter().map(|s| serde_json::json!({
                            "date": s.date,
                            "path": s.path.as_ref().map(|p| p.display().to_string()),
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            self.print_json_object(&serde_json::json!({
                "type": "plan",
                "output_folder": plan.output_folder.display().to_string(),
                "templates": templates,
            }));
            return;
        }

        self.print_header(&format!(
            "Week {} - {}",
            plan.window.start().format(DATE_FORMAT),
            plan.window.end().format(DATE_FORMAT)
        ));
        println!("Output folder: {}", plan.output_folder.display());
        println!("Templates: {}", plan.templates.len());

        for template in &plan.templates {
            println!();
            println!("{}", template.template);
            for source in &template.sources {
                let day = source.date.format(DATE_FORMAT);
                match &source.path {
                    Some(path) => println!("  {}  {}", day, path.display()),
                    None if self.use_colors => {
                        println!("  {}  {}", day, style("missing").yellow())
                    }
                    None => println!("  {}  missing", day),
                }
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{}{}", CALENDAR, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_summary(&self, summary: &RunSummary) {
        self.print_separator();

        if summary.missing.is_empty() {
            self.success(&summary.message);
        } else {
            self.warning(&summary.message);
        }

        if self.quiet {
            return;
        }

        let highlight = |value: String| {
            if self.use_colors {
                style(value).cyan().bold().to_string()
            } else {
                value
            }
        };

        println!(
            "  Output folder:   {}",
            highlight(summary.output_folder.display().to_string())
        );
        println!(
            "  Reports written: {}",
            highlight(format!(
                "{}/{}",
                summary.reports_written, summary.templates_total
            ))
        );
        if summary.failed_templates > 0 {
            println!(
                "  Failed:          {}",
                highlight(summary.failed_templates.to_string())
            );
        }
        println!(
            "  Time taken:      {}",
            highlight(format_duration(summary.elapsed))
        );

        self.print_separator();
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        if self.use_colors {
            let (emoji, styled) = match msg_type {
                MessageType::Success => (&CHECKMARK, style(message).green().bold()),
                MessageType::Error => (&CROSS, style(message).red().bold()),
                MessageType::Warning => (&WARNING, style(message).yellow().bold()),
                MessageType::Info => (&INFO, style(message).cyan()),
            };

            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, styled),
                _ => println!("{}{}", emoji, styled),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}
