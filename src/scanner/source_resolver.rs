use crate::config::SourceConfig;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, debug_span, warn};
use walkdir::WalkDir;

/// Date format used in dated folder names and in output folder names.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Result of looking up one (template, date) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMatch {
    pub template: String,
    pub date: NaiveDate,
    pub path: Option<PathBuf>,
}

impl SourceMatch {
    pub fn is_found(&self) -> bool {
        self.path.is_some()
    }
}

/// Locates per-day source workbooks below a root directory.
///
/// A directory matches when its own name contains the date as `dd.mm.yyyy`
/// and it directly holds a file named exactly like the template. Entries are
/// visited in file-name order, so when several dated folders qualify the
/// lexicographically first path wins.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
    max_depth: Option<usize>,
    follow_links: bool,
}

impl SourceResolver {
    pub fn new<P: Into<PathBuf>>(root: P, config: &SourceConfig) -> Self {
        Self {
            root: root.into(),
            max_depth: config.max_depth,
            follow_links: config.follow_links,
        }
    }

    pub fn resolve(&self, template_name: &str, date: NaiveDate) -> SourceMatch {
        SourceMatch {
            template: template_name.to_string(),
            date,
            path: self.find_source(template_name, date),
        }
    }

    pub fn find_source(&self, template_name: &str, date: NaiveDate) -> Option<PathBuf> {
        let date_text = date.format(DATE_FORMAT).to_string();
        let _span = debug_span!("resolve", template = template_name, date = %date_text).entered();

        let mut walker = WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // Unreadable directories are skipped, the walk goes on
                    warn!(error = %err, "skipping unreadable path");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let dir_name = entry.file_name().to_string_lossy();
            if !dir_name.contains(&date_text) {
                continue;
            }

            let candidate = entry.path().join(template_name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "source file found");
                return Some(candidate);
            }
        }

        None
    }
}
