use crate::config::TemplateConfig;
use crate::error::{ReportError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A template workbook found in the template directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDescriptor {
    pub path: PathBuf,
    pub filename: String,
}

impl TemplateDescriptor {
    /// `None` when the path has no file name or the name is not valid UTF-8;
    /// such a name could not be matched against source files anyway.
    pub fn new(path: PathBuf) -> Option<Self> {
        let filename = path.file_name()?.to_str()?.to_string();
        Some(Self { path, filename })
    }
}

pub struct TemplateEnumerator {
    extension: String,
}

impl TemplateEnumerator {
    pub fn new(config: &TemplateConfig) -> Self {
        Self {
            extension: config.extension.trim_start_matches('.').to_lowercase(),
        }
    }

    pub fn enumerate<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<TemplateDescriptor>> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(ReportError::DirectoryNotFound {
                path: dir.display().to_string(),
            });
        }

        let entries = fs::read_dir(dir).map_err(|e| ReportError::DirectoryNotFound {
            path: format!("{} ({})", dir.display(), e),
        })?;

        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ReportError::DirectoryNotFound {
                path: format!("{} ({})", dir.display(), e),
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            if entry.file_name().to_str().is_none() {
                warn!(path = %path.display(), "skipping template with a non UTF-8 file name");
                continue;
            }

            if !self.is_template_file(&path) {
                continue;
            }

            if let Some(template) = TemplateDescriptor::new(path) {
                templates.push(template);
            }
        }

        templates.sort_by(|a, b| a.filename.cmp(&b.filename));
        debug!(dir = %dir.display(), count = templates.len(), "enumerated templates");

        Ok(templates)
    }

    pub fn is_template_file(&self, path: &Path) -> bool {
        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            return false;
        };

        // Office lock files share the extension but are not workbooks
        if filename.starts_with("~$") {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.to_lowercase() == self.extension)
    }
}
