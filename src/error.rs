use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Template directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("Cannot create output folder {path}: {message}")]
    OutputCreate { path: String, message: String },

    #[error("Cannot read source file {path}: {message}")]
    SourceRead { path: String, message: String },

    #[error("Cannot open template {path}: {message}")]
    TemplateOpen { path: String, message: String },

    #[error("Cannot save report {path}: {message}")]
    TemplateSave { path: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Template task failed: {message}")]
    TaskFailed { message: String },
}

impl ReportError {
    /// Fatal errors abort the whole run before any template is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReportError::Validation { .. }
                | ReportError::DirectoryNotFound { .. }
                | ReportError::OutputCreate { .. }
                | ReportError::Config { .. }
        )
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ReportError {
    fn user_message(&self) -> String {
        match self {
            ReportError::Validation { message } => {
                format!("Invalid input: {}", message)
            }
            ReportError::DirectoryNotFound { path } => {
                format!("Template directory not found: {}", path)
            }
            ReportError::OutputCreate { path, .. } => {
                format!("Could not create output folder: {}", path)
            }
            ReportError::SourceRead { path, .. } => {
                format!("Could not read source workbook: {}", path)
            }
            ReportError::TemplateOpen { path, .. } => {
                format!("Could not open template workbook: {}", path)
            }
            ReportError::TemplateSave { path, .. } => {
                format!("Could not save report workbook: {}", path)
            }
            ReportError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ReportError::Validation { .. } => Some(
                "Provide --templates, --sources and --output, or set them in the [paths] section of the configuration file.".to_string()
            ),
            ReportError::DirectoryNotFound { .. } => Some(
                "Check that the template directory exists and is readable.".to_string()
            ),
            ReportError::OutputCreate { .. } => Some(
                "Ensure you have write permission for the output directory.".to_string()
            ),
            ReportError::TemplateOpen { .. } | ReportError::SourceRead { .. } => Some(
                "Make sure the file is a valid .xlsx workbook and is not locked by another program.".to_string()
            ),
            ReportError::TemplateSave { .. } => Some(
                "Close the report if it is open in a spreadsheet program and run again.".to_string()
            ),
            ReportError::Config { .. } => Some(
                "Check your configuration file syntax or regenerate one with --generate-config.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ReportError {
    fn from(error: toml::de::Error) -> Self {
        ReportError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = ReportError::DirectoryNotFound {
            path: "/missing".to_string(),
        };
        assert!(error.user_message().contains("/missing"));
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ReportError::Validation {
            message: "x".to_string()
        }
        .is_fatal());
        assert!(ReportError::OutputCreate {
            path: "p".to_string(),
            message: "m".to_string()
        }
        .is_fatal());
        assert!(!ReportError::SourceRead {
            path: "p".to_string(),
            message: "m".to_string()
        }
        .is_fatal());
        assert!(!ReportError::TemplateSave {
            path: "p".to_string(),
            message: "m".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_error = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let error = ReportError::from(parse_error);
        assert!(matches!(error, ReportError::Config { .. }));
    }
}
