use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest 1-based column index an xlsx sheet can hold.
const MAX_SHEET_COLUMN: u32 = 16_384;
/// Highest 1-based row index an xlsx sheet can hold.
const MAX_SHEET_ROW: u32 = 1_048_576;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub templates: TemplateConfig,
    pub sources: SourceConfig,
    pub layout: LayoutConfig,
    pub output: OutputConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Default locations used when the command line does not name them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub template_dir: Option<PathBuf>,
    pub source_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub extension: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Maximum directory depth below the source root; unlimited when absent.
    pub max_depth: Option<usize>,
    pub follow_links: bool,
}

/// Cell coordinates of the copied block, 1-based as shown in spreadsheet programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub source_column: u32,
    pub first_source_row: u32,
    pub last_source_row: u32,
    pub destination_row_offset: u32,
    pub first_destination_column: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub folder_label: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Concurrent template tasks; defaults to the number of CPUs.
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            extension: "xlsx".to_string(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            source_column: 3,
            first_source_row: 3,
            last_source_row: 27,
            destination_row_offset: 2,
            first_destination_column: 3,
        }
    }
}

impl LayoutConfig {
    pub fn rows_per_day(&self) -> u32 {
        self.last_source_row
            .checked_sub(self.first_source_row)
            .map_or(0, |span| span.saturating_add(1))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder_label: "Weekly report".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl RuntimeConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ReportError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ReportError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ReportError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["weekly-report.toml", ".weekly-report.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref dir) = cli_args.template_dir {
            self.paths.template_dir = Some(dir.clone());
        }

        if let Some(ref dir) = cli_args.source_root {
            self.paths.source_root = Some(dir.clone());
        }

        if let Some(ref dir) = cli_args.output_root {
            self.paths.output_root = Some(dir.clone());
        }

        if let Some(workers) = cli_args.workers {
            self.runtime.workers = Some(workers);
        }

        if let Some(ref label) = cli_args.folder_label {
            self.output.folder_label = label.clone();
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| ReportError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| ReportError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.templates.extension.trim().is_empty() {
            return Err(ReportError::Config {
                message: "Template file extension must not be empty".to_string(),
            });
        }

        let layout = &self.layout;
        if layout.source_column == 0
            || layout.first_source_row == 0
            || layout.first_destination_column == 0
        {
            return Err(ReportError::Config {
                message: "Layout rows and columns are 1-based and must be greater than 0"
                    .to_string(),
            });
        }

        if layout.last_source_row < layout.first_source_row {
            return Err(ReportError::Config {
                message: format!(
                    "last_source_row ({}) is before first_source_row ({})",
                    layout.last_source_row, layout.first_source_row
                ),
            });
        }

        // Seven day columns must fit in the sheet.
        let last_destination_column = layout.first_destination_column.checked_add(6);
        if last_destination_column.map_or(true, |column| column > MAX_SHEET_COLUMN)
            || layout.source_column > MAX_SHEET_COLUMN
        {
            return Err(ReportError::Config {
                message: "Layout columns exceed the spreadsheet column limit".to_string(),
            });
        }

        let last_destination_row = layout
            .last_source_row
            .checked_add(layout.destination_row_offset);
        if last_destination_row.map_or(true, |row| row > MAX_SHEET_ROW) {
            return Err(ReportError::Config {
                message: format!(
                    "last_source_row ({}) plus destination_row_offset ({}) exceeds the spreadsheet row limit of {}",
                    layout.last_source_row, layout.destination_row_offset, MAX_SHEET_ROW
                ),
            });
        }

        if self.runtime.workers == Some(0) {
            return Err(ReportError::Config {
                message: "Worker count must be greater than 0".to_string(),
            });
        }

        if self.output.folder_label.trim().is_empty() {
            return Err(ReportError::Config {
                message: "Output folder label must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub template_dir: Option<PathBuf>,
    pub source_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub workers: Option<usize>,
    pub folder_label: Option<String>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.template_dir = dir;
        self
    }

    pub fn with_source_root(mut self, dir: Option<PathBuf>) -> Self {
        self.source_root = dir;
        self
    }

    pub fn with_output_root(mut self, dir: Option<PathBuf>) -> Self {
        self.output_root = dir;
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_folder_label(mut self, label: Option<String>) -> Self {
        self.folder_label = label;
        self
    }
}
