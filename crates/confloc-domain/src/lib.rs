use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// A file that was offered to the loader but matched no known document shape.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Outcome of one export run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportSummary {
    pub schema_version: u32,
    pub success: bool,
    /// Workbook artifact path, when the caller asked for one on disk.
    pub file_path: Option<String>,
    pub sheets_created: usize,
    pub rows_exported: usize,
    pub skipped_files: Vec<SkippedFile>,
}

/// One applied (or attempted) change during import.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeEntry {
    pub sheet: String,
    /// 1-based worksheet row.
    pub row: usize,
    pub location: String,
    pub language: String,
    pub old_value: Option<String>,
    pub new_value: String,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportSummary {
    pub schema_version: u32,
    pub success: bool,
    pub files_generated: Vec<String>,
    pub changes_made: usize,
    pub log_file_path: Option<String>,
    pub error_message: Option<String>,
}

impl ImportSummary {
    pub fn empty() -> Self {
        ImportSummary {
            schema_version: SCHEMA_VERSION,
            success: true,
            files_generated: Vec::new(),
            changes_made: 0,
            log_file_path: None,
            error_message: None,
        }
    }
}
