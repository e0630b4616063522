//! High-level orchestration layer over the engine crates.
//! Intentionally thin: loads documents, runs one export or import pass,
//! and turns the in-memory outcome into artifacts on disk — strictly
//! after the engine returns, so cancellation never leaves partial writes.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub use confloc_core::{CancelToken, ConflocError, Result};
pub use confloc_domain::{ExportSummary, ImportSummary, SkippedFile, SCHEMA_VERSION};
pub use confloc_export::{ExportOptions, ExportStats};
pub use confloc_keys::LabelKeyTable;
pub use confloc_model::{ConfigDocument, DocKind, DocumentSet};

pub mod util;

/// Load configuration documents into the registry. Files that match no
/// known shape are reported back, not fatal (the caller shows them as
/// skipped).
pub fn load_documents(set: &mut DocumentSet, paths: &[PathBuf]) -> Result<Vec<SkippedFile>> {
    let mut skipped = Vec::new();
    for path in paths {
        let raw = std::fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match confloc_model::load_document(&raw, &file_name, false) {
            Ok(mut doc) => {
                doc.source_file = Some(path.clone());
                tracing::debug!(event = "document_loaded", name = %doc.name, kind = ?doc.kind);
                set.insert(doc);
            }
            Err(err) => {
                tracing::warn!(event = "document_skipped", path = %path.display(), error = %err);
                skipped.push(SkippedFile {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(skipped)
}

/// Scan `dir` for standard reference documents and register them with the
/// standard name prefix. Unclassifiable files are skipped quietly.
pub fn load_standard_documents(set: &mut DocumentSet, dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.extension().map(|e| e == "xml").unwrap_or(false) {
            continue;
        }
        let Ok(raw) = std::fs::read_to_string(path) else {
            continue;
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match confloc_model::load_document(&raw, &file_name, true) {
            Ok(mut doc) => {
                doc.source_file = Some(path.to_path_buf());
                set.insert(doc);
                count += 1;
            }
            Err(err) => {
                tracing::warn!(event = "standard_skipped", path = %path.display(), error = %err);
            }
        }
    }
    Ok(count)
}

/// Run an export pass and write the workbook under `save_dir`.
#[allow(clippy::too_many_arguments)]
pub fn export_to_workbook_file(
    set: &DocumentSet,
    languages: &[String],
    keys: &LabelKeyTable,
    options: &ExportOptions,
    save_dir: &Path,
    file_name: Option<&str>,
    cancel: &CancelToken,
    mut progress: impl FnMut(u8, &str),
) -> Result<ExportSummary> {
    let (workbook, stats) = confloc_export::export_to_workbook(
        set,
        languages,
        keys,
        options,
        cancel,
        |p, m| progress(p.min(95), m),
    )?;

    let name = file_name
        .map(str::to_string)
        .unwrap_or_else(|| format!("Translations_{}.xlsx", util::artifact_timestamp()));
    let out_path = save_dir.join(name);
    std::fs::create_dir_all(save_dir)?;
    confloc_workbook::write_xlsx(&workbook, &out_path)?;
    progress(100, "Export complete!");

    Ok(ExportSummary {
        schema_version: SCHEMA_VERSION,
        success: true,
        file_path: Some(out_path.display().to_string()),
        sheets_created: stats.sheets_created,
        rows_exported: stats.rows_exported,
        skipped_files: Vec::new(),
    })
}

/// Run an import pass against a workbook file and write the regenerated
/// artifacts: one document per dirty model, the key table when key-routed
/// edits occurred, the annotated workbook, and the plain-text import log.
#[allow(clippy::too_many_arguments)]
pub fn import_from_workbook_file(
    workbook_path: &Path,
    sheet_names: &[String],
    set: &mut DocumentSet,
    keys: &mut LabelKeyTable,
    save_dir: &Path,
    cancel: &CancelToken,
    mut progress: impl FnMut(u8, &str),
) -> Result<ImportSummary> {
    let mut workbook = confloc_workbook::read_xlsx(workbook_path)?;

    // Default to every sheet the workbook actually carries.
    let names: Vec<String> = if sheet_names.is_empty() {
        workbook.sheet_names()
    } else {
        sheet_names.to_vec()
    };

    let outcome = confloc_import::import_from_workbook(
        &mut workbook,
        &names,
        set,
        keys,
        cancel,
        |p, m| progress((p as usize * 55 / 100) as u8, m),
    )?;

    std::fs::create_dir_all(save_dir)?;
    let mut files_generated = Vec::new();

    if outcome.changes > 0 {
        progress(60, "Saving updated workbook with change log...");
        let annotated = save_dir.join("TranslationsWorkbook_WithChangeLog.xlsx");
        confloc_workbook::write_xlsx(&workbook, &annotated)?;
        files_generated.push(annotated.display().to_string());
    }

    let dirty: Vec<String> = set.dirty_docs().map(|d| d.name.clone()).collect();
    let total = dirty.len().max(1);
    for (i, name) in dirty.iter().enumerate() {
        let doc = set.get(name).expect("dirty doc is registered");
        let file = save_dir.join(format!("ReadyToImport_{name}.xml"));
        let xml = doc.tree.to_xml_string()?;
        util::write_atomic(&file, xml.as_bytes())?;
        files_generated.push(file.display().to_string());
        let percent = 65 + ((i + 1) * 25 / total) as u8;
        progress(
            percent,
            &format!("Generated ready-to-import file: ReadyToImport_{name}.xml"),
        );
    }

    if outcome.keys_modified {
        let keys_path = save_dir.join("ReadyToImport_FormLabelKeys.csv");
        let mut buf = Vec::new();
        keys.to_writer(&mut buf)?;
        util::write_atomic(&keys_path, &buf)?;
        files_generated.push(keys_path.display().to_string());
    }

    let log_path = save_dir.join(format!("ImportLog_{}.log", util::artifact_timestamp()));
    util::write_atomic(&log_path, outcome.log.join("\n\n").as_bytes())?;

    progress(100, "Import complete!");
    Ok(ImportSummary {
        schema_version: SCHEMA_VERSION,
        success: true,
        files_generated,
        changes_made: outcome.changes,
        log_file_path: Some(log_path.display().to_string()),
        error_message: None,
    })
}
