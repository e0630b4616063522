//! End-to-end pipeline: load documents from disk, export a workbook,
//! edit it, import it back and check the generated artifacts.

use std::path::PathBuf;

use confloc_services::{
    export_to_workbook_file, import_from_workbook_file, load_documents, load_standard_documents,
    CancelToken, DocumentSet, ExportOptions, LabelKeyTable,
};

const SDM: &str = "<succession-data-model>\
    <field-def id=\"F1\" visibility=\"both\">\
    <label>Hello</label>\
    <label xml:lang=\"en_US\">Hello</label>\
    </field-def></succession-data-model>";

const STANDARD_SDM: &str = "<succession-data-model>\
    <field-def id=\"F1\">\
    <label xml:lang=\"de_DE\">Hallo Standard</label>\
    </field-def></succession-data-model>";

fn langs() -> Vec<String> {
    vec!["en_US".to_string(), "de_DE".to_string()]
}

fn write(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn export_edit_import_produces_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let sdm_path = write(&src, "sdm.xml", SDM);

    let std_dir = dir.path().join("standard");
    std::fs::create_dir_all(&std_dir).unwrap();
    write(&std_dir, "standard-sdm.xml", STANDARD_SDM);

    let mut set = DocumentSet::new();
    let skipped = load_documents(&mut set, &[sdm_path]).unwrap();
    assert!(skipped.is_empty());
    assert_eq!(load_standard_documents(&mut set, &std_dir).unwrap(), 1);

    // Export
    let out_dir = dir.path().join("out");
    let summary = export_to_workbook_file(
        &set,
        &langs(),
        &LabelKeyTable::new(),
        &ExportOptions::default(),
        &out_dir,
        Some("Translations.xlsx"),
        &CancelToken::new(),
        |_, _| {},
    )
    .unwrap();
    assert!(summary.success);
    let workbook_path = PathBuf::from(summary.file_path.unwrap());
    assert!(workbook_path.exists());
    assert!(summary.rows_exported > 0);

    // The missing de_DE row carries the standard document's fallback label.
    let wb = confloc_workbook::read_xlsx(&workbook_path).unwrap();
    let de = wb.sheet("DataModel (de_DE)").unwrap();
    let row = de
        .rows()
        .iter()
        .position(|r| r.cells.get(2).map(String::as_str) == Some("F1"))
        .unwrap();
    assert_eq!(de.cell(row, 4), "Hallo Standard");

    // Translator edits the de_DE cell and saves the workbook.
    let mut wb = wb;
    let edited_path = dir.path().join("edited.xlsx");
    wb.sheet_mut("DataModel (de_DE)")
        .unwrap()
        .set_cell(row, 4, "Hallo Welt");
    confloc_workbook::write_xlsx(&wb, &edited_path).unwrap();

    // Import
    let import_dir = dir.path().join("import");
    let mut keys = LabelKeyTable::new();
    let summary = import_from_workbook_file(
        &edited_path,
        &[],
        &mut set,
        &mut keys,
        &import_dir,
        &CancelToken::new(),
        |_, _| {},
    )
    .unwrap();

    assert!(summary.success);
    assert_eq!(summary.changes_made, 1);
    let log_path = PathBuf::from(summary.log_file_path.unwrap());
    assert!(log_path.exists());
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("Added"));

    let generated = summary
        .files_generated
        .iter()
        .find(|f| f.contains("ReadyToImport_Succession Data Model.xml"))
        .expect("regenerated document artifact");
    let raw = std::fs::read_to_string(generated).unwrap();
    let tree = confloc_parsers_xml::Tree::parse(&raw).unwrap();
    let label = tree
        .find_with_attr(confloc_parsers_xml::DOC, "label", "xml:lang", "de_DE")
        .unwrap();
    assert_eq!(tree.text(label), "Hallo Welt");
}

#[test]
fn unclassifiable_files_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(dir.path(), "sdm.xml", SDM);
    let bad = write(dir.path(), "other.xml", "<unrelated-root/>");

    let mut set = DocumentSet::new();
    let skipped = load_documents(&mut set, &[good, bad]).unwrap();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].path.ends_with("other.xml"));
    assert_eq!(set.docs().len(), 1);
}

#[test]
fn cancelled_import_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sdm_path = write(dir.path(), "sdm.xml", SDM);

    let mut set = DocumentSet::new();
    load_documents(&mut set, &[sdm_path]).unwrap();

    let out_dir = dir.path().join("out");
    let summary = export_to_workbook_file(
        &set,
        &langs(),
        &LabelKeyTable::new(),
        &ExportOptions::default(),
        &out_dir,
        Some("Translations.xlsx"),
        &CancelToken::new(),
        |_, _| {},
    )
    .unwrap();
    let workbook_path = PathBuf::from(summary.file_path.unwrap());

    let import_dir = dir.path().join("import");
    let token = CancelToken::new();
    token.cancel();
    let err = import_from_workbook_file(
        &workbook_path,
        &[],
        &mut set,
        &mut LabelKeyTable::new(),
        &import_dir,
        &token,
        |_, _| {},
    )
    .unwrap_err();
    assert!(confloc_core::is_cancelled(&err));
    assert!(!import_dir.exists(), "no artifacts after cancellation");
    assert!(set.dirty_docs().next().is_none());
}
