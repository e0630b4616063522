//! Import engine: reads an edited workbook, re-anchors each row onto its
//! source node, creates or updates label nodes (or label-key entries for
//! msgKey-routed template fields) and records every change in a log.
//!
//! All mutations happen in memory; the caller serializes dirty documents
//! and the key table after the pass completes.

use chrono::Local;
use confloc_core::{CancelToken, Result, SYSTEM_DEFAULT_LANG};
use confloc_keys::LabelKeyTable;
use confloc_model::{lang_eq, node_lang, DocumentSet};
use confloc_parsers_xml::{NodeId, Tree, DOC};
use confloc_resolve::{derive_locator, CHILD_CHAR};
use confloc_workbook::{
    lang_of_flat_sheet, lang_of_header, Sheet, Workbook, FLAT_SHEET_PREFIX,
    SHEET_GOAL_DEV_TEMPLATES, SHEET_PERFORMANCE_TEMPLATES,
};

/// In-memory outcome of an import pass; artifacts are the caller's job.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub changes: usize,
    pub log: Vec<String>,
    pub keys_modified: bool,
}

impl ImportOutcome {
    fn log(&mut self, message: String) {
        let stamp = Local::now().format("%a_%d%b_%Y_%Hh%Mm%Ss");
        self.log.push(format!("{stamp}: {message}"));
    }
}

/// Process the requested worksheets against the loaded documents and the
/// label-key table. Every processed sheet gets a trailing change-log
/// column; rows that cannot be re-anchored are annotated and skipped.
pub fn import_from_workbook(
    workbook: &mut Workbook,
    sheet_names: &[String],
    set: &mut DocumentSet,
    keys: &mut LabelKeyTable,
    cancel: &CancelToken,
    mut progress: impl FnMut(u8, &str),
) -> Result<ImportOutcome> {
    let mut outcome = ImportOutcome::default();
    let total = sheet_names.len().max(1);

    for (i, name) in sheet_names.iter().enumerate() {
        cancel.check()?;
        let percent = ((i * 100) / total) as u8;
        progress(percent, &format!("Processing '{name}' sheet from workbook..."));

        let Some(sheet) = workbook.sheet_mut(name) else {
            tracing::warn!(event = "sheet_missing", sheet = %name);
            continue;
        };

        if name.starts_with(FLAT_SHEET_PREFIX) {
            process_flat_sheet(sheet, set, &mut outcome);
        } else if name == SHEET_PERFORMANCE_TEMPLATES || name == SHEET_GOAL_DEV_TEMPLATES {
            process_wide_sheet(sheet, set, keys, &mut outcome);
        } else {
            tracing::debug!(event = "sheet_skipped", sheet = %name);
        }
    }

    progress(100, "Import complete!");
    Ok(outcome)
}

/// Descendant search scoped under `scope` (document-wide when `None`).
/// An empty id means the node must carry no id attribute at all.
fn locate_in(
    tree: &Tree,
    scope: Option<NodeId>,
    name: &str,
    id: &str,
    require_both: bool,
) -> Option<NodeId> {
    let from = scope.unwrap_or(DOC);
    tree.find_where(from, |n| {
        tree.name(n) == name
            && (if id.is_empty() {
                tree.attr(n, "id").is_none()
            } else {
                tree.attr(n, "id") == Some(id)
            })
            && (!require_both || tree.attr(n, "visibility") == Some("both"))
    })
}

/// Resolution ladder: anchored lookups first, then document-wide.
fn resolve_row_node(tree: &Tree, anchor: Option<NodeId>, name: &str, id: &str) -> Option<NodeId> {
    locate_in(tree, anchor, name, id, true)
        .or_else(|| locate_in(tree, anchor, name, id, false))
        .or_else(|| locate_in(tree, None, name, id, true))
        .or_else(|| locate_in(tree, None, name, id, false))
}

/// Registry name referenced by a flat row's section cell.
fn flat_doc_ref(section: &str, set: &DocumentSet) -> String {
    let mut name = section;
    if let Some(open) = section.find('(') {
        name = &section[..open];
    }
    let name = name.trim();
    if name == "Employee Profile" {
        for candidate in ["Extended Succession Data Model", "Succession Data Model"] {
            if set.get(candidate).is_some() {
                return candidate.to_string();
            }
        }
        return "Extended Succession Data Model".to_string();
    }
    name.to_string()
}

fn process_flat_sheet(sheet: &mut Sheet, set: &mut DocumentSet, outcome: &mut ImportOutcome) {
    let Some(lang) = lang_of_flat_sheet(&sheet.name).map(str::to_string) else {
        return;
    };
    let change_col = sheet.add_change_log_column();

    // Anchor tracking: the most recent bold row scopes the lookups that
    // follow, disambiguating (tag, id) pairs that repeat per group.
    let mut anchors_doc: Option<String> = None;
    let mut group: Option<NodeId> = None;
    let mut group_set = false;
    let mut item: Option<NodeId> = None;

    for row in 1..sheet.row_count() {
        let section = sheet.cell(row, 0).to_string();
        if section.is_empty() {
            break;
        }
        let tag_name = sheet.cell(row, 1).to_string();
        let tag_id = sheet.cell(row, 2).to_string();
        let lang_label = sheet.cell(row, 4).to_string();

        let dm_ref = flat_doc_ref(&section, set);
        if set.get(&dm_ref).is_none() {
            sheet.set_cell(row, change_col, &format!("No data model found for {dm_ref}"));
            continue;
        }
        if anchors_doc.as_deref() != Some(dm_ref.as_str()) {
            anchors_doc = Some(dm_ref.clone());
            group = None;
            group_set = false;
            item = None;
        }

        let doc = set.get_mut(&dm_ref).expect("checked above");
        let tree = &mut doc.tree;

        if sheet.is_bold(row) {
            if tag_name == "country" || !group_set {
                group = None;
                group_set = true;
            } else {
                group = item;
            }
            item = locate_in(tree, group, &tag_name, &tag_id, true)
                .or_else(|| locate_in(tree, None, &tag_name, &tag_id, false));
        }

        let Some(matching) = resolve_row_node(tree, item, &tag_name, &tag_id) else {
            outcome.log(format!(
                "No matching tag found in {dm_ref} for {tag_name} ({tag_id})"
            ));
            sheet.set_cell(row, change_col, &format!("No matching tag found in {dm_ref}"));
            continue;
        };

        // Nodes without any label child carry their text on an
        // instruction child instead.
        let mut label_name = "label";
        if tree.find_descendant(matching, "label").is_none()
            && tree.find_descendant(matching, "instruction").is_some()
        {
            label_name = "instruction";
        }
        let matching_label = tree.find_where(matching, |n| {
            tree.name(n) == label_name
                && tree
                    .attr(n, "xml:lang")
                    .map(|l| lang_eq(l, &lang))
                    .unwrap_or(false)
        });

        match matching_label {
            None => {
                if !lang_label.is_empty() {
                    let new_label = tree.new_element(label_name);
                    tree.set_attr(new_label, "xml:lang", &lang);
                    tree.set_text(new_label, &lang_label);
                    tree.insert_child(matching, 2, new_label);
                    doc.dirty = true;
                    outcome.changes += 1;
                    outcome.log(format!(
                        "Row {}: Added '{lang}' translation for {tag_name}",
                        row + 1
                    ));
                    sheet.set_cell(
                        row,
                        change_col,
                        &format!("Translation Added: '{lang_label}'"),
                    );
                }
            }
            Some(label_node) => {
                let old = tree.text(label_node).to_string();
                if !lang_label.is_empty() && lang_label != old {
                    tree.set_text(label_node, &lang_label);
                    doc.dirty = true;
                    outcome.changes += 1;
                    outcome.log(format!(
                        "Row {}: Changed '{lang}' translation for {tag_name} from '{old}' to '{lang_label}'",
                        row + 1
                    ));
                    sheet.set_cell(
                        row,
                        change_col,
                        &format!("Translation Changed from '{old}' to '{lang_label}'"),
                    );
                }
            }
        }
    }
}

/// Language columns of a wide sheet: (column index, language code).
fn wide_lang_columns(sheet: &Sheet) -> Vec<(usize, String)> {
    let Some(header) = sheet.row(0) else {
        return Vec::new();
    };
    header
        .cells
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("Label ("))
        .filter_map(|(i, h)| lang_of_header(h).map(|l| (i, l.to_string())))
        .collect()
}

/// Field tag name referenced by an item cell like `Obj Plan Name
/// (obj-plan-name)`.
fn field_tag_of(item: &str) -> String {
    if let (Some(open), Some(close)) = (item.rfind('('), item.rfind(')')) {
        if open < close {
            return item[open + 1..close].to_string();
        }
    }
    item.trim().to_string()
}

fn process_wide_sheet(
    sheet: &mut Sheet,
    set: &mut DocumentSet,
    keys: &mut LabelKeyTable,
    outcome: &mut ImportOutcome,
) {
    let root_tag = if sheet.name == SHEET_PERFORMANCE_TEMPLATES {
        "sf-form"
    } else {
        "obj-plan-template"
    };
    let change_col = sheet.add_change_log_column();
    let lang_cols = wide_lang_columns(sheet);

    let mut anchors_doc: Option<String> = None;
    let mut section_anchor: Option<NodeId> = None;

    for row in 1..sheet.row_count() {
        let template_name = sheet.cell(row, 1).to_string();
        if template_name.is_empty() {
            break;
        }
        let section = sheet.cell(row, 2).to_string();
        let item = sheet.cell(row, 3).to_string();
        let default_lbl = sheet.cell(row, 4).to_string();

        // Synthetic template-name row emitted by the export engine.
        if section == "General Settings" && item == "Form Name" {
            continue;
        }

        if set.get(&template_name).is_none() {
            sheet.set_cell(
                row,
                change_col,
                &format!("No template found for '{template_name}'"),
            );
            continue;
        }
        if anchors_doc.as_deref() != Some(template_name.as_str()) {
            anchors_doc = Some(template_name.clone());
            section_anchor = None;
        }

        let lang_values: Vec<(String, String)> = lang_cols
            .iter()
            .map(|(col, lang)| (lang.clone(), sheet.cell(row, *col).to_string()))
            .collect();

        let doc = set.get_mut(&template_name).expect("checked above");
        let tree = &mut doc.tree;

        // Locate the section node this row belongs to.
        let parent = if section.contains('(') {
            let locator = derive_locator(&section);
            let found = match &locator.attr_hint {
                Some((key, value)) => {
                    let direct =
                        tree.find_with_attr(DOC, &locator.tag_hint, key, value);
                    let direct = direct.or_else(|| {
                        // competency ids live in a child node, not an attribute
                        if locator.tag_hint == "fm-competency" && key == "id" {
                            tree.find_where(DOC, |n| {
                                tree.name(n) == "fm-competency"
                                    && tree
                                        .find_descendant(n, "fm-comp-id")
                                        .map(|c| tree.text(c).trim() == value.as_str())
                                        .unwrap_or(false)
                            })
                        } else {
                            None
                        }
                    });
                    direct.or_else(|| tree.find_with_attr(DOC, "fm-sect", key, value))
                }
                None => tree.find(&locator.tag_hint),
            };
            section_anchor = found;
            found
        } else if section.contains(CHILD_CHAR.trim()) {
            let locator = derive_locator(&section);
            section_anchor
                .and_then(|anchor| tree.find_descendant(anchor, &locator.tag_hint))
        } else {
            tree.find(root_tag)
        };

        let Some(parent) = parent else {
            sheet.set_cell(row, change_col, &format!("No section found for '{section}'"));
            continue;
        };

        let field_tag = field_tag_of(&item);
        let Some(tag) = tree.find_descendant(parent, &field_tag) else {
            sheet.set_cell(row, change_col, &format!("No field found for '{item}'"));
            continue;
        };

        let msg_key = tree
            .attr(tag, "msgKey")
            .or_else(|| tree.attr(tag, "msgkey"))
            .map(str::to_string);

        let change_text = match msg_key {
            Some(key) => apply_key_changes(keys, &key, &lang_values, row, outcome),
            None => {
                let text =
                    apply_inline_changes(tree, tag, &default_lbl, &lang_values, row, outcome);
                if text.is_some() {
                    doc.dirty = true;
                }
                text
            }
        };
        if let Some(text) = change_text {
            sheet.set_cell(row, change_col, &text);
        }
    }
}

/// Route edits of a msgKey-carrying field into the label-key table. The
/// document node itself is never mutated.
fn apply_key_changes(
    keys: &mut LabelKeyTable,
    key: &str,
    lang_values: &[(String, String)],
    row: usize,
    outcome: &mut ImportOutcome,
) -> Option<String> {
    let mut modified: Vec<String> = Vec::new();
    let mut new_labels: Vec<String> = Vec::new();

    for (lang, value) in lang_values {
        if value.trim().is_empty() {
            continue;
        }
        let differs = keys.label(key, lang).map(|c| c != value).unwrap_or(true);
        if differs {
            keys.set_label(key, lang, value, SYSTEM_DEFAULT_LANG);
            outcome.keys_modified = true;
            outcome.changes += 1;
            modified.push(lang.clone());
            new_labels.push(value.clone());
        }
    }

    if modified.is_empty() {
        return None;
    }
    outcome.log(format!(
        "Row {}: Updated FormLabelKeys for '{key}' languages {modified:?}",
        row + 1
    ));
    Some(format!(
        "Translation changed in FormLabelKeys for {modified:?} to {new_labels:?}"
    ))
}

/// Apply edits to a field holding inline per-language sibling nodes:
/// update the matching sibling or insert a new one after the last of its
/// kind. The default-label column updates the un-tagged node itself.
fn apply_inline_changes(
    tree: &mut Tree,
    tag: NodeId,
    default_lbl: &str,
    lang_values: &[(String, String)],
    row: usize,
    outcome: &mut ImportOutcome,
) -> Option<String> {
    let tag_name = tree.name(tag).to_string();
    let parent = tree.parent(tag)?;

    let mut modified: Vec<String> = Vec::new();
    let mut old_labels: Vec<String> = Vec::new();
    let mut new_labels: Vec<String> = Vec::new();

    // The exported default cell is the resolved default label, which may
    // carry decorations the raw node text lacks; compare against the same
    // resolution so an unedited cell never counts as a change.
    if node_lang(tree, tag).is_none() {
        let exported = confloc_model::default_label(tree, tag, false, true, SYSTEM_DEFAULT_LANG);
        if !default_lbl.is_empty() && exported != default_lbl {
            let current = tree.text(tag).to_string();
            tree.set_text(tag, default_lbl);
            modified.push("Default".to_string());
            old_labels.push(current);
            new_labels.push(default_lbl.to_string());
        }
    }

    for (lang, value) in lang_values {
        if value.trim().is_empty() {
            continue;
        }
        let sibling = tree.child_where(parent, |c| {
            tree.name(c) == tag_name
                && tree
                    .attr(c, "lang")
                    .map(|l| lang_eq(l, lang))
                    .unwrap_or(false)
        });
        match sibling {
            Some(node) => {
                let old = tree.text(node).to_string();
                if old != *value {
                    tree.set_text(node, value);
                    modified.push(lang.clone());
                    old_labels.push(old);
                    new_labels.push(value.clone());
                }
            }
            None => {
                let new_node = tree.new_element(&tag_name);
                tree.set_attr(new_node, "lang", lang);
                tree.set_text(new_node, value);
                tree.set_cdata(new_node, true);
                let last = tree
                    .children_named(parent, &tag_name)
                    .last()
                    .copied()
                    .unwrap_or(tag);
                tree.insert_after(last, new_node);
                modified.push(lang.clone());
                old_labels.push(String::new());
                new_labels.push(value.clone());
            }
        }
    }

    if modified.is_empty() {
        return None;
    }
    outcome.changes += modified.len();
    outcome.log(format!(
        "Row {}: Changed translations for {modified:?}",
        row + 1
    ));
    Some(format!(
        "Translation Changed for {modified:?} from {old_labels:?} to {new_labels:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use confloc_model::load_document;
    use confloc_workbook::CHANGE_LOG_HEADER;

    fn flat_headers(lang: &str) -> Vec<String> {
        vec![
            "Section".to_string(),
            "Element/Subsection".to_string(),
            "Field Id".to_string(),
            "Default Label".to_string(),
            format!("Label ({lang})"),
        ]
    }

    fn wide_headers(langs: &[&str]) -> Vec<String> {
        let mut headers: Vec<String> = [
            "Translation Type",
            "Template Name",
            "Section/Element/Subsection",
            "Translatable Item/Field",
            "Default Label",
            "Label Key",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        headers.extend(langs.iter().map(|l| format!("Label ({l})")));
        headers
    }

    fn run(
        workbook: &mut Workbook,
        sheets: &[&str],
        set: &mut DocumentSet,
        keys: &mut LabelKeyTable,
    ) -> ImportOutcome {
        let names: Vec<String> = sheets.iter().map(|s| s.to_string()).collect();
        import_from_workbook(workbook, &names, set, keys, &CancelToken::new(), |_, _| {})
            .unwrap()
    }

    const SDM: &str = "<succession-data-model>\
        <field-def id=\"F1\" visibility=\"both\">\
        <label xml:lang=\"en_US\">Hello</label>\
        </field-def></succession-data-model>";

    #[test]
    fn scenario_b_creates_missing_language_label() {
        let mut set = DocumentSet::new();
        set.insert(load_document(SDM, "sdm.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet("DataModel (de_DE)", &flat_headers("de_DE"));
        sheet.append(vec![
            "Succession Data Model".into(),
            "field-def".into(),
            "F1".into(),
            "Hello".into(),
            "Hallo".into(),
        ]);

        let outcome = run(&mut wb, &["DataModel (de_DE)"], &mut set, &mut LabelKeyTable::new());
        assert_eq!(outcome.changes, 1);
        assert!(outcome.log.iter().any(|l| l.contains("Added")));

        let doc = set.get("Succession Data Model").unwrap();
        assert!(doc.dirty);
        let field = doc
            .tree
            .find_with_attr(DOC, "field-def", "id", "F1")
            .unwrap();
        let label = doc
            .tree
            .find_with_attr(DOC, "label", "xml:lang", "de_DE")
            .unwrap();
        assert_eq!(doc.tree.parent(label), Some(field));
        assert_eq!(doc.tree.text(label), "Hallo");

        let sheet = wb.sheet("DataModel (de_DE)").unwrap();
        assert_eq!(sheet.cell(0, 5), CHANGE_LOG_HEADER);
        assert_eq!(sheet.cell(1, 5), "Translation Added: 'Hallo'");
    }

    #[test]
    fn updates_existing_label_and_annotates_row() {
        let mut set = DocumentSet::new();
        set.insert(load_document(SDM, "sdm.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet("DataModel (en_US)", &flat_headers("en_US"));
        sheet.append(vec![
            "Succession Data Model".into(),
            "field-def".into(),
            "F1".into(),
            "Hello".into(),
            "Hi there".into(),
        ]);

        let outcome = run(&mut wb, &["DataModel (en_US)"], &mut set, &mut LabelKeyTable::new());
        assert_eq!(outcome.changes, 1);
        let doc = set.get("Succession Data Model").unwrap();
        let label = doc
            .tree
            .find_with_attr(DOC, "label", "xml:lang", "en_US")
            .unwrap();
        assert_eq!(doc.tree.text(label), "Hi there");
        assert!(wb
            .sheet("DataModel (en_US)")
            .unwrap()
            .cell(1, 5)
            .starts_with("Translation Changed from 'Hello'"));
    }

    #[test]
    fn unmatched_row_is_annotated_and_skipped() {
        let mut set = DocumentSet::new();
        set.insert(load_document(SDM, "sdm.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet("DataModel (de_DE)", &flat_headers("de_DE"));
        sheet.append(vec![
            "Succession Data Model".into(),
            "field-def".into(),
            "NOPE".into(),
            "x".into(),
            "y".into(),
        ]);

        let outcome = run(&mut wb, &["DataModel (de_DE)"], &mut set, &mut LabelKeyTable::new());
        assert_eq!(outcome.changes, 0);
        assert!(!set.get("Succession Data Model").unwrap().dirty);
        assert!(wb
            .sheet("DataModel (de_DE)")
            .unwrap()
            .cell(1, 5)
            .starts_with("No matching tag found"));
    }

    #[test]
    fn bold_anchor_rows_disambiguate_repeated_ids() {
        let sdm = "<succession-data-model>\
            <hris-element id=\"el1\" visibility=\"both\">\
            <label>One</label>\
            <hris-section id=\"sec\" visibility=\"both\">\
            <label>Sec One</label>\
            <hris-field id=\"f\" visibility=\"both\"><label>Field One</label></hris-field>\
            </hris-section></hris-element>\
            <hris-element id=\"el2\" visibility=\"both\">\
            <label>Two</label>\
            <hris-section id=\"sec\" visibility=\"both\">\
            <label>Sec Two</label>\
            <hris-field id=\"f\" visibility=\"both\"><label>Field Two</label></hris-field>\
            </hris-section></hris-element>\
            </succession-data-model>";
        let mut set = DocumentSet::new();
        set.insert(load_document(sdm, "sdm.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet("DataModel (de_DE)", &flat_headers("de_DE"));
        let doc_name = "Extended Succession Data Model";
        sheet.append_bold(vec![
            doc_name.into(),
            "hris-element".into(),
            "el2".into(),
            "Two".into(),
            "".into(),
        ]);
        sheet.append_bold(vec![
            doc_name.into(),
            "hris-section".into(),
            "sec".into(),
            "Sec Two".into(),
            "".into(),
        ]);
        sheet.append(vec![
            doc_name.into(),
            "hris-field".into(),
            "f".into(),
            "Field Two".into(),
            "Feld Zwei".into(),
        ]);

        let outcome = run(&mut wb, &["DataModel (de_DE)"], &mut set, &mut LabelKeyTable::new());
        assert_eq!(outcome.changes, 1);

        let doc = set.get(doc_name).unwrap();
        let el2 = doc
            .tree
            .find_with_attr(DOC, "hris-element", "id", "el2")
            .unwrap();
        let el1 = doc
            .tree
            .find_with_attr(DOC, "hris-element", "id", "el1")
            .unwrap();
        // the new label landed under el2's field, not el1's
        let de = doc
            .tree
            .find_with_attr(el2, "label", "xml:lang", "de_DE");
        assert!(de.is_some());
        assert_eq!(doc.tree.text(de.unwrap()), "Feld Zwei");
        assert!(doc
            .tree
            .find_with_attr(el1, "label", "xml:lang", "de_DE")
            .is_none());
    }

    #[test]
    fn instruction_children_take_the_fallback_path() {
        let sdm = "<succession-data-model>\
            <field-def id=\"F1\" visibility=\"both\">\
            <instruction xml:lang=\"en_US\">Fill this in</instruction>\
            </field-def></succession-data-model>";
        let mut set = DocumentSet::new();
        set.insert(load_document(sdm, "sdm.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet("DataModel (de_DE)", &flat_headers("de_DE"));
        sheet.append(vec![
            "Succession Data Model".into(),
            "field-def".into(),
            "F1".into(),
            "Fill this in".into(),
            "Bitte ausfuellen".into(),
        ]);

        run(&mut wb, &["DataModel (de_DE)"], &mut set, &mut LabelKeyTable::new());
        let doc = set.get("Succession Data Model").unwrap();
        let created = doc
            .tree
            .find_with_attr(DOC, "instruction", "xml:lang", "de_DE")
            .unwrap();
        assert_eq!(doc.tree.text(created), "Bitte ausfuellen");
    }

    const GOAL: &str = "<obj-plan-template>\
        <obj-plan-type>Goal</obj-plan-type>\
        <obj-plan-name>Goals</obj-plan-name>\
        <obj-plan-id>7</obj-plan-id>\
        <field-definition id=\"name\">\
        <field-label>Name</field-label>\
        <field-label lang=\"de_DE\">Name DE</field-label>\
        </field-definition>\
        </obj-plan-template>";

    #[test]
    fn wide_inline_update_and_insert_after_last_sibling() {
        let mut set = DocumentSet::new();
        set.insert(load_document(GOAL, "goal.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet(
            SHEET_GOAL_DEV_TEMPLATES,
            &wide_headers(&["en_US", "de_DE", "fr_FR"]),
        );
        sheet.append(vec![
            "Manage Templates -> Goal Plan".into(),
            "Goals (7)".into(),
            "Field Definition (id=name)".into(),
            "Field Label (field-label)".into(),
            "Name".into(),
            "".into(),
            "".into(),
            "Name DE 2".into(),
            "Nom".into(),
        ]);

        let outcome = run(
            &mut wb,
            &[SHEET_GOAL_DEV_TEMPLATES],
            &mut set,
            &mut LabelKeyTable::new(),
        );
        assert_eq!(outcome.changes, 2);

        let doc = set.get("Goals (7)").unwrap();
        assert!(doc.dirty);
        let tree = &doc.tree;
        let fd = tree.find_with_attr(DOC, "field-definition", "id", "name").unwrap();
        let labels = tree.children_named(fd, "field-label");
        assert_eq!(labels.len(), 3);
        // updated in place
        let de = labels
            .iter()
            .find(|l| tree.attr(**l, "lang") == Some("de_DE"))
            .unwrap();
        assert_eq!(tree.text(*de), "Name DE 2");
        // inserted after the last existing sibling of its kind
        assert_eq!(tree.attr(labels[2], "lang"), Some("fr_FR"));
        assert_eq!(tree.text(labels[2]), "Nom");
    }

    #[test]
    fn wide_default_column_updates_untagged_node() {
        let mut set = DocumentSet::new();
        set.insert(load_document(GOAL, "goal.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet(SHEET_GOAL_DEV_TEMPLATES, &wide_headers(&["de_DE"]));
        sheet.append(vec![
            "Manage Templates -> Goal Plan".into(),
            "Goals (7)".into(),
            "General Settings".into(),
            "Obj Plan Name (obj-plan-name)".into(),
            "Objectives".into(),
            "".into(),
            "".into(),
        ]);

        let outcome = run(
            &mut wb,
            &[SHEET_GOAL_DEV_TEMPLATES],
            &mut set,
            &mut LabelKeyTable::new(),
        );
        assert_eq!(outcome.changes, 1);
        let doc = set.get("Goals (7)").unwrap();
        let name = doc.tree.find("obj-plan-name").unwrap();
        assert_eq!(doc.tree.text(name), "Objectives");
    }

    #[test]
    fn msg_key_rows_route_to_key_table_only() {
        let pm = "<sf-form><sf-pmreview/>\
            <fm-element><fm-elt-label msgKey=\"K1\"/></fm-element>\
            </sf-form>";
        let mut set = DocumentSet::new();
        set.insert(load_document(pm, "Annual Form.xml", false).unwrap());
        let mut keys = LabelKeyTable::from_reader(
            "label_key,default,en_US,de_DE\nK1,en_US,Hello,Hallo\n".as_bytes(),
        )
        .unwrap();

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet(
            SHEET_PERFORMANCE_TEMPLATES,
            &wide_headers(&["en_US", "de_DE"]),
        );
        sheet.append(vec![
            "Manage Templates -> Performance Review".into(),
            "Annual Form".into(),
            "Element".into(),
            "Elt Label (fm-elt-label)".into(),
            "".into(),
            "K1".into(),
            "Hello".into(),
            "Servus".into(),
        ]);

        let outcome = run(&mut wb, &[SHEET_PERFORMANCE_TEMPLATES], &mut set, &mut keys);
        assert_eq!(outcome.changes, 1);
        assert!(outcome.keys_modified);
        assert_eq!(keys.label("K1", "de_DE"), Some("Servus"));
        assert_eq!(keys.label("K1", "en_US"), Some("Hello"));
        // document node untouched
        let doc = set.get("Annual Form").unwrap();
        assert!(!doc.dirty);
        assert!(wb
            .sheet(SHEET_PERFORMANCE_TEMPLATES)
            .unwrap()
            .cell(1, 8)
            .contains("FormLabelKeys"));
    }

    #[test]
    fn msg_key_missing_from_table_creates_entry() {
        let pm = "<sf-form><sf-pmreview/>\
            <fm-element><fm-elt-label msgKey=\"K9\"/></fm-element>\
            </sf-form>";
        let mut set = DocumentSet::new();
        set.insert(load_document(pm, "Annual Form.xml", false).unwrap());
        let mut keys = LabelKeyTable::new();

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet(SHEET_PERFORMANCE_TEMPLATES, &wide_headers(&["de_DE"]));
        sheet.append(vec![
            "Manage Templates -> Performance Review".into(),
            "Annual Form".into(),
            "Element".into(),
            "Elt Label (fm-elt-label)".into(),
            "".into(),
            "K9".into(),
            "Neu".into(),
        ]);

        let outcome = run(&mut wb, &[SHEET_PERFORMANCE_TEMPLATES], &mut set, &mut keys);
        assert!(outcome.keys_modified);
        assert!(keys.contains("K9"));
        assert_eq!(keys.label("K9", "de_DE"), Some("Neu"));
    }

    #[test]
    fn wide_form_section_rows_resolve_by_index() {
        let pm = "<sf-form><sf-pmreview/>\
            <objective-sect index=\"2\">\
            <sect-name>Goals Section</sect-name>\
            </objective-sect></sf-form>";
        let mut set = DocumentSet::new();
        set.insert(load_document(pm, "Annual Form.xml", false).unwrap());

        let mut wb = Workbook::new();
        let sheet = wb.add_sheet(SHEET_PERFORMANCE_TEMPLATES, &wide_headers(&["de_DE"]));
        sheet.append(vec![
            "Manage Templates -> Performance Review".into(),
            "Annual Form".into(),
            "Form Section: Objective (index=2)".into(),
            "Sect Name (sect-name)".into(),
            "Goals Section".into(),
            "".into(),
            "Zielabschnitt".into(),
        ]);

        let outcome = run(
            &mut wb,
            &[SHEET_PERFORMANCE_TEMPLATES],
            &mut set,
            &mut LabelKeyTable::new(),
        );
        assert_eq!(outcome.changes, 1);
        let doc = set.get("Annual Form").unwrap();
        let sect = doc.tree.find("objective-sect").unwrap();
        let names = doc.tree.children_named(sect, "sect-name");
        assert_eq!(names.len(), 2);
        assert_eq!(doc.tree.attr(names[1], "lang"), Some("de_DE"));
    }

    #[test]
    fn cancellation_aborts_before_any_sheet() {
        let mut set = DocumentSet::new();
        set.insert(load_document(SDM, "sdm.xml", false).unwrap());
        let mut wb = Workbook::new();
        wb.add_sheet("DataModel (de_DE)", &flat_headers("de_DE"));

        let token = CancelToken::new();
        token.cancel();
        let err = import_from_workbook(
            &mut wb,
            &["DataModel (de_DE)".to_string()],
            &mut set,
            &mut LabelKeyTable::new(),
            &token,
            |_, _| {},
        )
        .unwrap_err();
        assert!(confloc_core::is_cancelled(&err));
        assert!(!set.get("Succession Data Model").unwrap().dirty);
    }

    #[test]
    fn round_trip_of_unmodified_export_is_idempotent() {
        use confloc_export::{export_to_workbook, ExportOptions};

        let sdm = "<succession-data-model>\
            <field-def id=\"F1\" visibility=\"both\">\
            <label>Hello</label>\
            <label xml:lang=\"en_US\">Hello</label>\
            <label xml:lang=\"de_DE\">Hallo</label>\
            </field-def>\
            <hris-element id=\"el1\" visibility=\"both\">\
            <label xml:lang=\"en_US\">Element</label>\
            </hris-element>\
            </succession-data-model>";
        let mut set = DocumentSet::new();
        set.insert(load_document(sdm, "sdm.xml", false).unwrap());
        set.insert(load_document(GOAL, "goal.xml", false).unwrap());

        let languages = vec!["en_US".to_string(), "de_DE".to_string()];
        let keys = LabelKeyTable::new();
        let (mut wb, _) = export_to_workbook(
            &set,
            &languages,
            &keys,
            &ExportOptions::default(),
            &CancelToken::new(),
            |_, _| {},
        )
        .unwrap();

        let sheets = wb.sheet_names();
        let mut keys = keys;
        let outcome = import_from_workbook(
            &mut wb,
            &sheets,
            &mut set,
            &mut keys,
            &CancelToken::new(),
            |_, _| {},
        )
        .unwrap();

        assert_eq!(outcome.changes, 0, "log: {:?}", outcome.log);
        assert!(set.dirty_docs().next().is_none());
        assert!(!outcome.keys_modified);
    }
}
