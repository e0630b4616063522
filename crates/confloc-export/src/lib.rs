//! Export engine: walks every loaded document's translatable nodes and
//! emits workbook rows — flat per-language sheets for field-definition
//! documents, wide per-template sheets for form templates.

use std::sync::OnceLock;

use confloc_core::{CancelToken, ConflocError, Result};
use confloc_keys::LabelKeyTable;
use confloc_model::{
    default_label, lang_child, lang_eq, missing_langs, ConfigDocument, DocKind, DocumentSet,
    HIGHLIGHT_TAGS, IGNORED_PARENT_TAGS,
};
use confloc_parsers_xml::{NodeId, Tree, DOC};
use confloc_resolve::{readable_name, resolve};
use confloc_workbook::{
    flat_sheet_name, lang_header, Workbook, FLAT_SHEET_PREFIX, SHEET_GOAL_DEV_TEMPLATES,
    SHEET_PERFORMANCE_TEMPLATES,
};
use regex::Regex;

const FLAT_BASE_HEADERS: &[&str] = &["Section", "Element/Subsection", "Field Id", "Default Label"];

const WIDE_BASE_HEADERS: &[&str] = &[
    "Translation Type",
    "Template Name",
    "Section/Element/Subsection",
    "Translatable Item/Field",
    "Default Label",
    "Label Key",
];

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Strip embedded markup tags from exported labels.
    pub remove_markup: bool,
    /// Country allow-list; empty means no filtering.
    pub active_countries: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExportStats {
    pub rows_exported: usize,
    pub sheets_created: usize,
}

/// Build the translation workbook for every non-standard document in the
/// set. `languages[0]` is the system default language.
pub fn export_to_workbook(
    set: &DocumentSet,
    languages: &[String],
    keys: &LabelKeyTable,
    options: &ExportOptions,
    cancel: &CancelToken,
    mut progress: impl FnMut(u8, &str),
) -> Result<(Workbook, ExportStats)> {
    if languages.is_empty() {
        return Err(ConflocError::Other("no languages selected for export".into()).into());
    }
    let system_default = languages[0].clone();

    let mut workbook = Workbook::new();
    if set.has_template_documents() {
        let mut headers: Vec<String> = WIDE_BASE_HEADERS.iter().map(|h| h.to_string()).collect();
        headers.extend(languages.iter().map(|l| lang_header(l)));
        workbook.add_sheet(SHEET_PERFORMANCE_TEMPLATES, &headers);
        workbook.add_sheet(SHEET_GOAL_DEV_TEMPLATES, &headers);
    }
    if set.has_flat_documents() {
        workbook.create_lang_sheets(FLAT_SHEET_PREFIX, languages, FLAT_BASE_HEADERS);
    }

    let mut stats = ExportStats::default();
    progress(0, "Extracting document translations...");

    let docs: Vec<&ConfigDocument> = set.active_docs().collect();
    let total = docs.len().max(1);
    for (i, doc) in docs.iter().enumerate() {
        cancel.check()?;
        if doc.kind.is_template() {
            export_template(doc, set, languages, keys, options, &mut workbook, &mut stats);
        } else {
            export_flat(
                doc,
                set,
                languages,
                &system_default,
                options,
                &mut workbook,
                &mut stats,
            );
        }
        let percent = (((i + 1) * 100) / total) as u8;
        progress(percent, &format!("Extracted '{}'", doc.name));
    }

    stats.sheets_created = workbook.sheets.len();
    progress(100, "Export complete!");
    Ok((workbook, stats))
}

fn translatable_nodes(doc: &ConfigDocument, set: &DocumentSet) -> Vec<NodeId> {
    doc.tree
        .collect_named(DOC, |name| set.translatable_tags().contains(name))
}

/// Node skipped when its parent is hidden or wraps ignored structures.
fn skip_parent(tree: &Tree, parent: NodeId) -> bool {
    tree.attr(parent, "visibility") == Some("none")
        || IGNORED_PARENT_TAGS.contains(&tree.name(parent))
}

fn export_flat(
    doc: &ConfigDocument,
    set: &DocumentSet,
    languages: &[String],
    system_default: &str,
    options: &ExportOptions,
    workbook: &mut Workbook,
    stats: &mut ExportStats,
) {
    let tree = &doc.tree;
    let standard = set.get(&confloc_model::standard_name_for(&doc.name));
    let mut prev_parent: Option<NodeId> = None;

    for node in translatable_nodes(doc, set) {
        let Some(parent) = tree.parent(node) else {
            continue;
        };
        if skip_parent(tree, parent) {
            continue;
        }
        let path = resolve(tree, node, &doc.name, doc.kind, &options.active_countries);
        if path.skip {
            continue;
        }

        let parent_name = tree.name(parent).to_string();
        let parent_id = tree.attr(parent, "id").unwrap_or_default().to_string();
        let mut label = default_label(tree, node, false, true, system_default);
        if options.remove_markup {
            label = strip_markup(&label);
        }
        let highlight = HIGHLIGHT_TAGS.contains(&parent_name.as_str());

        // On entering a new parent, fan out one row per missing language,
        // with the standard reference document as the fallback source.
        if prev_parent != Some(parent) {
            for missing in missing_langs(tree, parent, languages) {
                let standard_label = standard
                    .and_then(|std| {
                        lookup_standard_label(&std.tree, &parent_name, &parent_id, &missing)
                    })
                    .unwrap_or_default();
                append_flat_row(
                    workbook,
                    &missing,
                    vec![
                        path.section.clone(),
                        path.subsection.clone(),
                        parent_id.clone(),
                        label.clone(),
                        standard_label,
                    ],
                    highlight,
                    stats,
                );
            }
            prev_parent = Some(parent);
        }

        if let Some(lang) = tree.attr(node, "xml:lang") {
            let mut text = tree.text(node).to_string();
            if options.remove_markup {
                text = strip_markup(&text);
            }
            append_flat_row(
                workbook,
                lang,
                vec![
                    path.section.clone(),
                    path.subsection.clone(),
                    parent_id.clone(),
                    label.clone(),
                    text,
                ],
                highlight,
                stats,
            );
        }
    }
}

fn append_flat_row(
    workbook: &mut Workbook,
    lang: &str,
    cells: Vec<String>,
    highlight: bool,
    stats: &mut ExportStats,
) {
    let Some(sheet) = workbook.sheet_mut(&flat_sheet_name(lang)) else {
        return;
    };
    if highlight {
        sheet.append_bold(cells);
    } else {
        sheet.append(cells);
    }
    stats.rows_exported += 1;
}

fn lookup_standard_label(
    standard: &Tree,
    parent_name: &str,
    parent_id: &str,
    lang: &str,
) -> Option<String> {
    let node = if parent_id.is_empty() {
        standard.find_where(DOC, |n| {
            standard.name(n) == parent_name && standard.attr(n, "id").is_none()
        })
    } else {
        standard.find_with_attr(DOC, parent_name, "id", parent_id)
    }?;
    let label = lang_child(standard, node, "label", lang)?;
    Some(standard.text(label).to_string())
}

#[allow(clippy::too_many_arguments)]
fn export_template(
    doc: &ConfigDocument,
    set: &DocumentSet,
    languages: &[String],
    keys: &LabelKeyTable,
    options: &ExportOptions,
    workbook: &mut Workbook,
    stats: &mut ExportStats,
) {
    let tree = &doc.tree;
    let (sheet_name, feature) = match doc.kind {
        DocKind::PerformanceFormTemplate => (
            SHEET_PERFORMANCE_TEMPLATES,
            "Manage Templates -> Performance Review",
        ),
        DocKind::DevelopmentPlanTemplate => {
            (SHEET_GOAL_DEV_TEMPLATES, "Manage Templates -> Development")
        }
        _ => (SHEET_GOAL_DEV_TEMPLATES, "Manage Templates -> Goal Plan"),
    };
    let is_performance = doc.kind == DocKind::PerformanceFormTemplate;

    let nodes = translatable_nodes(doc, set);
    let mut prev: Option<(NodeId, String)> = None;
    let mut first_row = true;

    for node in nodes {
        let Some(parent) = tree.parent(node) else {
            continue;
        };
        if skip_parent(tree, parent) {
            continue;
        }
        let tag_name = tree.name(node).to_string();
        if prev.as_ref() == Some(&(parent, tag_name.clone())) {
            continue;
        }
        prev = Some((parent, tag_name.clone()));

        let path = resolve(tree, node, &doc.name, doc.kind, &options.active_countries);
        if path.skip {
            continue;
        }

        if is_performance && first_row {
            let Some(sheet) = workbook.sheet_mut(sheet_name) else {
                return;
            };
            sheet.append(vec![
                feature.to_string(),
                doc.name.clone(),
                "General Settings".to_string(),
                "Form Name".to_string(),
                doc.name.clone(),
                String::new(),
            ]);
            stats.rows_exported += 1;
        }
        first_row = false;

        let mut label = default_label(tree, node, false, true, languages[0].as_str());
        if options.remove_markup {
            label = strip_markup(&label);
        }
        let field = readable_name(&tag_name, true);

        let msg_key = tree
            .attr(node, "msgKey")
            .or_else(|| tree.attr(node, "msgkey"))
            .map(str::to_string);
        let key_cell = match &msg_key {
            Some(key) if keys.contains(key) => key.clone(),
            Some(key) => {
                tracing::debug!(event = "label_key_missing", key = %key, template = %doc.name);
                format!("{key} - CONFIG ERROR (referred but missing in FormLabelKeys CSV)")
            }
            None => String::new(),
        };

        let mut cells = vec![
            feature.to_string(),
            doc.name.clone(),
            path.subsection.clone(),
            field,
            label,
            key_cell,
        ];
        for lang in languages {
            let inline = tree.child_where(parent, |c| {
                tree.attr(c, "lang")
                    .map(|l| lang_eq(l, lang))
                    .unwrap_or(false)
            });
            let mut value = match inline {
                Some(sibling) => tree.text(sibling).to_string(),
                None => msg_key
                    .as_deref()
                    .and_then(|key| keys.label(key, lang))
                    .unwrap_or_default()
                    .to_string(),
            };
            if options.remove_markup {
                value = strip_markup(&value);
            }
            cells.push(value);
        }

        let Some(sheet) = workbook.sheet_mut(sheet_name) else {
            return;
        };
        sheet.append(cells);
        stats.rows_exported += 1;
    }
}

/// Remove embedded markup tags from a label when both an opening and a
/// closing tag are present.
pub fn strip_markup(value: &str) -> String {
    if !(value.contains('<') && value.contains("</")) {
        return value.to_string();
    }
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    let re = MARKUP.get_or_init(|| Regex::new(r"</?[^<>]+>").unwrap());
    re.replace_all(value, "").into_owned()
}
