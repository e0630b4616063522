//! Human-readable section paths for translatable nodes, and the inverse
//! mapping that recovers a tag-name hint from an exported path string.
//!
//! Forward resolution dispatches on the owning parent's tag name; the
//! inverse is intentionally lossy and recovers only what the import engine
//! needs to re-locate a node.

use confloc_model::{DocKind, EMPLOYEE_PROFILE_TAGS};
use confloc_parsers_xml::{NodeId, Tree};

/// Marker prefix for rows that are nested children of the preceding row.
pub const CHILD_CHAR: &str = " \u{21aa} ";

/// Resolved location of a translatable node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPath {
    pub section: String,
    pub subsection: String,
    pub country: Option<String>,
    /// Set when a country allow-list is active and the node's country is
    /// not on it; the export engine drops the node entirely.
    pub skip: bool,
}

/// Tag-name hint recovered from a path string, plus the attribute filter
/// parsed from its rightmost `(attr=value)` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub tag_hint: String,
    pub attr_hint: Option<(String, String)>,
}

/// Resolve the section path of translatable `node` inside a document named
/// `doc_name` of the given `kind`.
pub fn resolve(
    tree: &Tree,
    node: NodeId,
    doc_name: &str,
    kind: DocKind,
    active_countries: &[String],
) -> SectionPath {
    let parent = match tree.parent(node) {
        Some(p) => p,
        None => {
            return SectionPath {
                section: doc_name.to_string(),
                subsection: String::new(),
                country: None,
                skip: false,
            }
        }
    };
    let parent_name = tree.name(parent).to_string();
    let grand = tree.parent(parent);

    if EMPLOYEE_PROFILE_TAGS.contains(&parent_name.as_str()) {
        let mut section = "Employee Profile".to_string();
        if let Some(g) = grand {
            if tree.name(g) == "background-element" {
                if let Some(id) = tree.attr(g, "id") {
                    section = format!("Employee Profile ({id})");
                }
            }
        }
        return SectionPath {
            section,
            subsection: parent_name,
            country: None,
            skip: false,
        };
    }

    if parent_name.starts_with("hris") || parent_name == "format" {
        if kind.has_country_fields() {
            let country = country_of(tree, parent, grand);
            let skip = match (&country, active_countries.is_empty()) {
                (_, true) => false,
                (Some(code), false) => !active_countries.iter().any(|c| c == code),
                (None, false) => true,
            };
            let section = format!(
                "{} ({})",
                doc_name,
                country.as_deref().unwrap_or_default()
            );
            return SectionPath {
                section,
                subsection: parent_name,
                country,
                skip,
            };
        }
        return SectionPath {
            section: doc_name.to_string(),
            subsection: parent_name,
            country: None,
            skip: false,
        };
    }

    // Flat documents keep the raw tag name so import can re-locate the
    // node directly; template sheets get the readable module names.
    let subsection = if kind.is_template() {
        module_name(tree, parent)
    } else {
        parent_name
    };
    SectionPath {
        section: doc_name.to_string(),
        subsection,
        country: None,
        skip: false,
    }
}

/// Country id found by walking up through the format/HRIS ancestry to the
/// enclosing `country` node.
fn country_of(tree: &Tree, parent: NodeId, grand: Option<NodeId>) -> Option<String> {
    let parent_name = tree.name(parent);
    let grand = grand?;
    let grand_name = tree.name(grand);

    let holder = if grand_name == "hris-section" {
        tree.parent(grand).and_then(|p| tree.parent(p))
    } else if grand_name == "hris-element" || grand_name == "format-group" {
        tree.parent(grand)
    } else if parent_name == "hris-element" || parent_name == "format-group" {
        Some(grand)
    } else {
        None
    }?;
    tree.attr(holder, "id").map(str::to_string)
}

/// Module/section display name for a wide-sheet parent node.
pub fn module_name(tree: &Tree, parent: NodeId) -> String {
    let name = tree.name(parent).to_string();
    let attr = |key: &str| tree.attr(parent, key).unwrap_or_default().to_string();

    match name.as_str() {
        "obj-plan-template" => "General Settings".to_string(),
        "text-replacement" => format!("{} (for={})", readable_name(&name, false), attr("for")),
        "permission" => format!("Permission (for={})", attr("for")),
        "field-permission" => format!("Field Permission (type={})", attr("type")),
        "field-definition" => format!("Field Definition (id={})", attr("id")),
        "table-column" => format!("{CHILD_CHAR}Table Column (id={})", attr("id")),
        "enum-value" => format!("{CHILD_CHAR}Field Option (value={})", attr("value")),
        "fm-sect-config" => format!("{CHILD_CHAR}Section Configuration"),
        "scale-map-value" => "Scale Adjusted Calculation Mapping".to_string(),
        "fm-competency" => match tree.find_descendant(parent, "fm-comp-id") {
            Some(id_node) => {
                format!("{CHILD_CHAR}Competency (id={})", tree.text(id_node).trim())
            }
            None => readable_name(&name, false),
        },
        _ if name.contains("category") => {
            format!("{} (id={})", readable_name(&name, false), attr("id"))
        }
        _ if name.ends_with("-sect") => form_section_name(tree, parent, &name),
        _ => readable_name(&name, false),
    }
}

fn form_section_name(tree: &Tree, parent: NodeId, parent_name: &str) -> String {
    let index = tree.attr(parent, "index").unwrap_or_default().to_string();
    // fm-sect is a generic wrapper; the real section kind is its parent.
    let sect_tag_name = if parent_name == "fm-sect" {
        tree.parent(parent)
            .map(|g| tree.name(g).to_string())
            .unwrap_or_else(|| parent_name.to_string())
    } else {
        parent_name.to_string()
    };

    let prefix = capitalize(sect_tag_name.split('-').next().unwrap_or(&sect_tag_name));

    match sect_tag_name.as_str() {
        "objective-sect" => {
            if let Some(plan_id) = tree.find_descendant(parent, "obj-sect-plan-id") {
                return format!(
                    "Form Section: {prefix} (plan-id={})(index={index})",
                    tree.text(plan_id).trim()
                );
            }
            format!("Form Section: {prefix} (index={index})")
        }
        "objcomp-summary-sect" => {
            let x = tree.find_descendant(parent, "x-axis");
            let y = tree.find_descendant(parent, "y-axis");
            match (x, y) {
                (Some(x), Some(y)) => format!(
                    "Form Section: {}(x) vs {}(y) Summary (index={index})",
                    capitalize(tree.text(x).trim()),
                    capitalize(tree.text(y).trim())
                ),
                _ => format!("Form Section: Objective vs Competency Summary (index={index})"),
            }
        }
        "perfpot-summary-sect" => {
            format!("Form Section: Performance-Potential Summary (index={index})")
        }
        _ => format!("Form Section: {prefix} (index={index})"),
    }
}

/// Hyphenated tag name rendered as words, expanding a fixed set of
/// abbreviation tokens.
pub fn readable_name(tag_name: &str, include_tag_name: bool) -> String {
    let words: Vec<String> = tag_name
        .split('-')
        .filter_map(|word| match word {
            "sect" => Some("Section".to_string()),
            "intro" => Some("Introduction".to_string()),
            "comp" => Some("Competency".to_string()),
            "fm" => None,
            other => Some(capitalize(other)),
        })
        .collect();
    let readable = words.join(" ");
    if include_tag_name {
        format!("{readable} ({tag_name})")
    } else {
        readable
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Recover a tag-name hint (and the rightmost `(attr=value)` filter) from a
/// section or item path string produced by [`resolve`]/[`module_name`].
pub fn derive_locator(path: &str) -> Locator {
    let mut s = path.trim().to_string();

    if let Some(pos) = s.find(CHILD_CHAR) {
        s = s[pos + CHILD_CHAR.len()..].to_string();
    }

    // Peel trailing "(attr=value)" groups; the rightmost one is the filter.
    let mut attr_hint: Option<(String, String)> = None;
    loop {
        let trimmed = s.trim_end();
        if !trimmed.ends_with(')') {
            s = trimmed.to_string();
            break;
        }
        let open = match trimmed.rfind('(') {
            Some(i) => i,
            None => {
                s = trimmed.to_string();
                break;
            }
        };
        let inner = &trimmed[open + 1..trimmed.len() - 1];
        let Some((key, value)) = inner.split_once('=') else {
            s = trimmed.to_string();
            break;
        };
        if attr_hint.is_none() {
            attr_hint = Some((key.trim().to_string(), value.trim().to_string()));
        }
        s = trimmed[..open].to_string();
    }
    let s = s.trim().to_string();

    let tag_hint = match s.as_str() {
        "Field Option" => "enum-value".to_string(),
        "Competency" => "fm-competency".to_string(),
        "Section Configuration" => "fm-sect-config".to_string(),
        "Scale Adjusted Calculation Mapping" => "scale-map-value".to_string(),
        "Form Section: Performance-Potential Summary" => "perfpot-summary-sect".to_string(),
        _ if s.contains("(x) vs ") => "objcomp-summary-sect".to_string(),
        _ if s.starts_with("Form Section:") => {
            let rest = s["Form Section:".len()..].trim().to_lowercase();
            format!("{rest}-sect")
        }
        _ => s
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-"),
    };

    Locator { tag_hint, attr_hint }
}
