//! Configuration document model: classification, derived display names,
//! the translatable-tag heuristic, label lookup chains and the registry
//! shared by the export and import engines.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use confloc_core::{ConflocError, Result, STANDARD_PREFIX};
use confloc_parsers_xml::{NodeId, Tree, DOC};

/// Parents whose translatable children belong to the employee profile.
pub const EMPLOYEE_PROFILE_TAGS: &[&str] = &[
    "standard-element",
    "background-element",
    "userinfo-element",
    "data-field",
    "rating-field",
    "tab-element",
    "view-template",
    "edit-template",
];

/// Parents whose translatable children are never exported.
pub const IGNORED_PARENT_TAGS: &[&str] = &[
    "tab-element",
    "view-template",
    "edit-template",
    "fm-competency",
    "permission",
];

/// Parents whose rows are written bold; import treats them as anchors.
pub const HIGHLIGHT_TAGS: &[&str] = &[
    "succession-data-model",
    "background-element",
    "userinfo-element",
    "hris-element",
    "hris-section",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKind {
    SuccessionModel,
    SuccessionModelWithCountryFields,
    CorporateModel,
    CorporateModelWithCountryFields,
    PerformanceFormTemplate,
    GoalPlanTemplate,
    DevelopmentPlanTemplate,
    Unknown,
}

impl DocKind {
    /// Wide-sheet template documents (one column per language).
    pub fn is_template(self) -> bool {
        matches!(
            self,
            DocKind::PerformanceFormTemplate
                | DocKind::GoalPlanTemplate
                | DocKind::DevelopmentPlanTemplate
        )
    }

    /// Flat-sheet documents (one sheet per language).
    pub fn is_flat(self) -> bool {
        !self.is_template() && self != DocKind::Unknown
    }

    /// Documents whose section paths are country-qualified.
    pub fn has_country_fields(self) -> bool {
        self == DocKind::CorporateModelWithCountryFields
    }
}

/// Order-sensitive, marker-based classification.
pub fn classify(tree: &Tree) -> DocKind {
    if tree.find("succession-data-model").is_some() {
        if tree.find("hris-element").is_some() {
            return DocKind::SuccessionModelWithCountryFields;
        }
        return DocKind::SuccessionModel;
    }
    if tree.find("country-specific-fields").is_some() {
        return DocKind::CorporateModelWithCountryFields;
    }
    if tree.find("corporate-data-model").is_some() {
        return DocKind::CorporateModel;
    }
    if tree.find("sf-form").is_some() && tree.find("sf-pmreview").is_some() {
        return DocKind::PerformanceFormTemplate;
    }
    if tree.find("obj-plan-template").is_some() {
        let plan_type = tree.find("obj-plan-type").map(|n| tree.text(n).trim().to_string());
        if plan_type.as_deref() == Some("Development") {
            return DocKind::DevelopmentPlanTemplate;
        }
        return DocKind::GoalPlanTemplate;
    }
    DocKind::Unknown
}

/// Derived display name; identity key in the registry. Flat kinds stay
/// paren-free so import can strip a trailing `(<country>)` qualifier.
pub fn derive_name(tree: &Tree, kind: DocKind, file_name: &str) -> Option<String> {
    match kind {
        DocKind::SuccessionModel => Some("Succession Data Model".to_string()),
        DocKind::SuccessionModelWithCountryFields => {
            Some("Extended Succession Data Model".to_string())
        }
        DocKind::CorporateModel => Some("Corporate Data Model".to_string()),
        DocKind::CorporateModelWithCountryFields => {
            if tree.find("format-group").is_some() {
                Some("CSF Succession Data Model".to_string())
            } else {
                Some("CSF Corporate Data Model".to_string())
            }
        }
        DocKind::PerformanceFormTemplate => {
            let stem = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
            Some(stem.strip_suffix(".xml").unwrap_or(stem).to_string())
        }
        DocKind::GoalPlanTemplate | DocKind::DevelopmentPlanTemplate => {
            let name_node = tree.find("obj-plan-name")?;
            let id_node = tree.find("obj-plan-id")?;
            let mut title = default_label(tree, name_node, false, false, "en_US");
            if title.is_empty() {
                title = tree.text(name_node).trim().to_string();
            }
            Some(format!("{} ({})", title, tree.text(id_node).trim()))
        }
        DocKind::Unknown => None,
    }
}

/// Registry name under which the standard reference of `name` is stored.
pub fn standard_name_for(name: &str) -> String {
    format!("{STANDARD_PREFIX} {name}")
}

/// The translatable-tag naming heuristic.
pub fn is_translatable_name(name: &str) -> bool {
    if name == "role-name" || name == "meta-grp-label" {
        return false;
    }
    matches!(
        name,
        "instruction" | "label" | "text" | "default-rating" | "unrated-rating"
    ) || name.ends_with("-name")
        || name.ends_with("-label")
        || name.ends_with("-intro")
        || name.ends_with("-desc")
}

/// Distinct translatable tag names present in the document, document order.
pub fn translatable_tag_names(tree: &Tree) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for id in tree.descendants(DOC) {
        let name = tree.name(id);
        if is_translatable_name(name) {
            names.insert(name.to_string());
        }
    }
    names
}

/// Language codes compare with `-` and `_` interchangeable.
pub fn lang_eq(a: &str, b: &str) -> bool {
    a.replace('-', "_") == b.replace('-', "_")
}

/// The node's language tag, from either attribute spelling.
pub fn node_lang<'a>(tree: &'a Tree, id: NodeId) -> Option<&'a str> {
    tree.attr(id, "xml:lang").or_else(|| tree.attr(id, "lang"))
}

/// Direct child of `parent` named `name` carrying `xml:lang` equal to `lang`.
pub fn lang_child(tree: &Tree, parent: NodeId, name: &str, lang: &str) -> Option<NodeId> {
    tree.child_where(parent, |c| {
        tree.name(c) == name
            && tree
                .attr(c, "xml:lang")
                .map(|l| lang_eq(l, lang))
                .unwrap_or(false)
    })
}

/// Languages with no `xml:lang`-tagged child under `parent`.
pub fn missing_langs(tree: &Tree, parent: NodeId, all_langs: &[String]) -> Vec<String> {
    all_langs
        .iter()
        .filter(|lang| {
            tree.child_where(parent, |c| {
                tree.attr(c, "xml:lang")
                    .map(|l| lang_eq(l, lang))
                    .unwrap_or(false)
            })
            .is_none()
        })
        .cloned()
        .collect()
}

/// Default display label for a node, via the fallback chain: untagged child,
/// then the authored `en_US` default, then the system default language.
///
/// With `label_on_parent` the scan covers the node's same-named siblings
/// (the node itself included), which is how exported rows title the owning
/// field rather than the label node.
pub fn default_label(
    tree: &Tree,
    node: NodeId,
    prefer_en_us: bool,
    label_on_parent: bool,
    system_default: &str,
) -> String {
    let (scope, name_filter) = if label_on_parent {
        match tree.parent(node) {
            Some(p) => (p, Some(tree.name(node).to_string())),
            None => (node, None),
        }
    } else {
        (node, None)
    };

    let mut untagged: Option<String> = None;
    let mut english: Option<String> = None;
    let mut system: Option<String> = None;

    for child in tree.element_children(scope) {
        if let Some(filter) = &name_filter {
            if tree.name(child) != filter {
                continue;
            }
        }
        let has = |key: &str| tree.attr(child, key).is_some();
        if !has("xml:lang") && !has("lang") && !has("id") && !has("rule") && untagged.is_none() {
            untagged = Some(tree.text(child).to_string());
        }
        if let Some(lang) = node_lang(tree, child) {
            if lang_eq(lang, "en_US") && english.is_none() {
                english = Some(tree.text(child).to_string());
            }
            if lang_eq(lang, system_default) && system.is_none() {
                system = Some(tree.text(child).to_string());
            }
        }
    }

    let mut label = if prefer_en_us {
        english.or(untagged)
    } else {
        untagged.or(english)
    }
    .or(system)
    .unwrap_or_default();

    if name_filter.as_deref() == Some("mapto-desc") {
        if let Some(score) = tree
            .child_where(scope, |c| tree.name(c) == "mapto-score")
            .map(|n| tree.text(n).trim().to_string())
        {
            label = format!("{label} (for score={score})");
        }
    }

    if label.is_empty() {
        let tag_name = tree.name(node);
        if let Some(id) = tree.attr(node, "id") {
            label = format!("{tag_name} ({id})");
        } else if let Some(for_attr) = tree.attr(node, "for") {
            label = format!("{tag_name} ({for_attr})");
        }
    }

    label
}

/// Distinct `xml:lang` codes on `label` nodes, in document order.
pub fn extract_languages(tree: &Tree) -> Vec<String> {
    let mut langs: Vec<String> = Vec::new();
    for id in tree.descendants(DOC) {
        if tree.name(id) == "label" {
            if let Some(lang) = tree.attr(id, "xml:lang") {
                if !langs.iter().any(|l| l == lang) {
                    langs.push(lang.to_string());
                }
            }
        }
    }
    langs
}

/// A parsed, classified configuration document.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    pub name: String,
    pub kind: DocKind,
    pub is_standard: bool,
    pub tree: Tree,
    pub languages: Vec<String>,
    pub dirty: bool,
    pub source_file: Option<PathBuf>,
}

/// Parse and classify raw document content. Unclassifiable content is an
/// error the caller reports as a skipped file.
pub fn load_document(raw: &str, file_name: &str, is_standard: bool) -> Result<ConfigDocument> {
    let tree = Tree::parse(raw)?;
    let kind = classify(&tree);
    let mut name = derive_name(&tree, kind, file_name)
        .ok_or_else(|| ConflocError::Unclassified(file_name.to_string()))?;
    if is_standard {
        name = standard_name_for(&name);
    }
    let languages = extract_languages(&tree);
    Ok(ConfigDocument {
        name,
        kind,
        is_standard,
        tree,
        languages,
        dirty: false,
        source_file: None,
    })
}

/// Load-ordered registry of documents plus the merged translatable-tag set.
/// Owned by the caller and passed explicitly to both engines.
#[derive(Debug, Default)]
pub struct DocumentSet {
    docs: Vec<ConfigDocument>,
    index: HashMap<String, usize>,
    translatable_tags: BTreeSet<String>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under its derived name. A later document with the
    /// same name replaces the earlier one (last wins).
    pub fn insert(&mut self, doc: ConfigDocument) {
        self.translatable_tags
            .extend(translatable_tag_names(&doc.tree));
        if let Some(&i) = self.index.get(&doc.name) {
            tracing::warn!(
                event = "document_name_collision",
                name = %doc.name,
                previous = ?self.docs[i].source_file,
                replacement = ?doc.source_file,
                "replacing previously loaded document with the same derived name"
            );
            self.docs[i] = doc;
        } else {
            self.index.insert(doc.name.clone(), self.docs.len());
            self.docs.push(doc);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConfigDocument> {
        self.index.get(name).map(|&i| &self.docs[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ConfigDocument> {
        let i = *self.index.get(name)?;
        Some(&mut self.docs[i])
    }

    pub fn docs(&self) -> &[ConfigDocument] {
        &self.docs
    }

    /// Loaded documents excluding standard references, in load order.
    pub fn active_docs(&self) -> impl Iterator<Item = &ConfigDocument> {
        self.docs.iter().filter(|d| !d.is_standard)
    }

    pub fn dirty_docs(&self) -> impl Iterator<Item = &ConfigDocument> {
        self.docs.iter().filter(|d| d.dirty)
    }

    pub fn translatable_tags(&self) -> &BTreeSet<String> {
        &self.translatable_tags
    }

    pub fn has_template_documents(&self) -> bool {
        self.active_docs().any(|d| d.kind.is_template())
    }

    pub fn has_flat_documents(&self) -> bool {
        self.active_docs().any(|d| d.kind.is_flat())
    }

    /// Distinct languages across all non-standard documents, load order.
    pub fn all_languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = Vec::new();
        for doc in self.active_docs() {
            for lang in &doc.languages {
                if !langs.iter().any(|l| l == lang) {
                    langs.push(lang.clone());
                }
            }
        }
        langs
    }
}
