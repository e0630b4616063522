//! Mutable XML document tree backed by an index arena.
//!
//! Nodes are addressed by [`NodeId`] handles with explicit parent and
//! ordered-children links, so the import engine can walk up through
//! ancestors and splice in new label nodes without reference-counted
//! object graphs. Parsing and serialization go through quick-xml events.

use confloc_core::{ConflocError, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Virtual document node; its children are the root element plus any
/// top-level comments.
pub const DOC: NodeId = NodeId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Comment,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    cdata: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, name: &str) -> Self {
        Node {
            kind,
            name: name.to_string(),
            attrs: Vec::new(),
            text: String::new(),
            cdata: false,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// How the raw content was parsed. Lenient mode is selected when the raw
/// bytes carry embedded character-data blocks and relaxes end-name checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Lenient,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    doctype: Option<String>,
    mode: ParseMode,
}

impl Tree {
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node::new(NodeKind::Document, "")],
            doctype: None,
            mode: ParseMode::Strict,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mode = if raw.contains("<![CDATA[") {
            ParseMode::Lenient
        } else {
            ParseMode::Strict
        };
        Self::parse_with_mode(raw, mode)
    }

    pub fn parse_with_mode(raw: &str, mode: ParseMode) -> Result<Self> {
        let mut reader = Reader::from_str(raw);
        reader.config_mut().trim_text(true);
        if mode == ParseMode::Lenient {
            reader.config_mut().check_end_names = false;
        }

        let mut tree = Tree::new();
        tree.mode = mode;
        let mut stack: Vec<NodeId> = vec![DOC];

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = tree.alloc_element_from(&e)?;
                    let top = *stack.last().expect("stack never empty");
                    tree.push_child(top, id);
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    let id = tree.alloc_element_from(&e)?;
                    let top = *stack.last().expect("stack never empty");
                    tree.push_child(top, id);
                }
                Ok(Event::End(_)) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Ok(Event::Text(t)) => {
                    let top = *stack.last().expect("stack never empty");
                    if top != DOC {
                        let txt = t.unescape().unwrap_or_else(|_| {
                            std::borrow::Cow::Owned(
                                String::from_utf8_lossy(t.as_ref()).into_owned(),
                            )
                        });
                        tree.nodes[top.0].text.push_str(&txt);
                    }
                }
                Ok(Event::CData(c)) => {
                    let top = *stack.last().expect("stack never empty");
                    if top != DOC {
                        let txt = String::from_utf8_lossy(c.as_ref()).into_owned();
                        tree.nodes[top.0].text.push_str(&txt);
                        tree.nodes[top.0].cdata = true;
                    }
                }
                Ok(Event::Comment(c)) => {
                    let txt = String::from_utf8_lossy(c.as_ref()).into_owned();
                    let id = tree.alloc(Node::new(NodeKind::Comment, ""));
                    tree.nodes[id.0].text = txt;
                    let top = *stack.last().expect("stack never empty");
                    tree.push_child(top, id);
                }
                Ok(Event::DocType(d)) => {
                    tree.doctype = Some(String::from_utf8_lossy(d.as_ref()).into_owned());
                }
                Ok(Event::Decl(_) | Event::PI(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(ConflocError::Xml(e.to_string()).into()),
            }
        }

        if tree.root().is_none() {
            return Err(ConflocError::Xml("document has no root element".into()).into());
        }
        Ok(tree)
    }

    fn alloc_element_from(&mut self, e: &BytesStart<'_>) -> Result<NodeId> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let id = self.alloc(Node::new(NodeKind::Element, &name));
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|e| ConflocError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ConflocError::Xml(e.to_string()))?
                .into_owned();
            self.nodes[id.0].attrs.push((key, value));
        }
        Ok(id)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// The document's root element.
    pub fn root(&self) -> Option<NodeId> {
        self.nodes[DOC.0]
            .children
            .iter()
            .copied()
            .find(|id| self.is_element(*id))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.nodes[id.0].kind == NodeKind::Element
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.0].text
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].text = text.to_string();
    }

    pub fn set_cdata(&mut self, id: NodeId, cdata: bool) {
        self.nodes[id.0].cdata = cdata;
    }

    pub fn attr<'a>(&'a self, id: NodeId, key: &str) -> Option<&'a str> {
        self.nodes[id.0]
            .attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let Some(pair) = self.nodes[id.0].attrs.iter_mut().find(|(k, _)| k == key) {
            pair.1 = value.to_string();
        } else {
            self.nodes[id.0].attrs.push((key.to_string(), value.to_string()));
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Element children only, in document order.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    pub fn new_element(&mut self, name: &str) -> NodeId {
        self.alloc(Node::new(NodeKind::Element, name))
    }

    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` at `index` among `parent`'s children, clamped to the
    /// current child count.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        let len = self.nodes[parent.0].children.len();
        self.nodes[parent.0].children.insert(index.min(len), child);
    }

    /// Insert `child` directly after `anchor` under the anchor's parent.
    pub fn insert_after(&mut self, anchor: NodeId, child: NodeId) {
        let parent = self.nodes[anchor.0].parent.expect("anchor has a parent");
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == anchor)
            .expect("anchor is a child of its parent");
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(pos + 1, child);
    }

    /// Pre-order walk of the element descendants of `from` (excluded).
    pub fn descendants(&self, from: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = Vec::new();
        for child in self.nodes[from.0].children.iter().rev() {
            stack.push(*child);
        }
        Descendants { tree: self, stack }
    }

    /// First descendant element named `name`, in document order.
    pub fn find_descendant(&self, from: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(from).find(|id| self.name(*id) == name)
    }

    /// Shorthand for a document-wide search.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.find_descendant(DOC, name)
    }

    /// First descendant named `name` whose attribute `key` equals `value`.
    pub fn find_with_attr(
        &self,
        from: NodeId,
        name: &str,
        key: &str,
        value: &str,
    ) -> Option<NodeId> {
        self.descendants(from)
            .find(|id| self.name(*id) == name && self.attr(*id, key) == Some(value))
    }

    /// First descendant named `name` matching every `(key, value)` pair.
    pub fn find_with_attrs(
        &self,
        from: NodeId,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Option<NodeId> {
        self.descendants(from).find(|id| {
            self.name(*id) == name
                && attrs.iter().all(|(k, v)| self.attr(*id, k) == Some(*v))
        })
    }

    /// First descendant satisfying `pred`, in document order.
    pub fn find_where<F>(&self, from: NodeId, mut pred: F) -> Option<NodeId>
    where
        F: FnMut(NodeId) -> bool,
    {
        self.descendants(from).find(|id| pred(*id))
    }

    /// All descendants whose name satisfies `pred`, in document order.
    pub fn collect_named<F>(&self, from: NodeId, mut pred: F) -> Vec<NodeId>
    where
        F: FnMut(&str) -> bool,
    {
        self.descendants(from)
            .filter(|id| pred(self.name(*id)))
            .collect()
    }

    /// Direct element child matching `pred` (the non-recursive lookup).
    pub fn child_where<F>(&self, parent: NodeId, mut pred: F) -> Option<NodeId>
    where
        F: FnMut(NodeId) -> bool,
    {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.is_element(*c) && pred(*c))
    }

    pub fn children_named(&self, parent: NodeId, name: &str) -> Vec<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .filter(|c| self.is_element(*c) && self.name(*c) == name)
            .collect()
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn write_to<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut w = Writer::new_with_indent(writer, b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| ConflocError::Xml(e.to_string()))?;
        if let Some(dt) = &self.doctype {
            w.write_event(Event::DocType(BytesText::from_escaped(dt.as_str())))
                .map_err(|e| ConflocError::Xml(e.to_string()))?;
        }
        for child in &self.nodes[DOC.0].children {
            self.write_node(&mut w, *child)?;
        }
        Ok(())
    }

    fn write_node<W: std::io::Write>(&self, w: &mut Writer<W>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id.0];
        match node.kind {
            NodeKind::Comment => {
                w.write_event(Event::Comment(BytesText::from_escaped(node.text.as_str())))
                    .map_err(|e| ConflocError::Xml(e.to_string()))?;
            }
            NodeKind::Element => {
                let mut start = BytesStart::new(node.name.as_str());
                for (k, v) in &node.attrs {
                    start.push_attribute((k.as_str(), v.as_str()));
                }
                if node.children.is_empty() && node.text.is_empty() {
                    w.write_event(Event::Empty(start))
                        .map_err(|e| ConflocError::Xml(e.to_string()))?;
                    return Ok(());
                }
                w.write_event(Event::Start(start))
                    .map_err(|e| ConflocError::Xml(e.to_string()))?;
                if !node.text.is_empty() {
                    if node.cdata {
                        w.write_event(Event::CData(BytesCData::new(node.text.as_str())))
                            .map_err(|e| ConflocError::Xml(e.to_string()))?;
                    } else {
                        w.write_event(Event::Text(BytesText::new(node.text.as_str())))
                            .map_err(|e| ConflocError::Xml(e.to_string()))?;
                    }
                }
                for child in &node.children {
                    self.write_node(w, *child)?;
                }
                w.write_event(Event::End(BytesEnd::new(node.name.as_str())))
                    .map_err(|e| ConflocError::Xml(e.to_string()))?;
            }
            NodeKind::Document => {}
        }
        Ok(())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            for child in self.tree.nodes[id.0].children.iter().rev() {
                self.stack.push(*child);
            }
            if self.tree.is_element(id) {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<model>
  <!-- keep me -->
  <field-definition id="F1" visibility="both">
    <label>First</label>
    <label xml:lang="de_DE">Erste</label>
  </field-definition>
  <field-definition id="F2"/>
</model>"#;

    #[test]
    fn parses_into_document_order() {
        let tree = Tree::parse(SAMPLE).unwrap();
        assert_eq!(tree.mode(), ParseMode::Strict);
        let root = tree.root().unwrap();
        assert_eq!(tree.name(root), "model");
        let fields = tree.children_named(root, "field-definition");
        assert_eq!(fields.len(), 2);
        assert_eq!(tree.attr(fields[0], "id"), Some("F1"));
        assert_eq!(tree.attr(fields[0], "visibility"), Some("both"));
    }

    #[test]
    fn attribute_search_walks_document_order() {
        let tree = Tree::parse(SAMPLE).unwrap();
        let f2 = tree.find_with_attr(DOC, "field-definition", "id", "F2").unwrap();
        assert_eq!(tree.attr(f2, "id"), Some("F2"));
        let de = tree
            .find_with_attr(DOC, "label", "xml:lang", "de_DE")
            .unwrap();
        assert_eq!(tree.text(de), "Erste");
    }

    #[test]
    fn lenient_mode_keeps_cdata_blocks() {
        let raw = "<plan><obj-plan-name><![CDATA[My <b>Plan</b>]]></obj-plan-name></plan>";
        let tree = Tree::parse(raw).unwrap();
        assert_eq!(tree.mode(), ParseMode::Lenient);
        let name = tree.find("obj-plan-name").unwrap();
        assert_eq!(tree.text(name), "My <b>Plan</b>");
        let out = tree.to_xml_string().unwrap();
        assert!(out.contains("<![CDATA[My <b>Plan</b>]]>"));
    }

    #[test]
    fn insert_after_keeps_sibling_order() {
        let mut tree = Tree::parse(SAMPLE).unwrap();
        let de = tree
            .find_with_attr(DOC, "label", "xml:lang", "de_DE")
            .unwrap();
        let fr = tree.new_element("label");
        tree.set_attr(fr, "xml:lang", "fr_FR");
        tree.set_text(fr, "Premier");
        tree.insert_after(de, fr);

        let parent = tree.parent(de).unwrap();
        let labels = tree.children_named(parent, "label");
        assert_eq!(labels.len(), 3);
        assert_eq!(tree.attr(labels[2], "xml:lang"), Some("fr_FR"));
    }

    #[test]
    fn serializes_created_nodes_and_comments() {
        let mut tree = Tree::parse(SAMPLE).unwrap();
        let f2 = tree.find_with_attr(DOC, "field-definition", "id", "F2").unwrap();
        let label = tree.new_element("label");
        tree.set_attr(label, "xml:lang", "de_DE");
        tree.set_text(label, "Zweite");
        tree.insert_child(f2, 2, label);

        let out = tree.to_xml_string().unwrap();
        assert!(out.contains("<!-- keep me -->"));
        assert!(out.contains(r#"<label xml:lang="de_DE">Zweite</label>"#));
        // still a single root
        let reparsed = Tree::parse(&out).unwrap();
        assert_eq!(reparsed.name(reparsed.root().unwrap()), "model");
    }
}
