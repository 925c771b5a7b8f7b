//! In-memory XML tree used by the whole pipeline.
//!
//! Documents are parsed with `quick-xml` into an arena of nodes indexed by
//! [`NodeId`]. Ids are assigned in document order, so sorting a node set by
//! id yields document order. Removing a subtree only detaches it from its
//! parent; arena slots are never reused.
//!
//! Lookups go through a small path language understood by
//! [`Node::select`]:
//!
//! | Path | Meaning |
//! |------|---------|
//! | `did/unittitle` | `unittitle` children of `did` children |
//! | `controlaccess//persname` | `persname` descendants of `controlaccess` children |
//! | `//dao` | `dao` descendants of the context node |
//! | `controlaccess/*` | every element child of `controlaccess` |
//! | `unitid[@type=external_link]` | `unitid` children whose `type` is `external_link` |

use std::borrow::Cow;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::ImportError;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct ElementData {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed document.
#[derive(Debug, Clone, Default)]
pub struct XmlTree {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
}

impl XmlTree {
    /// Parse raw file bytes, decoding UTF-8 first and ISO-8859-15 as the
    /// single fallback.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ImportError> {
        Self::parse_str(&decode_bytes(bytes))
    }

    pub fn parse_str(text: &str) -> Result<Self, ImportError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut tree = XmlTree::default();
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = tree.open_element(&e, stack.last().copied())?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    tree.open_element(&e, stack.last().copied())?;
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(e)) => {
                    if let Some(&parent) = stack.last() {
                        let text = match e.unescape_with(resolve_entity) {
                            Ok(t) => t.into_owned(),
                            Err(_) => String::from_utf8_lossy(&e).into_owned(),
                        };
                        tree.push_text(parent, text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(&parent) = stack.last() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        tree.push_text(parent, text);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ImportError::Parse(format!(
                        "{} at position {}",
                        e,
                        reader.buffer_position()
                    )))
                }
            }
        }

        if !stack.is_empty() {
            return Err(ImportError::Parse(
                "unexpected end of document (unclosed elements)".to_string(),
            ));
        }
        if tree.root.is_none() {
            return Err(ImportError::Parse("document has no root element".to_string()));
        }
        Ok(tree)
    }

    fn open_element(
        &mut self,
        start: &BytesStart<'_>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ImportError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ImportError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.push((key, value));
        }

        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind: NodeKind::Element(ElementData { name, attrs }),
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None if self.root.is_none() => self.root = Some(id),
            None => {
                return Err(ImportError::Parse(
                    "document has more than one root element".to_string(),
                ))
            }
        }
        Ok(id)
    }

    fn push_text(&mut self, parent: NodeId, text: String) {
        if let Some(&last) = self.nodes[parent].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last].kind {
                existing.push_str(&text);
                return;
            }
        }
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind: NodeKind::Text(text),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
    }

    pub fn root(&self) -> Option<Node<'_>> {
        self.root.map(|id| Node { tree: self, id })
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { tree: self, id }
    }

    /// Ids of every attached element, in document order.
    pub fn element_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if matches!(self.nodes[id].kind, NodeKind::Element(_)) {
                    out.push(id);
                    stack.extend(self.nodes[id].children.iter().rev());
                }
            }
        }
        out
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    /// Detach a node (and therefore its subtree) from the document.
    pub fn detach(&mut self, id: NodeId) {
        match self.nodes[id].parent.take() {
            Some(parent) => self.nodes[parent].children.retain(|&c| c != id),
            None => {
                if self.root == Some(id) {
                    self.root = None;
                }
            }
        }
    }

    /// Serialize the attached tree back to an XML document.
    pub fn to_xml_bytes(&self) -> Result<Vec<u8>, ImportError> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        if let Some(root) = self.root {
            self.write_node(&mut writer, root)?;
        }
        Ok(writer.into_inner())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), ImportError> {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Text(text) => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            NodeKind::Element(data) => {
                let mut start = BytesStart::new(data.name.as_str());
                for (k, v) in &data.attrs {
                    start.push_attribute((k.as_str(), v.as_str()));
                }
                if node.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for &child in &node.children {
                        self.write_node(writer, child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(data.name.as_str())))?;
                }
            }
        }
        Ok(())
    }
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some("\u{a0}"),
        _ => None,
    }
}

/// Decode raw bytes as UTF-8 (BOM stripped), falling back to ISO-8859-15.
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            tracing::debug!("input is not valid UTF-8, decoding as ISO-8859-15");
            Cow::Owned(bytes.iter().map(|&b| latin9_char(b)).collect())
        }
    }
}

fn latin9_char(b: u8) -> char {
    match b {
        0xA4 => '€',
        0xA6 => 'Š',
        0xA8 => 'š',
        0xB4 => 'Ž',
        0xB8 => 'ž',
        0xBC => 'Œ',
        0xBD => 'œ',
        0xBE => 'Ÿ',
        other => other as char,
    }
}

/// Borrowed view of one node of an [`XmlTree`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    tree: &'a XmlTree,
    id: NodeId,
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_text() {
            Some(t) => write!(f, "Text({:?})", t),
            None => write!(f, "<{}#{}>", self.tag(), self.id),
        }
    }
}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn data(&self) -> &'a NodeData {
        &self.tree.nodes[self.id]
    }

    /// Element name, or `""` for text nodes.
    pub fn tag(&self) -> &'a str {
        match &self.data().kind {
            NodeKind::Element(e) => &e.name,
            NodeKind::Text(_) => "",
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data().kind, NodeKind::Element(_))
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match &self.data().kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        match &self.data().kind {
            NodeKind::Element(e) => e
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Attribute value trimmed, `None` when absent or blank.
    pub fn attr_nonempty(&self, name: &str) -> Option<&'a str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.data().parent.map(|id| Node {
            tree: self.tree,
            id,
        })
    }

    /// Whether any ancestor of this node is named `tag`.
    pub fn has_ancestor(&self, tag: &str) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.tag() == tag {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// All child nodes, text included.
    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| Node { tree, id })
    }

    /// Element children only.
    pub fn elements(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        self.children().filter(|n| n.is_element())
    }

    pub fn child(&self, tag: &str) -> Option<Node<'a>> {
        self.elements().find(|n| n.tag() == tag)
    }

    /// Element descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Node<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<Node<'a>> = self.elements().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut kids: Vec<Node<'a>> = node.elements().collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Evaluate a path expression (see module docs) relative to this node.
    pub fn select(&self, path: &str) -> Vec<Node<'a>> {
        let mut current = vec![*self];
        let mut descend = false;
        for segment in path.split('/') {
            if segment.is_empty() {
                descend = true;
                continue;
            }
            if segment == "." {
                continue;
            }
            let step = Step::parse(segment);
            let mut next: Vec<Node<'a>> = Vec::new();
            for node in &current {
                if descend {
                    next.extend(node.descendants().into_iter().filter(|n| step.matches(n)));
                } else {
                    next.extend(node.elements().filter(|n| step.matches(n)));
                }
            }
            next.sort_by_key(|n| n.id);
            next.dedup_by_key(|n| n.id);
            current = next;
            descend = false;
        }
        current
    }

    pub fn select_first(&self, path: &str) -> Option<Node<'a>> {
        self.select(path).into_iter().next()
    }

    /// Text fragments of the subtree in document order.
    pub fn text_parts(&self) -> Vec<&'a str> {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts
    }

    fn collect_text(&self, parts: &mut Vec<&'a str>) {
        match &self.data().kind {
            NodeKind::Text(t) => parts.push(t),
            NodeKind::Element(_) => {
                for child in self.children() {
                    child.collect_text(parts);
                }
            }
        }
    }

    /// Concatenated text of the subtree.
    pub fn text(&self) -> String {
        self.text_parts().concat()
    }
}

struct Step<'p> {
    name: &'p str,
    predicate: Option<(&'p str, &'p str)>,
}

impl<'p> Step<'p> {
    fn parse(segment: &'p str) -> Self {
        match segment.split_once('[') {
            Some((name, rest)) => {
                let inner = rest.trim_end_matches(']').trim_start_matches('@');
                let predicate = inner.split_once('=').map(|(k, v)| {
                    (
                        k.trim(),
                        v.trim().trim_matches(|c| c == '"' || c == '\''),
                    )
                });
                Step { name, predicate }
            }
            None => Step {
                name: segment,
                predicate: None,
            },
        }
    }

    fn matches(&self, node: &Node<'_>) -> bool {
        if !node.is_element() {
            return false;
        }
        if self.name != "*" && node.tag() != self.name {
            return false;
        }
        match self.predicate {
            Some((key, value)) => node.attr(key) == Some(value),
            None => true,
        }
    }
}
