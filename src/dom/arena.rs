//! Arena-based DOM for templates and content documents.
//!
//! Nodes live in one vector; parent/child/sibling links are indices into it.

use std::borrow::Cow;

use html5ever::{LocalName, Namespace, Prefix, QualName};

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element { name: QualName, attrs: Vec<Attribute> },
    Text(String),
    Comment(String),
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Build a qualified name from a `prefix:local` string and a namespace URI.
pub fn qual_name(name: &str, ns: &str) -> QualName {
    match name.split_once(':') {
        Some((prefix, local)) => QualName::new(
            Some(Prefix::from(prefix)),
            Namespace::from(ns),
            LocalName::from(local),
        ),
        None => QualName::new(None, Namespace::from(ns), LocalName::from(name)),
    }
}

/// `prefix:local` form of a qualified name.
pub fn display_name(name: &QualName) -> Cow<'_, str> {
    match &name.prefix {
        Some(prefix) => Cow::Owned(format!("{}:{}", prefix, name.local)),
        None => Cow::Borrowed(name.local.as_ref()),
    }
}

/// Arena-based DOM tree.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
    document: NodeId,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    /// Create a new empty DOM with a document root.
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            document: NodeId::NONE,
        };
        dom.document = dom.alloc(Node::new(NodeData::Document));
        dom
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn document(&self) -> NodeId {
        self.document
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        self.alloc(Node::new(NodeData::Element { name, attrs }))
    }

    /// Create an element in the same namespace as `parent`.
    ///
    /// `attrs` use `prefix:local` names; `epub:`, `xml:` and `xlink:` prefixes
    /// are bound to their well-known namespaces.
    pub fn create_child(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let ns = self
            .element_namespace(parent)
            .map(|n| n.to_string())
            .unwrap_or_else(|| crate::book::metadata::ns::XHTML.to_string());
        let attrs = attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: attribute_name(name),
                value: value.to_string(),
            })
            .collect();
        let id = self.create_element(qual_name(tag, &ns), attrs);
        self.append(parent, id);
        id
    }

    pub fn create_text(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text)))
    }

    pub fn create_comment(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text)))
    }

    pub fn create_doctype(&mut self, name: String, public_id: String, system_id: String) -> NodeId {
        self.alloc(Node::new(NodeData::Doctype {
            name,
            public_id,
            system_id,
        }))
    }

    /// Append a child to a parent node.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self
            .get(parent)
            .map(|n| n.last_child)
            .unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if last_child.is_some()
            && let Some(last_node) = self.get_mut(last_child)
        {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a node before a sibling.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let parent = self.get(sibling).map(|n| n.parent).unwrap_or(NodeId::NONE);
        let prev = self
            .get(sibling)
            .map(|n| n.prev_sibling)
            .unwrap_or(NodeId::NONE);

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Unlink a node from its parent and siblings.
    pub fn detach(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children: Vec<_> = self.children(id).collect();
        for child in children {
            self.detach(child);
        }
    }

    /// Append text to an existing text node, or create new if last child isn't text.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self
            .get(parent)
            .map(|n| n.last_child)
            .unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(existing) = &mut last.data
        {
            existing.push_str(text);
            return;
        }

        let text_node = self.create_text(text.to_string());
        self.append(parent, text_node);
    }

    /// Deep-copy `src_id` from another DOM and append the copy to `parent`.
    pub fn import(&mut self, src: &Dom, src_id: NodeId, parent: NodeId) -> NodeId {
        let Some(node) = src.get(src_id) else {
            return NodeId::NONE;
        };
        let copy = self.alloc(Node::new(node.data.clone()));
        self.append(parent, copy);
        for child in src.children(src_id) {
            self.import(src, child, copy);
        }
        copy
    }

    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self
            .get(parent)
            .map(|n| n.first_child)
            .unwrap_or(NodeId::NONE);
        ChildrenIter {
            dom: self,
            current: first,
        }
    }

    /// Element children of a node.
    pub fn child_elements(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent).filter(|&c| self.is_element(c))
    }

    /// Pre-order walk of `root` and everything below it.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if self.get(id).is_none() {
                continue;
            }
            out.push(id);
            let mut children: Vec<_> = self.children(id).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Find the first node under `root` matching a predicate (DFS).
    pub fn find_from<F>(&self, root: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .find(|&id| self.get(id).is_some_and(&predicate))
    }

    /// Find element by tag name (first match in document order).
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.find_from(self.document, |node| {
            matches!(&node.data, NodeData::Element { name, .. } if name.local.as_ref() == tag)
        })
    }

    /// All elements under `root` with the given local name, in document order.
    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.element_name(id).is_some_and(|n| n.as_ref() == tag))
            .collect()
    }

    /// The document element.
    pub fn root_element(&self) -> Option<NodeId> {
        self.child_elements(self.document).next()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    dom: &'a Dom,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self
            .dom
            .get(id)
            .map(|n| n.next_sibling)
            .unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Convenience methods for element nodes.
impl Dom {
    /// Get element's local name (tag).
    pub fn element_name(&self, id: NodeId) -> Option<&LocalName> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(&name.local),
            _ => None,
        })
    }

    pub fn element_namespace(&self, id: NodeId) -> Option<&Namespace> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(&name.ns),
            _ => None,
        })
    }

    /// Get an attribute value by `local` or `prefix:local` name.
    pub fn get_attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| display_name(&a.name) == attr_name)
            .map(|a| a.value.as_str())
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { attrs, .. } => Some(attrs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Set (or replace) an attribute by `prefix:local` name.
    pub fn set_attr(&mut self, id: NodeId, attr_name: &str, value: &str) {
        if let Some(node) = self.get_mut(id)
            && let NodeData::Element { attrs, .. } = &mut node.data
        {
            match attrs
                .iter_mut()
                .find(|a| display_name(&a.name) == attr_name)
            {
                Some(attr) => attr.value = value.to_string(),
                None => attrs.push(Attribute {
                    name: attribute_name(attr_name),
                    value: value.to_string(),
                }),
            }
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    /// Get text content of a text node.
    pub fn text_content(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Concatenated text of a node and all its descendants.
    pub fn collect_text(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.text_content(d))
            .collect()
    }
}

/// Qualified name for an attribute written as `prefix:local`.
pub fn attribute_name(name: &str) -> QualName {
    use crate::book::metadata::ns;

    match name.split_once(':') {
        Some(("xml", _)) => qual_name(name, ns::XML),
        Some(("epub", _)) => qual_name(name, ns::EPUB),
        Some(("xlink", _)) => qual_name(name, "http://www.w3.org/1999/xlink"),
        Some(("xmlns", _)) => qual_name(name, "http://www.w3.org/2000/xmlns/"),
        _ => qual_name(name, ""),
    }
}
