//! XML loading (quick-xml) and XHTML serialization for the arena DOM.

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape, unescape};
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesStart, Event};

use super::arena::{Attribute, Dom, NodeData, NodeId, display_name, qual_name};
use crate::book::metadata::ns;
use crate::error::Result;

const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
const XLINK: &str = "http://www.w3.org/1999/xlink";

/// Elements serialized as `<x/>` when empty; every other XHTML element gets an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// In-scope namespace declarations while walking a document.
#[derive(Debug, Default)]
pub(crate) struct NamespaceScope {
    frames: Vec<Vec<(String, String)>>,
}

impl NamespaceScope {
    /// Enter an element, recording any `xmlns` / `xmlns:p` attributes it carries.
    pub(crate) fn push(&mut self, e: &BytesStart) {
        let mut frame = Vec::new();
        for attr in e.attributes().flatten() {
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                frame.push((String::new(), attr_value(&attr)));
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                frame.push((String::from_utf8_lossy(prefix).into_owned(), attr_value(&attr)));
            }
        }
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolve a prefix (`""` for the default namespace).
    pub(crate) fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(ns::XML);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Namespace of a raw element name such as `dc:title`.
    pub(crate) fn element_ns(&self, raw_name: &[u8]) -> Option<&str> {
        let name = std::str::from_utf8(raw_name).unwrap_or("");
        match name.split_once(':') {
            Some((prefix, _)) => self.resolve(prefix),
            None => self.resolve(""),
        }
    }

    /// Declarations made directly on the current element.
    pub(crate) fn current(&self) -> &[(String, String)] {
        self.frames.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Unescaped attribute value; malformed escapes are kept verbatim.
pub(crate) fn attr_value(attr: &XmlAttribute) -> String {
    let raw = String::from_utf8_lossy(&attr.value);
    let unescaped = unescape(&raw).map(|value| value.into_owned());
    unescaped.unwrap_or_else(|_| raw.into_owned())
}

/// Look up an attribute of a start tag by its raw (possibly prefixed) name.
pub(crate) fn get_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| attr_value(&a))
}

/// Resolve XML entity references.
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

fn element_from_start(dom: &mut Dom, scope: &NamespaceScope, e: &BytesStart) -> NodeId {
    let raw = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let element_ns = scope.element_ns(raw.as_bytes()).unwrap_or("").to_string();

    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let attr_ns = match key.split_once(':') {
                Some(("xmlns", _)) => XMLNS,
                Some((prefix, _)) => scope.resolve(prefix).unwrap_or(""),
                None if key == "xmlns" => XMLNS,
                None => "",
            };
            Attribute {
                name: qual_name(&key, attr_ns),
                value: attr_value(&attr),
            }
        })
        .collect();

    dom.create_element(qual_name(&raw, &element_ns), attrs)
}

/// Parse well-formed XML (templates, generated documents) into a DOM.
///
/// Whitespace-only text and comments are kept; `xmlns` declarations stay on the
/// elements that carry them.
pub fn parse_xml(markup: &str) -> Result<Dom> {
    let mut reader = Reader::from_str(markup);
    let mut dom = Dom::new();
    let mut scope = NamespaceScope::default();
    let mut stack = vec![dom.document()];

    loop {
        let parent = stack.last().copied().unwrap_or(dom.document());
        match reader.read_event()? {
            Event::Start(e) => {
                scope.push(&e);
                let id = element_from_start(&mut dom, &scope, &e);
                dom.append(parent, id);
                stack.push(id);
            }
            Event::Empty(e) => {
                scope.push(&e);
                let id = element_from_start(&mut dom, &scope, &e);
                dom.append(parent, id);
                scope.pop();
            }
            Event::End(_) => {
                scope.pop();
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                if parent != dom.document() {
                    dom.append_text(parent, &text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                dom.append_text(parent, &text);
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref()).into_owned();
                match resolve_entity(&entity) {
                    Some(resolved) => dom.append_text(parent, &resolved),
                    None => dom.append_text(parent, &format!("&{};", entity)),
                }
            }
            Event::Comment(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                let id = dom.create_comment(text);
                dom.append(parent, id);
            }
            Event::DocType(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                let name = text.split_whitespace().next().unwrap_or("html").to_string();
                let doctype = dom.create_doctype(name, String::new(), String::new());
                dom.append(parent, doctype);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(dom)
}

/// Namespace a prefix conventionally stands for when no declaration is in scope.
fn conventional_ns(prefix: &str) -> Option<&'static str> {
    match prefix {
        "epub" => Some(ns::EPUB),
        "xlink" => Some(XLINK),
        _ => None,
    }
}

struct Serializer<'a> {
    dom: &'a Dom,
    out: String,
    /// `(prefix, uri)` declarations in scope, `""` for the default namespace.
    scope: Vec<(String, String)>,
}

impl Serializer<'_> {
    fn declared(&self, prefix: &str) -> Option<&str> {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn node(&mut self, id: NodeId) {
        let dom = self.dom;
        let Some(node) = dom.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Document => {
                for child in dom.children(id) {
                    self.node(child);
                }
            }
            NodeData::Doctype {
                name,
                public_id,
                system_id,
            } => {
                self.out.push_str("<!DOCTYPE ");
                self.out.push_str(name);
                if !public_id.is_empty() {
                    self.out
                        .push_str(&format!(" PUBLIC \"{}\" \"{}\"", public_id, system_id));
                } else if !system_id.is_empty() {
                    self.out.push_str(&format!(" SYSTEM \"{}\"", system_id));
                }
                self.out.push_str(">\n");
            }
            NodeData::Text(text) => self.out.push_str(&partial_escape(text.as_str())),
            NodeData::Comment(text) => {
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
            NodeData::Element { name, attrs } => self.element(id, name, attrs),
        }
    }

    fn element(&mut self, id: NodeId, name: &html5ever::QualName, attrs: &[Attribute]) {
        let scope_len = self.scope.len();
        let tag = display_name(name).into_owned();
        self.out.push('<');
        self.out.push_str(&tag);

        // Explicit declarations first, so generated ones never duplicate them.
        for attr in attrs {
            let key = display_name(&attr.name);
            if key == "xmlns" {
                self.scope.push((String::new(), attr.value.clone()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.scope.push((prefix.to_string(), attr.value.clone()));
            }
        }

        let mut generated: Vec<(String, String)> = Vec::new();
        let element_prefix = name.prefix.as_ref().map(|p| p.to_string()).unwrap_or_default();
        let element_ns = name.ns.to_string();
        if self.declared(&element_prefix).unwrap_or("") != element_ns
            && !(element_prefix.is_empty() && element_ns.is_empty())
        {
            generated.push((element_prefix, element_ns));
        }

        for attr in attrs {
            let key = display_name(&attr.name);
            let Some((prefix, _)) = key.split_once(':') else {
                continue;
            };
            if prefix == "xml" || prefix == "xmlns" {
                continue;
            }
            let uri = if attr.name.ns.is_empty() {
                conventional_ns(prefix).map(str::to_string)
            } else {
                Some(attr.name.ns.to_string())
            };
            if let Some(uri) = uri
                && self.declared(prefix).is_none()
                && !generated.iter().any(|(p, _)| p == prefix)
            {
                generated.push((prefix.to_string(), uri));
            }
        }

        for (prefix, uri) in &generated {
            if prefix.is_empty() {
                self.out.push_str(&format!(" xmlns=\"{}\"", escape(uri.as_str())));
            } else {
                self.out
                    .push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(uri.as_str())));
            }
        }
        self.scope.extend(generated);

        for attr in attrs {
            self.out.push_str(&format!(
                " {}=\"{}\"",
                display_name(&attr.name),
                escape(attr.value.as_str())
            ));
        }

        let dom = self.dom;
        let has_children = dom.children(id).next().is_some();
        let local: &str = &name.local;
        let is_xhtml = name.ns.is_empty() || &*name.ns == ns::XHTML;
        if !has_children && (!is_xhtml || VOID_ELEMENTS.contains(&local)) {
            self.out.push_str("/>");
        } else {
            self.out.push('>');
            for child in dom.children(id) {
                self.node(child);
            }
            self.out.push_str("</");
            self.out.push_str(&tag);
            self.out.push('>');
        }

        self.scope.truncate(scope_len);
    }
}

/// Serialize a DOM as XHTML with an XML declaration.
pub fn to_xhtml(dom: &Dom) -> String {
    let mut serializer = Serializer {
        dom,
        out: String::from("<?xml version='1.0' encoding='utf-8'?>\n"),
        scope: Vec::new(),
    };
    serializer.node(dom.document());
    serializer.out
}

/// Serialize the children of `id` as they would appear inside an XHTML element.
pub fn inner_xhtml(dom: &Dom, id: NodeId) -> String {
    let mut serializer = Serializer {
        dom,
        out: String::new(),
        scope: vec![(String::new(), ns::XHTML.to_string())],
    };
    for child in dom.children(id) {
        serializer.node(child);
    }
    serializer.out
}

/// Serialize one node and its subtree without an XML declaration.
pub fn node_to_string(dom: &Dom, id: NodeId) -> String {
    let mut serializer = Serializer {
        dom,
        out: String::new(),
        scope: Vec::new(),
    };
    serializer.node(id);
    serializer.out
}
