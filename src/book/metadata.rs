//! Namespace-qualified, multi-valued metadata store.

use std::collections::BTreeMap;

/// Well-known namespace URIs.
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const EPUB: &str = "http://www.idpf.org/2007/ops";
    pub const DAISY: &str = "http://www.daisy.org/z3986/2005/ncx/";
    pub const OPF: &str = "http://www.idpf.org/2007/opf";
    pub const CONTAINER: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";
    pub const XHTML: &str = "http://www.w3.org/1999/xhtml";
}

/// Resolve a well-known prefix (`"DC"`, `"opf"`, ...) to its namespace URI.
///
/// Anything that is not a known prefix is treated as a URI already.
pub fn resolve_namespace(prefix_or_uri: &str) -> &str {
    match prefix_or_uri.to_ascii_uppercase().as_str() {
        "DC" => ns::DC,
        "OPF" => ns::OPF,
        "XML" => ns::XML,
        "EPUB" => ns::EPUB,
        "DAISY" => ns::DAISY,
        "CONTAINERNS" | "CONTAINER" => ns::CONTAINER,
        "XHTML" => ns::XHTML,
        _ => prefix_or_uri,
    }
}

/// Attributes attached to one metadata value, keyed by qualified name
/// (`"id"`, `"opf:role"`, `"refines"`, ...).
pub type Attributes = BTreeMap<String, String>;

/// One value of a metadata property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaValue {
    pub value: String,
    pub attributes: Attributes,
}

impl MetaValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
struct Property {
    name: String,
    values: Vec<MetaValue>,
}

#[derive(Debug, Clone, Default)]
struct Group {
    namespace: Option<String>,
    properties: Vec<Property>,
}

/// Metadata keyed by (namespace, property name), preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    groups: Vec<Group>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value. `namespace` may be a well-known prefix or a URI.
    pub fn add(&mut self, namespace: Option<&str>, name: &str, value: MetaValue) {
        self.property_mut(namespace, name).values.push(value);
    }

    /// Replace every value of a property with a single one.
    pub fn set_unique(&mut self, namespace: Option<&str>, name: &str, value: MetaValue) {
        let property = self.property_mut(namespace, name);
        property.values.clear();
        property.values.push(value);
    }

    /// Remove a property entirely, returning its values.
    pub fn remove(&mut self, namespace: Option<&str>, name: &str) -> Vec<MetaValue> {
        let namespace = namespace.map(resolve_namespace);
        let Some(group) = self
            .groups
            .iter_mut()
            .find(|g| g.namespace.as_deref() == namespace)
        else {
            return Vec::new();
        };
        match group.properties.iter().position(|p| p.name == name) {
            Some(i) => group.properties.remove(i).values,
            None => Vec::new(),
        }
    }

    pub fn get(&self, namespace: Option<&str>, name: &str) -> &[MetaValue] {
        let namespace = namespace.map(resolve_namespace);
        self.groups
            .iter()
            .find(|g| g.namespace.as_deref() == namespace)
            .and_then(|g| g.properties.iter().find(|p| p.name == name))
            .map(|p| p.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, namespace: Option<&str>, name: &str) -> Option<&MetaValue> {
        self.get(namespace, name).first()
    }

    /// Iterate `(namespace, name, value)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &str, &MetaValue)> {
        self.groups.iter().flat_map(|g| {
            g.properties.iter().flat_map(move |p| {
                p.values
                    .iter()
                    .map(move |v| (g.namespace.as_deref(), p.name.as_str(), v))
            })
        })
    }

    /// Namespaces with at least one entry, in insertion order.
    pub fn namespaces(&self) -> impl Iterator<Item = Option<&str>> {
        self.groups.iter().map(|g| g.namespace.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.groups
            .iter()
            .all(|g| g.properties.iter().all(|p| p.values.is_empty()))
    }

    fn property_mut(&mut self, namespace: Option<&str>, name: &str) -> &mut Property {
        let namespace = namespace.map(|n| resolve_namespace(n).to_string());
        let gi = match self.groups.iter().position(|g| g.namespace == namespace) {
            Some(i) => i,
            None => {
                self.groups.push(Group {
                    namespace,
                    properties: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[gi];
        let pi = match group.properties.iter().position(|p| p.name == name) {
            Some(i) => i,
            None => {
                group.properties.push(Property {
                    name: name.to_string(),
                    values: Vec::new(),
                });
                group.properties.len() - 1
            }
        };
        &mut group.properties[pi]
    }
}

/// Split the `name` attribute of a package `<meta>` element into a namespace and a
/// property name.
///
/// `"calibre:series"` resolves the prefix through `resolve_prefix` (falling back to the
/// raw prefix when it is not declared); an unqualified name lives in `default_ns`; a
/// missing name is filed under `"meta"`.
pub(crate) fn parse_meta_name<'r, F>(
    name: Option<&str>,
    default_ns: &str,
    resolve_prefix: F,
) -> (String, String)
where
    F: Fn(&str) -> Option<&'r str>,
{
    match name {
        Some(name) => match name.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() => {
                let uri = resolve_prefix(prefix).unwrap_or(prefix);
                (uri.to_string(), local.to_string())
            }
            _ => (default_ns.to_string(), name.to_string()),
        },
        None => (default_ns.to_string(), "meta".to_string()),
    }
}
