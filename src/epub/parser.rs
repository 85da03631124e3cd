//! Package parsing: `META-INF/container.xml` and the OPF package document.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::book::metadata::{MetaValue, Metadata, ns, parse_meta_name};
use crate::book::{Direction, GuideReference, SpineEntry};
use crate::dom::xml::{NamespaceScope, get_attr, local_name, resolve_entity};
use crate::error::{Error, Result};
use crate::util::{normalize_media_type, strip_bom, unquote};

/// One `<item>` of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestEntry {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestEntry {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// Everything read from the package document.
#[derive(Debug, Default)]
pub(crate) struct Package {
    pub unique_identifier: Option<String>,
    pub version: Option<String>,
    /// `(name, uri)` pairs of the `prefix` attribute, excluding `rendition`.
    pub prefixes: Vec<(String, String)>,
    /// Extra namespace declarations on the package and metadata elements.
    pub namespaces: Vec<(String, String)>,
    pub direction: Option<Direction>,
    pub metadata: Metadata,
    pub manifest: Vec<ManifestEntry>,
    pub spine: Vec<SpineEntry>,
    pub spine_toc: Option<String>,
    pub page_progression: Option<Direction>,
    pub guide: Vec<GuideReference>,
}

/// Parse `META-INF/container.xml` and return the package document's path.
pub(crate) fn parse_container(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = get_attr(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(Error::PackageStructure(
        "No rootfile found in container.xml".into(),
    ))
}

/// A metadata child element whose text is being collected.
struct OpenMeta {
    namespace: Option<String>,
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Other,
    Metadata,
    Manifest,
    Spine,
    Guide,
}

/// Parse the OPF package document.
pub(crate) fn parse_opf(content: &str) -> Result<Package> {
    let mut reader = Reader::from_str(content);

    let mut package = Package::default();
    let mut scope = NamespaceScope::default();
    let mut block = Block::Other;
    let mut depth = 0usize;
    let mut metadata_depth = 0usize;
    let mut open_meta: Option<OpenMeta> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                scope.push(&e);
                depth += 1;
                handle_element(&e, &scope, &mut package, &mut block);
                match local_name(e.name().as_ref()) {
                    b"metadata" => metadata_depth = depth,
                    _ if block == Block::Metadata && depth == metadata_depth + 1 => {
                        open_meta = Some(open_metadata_element(&e, &scope));
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                scope.push(&e);
                depth += 1;
                handle_element(&e, &scope, &mut package, &mut block);
                if block == Block::Metadata && depth == metadata_depth + 1 {
                    let meta = open_metadata_element(&e, &scope);
                    store_metadata(&mut package.metadata, meta);
                }
                depth -= 1;
                scope.pop();
            }
            Event::Text(e) => {
                if let Some(meta) = open_meta.as_mut() {
                    meta.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                if let Some(meta) = open_meta.as_mut() {
                    meta.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(meta) = open_meta.as_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        meta.text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                if block == Block::Metadata
                    && depth == metadata_depth + 1
                    && let Some(meta) = open_meta.take()
                {
                    store_metadata(&mut package.metadata, meta);
                }
                match local_name(e.name().as_ref()) {
                    b"metadata" | b"manifest" | b"spine" | b"guide" => block = Block::Other,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
                scope.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}

/// Handle structural elements and list entries of the package document.
fn handle_element(
    e: &BytesStart,
    scope: &NamespaceScope,
    package: &mut Package,
    block: &mut Block,
) {
    match local_name(e.name().as_ref()) {
        b"package" => {
            package.unique_identifier = get_attr(e, b"unique-identifier");
            package.version = get_attr(e, b"version");
            package.direction = get_attr(e, b"dir").and_then(|d| Direction::parse(&d));
            if let Some(prefix) = get_attr(e, b"prefix") {
                package.prefixes = parse_prefix_attr(&prefix);
            }
            collect_namespaces(scope, package);
        }
        b"metadata" => {
            *block = Block::Metadata;
            collect_namespaces(scope, package);
        }
        b"manifest" => *block = Block::Manifest,
        b"spine" => {
            *block = Block::Spine;
            package.spine_toc = get_attr(e, b"toc");
            package.page_progression = get_attr(e, b"page-progression-direction")
                .and_then(|d| Direction::parse(&d));
        }
        b"guide" => *block = Block::Guide,
        b"item" if *block == Block::Manifest => {
            let (Some(id), Some(href)) = (get_attr(e, b"id"), get_attr(e, b"href")) else {
                return;
            };
            let media_type = get_attr(e, b"media-type").unwrap_or_default();
            package.manifest.push(ManifestEntry {
                id,
                href: unquote(&href),
                media_type: normalize_media_type(&media_type),
                properties: get_attr(e, b"properties")
                    .map(|p| p.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            });
        }
        b"itemref" if *block == Block::Spine => {
            if let Some(idref) = get_attr(e, b"idref") {
                let linear = get_attr(e, b"linear").is_none_or(|l| l != "no");
                package.spine.push(SpineEntry { idref, linear });
            }
        }
        b"reference" if *block == Block::Guide => {
            package.guide.push(GuideReference::new(
                get_attr(e, b"type").unwrap_or_default(),
                unquote(&get_attr(e, b"href").unwrap_or_default()),
                get_attr(e, b"title").unwrap_or_default(),
            ));
        }
        _ => {}
    }
}

fn collect_namespaces(scope: &NamespaceScope, package: &mut Package) {
    for (prefix, uri) in scope.current() {
        if prefix.is_empty() || uri == ns::DC || uri == ns::OPF {
            continue;
        }
        if !package.namespaces.iter().any(|(p, _)| p == prefix) {
            package.namespaces.push((prefix.clone(), uri.clone()));
        }
    }
}

/// Split a `prefix` attribute (`"a: uri-a b: uri-b"`) into pairs.
fn parse_prefix_attr(value: &str) -> Vec<(String, String)> {
    let mut tokens = value.split_whitespace();
    let mut prefixes = Vec::new();
    while let Some(name) = tokens.next() {
        let Some(name) = name.strip_suffix(':') else {
            continue;
        };
        let Some(uri) = tokens.next() else {
            break;
        };
        if name != "rendition" {
            prefixes.push((name.to_string(), uri.to_string()));
        }
    }
    prefixes
}

/// Work out where a metadata child element is stored.
///
/// `<meta>` elements go through [`parse_meta_name`] so a qualified `name`
/// attribute picks the namespace; every other element is filed under its own
/// namespace and local name.
fn open_metadata_element(e: &BytesStart, scope: &NamespaceScope) -> OpenMeta {
    let raw_name = e.name();
    let local = String::from_utf8_lossy(local_name(raw_name.as_ref())).into_owned();
    let element_ns = scope.element_ns(raw_name.as_ref()).map(str::to_string);

    let attributes: Vec<(String, String)> = e
        .attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                return None;
            }
            let value = crate::dom::xml::attr_value(&attr);
            Some((key, value))
        })
        .collect();

    let is_opf_meta = local == "meta" && element_ns.as_deref().is_none_or(|n| n == ns::OPF);
    let (namespace, name) = if is_opf_meta {
        let name = attributes
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str());
        let (namespace, name) = parse_meta_name(name, ns::OPF, |prefix| scope.resolve(prefix));
        (Some(namespace), name)
    } else {
        (element_ns, local)
    };

    OpenMeta {
        namespace,
        name,
        attributes,
        text: String::new(),
    }
}

fn store_metadata(metadata: &mut Metadata, meta: OpenMeta) {
    let value = meta
        .attributes
        .into_iter()
        .fold(MetaValue::new(meta.text.trim()), |v, (k, a)| v.with_attr(k, a));
    metadata.add(meta.namespace.as_deref(), &meta.name, value);
}
