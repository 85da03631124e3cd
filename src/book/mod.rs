//! The book aggregate: metadata, item registry, spine, table of contents and guide.

mod item;
pub mod metadata;
mod toc;

pub use item::{
    CoverPage, Direction, DocumentPage, HeadLink, Item, ItemKind, ItemType, NavPage,
    NCX_MEDIA_TYPE, XHTML_MEDIA_TYPE,
};
pub use metadata::{Attributes, MetaValue, Metadata};
pub use toc::{Link, Section, TocNode, depth as toc_depth};

use item::IdCounters;
use metadata::{ns, resolve_namespace};

use crate::error::{Error, Result};
use crate::util::guess_media_type;

/// Default chapter shell; rendered documents get their head and body filled in.
pub const CHAPTER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" epub:prefix="z3998: http://www.daisy.org/z3998/2012/vocab/structure/#">
<head></head>
<body></body>
</html>"#;

pub const COVER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
<style>
body { margin: 0em; padding: 0em; }
img { max-width: 100%; max-height: 100%; }
</style>
</head>
<body>
<img src="" alt=""/>
</body>
</html>"#;

pub const NAV_TEMPLATE: &str = r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head></head>
<body></body>
</html>"#;

/// Replaceable document shells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Chapter,
    Cover,
    Nav,
}

/// One entry of the reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub idref: String,
    pub linear: bool,
}

/// A legacy guide reference (`cover`, `toc`, `text`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideReference {
    pub kind: String,
    pub href: String,
    pub title: String,
}

impl GuideReference {
    pub fn new(kind: impl Into<String>, href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            href: href.into(),
            title: title.into(),
        }
    }
}

/// An EPUB publication.
///
/// All state is private; every mutation goes through the methods below so the
/// registry, spine and metadata stay consistent.
#[derive(Debug, Clone)]
pub struct Book {
    uid: String,
    title: String,
    language: String,
    direction: Option<Direction>,
    identifier_id: String,
    folder_name: String,
    version: String,
    metadata: Metadata,
    items: Vec<Item>,
    spine: Vec<SpineEntry>,
    toc: Vec<TocNode>,
    guide: Vec<GuideReference>,
    pages: Vec<Link>,
    chapter_template: String,
    cover_template: String,
    nav_template: String,
    prefixes: Vec<(String, String)>,
    namespaces: Vec<(String, String)>,
    counters: IdCounters,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    /// Create an empty book carrying a generator entry.
    pub fn new() -> Self {
        let mut book = Self::blank();
        book.add_metadata(
            Some("OPF"),
            "generator",
            "",
            &[
                ("name", "generator"),
                ("content", concat!("folio ", env!("CARGO_PKG_VERSION"))),
            ],
        );
        book
    }

    /// A book with no metadata at all; used when reconstructing a package.
    pub(crate) fn blank() -> Self {
        Self {
            uid: String::new(),
            title: String::new(),
            language: "en".into(),
            direction: None,
            identifier_id: "id".into(),
            folder_name: "EPUB".into(),
            version: "3.0".into(),
            metadata: Metadata::new(),
            items: Vec::new(),
            spine: Vec::new(),
            toc: Vec::new(),
            guide: Vec::new(),
            pages: Vec::new(),
            chapter_template: CHAPTER_TEMPLATE.into(),
            cover_template: COVER_TEMPLATE.into(),
            nav_template: NAV_TEMPLATE.into(),
            prefixes: Vec::new(),
            namespaces: Vec::new(),
            counters: IdCounters::default(),
        }
    }

    // ------------------------------------------------------------------
    // Scalar fields
    // ------------------------------------------------------------------

    /// Set the primary unique identifier.
    pub fn set_identifier(&mut self, uid: impl Into<String>) {
        self.uid = uid.into();
        let value = MetaValue::new(self.uid.clone()).with_attr("id", self.identifier_id.clone());
        self.metadata.set_unique(Some(ns::DC), "identifier", value);
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.metadata
            .add(Some(ns::DC), "title", MetaValue::new(self.title.clone()));
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_language(&mut self, lang: impl Into<String>) {
        self.language = lang.into();
        self.metadata
            .add(Some(ns::DC), "language", MetaValue::new(self.language.clone()));
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn set_direction(&mut self, direction: Option<Direction>) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Name of the `id` attribute that marks the primary identifier.
    pub fn identifier_id(&self) -> &str {
        &self.identifier_id
    }

    pub fn set_identifier_id(&mut self, id: impl Into<String>) {
        self.identifier_id = id.into();
    }

    /// Top-level folder holding the package document and all content.
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn set_folder_name(&mut self, name: impl Into<String>) {
        self.folder_name = name.into();
    }

    /// Package version as read from an existing package (`"3.0"` for new books).
    pub fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Restore the scalar fields from already-populated metadata.
    pub(crate) fn restore_identity(&mut self, uid: String, title: String, language: Option<String>) {
        self.uid = uid;
        self.title = title;
        if let Some(language) = language {
            self.language = language;
        }
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Add a metadata value. `namespace` is a well-known prefix (`"DC"`, `"OPF"`)
    /// or a namespace URI; `None` produces un-namespaced elements.
    pub fn add_metadata(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        value: &str,
        attrs: &[(&str, &str)],
    ) {
        self.metadata.add(namespace, name, meta_value(value, attrs));
    }

    /// Replace all values of a metadata property with one value.
    ///
    /// Replacing `dc:title` or `dc:language` also updates [`Book::title`] or
    /// [`Book::language`].
    pub fn set_unique_metadata(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        value: &str,
        attrs: &[(&str, &str)],
    ) {
        self.metadata
            .set_unique(namespace, name, meta_value(value, attrs));
        if namespace.map(resolve_namespace) == Some(ns::DC) {
            match name {
                "title" => self.title = value.to_string(),
                "language" => self.language = value.to_string(),
                _ => {}
            }
        }
    }

    pub fn get_metadata(&self, namespace: Option<&str>, name: &str) -> &[MetaValue] {
        self.metadata.get(namespace, name)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn add_author(&mut self, name: &str) {
        self.add_author_details(name, None, None, "creator");
    }

    /// Add a creator with optional `file-as` and `role` refinements.
    pub fn add_author_details(
        &mut self,
        name: &str,
        file_as: Option<&str>,
        role: Option<&str>,
        uid: &str,
    ) {
        self.add_metadata(Some("DC"), "creator", name, &[("id", uid)]);
        let refines = format!("#{}", uid);
        if let Some(file_as) = file_as {
            self.add_metadata(
                Some("OPF"),
                "meta",
                file_as,
                &[
                    ("refines", refines.as_str()),
                    ("property", "file-as"),
                    ("scheme", "marc:relators"),
                ],
            );
        }
        if let Some(role) = role {
            self.add_metadata(
                Some("OPF"),
                "meta",
                role,
                &[
                    ("refines", refines.as_str()),
                    ("property", "role"),
                    ("scheme", "marc:relators"),
                ],
            );
        }
    }

    /// Register a cover image, optionally with a cover page wrapping it.
    pub fn set_cover(
        &mut self,
        file_name: &str,
        content: impl Into<Vec<u8>>,
        create_page: bool,
    ) -> Result<()> {
        self.add_item(Item::cover_image(file_name, content))?;
        if create_page {
            self.add_item(Item::cover_page(file_name).with_lang(self.language.clone()))?;
        }
        self.add_metadata(
            Some("OPF"),
            "cover",
            "",
            &[("name", "cover"), ("content", "cover-img")],
        );
        Ok(())
    }

    /// Declare an extra `prefix` mapping on the package element.
    pub fn add_prefix(&mut self, name: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.push((name.into(), uri.into()));
    }

    pub fn prefixes(&self) -> &[(String, String)] {
        &self.prefixes
    }

    /// Declare an XML namespace prefix used by custom metadata.
    pub fn add_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        if !self.namespaces.iter().any(|(p, _)| *p == prefix) {
            self.namespaces.push((prefix, uri));
        }
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    // ------------------------------------------------------------------
    // Item registry
    // ------------------------------------------------------------------

    /// Register an item and return its id.
    ///
    /// Items without an id get one from a per-kind counter; items without a
    /// media type get one inferred from their file extension.
    pub fn add_item(&mut self, mut item: Item) -> Result<String> {
        if item.id.is_empty() {
            loop {
                let id = self.counters.next_for(&item.kind);
                if self.item(&id).is_none() {
                    item.id = id;
                    break;
                }
            }
        } else if self.item(&item.id).is_some() {
            return Err(Error::DuplicateId(item.id));
        }

        if item.media_type.is_empty() {
            item.media_type = guess_media_type(&item.href)
                .ok_or_else(|| Error::TypeInference(item.href.clone()))?
                .to_string();
        }

        let id = item.id.clone();
        self.items.push(item);
        Ok(id)
    }

    /// Unregister an item, dropping any spine entries that pointed at it.
    pub fn remove_item(&mut self, id: &str) -> Option<Item> {
        let index = self.items.iter().position(|i| i.id == id)?;
        self.spine.retain(|entry| entry.idref != id);
        Some(self.items.remove(index))
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn item_by_href(&self, href: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.href == href)
    }

    /// All items in registration order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Put back an item taken out for a hook.
    pub(crate) fn replace_item_at(&mut self, index: usize, item: Item) {
        if let Some(slot) = self.items.get_mut(index) {
            *slot = item;
        }
    }

    pub fn items_of_type(&self, item_type: ItemType) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(move |i| i.item_type() == item_type)
    }

    pub fn items_of_media_type<'a>(&'a self, media_type: &'a str) -> impl Iterator<Item = &'a Item> {
        self.items
            .iter()
            .filter(move |i| i.media_type == media_type)
    }

    /// Content of the item at `href`.
    pub fn resource(&self, href: &str) -> Result<&[u8]> {
        self.item_by_href(href)
            .ok_or_else(|| Error::ResourceNotFound(href.to_string()))?
            .content()
    }

    pub fn ncx_item(&self) -> Option<&Item> {
        self.items.iter().find(|i| i.is_ncx())
    }

    pub fn nav_item(&self) -> Option<&Item> {
        self.items
            .iter()
            .find(|i| matches!(i.kind, ItemKind::Nav(_)))
    }

    // ------------------------------------------------------------------
    // Spine
    // ------------------------------------------------------------------

    /// Append a registered item to the reading order.
    pub fn add_spine_item(&mut self, id: &str, linear: bool) -> Result<()> {
        let item = self
            .item(id)
            .ok_or_else(|| Error::InvalidSpine(format!("no item with id {}", id)))?;
        if item.is_ncx() {
            return Err(Error::InvalidSpine(format!(
                "{} is an NCX document and cannot be read in order",
                id
            )));
        }
        self.spine.push(SpineEntry {
            idref: id.to_string(),
            linear,
        });
        Ok(())
    }

    pub fn spine(&self) -> &[SpineEntry] {
        &self.spine
    }

    pub fn clear_spine(&mut self) {
        self.spine.clear();
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn set_toc(&mut self, toc: Vec<TocNode>) {
        self.toc = toc;
    }

    pub fn add_toc_entry(&mut self, node: TocNode) {
        self.toc.push(node);
    }

    pub fn toc(&self) -> &[TocNode] {
        &self.toc
    }

    /// Resolve a leaf TOC node to `(href, title)`.
    ///
    /// Item references that do not name a registered item fail with
    /// [`Error::ResourceNotFound`]. Sections have no target and yield `None`.
    pub fn resolve_toc_node<'a>(&'a self, node: &'a TocNode) -> Result<Option<(&'a str, &'a str)>> {
        match node {
            TocNode::Link(link) => Ok(Some((link.href.as_str(), link.title.as_str()))),
            TocNode::Item(id) => {
                let item = self
                    .item(id)
                    .ok_or_else(|| Error::ResourceNotFound(id.clone()))?;
                Ok(Some((item.href.as_str(), item.title())))
            }
            TocNode::Section(_) => Ok(None),
        }
    }

    pub fn add_guide(&mut self, reference: GuideReference) {
        self.guide.push(reference);
    }

    pub fn guide(&self) -> &[GuideReference] {
        &self.guide
    }

    /// Page-list entries read from a navigation document.
    pub fn pages(&self) -> &[Link] {
        &self.pages
    }

    pub(crate) fn set_pages(&mut self, pages: Vec<Link>) {
        self.pages = pages;
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    pub fn set_template(&mut self, template: Template, markup: impl Into<String>) {
        let markup = markup.into();
        match template {
            Template::Chapter => self.chapter_template = markup,
            Template::Cover => self.cover_template = markup,
            Template::Nav => self.nav_template = markup,
        }
    }

    pub fn template(&self, template: Template) -> &str {
        match template {
            Template::Chapter => &self.chapter_template,
            Template::Cover => &self.cover_template,
            Template::Nav => &self.nav_template,
        }
    }
}

fn meta_value(value: &str, attrs: &[(&str, &str)]) -> MetaValue {
    attrs
        .iter()
        .fold(MetaValue::new(value), |v, (k, a)| v.with_attr(*k, *a))
}
