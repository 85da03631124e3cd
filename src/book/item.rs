//! Items: every resource registered in a book's manifest.

use crate::error::{Error, Result};

pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Coarse classification of an item, derived from its kind and media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Unknown,
    Image,
    Style,
    Script,
    Navigation,
    Vector,
    Font,
    Video,
    Audio,
    Document,
    Cover,
    Smil,
}

/// Text direction for documents, the spine and the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ltr" => Some(Direction::Ltr),
            "rtl" => Some(Direction::Rtl),
            _ => None,
        }
    }
}

/// An external resource referenced from a document head (stylesheet, script, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadLink {
    pub href: String,
    pub rel: Option<String>,
    pub media_type: Option<String>,
}

impl HeadLink {
    pub fn stylesheet(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: Some("stylesheet".into()),
            media_type: Some("text/css".into()),
        }
    }

    pub fn script(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: None,
            media_type: Some("text/javascript".into()),
        }
    }

    pub fn is_script(&self) -> bool {
        self.media_type.as_deref() == Some("text/javascript")
    }
}

/// Per-document settings used when the document shell is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPage {
    pub title: String,
    pub lang: Option<String>,
    pub direction: Option<Direction>,
    pub links: Vec<HeadLink>,
    /// Manifest `properties` tokens (`scripted`, `svg`, `mathml`, ...).
    pub properties: Vec<String>,
}

impl DocumentPage {
    pub fn add_link(&mut self, link: HeadLink) {
        if link.is_script() && !self.properties.iter().any(|p| p == "scripted") {
            self.properties.push("scripted".into());
        }
        self.links.push(link);
    }

    /// Link a stylesheet or script item into this document's head.
    pub fn link_item(&mut self, item: &Item) {
        match item.item_type() {
            ItemType::Style => self.add_link(HeadLink::stylesheet(item.href())),
            ItemType::Script => self.add_link(HeadLink::script(item.href())),
            _ => {}
        }
    }
}

/// Cover page wrapping the cover image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverPage {
    pub title: String,
    pub lang: Option<String>,
    /// Cover image href; `None` for cover pages read from an existing package,
    /// which are written back unchanged.
    pub image_href: Option<String>,
}

/// Navigation document settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavPage {
    pub title: String,
    pub direction: Option<Direction>,
    pub links: Vec<HeadLink>,
}

/// What an item is, which decides its manifest properties and how its
/// content is produced when the package is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// Stored bytes written as-is (stylesheets, fonts, audio, ...).
    Resource,
    Image,
    CoverImage,
    /// Content document; stored markup is wrapped into the chapter template.
    Document(DocumentPage),
    CoverPage(CoverPage),
    /// Legacy NCX index, generated from the book's table of contents.
    Ncx,
    /// EPUB 3 navigation document, generated from the book's table of contents.
    Nav(NavPage),
}

/// A resource registered in a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub(crate) id: String,
    pub(crate) href: String,
    pub(crate) media_type: String,
    pub(crate) content: Option<Vec<u8>>,
    pub(crate) linear: bool,
    pub(crate) kind: ItemKind,
}

impl Item {
    fn with_kind(href: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: String::new(),
            href: href.into(),
            media_type: String::new(),
            content: None,
            linear: true,
            kind,
        }
    }

    /// A plain resource; the media type is inferred from `href` unless set.
    pub fn new(href: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::with_kind(href, ItemKind::Resource).with_content(content)
    }

    pub fn image(href: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::with_kind(href, ItemKind::Image).with_content(content)
    }

    pub fn cover_image(href: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::with_kind(href, ItemKind::CoverImage)
            .with_id("cover-img")
            .with_content(content)
    }

    /// A content document with the given title.
    pub fn document(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self::with_kind(
            href,
            ItemKind::Document(DocumentPage {
                title: title.into(),
                ..Default::default()
            }),
        )
        .with_media_type(XHTML_MEDIA_TYPE)
    }

    pub fn cover_page(image_href: impl Into<String>) -> Self {
        Self::with_kind(
            "cover.xhtml",
            ItemKind::CoverPage(CoverPage {
                title: "Cover".into(),
                lang: None,
                image_href: Some(image_href.into()),
            }),
        )
        .with_id("cover")
        .with_media_type(XHTML_MEDIA_TYPE)
    }

    pub fn ncx() -> Self {
        Self::with_kind("toc.ncx", ItemKind::Ncx)
            .with_id("ncx")
            .with_media_type(NCX_MEDIA_TYPE)
    }

    pub fn nav() -> Self {
        Self::with_kind("nav.xhtml", ItemKind::Nav(NavPage::default()))
            .with_id("nav")
            .with_media_type(XHTML_MEDIA_TYPE)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_linear(mut self, linear: bool) -> Self {
        self.linear = linear;
        self
    }

    /// Set the document language (documents and cover pages only).
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        match &mut self.kind {
            ItemKind::Document(page) => page.lang = Some(lang.into()),
            ItemKind::CoverPage(page) => page.lang = Some(lang.into()),
            _ => {}
        }
        self
    }

    /// Set the title used for the document head and TOC item references.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.set_title(title);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn is_linear(&self) -> bool {
        self.linear
    }

    pub fn set_linear(&mut self, linear: bool) {
        self.linear = linear;
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ItemKind {
        &mut self.kind
    }

    /// Stored raw bytes.
    pub fn content(&self) -> Result<&[u8]> {
        self.content
            .as_deref()
            .ok_or_else(|| Error::ResourceNotFound(self.href.clone()))
    }

    /// Markup inside the `<body>` of the stored content; empty when there is none.
    pub fn body_content(&self) -> Result<String> {
        Ok(crate::epub::render::body_markup(self.content()?))
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = Some(content.into());
    }

    pub fn title(&self) -> &str {
        match &self.kind {
            ItemKind::Document(page) => &page.title,
            ItemKind::CoverPage(page) => &page.title,
            ItemKind::Nav(page) => &page.title,
            _ => "",
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        match &mut self.kind {
            ItemKind::Document(page) => page.title = title.into(),
            ItemKind::CoverPage(page) => page.title = title.into(),
            ItemKind::Nav(page) => page.title = title.into(),
            _ => {}
        }
    }

    pub fn document_page(&self) -> Option<&DocumentPage> {
        match &self.kind {
            ItemKind::Document(page) => Some(page),
            _ => None,
        }
    }

    pub fn document_page_mut(&mut self) -> Option<&mut DocumentPage> {
        match &mut self.kind {
            ItemKind::Document(page) => Some(page),
            _ => None,
        }
    }

    /// Tokens for the manifest `properties` attribute.
    pub fn manifest_properties(&self) -> Vec<&str> {
        match &self.kind {
            ItemKind::Nav(_) => vec!["nav"],
            ItemKind::CoverImage => vec!["cover-image"],
            ItemKind::Document(page) => page.properties.iter().map(String::as_str).collect(),
            ItemKind::Resource | ItemKind::Image | ItemKind::CoverPage(_) | ItemKind::Ncx => {
                Vec::new()
            }
        }
    }

    /// Documents subject to per-document hooks.
    pub fn is_document(&self) -> bool {
        matches!(self.kind, ItemKind::Document(_) | ItemKind::CoverPage(_))
    }

    pub fn is_ncx(&self) -> bool {
        matches!(self.kind, ItemKind::Ncx)
    }

    pub fn item_type(&self) -> ItemType {
        match &self.kind {
            ItemKind::Ncx | ItemKind::Nav(_) => ItemType::Navigation,
            ItemKind::CoverImage => ItemType::Cover,
            ItemKind::Document(_) | ItemKind::CoverPage(_) => ItemType::Document,
            ItemKind::Image if self.media_type == "image/svg+xml" => ItemType::Vector,
            ItemKind::Image => ItemType::Image,
            ItemKind::Resource => item_type_for_media_type(&self.media_type),
        }
    }
}

fn item_type_for_media_type(media_type: &str) -> ItemType {
    let (top, sub) = media_type.split_once('/').unwrap_or((media_type, ""));
    match (top, sub) {
        (_, "css") => ItemType::Style,
        (_, "javascript") | (_, "ecmascript") | (_, "x-javascript") => ItemType::Script,
        ("image", "svg+xml") => ItemType::Vector,
        ("image", _) => ItemType::Image,
        ("font", _) | (_, "font-woff") | (_, "vnd.ms-opentype") | (_, "x-font-ttf") => {
            ItemType::Font
        }
        ("video", _) => ItemType::Video,
        ("audio", _) => ItemType::Audio,
        (_, "smil+xml") => ItemType::Smil,
        (_, "xhtml+xml") => ItemType::Document,
        (_, "x-dtbncx+xml") => ItemType::Navigation,
        _ => ItemType::Unknown,
    }
}

/// Per-book id counters; values are never handed out twice.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdCounters {
    chapter: usize,
    image: usize,
    other: usize,
}

impl IdCounters {
    pub(crate) fn next_for(&mut self, kind: &ItemKind) -> String {
        match kind {
            ItemKind::Image | ItemKind::CoverImage => {
                self.image += 1;
                format!("image_{}", self.image)
            }
            ItemKind::Document(_) | ItemKind::CoverPage(_) | ItemKind::Nav(_) => {
                self.chapter += 1;
                format!("chapter_{}", self.chapter)
            }
            ItemKind::Resource | ItemKind::Ncx => {
                self.other += 1;
                format!("static_{}", self.other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ids() {
        assert_eq!(Item::ncx().id(), "ncx");
        assert_eq!(Item::ncx().href(), "toc.ncx");
        assert_eq!(Item::nav().id(), "nav");
        assert_eq!(Item::cover_image("c.jpg", vec![]).id(), "cover-img");
        assert_eq!(Item::cover_page("c.jpg").href(), "cover.xhtml");
    }

    #[test]
    fn test_body_content() {
        let item = Item::document("ch1.xhtml", "One")
            .with_content("<html><head><title>One</title></head><body><h1>One</h1></body></html>");
        assert_eq!(item.body_content().unwrap(), "<h1>One</h1>");

        let empty = Item::document("ch2.xhtml", "Two");
        assert!(matches!(empty.body_content(), Err(Error::ResourceNotFound(_))));
    }

    #[test]
    fn test_manifest_properties() {
        assert_eq!(Item::nav().manifest_properties(), ["nav"]);
        assert_eq!(
            Item::cover_image("c.jpg", vec![]).manifest_properties(),
            ["cover-image"]
        );
        assert!(Item::ncx().manifest_properties().is_empty());
    }

    #[test]
    fn test_script_link_marks_scripted() {
        let mut page = DocumentPage::default();
        page.add_link(HeadLink::stylesheet("style.css"));
        assert!(page.properties.is_empty());
        page.add_link(HeadLink::script("app.js"));
        page.add_link(HeadLink::script("more.js"));
        assert_eq!(page.properties, ["scripted"]);
        assert_eq!(page.links.len(), 3);
    }

    #[test]
    fn test_link_item() {
        let css = Item::new("style/default.css", "").with_media_type("text/css");
        let mut page = DocumentPage::default();
        page.link_item(&css);
        assert_eq!(page.links, [HeadLink::stylesheet("style/default.css")]);
    }

    #[test]
    fn test_item_type() {
        let css = Item::new("a.css", "").with_media_type("text/css");
        assert_eq!(css.item_type(), ItemType::Style);
        let font = Item::new("a.otf", "").with_media_type("font/otf");
        assert_eq!(font.item_type(), ItemType::Font);
        assert_eq!(Item::ncx().item_type(), ItemType::Navigation);
        assert_eq!(Item::document("a.xhtml", "A").item_type(), ItemType::Document);
    }

    #[test]
    fn test_missing_content() {
        let doc = Item::document("a.xhtml", "A");
        assert!(matches!(doc.content(), Err(Error::ResourceNotFound(href)) if href == "a.xhtml"));
    }

    #[test]
    fn test_counters() {
        let mut counters = IdCounters::default();
        let doc = ItemKind::Document(DocumentPage::default());
        assert_eq!(counters.next_for(&doc), "chapter_1");
        assert_eq!(counters.next_for(&ItemKind::Image), "image_1");
        assert_eq!(counters.next_for(&doc), "chapter_2");
        assert_eq!(counters.next_for(&ItemKind::Resource), "static_1");
    }
}
