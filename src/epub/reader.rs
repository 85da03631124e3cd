use std::io::{Read, Seek};
use std::path::Path;

use log::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use super::nav::parse_nav;
use super::ncx::parse_ncx;
use super::options::ReadOptions;
use super::parser::{ManifestEntry, Package, parse_container, parse_opf};
use super::plugin::{Plugin, run_hooks};
use crate::book::metadata::ns;
use crate::book::{
    Book, CoverPage, DocumentPage, HeadLink, Item, ItemKind, NCX_MEDIA_TYPE, NavPage,
    XHTML_MEDIA_TYPE,
};
use crate::dom::parse_html;
use crate::error::{Error, Result};
use crate::util::{decode_text, guess_media_type, join_path, parent_dir, strip_bom};

/// Read an EPUB file from disk into a [`Book`].
///
/// # Example
///
/// ```no_run
/// use folio::{ReadOptions, read_epub};
///
/// let book = read_epub("path/to/book.epub", &ReadOptions::default())?;
/// println!("Title: {}", book.title());
/// # Ok::<(), folio::Error>(())
/// ```
pub fn read_epub<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Book> {
    let file = std::fs::File::open(path)?;
    read_epub_from_reader(file, options)
}

/// Read an EPUB from any [`Read`] + [`Seek`] source.
///
/// ```no_run
/// use std::io::Cursor;
/// use folio::epub::{ReadOptions, read_epub_from_reader};
///
/// let epub_data: Vec<u8> = std::fs::read("book.epub")?;
/// let book = read_epub_from_reader(Cursor::new(epub_data), &ReadOptions::default())?;
/// # Ok::<(), folio::Error>(())
/// ```
pub fn read_epub_from_reader<R: Read + Seek>(reader: R, options: &ReadOptions) -> Result<Book> {
    EpubReader::new(options.clone()).read(reader)
}

/// Reconstructs books from EPUB packages.
pub struct EpubReader {
    options: ReadOptions,
    plugins: Vec<Box<dyn Plugin>>,
}

impl EpubReader {
    pub fn new(options: ReadOptions) -> Self {
        Self {
            options,
            plugins: Vec::new(),
        }
    }

    /// Register a hook; hooks run in registration order.
    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Read a package. Structural problems abort the whole read.
    pub fn read<R: Read + Seek>(&mut self, reader: R) -> Result<Book> {
        let mut archive = ZipArchive::new(reader)?;
        check_archive_size(&mut archive, self.options.max_archive_size)?;

        // 1. Locate the package document
        let container = read_entry(&mut archive, "META-INF/container.xml")?.ok_or_else(|| {
            Error::PackageStructure("META-INF/container.xml is missing".into())
        })?;
        let opf_path = parse_container(&container)?;
        let opf_dir = parent_dir(&opf_path).to_string();

        let opf_bytes = read_entry(&mut archive, &opf_path)?.ok_or_else(|| {
            Error::PackageStructure(format!("package document {} is missing", opf_path))
        })?;
        debug!("Parsing package document {}", opf_path);
        let package = parse_opf(&decode_text(strip_bom(&opf_bytes), None))?;

        // 2. Book-level fields and metadata
        let mut book = Book::blank();
        book.set_folder_name(opf_dir.clone());
        restore_package_fields(&mut book, &package);

        // 3. Items
        for entry in &package.manifest {
            let path = join_path(&opf_dir, &entry.href);
            let content = read_entry(&mut archive, &path)?;
            if content.is_none() {
                if entry.media_type == NCX_MEDIA_TYPE || entry.has_property("nav") {
                    return Err(Error::PackageStructure(format!(
                        "navigation document {} is missing",
                        path
                    )));
                }
                warn!("Manifest entry {} points at missing file {}", entry.id, path);
            }

            let item = build_item(entry, content);
            if book.item(item.id()).is_some() {
                warn!("Skipping duplicate manifest id {}", entry.id);
                continue;
            }
            book.add_item(item)?;
        }

        // 4. Spine and guide
        for entry in &package.spine {
            if let Err(err) = book.add_spine_item(&entry.idref, entry.linear) {
                warn!("Skipping spine entry: {}", err);
            }
        }
        for reference in &package.guide {
            book.add_guide(reference.clone());
        }

        // 5. Table of contents: the NCX wins, the nav document is the fallback
        if !self.options.ignore_ncx {
            let ncx = package
                .spine_toc
                .as_deref()
                .and_then(|id| book.item(id))
                .filter(|item| item.is_ncx())
                .or_else(|| book.ncx_item());
            if let Some(ncx) = ncx {
                let content = decode_text(strip_bom(ncx.content()?), None).into_owned();
                let toc = parse_ncx(&content, parent_dir(ncx.href()))?;
                book.set_toc(toc);
            }
        }

        if let Some(nav) = book.nav_item() {
            let parsed = parse_nav(nav.content()?, nav.href());
            if book.toc().is_empty() {
                book.set_toc(parsed.toc);
            }
            book.set_pages(parsed.pages);
        }

        // 6. Hooks
        run_hooks(
            &mut self.plugins,
            &mut book,
            |plugin, book| plugin.after_read(book),
            |plugin, book, item| plugin.after_read_document(book, item),
        )?;

        debug!(
            "Read {} items, {} spine entries, {} TOC entries",
            book.items().len(),
            book.spine().len(),
            book.toc().len()
        );
        Ok(book)
    }
}

fn restore_package_fields(book: &mut Book, package: &Package) {
    if let Some(version) = &package.version {
        book.set_version(version.clone());
    }
    if let Some(id) = &package.unique_identifier {
        book.set_identifier_id(id.clone());
    }
    *book.metadata_mut() = package.metadata.clone();

    let identifiers = book.get_metadata(Some(ns::DC), "identifier");
    let uid = identifiers
        .iter()
        .find(|v| v.attr("id") == Some(book.identifier_id()))
        .or_else(|| identifiers.first())
        .map(|v| v.value.clone())
        .unwrap_or_default();
    let title = book
        .metadata()
        .first(Some(ns::DC), "title")
        .map(|v| v.value.clone())
        .unwrap_or_default();
    let language = book
        .metadata()
        .first(Some(ns::DC), "language")
        .map(|v| v.value.clone());
    book.restore_identity(uid, title, language);

    book.set_direction(package.page_progression.or(package.direction));
    for (name, uri) in &package.prefixes {
        book.add_prefix(name.clone(), uri.clone());
    }
    for (prefix, uri) in &package.namespaces {
        book.add_namespace(prefix.clone(), uri.clone());
    }
}

/// Turn a manifest entry into an item of the matching kind.
fn build_item(entry: &ManifestEntry, content: Option<Vec<u8>>) -> Item {
    let media_type = if entry.media_type.is_empty() {
        guess_media_type(&entry.href)
            .unwrap_or("application/octet-stream")
            .to_string()
    } else {
        entry.media_type.clone()
    };

    let kind = if media_type == NCX_MEDIA_TYPE {
        ItemKind::Ncx
    } else if media_type == XHTML_MEDIA_TYPE {
        let head = content.as_deref().map(read_head).unwrap_or_default();
        if entry.has_property("nav") {
            ItemKind::Nav(NavPage {
                title: head.title,
                direction: None,
                links: head.links,
            })
        } else if entry.has_property("cover") {
            ItemKind::CoverPage(CoverPage {
                title: head.title,
                lang: head.lang,
                image_href: None,
            })
        } else {
            ItemKind::Document(DocumentPage {
                title: head.title,
                lang: head.lang,
                direction: None,
                links: head.links,
                properties: entry.properties.clone(),
            })
        }
    } else if media_type.starts_with("image/") {
        if entry.has_property("cover-image") {
            ItemKind::CoverImage
        } else {
            ItemKind::Image
        }
    } else {
        ItemKind::Resource
    };

    let mut item = Item::new(entry.href.clone(), Vec::new())
        .with_id(entry.id.clone())
        .with_media_type(media_type);
    *item.kind_mut() = kind;
    item.content = content;
    item
}

/// Fields recovered from a content document's `<head>`.
#[derive(Debug, Default)]
struct DocumentHead {
    title: String,
    lang: Option<String>,
    links: Vec<HeadLink>,
}

fn read_head(content: &[u8]) -> DocumentHead {
    let dom = parse_html(content);
    let mut head = DocumentHead::default();

    if let Some(html) = dom.root_element() {
        head.lang = dom
            .get_attr(html, "lang")
            .or_else(|| dom.get_attr(html, "xml:lang"))
            .map(str::to_string);
    }

    let Some(head_element) = dom.find_by_tag("head") else {
        return head;
    };
    if let Some(title) = dom.elements_by_tag(head_element, "title").first() {
        head.title = dom.collect_text(*title).trim().to_string();
    }
    for id in dom.child_elements(head_element) {
        match dom.element_name(id).map(|n| &**n) {
            Some("link") => {
                if let Some(href) = dom.get_attr(id, "href") {
                    head.links.push(HeadLink {
                        href: href.to_string(),
                        rel: dom.get_attr(id, "rel").map(str::to_string),
                        media_type: dom.get_attr(id, "type").map(str::to_string),
                    });
                }
            }
            Some("script") => {
                if let Some(src) = dom.get_attr(id, "src") {
                    head.links.push(HeadLink::script(src));
                }
            }
            _ => {}
        }
    }
    head
}

fn check_archive_size<R: Read + Seek>(archive: &mut ZipArchive<R>, limit: Option<u64>) -> Result<()> {
    let Some(limit) = limit else {
        return Ok(());
    };
    let mut total: u64 = 0;
    for i in 0..archive.len() {
        total = total.saturating_add(archive.by_index(i)?.size());
    }
    if total > limit {
        return Err(Error::Archive(ZipError::InvalidArchive(
            "archive exceeds the maximum uncompressed size".into(),
        )));
    }
    Ok(())
}

/// Read an archive entry; `None` when it does not exist.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Option<Vec<u8>>> {
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(Some(contents));
        }
        Err(ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    // Some packages store entries with percent-encoded names.
    let encoded = percent_encoding::utf8_percent_encode(path, HREF_ENCODE).to_string();
    if encoded == path {
        return Ok(None);
    }
    match archive.by_name(&encoded) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            Ok(Some(contents))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Characters escaped in archive entry names, keeping path separators.
const HREF_ENCODE: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?');

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_item_classification() {
        let entry = |id: &str, href: &str, media: &str, props: &[&str]| ManifestEntry {
            id: id.into(),
            href: href.into(),
            media_type: media.into(),
            properties: props.iter().map(|p| p.to_string()).collect(),
        };

        let ncx = build_item(&entry("ncx", "toc.ncx", NCX_MEDIA_TYPE, &[]), None);
        assert!(ncx.is_ncx());

        let nav = build_item(&entry("nav", "nav.xhtml", XHTML_MEDIA_TYPE, &["nav"]), None);
        assert!(matches!(nav.kind(), ItemKind::Nav(_)));

        let cover = build_item(&entry("c", "c.xhtml", XHTML_MEDIA_TYPE, &["cover"]), None);
        assert!(matches!(cover.kind(), ItemKind::CoverPage(_)));

        let doc = build_item(
            &entry("d", "d.xhtml", XHTML_MEDIA_TYPE, &["scripted"]),
            Some(b"<html lang=\"fr\"><head><title>T</title><link rel=\"stylesheet\" href=\"s.css\" type=\"text/css\"/></head><body/></html>".to_vec()),
        );
        let page = doc.document_page().unwrap();
        assert_eq!(page.title, "T");
        assert_eq!(page.lang.as_deref(), Some("fr"));
        assert_eq!(page.properties, ["scripted"]);
        assert_eq!(page.links, [HeadLink::stylesheet("s.css")]);

        let image = build_item(&entry("i", "a.png", "image/png", &[]), None);
        assert!(matches!(image.kind(), ItemKind::Image));
        let cover_image = build_item(&entry("ci", "c.jpg", "image/jpeg", &["cover-image"]), None);
        assert!(matches!(cover_image.kind(), ItemKind::CoverImage));

        let font = build_item(&entry("f", "f.otf", "font/otf", &[]), None);
        assert!(matches!(font.kind(), ItemKind::Resource));
        assert!(!font.has_content());

        let unknown = build_item(&entry("u", "data.bin", "", &[]), Some(vec![1]));
        assert_eq!(unknown.media_type(), "application/octet-stream");
    }
}
