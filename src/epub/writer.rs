use std::io::{Seek, Write};
use std::path::Path;

use log::{debug, error};
use quick_xml::escape::escape;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::nav::generate_nav;
use super::ncx::generate_ncx;
use super::options::WriteOptions;
use super::plugin::{Plugin, run_hooks};
use super::render::render_document;
use crate::book::metadata::{Attributes, MetaValue, ns};
use crate::book::{Book, ItemKind};
use crate::error::{Error, Result};
use crate::util::{timestamp_now, uuid_v4};

const RENDITION_PREFIX: &str = "rendition: http://www.idpf.org/vocab/rendition/#";

/// Write a [`Book`] to an EPUB file on disk.
///
/// Returns `Ok(false)` when the file cannot be created or written and
/// [`WriteOptions::raise_exceptions`] is off.
///
/// # Example
///
/// ```no_run
/// use folio::{Book, Item, WriteOptions, write_epub};
///
/// let mut book = Book::new();
/// book.set_identifier("urn:isbn:9780000000000");
/// book.set_title("My Book");
/// let id = book.add_item(Item::document("ch1.xhtml", "Chapter 1").with_content("<p>Hi</p>"))?;
/// book.add_spine_item(&id, true)?;
/// write_epub("output.epub", &mut book, WriteOptions::default())?;
/// # Ok::<(), folio::Error>(())
/// ```
pub fn write_epub<P: AsRef<Path>>(path: P, book: &mut Book, options: WriteOptions) -> Result<bool> {
    let mut writer = EpubWriter::new(options);
    let file = match std::fs::File::create(path.as_ref()) {
        Ok(file) => file,
        Err(err) => return writer.handle_failure(Error::Io(err)),
    };
    writer.write(book, file)
}

/// Serializes books into EPUB packages.
pub struct EpubWriter {
    options: WriteOptions,
    plugins: Vec<Box<dyn Plugin>>,
}

impl EpubWriter {
    pub fn new(options: WriteOptions) -> Self {
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

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Write `book` to any [`Write`] + [`Seek`] destination.
    ///
    /// Hooks run first and may modify the book; their errors are returned
    /// as-is. A failure of the sink itself becomes `Ok(false)` unless
    /// [`WriteOptions::raise_exceptions`] is set. The archive is released on
    /// every path.
    pub fn write<W: Write + Seek>(&mut self, book: &mut Book, sink: W) -> Result<bool> {
        run_hooks(
            &mut self.plugins,
            book,
            |plugin, book| plugin.before_write(book),
            |plugin, book, item| plugin.before_write_document(book, item),
        )?;

        match write_package(book, &self.options, sink) {
            Ok(()) => Ok(true),
            Err(err) => self.handle_failure(err),
        }
    }

    fn handle_failure(&self, err: Error) -> Result<bool> {
        if err.is_sink_failure() && !self.options.raise_exceptions {
            error!("Failed to write EPUB: {}", err);
            Ok(false)
        } else {
            Err(err)
        }
    }
}

fn write_package<W: Write + Seek>(book: &Book, options: &WriteOptions, sink: W) -> Result<()> {
    let mut zip = ZipWriter::new(sink);

    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(options.compression_level);

    // The mimetype entry must come first and stay uncompressed.
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    let folder = book.folder_name();
    let opf_path = archive_path(folder, "content.opf");

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(container_xml(&opf_path).as_bytes())?;

    let uid = package_uid(book);
    let modified = options.modified.clone().unwrap_or_else(timestamp_now);

    debug!("Writing package document {}", opf_path);
    let opf = generate_opf(book, &uid, &modified, options)?;
    zip.start_file(opf_path.as_str(), deflated)?;
    zip.write_all(opf.as_bytes())?;

    for item in book.items() {
        let content = match item.kind() {
            ItemKind::Ncx => generate_ncx(book, item, &uid, options.play_order)?.into_bytes(),
            ItemKind::Nav(_) => generate_nav(book, item, options)?,
            ItemKind::Document(_) | ItemKind::CoverPage(_) => render_document(book, item)?,
            ItemKind::Resource | ItemKind::Image | ItemKind::CoverImage => item.content()?.to_vec(),
        };

        debug!("Writing {} ({} bytes)", item.href(), content.len());
        zip.start_file(archive_path(folder, item.href()), deflated)?;
        zip.write_all(&content)?;
    }

    zip.finish()?;
    Ok(())
}

fn archive_path(folder: &str, href: &str) -> String {
    if folder.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", folder, href)
    }
}

fn container_xml(opf_path: &str) -> String {
    format!(
        r#"<?xml version='1.0' encoding='utf-8'?>
<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container" version="1.0">
  <rootfiles>
    <rootfile media-type="application/oebps-package+xml" full-path="{}"/>
  </rootfiles>
</container>
"#,
        escape(opf_path)
    )
}

/// The package's primary identifier.
///
/// Falls back to the `dc:identifier` carrying the identifier id, then to the
/// first `dc:identifier`, then to a fresh `urn:uuid`.
fn package_uid(book: &Book) -> String {
    if !book.uid().is_empty() {
        return book.uid().to_string();
    }
    let identifiers = book.get_metadata(Some(ns::DC), "identifier");
    identifiers
        .iter()
        .find(|v| v.attr("id") == Some(book.identifier_id()))
        .or_else(|| identifiers.first())
        .map(|v| v.value.clone())
        .unwrap_or_else(|| format!("urn:uuid:{}", uuid_v4()))
}

/// Prefix used for each metadata namespace in the package document.
fn metadata_prefixes(book: &Book) -> Vec<(String, String)> {
    let mut prefixes: Vec<(String, String)> = vec![
        ("dc".into(), ns::DC.into()),
        ("opf".into(), ns::OPF.into()),
    ];
    for (prefix, uri) in book.namespaces() {
        if !prefixes.iter().any(|(p, _)| p == prefix) {
            prefixes.push((prefix.clone(), uri.clone()));
        }
    }

    let mut generated = 0;
    for (namespace, _, value) in book.metadata().iter() {
        let Some(uri) = namespace else {
            continue;
        };
        if is_meta_entry(namespace, value) || prefixes.iter().any(|(_, u)| u == uri) {
            continue;
        }
        generated += 1;
        prefixes.push((format!("ns{}", generated), uri.to_string()));
    }
    prefixes
}

/// Entries written back as a generic `<meta>` element: everything in the OPF
/// namespace, plus `name`/`content` and `property` style entries outside DC.
fn is_meta_entry(namespace: Option<&str>, value: &MetaValue) -> bool {
    match namespace {
        Some(ns::OPF) => true,
        Some(ns::DC) => false,
        _ => {
            value.attr("property").is_some()
                || (value.attr("name").is_some() && value.attr("content").is_some())
        }
    }
}

fn generate_opf(book: &Book, uid: &str, modified: &str, options: &WriteOptions) -> Result<String> {
    let mut opf = String::new();
    let identifier_id = book.identifier_id();

    opf.push_str("<?xml version='1.0' encoding='utf-8'?>\n");
    opf.push_str(&format!(
        "<package xmlns=\"{}\" unique-identifier=\"{}\" version=\"3.0\"",
        ns::OPF,
        escape(identifier_id)
    ));

    let mut prefix = RENDITION_PREFIX.to_string();
    for (name, uri) in book.prefixes() {
        prefix.push_str(&format!(" {}: {}", name, uri));
    }
    opf.push_str(&format!(" prefix=\"{}\"", escape(prefix.as_str())));

    if options.package_direction
        && let Some(direction) = book.direction()
    {
        opf.push_str(&format!(" dir=\"{}\"", direction.as_str()));
    }
    opf.push_str(">\n");

    // Metadata
    let prefixes = metadata_prefixes(book);
    opf.push_str("  <metadata");
    for (prefix, uri) in &prefixes {
        opf.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(uri.as_str())));
    }
    opf.push_str(">\n");

    opf.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        escape(modified)
    ));

    let metadata = book.metadata();
    if metadata.get(Some(ns::DC), "identifier").is_empty() {
        let value = MetaValue::new(uid).with_attr("id", identifier_id);
        write_meta_element(&mut opf, "dc:identifier", &value.attributes, &value.value);
    }
    if metadata.get(Some(ns::DC), "title").is_empty() {
        write_meta_element(&mut opf, "dc:title", &Attributes::new(), book.title());
    }
    if metadata.get(Some(ns::DC), "language").is_empty() {
        write_meta_element(&mut opf, "dc:language", &Attributes::new(), book.language());
    }

    let mut id_marked = false;
    for (namespace, name, value) in metadata.iter() {
        match namespace {
            _ if is_meta_entry(namespace, value) => {
                if value.attr("property") == Some("dcterms:modified") {
                    continue;
                }
                write_meta_element(&mut opf, "meta", &value.attributes, &value.value);
            }
            Some(ns::DC) if name == "identifier" => {
                let mut attributes = value.attributes.clone();
                if value.value == uid && !id_marked {
                    attributes.insert("id".into(), identifier_id.to_string());
                    id_marked = true;
                } else if attributes.get("id").map(String::as_str) == Some(identifier_id) {
                    attributes.remove("id");
                }
                write_meta_element(&mut opf, "dc:identifier", &attributes, &value.value);
            }
            Some(uri) => {
                let prefix = prefixes
                    .iter()
                    .find(|(_, u)| u == uri)
                    .map(|(p, _)| p.as_str())
                    .unwrap_or("dc");
                let tag = format!("{}:{}", prefix, name);
                write_meta_element(&mut opf, &tag, &value.attributes, &value.value);
            }
            None => write_meta_element(&mut opf, name, &value.attributes, &value.value),
        }
    }
    opf.push_str("  </metadata>\n");

    // Manifest
    opf.push_str("  <manifest>\n");
    for item in book.items() {
        opf.push_str(&format!(
            "    <item href=\"{}\" id=\"{}\" media-type=\"{}\"",
            escape(item.href()),
            escape(item.id()),
            escape(item.media_type())
        ));
        let properties = item.manifest_properties();
        if !properties.is_empty() {
            opf.push_str(&format!(" properties=\"{}\"", escape(properties.join(" ").as_str())));
        }
        opf.push_str("/>\n");
    }
    opf.push_str("  </manifest>\n");

    // Spine
    opf.push_str("  <spine");
    if let Some(ncx) = book.ncx_item() {
        opf.push_str(&format!(" toc=\"{}\"", escape(ncx.id())));
    }
    if options.spine_direction
        && let Some(direction) = book.direction()
    {
        opf.push_str(&format!(
            " page-progression-direction=\"{}\"",
            direction.as_str()
        ));
    }
    opf.push_str(">\n");

    for entry in book.spine() {
        let item = book
            .item(&entry.idref)
            .ok_or_else(|| Error::InvalidSpine(format!("no item with id {}", entry.idref)))?;
        opf.push_str(&format!("    <itemref idref=\"{}\"", escape(item.id())));
        if !entry.linear || !item.is_linear() {
            opf.push_str(" linear=\"no\"");
        }
        opf.push_str("/>\n");
    }
    opf.push_str("  </spine>\n");

    // Guide
    if options.epub2_guide && !book.guide().is_empty() {
        opf.push_str("  <guide>\n");
        for reference in book.guide() {
            opf.push_str(&format!(
                "    <reference href=\"{}\" title=\"{}\" type=\"{}\"/>\n",
                escape(reference.href.as_str()),
                escape(reference.title.as_str()),
                escape(reference.kind.as_str())
            ));
        }
        opf.push_str("  </guide>\n");
    }

    opf.push_str("</package>\n");
    Ok(opf)
}

fn write_meta_element(opf: &mut String, tag: &str, attributes: &Attributes, value: &str) {
    opf.push_str("    <");
    opf.push_str(tag);
    for (name, attr_value) in attributes {
        opf.push_str(&format!(" {}=\"{}\"", name, escape(attr_value.as_str())));
    }
    if value.is_empty() {
        opf.push_str("/>\n");
    } else {
        opf.push_str(&format!(">{}</{}>\n", escape(value), tag));
    }
}
