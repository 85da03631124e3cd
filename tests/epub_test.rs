//! EPUB writer and reader tests.
//!
//! Books are written to in-memory archives (or temp files) and read back, so
//! every test exercises the real packaging path end to end.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use folio::epub::{EpubReader, EpubWriter, HookError, Plugin};
use folio::{
    Book, Error, GuideReference, Item, Link, ReadOptions, TocNode, WriteOptions, read_epub,
    write_epub,
};
use tempfile::TempDir;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

// ============================================================================
// Helpers
// ============================================================================

fn sample_book() -> Book {
    let mut book = Book::new();
    book.set_identifier("id123456");
    book.set_title("Sample book");
    book.set_language("en");
    book.add_author("Author Authorowski");

    let ch1 = Item::document("ch1.xhtml", "One").with_id("ch1").with_content(
        r#"<h1>One</h1><p>First <span epub:type="pagebreak" id="page_1">1</span></p>"#,
    );
    let ch2 = Item::document("ch2.xhtml", "Two").with_id("ch2").with_content(
        r#"<html><body><h1>Two</h1><p>Second <span epub:type="pagebreak" id="page_2">2</span></p></body></html>"#,
    );
    book.add_item(ch1).unwrap();
    book.add_item(ch2).unwrap();
    book.add_item(Item::new("style/main.css", "p { margin: 0 }").with_id("css"))
        .unwrap();
    book.add_item(Item::ncx()).unwrap();
    book.add_item(Item::nav()).unwrap();

    book.add_spine_item("nav", true).unwrap();
    book.add_spine_item("ch1", true).unwrap();
    book.add_spine_item("ch2", true).unwrap();

    book.add_toc_entry(TocNode::link("ch1.xhtml", "One"));
    book.add_toc_entry(TocNode::section("Part", vec![TocNode::item("ch2")]));
    book.add_guide(GuideReference::new("text", "ch1.xhtml", "Start"));
    book
}

fn write_to_vec(book: &mut Book, options: WriteOptions) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let written = EpubWriter::new(options).write(book, &mut cursor).unwrap();
    assert!(written);
    cursor.into_inner()
}

fn read_from_vec(data: Vec<u8>, options: &ReadOptions) -> folio::Result<Book> {
    folio::epub::read_epub_from_reader(Cursor::new(data), options)
}

fn entry(data: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut text = String::new();
    file.read_to_string(&mut text).unwrap();
    text
}

/// Build an archive from `(name, content)` pairs, mimetype first.
fn build_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("mimetype", options).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const EPUB2_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Legacy Book</dc:title>
    <dc:creator opf:role="aut">Old Author</dc:creator>
    <dc:language>fr</dc:language>
    <dc:identifier id="BookId">urn:isbn:123</dc:identifier>
    <meta name="cover" content="cover-image"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="text" href="Text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-image" href="Images/cover.jpg" media-type="image/jpg"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="text"/>
    <itemref idref="missing"/>
  </spine>
  <guide>
    <reference type="text" title="Start" href="Text/chapter%201.xhtml"/>
  </guide>
</package>"#;

const EPUB2_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:isbn:123"/></head>
  <docTitle><text>Legacy Book</text></docTitle>
  <navMap>
    <navPoint id="np1" playOrder="1">
      <navLabel><text>Chapter &amp; Verse</text></navLabel>
      <content src="Text/chapter%201.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

const CHAPTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="fr">
<head><title>Chapitre</title><link rel="stylesheet" type="text/css" href="../style.css"/></head>
<body><p>Bonjour</p></body>
</html>"#;

/// A sink whose every write fails.
struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FailingSink {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Ok(0)
    }
}

// ============================================================================
// Round Trip Tests
// ============================================================================

#[test]
fn test_roundtrip_preserves_book() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());
    let read = read_from_vec(data, &ReadOptions::default()).unwrap();

    assert_eq!(read.uid(), "id123456");
    assert_eq!(read.title(), "Sample book");
    assert_eq!(read.language(), "en");
    assert_eq!(read.version(), "3.0");
    assert_eq!(read.folder_name(), "EPUB");
    assert_eq!(read.get_metadata(Some("DC"), "creator")[0].value, "Author Authorowski");

    let ids: Vec<&str> = read.items().iter().map(|i| i.id()).collect();
    assert_eq!(ids, ["ch1", "ch2", "css", "ncx", "nav"]);
    let spine: Vec<&str> = read.spine().iter().map(|s| s.idref.as_str()).collect();
    assert_eq!(spine, ["nav", "ch1", "ch2"]);

    let ch1 = read.item("ch1").unwrap();
    assert_eq!(ch1.title(), "One");
    assert!(ch1.body_content().unwrap().starts_with("<h1>One</h1>"));
    assert_eq!(read.resource("style/main.css").unwrap(), b"p { margin: 0 }");

    assert_eq!(read.guide(), [GuideReference::new("text", "ch1.xhtml", "Start")]);
}

#[test]
fn test_roundtrip_toc_from_ncx() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());
    let read = read_from_vec(data, &ReadOptions::default()).unwrap();

    assert_eq!(read.toc().len(), 2);
    match &read.toc()[0] {
        TocNode::Link(link) => {
            assert_eq!(link.href, "ch1.xhtml");
            assert_eq!(link.title, "One");
        }
        other => panic!("expected a link, got {:?}", other),
    }
    match &read.toc()[1] {
        TocNode::Section(section) => {
            assert_eq!(section.title, "Part");
            assert_eq!(
                section.children,
                [TocNode::Link(Link::new("ch2.xhtml", "Two").with_id("ch2"))]
            );
        }
        other => panic!("expected a section, got {:?}", other),
    }
}

#[test]
fn test_nav_toc_matches_ncx_toc() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());

    let from_ncx = read_from_vec(data.clone(), &ReadOptions::default()).unwrap();
    let from_nav = read_from_vec(data, &ReadOptions::new().with_ignore_ncx(true)).unwrap();

    fn targets(nodes: &[TocNode], out: &mut Vec<(String, String)>) {
        for node in nodes {
            match node {
                TocNode::Link(link) => out.push((link.href.clone(), link.title.clone())),
                TocNode::Section(section) => {
                    out.push((String::new(), section.title.clone()));
                    targets(&section.children, out);
                }
                TocNode::Item(_) => unreachable!("read books only contain links and sections"),
            }
        }
    }

    let (mut a, mut b) = (Vec::new(), Vec::new());
    targets(from_ncx.toc(), &mut a);
    targets(from_nav.toc(), &mut b);
    assert_eq!(a, b);
}

#[test]
fn test_page_list_roundtrip() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());

    let nav = entry(&data, "EPUB/nav.xhtml");
    let first = nav.find("ch1.xhtml#page_1").unwrap();
    let second = nav.find("ch2.xhtml#page_2").unwrap();
    assert!(first < second);
    assert!(nav.contains(r#"epub:type="page-list""#));

    let read = read_from_vec(data, &ReadOptions::default()).unwrap();
    assert_eq!(
        read.pages(),
        [Link::new("ch1.xhtml#page_1", "1"), Link::new("ch2.xhtml#page_2", "2")]
    );
}

#[test]
fn test_roundtrip_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("book.epub");

    let mut book = sample_book();
    assert!(write_epub(&path, &mut book, WriteOptions::default()).unwrap());

    let read = read_epub(&path, &ReadOptions::default()).unwrap();
    assert_eq!(read.title(), "Sample book");
    assert_eq!(read.items().len(), 5);
}

// ============================================================================
// Writer Option Tests
// ============================================================================

#[test]
fn test_guide_and_landmarks_toggles() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());
    assert!(entry(&data, "EPUB/content.opf").contains("<guide>"));
    let nav = entry(&data, "EPUB/nav.xhtml");
    assert!(nav.contains(r#"epub:type="landmarks""#));
    assert!(nav.contains(r#"epub:type="bodymatter""#));

    let options = WriteOptions::new()
        .with_epub2_guide(false)
        .with_landmarks(false)
        .with_page_list(false);
    let data = write_to_vec(&mut book, options);
    assert!(!entry(&data, "EPUB/content.opf").contains("<guide>"));
    let nav = entry(&data, "EPUB/nav.xhtml");
    assert!(!nav.contains("landmarks"));
    assert!(!nav.contains("page-list"));
}

#[test]
fn test_play_order_toggle() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());
    assert!(!entry(&data, "EPUB/toc.ncx").contains("playOrder"));

    let data = write_to_vec(&mut book, WriteOptions::new().with_play_order(1));
    let ncx = entry(&data, "EPUB/toc.ncx");
    assert!(ncx.contains(r#"playOrder="1""#));
    assert!(ncx.contains(r#"playOrder="3""#));
}

#[test]
fn test_custom_titles_and_timestamp() {
    let mut book = sample_book();
    book.set_unique_metadata(Some("DC"), "title", "Renamed", &[]);
    book.item_mut("ch2").unwrap().set_linear(false);

    let options = WriteOptions::new()
        .with_landmark_title("Landmarks")
        .with_pages_title("Print pages")
        .with_modified("2020-05-05T10:00:00Z");
    let data = write_to_vec(&mut book, options);

    let opf = entry(&data, "EPUB/content.opf");
    assert!(opf.contains("2020-05-05T10:00:00Z"));
    assert!(opf.contains("<dc:title>Renamed</dc:title>"));
    assert!(!opf.contains("Sample book"));
    assert!(opf.contains(r#"<itemref idref="ch2" linear="no"/>"#));

    let nav = entry(&data, "EPUB/nav.xhtml");
    assert!(nav.contains("Landmarks"));
    assert!(nav.contains("Print pages"));
    assert!(nav.contains("<h2>Renamed</h2>"));

    let ncx = entry(&data, "EPUB/toc.ncx");
    assert!(ncx.contains("<text>Renamed</text>"));
    assert!(!ncx.contains("Sample book"));
}

#[test]
fn test_empty_section_round_trips_as_empty_link() {
    let mut book = sample_book();
    book.set_toc(vec![TocNode::section("Empty", Vec::new())]);
    let data = write_to_vec(&mut book, WriteOptions::default());
    assert!(entry(&data, "EPUB/toc.ncx").contains(r#"<content src=""/>"#));

    let read = read_from_vec(data, &ReadOptions::default()).unwrap();
    assert_eq!(
        read.toc(),
        [TocNode::Link(Link::new("", "Empty").with_id("sep_0"))]
    );
}

// ============================================================================
// Failure Handling Tests
// ============================================================================

#[test]
fn test_sink_failure_returns_false() {
    let mut book = sample_book();
    let result = EpubWriter::new(WriteOptions::default()).write(&mut book, FailingSink);
    assert!(!result.unwrap());
}

#[test]
fn test_sink_failure_raises_when_requested() {
    let mut book = sample_book();
    let options = WriteOptions::new().with_raise_exceptions(true);
    let result = EpubWriter::new(options).write(&mut book, FailingSink);
    assert!(matches!(result, Err(Error::Io(_)) | Err(Error::Archive(_))));
}

#[test]
fn test_unwritable_path_returns_false() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("book.epub");
    let mut book = sample_book();
    assert!(!write_epub(&path, &mut book, WriteOptions::default()).unwrap());
}

#[test]
fn test_unknown_toc_item_fails() {
    let mut book = sample_book();
    book.add_toc_entry(TocNode::item("nope"));
    let result = EpubWriter::new(WriteOptions::default()).write(&mut book, Cursor::new(Vec::new()));
    assert!(matches!(result, Err(Error::ResourceNotFound(id)) if id == "nope"));
}

// ============================================================================
// Hook Tests
// ============================================================================

struct Stamp;

impl Plugin for Stamp {
    fn before_write(&mut self, book: &mut Book) -> Result<(), HookError> {
        book.set_title("Stamped");
        Ok(())
    }

    fn before_write_document(&mut self, book: &Book, item: &mut Item) -> Result<(), HookError> {
        let body = item.body_content()?;
        let style = book.item("css").map(|css| css.href()).unwrap_or("none");
        item.set_content(format!(
            "<html><body>{}<p>stamped by {} with {}</p></body></html>",
            body,
            book.title(),
            style
        ));
        Ok(())
    }
}

struct Refuse;

impl Plugin for Refuse {
    fn after_read(&mut self, _book: &mut Book) -> Result<(), HookError> {
        Err(Box::new(io::Error::other("refused")))
    }
}

#[test]
fn test_write_hooks_modify_output() {
    let mut book = sample_book();
    let mut cursor = Cursor::new(Vec::new());
    let written = EpubWriter::new(WriteOptions::default())
        .with_plugin(Box::new(Stamp))
        .write(&mut book, &mut cursor)
        .unwrap();
    assert!(written);

    let data = cursor.into_inner();
    assert!(entry(&data, "EPUB/content.opf").contains("Stamped"));
    assert!(entry(&data, "EPUB/ch1.xhtml").contains("<p>stamped by Stamped with style/main.css</p>"));
    assert!(entry(&data, "EPUB/ch2.xhtml").contains("<p>stamped by Stamped with style/main.css</p>"));
}

#[test]
fn test_hook_error_passes_through() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());

    let result = EpubReader::new(ReadOptions::default())
        .with_plugin(Box::new(Refuse))
        .read(Cursor::new(data));
    match result {
        Err(Error::Hook(err)) => assert_eq!(err.to_string(), "refused"),
        other => panic!("expected hook error, got {:?}", other.map(|b| b.title().to_string())),
    }
}

// ============================================================================
// Reader Tests
// ============================================================================

#[test]
fn test_read_epub2_package() {
    let data = build_archive(&[
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", EPUB2_OPF),
        ("OEBPS/toc.ncx", EPUB2_NCX),
        ("OEBPS/Text/chapter 1.xhtml", CHAPTER),
        ("OEBPS/Images/cover.jpg", "jpeg"),
    ]);
    let book = read_from_vec(data, &ReadOptions::default()).unwrap();

    assert_eq!(book.version(), "2.0");
    assert_eq!(book.folder_name(), "OEBPS");
    assert_eq!(book.uid(), "urn:isbn:123");
    assert_eq!(book.identifier_id(), "BookId");
    assert_eq!(book.title(), "Legacy Book");
    assert_eq!(book.language(), "fr");

    let cover = book.item("cover-image").unwrap();
    assert_eq!(cover.media_type(), "image/jpeg");
    assert_eq!(cover.content().unwrap(), b"jpeg");

    let text = book.item("text").unwrap();
    assert_eq!(text.href(), "Text/chapter 1.xhtml");
    assert_eq!(text.title(), "Chapitre");
    let page = text.document_page().unwrap();
    assert_eq!(page.lang.as_deref(), Some("fr"));
    assert_eq!(page.links[0].href, "../style.css");

    // The dangling itemref is dropped.
    assert_eq!(book.spine().len(), 1);
    assert_eq!(
        book.toc(),
        [TocNode::Link(Link::new("Text/chapter 1.xhtml", "Chapter & Verse").with_id("np1"))]
    );
    assert_eq!(book.guide()[0].href, "Text/chapter 1.xhtml");
}

#[test]
fn test_missing_container() {
    let data = build_archive(&[("OEBPS/content.opf", EPUB2_OPF)]);
    assert!(matches!(
        read_from_vec(data, &ReadOptions::default()),
        Err(Error::PackageStructure(_))
    ));
}

#[test]
fn test_missing_ncx_file() {
    let data = build_archive(&[
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", EPUB2_OPF),
        ("OEBPS/Text/chapter 1.xhtml", CHAPTER),
    ]);
    assert!(matches!(
        read_from_vec(data, &ReadOptions::default()),
        Err(Error::PackageStructure(_))
    ));
}

#[test]
fn test_missing_resource_is_tolerated() {
    let data = build_archive(&[
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", EPUB2_OPF),
        ("OEBPS/toc.ncx", EPUB2_NCX),
        ("OEBPS/Text/chapter 1.xhtml", CHAPTER),
    ]);
    let book = read_from_vec(data, &ReadOptions::default()).unwrap();
    assert!(!book.item("cover-image").unwrap().has_content());
}

#[test]
fn test_not_an_archive() {
    assert!(matches!(
        read_from_vec(b"definitely not a zip".to_vec(), &ReadOptions::default()),
        Err(Error::Archive(_))
    ));
}

#[test]
fn test_max_archive_size() {
    let mut book = sample_book();
    let data = write_to_vec(&mut book, WriteOptions::default());

    let options = ReadOptions::new().with_max_archive_size(64);
    assert!(matches!(read_from_vec(data.clone(), &options), Err(Error::Archive(_))));

    let options = ReadOptions::new().with_max_archive_size(10 * 1024 * 1024);
    assert!(read_from_vec(data, &options).is_ok());
}
