//! # folio
//!
//! Build, write and read EPUB ebooks.
//!
//! ## Features
//!
//! - An in-memory [`Book`]: metadata, items, spine, table of contents and guide
//! - Write EPUB 3 packages that also carry the EPUB 2 NCX index and guide
//! - Read EPUB 2 and EPUB 3 packages back into a [`Book`]
//! - Hooks around reading and writing via [`epub::Plugin`]
//! - Decode PalmDOC / Mobipocket headers and text ([`mobi`])
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio::{Book, Item, Link, ReadOptions, TocNode, WriteOptions, read_epub, write_epub};
//!
//! let mut book = Book::new();
//! book.set_identifier("id123456");
//! book.set_title("Sample book");
//! book.set_language("en");
//! book.add_author("Author Authorowski");
//!
//! let chapter = Item::document("chap_01.xhtml", "Introduction")
//!     .with_content("<h1>Introduction</h1><p>Introduction paragraph.</p>");
//! let id = book.add_item(chapter)?;
//! book.add_item(Item::ncx())?;
//! book.add_item(Item::nav())?;
//! book.add_spine_item("nav", true)?;
//! book.add_spine_item(&id, true)?;
//! book.add_toc_entry(TocNode::Link(Link::new("chap_01.xhtml", "Introduction")));
//!
//! write_epub("sample.epub", &mut book, WriteOptions::default())?;
//!
//! let book = read_epub("sample.epub", &ReadOptions::default())?;
//! assert_eq!(book.title(), "Sample book");
//! # Ok::<(), folio::Error>(())
//! ```

pub mod book;
pub mod dom;
pub mod epub;
pub mod error;
pub mod mobi;
pub(crate) mod util;

pub use book::{
    Book, Direction, GuideReference, Item, ItemKind, ItemType, Link, MetaValue, Metadata,
    Section, SpineEntry, Template, TocNode,
};
pub use epub::{ReadOptions, WriteOptions, read_epub, write_epub};
pub use error::{Error, Result};
