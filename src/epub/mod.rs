//! EPUB packaging: writing books out to archives and reading them back.
//!
//! The writer produces an EPUB 3 package that also carries the EPUB 2 NCX
//! index and (optionally) the legacy guide. The reader accepts both
//! generations and reconstructs a [`Book`](crate::Book).

pub mod nav;
pub mod ncx;
mod options;
pub(crate) mod parser;
mod plugin;
mod reader;
pub mod render;
mod writer;

pub use nav::{PageTarget, ParsedNav, collect_pages, generate_nav, parse_nav};
pub use ncx::{generate_ncx, parse_ncx};
pub use options::{PlayOrder, ReadOptions, WriteOptions};
pub use plugin::{HookError, Plugin};
pub use reader::{EpubReader, read_epub, read_epub_from_reader};
pub use render::{body_markup, create_pagebreak, render_document};
pub use writer::{EpubWriter, write_epub};
