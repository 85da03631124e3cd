//! In-memory document trees used to render and inspect XHTML.
//!
//! Content documents are parsed leniently with html5ever; templates and other
//! well-formed XML go through quick-xml so their namespace declarations survive.

mod arena;
mod tree_sink;
pub(crate) mod xml;

pub use arena::{Attribute, ChildrenIter, Dom, Node, NodeData, NodeId, attribute_name, qual_name};
pub use tree_sink::DomSink;
pub use xml::{inner_xhtml, node_to_string, parse_xml, to_xhtml};

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;

/// Parse (possibly malformed) HTML/XHTML bytes into a DOM.
///
/// Never fails: like a browser, the parser repairs whatever it is given.
pub fn parse_html(bytes: &[u8]) -> Dom {
    let text = crate::util::decode_text(crate::util::strip_bom(bytes), None);
    parse_document(DomSink::new(), ParseOpts::default())
        .one(text.as_ref())
        .into_dom()
}
