//! NCX (legacy index document) generation and parsing.

use log::warn;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

use super::options::PlayOrder;
use crate::book::{Book, Item, Link, TocNode, toc_depth};
use crate::dom::xml::{get_attr, local_name, resolve_entity};
use crate::error::Result;
use crate::util::{parent_dir, relative_path, resolve_href};

/// State carried through the navMap walk.
struct NavMapWriter<'a> {
    book: &'a Book,
    play_order: PlayOrder,
    /// Directory of the NCX inside the package; every src is relative to it.
    ncx_dir: &'a str,
    /// Position of the next navPoint in document order (pre-order).
    order: usize,
    /// Number of sections seen so far, used for `sep_N` ids.
    sections: usize,
}

/// Generate the NCX document for a book.
///
/// Sections become navPoints with a generated `sep_N` id whose `content/@src`
/// is the href of the first leaf found beneath them; a section with no leaf at
/// all keeps an empty src.
pub fn generate_ncx(
    book: &Book,
    ncx_item: &Item,
    uid: &str,
    play_order: PlayOrder,
) -> Result<String> {
    let mut ncx = String::new();

    ncx.push_str("<?xml version='1.0' encoding='utf-8'?>\n");
    ncx.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    ncx.push_str("  <head>\n");
    ncx.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\"/>\n",
        escape(uid)
    ));
    ncx.push_str(&format!(
        "    <meta name=\"dtb:depth\" content=\"{}\"/>\n",
        toc_depth(book.toc())
    ));
    ncx.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n");
    ncx.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n");
    ncx.push_str("  </head>\n");
    ncx.push_str(&format!(
        "  <docTitle>\n    <text>{}</text>\n  </docTitle>\n",
        escape(book.title())
    ));
    ncx.push_str("  <navMap>\n");

    let mut writer = NavMapWriter {
        book,
        play_order,
        ncx_dir: parent_dir(ncx_item.href()),
        order: 0,
        sections: 0,
    };
    for node in book.toc() {
        let (markup, _) = writer.nav_point(node, 2)?;
        ncx.push_str(&markup);
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    Ok(ncx)
}

impl NavMapWriter<'_> {
    /// Render one navPoint; returns its markup and the first src at or below it.
    fn nav_point(&mut self, node: &TocNode, indent: usize) -> Result<(String, Option<String>)> {
        let indent_str = "  ".repeat(indent);
        let order = self.order;
        self.order += 1;

        let order_attr = if self.play_order.enabled {
            format!(" playOrder=\"{}\"", self.play_order.start_from + order)
        } else {
            String::new()
        };

        let (id, title, src, children) = match node {
            TocNode::Section(section) => {
                let id = format!("sep_{}", self.sections);
                self.sections += 1;

                let mut children = String::new();
                let mut first_src = None;
                for child in &section.children {
                    let (markup, src) = self.nav_point(child, indent + 1)?;
                    children.push_str(&markup);
                    if first_src.is_none() {
                        first_src = src;
                    }
                }
                (id, section.title.clone(), first_src, children)
            }
            TocNode::Link(link) => {
                let id = link
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("navPoint-{}", order + 1));
                let src = relative_path(&link.href, self.ncx_dir);
                (id, link.title.clone(), Some(src), String::new())
            }
            TocNode::Item(item_id) => {
                let (href, title) = self.book.resolve_toc_node(node)?.unwrap_or_default();
                let src = relative_path(href, self.ncx_dir);
                (item_id.clone(), title.to_string(), Some(src), String::new())
            }
        };

        let mut out = String::new();
        out.push_str(&format!(
            "{}<navPoint id=\"{}\"{}>\n",
            indent_str,
            escape(id.as_str()),
            order_attr
        ));
        out.push_str(&format!(
            "{}  <navLabel>\n{}    <text>{}</text>\n{}  </navLabel>\n",
            indent_str,
            indent_str,
            escape(title.as_str()),
            indent_str
        ));
        out.push_str(&format!(
            "{}  <content src=\"{}\"/>\n",
            indent_str,
            escape(src.as_deref().unwrap_or(""))
        ));
        out.push_str(&children);
        out.push_str(&format!("{}</navPoint>\n", indent_str));

        Ok((out, src))
    }
}

#[derive(Default)]
struct NavPointState {
    children: Vec<TocNode>,
    text: Option<String>,
    src: Option<String>,
    id: Option<String>,
}

/// Record the `src` of a `<content>` element on the innermost open navPoint.
fn take_src(stack: &mut [NavPointState], e: &BytesStart) {
    if stack.len() > 1
        && let Some(state) = stack.last_mut()
        && state.src.is_none()
    {
        state.src = get_attr(e, b"src");
    }
}

/// Rebuild the table of contents from an NCX document.
///
/// A navPoint with nested navPoints becomes a [`TocNode::Section`], any other
/// navPoint a [`TocNode::Link`]. Hrefs are resolved against `base_dir`, the
/// NCX's directory relative to the package document.
pub fn parse_ncx(content: &str, base_dir: &str) -> Result<Vec<TocNode>> {
    let mut reader = Reader::from_str(content);

    let mut stack: Vec<NavPointState> = vec![NavPointState::default()];
    let mut in_nav_map = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navMap" => in_nav_map = true,
                    b"navPoint" if in_nav_map => stack.push(NavPointState {
                        id: get_attr(&e, b"id"),
                        ..Default::default()
                    }),
                    b"text" => in_text = true,
                    b"content" => take_src(&mut stack, &e),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"content" {
                    take_src(&mut stack, &e);
                }
            }
            Event::Text(e) => {
                if in_text && stack.len() > 1 && let Some(state) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    state.text.get_or_insert_with(String::new).push_str(&raw);
                }
            }
            Event::GeneralRef(e) => {
                if in_text && stack.len() > 1 && let Some(state) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        state.text.get_or_insert_with(String::new).push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" => in_text = false,
                    b"navMap" => in_nav_map = false,
                    b"navPoint" if stack.len() > 1 => {
                        if let Some(state) = stack.pop() {
                            let title = state.text.unwrap_or_default().trim().to_string();
                            let node = if !state.children.is_empty() {
                                Some(TocNode::section(title, state.children))
                            } else if let Some(src) = state.src {
                                let mut link = Link::new(resolve_href(base_dir, &src), title);
                                link.id = state.id;
                                Some(TocNode::Link(link))
                            } else {
                                warn!("Skipping NCX navPoint without a target: {}", title);
                                None
                            };

                            if let Some(node) = node
                                && let Some(parent) = stack.last_mut()
                            {
                                parent.children.push(node);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(stack.pop().map(|s| s.children).unwrap_or_default())
}
