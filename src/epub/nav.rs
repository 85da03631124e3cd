//! EPUB 3 navigation document: table of contents, landmarks and page-list.

use super::options::WriteOptions;
use super::render::Shell;
use crate::book::{Book, Item, ItemKind, Link, Template, TocNode};
use crate::dom::{Dom, NodeData, NodeId, parse_html};
use crate::error::Result;
use crate::util::{parent_dir, relative_path, resolve_href};

/// A page-break target found in a content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    pub href: String,
    pub id: String,
    pub label: String,
}

/// Render the navigation document for `nav_item`.
pub fn generate_nav(book: &Book, nav_item: &Item, options: &WriteOptions) -> Result<Vec<u8>> {
    let page = match nav_item.kind() {
        ItemKind::Nav(page) => Some(page),
        _ => None,
    };
    let nav_dir = parent_dir(nav_item.href());

    let mut shell = Shell::load(book.template(Template::Nav))?;
    shell.set_language(book.language());

    let title = page
        .map(|p| p.title.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(book.title());
    shell.set_title(title);
    if let Some(page) = page {
        shell.add_links(&page.links);
        if let Some(direction) = page.direction {
            shell.dom.set_attr(shell.body, "dir", direction.as_str());
        }
    }

    let body = shell.body;
    let dom = &mut shell.dom;

    let nav = dom.create_child(
        body,
        "nav",
        &[("epub:type", "toc"), ("id", "id"), ("role", "doc-toc")],
    );
    let heading = dom.create_child(nav, "h2", &[]);
    dom.append_text(heading, title);
    write_toc_list(book, dom, nav, book.toc(), nav_dir)?;

    if options.epub3_landmark && !book.guide().is_empty() {
        let landmarks = dom.create_child(body, "nav", &[("epub:type", "landmarks"), ("id", "guide")]);
        let heading = dom.create_child(landmarks, "h2", &[]);
        dom.append_text(heading, &options.landmark_title);

        let ol = dom.create_child(landmarks, "ol", &[]);
        for reference in book.guide() {
            let li = dom.create_child(ol, "li", &[]);
            let href = relative_path(&reference.href, nav_dir);
            let a = dom.create_child(
                li,
                "a",
                &[
                    ("epub:type", landmark_type(&reference.kind)),
                    ("href", href.as_str()),
                ],
            );
            dom.append_text(a, &reference.title);
        }
    }

    if options.epub3_pages {
        let pages = collect_pages(book, nav_dir);
        if !pages.is_empty() {
            let page_list = dom.create_child(
                body,
                "nav",
                &[("epub:type", "page-list"), ("id", "pages"), ("hidden", "hidden")],
            );
            let heading = dom.create_child(page_list, "h2", &[]);
            dom.append_text(heading, &options.pages_title);

            let ol = dom.create_child(page_list, "ol", &[]);
            for target in &pages {
                let li = dom.create_child(ol, "li", &[]);
                let href = format!("{}#{}", target.href, target.id);
                let a = dom.create_child(li, "a", &[("href", href.as_str())]);
                dom.append_text(a, &target.label);
            }
        }
    }

    Ok(shell.into_bytes())
}

/// Guide types that have a different name in the landmarks vocabulary.
fn landmark_type(kind: &str) -> &str {
    match kind {
        "notes" => "rearnotes",
        "text" => "bodymatter",
        other => other,
    }
}

fn write_toc_list(
    book: &Book,
    dom: &mut Dom,
    parent: NodeId,
    nodes: &[TocNode],
    nav_dir: &str,
) -> Result<()> {
    let ol = dom.create_child(parent, "ol", &[]);
    for node in nodes {
        let li = dom.create_child(ol, "li", &[]);
        match node {
            TocNode::Section(section) => {
                let span = dom.create_child(li, "span", &[]);
                dom.append_text(span, &section.title);
                write_toc_list(book, dom, li, &section.children, nav_dir)?;
            }
            TocNode::Link(_) | TocNode::Item(_) => {
                let (href, title) = book.resolve_toc_node(node)?.unwrap_or_default();
                let href = relative_path(href, nav_dir);
                let a = dom.create_child(li, "a", &[("href", href.as_str())]);
                dom.append_text(a, title);
            }
        }
    }
    Ok(())
}

/// Page-break targets of every content document, in registration then document order.
///
/// An element is a page break when its `epub:type` contains `pagebreak` (or its
/// role is `doc-pagebreak`) and it carries an id. Labels fall back from the
/// element's own text to `aria-label`, then a child heading, then the id.
pub fn collect_pages(book: &Book, nav_dir: &str) -> Vec<PageTarget> {
    let mut pages = Vec::new();
    for item in book.items() {
        let ItemKind::Document(_) = item.kind() else {
            continue;
        };
        let Ok(content) = item.content() else {
            continue;
        };

        let dom = parse_html(content);
        let Some(body) = dom.find_by_tag("body") else {
            continue;
        };
        let href = relative_path(item.href(), nav_dir);

        for id in dom.descendants(body) {
            if !is_pagebreak(&dom, id) {
                continue;
            }
            let Some(anchor) = dom.get_attr(id, "id") else {
                continue;
            };

            let label = own_text(&dom, id)
                .or_else(|| dom.get_attr(id, "aria-label").map(str::to_string))
                .or_else(|| heading_text(&dom, id))
                .unwrap_or_else(|| anchor.to_string());

            pages.push(PageTarget {
                href: href.clone(),
                id: anchor.to_string(),
                label,
            });
        }
    }
    pages
}

fn is_pagebreak(dom: &Dom, id: NodeId) -> bool {
    let typed = dom
        .get_attr(id, "epub:type")
        .is_some_and(|t| t.split_whitespace().any(|v| v == "pagebreak"));
    typed || dom.get_attr(id, "role") == Some("doc-pagebreak")
}

/// Text directly inside an element, ignoring its child elements.
fn own_text(dom: &Dom, id: NodeId) -> Option<String> {
    let text: String = dom
        .children(id)
        .filter_map(|c| dom.text_content(c))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Text of the highest-level direct child heading.
fn heading_text(dom: &Dom, id: NodeId) -> Option<String> {
    ["h1", "h2", "h3", "h4", "h5", "h6"].iter().find_map(|tag| {
        let heading = dom
            .child_elements(id)
            .find(|&c| dom.element_name(c).is_some_and(|n| &**n == *tag))?;
        let text = dom.collect_text(heading);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

/// Entries read back from a navigation document.
#[derive(Debug, Default)]
pub struct ParsedNav {
    pub toc: Vec<TocNode>,
    pub pages: Vec<Link>,
}

/// Parse a navigation document located at `nav_href` (relative to the package
/// document). Hrefs are resolved against the nav document's own directory.
pub fn parse_nav(content: &[u8], nav_href: &str) -> ParsedNav {
    let dom = parse_html(content);
    let base = parent_dir(nav_href);
    let mut parsed = ParsedNav::default();

    for nav in dom.elements_by_tag(dom.document(), "nav") {
        let kind = dom.get_attr(nav, "epub:type").unwrap_or("");
        if has_token(kind, "toc") && parsed.toc.is_empty() {
            if let Some(ol) = first_child_tag(&dom, nav, "ol") {
                parsed.toc = parse_list(&dom, ol, base);
            }
        } else if has_token(kind, "page-list") && parsed.pages.is_empty() {
            for a in dom.elements_by_tag(nav, "a") {
                if let Some(href) = dom.get_attr(a, "href") {
                    let title = dom.collect_text(a).trim().to_string();
                    parsed.pages.push(Link::new(resolve_href(base, href), title));
                }
            }
        }
    }

    parsed
}

fn has_token(value: &str, token: &str) -> bool {
    value.split_whitespace().any(|v| v == token)
}

fn first_child_tag(dom: &Dom, parent: NodeId, tag: &str) -> Option<NodeId> {
    dom.child_elements(parent)
        .find(|&c| dom.element_name(c).is_some_and(|n| n.as_ref() == tag))
}

fn parse_list(dom: &Dom, ol: NodeId, base: &str) -> Vec<TocNode> {
    let mut nodes = Vec::new();
    for li in dom.child_elements(ol) {
        if dom.element_name(li).is_none_or(|n| n.as_ref() != "li") {
            continue;
        }

        let label = dom
            .child_elements(li)
            .find(|&c| {
                matches!(
                    dom.get(c).map(|n| &n.data),
                    Some(NodeData::Element { name, .. }) if name.local.as_ref() == "a" || name.local.as_ref() == "span"
                )
            });
        let title = label
            .map(|l| dom.collect_text(l).trim().to_string())
            .unwrap_or_default();

        if let Some(children) = first_child_tag(dom, li, "ol") {
            nodes.push(TocNode::section(title, parse_list(dom, children, base)));
        } else if let Some(href) = label.and_then(|l| dom.get_attr(l, "href")) {
            nodes.push(TocNode::link(resolve_href(base, href), title));
        }
    }
    nodes
}
