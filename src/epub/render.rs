//! Content rendering: wraps stored markup into complete XHTML documents.

use quick_xml::escape::escape;

use crate::book::metadata::ns;
use crate::book::{Book, HeadLink, Item, ItemKind, Template};
use crate::dom::{Dom, NodeId, inner_xhtml, parse_html, parse_xml, qual_name, to_xhtml};
use crate::error::Result;
use crate::util::{parent_dir, relative_path};

/// A parsed template with its structural elements located.
pub(crate) struct Shell {
    pub dom: Dom,
    pub html: NodeId,
    pub head: NodeId,
    pub body: NodeId,
}

impl Shell {
    /// Parse a template, creating `html`, `head` and `body` when it lacks them.
    pub fn load(template: &str) -> Result<Self> {
        let mut dom = parse_xml(template)?;

        let html = match dom.root_element() {
            Some(html) => html,
            None => {
                let html = dom.create_element(qual_name("html", ns::XHTML), Vec::new());
                dom.append(dom.document(), html);
                html
            }
        };

        let found = dom.child_elements(html).find(|&c| is_tag(&dom, c, "body"));
        let body = match found {
            Some(body) => body,
            None => dom.create_child(html, "body", &[]),
        };

        let found = dom.child_elements(html).find(|&c| is_tag(&dom, c, "head"));
        let head = match found {
            Some(head) => head,
            None => {
                let namespace = namespace_of(&dom, html);
                let head = dom.create_element(qual_name("head", &namespace), Vec::new());
                dom.insert_before(body, head);
                head
            }
        };

        Ok(Self {
            dom,
            html,
            head,
            body,
        })
    }

    pub fn set_language(&mut self, lang: &str) {
        self.dom.set_attr(self.html, "lang", lang);
        self.dom.set_attr(self.html, "xml:lang", lang);
    }

    pub fn set_title(&mut self, title: &str) {
        if title.is_empty() {
            return;
        }
        let element = self.dom.create_child(self.head, "title", &[]);
        self.dom.append_text(element, title);
    }

    /// Add one `<link>` (or `<script>`) per head link.
    pub fn add_links(&mut self, links: &[HeadLink]) {
        for link in links {
            if link.is_script() {
                self.dom.create_child(
                    self.head,
                    "script",
                    &[("src", link.href.as_str()), ("type", "text/javascript")],
                );
                continue;
            }

            let mut attrs = vec![("href", link.href.as_str())];
            if let Some(rel) = &link.rel {
                attrs.push(("rel", rel.as_str()));
            }
            if let Some(media_type) = &link.media_type {
                attrs.push(("type", media_type.as_str()));
            }
            self.dom.create_child(self.head, "link", &attrs);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        to_xhtml(&self.dom).into_bytes()
    }
}

fn is_tag(dom: &Dom, id: NodeId, tag: &str) -> bool {
    dom.element_name(id).is_some_and(|n| &**n == tag)
}

fn namespace_of(dom: &Dom, id: NodeId) -> String {
    dom.element_namespace(id)
        .map(|n| n.to_string())
        .unwrap_or_else(|| ns::XHTML.to_string())
}

/// Produce the bytes written for a document or cover page item.
///
/// Content documents are wrapped in the book's chapter template: language on
/// the root, title and head links, then every child of the stored markup's
/// body. Markup without a usable body yields an empty body.
pub fn render_document(book: &Book, item: &Item) -> Result<Vec<u8>> {
    match item.kind() {
        ItemKind::Document(page) => {
            let mut shell = Shell::load(book.template(Template::Chapter))?;
            shell.set_language(page.lang.as_deref().unwrap_or(book.language()));
            shell.set_title(&page.title);
            shell.add_links(&page.links);
            if let Some(direction) = page.direction {
                shell.dom.set_attr(shell.body, "dir", direction.as_str());
            }

            if let Ok(content) = item.content()
                && !content.is_empty()
            {
                let source = parse_html(content);
                if let Some(body) = source.find_by_tag("body") {
                    let children: Vec<NodeId> = source.children(body).collect();
                    for child in children {
                        shell.dom.import(&source, child, shell.body);
                    }
                }
            }

            Ok(shell.into_bytes())
        }
        ItemKind::CoverPage(page) => {
            let Some(image_href) = &page.image_href else {
                return Ok(item.content().map(<[u8]>::to_vec).unwrap_or_default());
            };

            let mut shell = Shell::load(book.template(Template::Cover))?;
            shell.set_language(page.lang.as_deref().unwrap_or(book.language()));
            shell.set_title(&page.title);

            let src = relative_path(image_href, parent_dir(item.href()));
            let img = match shell.dom.find_by_tag("img") {
                Some(img) => img,
                None => shell.dom.create_child(shell.body, "img", &[]),
            };
            shell.dom.set_attr(img, "src", &src);
            shell.dom.set_attr(img, "alt", &page.title);

            Ok(shell.into_bytes())
        }
        _ => Ok(item.content()?.to_vec()),
    }
}

/// Inner markup of the `<body>` of some (X)HTML content.
pub fn body_markup(content: &[u8]) -> String {
    let dom = parse_html(content);
    dom.find_by_tag("body")
        .map(|body| inner_xhtml(&dom, body))
        .unwrap_or_default()
}

/// Markup for a page-break marker that the page-list picks up.
pub fn create_pagebreak(id: &str, label: &str) -> String {
    format!(
        "<span xmlns:epub=\"{}\" epub:type=\"pagebreak\" title=\"{}\" id=\"{}\">{}</span>",
        ns::EPUB,
        escape(id),
        escape(id),
        escape(label)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Direction, HeadLink};

    fn render(book: &Book, id: &str) -> String {
        String::from_utf8(render_document(book, book.item(id).unwrap()).unwrap()).unwrap()
    }

    #[test]
    fn test_shell_creates_missing_head_and_body() {
        let shell = Shell::load(r#"<html xmlns="http://www.w3.org/1999/xhtml"></html>"#).unwrap();
        let children: Vec<NodeId> = shell.dom.child_elements(shell.html).collect();
        assert_eq!(children, [shell.head, shell.body]);
        assert!(is_tag(&shell.dom, shell.head, "head"));
        assert!(is_tag(&shell.dom, shell.body, "body"));

        let out = String::from_utf8(shell.into_bytes()).unwrap();
        assert!(out.contains("<head></head><body></body>"));
    }

    #[test]
    fn test_document_shell() {
        let mut book = Book::new();
        book.set_language("de");
        let mut item = Item::document("ch1.xhtml", "Kapitel").with_id("ch1");
        item.set_content("<html><body><h1>Eins</h1><p>Text</p></body></html>");
        item.document_page_mut().unwrap().add_link(HeadLink::stylesheet("style.css"));
        book.add_item(item).unwrap();

        let out = render(&book, "ch1");
        assert!(out.starts_with("<?xml version='1.0' encoding='utf-8'?>"));
        assert!(out.contains(r#"lang="de" xml:lang="de""#));
        assert!(out.contains("<title>Kapitel</title>"));
        assert!(out.contains(r#"<link href="style.css" rel="stylesheet" type="text/css"/>"#));
        assert!(out.contains("<body><h1>Eins</h1><p>Text</p></body>"));
    }

    #[test]
    fn test_item_language_and_direction_win() {
        let mut book = Book::new();
        let mut item = Item::document("ch1.xhtml", "").with_id("ch1").with_lang("ar");
        item.document_page_mut().unwrap().direction = Some(Direction::Rtl);
        item.set_content("<p>x</p>");
        book.add_item(item).unwrap();

        let out = render(&book, "ch1");
        assert!(out.contains(r#"lang="ar""#));
        assert!(out.contains(r#"<body dir="rtl"><p>x</p></body>"#));
        assert!(!out.contains("<title>"));
    }

    #[test]
    fn test_script_link() {
        let mut book = Book::new();
        let mut item = Item::document("ch1.xhtml", "T").with_id("ch1");
        item.document_page_mut().unwrap().add_link(HeadLink::script("app.js"));
        book.add_item(item).unwrap();

        let out = render(&book, "ch1");
        assert!(out.contains(r#"<script src="app.js" type="text/javascript"></script>"#));
        assert_eq!(book.item("ch1").unwrap().manifest_properties(), ["scripted"]);
    }

    #[test]
    fn test_missing_body_renders_empty_shell() {
        let mut book = Book::new();
        let item = Item::document("ch1.xhtml", "T")
            .with_id("ch1")
            .with_content("<html><head><title>only head</title></head></html>");
        book.add_item(item).unwrap();

        let out = render(&book, "ch1");
        assert!(out.contains("<body></body>"));

        let empty = Item::document("ch2.xhtml", "T").with_id("ch2");
        book.add_item(empty).unwrap();
        assert!(render(&book, "ch2").contains("<body></body>"));
    }

    #[test]
    fn test_cover_page() {
        let mut book = Book::new();
        book.set_cover("images/cover.jpg", vec![1, 2, 3], true).unwrap();

        let out = render(&book, "cover");
        assert!(out.contains(r#"<img src="images/cover.jpg" alt="Cover"/>"#));
        assert!(out.contains("<title>Cover</title>"));
    }

    #[test]
    fn test_resources_pass_through() {
        let mut book = Book::new();
        book.add_item(Item::new("style.css", "p {}").with_id("css")).unwrap();
        assert_eq!(render(&book, "css"), "p {}");
    }

    #[test]
    fn test_body_markup() {
        assert_eq!(
            body_markup(b"<html><head><title>x</title></head><body><p>A &amp; B</p></body></html>"),
            "<p>A &amp; B</p>"
        );
    }

    #[test]
    fn test_create_pagebreak() {
        assert_eq!(
            create_pagebreak("page_4", "4"),
            r#"<span xmlns:epub="http://www.idpf.org/2007/ops" epub:type="pagebreak" title="page_4" id="page_4">4</span>"#
        );
    }
}
