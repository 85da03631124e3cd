//! Table of contents tree.

/// A navigation target with a fixed href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub title: String,
    pub id: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: title.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A heading grouping nested entries. Sections never link anywhere themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub children: Vec<TocNode>,
}

/// One entry of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocNode {
    Link(Link),
    /// Reference to a registered item by id; href and title come from the item.
    Item(String),
    Section(Section),
}

impl TocNode {
    pub fn link(href: impl Into<String>, title: impl Into<String>) -> Self {
        TocNode::Link(Link::new(href, title))
    }

    pub fn item(id: impl Into<String>) -> Self {
        TocNode::Item(id.into())
    }

    pub fn section(title: impl Into<String>, children: Vec<TocNode>) -> Self {
        TocNode::Section(Section {
            title: title.into(),
            children,
        })
    }

    pub fn is_section(&self) -> bool {
        matches!(self, TocNode::Section(_))
    }

    pub fn children(&self) -> &[TocNode] {
        match self {
            TocNode::Section(section) => &section.children,
            _ => &[],
        }
    }
}

/// Number of nesting levels in a tree (0 for an empty tree).
pub fn depth(nodes: &[TocNode]) -> usize {
    nodes
        .iter()
        .map(|node| 1 + depth(node.children()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth() {
        assert_eq!(depth(&[]), 0);
        assert_eq!(depth(&[TocNode::link("a.xhtml", "A")]), 1);

        let tree = vec![
            TocNode::link("a.xhtml", "A"),
            TocNode::section(
                "Part",
                vec![TocNode::section("Inner", vec![TocNode::item("ch1")])],
            ),
        ];
        assert_eq!(depth(&tree), 3);
    }

    #[test]
    fn test_children() {
        let section = TocNode::section("S", vec![TocNode::item("x")]);
        assert!(section.is_section());
        assert_eq!(section.children(), [TocNode::item("x")]);
        assert!(TocNode::link("a", "b").children().is_empty());
    }
}
