use serde::Serialize;

use crate::headings::HeadingRecord;
use crate::html::{escape_attribute, escape_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub heading: HeadingRecord,
    /// Indices into `Toc::nodes`.
    pub children: Vec<usize>,
}

/// Heading outline for one page. Nodes live in an arena; `roots` and each
/// node's `children` index into it in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toc {
    nodes: Vec<TocNode>,
    roots: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineItem {
    pub level: u8,
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineItem>,
}

/// Nest headings with the lookahead rule: a heading opens a scope only when
/// the next heading is deeper, and a new heading first closes every open
/// scope at its own level or deeper.
pub fn build_toc(headings: &[HeadingRecord]) -> Toc {
    let mut toc = Toc::default();
    let mut stack: Vec<(u8, usize)> = Vec::new();

    for (position, heading) in headings.iter().enumerate() {
        let level = heading.level;
        let next_level = headings.get(position + 1).map_or(1, |next| next.level);

        while stack.last().is_some_and(|(open, _)| *open >= level) {
            stack.pop();
        }

        let index = toc.nodes.len();
        toc.nodes.push(TocNode {
            heading: heading.clone(),
            children: Vec::new(),
        });
        match stack.last() {
            Some(&(_, parent)) => toc.nodes[parent].children.push(index),
            None => toc.roots.push(index),
        }

        if next_level > level {
            stack.push((level, index));
        }
    }

    toc
}

impl Toc {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> impl Iterator<Item = &TocNode> {
        self.roots.iter().map(|&index| &self.nodes[index])
    }

    pub fn children<'a>(&'a self, node: &'a TocNode) -> impl Iterator<Item = &'a TocNode> {
        node.children.iter().map(|&index| &self.nodes[index])
    }

    /// `<nav class="page-toc">` markup, or `None` for a page without headings.
    pub fn render_html(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = String::from("<nav class=\"page-toc\">");
        self.render_list(&self.roots, &mut out);
        out.push_str("</nav>");
        Some(out)
    }

    fn render_list(&self, indices: &[usize], out: &mut String) {
        out.push_str("<ul>");
        for &index in indices {
            let node = &self.nodes[index];
            out.push_str("<li><a href=\"#");
            out.push_str(&escape_attribute(&node.heading.id));
            out.push_str("\">");
            out.push_str(&escape_text(&node.heading.text));
            out.push_str("</a>");
            if !node.children.is_empty() {
                self.render_list(&node.children, out);
            }
            out.push_str("</li>");
        }
        out.push_str("</ul>");
    }

    pub fn to_outline(&self) -> Vec<OutlineItem> {
        self.roots.iter().map(|&index| self.outline_item(index)).collect()
    }

    fn outline_item(&self, index: usize) -> OutlineItem {
        let node = &self.nodes[index];
        OutlineItem {
            level: node.heading.level,
            id: node.heading.id.clone(),
            text: node.heading.text.clone(),
            children: node
                .children
                .iter()
                .map(|&child| self.outline_item(child))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Toc, TocNode, build_toc};
    use crate::headings::HeadingRecord;

    fn headings(levels: &[(u8, &str)]) -> Vec<HeadingRecord> {
        levels.iter()
            .map(|(level, id)| {
                let mut text = id.to_string();
                if let Some(first) = text.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                HeadingRecord::new(*level, *id, text)
            })
            .collect()
    }

    fn texts<'a>(nodes: impl Iterator<Item = &'a TocNode>) -> Vec<&'a str> {
        nodes.map(|node| node.heading.text.as_str()).collect()
    }

    fn assert_children_deeper(toc: &Toc, node: &TocNode) {
        for child in toc.children(node) {
            assert!(
                child.heading.level > node.heading.level,
                "{} nested under {}",
                child.heading.id,
                node.heading.id
            );
            assert_children_deeper(toc, child);
        }
    }

    #[test]
    fn siblings_under_single_root() {
        let toc = build_toc(&headings(&[(1, "intro"), (2, "a"), (2, "b")]));
        let roots: Vec<_> = toc.roots().collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].heading.text, "Intro");
        assert_eq!(texts(toc.children(roots[0])), vec!["A", "B"]);
        assert!(toc.children(roots[0]).all(|child| child.children.is_empty()));
    }

    #[test]
    fn skipped_level_nests_directly() {
        let toc = build_toc(&headings(&[(2, "x"), (4, "y")]));
        let roots: Vec<_> = toc.roots().collect();
        assert_eq!(texts(roots.iter().copied()), vec!["X"]);
        assert_eq!(texts(toc.children(roots[0])), vec!["Y"]);
    }

    #[test]
    fn shallower_heading_closes_open_scopes() {
        let toc = build_toc(&headings(&[
            (2, "a"),
            (3, "b"),
            (4, "c"),
            (2, "d"),
            (1, "e"),
            (3, "f"),
        ]));
        assert_eq!(texts(toc.roots()), vec!["A", "D", "E"]);
        let a = toc.roots().next().expect("root");
        let b = toc.children(a).next().expect("b");
        assert_eq!(texts(toc.children(b)), vec!["C"]);
        let e = toc.roots().nth(2).expect("e");
        assert_eq!(texts(toc.children(e)), vec!["F"]);
    }

    #[test]
    fn children_are_always_deeper() {
        let inputs: &[&[(u8, &str)]] = &[
            &[(3, "a"), (1, "b"), (2, "c"), (6, "d"), (2, "e")],
            &[(1, "a"), (1, "b"), (1, "c")],
            &[(6, "a"), (5, "b"), (4, "c"), (5, "d"), (6, "e")],
            &[(2, "a"), (2, "b"), (3, "c"), (3, "d"), (1, "e"), (4, "f")],
        ];
        for input in inputs {
            let toc = build_toc(&headings(input));
            assert_eq!(toc.len(), input.len());
            for root in toc.roots() {
                assert_children_deeper(&toc, root);
            }
        }
    }

    #[test]
    fn rendered_markup_is_balanced() {
        let toc = build_toc(&headings(&[(1, "a"), (2, "b"), (3, "c"), (2, "d"), (5, "e")]));
        let html = toc.render_html().expect("markup");
        assert!(html.starts_with("<nav class=\"page-toc\"><ul><li><a href=\"#a\">A</a><ul>"));
        assert!(html.ends_with("</ul></nav>"));
        assert_eq!(html.matches("<ul>").count(), html.matches("</ul>").count());
        assert_eq!(html.matches("<li>").count(), html.matches("</li>").count());
        assert_eq!(html.matches("<li>").count(), 5);
    }

    #[test]
    fn empty_input_has_no_container() {
        let toc = build_toc(&[]);
        assert!(toc.is_empty());
        assert_eq!(toc.render_html(), None);
        assert!(toc.to_outline().is_empty());
    }

    #[test]
    fn heading_text_is_escaped_in_markup() {
        let toc = build_toc(&[HeadingRecord::new(2, "a&b", "Fish & <Chips>")]);
        assert_eq!(
            toc.render_html().as_deref(),
            Some("<nav class=\"page-toc\"><ul><li><a href=\"#a&amp;b\">Fish &amp; &lt;Chips&gt;</a></li></ul></nav>")
        );
    }

    #[test]
    fn outline_serializes_nested_children() {
        let toc = build_toc(&headings(&[(1, "intro"), (2, "a")]));
        let json = serde_json::to_value(toc.to_outline()).expect("serialize");
        assert_eq!(json[0]["id"], "intro");
        assert_eq!(json[0]["children"][0]["text"], "A");
        assert!(json[0]["children"][0].get("children").is_none());
    }
}
