use std::collections::HashSet;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::filesystem::WikiSources;

const HOME_PAGE: &str = "home";
const MARKDOWN_EXTENSIONS: &[&str] = &[".md", ".markdown"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidebarLink {
    pub text: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub name: String,
    pub title: String,
    pub source_file: PathBuf,
}

impl PageRef {
    /// Identifier used for the page container and hash navigation in single-page output.
    pub fn anchor_id(&self) -> String {
        dash_whitespace(&self.name.to_lowercase())
    }

    /// Sibling file name in multi-page output.
    pub fn output_file(&self) -> String {
        format!("{}.html", self.name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageOrderOptions {
    /// Append source pages the sidebar never mentions, sorted by name.
    pub include_unlisted: bool,
}

/// Extract `[text](target)` pairs in document order.
pub fn parse_sidebar_links(content: &str) -> Vec<SidebarLink> {
    let bytes = content.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        if bytes[cursor] != b'[' {
            cursor += 1;
            continue;
        }
        match parse_link_at(content, cursor) {
            Some((link, next)) => {
                out.push(link);
                cursor = next;
            }
            None => cursor += 1,
        }
    }

    out
}

fn parse_link_at(content: &str, open: usize) -> Option<(SidebarLink, usize)> {
    let text_start = open + 1;
    let text_end = content[text_start..].find(']')? + text_start;
    if text_end == text_start || content.as_bytes().get(text_end + 1) != Some(&b'(') {
        return None;
    }
    let target_start = text_end + 2;
    let target_end = content[target_start..].find(')')? + target_start;
    if target_end == target_start {
        return None;
    }
    Some((
        SidebarLink {
            text: content[text_start..text_end].to_string(),
            target: content[target_start..target_end].to_string(),
        },
        target_end + 1,
    ))
}

/// Page name for a sidebar link target: fragment dropped, percent-decoded,
/// markdown extension stripped.
pub fn page_name_from_target(target: &str) -> String {
    let without_fragment = target.trim().split('#').next().unwrap_or("");
    let decoded = percent_decode_str(without_fragment).decode_utf8_lossy();
    let trimmed = decoded.trim();
    for extension in MARKDOWN_EXTENSIONS {
        let split = trimmed.len().saturating_sub(extension.len());
        if trimmed.is_char_boundary(split) && trimmed[split..].eq_ignore_ascii_case(extension) {
            return trimmed[..split].to_string();
        }
    }
    trimmed.to_string()
}

/// Resolve the page sequence: home first (when its source exists), then every
/// sidebar link whose source exists, in sidebar order, first occurrence wins.
/// A missing sidebar yields the reduced sequence.
pub fn resolve_page_order(
    sidebar: Option<&str>,
    sources: &WikiSources,
    options: &PageOrderOptions,
) -> Vec<PageRef> {
    let mut pages = Vec::new();
    let mut seen = HashSet::new();

    if let Some(home) = sources.home() {
        seen.insert(home.name.clone());
        pages.push(PageRef {
            name: home.name.clone(),
            title: home.name.clone(),
            source_file: home.path.clone(),
        });
    }

    for link in sidebar.map(parse_sidebar_links).unwrap_or_default() {
        let name = page_name_from_target(&link.target);
        if name.eq_ignore_ascii_case(HOME_PAGE) {
            continue;
        }
        let Some(source) = sources.get(&name) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            continue;
        }
        let title = link.text.trim();
        pages.push(PageRef {
            title: if title.is_empty() {
                name.clone()
            } else {
                title.to_string()
            },
            name,
            source_file: source.path.clone(),
        });
    }

    if options.include_unlisted {
        for source in sources.pages() {
            // a second home-like file never joins the sequence
            if source.name.eq_ignore_ascii_case(HOME_PAGE) {
                continue;
            }
            if seen.insert(source.name.clone()) {
                pages.push(PageRef {
                    name: source.name.clone(),
                    title: source.name.clone(),
                    source_file: source.path.clone(),
                });
            }
        }
    }

    pages
}

pub(crate) fn dash_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_was_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                out.push('-');
                previous_was_space = true;
            }
        } else {
            out.push(ch);
            previous_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        PageOrderOptions, PageRef, dash_whitespace, page_name_from_target, parse_sidebar_links,
        resolve_page_order,
    };
    use crate::filesystem::{SourcePage, WikiSources};

    fn sources(names: &[&str]) -> WikiSources {
        WikiSources::from_pages(
            "/wiki",
            names
                .iter()
                .map(|name| SourcePage {
                    name: (*name).to_string(),
                    path: PathBuf::from(format!("/wiki/{name}.md")),
                    bytes: 1,
                })
                .collect(),
        )
    }

    fn names(pages: &[PageRef]) -> Vec<&str> {
        pages.iter().map(|page| page.name.as_str()).collect()
    }

    #[test]
    fn parse_sidebar_links_keeps_order_and_duplicates() {
        let links = parse_sidebar_links(
            "## Pages\n- [Guide](Getting-Started.md)\n- [ ] not a link\n- [FAQ](FAQ)\n- [Guide again](Getting-Started)\n[empty]() [](x)",
        );
        let pairs: Vec<(&str, &str)> = links
            .iter()
            .map(|link| (link.text.as_str(), link.target.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Guide", "Getting-Started.md"),
                ("FAQ", "FAQ"),
                ("Guide again", "Getting-Started"),
            ]
        );
    }

    #[test]
    fn missing_targets_are_dropped_and_home_forced_first() {
        let sources = sources(&["Home", "Getting-Started"]);
        let pages = resolve_page_order(
            Some("[Guide](Getting-Started.md)\n[FAQ](FAQ.md)"),
            &sources,
            &PageOrderOptions::default(),
        );
        assert_eq!(names(&pages), vec!["Home", "Getting-Started"]);
        assert_eq!(pages[0].title, "Home");
        assert_eq!(pages[1].title, "Guide");
        assert_eq!(pages[1].source_file, PathBuf::from("/wiki/Getting-Started.md"));
    }

    #[test]
    fn home_listed_anywhere_appears_once_at_front() {
        let sources = sources(&["Home", "Alpha", "Beta"]);
        for sidebar in [
            "[Alpha](Alpha) [Start](Home) [Beta](Beta)",
            "[Beta](Beta) [Alpha](Alpha) [Home](home.md) [Home](HOME)",
            "[Alpha](Alpha)",
            "",
        ] {
            let pages = resolve_page_order(Some(sidebar), &sources, &PageOrderOptions::default());
            assert_eq!(pages[0].name, "Home", "sidebar: {sidebar}");
            let homes = pages
                .iter()
                .filter(|page| page.name.eq_ignore_ascii_case("home"))
                .count();
            assert_eq!(homes, 1, "sidebar: {sidebar}");
        }
    }

    #[test]
    fn duplicate_sidebar_entries_keep_first_title() {
        let sources = sources(&["Home", "Alpha"]);
        let pages = resolve_page_order(
            Some("[First](Alpha) [Second](Alpha.md)"),
            &sources,
            &PageOrderOptions::default(),
        );
        assert_eq!(names(&pages), vec!["Home", "Alpha"]);
        assert_eq!(pages[1].title, "First");
    }

    #[test]
    fn missing_sidebar_and_missing_home_reduce_softly() {
        let pages = resolve_page_order(None, &sources(&["Home", "Alpha"]), &PageOrderOptions::default());
        assert_eq!(names(&pages), vec!["Home"]);

        let pages = resolve_page_order(
            Some("[Alpha](Alpha)"),
            &sources(&["Alpha"]),
            &PageOrderOptions::default(),
        );
        assert_eq!(names(&pages), vec!["Alpha"]);
    }

    #[test]
    fn unlisted_pages_follow_sidebar_in_name_order() {
        let sources = sources(&["Home", "Zeta", "Alpha", "Beta"]);
        let pages = resolve_page_order(
            Some("[Zeta](Zeta)"),
            &sources,
            &PageOrderOptions {
                include_unlisted: true,
            },
        );
        assert_eq!(names(&pages), vec!["Home", "Zeta", "Alpha", "Beta"]);
        assert_eq!(pages[2].title, "Alpha");
    }

    #[test]
    fn unlisted_pages_never_repeat_home() {
        let sources = sources(&["Home", "home", "Alpha"]);
        let pages = resolve_page_order(
            Some("[Start](home.md)"),
            &sources,
            &PageOrderOptions {
                include_unlisted: true,
            },
        );
        assert_eq!(names(&pages), vec!["Home", "Alpha"]);
        let homes = pages
            .iter()
            .filter(|page| page.name.eq_ignore_ascii_case("home"))
            .count();
        assert_eq!(homes, 1);
    }

    #[test]
    fn page_name_from_target_normalizes() {
        assert_eq!(page_name_from_target(" Getting-Started.md "), "Getting-Started");
        assert_eq!(page_name_from_target("Notes.MARKDOWN"), "Notes");
        assert_eq!(page_name_from_target("Getting%20Started"), "Getting Started");
        assert_eq!(page_name_from_target("Syntax#tables"), "Syntax");
        assert_eq!(page_name_from_target("md"), "md");
    }

    #[test]
    fn anchor_id_and_output_file() {
        let page = PageRef {
            name: "Getting  Started".to_string(),
            title: "Getting Started".to_string(),
            source_file: PathBuf::from("/wiki/Getting  Started.md"),
        };
        assert_eq!(page.anchor_id(), "getting-started");
        assert_eq!(page.output_file(), "Getting  Started.html");
        assert_eq!(dash_whitespace("a \t b"), "a-b");
    }
}
