use serde::Serialize;

use crate::html::{TokenKind, decode_entities, plain_text, tokenize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingRecord {
    pub level: u8,
    pub id: String,
    pub text: String,
}

impl HeadingRecord {
    pub fn new(level: u8, id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
            text: text.into(),
        }
    }
}

struct OpenHeading<'a> {
    level: u8,
    id: Option<&'a str>,
    content_start: usize,
}

/// Headings with an `id` and non-empty text, in document order.
///
/// A heading ends at the first `</h1>`..`</h6>`; a heading start seen while
/// another is open abandons the open one.
pub fn extract_headings(html: &str) -> Vec<HeadingRecord> {
    let mut out = Vec::new();
    let mut open: Option<OpenHeading<'_>> = None;

    for token in tokenize(html) {
        let Some(level) = token.heading_level() else {
            continue;
        };
        match &token.kind {
            TokenKind::StartTag { .. } => {
                open = Some(OpenHeading {
                    level,
                    id: token.attribute("id").map(str::trim).filter(|id| !id.is_empty()),
                    content_start: token.span.end,
                });
            }
            TokenKind::EndTag { .. } => {
                let Some(heading) = open.take() else {
                    continue;
                };
                let Some(id) = heading.id else {
                    continue;
                };
                let text = plain_text(&html[heading.content_start..token.span.start]);
                if text.is_empty() {
                    continue;
                }
                out.push(HeadingRecord {
                    level: heading.level,
                    id: decode_entities(id),
                    text,
                });
            }
            _ => {}
        }
    }

    out
}

/// Text of the first `<h1>`, whether or not it carries an id.
pub fn extract_title(html: &str) -> Option<String> {
    let mut content_start = None;
    for token in tokenize(html) {
        if token.is_start("h1") {
            content_start = Some(token.span.end);
        } else if token.is_end("h1")
            && let Some(start) = content_start
        {
            let text = plain_text(&html[start..token.span.start]);
            return (!text.is_empty()).then_some(text);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{HeadingRecord, extract_headings, extract_title};
    use crate::index::page_entries;
    use crate::toc::build_toc;

    #[test]
    fn extracts_headings_in_document_order() {
        let html = r#"<h1 id="intro">Intro</h1>
<p>text</p>
<h2 class="x" id="setup">Set <code>up</code></h2>
<h3 id='deep'>Deep &amp; deeper</h3>"#;
        assert_eq!(
            extract_headings(html),
            vec![
                HeadingRecord::new(1, "intro", "Intro"),
                HeadingRecord::new(2, "setup", "Set up"),
                HeadingRecord::new(3, "deep", "Deep & deeper"),
            ]
        );
    }

    #[test]
    fn skips_headings_without_id_or_text() {
        let html = r#"<h1>No id</h1><h2 id="">Empty id</h2><h2 id="blank">  <img src="x.png"> </h2><h2 id="ok">Ok</h2>"#;
        assert_eq!(extract_headings(html), vec![HeadingRecord::new(2, "ok", "Ok")]);
    }

    #[test]
    fn tolerates_multi_line_markup() {
        let html = "<h2\n    class=\"section\"\n    id=\"multi\">\n  Spread\n  over   lines\n</h2>";
        assert_eq!(
            extract_headings(html),
            vec![HeadingRecord::new(2, "multi", "Spread over lines")]
        );
    }

    #[test]
    fn unclosed_heading_is_abandoned() {
        let html = r#"<h2 id="broken">Broken <h3 id="fine">Fine</h3><h4 id="tail">never closed"#;
        assert_eq!(extract_headings(html), vec![HeadingRecord::new(3, "fine", "Fine")]);
    }

    #[test]
    fn mismatched_closing_level_still_closes() {
        let html = r#"<h2 id="a">A</h3><h3 id="b">B</h3>"#;
        let headings = extract_headings(html);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].level, 2);
    }

    #[test]
    fn heading_id_is_entity_decoded() {
        let headings = extract_headings(r#"<h2 id="q&amp;a">Q &amp; A</h2>"#);
        assert_eq!(headings, vec![HeadingRecord::new(2, "q&a", "Q & A")]);

        let toc = build_toc(&headings);
        assert_eq!(
            toc.render_html().as_deref(),
            Some("<nav class=\"page-toc\"><ul><li><a href=\"#q&amp;a\">Q &amp; A</a></li></ul></nav>")
        );
        let entries = page_entries("P", "P.html", &headings);
        assert_eq!(entries[1].path, "P.html#q&a");
    }

    #[test]
    fn title_comes_from_first_h1() {
        assert_eq!(
            extract_title("<h2 id=\"a\">A</h2><h1>Main <em>Title</em></h1><h1 id=\"b\">B</h1>"),
            Some("Main Title".to_string())
        );
        assert_eq!(extract_title("<h2 id=\"a\">A</h2>"), None);
        assert_eq!(extract_title("<h1> </h1>"), None);
    }
}
