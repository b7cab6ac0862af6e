//! Tolerant tag-boundary tokenizer for rendered HTML.
//!
//! The tokenizer never fails. Anything it cannot read as a tag (an unmatched
//! `<`, an unterminated quote, a tag cut off at end of input) comes back as
//! text, so callers treat malformed fragments as "no match". Every token
//! carries its byte span in the source, which lets callers rewrite a single
//! attribute and copy everything else through untouched.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub name: &'a str,
    /// Raw attribute value as written, without quotes and without entity decoding.
    pub value: Option<&'a str>,
    /// Span of `value` in the source.
    pub value_span: Option<Range<usize>>,
    /// Span of the whole attribute, name through closing quote.
    pub span: Range<usize>,
}

impl Attribute<'_> {
    pub fn is_quoted(&self) -> bool {
        self.value_span
            .as_ref()
            .is_some_and(|value| value.end < self.span.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
    StartTag {
        name: &'a str,
        attributes: Vec<Attribute<'a>>,
        self_closing: bool,
    },
    EndTag {
        name: &'a str,
    },
    Text,
    Comment,
    Declaration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Range<usize>,
}

impl<'a> Token<'a> {
    pub fn is_start(&self, tag: &str) -> bool {
        matches!(&self.kind, TokenKind::StartTag { name, .. } if name.eq_ignore_ascii_case(tag))
    }

    pub fn is_end(&self, tag: &str) -> bool {
        matches!(&self.kind, TokenKind::EndTag { name } if name.eq_ignore_ascii_case(tag))
    }

    /// Raw value of the first attribute called `name`.
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.attribute_entry(name).and_then(|attribute| attribute.value)
    }

    pub fn attribute_entry(&self, name: &str) -> Option<&Attribute<'a>> {
        match &self.kind {
            TokenKind::StartTag { attributes, .. } => attributes
                .iter()
                .find(|attribute| attribute.name.eq_ignore_ascii_case(name)),
            _ => None,
        }
    }

    /// Heading level for `<h1>`..`<h6>` start or end tags.
    pub fn heading_level(&self) -> Option<u8> {
        let name = match &self.kind {
            TokenKind::StartTag { name, .. } | TokenKind::EndTag { name } => *name,
            _ => return None,
        };
        heading_level_of(name)
    }
}

fn heading_level_of(name: &str) -> Option<u8> {
    let bytes = name.as_bytes();
    if bytes.len() == 2 && (bytes[0] == b'h' || bytes[0] == b'H') && (b'1'..=b'6').contains(&bytes[1])
    {
        return Some(bytes[1] - b'0');
    }
    None
}

pub struct Tokenizer<'a> {
    source: &'a str,
    cursor: usize,
    raw_text_end: Option<&'static str>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            raw_text_end: None,
        }
    }

    fn text_until_next_tag(&mut self, start: usize) -> Token<'a> {
        let bytes = self.source.as_bytes();
        let mut end = start + 1;
        while end < bytes.len() && bytes[end] != b'<' {
            end += 1;
        }
        self.cursor = end;
        Token {
            kind: TokenKind::Text,
            span: start..end,
        }
    }

    fn raw_text(&mut self, start: usize, closing: &'static str) -> Token<'a> {
        let haystack = &self.source.as_bytes()[start..];
        let end = find_ascii_case_insensitive(haystack, closing.as_bytes())
            .map_or(self.source.len(), |offset| start + offset);
        self.raw_text_end = None;
        self.cursor = end;
        Token {
            kind: TokenKind::Text,
            span: start..end,
        }
    }

    fn delimited(&mut self, start: usize, terminator: &str, kind: TokenKind<'a>) -> Token<'a> {
        let end = self.source[start..]
            .find(terminator)
            .map_or(self.source.len(), |offset| start + offset + terminator.len());
        self.cursor = end;
        Token {
            kind,
            span: start..end,
        }
    }

    fn end_tag(&mut self, start: usize) -> Option<Token<'a>> {
        let bytes = self.source.as_bytes();
        let name_start = start + 2;
        let name_end = scan_name(bytes, name_start);
        let close = self.source[name_end..].find('>')? + name_end;
        self.cursor = close + 1;
        Some(Token {
            kind: TokenKind::EndTag {
                name: &self.source[name_start..name_end],
            },
            span: start..close + 1,
        })
    }

    fn start_tag(&mut self, start: usize) -> Option<Token<'a>> {
        let bytes = self.source.as_bytes();
        let name_start = start + 1;
        let name_end = scan_name(bytes, name_start);
        let name = &self.source[name_start..name_end];
        let mut attributes = Vec::new();
        let mut position = name_end;

        loop {
            position = skip_whitespace(bytes, position);
            match bytes.get(position)? {
                b'>' => {
                    self.finish_start_tag(name, position + 1);
                    return Some(Token {
                        kind: TokenKind::StartTag {
                            name,
                            attributes,
                            self_closing: false,
                        },
                        span: start..position + 1,
                    });
                }
                b'/' if bytes.get(position + 1) == Some(&b'>') => {
                    self.cursor = position + 2;
                    return Some(Token {
                        kind: TokenKind::StartTag {
                            name,
                            attributes,
                            self_closing: true,
                        },
                        span: start..position + 2,
                    });
                }
                b'/' => position += 1,
                _ => {
                    let (attribute, next) = self.attribute(position)?;
                    attributes.push(attribute);
                    position = next;
                }
            }
        }
    }

    fn finish_start_tag(&mut self, name: &str, after: usize) {
        self.cursor = after;
        if name.eq_ignore_ascii_case("script") {
            self.raw_text_end = Some("</script");
        } else if name.eq_ignore_ascii_case("style") {
            self.raw_text_end = Some("</style");
        }
    }

    fn attribute(&self, start: usize) -> Option<(Attribute<'a>, usize)> {
        let bytes = self.source.as_bytes();
        let mut name_end = start;
        while name_end < bytes.len()
            && !bytes[name_end].is_ascii_whitespace()
            && !matches!(bytes[name_end], b'=' | b'>' | b'/')
        {
            name_end += 1;
        }
        if name_end == start {
            // Stray '=' or similar: skip one byte so the tag loop makes progress.
            return Some((
                Attribute {
                    name: "",
                    value: None,
                    value_span: None,
                    span: start..start + 1,
                },
                start + 1,
            ));
        }
        let name = &self.source[start..name_end];

        let after_name = skip_whitespace(bytes, name_end);
        if bytes.get(after_name) != Some(&b'=') {
            return Some((
                Attribute {
                    name,
                    value: None,
                    value_span: None,
                    span: start..name_end,
                },
                name_end,
            ));
        }

        let value_start = skip_whitespace(bytes, after_name + 1);
        match bytes.get(value_start)? {
            quote @ (b'"' | b'\'') => {
                let inner_start = value_start + 1;
                let inner_end = self.source[inner_start..].find(char::from(*quote))? + inner_start;
                Some((
                    Attribute {
                        name,
                        value: Some(&self.source[inner_start..inner_end]),
                        value_span: Some(inner_start..inner_end),
                        span: start..inner_end + 1,
                    },
                    inner_end + 1,
                ))
            }
            _ => {
                let mut value_end = value_start;
                while value_end < bytes.len()
                    && !bytes[value_end].is_ascii_whitespace()
                    && bytes[value_end] != b'>'
                {
                    value_end += 1;
                }
                Some((
                    Attribute {
                        name,
                        value: Some(&self.source[value_start..value_end]),
                        value_span: Some(value_start..value_end),
                        span: start..value_end,
                    },
                    value_end,
                ))
            }
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.cursor;
        if start >= self.source.len() {
            return None;
        }
        if let Some(closing) = self.raw_text_end
            && !self.source[start..]
                .get(..closing.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(closing))
        {
            return Some(self.raw_text(start, closing));
        }
        self.raw_text_end = None;

        let bytes = self.source.as_bytes();
        if bytes[start] != b'<' {
            return Some(self.text_until_next_tag(start));
        }

        let rest = &self.source[start..];
        let token = if rest.starts_with("<!--") {
            Some(self.delimited(start, "-->", TokenKind::Comment))
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            Some(self.delimited(start, ">", TokenKind::Declaration))
        } else if rest.starts_with("</") && bytes.get(start + 2).is_some_and(u8::is_ascii_alphabetic)
        {
            self.end_tag(start)
        } else if bytes.get(start + 1).is_some_and(u8::is_ascii_alphabetic) {
            self.start_tag(start)
        } else {
            None
        };

        Some(token.unwrap_or_else(|| self.text_until_next_tag(start)))
    }
}

pub fn tokenize(source: &str) -> Tokenizer<'_> {
    Tokenizer::new(source)
}

fn scan_name(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len()
        && !bytes[end].is_ascii_whitespace()
        && !matches!(bytes[end], b'>' | b'/')
    {
        end += 1;
    }
    end
}

fn skip_whitespace(bytes: &[u8], mut position: usize) -> usize {
    while position < bytes.len() && bytes[position].is_ascii_whitespace() {
        position += 1;
    }
    position
}

fn find_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&index| haystack[index..index + needle.len()].eq_ignore_ascii_case(needle))
}

/// Byte range of the content between the first `<tag>` and its matching `</tag>`.
pub fn element_inner_range(html: &str, tag: &str) -> Option<Range<usize>> {
    let mut inner_start = None;
    let mut depth = 0usize;
    for token in tokenize(html) {
        if token.is_start(tag) && !is_self_closing(&token) {
            if inner_start.is_none() {
                inner_start = Some(token.span.end);
            }
            depth += 1;
        } else if token.is_end(tag) && inner_start.is_some() {
            depth -= 1;
            if depth == 0 {
                return inner_start.map(|start| start..token.span.start);
            }
        }
    }
    None
}

/// Byte offset just past the first `<tag ...>` start tag.
pub fn after_start_tag(html: &str, tag: &str) -> Option<usize> {
    tokenize(html)
        .find(|token| token.is_start(tag))
        .map(|token| token.span.end)
}

/// Byte offset of the first `</tag>` end tag.
pub fn before_end_tag(html: &str, tag: &str) -> Option<usize> {
    tokenize(html)
        .find(|token| token.is_end(tag))
        .map(|token| token.span.start)
}

/// Byte offset just past the end tag closing the first `<tag>` element.
pub fn after_first_element(html: &str, tag: &str) -> Option<usize> {
    let mut opened = false;
    for token in tokenize(html) {
        if token.is_start(tag) {
            opened = true;
        } else if opened && token.is_end(tag) {
            return Some(token.span.end);
        }
    }
    None
}

pub fn insert_at(html: &str, position: usize, snippet: &str) -> String {
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..position]);
    out.push_str(snippet);
    out.push_str(&html[position..]);
    out
}

/// Plain text of an HTML fragment: tags and comments dropped, entities
/// decoded, whitespace collapsed.
pub fn plain_text(fragment: &str) -> String {
    let mut raw = String::with_capacity(fragment.len());
    for token in tokenize(fragment) {
        match token.kind {
            TokenKind::Text => raw.push_str(&fragment[token.span]),
            _ => {}
        }
    }
    collapse_whitespace(&decode_entities(&raw))
}

fn is_self_closing(token: &Token<'_>) -> bool {
    matches!(token.kind, TokenKind::StartTag { self_closing: true, .. })
}

pub fn collapse_whitespace(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }

    output.trim().to_string()
}

pub fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match candidate.find(';').filter(|&semi| semi <= 10) {
            Some(semi) => match decode_entity(&candidate[1..semi]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &candidate[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &candidate[1..];
                }
            },
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "hellip" => Some('\u{2026}'),
        "lsquo" => Some('\u{2018}'),
        "rsquo" => Some('\u{2019}'),
        "ldquo" => Some('\u{201c}'),
        "rdquo" => Some('\u{201d}'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        TokenKind, after_first_element, after_start_tag, before_end_tag, decode_entities,
        element_inner_range, escape_attribute, plain_text, tokenize,
    };

    #[test]
    fn tokenizes_tags_attributes_and_text() {
        let html = "<p class=\"lead\" data-x='1' hidden>Hi <b>there</b></p>";
        let tokens: Vec<_> = tokenize(html).collect();
        assert_eq!(tokens.len(), 6);
        assert!(tokens[0].is_start("P"));
        assert_eq!(tokens[0].attribute("class"), Some("lead"));
        assert_eq!(tokens[0].attribute("data-x"), Some("1"));
        assert!(tokens[0].attribute_entry("hidden").is_some());
        assert_eq!(tokens[0].attribute("hidden"), None);
        assert_eq!(&html[tokens[1].span.clone()], "Hi ");
        assert!(tokens[5].is_end("p"));
        assert_eq!(tokens.last().map(|token| token.span.end), Some(html.len()));
    }

    #[test]
    fn tag_spanning_lines_with_unquoted_values() {
        let html = "<h2\n  class=title\n  id=\"setup\"\n>Setup</h2>";
        let first = tokenize(html).next().expect("token");
        assert_eq!(first.heading_level(), Some(2));
        assert_eq!(first.attribute("id"), Some("setup"));
        assert_eq!(first.attribute("class"), Some("title"));
    }

    #[test]
    fn malformed_markup_degrades_to_text() {
        let html = "a < b <a href=\"unterminated>never closed";
        let kinds: Vec<_> = tokenize(html).map(|token| token.kind).collect();
        assert!(kinds.iter().all(|kind| *kind == TokenKind::Text));
        let covered: usize = tokenize(html).map(|token| token.span.len()).sum();
        assert_eq!(covered, html.len());
    }

    #[test]
    fn script_and_style_content_is_raw_text() {
        let html = "<script>if (a < b) { x = '<h1 id=\"no\">'; }</script><h1 id=\"yes\">Yes</h1>";
        let headings: Vec<_> = tokenize(html)
            .filter(|token| token.is_start("h1"))
            .filter_map(|token| token.attribute("id").map(str::to_string))
            .collect();
        assert_eq!(headings, vec!["yes".to_string()]);
    }

    #[test]
    fn comments_and_doctype_are_skipped_as_units() {
        let html = "<!DOCTYPE html><!-- <h1 id=\"x\">X</h1> --><body>ok</body>";
        let starts: Vec<_> = tokenize(html)
            .filter_map(|token| match token.kind {
                TokenKind::StartTag { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["body"]);
    }

    #[test]
    fn element_helpers_locate_positions() {
        let html = "<html><head><title>T</title></head><body class=\"x\"><h1>A</h1><p>b</p></body></html>";
        let inner = element_inner_range(html, "body").expect("body");
        assert_eq!(&html[inner], "<h1>A</h1><p>b</p>");
        let after_body = after_start_tag(html, "body").expect("body open");
        assert!(html[after_body..].starts_with("<h1>"));
        let head_close = before_end_tag(html, "head").expect("head close");
        assert!(html[head_close..].starts_with("</head>"));
        let after_h1 = after_first_element(html, "h1").expect("h1");
        assert!(html[after_h1..].starts_with("<p>"));
        assert!(after_first_element(html, "h2").is_none());
    }

    #[test]
    fn attribute_value_spans() {
        let html = "<a href=\"Page\" title=x>";
        let token = tokenize(html).next().expect("token");
        let href = token.attribute_entry("href").expect("href");
        assert_eq!(&html[href.value_span.clone().expect("span")], "Page");
        assert!(href.is_quoted());
        let title = token.attribute_entry("title").expect("title");
        assert!(!title.is_quoted());
    }

    #[test]
    fn plain_text_strips_tags_and_decodes() {
        assert_eq!(
            plain_text("  Tom &amp; <em>Jerry</em>\n  &#x2014; <code>&lt;b&gt;</code> "),
            "Tom & Jerry \u{2014} <b>"
        );
        assert_eq!(plain_text("<img src=\"x.png\">"), "");
    }

    #[test]
    fn decode_keeps_unknown_entities() {
        assert_eq!(decode_entities("a &bogus; b & c"), "a &bogus; b & c");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
    }

    #[test]
    fn escape_attribute_quotes() {
        assert_eq!(escape_attribute("a\"b'c<&>"), "a&quot;b&#39;c&lt;&amp;&gt;");
    }
}
