use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::html::{decode_entities, escape_attribute, tokenize};
use crate::sidebar::dash_whitespace;

const EXTERNAL_PREFIXES: &[&str] = &["//", "mailto:", "tel:", "data:", "javascript:"];
const QUALIFIED_EXTENSIONS: &[&str] = &[
    "html", "htm", "md", "markdown", "pdf", "png", "jpg", "jpeg", "gif", "svg", "webp",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    External,
    SameDocument,
    Qualified,
    PageReference {
        /// Decoded page name with the fragment split off.
        name: String,
        /// Raw fragment without the leading `#`.
        fragment: Option<String>,
    },
}

/// Classify an `href` value as written in the markup.
pub fn classify_target(href: &str) -> LinkTarget {
    let href = decode_entities(href.trim());
    if href.is_empty() || href.starts_with('#') {
        return LinkTarget::SameDocument;
    }
    if has_url_scheme(&href)
        || EXTERNAL_PREFIXES
            .iter()
            .any(|prefix| starts_with_ignore_case(&href, prefix))
    {
        return LinkTarget::External;
    }

    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment.to_string())),
        None => (href.as_str(), None),
    };
    let without_query = path.split('?').next().unwrap_or(path);
    if has_qualified_extension(without_query) {
        return LinkTarget::Qualified;
    }

    LinkTarget::PageReference {
        name: percent_decode_str(path).decode_utf8_lossy().trim().to_string(),
        fragment,
    }
}

fn has_url_scheme(href: &str) -> bool {
    let Some((scheme, _)) = href.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn has_qualified_extension(path: &str) -> bool {
    let Some((_, extension)) = path.rsplit_once('.') else {
        return false;
    };
    QUALIFIED_EXTENSIONS
        .iter()
        .any(|known| extension.eq_ignore_ascii_case(known))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveRule {
    Exact,
    DashNormalized,
    CaseInsensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    SinglePage,
    MultiPage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub html: String,
    pub rewritten: usize,
    /// Page references that matched nothing, as written.
    pub unresolved: Vec<String>,
}

/// Maps page-like link targets to in-document anchors or sibling files.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    mode: Mode,
    identifiers: HashMap<String, String>,
    lowercase_basenames: HashMap<String, String>,
}

impl LinkResolver {
    /// Resolver for single-page output. Pages become resolvable once registered.
    pub fn single_page() -> Self {
        Self {
            mode: Mode::SinglePage,
            identifiers: HashMap::new(),
            lowercase_basenames: HashMap::new(),
        }
    }

    /// Resolver for multi-page output over every known output basename
    /// (file name without `.html`).
    pub fn multi_page<I, S>(basenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let basenames: Vec<String> = basenames
            .into_iter()
            .map(|basename| basename.as_ref().to_string())
            .collect();
        let mut identifiers = HashMap::new();
        let mut lowercase_basenames = HashMap::new();
        for basename in &basenames {
            let file = format!("{basename}.html");
            identifiers.insert(basename.clone(), file.clone());
            lowercase_basenames
                .entry(basename.to_lowercase())
                .or_insert(file);
        }
        for basename in &basenames {
            let file = format!("{basename}.html");
            for alias in [basename.replace('-', " "), basename.replace('-', "_")] {
                identifiers.entry(alias).or_insert_with(|| file.clone());
            }
        }
        Self {
            mode: Mode::MultiPage,
            identifiers,
            lowercase_basenames,
        }
    }

    pub fn register_page(&mut self, name: &str, anchor_id: &str) {
        self.identifiers
            .insert(name.to_string(), anchor_id.to_string());
    }

    /// Identifier for a page name, trying exact, dash-normalized, then (multi-page only)
    /// case-insensitive matching.
    pub fn lookup(&self, name: &str) -> Option<(String, ResolveRule)> {
        if let Some(identifier) = self.identifiers.get(name) {
            return Some((identifier.clone(), ResolveRule::Exact));
        }
        if let Some(identifier) = self.identifiers.get(&dash_whitespace(name)) {
            return Some((identifier.clone(), ResolveRule::DashNormalized));
        }
        if self.mode == Mode::MultiPage
            && let Some(file) = self.lowercase_basenames.get(&name.to_lowercase())
        {
            return Some((file.clone(), ResolveRule::CaseInsensitive));
        }
        None
    }

    /// Rewrite every resolvable page reference in `html`. Bytes outside the
    /// rewritten `href` values and the added `data-page` annotations are kept.
    pub fn rewrite(&self, html: &str) -> RewriteReport {
        let mut out = String::with_capacity(html.len() + 64);
        let mut copied_to = 0usize;
        let mut rewritten = 0usize;
        let mut unresolved = Vec::new();

        for token in tokenize(html) {
            if !token.is_start("a") {
                continue;
            }
            let Some(href) = token.attribute_entry("href") else {
                continue;
            };
            let (Some(raw), Some(value_span)) = (href.value, href.value_span.clone()) else {
                continue;
            };
            let LinkTarget::PageReference { name, fragment } = classify_target(raw) else {
                continue;
            };
            let Some((identifier, rule)) = self.lookup(&name) else {
                tracing::debug!(href = raw, "link target did not match any page");
                unresolved.push(raw.to_string());
                continue;
            };
            tracing::debug!(href = raw, identifier = %identifier, rule = ?rule, "rewrote page link");

            let (destination, annotation) = match self.mode {
                Mode::SinglePage => (
                    format!("#{identifier}"),
                    Some(format!(" data-page=\"{}\"", escape_attribute(&identifier))),
                ),
                Mode::MultiPage => match fragment {
                    Some(fragment) => (format!("{identifier}#{fragment}"), None),
                    None => (identifier, None),
                },
            };

            if href.is_quoted() {
                out.push_str(&html[copied_to..value_span.start]);
                out.push_str(&escape_attribute(&destination));
                out.push_str(&html[value_span.end..href.span.end]);
            } else {
                out.push_str(&html[copied_to..value_span.start]);
                out.push('"');
                out.push_str(&escape_attribute(&destination));
                out.push('"');
            }
            if let Some(annotation) = annotation {
                out.push_str(&annotation);
            }
            copied_to = href.span.end;
            rewritten += 1;
        }

        out.push_str(&html[copied_to..]);
        RewriteReport {
            html: out,
            rewritten,
            unresolved,
        }
    }
}
