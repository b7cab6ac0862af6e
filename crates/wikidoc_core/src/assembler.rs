use std::fs;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::headings::{HeadingRecord, extract_headings, extract_title};
use crate::html::{
    after_first_element, after_start_tag, before_end_tag, element_inner_range, escape_attribute,
    escape_text, insert_at,
};
use crate::index::{IndexEntry, page_entries};
use crate::links::LinkResolver;
use crate::render::{RenderOptions, RenderOutcome, Renderer};
use crate::sidebar::PageRef;
use crate::toc::{Toc, build_toc};

const SINGLE_PAGE_CSS: &str = include_str!("assets/single-page.css");
const SINGLE_PAGE_SCRIPT: &str = include_str!("assets/single-page.js");
const DOCSET_CSS: &str = include_str!("assets/docset.css");
const FALLBACK_INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// `<title>` of the single-page document.
    pub site_title: String,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            site_title: crate::config::DEFAULT_SITE_TITLE.to_string(),
        }
    }
}

/// A page that was skipped because it could not be read or rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub name: String,
    pub title: String,
    /// Anchor id in single-page output, file name in docset output.
    pub output: String,
    pub headings: usize,
    pub links_rewritten: usize,
    pub links_unresolved: usize,
}

#[derive(Debug, Clone)]
pub struct SinglePageSite {
    pub html: String,
    pub pages: Vec<PageSummary>,
    pub failures: Vec<PageFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsetDocument {
    pub file_name: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct DocsetBuild {
    pub documents: Vec<DocsetDocument>,
    pub entries: Vec<IndexEntry>,
    pub index_file: String,
    pub pages: Vec<PageSummary>,
    pub failures: Vec<PageFailure>,
}

/// Runs the per-page pipeline for both output modes. Pages are processed one
/// at a time in sequence order.
pub struct Assembler<R: Renderer> {
    renderer: R,
    options: AssemblerOptions,
}

impl<R: Renderer> Assembler<R> {
    pub fn new(renderer: R, options: AssemblerOptions) -> Self {
        Self { renderer, options }
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    pub fn build_single_page(
        &mut self,
        pages: &[PageRef],
        footer_source: Option<&str>,
    ) -> Result<SinglePageSite> {
        ensure_pages(pages)?;
        let footer = self.render_footer(footer_source);
        let mut resolver = LinkResolver::single_page();
        let mut containers = String::new();
        let mut summaries = Vec::new();
        let mut failures = Vec::new();

        for page in pages {
            let rendered = match self.render_page(page) {
                Ok(rendered) => rendered,
                Err(failure) => {
                    failures.push(failure);
                    continue;
                }
            };
            let body = match element_inner_range(&rendered, "body") {
                Some(range) => &rendered[range],
                None => rendered.as_str(),
            };
            let title = resolve_title(page, body);
            let headings = extract_headings(body);
            let toc = build_toc(&headings);

            let anchor_id = page.anchor_id();
            resolver.register_page(&page.name, &anchor_id);
            let report = resolver.rewrite(body);

            let mut content = inject_after_first_h1(report.html, toc.render_html().as_deref());
            if let Some(footer) = &footer {
                content.push('\n');
                content.push_str(footer);
            }

            containers.push_str(&format!(
                "<div id=\"page-{}\" class=\"page\">{content}</div>\n",
                escape_attribute(&anchor_id)
            ));
            tracing::info!(page = %page.name, headings = headings.len(), "assembled page");
            summaries.push(PageSummary {
                name: page.name.clone(),
                title,
                output: anchor_id,
                headings: headings.len(),
                links_rewritten: report.rewritten,
                links_unresolved: report.unresolved.len(),
            });
        }

        let html = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{title}</title>\n{css}</head>\n<body>\n{sidebar}\n<div class=\"content\">\n{containers}</div>\n{script}</body>\n</html>\n",
            title = escape_text(&self.options.site_title),
            css = SINGLE_PAGE_CSS,
            sidebar = single_page_sidebar(pages),
            script = SINGLE_PAGE_SCRIPT,
        );

        Ok(SinglePageSite {
            html,
            pages: summaries,
            failures,
        })
    }

    pub fn build_docset(
        &mut self,
        pages: &[PageRef],
        footer_source: Option<&str>,
    ) -> Result<DocsetBuild> {
        ensure_pages(pages)?;
        let footer = self.render_footer(footer_source);
        let resolver = LinkResolver::multi_page(pages.iter().map(|page| page.name.as_str()));
        let navigation = docset_navigation(pages);
        let mut documents = Vec::new();
        let mut entries = Vec::new();
        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        let mut home_document = None;

        for page in pages {
            let rendered = match self.render_page(page) {
                Ok(rendered) => rendered,
                Err(failure) => {
                    failures.push(failure);
                    continue;
                }
            };
            let report = resolver.rewrite(&rendered);
            let title = resolve_title(page, &report.html);
            let headings = extract_headings(&report.html);
            let toc = build_toc(&headings);
            let file_name = page.output_file();

            let html = inject_docset_chrome(
                report.html,
                &page.name,
                &navigation,
                toc.render_html().as_deref(),
                footer.as_deref(),
            );

            entries.extend(page_entries(&title, &file_name, &headings));
            if page.name.eq_ignore_ascii_case("home") {
                home_document = Some(documents.len());
            }
            tracing::info!(page = %page.name, file = %file_name, headings = headings.len(), "assembled page");
            summaries.push(PageSummary {
                name: page.name.clone(),
                title,
                output: file_name.clone(),
                headings: headings.len(),
                links_rewritten: report.rewritten,
                links_unresolved: report.unresolved.len(),
            });
            documents.push(DocsetDocument { file_name, html });
        }

        if let Some(position) = home_document {
            let listing = documentation_listing(&summaries);
            let document = &mut documents[position];
            let html = std::mem::take(&mut document.html);
            document.html = inject_home_listing(html, &listing);
        }

        let index_file = select_index_file(
            home_document.map(|position| documents[position].file_name.as_str()),
            &entries,
        );

        Ok(DocsetBuild {
            documents,
            entries,
            index_file,
            pages: summaries,
            failures,
        })
    }

    /// Render one page and return its heading outline.
    pub fn page_outline(&mut self, page: &PageRef) -> Result<(Vec<HeadingRecord>, Toc)> {
        let rendered = match self.render_page(page) {
            Ok(rendered) => rendered,
            Err(failure) => bail!("failed to render {}: {}", failure.name, failure.reason),
        };
        let body = match element_inner_range(&rendered, "body") {
            Some(range) => &rendered[range],
            None => rendered.as_str(),
        };
        let headings = extract_headings(body);
        let toc = build_toc(&headings);
        Ok((headings, toc))
    }

    /// Render `_Footer.md` content. Falls back to the raw text as a paragraph
    /// when the renderer fails.
    pub fn render_footer(&mut self, footer_source: Option<&str>) -> Option<String> {
        let source = footer_source?;
        let inner = match self.renderer.render(source, RenderOptions::fragment()) {
            RenderOutcome::Rendered(html) => html.trim().to_string(),
            RenderOutcome::Failed { reason } => {
                tracing::warn!(reason = %reason, "footer render failed, using plain text");
                format!("<p>{}</p>", escape_text(source.trim()).replace('\n', "<br>"))
            }
        };
        Some(format!("<footer class=\"page-footer\">{inner}</footer>"))
    }

    fn render_page(&mut self, page: &PageRef) -> std::result::Result<String, PageFailure> {
        let source = fs::read_to_string(&page.source_file).map_err(|error| {
            let failure = PageFailure {
                name: page.name.clone(),
                reason: format!("failed to read {}: {error}", page.source_file.display()),
            };
            tracing::warn!(page = %page.name, reason = %failure.reason, "skipping page");
            failure
        })?;
        match self.renderer.render(&source, RenderOptions::page()) {
            RenderOutcome::Rendered(html) => Ok(html),
            RenderOutcome::Failed { reason } => {
                tracing::warn!(page = %page.name, reason = %reason, "page failed to render, skipping");
                Err(PageFailure {
                    name: page.name.clone(),
                    reason,
                })
            }
        }
    }
}

fn ensure_pages(pages: &[PageRef]) -> Result<()> {
    if pages.is_empty() {
        bail!(
            "no wiki pages to assemble\nAdd a Home.md or list pages in _Sidebar.md, then rerun."
        );
    }
    Ok(())
}

fn resolve_title(page: &PageRef, html: &str) -> String {
    extract_title(html).unwrap_or_else(|| {
        tracing::debug!(page = %page.name, "no <h1> found, using page name as title");
        page.name.clone()
    })
}

fn inject_after_first_h1(html: String, snippet: Option<&str>) -> String {
    let Some(snippet) = snippet else {
        return html;
    };
    match after_first_element(&html, "h1") {
        Some(position) => insert_at(&html, position, &format!("\n{snippet}")),
        None => html,
    }
}

fn inject_docset_chrome(
    html: String,
    page_name: &str,
    navigation: &str,
    toc: Option<&str>,
    footer: Option<&str>,
) -> String {
    let mut html = if let Some(position) = before_end_tag(&html, "head") {
        insert_at(&html, position, DOCSET_CSS)
    } else if let Some(position) = after_first_element(&html, "style") {
        insert_at(&html, position, &format!("\n{DOCSET_CSS}"))
    } else {
        html
    };

    html = match after_start_tag(&html, "body") {
        Some(position) => insert_at(&html, position, &format!("\n{navigation}")),
        None => {
            tracing::warn!(page = %page_name, "no <body> tag, navigation not injected");
            html
        }
    };

    html = inject_after_first_h1(html, toc);

    if let Some(footer) = footer
        && let Some(position) = before_end_tag(&html, "body")
    {
        html = insert_at(&html, position, footer);
    }
    html
}

fn inject_home_listing(html: String, listing: &str) -> String {
    if let Some(position) = after_first_element(&html, "h1") {
        return insert_at(&html, position, &format!("\n{listing}"));
    }
    if let Some(position) = after_start_tag(&html, "body") {
        return insert_at(&html, position, &format!("\n{listing}"));
    }
    html
}

fn single_page_sidebar(pages: &[PageRef]) -> String {
    let mut out = String::from("<nav class=\"sidebar\"><ul>");
    for page in pages {
        let id = escape_attribute(&page.anchor_id());
        out.push_str(&format!(
            "<li><a href=\"#{id}\" data-page=\"{id}\">{}</a></li>",
            escape_text(&page.title)
        ));
    }
    out.push_str("</ul></nav>");
    out
}

fn docset_navigation(pages: &[PageRef]) -> String {
    let mut out = String::from("<nav class=\"main-toc\"><ul>");
    for page in pages {
        out.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>",
            escape_attribute(&page.output_file()),
            escape_text(&page.title)
        ));
    }
    out.push_str("</ul></nav>");
    out
}

fn documentation_listing(pages: &[PageSummary]) -> String {
    let mut out = String::from("<nav class=\"dash-toc\">\n<h2>Documentation</h2>\n<ul>\n");
    for page in pages {
        out.push_str(&format!(
            "  <li><a href=\"{}\">{}</a></li>\n",
            escape_attribute(&page.output),
            escape_text(&page.title)
        ));
    }
    out.push_str("</ul>\n</nav>\n");
    out
}

fn select_index_file(home_file: Option<&str>, entries: &[IndexEntry]) -> String {
    if let Some(home_file) = home_file
        && entries.iter().any(|entry| entry.path == home_file)
    {
        return home_file.to_string();
    }
    entries
        .first()
        .map(|entry| entry.path.clone())
        .unwrap_or_else(|| FALLBACK_INDEX_FILE.to_string())
}
