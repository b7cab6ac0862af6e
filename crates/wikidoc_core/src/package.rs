use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::assembler::{DocsetBuild, SinglePageSite};
use crate::config::DocsetIdentity;
use crate::html::escape_text;
use crate::index::{IndexWriteReport, write_search_index};

pub const SEARCH_INDEX_FILENAME: &str = "docSet.dsidx";

#[derive(Debug, Clone, Serialize)]
pub struct DocsetWriteReport {
    pub bundle_path: PathBuf,
    pub documents_written: usize,
    pub index: IndexWriteReport,
}

/// Layout of a `<Name>.docset` bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsetLayout {
    pub bundle: PathBuf,
    pub contents: PathBuf,
    pub resources: PathBuf,
    pub documents: PathBuf,
}

impl DocsetLayout {
    pub fn new(output_dir: &Path, name: &str) -> Self {
        let bundle = output_dir.join(format!("{name}.docset"));
        let contents = bundle.join("Contents");
        let resources = contents.join("Resources");
        let documents = resources.join("Documents");
        Self {
            bundle,
            contents,
            resources,
            documents,
        }
    }

    pub fn info_plist(&self) -> PathBuf {
        self.contents.join("Info.plist")
    }

    pub fn search_index(&self) -> PathBuf {
        self.resources.join(SEARCH_INDEX_FILENAME)
    }
}

pub fn write_single_page(output_dir: &Path, file_name: &str, site: &SinglePageSite) -> Result<PathBuf> {
    let path = output_dir.join(file_name);
    write_text_file(&path, &site.html)?;
    Ok(path)
}

/// Write the docset bundle, replacing any previous bundle with the same name.
pub fn write_docset(
    output_dir: &Path,
    identity: &DocsetIdentity,
    build: &DocsetBuild,
) -> Result<DocsetWriteReport> {
    let layout = DocsetLayout::new(output_dir, &identity.name);
    if layout.bundle.exists() {
        fs::remove_dir_all(&layout.bundle)
            .with_context(|| format!("failed to remove previous bundle {}", layout.bundle.display()))?;
    }
    fs::create_dir_all(&layout.documents)
        .with_context(|| format!("failed to create {}", layout.documents.display()))?;

    for document in &build.documents {
        write_text_file(&layout.documents.join(&document.file_name), &document.html)?;
    }
    write_text_file(
        &layout.info_plist(),
        &render_info_plist(identity, &build.index_file),
    )?;
    let index = write_search_index(&layout.search_index(), &build.entries)?;
    tracing::info!(
        bundle = %layout.bundle.display(),
        documents = build.documents.len(),
        inserted = index.inserted,
        ignored = index.ignored,
        "wrote docset"
    );

    Ok(DocsetWriteReport {
        bundle_path: layout.bundle,
        documents_written: build.documents.len(),
        index,
    })
}

pub fn render_info_plist(identity: &DocsetIdentity, index_file: &str) -> String {
    let entries = [
        ("CFBundleIdentifier", identity.bundle_id.as_str()),
        ("CFBundleName", identity.name.as_str()),
        ("DocSetPlatformFamily", identity.platform_family.as_str()),
    ];
    let trailing = [
        ("dashIndexFilePath", index_file),
        ("DashDocSetFamily", "dashtoc"),
        ("DashDocSetPluginKeyword", identity.keyword.as_str()),
        ("DashDocSetFallbackURL", index_file),
        ("DashDocSetDeclaredInStyle", "originalName"),
    ];

    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n<plist version=\"1.0\">\n<dict>\n",
    );
    for (key, value) in entries {
        push_string_entry(&mut out, key, value);
    }
    out.push_str("  <key>isDashDocset</key>\n  <true/>\n");
    for (key, value) in trailing {
        push_string_entry(&mut out, key, value);
    }
    out.push_str("</dict>\n</plist>\n");
    out
}

fn push_string_entry(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!(
        "  <key>{key}</key>\n  <string>{}</string>\n",
        escape_text(value)
    ));
}

fn write_text_file(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
