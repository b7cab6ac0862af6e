use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

pub const SOURCE_EXTENSION: &str = "md";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourcePage {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Markdown pages found at the top level of a wiki checkout, keyed by page name.
#[derive(Debug, Clone, Default)]
pub struct WikiSources {
    pub wiki_dir: PathBuf,
    pages: BTreeMap<String, SourcePage>,
    pub skipped_special: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub pages: usize,
    pub skipped_special: usize,
    pub total_bytes: u64,
}

impl WikiSources {
    pub fn from_pages(wiki_dir: impl Into<PathBuf>, pages: Vec<SourcePage>) -> Self {
        Self {
            wiki_dir: wiki_dir.into(),
            pages: pages
                .into_iter()
                .map(|page| (page.name.clone(), page))
                .collect(),
            skipped_special: 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SourcePage> {
        self.pages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }

    /// The page whose name is `home` in any letter case.
    pub fn home(&self) -> Option<&SourcePage> {
        self.pages
            .values()
            .find(|page| page.name.eq_ignore_ascii_case("home"))
    }

    /// Pages in name order.
    pub fn pages(&self) -> impl Iterator<Item = &SourcePage> {
        self.pages.values()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            pages: self.pages.len(),
            skipped_special: self.skipped_special,
            total_bytes: self.pages.values().map(|page| page.bytes).sum(),
        }
    }
}

/// Scan the top level of `wiki_dir` for `*.md` pages. Files starting with `_`
/// (sidebar, footer) or `.` are not pages.
pub fn scan_wiki_sources(wiki_dir: &Path) -> Result<WikiSources> {
    if !wiki_dir.is_dir() {
        bail!("wiki directory not found at {}", wiki_dir.display());
    }

    let mut pages = Vec::new();
    let mut skipped_special = 0usize;
    for entry in WalkDir::new(wiki_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = entry.with_context(|| format!("failed to walk {}", wiki_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if name.starts_with('_') || name.starts_with('.') {
            skipped_special += 1;
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        pages.push(SourcePage {
            name: name.to_string(),
            path: path.to_path_buf(),
            bytes: metadata.len(),
        });
    }

    let mut sources = WikiSources::from_pages(wiki_dir, pages);
    sources.skipped_special = skipped_special;
    Ok(sources)
}

/// Read a text file, mapping "not found" to `None`.
pub fn read_optional_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{read_optional_text, scan_wiki_sources};

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("parent");
        fs::create_dir_all(parent).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn scan_skips_special_and_nested_files() {
        let temp = tempdir().expect("tempdir");
        let wiki = temp.path().join("wiki");
        write_file(&wiki.join("Home.md"), "# Home");
        write_file(&wiki.join("Getting-Started.md"), "# Getting Started");
        write_file(&wiki.join("_Sidebar.md"), "[Guide](Getting-Started)");
        write_file(&wiki.join("_Footer.md"), "footer");
        write_file(&wiki.join(".hidden.md"), "hidden");
        write_file(&wiki.join("notes.txt"), "not markdown");
        write_file(&wiki.join("images").join("Nested.md"), "nested");

        let sources = scan_wiki_sources(&wiki).expect("scan");
        let names: Vec<&str> = sources.pages().map(|page| page.name.as_str()).collect();
        assert_eq!(names, vec!["Getting-Started", "Home"]);
        assert_eq!(sources.skipped_special, 3);
        assert!(sources.contains("Home"));
        assert_eq!(sources.home().map(|page| page.name.as_str()), Some("Home"));
        assert_eq!(sources.stats().total_bytes, 6 + 17);
    }

    #[test]
    fn home_lookup_is_case_insensitive() {
        let temp = tempdir().expect("tempdir");
        let wiki = temp.path().join("wiki");
        write_file(&wiki.join("home.md"), "# Start");

        let sources = scan_wiki_sources(&wiki).expect("scan");
        assert_eq!(sources.home().map(|page| page.name.as_str()), Some("home"));
    }

    #[test]
    fn scan_fails_for_missing_directory() {
        let temp = tempdir().expect("tempdir");
        let err = scan_wiki_sources(&temp.path().join("absent")).expect_err("must fail");
        assert!(err.to_string().contains("wiki directory not found"));
    }

    #[test]
    fn read_optional_text_maps_missing_to_none() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("_Footer.md");
        assert!(read_optional_text(&path).expect("read").is_none());
        fs::write(&path, "footer").expect("write");
        assert_eq!(read_optional_text(&path).expect("read").as_deref(), Some("footer"));
    }
}
