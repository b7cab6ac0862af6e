use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::headings::HeadingRecord;

const SEARCH_INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS searchIndex (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    type TEXT,
    path TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS anchor ON searchIndex(name, type, path);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EntryKind {
    Page,
    Section,
}

impl EntryKind {
    /// Type string stored in the search index.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "Guide",
            Self::Section => "Section",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "Guide" => Some(Self::Page),
            "Section" => Some(Self::Section),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub kind: EntryKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexWriteReport {
    pub inserted: usize,
    pub ignored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredIndexStats {
    pub total_rows: usize,
    pub by_type: BTreeMap<String, usize>,
}

/// One page entry plus one section entry per heading.
pub fn page_entries(page_title: &str, output_path: &str, headings: &[HeadingRecord]) -> Vec<IndexEntry> {
    let mut entries = Vec::with_capacity(headings.len() + 1);
    entries.push(IndexEntry {
        name: page_title.to_string(),
        kind: EntryKind::Page,
        path: output_path.to_string(),
    });
    entries.extend(headings.iter().map(|heading| IndexEntry {
        name: heading.text.clone(),
        kind: EntryKind::Section,
        path: format!("{output_path}#{}", heading.id),
    }));
    entries
}

/// Insert entries into the `searchIndex` table at `db_path`, creating it if
/// needed. Rows that repeat an existing `(name, type, path)` are skipped.
pub fn write_search_index(db_path: &Path, entries: &[IndexEntry]) -> Result<IndexWriteReport> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create index directory {}", parent.display()))?;
    }
    let mut connection = open_connection(db_path)?;
    connection
        .execute_batch(SEARCH_INDEX_SCHEMA_SQL)
        .context("failed to initialize searchIndex schema")?;

    let transaction = connection
        .transaction()
        .context("failed to start searchIndex transaction")?;
    let mut statement = transaction
        .prepare("INSERT OR IGNORE INTO searchIndex(name, type, path) VALUES (?1, ?2, ?3)")
        .context("failed to prepare searchIndex insert")?;

    let mut report = IndexWriteReport::default();
    for entry in entries {
        let affected = statement
            .execute(params![entry.name, entry.kind.as_str(), entry.path])
            .with_context(|| format!("failed to insert index entry {}", entry.path))?;
        if affected == 0 {
            tracing::debug!(name = %entry.name, path = %entry.path, "duplicate index entry ignored");
            report.ignored += 1;
        } else {
            report.inserted += affected;
        }
    }
    drop(statement);

    transaction
        .commit()
        .context("failed to commit searchIndex transaction")?;
    Ok(report)
}

/// Entries stored at `db_path` in insertion order, or `None` when there is no index.
pub fn load_index_entries(db_path: &Path) -> Result<Option<Vec<IndexEntry>>> {
    let Some(connection) = open_existing(db_path)? else {
        return Ok(None);
    };
    let mut statement = connection
        .prepare("SELECT name, type, path FROM searchIndex ORDER BY id ASC")
        .context("failed to prepare searchIndex query")?;
    let rows = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .context("failed to run searchIndex query")?;

    let mut out = Vec::new();
    for row in rows {
        let (name, stored_type, path) = row.context("failed to read searchIndex row")?;
        let Some(kind) = EntryKind::from_stored(&stored_type) else {
            tracing::debug!(stored_type = %stored_type, path = %path, "skipping unknown index type");
            continue;
        };
        out.push(IndexEntry { name, kind, path });
    }
    Ok(Some(out))
}

pub fn load_index_stats(db_path: &Path) -> Result<Option<StoredIndexStats>> {
    let Some(connection) = open_existing(db_path)? else {
        return Ok(None);
    };
    let mut statement = connection
        .prepare(
            "SELECT type, COUNT(*) AS count
             FROM searchIndex
             GROUP BY type
             ORDER BY type ASC",
        )
        .context("failed to prepare searchIndex aggregation query")?;
    let rows = statement
        .query_map([], |row| {
            let stored_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((stored_type, count))
        })
        .context("failed to run searchIndex aggregation query")?;

    let mut by_type = BTreeMap::new();
    let mut total_rows = 0usize;
    for row in rows {
        let (stored_type, count) = row.context("failed to read searchIndex aggregation row")?;
        let count = usize::try_from(count).context("type count does not fit into usize")?;
        total_rows += count;
        by_type.insert(stored_type, count);
    }
    Ok(Some(StoredIndexStats {
        total_rows,
        by_type,
    }))
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    Ok(connection)
}

fn open_existing(db_path: &Path) -> Result<Option<Connection>> {
    if !db_path.exists() {
        return Ok(None);
    }
    let connection = open_connection(db_path)?;
    if !table_exists(&connection, "searchIndex")? {
        return Ok(None);
    }
    Ok(Some(connection))
}

fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check sqlite_master for table {table_name}"))?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{
        EntryKind, IndexEntry, load_index_entries, load_index_stats, page_entries,
        write_search_index,
    };
    use crate::headings::HeadingRecord;

    fn entry(name: &str, kind: EntryKind, path: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            kind,
            path: path.to_string(),
        }
    }

    #[test]
    fn page_entries_cover_page_and_sections() {
        let entries = page_entries(
            "Getting Started",
            "Getting-Started.html",
            &[
                HeadingRecord::new(1, "getting-started", "Getting Started"),
                HeadingRecord::new(2, "install", "Install"),
            ],
        );
        assert_eq!(
            entries,
            vec![
                entry("Getting Started", EntryKind::Page, "Getting-Started.html"),
                entry(
                    "Getting Started",
                    EntryKind::Section,
                    "Getting-Started.html#getting-started"
                ),
                entry("Install", EntryKind::Section, "Getting-Started.html#install"),
            ]
        );
    }

    #[test]
    fn identical_entries_are_stored_once() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("Resources").join("docSet.dsidx");
        let page = entry("Home", EntryKind::Page, "Home.html");
        let section = entry("Intro", EntryKind::Section, "Home.html#intro");

        let report = write_search_index(&db_path, &[page.clone(), section.clone(), page.clone()])
            .expect("write index");
        assert_eq!(report.inserted, 2);
        assert_eq!(report.ignored, 1);

        let again = write_search_index(&db_path, std::slice::from_ref(&section)).expect("rewrite");
        assert_eq!(again.inserted, 0);
        assert_eq!(again.ignored, 1);

        let stored = load_index_entries(&db_path)
            .expect("load entries")
            .expect("index exists");
        assert_eq!(stored, vec![page, section]);
    }

    #[test]
    fn same_name_with_different_kind_or_path_is_distinct() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("docSet.dsidx");
        let report = write_search_index(
            &db_path,
            &[
                entry("Setup", EntryKind::Page, "Setup.html"),
                entry("Setup", EntryKind::Section, "Setup.html"),
                entry("Setup", EntryKind::Section, "Setup.html#setup"),
            ],
        )
        .expect("write index");
        assert_eq!(report.inserted, 3);

        let stats = load_index_stats(&db_path)
            .expect("load stats")
            .expect("index exists");
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.by_type.get("Guide"), Some(&1));
        assert_eq!(stats.by_type.get("Section"), Some(&2));
    }

    #[test]
    fn missing_index_loads_as_none() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("absent.dsidx");
        assert!(load_index_entries(&db_path).expect("load").is_none());
        assert!(load_index_stats(&db_path).expect("load").is_none());
    }
}
