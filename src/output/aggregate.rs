use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static QUERY_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^property_data_([0-9]+)\.csv$").unwrap());

/// Column-major view of a delimited file: header names plus rows of
/// optional cells (`None` for an empty cell)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Non-empty cell count per column
    pub fn non_null_counts(&self) -> Vec<(&str, usize)> {
        self.headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let count = self.rows.iter().filter(|row| row[idx].is_some()).count();
                (name.as_str(), count)
            })
            .collect()
    }
}

/// Files in `dir` whose name matches `pattern`, ordered by the index
/// captured in its first group
pub fn discover_indexed_files(dir: &Path, pattern: &Regex) -> Result<Vec<(usize, PathBuf)>> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(index) = pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        else {
            continue;
        };
        files.push((index, entry.path()));
    }

    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

/// Per-query result files, sorted by query index
pub fn discover_query_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    discover_indexed_files(dir, &QUERY_FILE)
}

/// Read one delimited file. Short rows, such as the tail of an
/// interrupted write, are padded with empty cells; cells past the last
/// header are ignored.
pub fn read_table(path: &Path) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        if record.len() < headers.len() {
            debug!(path = %path.display(), cells = record.len(), "padding short row");
        }
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(headers.len())
            .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
            .collect();
        row.resize(headers.len(), None);
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

/// Stack tables row-wise. Columns are the union of all headers in
/// first-seen order; a column absent from a table is empty in its rows.
pub fn concat(tables: Vec<Table>) -> Table {
    let mut headers: Vec<String> = Vec::new();
    for table in &tables {
        for header in &table.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
    }
    let positions: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut rows = Vec::new();
    for table in &tables {
        let targets: Vec<usize> = table.headers.iter().map(|h| positions[h.as_str()]).collect();
        for row in &table.rows {
            let mut out = vec![None; headers.len()];
            for (cell, target) in row.iter().zip(&targets) {
                out[*target] = cell.clone();
            }
            rows.push(out);
        }
    }

    Table { headers, rows }
}

/// Keep the first row seen for every value of `column`. Rows where the
/// column is empty never match each other and are all kept.
pub fn dedup_by(table: &mut Table, column: &str) -> Result<usize> {
    let Some(idx) = table.column_index(column) else {
        bail!("Column `{}` not found, cannot drop duplicates", column);
    };

    let before = table.rows.len();
    let mut seen = HashSet::new();
    table.rows.retain(|row| match &row[idx] {
        Some(key) => seen.insert(key.clone()),
        None => true,
    });

    Ok(before - table.rows.len())
}

/// Load every per-query file in `dir` and stack them in query order.
///
/// Finding no files, or failing to read any of them, aborts the run.
pub fn load_all(dir: &Path) -> Result<Table> {
    let files = discover_query_files(dir)?;
    if files.is_empty() {
        bail!("Data files could not be loaded: no per-query files in {}", dir.display());
    }

    let mut tables = Vec::with_capacity(files.len());
    for (index, path) in &files {
        let table = read_table(path).with_context(|| format!("Data file for query {} could not be loaded", index))?;
        if table.rows.is_empty() {
            warn!(query = index, "query file holds no rows");
        }
        tables.push(table);
    }

    let table = concat(tables);
    info!(
        files = files.len(),
        rows = table.rows.len(),
        columns = table.headers.len(),
        "Data files loaded"
    );
    Ok(table)
}
