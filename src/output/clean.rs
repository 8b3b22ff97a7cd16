use crate::output::aggregate::Table;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::info;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)").unwrap());
static FLOORS_OUT_OF: Lazy<Regex> = Lazy::new(|| Regex::new(r"out of ([0-9]+) Floors").unwrap());

/// Textual floor labels and the floor number they stand for
const FLOOR_LABELS: [(&str, f64); 3] = [
    ("Ground", 0.0),
    ("Upper Basement", -1.0),
    ("Lower Basement", -2.0),
];

/// A typed cell of the consolidated dataset
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Text(text) => f.write_str(text),
            // `{:?}` keeps the trailing `.0` on whole numbers
            Cell::Number(n) => write!(f, "{:?}", n),
            Cell::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Missing, Cell::Number)
    }
}

/// How a column is normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Raw,
    Area,
    FloorCount,
    FloorNum,
    PostDate,
}

impl ColumnKind {
    fn of(column: &str) -> Self {
        match column {
            "area" => ColumnKind::Area,
            "floor_count" => ColumnKind::FloorCount,
            "floor_num" => ColumnKind::FloorNum,
            "post_date" => ColumnKind::PostDate,
            _ => ColumnKind::Raw,
        }
    }

    fn normalize(self, raw: Option<&str>) -> Cell {
        let Some(raw) = raw else { return Cell::Missing };
        match self {
            ColumnKind::Raw => Cell::Text(raw.to_string()),
            ColumnKind::Area => parse_area(raw).into(),
            ColumnKind::FloorCount => parse_floor_count(raw).into(),
            ColumnKind::FloorNum => parse_floor_num(raw).into(),
            ColumnKind::PostDate => parse_post_date(raw).map_or(Cell::Missing, Cell::Date),
        }
    }
}

/// Columns that must exist for cleaning to make sense
pub const NORMALIZED_COLUMNS: [&str; 4] = ["area", "floor_count", "floor_num", "post_date"];

/// Leading number of an area string, `"650 sqft"` -> 650.0
pub fn parse_area(raw: &str) -> Option<f64> {
    LEADING_NUMBER.captures(raw)?.get(1)?.as_str().parse().ok()
}

/// Total floors from a summary like `"3 out of 12 Floors"`
pub fn parse_floor_count(raw: &str) -> Option<f64> {
    FLOORS_OUT_OF.captures(raw)?.get(1)?.as_str().parse().ok()
}

/// Floor number, with ground and basement labels mapped to 0, -1 and -2
pub fn parse_floor_num(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some((_, floor)) = FLOOR_LABELS.iter().find(|(label, _)| *label == raw) {
        return Some(*floor);
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Posting date in strict `YYYYMMDD` form
pub fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// The deduplicated, typed dataset
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedDataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Normalize the semi-structured columns. Malformed values become missing;
/// a required column absent from the table is an error.
pub fn normalize(table: Table) -> Result<ConsolidatedDataset> {
    for column in NORMALIZED_COLUMNS {
        if table.column_index(column).is_none() {
            anyhow::bail!("Data could not be processed: column `{}` is missing", column);
        }
    }

    let kinds: Vec<ColumnKind> = table.headers.iter().map(|h| ColumnKind::of(h)).collect();
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(&kinds)
                .map(|(cell, kind)| kind.normalize(cell.as_deref()))
                .collect()
        })
        .collect();

    Ok(ConsolidatedDataset {
        headers: table.headers,
        rows,
    })
}

impl ConsolidatedDataset {
    /// Write the dataset as CSV.
    ///
    /// Rows go to a temporary file next to `path` that only replaces `path`
    /// once everything is flushed, so a failure leaves no partial output.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

        {
            let mut wtr = csv::Writer::from_writer(tmp.as_file_mut());
            wtr.write_record(&self.headers)?;
            for row in &self.rows {
                wtr.write_record(row.iter().map(|cell| cell.to_string()))?;
            }
            wtr.flush()?;
        }
        tmp.as_file_mut().flush()?;

        tmp.persist(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(rows = self.rows.len(), path = %path.display(), "💾 Saved consolidated dataset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area() {
        assert_eq!(parse_area("45"), Some(45.0));
        assert_eq!(parse_area("650 sqft"), Some(650.0));
        assert_eq!(parse_area("1200.5 sqft"), Some(1200.5));
        assert_eq!(parse_area("abc"), None);
        assert_eq!(parse_area(""), None);
    }

    #[test]
    fn test_floor_count() {
        assert_eq!(parse_floor_count("out of 12 Floors"), Some(12.0));
        assert_eq!(parse_floor_count("3 out of 7 Floors"), Some(7.0));
        assert_eq!(parse_floor_count("Ground out of 4 Floors"), Some(4.0));
        assert_eq!(parse_floor_count("3rd floor"), None);
        assert_eq!(parse_floor_count(""), None);
    }

    #[test]
    fn test_floor_num() {
        assert_eq!(parse_floor_num("Ground"), Some(0.0));
        assert_eq!(parse_floor_num("Upper Basement"), Some(-1.0));
        assert_eq!(parse_floor_num("Lower Basement"), Some(-2.0));
        assert_eq!(parse_floor_num("14"), Some(14.0));
        assert_eq!(parse_floor_num("abc"), None);
        assert_eq!(parse_floor_num(""), None);
    }

    #[test]
    fn test_post_date() {
        assert_eq!(parse_post_date("20210615"), NaiveDate::from_ymd_opt(2021, 6, 15));
        assert_eq!(parse_post_date("2021-06-15"), None);
        assert_eq!(parse_post_date("20211345"), None);
        assert_eq!(parse_post_date("abc"), None);
        assert_eq!(parse_post_date(""), None);
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(Cell::Number(12.0).to_string(), "12.0");
        assert_eq!(Cell::Number(-1.0).to_string(), "-1.0");
        assert_eq!(Cell::Missing.to_string(), "");
        assert_eq!(
            Cell::Date(NaiveDate::from_ymd_opt(2021, 6, 15).unwrap()).to_string(),
            "2021-06-15"
        );
    }

    fn raw_table() -> Table {
        let cells = |row: [&str; 5]| -> Vec<Option<String>> {
            row.iter().map(|c| (!c.is_empty()).then(|| c.to_string())).collect()
        };
        Table {
            headers: ["id", "area", "floor_count", "floor_num", "post_date"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            rows: vec![
                cells(["1", "650 sqft", "3 out of 12 Floors", "Ground", "20210615"]),
                cells(["2", "abc", "", "Upper Basement", "bad"]),
            ],
        }
    }

    #[test]
    fn test_normalize_types_columns() {
        let data = normalize(raw_table()).unwrap();

        assert_eq!(
            data.rows[0],
            vec![
                Cell::Text("1".to_string()),
                Cell::Number(650.0),
                Cell::Number(12.0),
                Cell::Number(0.0),
                Cell::Date(NaiveDate::from_ymd_opt(2021, 6, 15).unwrap()),
            ]
        );
        assert_eq!(
            data.rows[1],
            vec![
                Cell::Text("2".to_string()),
                Cell::Missing,
                Cell::Missing,
                Cell::Number(-1.0),
                Cell::Missing,
            ]
        );
    }

    #[test]
    fn test_normalize_requires_columns() {
        let mut table = raw_table();
        table.headers[4] = "posted".to_string();
        assert!(normalize(table).is_err());
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop_data_clean.csv");
        normalize(raw_table()).unwrap().write_atomic(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines[0], "id,area,floor_count,floor_num,post_date");
        assert_eq!(lines[1], "1,650.0,12.0,0.0,2021-06-15");
        assert_eq!(lines[2], "2,,,-1.0,");
    }
}
