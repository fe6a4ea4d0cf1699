//! Tabular input/output: delimited text and parquet files loaded into a [`Table`].

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::columns::{ColumnKey, normalize_header};
use crate::errors::PpmError;
use crate::types::{ColumnName, SourceId};

/// Parquet reader and writer.
pub mod columnar;
/// CSV reader and writer.
pub mod delimited;

pub use columnar::{read_parquet, write_utf8_columns};
pub use delimited::{read_delimited, write_delimited};

/// In-memory table with normalized headers and string cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    source_id: SourceId,
    headers: Vec<ColumnName>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table; headers are normalized and rows padded or truncated to the header width.
    pub fn new<H, S>(source_id: impl Into<SourceId>, raw_headers: H, rows: Vec<Vec<String>>) -> Self
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers: Vec<ColumnName> = raw_headers
            .into_iter()
            .map(|header| normalize_header(header.as_ref()))
            .collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self {
            source_id: source_id.into(),
            headers,
            rows,
        }
    }

    /// Identifier used in errors and logs.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Normalized headers.
    pub fn headers(&self) -> &[ColumnName] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row cells in header order.
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Index of the first header matching the key's name or aliases, in candidate order.
    pub fn column(&self, key: &ColumnKey) -> Option<usize> {
        key.candidates()
            .find_map(|name| self.headers.iter().position(|header| header == name))
    }

    /// Like [`Table::column`] but fails fast with `MissingColumn`.
    pub fn require_column(&self, key: &ColumnKey) -> Result<usize, PpmError> {
        self.column(key).ok_or_else(|| PpmError::MissingColumn {
            table: self.source_id.clone(),
            column: key.as_str().to_string(),
        })
    }

    /// Trimmed cell text; empty for out-of-range indexes.
    pub fn cell<'a>(row: &'a [String], idx: Option<usize>) -> &'a str {
        idx.and_then(|idx| row.get(idx))
            .map(|value| value.trim())
            .unwrap_or("")
    }
}

/// Load a table, dispatching on the file extension.
pub fn read_table(path: &Path) -> Result<Table, PpmError> {
    let source_id = path.display().to_string();
    if !path.exists() {
        return Err(PpmError::SourceUnavailable {
            source_id,
            reason: "file does not exist".into(),
        });
    }
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") | Some("txt") => read_delimited(path, source_id),
        Some("parquet") => read_parquet(path, source_id),
        other => Err(PpmError::SourceUnavailable {
            source_id,
            reason: format!("unsupported table format {other:?}"),
        }),
    }
}

/// Write through a temp file in the target directory and rename over `path`.
///
/// Readers never observe a partial file; on error the previous file is untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), PpmError>
where
    F: FnOnce(&mut File) -> Result<(), PpmError>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let mut temp = NamedTempFile::new_in(&parent)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| PpmError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::columns::{DATE, QUANTITY};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn table_normalizes_headers_and_pads_rows() {
        let table = Table::new(
            "prod",
            ["Data", "Qty Geral", "Extra"],
            vec![vec!["01/02/2024".into()]],
        );
        assert_eq!(table.headers(), &["DATA", "QTY_GERAL", "EXTRA"]);
        assert_eq!(table.column(&DATE), Some(0));
        assert_eq!(table.column(&QUANTITY), Some(1));
        let row = table.rows().next().unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(Table::cell(row, Some(1)), "");
        assert_eq!(Table::cell(row, None), "");
    }

    #[test]
    fn require_column_reports_table_and_column() {
        let table = Table::new("defects", ["MODELO"], Vec::new());
        match table.require_column(&DATE) {
            Err(PpmError::MissingColumn { table, column }) => {
                assert_eq!(table, "defects");
                assert_eq!(column, "DATE");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn read_table_rejects_missing_and_unknown_formats() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_table(&dir.path().join("absent.csv")),
            Err(PpmError::SourceUnavailable { .. })
        ));
        let path = dir.path().join("table.xlsx");
        std::fs::write(&path, b"irrelevant").unwrap();
        assert!(matches!(
            read_table(&path),
            Err(PpmError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn write_atomic_leaves_target_untouched_on_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "original").unwrap();
        let result = write_atomic(&path, |file| {
            file.write_all(b"partial")?;
            Err(PpmError::Store("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        write_atomic(&path, |file| {
            file.write_all(b"replaced")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "replaced");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
