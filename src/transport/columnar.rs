use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::basic::Compression;
use parquet::data_type::{ByteArray, ByteArrayType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use serde_json::Value;

use crate::errors::PpmError;
use crate::transport::{Table, write_atomic};
use crate::types::SourceId;

/// Read every row of a parquet file into a [`Table`]; cells are rendered as text.
pub fn read_parquet(path: &Path, source_id: SourceId) -> Result<Table, PpmError> {
    let unavailable = |reason: String| PpmError::SourceUnavailable {
        source_id: source_id.clone(),
        reason,
    };
    let file = File::open(path)
        .map_err(|err| unavailable(format!("failed opening {}: {err}", path.display())))?;
    let reader = SerializedFileReader::new(file)
        .map_err(|err| unavailable(format!("failed reading {}: {err}", path.display())))?;
    let headers: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();
    let iter = reader
        .get_row_iter(None)
        .map_err(|err| unavailable(format!("failed iterating {}: {err}", path.display())))?;
    let mut rows = Vec::new();
    for row in iter {
        let row = row.map_err(|err| PpmError::SourceInconsistent {
            source_id: source_id.clone(),
            details: format!("corrupt row in {}: {err}", path.display()),
        })?;
        let mut cells = vec![String::new(); headers.len()];
        if let Value::Object(map) = row.to_json_value() {
            for (idx, header) in headers.iter().enumerate() {
                cells[idx] = map.get(header).map(render_cell).unwrap_or_default();
            }
        }
        rows.push(cells);
    }
    Ok(Table::new(source_id, headers, rows))
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Write one row group of UTF-8 columns described by `schema` (a parquet message type).
///
/// `columns[i]` holds the values of the i-th schema field; all columns must be the same length.
pub fn write_utf8_columns(
    path: &Path,
    schema: &str,
    columns: &[Vec<String>],
) -> Result<(), PpmError> {
    let store_err = |err: parquet::errors::ParquetError| PpmError::Store(err.to_string());
    let schema = Arc::new(parse_message_type(schema).map_err(store_err)?);
    if schema.get_fields().len() != columns.len() {
        return Err(PpmError::Store(format!(
            "schema has {} fields but {} columns were supplied",
            schema.get_fields().len(),
            columns.len()
        )));
    }
    if let Some(first) = columns.first()
        && columns.iter().any(|column| column.len() != first.len())
    {
        return Err(PpmError::Store("columns have different lengths".into()));
    }
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );
    write_atomic(path, |file| {
        let mut writer = SerializedFileWriter::new(file, schema, props).map_err(store_err)?;
        let mut row_group = writer.next_row_group().map_err(store_err)?;
        let mut idx = 0;
        while let Some(mut column) = row_group.next_column().map_err(store_err)? {
            let values: Vec<ByteArray> = columns[idx]
                .iter()
                .map(|value| ByteArray::from(value.as_str()))
                .collect();
            column
                .typed::<ByteArrayType>()
                .write_batch(&values, None, None)
                .map_err(store_err)?;
            column.close().map_err(store_err)?;
            idx += 1;
        }
        row_group.close().map_err(store_err)?;
        writer.close().map_err(store_err)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCHEMA: &str = "
        message pairs {
            REQUIRED BYTE_ARRAY KEY (UTF8);
            REQUIRED BYTE_ARRAY VALUE (UTF8);
        }
    ";

    #[test]
    fn utf8_columns_round_trip_through_row_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("pairs.parquet");
        write_utf8_columns(
            &path,
            SCHEMA,
            &[
                vec!["SEM_LIGACAO".into(), "ÁUDIO".into()],
                vec!["F001".into(), "".into()],
            ],
        )
        .unwrap();
        let table = read_parquet(&path, "pairs".into()).unwrap();
        assert_eq!(table.headers(), &["KEY", "VALUE"]);
        let rows: Vec<&[String]> = table.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], &["SEM_LIGACAO", "F001"]);
        assert_eq!(rows[1], &["ÁUDIO", ""]);
    }

    #[test]
    fn mismatched_columns_are_rejected_before_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairs.parquet");
        let err = write_utf8_columns(&path, SCHEMA, &[vec!["A".into()]]).unwrap_err();
        assert!(matches!(err, PpmError::Store(_)));
        let err = write_utf8_columns(&path, SCHEMA, &[vec!["A".into()], vec![]]).unwrap_err();
        assert!(matches!(err, PpmError::Store(_)));
        assert!(!path.exists());
    }
}
