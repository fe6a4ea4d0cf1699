use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::PpmError;
use crate::transport::{Table, write_atomic};
use crate::types::SourceId;

/// Read a comma- or semicolon-delimited file; the delimiter is sniffed from the header line.
pub fn read_delimited(path: &Path, source_id: SourceId) -> Result<Table, PpmError> {
    let mut file = File::open(path)?;
    let delimiter = sniff_delimiter(&mut file)?;
    file.seek(SeekFrom::Start(0))?;
    debug!(
        "[defect_ppm:transport] reading {} with delimiter {:?}",
        path.display(),
        delimiter as char
    );
    read_delimited_from(file, delimiter, source_id)
}

fn read_delimited_from<R: Read>(
    reader: R,
    delimiter: u8,
    source_id: SourceId,
) -> Result<Table, PpmError> {
    let inconsistent = |err: csv::Error| PpmError::SourceInconsistent {
        source_id: source_id.clone(),
        details: err.to_string(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut latin1 = 0usize;
    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(inconsistent)?
        .iter()
        .map(|header| {
            decode_cell(header, &mut latin1)
                .trim_start_matches('\u{feff}')
                .to_string()
        })
        .collect();
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(inconsistent)?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|cell| decode_cell(cell, &mut latin1)).collect());
    }
    if latin1 > 0 {
        warn!("[defect_ppm:transport] {source_id}: decoded {latin1} non-UTF-8 cells as Latin-1");
    }
    Ok(Table::new(source_id, headers, rows))
}

/// UTF-8 when valid, otherwise Latin-1 (every byte maps to the same code point).
fn decode_cell(bytes: &[u8], latin1: &mut usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            *latin1 += 1;
            bytes.iter().map(|&byte| char::from(byte)).collect()
        }
    }
}

fn sniff_delimiter(file: &mut File) -> Result<u8, PpmError> {
    let mut header = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut header)?;
    let semicolons = header.iter().filter(|&&byte| byte == b';').count();
    let commas = header.iter().filter(|&&byte| byte == b',').count();
    Ok(if semicolons > commas { b';' } else { b',' })
}

/// Write headers and rows as comma-separated text, atomically.
pub fn write_delimited<S: AsRef<str>>(
    path: &Path,
    headers: &[S],
    rows: &[Vec<String>],
) -> Result<(), PpmError> {
    let store_err = |err: csv::Error| PpmError::Store(format!("csv write failed: {err}"));
    write_atomic(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(headers.iter().map(|header| AsRef::<str>::as_ref(header)))
            .map_err(store_err)?;
        for row in rows {
            writer.write_record(row).map_err(store_err)?;
        }
        writer.flush()?;
        Ok(())
    })
}
