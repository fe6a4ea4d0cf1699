//! Production and defect table ingestion: column aliasing, day-first dates, pt-BR numbers.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::columns::{ColumnKey, normalize_header};
use crate::constants::columns::{
    CATEGORY, DATE, DEFECT_COUNT, DEFECT_MODEL, DESCRIPTION, FAILURE_CODE, LINE,
    PRODUCTION_MODEL, QUANTITY, SHIFT,
};
use crate::constants::ingestion::{DATE_FORMATS, DATETIME_FORMATS, SHIFT_A_ALIASES};
use crate::data::{RawRecord, RecordKind, SkippedRows};
use crate::errors::PpmError;
use crate::transport::Table;

/// Records kept from one table plus the tally of what was coerced or dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestedTable {
    /// Rows that survived ingestion, in table order.
    pub records: Vec<RawRecord>,
    /// Tally of coerced and dropped rows.
    pub skipped: SkippedRows,
}

struct CommonColumns {
    date: usize,
    model: usize,
    shift: Option<usize>,
    line: Option<usize>,
    category: Option<usize>,
}

impl CommonColumns {
    fn resolve(table: &Table, model_key: &ColumnKey) -> Result<Self, PpmError> {
        Ok(Self {
            date: table.require_column(&DATE)?,
            model: table.require_column(model_key)?,
            shift: table.column(&SHIFT),
            line: table.column(&LINE),
            category: table.column(&CATEGORY),
        })
    }

    fn record(&self, kind: RecordKind, idx: usize, row: &[String]) -> RawRecord {
        RawRecord {
            kind,
            row: idx,
            date: parse_date(Table::cell(row, Some(self.date))),
            shift: standardize_shift(Table::cell(row, self.shift)),
            line: standardize_line(Table::cell(row, self.line)),
            category: Table::cell(row, self.category).to_string(),
            model_text: Table::cell(row, Some(self.model)).to_string(),
            description: String::new(),
            failure_code: String::new(),
            quantity: None,
        }
    }
}

/// Read a production table. Requires date, model text, and quantity columns.
pub fn ingest_production(table: &Table) -> Result<IngestedTable, PpmError> {
    let common = CommonColumns::resolve(table, &PRODUCTION_MODEL)?;
    let quantity = table.require_column(&QUANTITY)?;
    let mut out = IngestedTable::default();
    for (idx, row) in table.rows().enumerate() {
        out.skipped.rows_read += 1;
        let mut record = common.record(RecordKind::Production, idx, row);
        if record.model_text.is_empty() {
            out.skipped.blank_model += 1;
            continue;
        }
        record.quantity = parse_number(Table::cell(row, Some(quantity)));
        if record.quantity.is_none() {
            out.skipped.malformed_quantity += 1;
            continue;
        }
        if record.date.is_none() {
            out.skipped.malformed_date += 1;
        }
        out.records.push(record);
    }
    log_ingestion(table, &out);
    Ok(out)
}

/// Read a defect table. Requires date, model text, and a failure code or description column.
///
/// A missing count column means one defect per row; blank count cells also count as one.
pub fn ingest_defects(table: &Table) -> Result<IngestedTable, PpmError> {
    let common = CommonColumns::resolve(table, &DEFECT_MODEL)?;
    let code = table.column(&FAILURE_CODE);
    let description = table.column(&DESCRIPTION);
    if code.is_none() && description.is_none() {
        return Err(PpmError::MissingColumn {
            table: table.source_id().to_string(),
            column: format!("{} or {}", FAILURE_CODE.as_str(), DESCRIPTION.as_str()),
        });
    }
    let count = table.column(&DEFECT_COUNT);
    let mut out = IngestedTable::default();
    for (idx, row) in table.rows().enumerate() {
        out.skipped.rows_read += 1;
        let mut record = common.record(RecordKind::Defect, idx, row);
        if record.model_text.is_empty() {
            out.skipped.blank_model += 1;
            continue;
        }
        let raw_count = Table::cell(row, count);
        record.quantity = if raw_count.is_empty() {
            Some(1.0)
        } else {
            parse_number(raw_count).filter(|value| *value >= 0.0 && value.fract() == 0.0)
        };
        if record.quantity.is_none() {
            out.skipped.malformed_quantity += 1;
            continue;
        }
        if record.date.is_none() {
            out.skipped.malformed_date += 1;
        }
        record.failure_code = Table::cell(row, code).to_uppercase();
        record.description = Table::cell(row, description).to_string();
        out.records.push(record);
    }
    log_ingestion(table, &out);
    Ok(out)
}

fn log_ingestion(table: &Table, out: &IngestedTable) {
    let skipped = &out.skipped;
    if skipped.dropped() > 0 || skipped.malformed_date > 0 {
        warn!(
            "[defect_ppm:ingestion] {}: dropped {} rows (blank model={}, bad quantity={}); {} rows kept without a date",
            table.source_id(),
            skipped.dropped(),
            skipped.blank_model,
            skipped.malformed_quantity,
            skipped.malformed_date
        );
    }
    info!(
        "[defect_ppm:ingestion] {}: kept {} of {} rows",
        table.source_id(),
        out.records.len(),
        skipped.rows_read
    );
}

/// Parse a day-first date, optionally followed by a time of day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(raw, format)
                    .ok()
                    .map(|stamp| stamp.date())
            })
        })
}

/// Parse `1.234,5` (pt-BR), `1234.5`, or `1,5`.
///
/// With both separators present the last one is the decimal mark; repeated dots are
/// thousands separators; a lone comma is a decimal mark. A lone dot followed by exactly
/// three digits (`100.000`, `1.500`) is a thousands separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let last_comma = compact.rfind(',');
    let last_dot = compact.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) if compact.matches(',').count() == 1 => compact.replace(',', "."),
        (Some(_), None) => compact.replace(',', ""),
        (None, Some(_)) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        (None, Some(dot)) if is_thousands_group(&compact, dot) => compact.replace('.', ""),
        _ => compact,
    };
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn is_thousands_group(compact: &str, dot: usize) -> bool {
    let (int_part, frac_part) = (&compact[..dot], &compact[dot + 1..]);
    let digits = int_part.strip_prefix('-').unwrap_or(int_part);
    (1..=3).contains(&digits.len())
        && digits.bytes().all(|byte| byte.is_ascii_digit())
        && !digits.starts_with('0')
        && frac_part.len() == 3
        && frac_part.bytes().all(|byte| byte.is_ascii_digit())
}

/// Fold shift spellings: `Turno A`, `TURNOA`, `1`, `A1` become `A`; `Turno B` becomes `B`.
pub fn standardize_shift(raw: &str) -> Option<String> {
    let normalized = normalize_header(raw);
    if normalized.is_empty() {
        return None;
    }
    if SHIFT_A_ALIASES.contains(&normalized.as_str()) {
        return Some("A".into());
    }
    let stripped = normalized
        .strip_prefix("TURNO_")
        .or_else(|| normalized.strip_prefix("TURNO"))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(&normalized);
    Some(stripped.to_string())
}

/// First run of digits: `LINHA 03` becomes 3.
pub fn standardize_line(raw: &str) -> Option<u32> {
    let digits: String = raw
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn parse_date_is_day_first() {
        assert_eq!(parse_date("03/02/2024"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(parse_date("2024-02-03"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(
            parse_date("03/02/2024 14:30:00"),
            NaiveDate::from_ymd_opt(2024, 2, 3)
        );
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("ontem"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn parse_number_handles_locales() {
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1234.5"), Some(1234.5));
        assert_eq!(parse_number("1,5"), Some(1.5));
        assert_eq!(parse_number("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_number("100.000"), Some(100_000.0));
        assert_eq!(parse_number("1.500"), Some(1500.0));
        assert_eq!(parse_number("0.125"), Some(0.125));
        assert_eq!(parse_number("12.50"), Some(12.5));
        assert_eq!(parse_number("1234.567"), Some(1234.567));
        assert_eq!(parse_number(" 100 000 "), Some(100_000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn shift_and_line_standardization() {
        assert_eq!(standardize_shift("Turno A").as_deref(), Some("A"));
        assert_eq!(standardize_shift("turnoa").as_deref(), Some("A"));
        assert_eq!(standardize_shift("1").as_deref(), Some("A"));
        assert_eq!(standardize_shift("Turno B").as_deref(), Some("B"));
        assert_eq!(standardize_shift("C").as_deref(), Some("C"));
        assert_eq!(standardize_shift("  "), None);
        assert_eq!(standardize_line("LINHA 03"), Some(3));
        assert_eq!(standardize_line("L12-B"), Some(12));
        assert_eq!(standardize_line("sem linha"), None);
    }

    #[test]
    fn production_ingestion_tallies_bad_rows() {
        let table = Table::new(
            "prod",
            ["Data", "Turno", "Linha", "Modelo", "Qty Geral"],
            rows(&[
                &["01/02/2024", "Turno A", "Linha 1", "CM-250", "1.000,0"],
                &["xx", "B", "2", "CM-250", "10"],
                &["02/02/2024", "A", "1", "", "10"],
                &["02/02/2024", "A", "1", "CM-400", "muitos"],
            ]),
        );
        let ingested = ingest_production(&table).unwrap();
        assert_eq!(ingested.records.len(), 2);
        assert_eq!(ingested.records[0].quantity, Some(1000.0));
        assert_eq!(ingested.records[0].shift.as_deref(), Some("A"));
        assert_eq!(ingested.records[0].line, Some(1));
        assert_eq!(ingested.records[1].date, None);
        assert_eq!(
            ingested.skipped,
            SkippedRows {
                rows_read: 4,
                malformed_date: 1,
                malformed_quantity: 1,
                blank_model: 1,
            }
        );
    }

    #[test]
    fn production_requires_quantity_column() {
        let table = Table::new("prod", ["DATE", "MODEL"], Vec::new());
        assert!(matches!(
            ingest_production(&table),
            Err(PpmError::MissingColumn { column, .. }) if column == "QUANTITY"
        ));
    }

    #[test]
    fn defect_ingestion_defaults_counts_and_uppercases_codes() {
        let table = Table::new(
            "defects",
            ["DATA", "MODELO", "COD_FALHA", "DESC_FALHA", "QTD"],
            rows(&[
                &["05/01/2024", "CM-250", "f001", "Não liga", ""],
                &["05/01/2024", "CM-250", "", "Led apagado", "3"],
                &["05/01/2024", "CM-250", "", "Led apagado", "2,5"],
            ]),
        );
        let ingested = ingest_defects(&table).unwrap();
        assert_eq!(ingested.records.len(), 2);
        assert_eq!(ingested.records[0].failure_code, "F001");
        assert_eq!(ingested.records[0].quantity, Some(1.0));
        assert_eq!(ingested.records[1].quantity, Some(3.0));
        assert_eq!(ingested.records[1].description, "Led apagado");
        assert_eq!(ingested.skipped.malformed_quantity, 1);
    }

    #[test]
    fn defects_need_code_or_description() {
        let table = Table::new("defects", ["DATE", "MODEL"], Vec::new());
        assert!(matches!(
            ingest_defects(&table),
            Err(PpmError::MissingColumn { .. })
        ));
        let table = Table::new("defects", ["DATE", "MODEL", "DESCRIPTION"], Vec::new());
        assert!(ingest_defects(&table).unwrap().records.is_empty());
    }
}
