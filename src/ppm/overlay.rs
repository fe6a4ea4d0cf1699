use std::path::Path;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::columns::{
    CORRECTED_MODEL, DATE, DEFECT_COUNT, DESCRIPTION, FAILURE_CODE, PPM, PRODUCTION_QTY,
};
use crate::errors::PpmError;
use crate::ingestion::{parse_date, parse_number};
use crate::ppm::{MonthlyDetailRow, ppm};
use crate::transport::{Table, read_table};
use crate::types::{Description, FailureCode, ModelName};
use crate::utils::{comparison_form, non_blank};

type OverlayKey = (NaiveDate, String, String);

/// Manual correction for one (date, failure code, description) group.
///
/// `None` fields leave the computed value alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// Group date.
    pub date: NaiveDate,
    /// Group failure code.
    pub failure_code: FailureCode,
    /// Group description.
    pub description: Description,
    /// Replacement model label.
    pub model: Option<ModelName>,
    /// Replacement defect count.
    pub defect_count: Option<u64>,
    /// Replacement production quantity.
    pub production_qty: Option<f64>,
    /// Explicit PPM; otherwise recomputed from the corrected counts.
    pub ppm: Option<f64>,
}

impl CorrectionRecord {
    /// Correction for one group that overrides nothing yet.
    pub fn new(
        date: NaiveDate,
        failure_code: impl Into<FailureCode>,
        description: impl Into<Description>,
    ) -> Self {
        Self {
            date,
            failure_code: failure_code.into(),
            description: description.into(),
            model: None,
            defect_count: None,
            production_qty: None,
            ppm: None,
        }
    }

    /// Override the model label.
    pub fn with_model(mut self, model: impl Into<ModelName>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the defect count.
    pub fn with_defect_count(mut self, count: u64) -> Self {
        self.defect_count = Some(count);
        self
    }

    /// Override the production quantity.
    pub fn with_production_qty(mut self, quantity: f64) -> Self {
        self.production_qty = Some(quantity);
        self
    }

    /// Pin the PPM value.
    pub fn with_ppm(mut self, ppm: f64) -> Self {
        self.ppm = Some(ppm);
        self
    }

    fn key(&self) -> OverlayKey {
        overlay_key(self.date, &self.failure_code, &self.description)
    }

    /// Fill fields still `None` from a later record with the same key.
    fn fill_from(&mut self, later: CorrectionRecord) {
        self.model = self.model.take().or(later.model);
        self.defect_count = self.defect_count.or(later.defect_count);
        self.production_qty = self.production_qty.or(later.production_qty);
        self.ppm = self.ppm.or(later.ppm);
    }

    /// Overwrite the row's fields that this record sets.
    ///
    /// When the count or production is replaced and no PPM is given, PPM is
    /// recomputed from the corrected values.
    pub fn apply_to(&self, row: &mut MonthlyDetailRow) {
        if let Some(model) = &self.model {
            row.model = model.clone();
        }
        if let Some(count) = self.defect_count {
            row.defect_count = count;
        }
        if let Some(quantity) = self.production_qty {
            row.production_qty = quantity;
        }
        match self.ppm {
            Some(value) => row.ppm = value,
            None if self.defect_count.is_some() || self.production_qty.is_some() => {
                row.ppm = ppm(row.defect_count, row.production_qty);
            }
            None => {}
        }
    }
}

fn overlay_key(date: NaiveDate, failure_code: &str, description: &str) -> OverlayKey {
    (date, comparison_form(failure_code), comparison_form(description))
}

/// Externally maintained correction table, keyed by (date, failure code, description).
///
/// Codes and descriptions match after whitespace collapsing and uppercasing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrectionOverlay {
    records: IndexMap<OverlayKey, CorrectionRecord>,
}

impl CorrectionOverlay {
    /// Build from records; for duplicate keys the first non-null value of each field wins.
    pub fn new<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CorrectionRecord>,
    {
        let mut merged: IndexMap<OverlayKey, CorrectionRecord> = IndexMap::new();
        for record in records {
            match merged.get_mut(&record.key()) {
                Some(existing) => existing.fill_from(record),
                None => {
                    merged.insert(record.key(), record);
                }
            }
        }
        Self { records: merged }
    }

    /// Read corrections from a table with `DATE`, `FAILURE_CODE` and `DESCRIPTION`
    /// plus any of `MODEL`, `DEFECT_COUNT`, `PRODUCTION_QTY` and `PPM`.
    ///
    /// Rows with an unparseable date are skipped. Blank or malformed override
    /// cells are treated as absent.
    pub fn from_table(table: &Table) -> Result<Self, PpmError> {
        let date_idx = table.require_column(&DATE)?;
        let code_idx = table.require_column(&FAILURE_CODE)?;
        let description_idx = table.require_column(&DESCRIPTION)?;
        let model_idx = table.column(&CORRECTED_MODEL);
        let count_idx = table.column(&DEFECT_COUNT);
        let qty_idx = table.column(&PRODUCTION_QTY);
        let ppm_idx = table.column(&PPM);

        let mut records = Vec::new();
        let mut undated = 0usize;
        for row in table.rows() {
            let Some(date) = parse_date(Table::cell(row, Some(date_idx))) else {
                undated += 1;
                continue;
            };
            let mut record = CorrectionRecord::new(
                date,
                Table::cell(row, Some(code_idx)).to_uppercase(),
                Table::cell(row, Some(description_idx)),
            );
            record.model = non_blank(Table::cell(row, model_idx)).map(str::to_string);
            record.defect_count = parse_number(Table::cell(row, count_idx))
                .filter(|value| *value >= 0.0 && value.fract() == 0.0)
                .map(|value| value as u64);
            record.production_qty = parse_number(Table::cell(row, qty_idx));
            record.ppm = parse_number(Table::cell(row, ppm_idx));
            records.push(record);
        }
        if undated > 0 {
            warn!(
                "[defect_ppm:ppm] {}: skipped {undated} correction rows without a valid date",
                table.source_id()
            );
        }
        Ok(Self::new(records))
    }

    /// Load the overlay file; a missing file is an empty overlay.
    pub fn load(path: &Path) -> Result<Self, PpmError> {
        if !path.exists() {
            info!(
                "[defect_ppm:ppm] no correction overlay at {}",
                path.display()
            );
            return Ok(Self::default());
        }
        let overlay = Self::from_table(&read_table(path)?)?;
        info!(
            "[defect_ppm:ppm] loaded {} corrections from {}",
            overlay.len(),
            path.display()
        );
        Ok(overlay)
    }

    /// Number of corrections.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the overlay has no corrections.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Correction for a group, matched the same way [`Self::apply`] matches rows.
    pub fn get(
        &self,
        date: NaiveDate,
        failure_code: &str,
        description: &str,
    ) -> Option<&CorrectionRecord> {
        self.records.get(&overlay_key(date, failure_code, description))
    }

    /// Apply matching corrections in place; returns how many rows were touched.
    pub fn apply(&self, rows: &mut [MonthlyDetailRow]) -> usize {
        let mut applied = 0;
        for row in rows.iter_mut() {
            let Some(date) = row.date else { continue };
            if let Some(record) = self.get(date, &row.failure_code, &row.description) {
                record.apply_to(row);
                applied += 1;
            }
        }
        applied
    }
}
