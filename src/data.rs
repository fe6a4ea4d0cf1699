use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use crate::types::{
    CanonicalKey, CategoryName, Description, FailureCode, ModelName, SourceId,
};

/// Which log a raw record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Production-volume log.
    Production,
    /// Defect log.
    Defect,
}

/// One row of production or defect data as read from a source table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source log.
    pub kind: RecordKind,
    /// Zero-based data row index within the source table.
    pub row: usize,
    /// Record date; `None` when the cell was blank or malformed.
    pub date: Option<NaiveDate>,
    /// Standardized shift (`A`, `B`, ...).
    pub shift: Option<String>,
    /// Production line number.
    pub line: Option<u32>,
    /// Product category, possibly empty.
    pub category: CategoryName,
    /// Model text exactly as written (trimmed).
    pub model_text: ModelName,
    /// Defect description (empty for production rows).
    pub description: Description,
    /// Recorded failure code (empty when absent).
    pub failure_code: FailureCode,
    /// Produced quantity or defect count; `None` when malformed.
    pub quantity: Option<f64>,
}

/// Defect row ready for aggregation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectFact {
    /// Defect date; `None` rows are skipped by time buckets.
    pub date: Option<NaiveDate>,
    /// Display name of the resolved model.
    pub model: ModelName,
    /// Join key: canonicalized resolved model.
    pub model_key: CanonicalKey,
    /// Product category, possibly empty.
    pub category: CategoryName,
    /// Final failure code (empty when unclassified).
    pub failure_code: FailureCode,
    /// Description as written.
    pub description: Description,
    /// Defect units, at least 1.
    pub count: u64,
}

/// Production row ready for aggregation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionFact {
    /// Production date; `None` rows are skipped by time buckets.
    pub date: Option<NaiveDate>,
    /// Model text as written.
    pub model: ModelName,
    /// Join key: canonicalized model text.
    pub model_key: CanonicalKey,
    /// Product category, possibly empty.
    pub category: CategoryName,
    /// Produced units.
    pub quantity: f64,
}

/// Per-table tally of rows that were dropped or partially coerced during ingestion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRows {
    /// Rows read from the table.
    pub rows_read: usize,
    /// Rows kept with `date = None` (excluded from time buckets).
    pub malformed_date: usize,
    /// Rows dropped because the quantity/count was malformed.
    pub malformed_quantity: usize,
    /// Rows dropped because the model text was blank.
    pub blank_model: usize,
}

impl SkippedRows {
    /// Rows dropped outright.
    pub fn dropped(&self) -> usize {
        self.malformed_quantity + self.blank_model
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: &SkippedRows) {
        self.rows_read += other.rows_read;
        self.malformed_date += other.malformed_date;
        self.malformed_quantity += other.malformed_quantity;
        self.blank_model += other.blank_model;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_rows_merge_and_dropped() {
        let mut total = SkippedRows {
            rows_read: 10,
            malformed_date: 1,
            malformed_quantity: 2,
            blank_model: 1,
        };
        total.merge(&SkippedRows {
            rows_read: 5,
            malformed_date: 0,
            malformed_quantity: 1,
            blank_model: 0,
        });
        assert_eq!(total.rows_read, 15);
        assert_eq!(total.dropped(), 4);
        assert_eq!(total.malformed_date, 1);
    }
}
