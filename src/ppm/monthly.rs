use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::{DefectFact, ProductionFact};
use crate::ppm::ppm;
use crate::types::{CanonicalKey, Description, FailureCode, ModelName};
use crate::utils::comparison_form;

type MonthKey = (i32, u32, CanonicalKey);
type DetailKey = (Option<NaiveDate>, CanonicalKey, FailureCode, String);

/// Defect group for one (date, model, code, description) joined to its month's production.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthlyDetailRow {
    /// Defect date.
    pub date: Option<NaiveDate>,
    /// First model spelling seen in the group.
    pub model: ModelName,
    /// Canonical model key.
    pub model_key: CanonicalKey,
    /// Final failure code.
    pub failure_code: FailureCode,
    /// Description as written.
    pub description: Description,
    /// Summed defect units.
    pub defect_count: u64,
    /// Production of the model over the row's calendar month.
    pub production_qty: f64,
    /// Defects per million produced units.
    pub ppm: f64,
}

/// Production summed to one value per (year, month, model key).
///
/// Undated rows and rows with an empty model key are left out.
pub fn monthly_production(production: &[ProductionFact]) -> IndexMap<MonthKey, f64> {
    let mut out: IndexMap<MonthKey, f64> = IndexMap::new();
    for fact in production {
        let Some(date) = fact.date else { continue };
        if fact.model_key.is_empty() {
            continue;
        }
        *out.entry((date.year(), date.month(), fact.model_key.clone()))
            .or_insert(0.0) += fact.quantity;
    }
    out
}

/// Group defects by (date, model, failure code, description) and join each group
/// to [`monthly_production`] on (year, month, model).
///
/// Production is collapsed before the join, so several production rows for the
/// same month never multiply a defect group. Descriptions group by comparison
/// form; the first spelling is kept.
pub fn monthly_detail(
    defects: &[DefectFact],
    production: &[ProductionFact],
) -> Vec<MonthlyDetailRow> {
    let monthly = monthly_production(production);
    let mut groups: IndexMap<DetailKey, MonthlyDetailRow> = IndexMap::new();
    for fact in defects {
        let key = (
            fact.date,
            fact.model_key.clone(),
            fact.failure_code.clone(),
            comparison_form(&fact.description),
        );
        groups
            .entry(key)
            .or_insert_with(|| MonthlyDetailRow {
                date: fact.date,
                model: fact.model.trim().to_string(),
                model_key: fact.model_key.clone(),
                failure_code: fact.failure_code.clone(),
                description: fact.description.trim().to_string(),
                defect_count: 0,
                production_qty: 0.0,
                ppm: 0.0,
            })
            .defect_count += fact.count;
    }
    groups
        .into_values()
        .map(|mut row| {
            row.production_qty = row
                .date
                .and_then(|date| monthly.get(&(date.year(), date.month(), row.model_key.clone())))
                .copied()
                .unwrap_or(0.0);
            row.ppm = ppm(row.defect_count, row.production_qty);
            row
        })
        .collect()
}
