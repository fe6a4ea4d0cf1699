//! Defect-rate aggregation.
//!
//! Defect facts and production facts are grouped by the same bucket key and
//! left-joined so every defect group survives, matched or not. PPM is
//! `defects / production * 1_000_000`, and 0 whenever production is missing or zero.

mod monthly;
mod overlay;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::ppm::PPM_SCALE;
use crate::data::{DefectFact, ProductionFact};
use crate::errors::PpmError;
use crate::types::{CanonicalKey, ModelName};
use crate::utils::comparison_form;

pub use monthly::{MonthlyDetailRow, monthly_detail, monthly_production};
pub use overlay::{CorrectionOverlay, CorrectionRecord};

/// Aggregation key family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// Calendar day and model.
    Day,
    /// Calendar month and model.
    Month,
    /// Calendar year and model.
    Year,
    /// Model only, across all dates.
    Model,
    /// Product category only.
    Category,
}

impl Granularity {
    /// Lowercase name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
            Granularity::Model => "model",
            Granularity::Category => "category",
        }
    }

    /// Whether the key includes a time period (rows without a date are skipped).
    pub fn is_time_based(&self) -> bool {
        matches!(
            self,
            Granularity::Day | Granularity::Month | Granularity::Year
        )
    }

    fn bucket(
        &self,
        date: Option<NaiveDate>,
        model_key: &str,
        category: &str,
    ) -> Option<BucketKey> {
        let period = match self {
            Granularity::Day => Some(Period::Day(date?)),
            Granularity::Month => {
                let date = date?;
                Some(Period::Month {
                    year: date.year(),
                    month: date.month(),
                })
            }
            Granularity::Year => Some(Period::Year(date?.year())),
            Granularity::Model | Granularity::Category => None,
        };
        let group = match self {
            Granularity::Category => comparison_form(category),
            _ => model_key.to_string(),
        };
        Some(BucketKey { period, group })
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PpmError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" => Ok(Granularity::Year),
            "model" => Ok(Granularity::Model),
            "category" => Ok(Granularity::Category),
            other => Err(PpmError::Configuration(format!(
                "unknown granularity '{other}' (expected day, month, year, model or category)"
            ))),
        }
    }
}

/// Time component of a bucket key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    /// One calendar day.
    Day(NaiveDate),
    /// One calendar month.
    Month {
        /// Calendar year.
        year: i32,
        /// Month, 1 through 12.
        month: u32,
    },
    /// One calendar year.
    Year(i32),
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Period::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Period::Year(year) => write!(f, "{year:04}"),
        }
    }
}

/// Join key shared by defect and production groups.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    /// `None` for model and category granularities.
    pub period: Option<Period>,
    /// Canonical model key, or the comparison form of the category.
    pub group: String,
}

/// One row of the PPM table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    /// Join key.
    pub key: BucketKey,
    /// Display label: first model (or category) spelling seen in the defect data.
    pub label: String,
    /// Summed defect units.
    pub defect_count: u64,
    /// Summed production; 0 when no production group matched.
    pub production_qty: f64,
    /// Defects per million produced units.
    pub ppm: f64,
}

/// `defect_count / production_qty * 1_000_000`, or 0 when production is not positive.
pub fn ppm(defect_count: u64, production_qty: f64) -> f64 {
    if production_qty > 0.0 && production_qty.is_finite() {
        defect_count as f64 / production_qty * PPM_SCALE
    } else {
        0.0
    }
}

/// Group, sum and left-join defects against production at `granularity`.
///
/// Buckets come back in first-seen order of the defect data. Rows without a
/// date are left out of time-based granularities on both sides.
pub fn aggregate(
    defects: &[DefectFact],
    production: &[ProductionFact],
    granularity: Granularity,
) -> Vec<AggregationBucket> {
    let mut produced: HashMap<BucketKey, f64> = HashMap::new();
    let mut undated = 0usize;
    for fact in production {
        match granularity.bucket(fact.date, &fact.model_key, &fact.category) {
            Some(key) => *produced.entry(key).or_insert(0.0) += fact.quantity,
            None => undated += 1,
        }
    }

    let mut groups: IndexMap<BucketKey, (String, u64)> = IndexMap::new();
    for fact in defects {
        let Some(key) = granularity.bucket(fact.date, &fact.model_key, &fact.category) else {
            undated += 1;
            continue;
        };
        let label = match granularity {
            Granularity::Category => fact.category.trim(),
            _ => fact.model.trim(),
        };
        groups.entry(key).or_insert_with(|| (label.to_string(), 0)).1 += fact.count;
    }
    if undated > 0 {
        debug!(
            "[defect_ppm:ppm] {undated} undated rows left out of {} buckets",
            granularity
        );
    }

    groups
        .into_iter()
        .map(|(key, (label, defect_count))| {
            let production_qty = produced.get(&key).copied().unwrap_or(0.0);
            AggregationBucket {
                ppm: ppm(defect_count, production_qty),
                key,
                label,
                defect_count,
                production_qty,
            }
        })
        .collect()
}

/// Sort buckets by descending PPM; equal PPM keeps the incoming order.
pub fn sort_by_ppm_desc(buckets: &mut [AggregationBucket]) {
    buckets.sort_by(|a, b| b.ppm.total_cmp(&a.ppm));
}

/// Models present on only one side of the join.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAudit {
    /// Defect models with no production rows, sorted.
    pub missing_in_production: Vec<ModelName>,
    /// Produced models with no defect rows, sorted.
    pub missing_in_defects: Vec<ModelName>,
    /// Distinct models on the defect side.
    pub defect_models: usize,
    /// Distinct models on the production side.
    pub production_models: usize,
}

/// Compare the model keys of both sides.
pub fn join_audit(defects: &[DefectFact], production: &[ProductionFact]) -> JoinAudit {
    let defect_models = first_spellings(defects.iter().map(|f| (&f.model_key, &f.model)));
    let production_models =
        first_spellings(production.iter().map(|f| (&f.model_key, &f.model)));
    let defect_keys: HashSet<&CanonicalKey> = defect_models.keys().copied().collect();
    let production_keys: HashSet<&CanonicalKey> = production_models.keys().copied().collect();

    let mut missing_in_production: Vec<ModelName> = defect_models
        .iter()
        .filter(|(key, _)| !production_keys.contains(*key))
        .map(|(_, name)| name.to_string())
        .collect();
    let mut missing_in_defects: Vec<ModelName> = production_models
        .iter()
        .filter(|(key, _)| !defect_keys.contains(*key))
        .map(|(_, name)| name.to_string())
        .collect();
    missing_in_production.sort();
    missing_in_defects.sort();
    JoinAudit {
        missing_in_production,
        missing_in_defects,
        defect_models: defect_models.len(),
        production_models: production_models.len(),
    }
}

fn first_spellings<'a, I>(pairs: I) -> IndexMap<&'a CanonicalKey, &'a str>
where
    I: Iterator<Item = (&'a CanonicalKey, &'a ModelName)>,
{
    let mut out = IndexMap::new();
    for (key, name) in pairs {
        if !key.is_empty() {
            out.entry(key).or_insert(name.trim());
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    pub(crate) fn defect(date: Option<NaiveDate>, model: &str, count: u64) -> DefectFact {
        DefectFact {
            date,
            model: model.to_string(),
            model_key: model.to_uppercase().replace(' ', "_"),
            category: "AUDIO".to_string(),
            failure_code: "F001".to_string(),
            description: "NAO LIGA".to_string(),
            count,
        }
    }

    pub(crate) fn produced(date: Option<NaiveDate>, model: &str, quantity: f64) -> ProductionFact {
        ProductionFact {
            date,
            model: model.to_string(),
            model_key: model.to_uppercase().replace(' ', "_"),
            category: "Audio".to_string(),
            quantity,
        }
    }

    #[test]
    fn ppm_for_single_model() {
        let buckets = aggregate(
            &[defect(day(2024, 1, 3), "A", 5)],
            &[produced(day(2024, 1, 3), "A", 100_000.0)],
            Granularity::Model,
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].defect_count, 5);
        assert_eq!(buckets[0].production_qty, 100_000.0);
        assert_eq!(buckets[0].ppm, 50.0);
    }

    #[test]
    fn zero_or_missing_production_yields_zero_ppm() {
        assert_eq!(ppm(3, 0.0), 0.0);
        assert_eq!(ppm(3, -10.0), 0.0);
        assert_eq!(ppm(3, f64::NAN), 0.0);
        let buckets = aggregate(
            &[defect(day(2024, 1, 3), "A", 2), defect(day(2024, 1, 3), "B", 1)],
            &[produced(day(2024, 1, 3), "A", 0.0)],
            Granularity::Day,
        );
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|bucket| bucket.ppm == 0.0));
        assert_eq!(buckets[1].label, "B");
        assert_eq!(buckets[1].production_qty, 0.0);
    }

    #[test]
    fn monthly_buckets_sum_both_sides() {
        let buckets = aggregate(
            &[
                defect(day(2024, 1, 3), "A", 1),
                defect(day(2024, 1, 20), "A", 1),
                defect(day(2024, 2, 1), "A", 4),
                defect(None, "A", 9),
            ],
            &[
                produced(day(2024, 1, 2), "A", 1_000.0),
                produced(day(2024, 1, 15), "A", 1_000.0),
                produced(day(2024, 2, 1), "A", 4_000.0),
            ],
            Granularity::Month,
        );
        assert_eq!(buckets.len(), 2);
        assert_eq!(
            buckets[0].key.period,
            Some(Period::Month {
                year: 2024,
                month: 1
            })
        );
        assert_eq!(buckets[0].defect_count, 2);
        assert_eq!(buckets[0].production_qty, 2_000.0);
        assert_eq!(buckets[0].ppm, 1_000.0);
        assert_eq!(buckets[1].ppm, 1_000.0);
        assert_eq!(buckets[0].key.period.map(|p| p.to_string()).as_deref(), Some("2024-01"));
    }

    #[test]
    fn undated_rows_still_count_without_time_keys() {
        let buckets = aggregate(
            &[defect(None, "A", 2), defect(day(2024, 5, 1), "A", 3)],
            &[produced(None, "A", 1_000_000.0)],
            Granularity::Model,
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].defect_count, 5);
        assert_eq!(buckets[0].ppm, 5.0);
    }

    #[test]
    fn category_groups_ignore_case() {
        let buckets = aggregate(
            &[defect(day(2024, 1, 1), "A", 1), defect(day(2024, 1, 1), "B", 1)],
            &[produced(day(2024, 1, 1), "C", 20_000.0)],
            Granularity::Category,
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].label, "AUDIO");
        assert_eq!(buckets[0].ppm, 100.0);
    }

    #[test]
    fn sort_by_ppm_is_descending_and_stable() {
        let mut buckets = aggregate(
            &[
                defect(None, "A", 1),
                defect(None, "B", 5),
                defect(None, "C", 1),
            ],
            &[
                produced(None, "A", 1_000.0),
                produced(None, "B", 1_000.0),
                produced(None, "C", 1_000.0),
            ],
            Granularity::Model,
        );
        sort_by_ppm_desc(&mut buckets);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["B", "A", "C"]);
    }

    #[test]
    fn join_audit_reports_one_sided_models() {
        let audit = join_audit(
            &[defect(None, "A", 1), defect(None, "B", 1), defect(None, "b", 1)],
            &[produced(None, "A", 1.0), produced(None, "Z", 1.0)],
        );
        assert_eq!(audit.missing_in_production, vec!["B"]);
        assert_eq!(audit.missing_in_defects, vec!["Z"]);
        assert_eq!(audit.defect_models, 2);
        assert_eq!(audit.production_models, 2);
    }

    #[test]
    fn granularity_parses_names() {
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("diario".parse::<Granularity>().is_err());
        assert_eq!(Granularity::Category.to_string(), "category");
        assert!(!Granularity::Model.is_time_based());
    }
}
