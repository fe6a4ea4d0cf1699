use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::canonical::Canonicalizer;
use crate::catalog::{CatalogLookup, LookupEntry, LookupStatus};
use crate::types::{CanonicalKey, ModelName};

/// Status counts across a lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAudit {
    /// Entries in the lookup.
    pub total: usize,
    /// Entries counted toward PPM.
    pub ok: usize,
    /// Entries excluded from PPM.
    pub not_counted: usize,
}

/// Count entries by status.
pub fn status_audit(lookup: &CatalogLookup) -> StatusAudit {
    let ok = lookup
        .entries()
        .iter()
        .filter(|entry| entry.status == LookupStatus::Ok)
        .count();
    StatusAudit {
        total: lookup.len(),
        ok,
        not_counted: lookup.len() - ok,
    }
}

/// Entries whose defects are not counted toward PPM.
pub fn not_counted(lookup: &CatalogLookup) -> Vec<&LookupEntry> {
    lookup
        .entries()
        .iter()
        .filter(|entry| entry.status != LookupStatus::Ok)
        .collect()
}

/// How many production-log models the catalog understands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionCoverage {
    /// Percentage of distinct production models found in the catalog; 100 when there are none.
    pub kpi: f64,
    /// Distinct production models.
    pub total_models: usize,
    /// Distinct production models found in the catalog.
    pub understood: usize,
    /// Production models missing from the catalog, sorted.
    pub divergent: Vec<ModelName>,
    /// Production models present in the catalog, sorted.
    pub valid: Vec<ModelName>,
}

/// Compare distinct production model names against the catalog production column.
pub fn production_coverage<S: AsRef<str>>(
    production_models: &[S],
    lookup: &CatalogLookup,
) -> ProductionCoverage {
    let catalog = lookup.production_keys();
    let distinct = distinct_models(
        lookup.canonicalizer(),
        production_models.iter().map(|model| AsRef::<str>::as_ref(model)),
    );
    let mut valid = Vec::new();
    let mut divergent = Vec::new();
    for (key, name) in distinct {
        if catalog.contains(key.as_str()) {
            valid.push(name);
        } else {
            divergent.push(name);
        }
    }
    valid.sort();
    divergent.sort();
    let total_models = valid.len() + divergent.len();
    let kpi = if total_models == 0 {
        100.0
    } else {
        valid.len() as f64 / total_models as f64 * 100.0
    };
    ProductionCoverage {
        kpi,
        total_models,
        understood: valid.len(),
        divergent,
        valid,
    }
}

/// Catalogued production models that no catalog row points to via `corresponds_to`.
pub fn models_without_defects<S: AsRef<str>>(
    production_models: &[S],
    lookup: &CatalogLookup,
) -> Vec<ModelName> {
    let catalog = lookup.production_keys();
    let with_defects = corresponds_keys(lookup);
    let mut out: Vec<ModelName> = distinct_models(
        lookup.canonicalizer(),
        production_models.iter().map(|model| AsRef::<str>::as_ref(model)),
    )
    .into_iter()
    .filter(|(key, _)| catalog.contains(key.as_str()) && !with_defects.contains(key))
    .map(|(_, name)| name)
    .collect();
    out.sort();
    out
}

/// `corresponds_to` models that never appear in the production log.
pub fn defect_models_without_production<S: AsRef<str>>(
    production_models: &[S],
    lookup: &CatalogLookup,
) -> Vec<ModelName> {
    let canonicalizer = lookup.canonicalizer();
    let produced: HashSet<CanonicalKey> = production_models
        .iter()
        .map(|model| canonicalizer.canonicalize(model.as_ref()))
        .collect();
    let corresponds = lookup
        .entries()
        .iter()
        .map(|entry| entry.row.corresponds_to.as_str());
    let mut out: Vec<ModelName> = distinct_models(canonicalizer, corresponds)
        .into_iter()
        .filter(|(key, _)| !produced.contains(key))
        .map(|(_, name)| name)
        .collect();
    out.sort();
    out
}

fn corresponds_keys(lookup: &CatalogLookup) -> HashSet<CanonicalKey> {
    lookup
        .entries()
        .iter()
        .map(|entry| lookup.canonicalizer().canonicalize(&entry.row.corresponds_to))
        .filter(|key| !key.is_empty())
        .collect()
}

/// Distinct non-empty models by canonical key, keeping the first spelling seen.
fn distinct_models<'a, I>(
    canonicalizer: &Canonicalizer,
    models: I,
) -> IndexMap<CanonicalKey, ModelName>
where
    I: Iterator<Item = &'a str>,
{
    let mut out = IndexMap::new();
    for model in models {
        let key = canonicalizer.canonicalize(model);
        if !key.is_empty() {
            out.entry(key).or_insert_with(|| model.trim().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalMode;
    use crate::catalog::CatalogRow;

    fn lookup() -> CatalogLookup {
        let canon = Canonicalizer::new(CanonicalMode::Delimited { delimiter: '_' }).unwrap();
        CatalogLookup::build(
            canon,
            &[
                CatalogRow::new("CM-250 FALANTE", "CAIXA CM-250")
                    .with_corresponds_to("CAIXA CM-250"),
                CatalogRow::new("TORRE TM", "TORRE TM-2200"),
                CatalogRow::new("PLACA", "").with_corresponds_to("TV 50"),
            ],
            &[],
        )
    }

    #[test]
    fn status_audit_counts() {
        let lookup = lookup();
        assert_eq!(
            status_audit(&lookup),
            StatusAudit {
                total: 3,
                ok: 2,
                not_counted: 1
            }
        );
        let missing = not_counted(&lookup);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].row.defect_model, "PLACA");
    }

    #[test]
    fn production_coverage_kpi() {
        let lookup = lookup();
        let coverage = production_coverage(
            &["caixa cm-250", "CAIXA CM 250", "GELADEIRA", "TORRE TM-2200"],
            &lookup,
        );
        assert_eq!(coverage.total_models, 3);
        assert_eq!(coverage.understood, 2);
        assert!((coverage.kpi - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(coverage.divergent, vec!["GELADEIRA"]);
        assert_eq!(coverage.valid, vec!["TORRE TM-2200", "caixa cm-250"]);

        let empty: [&str; 0] = [];
        assert_eq!(production_coverage(&empty, &lookup).kpi, 100.0);
    }

    #[test]
    fn defect_and_production_gaps() {
        let lookup = lookup();
        let produced = ["CAIXA CM-250", "TORRE TM-2200", "GELADEIRA"];
        assert_eq!(models_without_defects(&produced, &lookup), vec!["TORRE TM-2200"]);
        assert_eq!(defect_models_without_production(&produced, &lookup), vec!["TV 50"]);
    }
}
