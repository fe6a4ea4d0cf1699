//! Catalog lookup: official model-mapping table merged with the persisted override store.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::canonical::Canonicalizer;
use crate::constants::catalog::{STATUS_NOT_COUNTED, STATUS_OK, STATUS_UNKNOWN};
use crate::constants::columns::{
    CATALOG_CORRESPONDS_TO, CATALOG_DEFECT_MODEL, CATALOG_DISPOSITION, CATALOG_PRODUCTION_MODEL,
};
use crate::errors::PpmError;
use crate::transport::Table;
use crate::types::{CanonicalKey, ModelName};

/// Status and coverage audits over a built lookup.
pub mod audit;
/// Parquet-backed override store.
pub mod store;

pub use audit::{
    ProductionCoverage, StatusAudit, defect_models_without_production, models_without_defects,
    not_counted, production_coverage, status_audit,
};
pub use store::LookupStore;

/// One row of the official catalog or the override store (raw, trimmed text).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    /// Phrase as written in the defect log (`MODELO_DEFEITO`).
    pub defect_model: String,
    /// Disposition note (`SE_TRATA_DE`).
    pub disposition: String,
    /// Phrase the defect model corresponds to (`CORRESPONDE_A`).
    pub corresponds_to: String,
    /// Production-log model phrase (`MODELO_PRODUCAO`).
    pub production_model: String,
}

impl CatalogRow {
    /// Row with a defect phrase and production model; other fields empty.
    pub fn new(defect_model: impl Into<String>, production_model: impl Into<String>) -> Self {
        Self {
            defect_model: defect_model.into(),
            production_model: production_model.into(),
            ..Self::default()
        }
    }

    /// Set the corresponds-to phrase.
    pub fn with_corresponds_to(mut self, corresponds_to: impl Into<String>) -> Self {
        self.corresponds_to = corresponds_to.into();
        self
    }

    /// Set the disposition note.
    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = disposition.into();
        self
    }

    /// Field-wise merge where non-empty fields of `preferred` win.
    fn overlaid_by(&self, preferred: &CatalogRow) -> CatalogRow {
        let pick = |preferred: &str, fallback: &str| {
            if preferred.trim().is_empty() {
                fallback.to_string()
            } else {
                preferred.to_string()
            }
        };
        CatalogRow {
            defect_model: pick(&preferred.defect_model, &self.defect_model),
            disposition: pick(&preferred.disposition, &self.disposition),
            corresponds_to: pick(&preferred.corresponds_to, &self.corresponds_to),
            production_model: pick(&preferred.production_model, &self.production_model),
        }
    }
}

/// Counting status of a lookup entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupStatus {
    /// Production model is known; defects count toward PPM.
    Ok,
    /// No production model; defects are not counted.
    NotCounted,
    /// Phrase is not in the catalog.
    Unknown,
}

impl LookupStatus {
    /// Stable label persisted in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupStatus::Ok => STATUS_OK,
            LookupStatus::NotCounted => STATUS_NOT_COUNTED,
            LookupStatus::Unknown => STATUS_UNKNOWN,
        }
    }
}

/// Merged catalog row with its derived fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    /// Winning row, official or persisted.
    #[serde(flatten)]
    pub row: CatalogRow,
    /// `corresponds_to` when it canonicalizes to something, else `defect_model`.
    pub model_final: ModelName,
    /// Whether defects of this model count toward PPM.
    pub status: LookupStatus,
    /// Canonical defect phrase.
    pub key: CanonicalKey,
    /// Canonical production-model phrase.
    pub production_key: CanonicalKey,
}

/// Derive `MODELO_FINAL`, keys, and `STATUS` for a set of merged rows.
///
/// `STATUS` is `Ok` exactly when the canonical production model is non-empty and in the
/// set of canonical production models of `rows`.
pub(crate) fn finalize_rows(
    canonicalizer: &Canonicalizer,
    rows: Vec<CatalogRow>,
) -> Vec<LookupEntry> {
    let keyed: Vec<(CatalogRow, CanonicalKey, CanonicalKey)> = rows
        .into_iter()
        .map(|row| {
            let key = canonicalizer.canonicalize(&row.defect_model);
            let production_key = canonicalizer.canonicalize(&row.production_model);
            (row, key, production_key)
        })
        .collect();
    let production_set: HashSet<&str> = keyed
        .iter()
        .map(|(_, _, production_key)| production_key.as_str())
        .filter(|key| !key.is_empty())
        .collect();
    let statuses: Vec<LookupStatus> = keyed
        .iter()
        .map(|(_, _, production_key)| {
            if !production_key.is_empty() && production_set.contains(production_key.as_str()) {
                LookupStatus::Ok
            } else {
                LookupStatus::NotCounted
            }
        })
        .collect();
    keyed
        .into_iter()
        .zip(statuses)
        .map(|((row, key, production_key), status)| {
            let model_final = if canonicalizer.canonicalize(&row.corresponds_to).is_empty() {
                row.defect_model.trim().to_string()
            } else {
                row.corresponds_to.trim().to_string()
            };
            LookupEntry {
                row,
                model_final,
                status,
                key,
                production_key,
            }
        })
        .collect()
}

/// In-memory lookup rebuilt from the official and persisted tables on every build.
#[derive(Clone, Debug)]
pub struct CatalogLookup {
    canonicalizer: Canonicalizer,
    entries: Vec<LookupEntry>,
    by_defect: HashMap<CanonicalKey, usize>,
    by_production: HashMap<CanonicalKey, usize>,
}

impl CatalogLookup {
    /// Merge `official` with `persisted`: persisted non-empty fields win per canonical
    /// defect phrase, and persisted-only rows are appended in store order.
    pub fn build(
        canonicalizer: Canonicalizer,
        official: &[CatalogRow],
        persisted: &[CatalogRow],
    ) -> Self {
        let mut overrides: IndexMap<CanonicalKey, &CatalogRow> = IndexMap::new();
        for row in persisted {
            let key = canonicalizer.canonicalize(&row.defect_model);
            if key.is_empty() {
                continue;
            }
            overrides.shift_remove(&key);
            overrides.insert(key, row);
        }
        let mut used: HashSet<CanonicalKey> = HashSet::new();
        let mut merged = Vec::with_capacity(official.len() + overrides.len());
        for row in official {
            let key = canonicalizer.canonicalize(&row.defect_model);
            match overrides.get(&key) {
                Some(preferred) => {
                    merged.push(row.overlaid_by(preferred));
                    used.insert(key);
                }
                None => merged.push(row.clone()),
            }
        }
        let mut appended = 0usize;
        for (key, row) in &overrides {
            if !used.contains(key) {
                merged.push((*row).clone());
                appended += 1;
            }
        }
        let lookup = Self::from_entries(canonicalizer, finalize_rows(&canonicalizer, merged));
        info!(
            "[defect_ppm:catalog] built lookup: {} official rows, {} overrides applied, {} store-only rows",
            official.len(),
            used.len(),
            appended
        );
        lookup
    }

    fn from_entries(canonicalizer: Canonicalizer, entries: Vec<LookupEntry>) -> Self {
        let mut by_defect = HashMap::new();
        let mut by_production = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            if !entry.key.is_empty() {
                by_defect.entry(entry.key.clone()).or_insert(idx);
            }
            if !entry.production_key.is_empty() {
                by_production.entry(entry.production_key.clone()).or_insert(idx);
            }
        }
        Self {
            canonicalizer,
            entries,
            by_defect,
            by_production,
        }
    }

    /// Entry for a defect-model text: defect phrase first, then production phrase.
    pub fn resolve_entry(&self, defect_model_text: &str) -> Option<&LookupEntry> {
        let key = self.canonicalizer.canonicalize(defect_model_text);
        if key.is_empty() {
            return None;
        }
        self.by_defect
            .get(&key)
            .or_else(|| self.by_production.get(&key))
            .map(|idx| &self.entries[*idx])
    }

    /// `(model_final, status)`; misses return the input unchanged with `Unknown`.
    pub fn resolve(&self, defect_model_text: &str) -> (ModelName, LookupStatus) {
        match self.resolve_entry(defect_model_text) {
            Some(entry) => (entry.model_final.clone(), entry.status),
            None => {
                debug!("[defect_ppm:catalog] no catalog entry for '{defect_model_text}'");
                (defect_model_text.to_string(), LookupStatus::Unknown)
            }
        }
    }

    /// Merged entries in build order.
    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }

    /// Number of merged entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the lookup has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical production-model keys across all entries.
    pub fn production_keys(&self) -> HashSet<&str> {
        self.by_production.keys().map(String::as_str).collect()
    }

    /// Canonicalizer the lookup was keyed with.
    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }
}

/// Official rows plus the override store, with the current merged lookup.
#[derive(Clone, Debug)]
pub struct Catalog {
    official: Vec<CatalogRow>,
    store: LookupStore,
    lookup: CatalogLookup,
}

impl Catalog {
    /// Load the store and build the lookup.
    pub fn open(
        canonicalizer: Canonicalizer,
        official: Vec<CatalogRow>,
        store: LookupStore,
    ) -> Result<Self, PpmError> {
        let persisted = store.load()?;
        let lookup = CatalogLookup::build(canonicalizer, &official, &persisted);
        Ok(Self {
            official,
            store,
            lookup,
        })
    }

    /// Current merged lookup.
    pub fn lookup(&self) -> &CatalogLookup {
        &self.lookup
    }

    /// See [`CatalogLookup::resolve`].
    pub fn resolve(&self, defect_model_text: &str) -> (ModelName, LookupStatus) {
        self.lookup.resolve(defect_model_text)
    }

    /// Merge `new_rows` into the store, persist atomically, and rebuild the lookup.
    /// The official rows are never modified.
    pub fn update(&mut self, new_rows: &[CatalogRow]) -> Result<Vec<LookupEntry>, PpmError> {
        let canonicalizer = *self.lookup.canonicalizer();
        let stored = self.store.update(&canonicalizer, new_rows)?;
        let persisted: Vec<CatalogRow> = stored.iter().map(|entry| entry.row.clone()).collect();
        self.lookup = CatalogLookup::build(canonicalizer, &self.official, &persisted);
        Ok(stored)
    }
}

/// Read official catalog rows; all four columns are required. Fully blank rows are skipped.
pub fn load_official(table: &Table) -> Result<Vec<CatalogRow>, PpmError> {
    let defect = table.require_column(&CATALOG_DEFECT_MODEL)?;
    let disposition = table.require_column(&CATALOG_DISPOSITION)?;
    let corresponds = table.require_column(&CATALOG_CORRESPONDS_TO)?;
    let production = table.require_column(&CATALOG_PRODUCTION_MODEL)?;
    let rows: Vec<CatalogRow> = table
        .rows()
        .map(|row| CatalogRow {
            defect_model: Table::cell(row, Some(defect)).to_string(),
            disposition: Table::cell(row, Some(disposition)).to_string(),
            corresponds_to: Table::cell(row, Some(corresponds)).to_string(),
            production_model: Table::cell(row, Some(production)).to_string(),
        })
        .filter(|row| {
            !(row.defect_model.is_empty()
                && row.disposition.is_empty()
                && row.corresponds_to.is_empty()
                && row.production_model.is_empty())
        })
        .collect();
    info!(
        "[defect_ppm:catalog] {}: {} official rows",
        table.source_id(),
        rows.len()
    );
    Ok(rows)
}
