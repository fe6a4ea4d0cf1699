use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::canonical::Canonicalizer;
use crate::catalog::{CatalogRow, LookupEntry, finalize_rows};
use crate::constants::catalog::{LOOKUP_SCHEMA, LOOKUP_SOURCE_ID};
use crate::constants::columns::{
    CATALOG_CORRESPONDS_TO, CATALOG_DEFECT_MODEL, CATALOG_DISPOSITION, CATALOG_PRODUCTION_MODEL,
};
use crate::errors::PpmError;
use crate::transport::{Table, read_parquet, write_utf8_columns};
use crate::types::CanonicalKey;

/// Persisted override table. Only [`LookupStore::update`] writes it.
///
/// Writes go through a temp file and rename, so readers see either the old or the new
/// table. Concurrent `update` calls are not coordinated: the last rename wins.
#[derive(Clone, Debug)]
pub struct LookupStore {
    path: PathBuf,
}

impl LookupStore {
    /// Store backed by a parquet file at `path` (created on first update).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored rows; a missing file is an empty store.
    ///
    /// Only `MODELO_DEFEITO` is required; older stores without the other columns
    /// load with those fields empty.
    pub fn load(&self) -> Result<Vec<CatalogRow>, PpmError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let table = read_parquet(&self.path, LOOKUP_SOURCE_ID.to_string()).map_err(|err| {
            PpmError::Store(format!("failed reading {}: {err}", self.path.display()))
        })?;
        let defect = table.require_column(&CATALOG_DEFECT_MODEL)?;
        let disposition = table.column(&CATALOG_DISPOSITION);
        let corresponds = table.column(&CATALOG_CORRESPONDS_TO);
        let production = table.column(&CATALOG_PRODUCTION_MODEL);
        if production.is_none() {
            warn!(
                "[defect_ppm:catalog] store {} has no {} column",
                self.path.display(),
                CATALOG_PRODUCTION_MODEL.as_str()
            );
        }
        Ok(table
            .rows()
            .map(|row| CatalogRow {
                defect_model: Table::cell(row, Some(defect)).to_string(),
                disposition: Table::cell(row, disposition).to_string(),
                corresponds_to: Table::cell(row, corresponds).to_string(),
                production_model: Table::cell(row, production).to_string(),
            })
            .collect())
    }

    /// Merge `new_rows` into the stored rows keyed by canonical defect phrase.
    ///
    /// The last row supplied for a key wins and moves to the end; rows with a blank key
    /// are dropped. `MODELO_FINAL` and `STATUS` are recomputed over the merged set, then
    /// the file is replaced atomically. On error the previous file is left untouched.
    pub fn update(
        &self,
        canonicalizer: &Canonicalizer,
        new_rows: &[CatalogRow],
    ) -> Result<Vec<LookupEntry>, PpmError> {
        let existing = self.load()?;
        let mut merged: IndexMap<CanonicalKey, CatalogRow> = IndexMap::new();
        let mut blank = 0usize;
        for row in existing.into_iter().chain(new_rows.iter().cloned()) {
            let key = canonicalizer.canonicalize(&row.defect_model);
            if key.is_empty() {
                blank += 1;
                continue;
            }
            merged.shift_remove(&key);
            merged.insert(key, trimmed(row));
        }
        if blank > 0 {
            warn!("[defect_ppm:catalog] dropped {blank} rows with a blank defect phrase");
        }
        let entries = finalize_rows(canonicalizer, merged.into_values().collect());
        self.write(&entries)?;
        info!(
            "[defect_ppm:catalog] store {} now holds {} rows",
            self.path.display(),
            entries.len()
        );
        Ok(entries)
    }

    fn write(&self, entries: &[LookupEntry]) -> Result<(), PpmError> {
        let columns = [
            store_column(entries, |entry| entry.row.defect_model.as_str()),
            store_column(entries, |entry| entry.row.disposition.as_str()),
            store_column(entries, |entry| entry.row.corresponds_to.as_str()),
            store_column(entries, |entry| entry.row.production_model.as_str()),
            store_column(entries, |entry| entry.model_final.as_str()),
            store_column(entries, |entry| entry.status.as_str()),
        ];
        write_utf8_columns(&self.path, LOOKUP_SCHEMA, &columns)
    }
}

fn store_column<F>(entries: &[LookupEntry], field: F) -> Vec<String>
where
    F: Fn(&LookupEntry) -> &str,
{
    entries.iter().map(|entry| field(entry).to_string()).collect()
}

fn trimmed(row: CatalogRow) -> CatalogRow {
    CatalogRow {
        defect_model: row.defect_model.trim().to_string(),
        disposition: row.disposition.trim().to_string(),
        corresponds_to: row.corresponds_to.trim().to_string(),
        production_model: row.production_model.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalMode;
    use crate::catalog::LookupStatus;
    use crate::constants::columns::{CATALOG_MODEL_FINAL, CATALOG_STATUS};
    use tempfile::tempdir;

    fn canon() -> Canonicalizer {
        Canonicalizer::new(CanonicalMode::Delimited { delimiter: '_' }).unwrap()
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempdir().unwrap();
        let store = LookupStore::new(dir.path().join("lookup.parquet"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn update_dedupes_last_wins_and_persists() {
        let dir = tempdir().unwrap();
        let store = LookupStore::new(dir.path().join("processed").join("lookup.parquet"));
        let entries = store
            .update(
                &canon(),
                &[
                    CatalogRow::new("Modelo X", "PROD A"),
                    CatalogRow::new("modelo  x", ""),
                    CatalogRow::new("  ", "PROD B"),
                    CatalogRow::new("Modelo Y", "PROD B").with_corresponds_to("Y FINAL"),
                ],
            )
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].row.defect_model, "modelo  x");
        assert_eq!(entries[0].model_final, "modelo  x");
        assert_eq!(entries[0].status, LookupStatus::NotCounted);
        assert_eq!(entries[1].row.defect_model, "Modelo Y");
        assert_eq!(entries[1].model_final, "Y FINAL");
        assert_eq!(entries[1].status, LookupStatus::Ok);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].defect_model, "modelo  x");
        assert_eq!(loaded[0].production_model, "");
        assert_eq!(loaded[1].corresponds_to, "Y FINAL");

        let entries = store
            .update(&canon(), &[CatalogRow::new("MODELO X", "PROD C")])
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].row.defect_model, "Modelo Y");
        assert_eq!(entries[1].row.production_model, "PROD C");
        assert_eq!(entries[1].status, LookupStatus::Ok);
    }

    #[test]
    fn persisted_file_carries_final_model_and_status() {
        let dir = tempdir().unwrap();
        let store = LookupStore::new(dir.path().join("lookup.parquet"));
        store
            .update(
                &canon(),
                &[
                    CatalogRow::new("PLACA", ""),
                    CatalogRow::new("CAIXA", "CAIXA CM-250").with_corresponds_to("CAIXA CM-250"),
                ],
            )
            .unwrap();
        let table = read_parquet(store.path(), LOOKUP_SOURCE_ID.to_string()).unwrap();
        let status = table.require_column(&CATALOG_STATUS).unwrap();
        let final_model = table.require_column(&CATALOG_MODEL_FINAL).unwrap();
        let rows: Vec<(&str, &str)> = table
            .rows()
            .map(|row| {
                (
                    Table::cell(row, Some(final_model)),
                    Table::cell(row, Some(status)),
                )
            })
            .collect();
        assert_eq!(rows, vec![("PLACA", "NOT_COUNTED"), ("CAIXA CM-250", "OK")]);
    }
}
