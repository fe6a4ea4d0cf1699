//! End-to-end reconciliation: canonicalizer, classifier and resolver, catalog lookup,
//! then the PPM engine.

use std::sync::Arc;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::canonical::Canonicalizer;
use crate::catalog::{Catalog, LookupStatus, LookupStore, load_official};
use crate::classifier::{ClassifierArtifacts, FailureClassifier, PredictionSource};
use crate::config::PipelineConfig;
use crate::data::{DefectFact, ProductionFact, RawRecord, SkippedRows};
use crate::errors::PpmError;
use crate::ingestion::{ingest_defects, ingest_production};
use crate::lexicon::Lexicon;
use crate::metrics::{AgreementReport, ClassificationSample, agreement};
use crate::ppm::{
    AggregationBucket, CorrectionOverlay, Granularity, JoinAudit, MonthlyDetailRow, aggregate,
    join_audit, monthly_detail,
};
use crate::resolver::{ModelResolver, ResolutionRule};
use crate::synonyms::SynonymRules;
use crate::transport::{Table, read_table};
use crate::types::{CanonicalKey, CategoryName, Description, FailureCode, ModelName};

/// Where a reconciled defect's failure code came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeSource {
    /// Code written in the defect log.
    Recorded,
    /// Exact lexicon hit on the description.
    Lexicon,
    /// Statistical fallback on the description.
    Model,
    /// No code recorded and none predicted.
    Unclassified,
}

impl From<PredictionSource> for CodeSource {
    fn from(source: PredictionSource) -> Self {
        match source {
            PredictionSource::Lexicon => CodeSource::Lexicon,
            PredictionSource::Model => CodeSource::Model,
            PredictionSource::Unclassified => CodeSource::Unclassified,
        }
    }
}

/// Defect row after classification and model resolution, with provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciledDefect {
    /// Zero-based row in the defect table.
    pub row: usize,
    /// Defect date; `None` when blank or malformed.
    pub date: Option<NaiveDate>,
    /// Standardized shift.
    pub shift: Option<String>,
    /// Production line number.
    pub line: Option<u32>,
    /// Product category, possibly empty.
    pub category: CategoryName,
    /// Model text as written in the defect log.
    pub raw_model: ModelName,
    /// Resolved model.
    pub model: ModelName,
    /// Canonicalized `model`; the production join key.
    pub model_key: CanonicalKey,
    /// Catalog status of `raw_model`.
    pub catalog_status: LookupStatus,
    /// Resolver rule used when the catalog did not know the model.
    pub resolution_rule: Option<ResolutionRule>,
    /// Description as written.
    pub description: Description,
    /// Canonical form of `description` used for classification.
    pub description_key: CanonicalKey,
    /// Code written in the defect log (uppercased, possibly empty).
    pub recorded_code: FailureCode,
    /// Classifier output for `description`.
    pub predicted_code: FailureCode,
    /// Recorded code when present, otherwise the predicted one.
    pub failure_code: FailureCode,
    /// Where `failure_code` came from.
    pub code_source: CodeSource,
    /// Defect units, at least 1.
    pub count: u64,
}

impl ReconciledDefect {
    /// Aggregation view of this row.
    pub fn to_fact(&self) -> DefectFact {
        DefectFact {
            date: self.date,
            model: self.model.clone(),
            model_key: self.model_key.clone(),
            category: self.category.clone(),
            failure_code: self.failure_code.clone(),
            description: self.description.clone(),
            count: self.count,
        }
    }
}

/// Output of one reconciliation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Reconciled defect rows, in defect-log order.
    pub defects: Vec<ReconciledDefect>,
    /// Production rows, in production-log order.
    pub production: Vec<ProductionFact>,
    /// Production rows coerced or dropped.
    pub production_skipped: SkippedRows,
    /// Defect rows coerced or dropped.
    pub defect_skipped: SkippedRows,
}

impl ReconciliationReport {
    /// Defect rows as aggregation facts.
    pub fn defect_facts(&self) -> Vec<DefectFact> {
        self.defects.iter().map(ReconciledDefect::to_fact).collect()
    }

    /// PPM table at `granularity`, in first-seen defect order.
    pub fn ppm(&self, granularity: Granularity) -> Vec<AggregationBucket> {
        aggregate(&self.defect_facts(), &self.production, granularity)
    }

    /// Per (date, model, code, description) rows joined to monthly production,
    /// with `overlay` applied.
    pub fn monthly_detail(&self, overlay: &CorrectionOverlay) -> Vec<MonthlyDetailRow> {
        let mut rows = monthly_detail(&self.defect_facts(), &self.production);
        let applied = overlay.apply(&mut rows);
        if applied > 0 {
            info!("[defect_ppm:pipeline] applied {applied} corrections");
        }
        rows
    }

    /// Models present on only one side of the join.
    pub fn join_audit(&self) -> JoinAudit {
        join_audit(&self.defect_facts(), &self.production)
    }

    /// Distinct production model names, first spelling per canonical key, in log order.
    pub fn production_models(&self) -> Vec<ModelName> {
        distinct_production_models(&self.production)
    }

    /// Classifier agreement over rows that carry a recorded code.
    pub fn agreement(&self) -> AgreementReport {
        let samples: Vec<ClassificationSample> = self
            .defects
            .iter()
            .filter(|defect| !defect.recorded_code.is_empty())
            .map(|defect| ClassificationSample {
                row: defect.row,
                description: defect.description.clone(),
                canonical: defect.description_key.clone(),
                recorded: defect.recorded_code.clone(),
                predicted: defect.predicted_code.clone(),
            })
            .collect();
        agreement(&samples)
    }
}

/// Loaded, read-only components wired in dependency order.
#[derive(Clone, Debug)]
pub struct Reconciler {
    canonicalizer: Canonicalizer,
    catalog: Catalog,
    classifier: FailureClassifier,
    resolver: ModelResolver,
}

impl Reconciler {
    /// Load the catalog, store, lexicon and optional classifier artifacts named by `config`.
    pub fn open(config: &PipelineConfig) -> Result<Self, PpmError> {
        let canonicalizer = Canonicalizer::new(config.mode)?;
        let official = load_official(&read_table(&config.official_catalog)?)?;
        let catalog = Catalog::open(
            canonicalizer,
            official,
            LookupStore::new(&config.lookup_store),
        )?;
        let lexicon = Lexicon::load(&config.lexicon)?;
        let artifacts = ClassifierArtifacts::load(&config.vectorizer, &config.classifier)?;
        let mut classifier = FailureClassifier::new(canonicalizer, Arc::new(lexicon), artifacts);
        if config.use_synonyms {
            classifier = classifier.with_synonyms(SynonymRules::defaults(canonicalizer));
        }
        let resolver = ModelResolver::with_defaults()?;
        Ok(Self::from_parts(canonicalizer, catalog, classifier, resolver))
    }

    /// Wire already-built components.
    pub fn from_parts(
        canonicalizer: Canonicalizer,
        catalog: Catalog,
        classifier: FailureClassifier,
        resolver: ModelResolver,
    ) -> Self {
        Self {
            canonicalizer,
            catalog,
            classifier,
            resolver,
        }
    }

    /// Canonicalizer shared by every stage.
    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    /// Merged catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Failure classifier.
    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    /// Model resolver.
    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Read the production and defect logs named by `config` and reconcile them.
    pub fn run(&self, config: &PipelineConfig) -> Result<ReconciliationReport, PpmError> {
        let production = read_table(&config.production)?;
        let defects = read_table(&config.defects)?;
        self.reconcile(&production, &defects)
    }

    /// Reconcile in-memory tables.
    ///
    /// Each defect takes its recorded code, or the classifier's prediction when
    /// none was recorded. Its model comes from the catalog; models the catalog
    /// does not know go through the resolver against the distinct production names.
    pub fn reconcile(
        &self,
        production: &Table,
        defects: &Table,
    ) -> Result<ReconciliationReport, PpmError> {
        let produced = ingest_production(production)?;
        let defect_rows = ingest_defects(defects)?;

        let production: Vec<ProductionFact> = produced
            .records
            .iter()
            .map(|record| self.production_fact(record))
            .collect();
        let known = distinct_production_models(&production);
        let reconciled: Vec<ReconciledDefect> = defect_rows
            .records
            .iter()
            .map(|record| self.reconcile_defect(record, &known))
            .collect();

        let unknown = reconciled
            .iter()
            .filter(|defect| defect.catalog_status == LookupStatus::Unknown)
            .count();
        let unclassified = reconciled
            .iter()
            .filter(|defect| defect.code_source == CodeSource::Unclassified)
            .count();
        info!(
            "[defect_ppm:pipeline] reconciled {} defects against {} production rows ({} models outside the catalog, {} unclassified)",
            reconciled.len(),
            production.len(),
            unknown,
            unclassified
        );
        Ok(ReconciliationReport {
            defects: reconciled,
            production,
            production_skipped: produced.skipped,
            defect_skipped: defect_rows.skipped,
        })
    }

    fn production_fact(&self, record: &RawRecord) -> ProductionFact {
        ProductionFact {
            date: record.date,
            model: record.model_text.clone(),
            model_key: self.canonicalizer.canonicalize(&record.model_text),
            category: record.category.clone(),
            quantity: record.quantity.unwrap_or(0.0),
        }
    }

    fn reconcile_defect(&self, record: &RawRecord, known: &[ModelName]) -> ReconciledDefect {
        let prediction = self.classifier.predict_detailed(&record.description);
        let recorded_code = record.failure_code.trim().to_string();
        let (failure_code, code_source) = if recorded_code.is_empty() {
            (prediction.code.clone(), CodeSource::from(prediction.source))
        } else {
            (recorded_code.clone(), CodeSource::Recorded)
        };

        let (catalog_model, catalog_status) = self.catalog.resolve(&record.model_text);
        let (model, resolution_rule) = if catalog_status == LookupStatus::Unknown {
            match self.resolver.resolve_detailed(&record.model_text, known) {
                Some(resolution) => (resolution.model, Some(resolution.rule)),
                None => (catalog_model, None),
            }
        } else {
            (catalog_model, None)
        };
        let model_key = self.canonicalizer.canonicalize(&model);

        ReconciledDefect {
            row: record.row,
            date: record.date,
            shift: record.shift.clone(),
            line: record.line,
            category: record.category.clone(),
            raw_model: record.model_text.clone(),
            model,
            model_key,
            catalog_status,
            resolution_rule,
            description: record.description.clone(),
            description_key: self.canonicalizer.canonicalize(&record.description),
            recorded_code,
            predicted_code: prediction.code,
            failure_code,
            code_source,
            count: record.quantity.map_or(1, |count| count as u64),
        }
    }
}

fn distinct_production_models(production: &[ProductionFact]) -> Vec<ModelName> {
    let mut seen: IndexMap<&str, &str> = IndexMap::new();
    for fact in production {
        if !fact.model_key.is_empty() {
            seen.entry(fact.model_key.as_str())
                .or_insert(fact.model.as_str());
        }
    }
    seen.into_values().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalMode;
    use crate::catalog::CatalogRow;
    use tempfile::tempdir;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            "test",
            headers,
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn reconciler(dir: &std::path::Path) -> Reconciler {
        let canon = Canonicalizer::new(CanonicalMode::Delimited { delimiter: '_' }).unwrap();
        let catalog = Catalog::open(
            canon,
            vec![
                CatalogRow::new("ALTO FALANTE CM-250", "CAIXA AMPLIFICADA CM-250 BIVOLT")
                    .with_corresponds_to("CAIXA AMPLIFICADA CM-250 BIVOLT"),
                CatalogRow::new("PLACA TV", ""),
            ],
            LookupStore::new(dir.join("lookup.parquet")),
        )
        .unwrap();
        let lexicon = Lexicon::from_entries([("SEM_LIGACAO", "F001")]);
        let classifier = FailureClassifier::new(canon, Arc::new(lexicon), None)
            .with_synonyms(SynonymRules::defaults(canon));
        Reconciler::from_parts(canon, catalog, classifier, ModelResolver::with_defaults().unwrap())
    }

    #[test]
    fn defects_take_catalog_model_and_predicted_code() {
        let dir = tempdir().unwrap();
        let reconciler = reconciler(dir.path());
        let production = table(
            &["DATA", "MODELO", "QTY_GERAL", "CATEGORIA"],
            &[
                &["02/01/2024", "Caixa Amplificada CM-250 Bivolt", "100000", "AUDIO"],
                &["03/01/2024", "GELADEIRA DUPLEX 220V", "50", "LINHA BRANCA"],
            ],
        );
        let defects = table(
            &["DATA", "DESCRICAO", "DESC. FALHA", "COD FALHA", "CATEGORIA"],
            &[
                &["02/01/2024", "alto falante cm-250", "Sem ligação", "", "AUDIO"],
                &["02/01/2024", "ALTO FALANTE CM-250", "ruido", "f777", "AUDIO"],
                &["02/01/2024", "PLACA TV", "tela azul", "", "TV"],
                &["03/01/2024", "geladeira duplex", "porta", "", "LINHA BRANCA"],
            ],
        );
        let report = reconciler.reconcile(&production, &defects).unwrap();
        assert_eq!(report.defects.len(), 4);

        let first = &report.defects[0];
        assert_eq!(first.model, "CAIXA AMPLIFICADA CM-250 BIVOLT");
        assert_eq!(first.catalog_status, LookupStatus::Ok);
        assert_eq!(first.failure_code, "F001");
        assert_eq!(first.code_source, CodeSource::Lexicon);

        let second = &report.defects[1];
        assert_eq!(second.failure_code, "F777");
        assert_eq!(second.code_source, CodeSource::Recorded);

        let third = &report.defects[2];
        assert_eq!(third.catalog_status, LookupStatus::NotCounted);
        assert_eq!(third.code_source, CodeSource::Unclassified);
        assert_eq!(third.failure_code, "");

        let fourth = &report.defects[3];
        assert_eq!(fourth.catalog_status, LookupStatus::Unknown);
        assert_eq!(fourth.resolution_rule, Some(ResolutionRule::NearestProductionModel));
        assert_eq!(fourth.model, "GELADEIRA DUPLEX 220V");

        let buckets = report.ppm(Granularity::Model);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].defect_count, 2);
        assert_eq!(buckets[0].production_qty, 100_000.0);
        assert_eq!(buckets[0].ppm, 20.0);
        assert_eq!(buckets[1].ppm, 0.0);
        assert_eq!(buckets[2].ppm, 20_000.0);
    }

    #[test]
    fn agreement_only_uses_recorded_codes() {
        let dir = tempdir().unwrap();
        let reconciler = reconciler(dir.path());
        let production = table(&["DATA", "MODELO", "QTY_GERAL"], &[]);
        let defects = table(
            &["DATA", "DESCRICAO", "DESC_FALHA", "COD_FALHA"],
            &[
                &["02/01/2024", "X", "sem ligacao", "F001"],
                &["02/01/2024", "X", "sem ligacao", "F002"],
                &["02/01/2024", "X", "sem ligacao", ""],
            ],
        );
        let report = reconciler.reconcile(&production, &defects).unwrap();
        let agreement = report.agreement();
        assert_eq!(agreement.total, 2);
        assert_eq!(agreement.agreeing, 1);
        assert_eq!(agreement.divergences[0].recorded, "F002");
    }
}
