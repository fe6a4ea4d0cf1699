#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line runner behind the `ppm_report` binary.
pub mod apps;
/// Deterministic text canonicalization.
pub mod canonical;
/// Catalog lookup: official table, persisted overrides, and audits.
pub mod catalog;
/// Lexicon-first failure classification with a statistical fallback.
pub mod classifier;
/// Column keys and header normalization.
pub mod columns;
/// Pipeline configuration.
pub mod config;
/// Centralized constants grouped by concern.
pub mod constants;
/// Record and fact types shared by ingestion and aggregation.
pub mod data;
/// Production and defect table ingestion.
pub mod ingestion;
/// Description-to-code lexicon store.
pub mod lexicon;
pub mod metrics;
/// End-to-end reconciliation.
pub mod pipeline;
/// PPM aggregation, monthly detail, and the correction overlay.
pub mod ppm;
/// Layered model identity resolution.
pub mod resolver;
/// Technical synonym rewrites over canonical keys.
pub mod synonyms;
/// Tabular file transports (delimited text and parquet).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Text helpers.
pub mod utils;

mod errors;

pub use canonical::{CanonicalMode, Canonicalizer};
pub use catalog::{Catalog, CatalogLookup, CatalogRow, LookupEntry, LookupStatus, LookupStore};
pub use classifier::{
    ClassifierArtifacts, FailureClassifier, LabelPredictor, LinearClassifier, Prediction,
    PredictionSource, TextVectorizer, TfidfVectorizer,
};
pub use config::PipelineConfig;
pub use data::{DefectFact, ProductionFact, RawRecord, RecordKind, SkippedRows};
pub use errors::PpmError;
pub use lexicon::Lexicon;
pub use pipeline::{CodeSource, ReconciledDefect, ReconciliationReport, Reconciler};
pub use ppm::{AggregationBucket, CorrectionOverlay, CorrectionRecord, Granularity};
pub use resolver::{ModelResolver, Resolution, ResolutionRule};
pub use synonyms::SynonymRules;
pub use transport::{Table, read_table};
pub use types::{
    CanonicalKey, CategoryName, ColumnName, Description, FailureCode, ModelName, SourceId,
};
