use std::path::{Path, PathBuf};

use crate::canonical::CanonicalMode;
use crate::constants::metrics::{DEFAULT_ANOMALY_Z, DEFAULT_RARE_THRESHOLD};
use crate::constants::paths;

/// File locations and text-handling choices for one reconciliation run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Canonicalization strategy the catalog and lexicon were keyed with.
    ///
    /// There is no default; the caller has to pick one.
    pub mode: CanonicalMode,
    /// Official model catalog (read-only).
    pub official_catalog: PathBuf,
    /// Production-volume log.
    pub production: PathBuf,
    /// Defect log.
    pub defects: PathBuf,
    /// Manual correction overlay; a missing file means no corrections.
    pub corrections: PathBuf,
    /// Persisted catalog override table, rewritten by catalog updates.
    pub lookup_store: PathBuf,
    /// Description-to-code lexicon; a missing file means an empty lexicon.
    pub lexicon: PathBuf,
    /// Serialized vectorizer for the statistical fallback.
    pub vectorizer: PathBuf,
    /// Serialized label predictor for the statistical fallback.
    pub classifier: PathBuf,
    /// Apply the built-in technical synonym rules before falling back to the model.
    pub use_synonyms: bool,
    /// Z-score threshold for failure-code anomaly reports.
    pub anomaly_z: f64,
    /// Count at or below which a failure code is reported as rare.
    pub rare_threshold: u64,
}

impl PipelineConfig {
    /// Conventional `data/` and `models/` layout under `root`.
    pub fn with_data_dir(root: impl AsRef<Path>, mode: CanonicalMode) -> Self {
        let root = root.as_ref();
        Self {
            mode,
            official_catalog: root.join(paths::OFFICIAL_CATALOG),
            production: root.join(paths::PRODUCTION),
            defects: root.join(paths::DEFECTS),
            corrections: root.join(paths::CORRECTIONS),
            lookup_store: root.join(paths::LOOKUP_STORE),
            lexicon: root.join(paths::LEXICON),
            vectorizer: root.join(paths::VECTORIZER),
            classifier: root.join(paths::CLASSIFIER),
            use_synonyms: true,
            anomaly_z: DEFAULT_ANOMALY_Z,
            rare_threshold: DEFAULT_RARE_THRESHOLD,
        }
    }
}
