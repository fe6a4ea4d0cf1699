//! Lexicon-first failure classification with an optional statistical fallback.
//!
//! The fallback is split into two injected handles, a [`TextVectorizer`] and a
//! [`LabelPredictor`], bundled as [`ClassifierArtifacts`]. Built-in implementations
//! ([`TfidfVectorizer`], [`LinearClassifier`]) persist as prefixed bitcode payloads
//! produced by an offline training job; this crate only runs inference.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::canonical::Canonicalizer;
use crate::constants::classifier::{ARTIFACT_VERSION, BITCODE_PREFIX};
use crate::errors::PpmError;
use crate::lexicon::Lexicon;
use crate::synonyms::SynonymRules;
use crate::transport::write_atomic;
use crate::types::FailureCode;

/// Turns canonical text into a fixed-width feature vector.
pub trait TextVectorizer: Send + Sync {
    /// Feature vector for `text`; always `width()` long.
    fn transform(&self, text: &str) -> Vec<f32>;
    /// Output width.
    fn width(&self) -> usize;
}

/// Maps a feature vector to a label.
pub trait LabelPredictor: Send + Sync {
    /// Predicted label, or `None` when the vector cannot be scored.
    fn predict(&self, features: &[f32]) -> Option<String>;
}

/// Explicit handle over the loaded fallback model.
#[derive(Clone)]
pub struct ClassifierArtifacts {
    vectorizer: Arc<dyn TextVectorizer>,
    predictor: Arc<dyn LabelPredictor>,
}

impl std::fmt::Debug for ClassifierArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierArtifacts")
            .field("width", &self.vectorizer.width())
            .finish_non_exhaustive()
    }
}

impl ClassifierArtifacts {
    /// Bundle a vectorizer and predictor.
    pub fn new(vectorizer: Arc<dyn TextVectorizer>, predictor: Arc<dyn LabelPredictor>) -> Self {
        Self {
            vectorizer,
            predictor,
        }
    }

    /// Load the built-in artifact pair.
    ///
    /// Returns `Ok(None)` when either file is missing; corrupt payloads are errors.
    pub fn load(vectorizer_path: &Path, classifier_path: &Path) -> Result<Option<Self>, PpmError> {
        for path in [vectorizer_path, classifier_path] {
            if !path.exists() {
                warn!(
                    "[defect_ppm:classifier] artifact {} not found; lexicon-only mode",
                    path.display()
                );
                return Ok(None);
            }
        }
        let vectorizer = TfidfVectorizer::load(vectorizer_path)?;
        let predictor = LinearClassifier::load(classifier_path)?;
        if vectorizer.width() != predictor.width() {
            return Err(PpmError::Artifact(format!(
                "vectorizer width {} does not match classifier width {}",
                vectorizer.width(),
                predictor.width()
            )));
        }
        info!(
            "[defect_ppm:classifier] loaded artifacts (features={}, classes={})",
            vectorizer.width(),
            predictor.classes().len()
        );
        Ok(Some(Self::new(Arc::new(vectorizer), Arc::new(predictor))))
    }

    /// `None` when no term of `text` is in the vocabulary.
    fn predict(&self, text: &str) -> Option<String> {
        let features = self.vectorizer.transform(text);
        if features.iter().all(|value| *value == 0.0) {
            return None;
        }
        self.predictor.predict(&features)
    }
}

/// Which path produced a failure code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionSource {
    /// Exact lexicon hit.
    Lexicon,
    /// Statistical fallback.
    Model,
    /// Nothing matched; code is empty.
    Unclassified,
}

/// Failure code plus provenance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Failure code, empty when unclassified.
    pub code: FailureCode,
    /// Path that produced `code`.
    pub source: PredictionSource,
}

impl Prediction {
    fn unclassified() -> Self {
        Self {
            code: FailureCode::new(),
            source: PredictionSource::Unclassified,
        }
    }
}

/// Stateless per call; lexicon and artifacts are fixed at construction.
#[derive(Clone, Debug)]
pub struct FailureClassifier {
    canonicalizer: Canonicalizer,
    lexicon: Arc<Lexicon>,
    synonyms: Option<SynonymRules>,
    artifacts: Option<ClassifierArtifacts>,
}

impl FailureClassifier {
    /// Build a classifier. `artifacts: None` means lexicon-only.
    pub fn new(
        canonicalizer: Canonicalizer,
        lexicon: Arc<Lexicon>,
        artifacts: Option<ClassifierArtifacts>,
    ) -> Self {
        Self {
            canonicalizer,
            lexicon,
            synonyms: None,
            artifacts,
        }
    }

    /// Apply technical synonym rewrites to keys before lookup.
    pub fn with_synonyms(mut self, rules: SynonymRules) -> Self {
        self.synonyms = Some(rules);
        self
    }

    /// True when a statistical fallback is available.
    pub fn has_model(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Failure code for `raw_text`, or `""`.
    pub fn predict(&self, raw_text: &str) -> FailureCode {
        self.predict_detailed(raw_text).code
    }

    /// Failure code plus which path produced it.
    pub fn predict_detailed(&self, raw_text: &str) -> Prediction {
        let key = self.canonicalizer.canonicalize(raw_text);
        if key.is_empty() {
            return Prediction::unclassified();
        }
        if let Some(code) = self.lexicon.get(&key) {
            return Prediction {
                code: code.to_string(),
                source: PredictionSource::Lexicon,
            };
        }
        let key = match &self.synonyms {
            Some(rules) => rules.apply(&key),
            None => key,
        };
        if let Some(code) = self.lexicon.get(&key) {
            return Prediction {
                code: code.to_string(),
                source: PredictionSource::Lexicon,
            };
        }
        let Some(artifacts) = &self.artifacts else {
            return Prediction::unclassified();
        };
        // The vectorizer splits on whitespace, so hand it the key's tokens.
        let text = self.canonicalizer.tokens(&key).join(" ");
        match artifacts.predict(&text) {
            Some(label) if !label.trim().is_empty() => Prediction {
                code: label.trim().to_string(),
                source: PredictionSource::Model,
            },
            _ => {
                debug!("[defect_ppm:classifier] no label for key '{key}'");
                Prediction::unclassified()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, bitcode::Encode, bitcode::Decode)]
struct TfidfPayload {
    vocabulary: Vec<String>,
    idf: Vec<f32>,
    ngram_min: u32,
    ngram_max: u32,
}

/// TF-IDF text vectorizer over lowercased word n-grams with L2 normalization.
#[derive(Clone, Debug)]
pub struct TfidfVectorizer {
    payload: TfidfPayload,
    index: HashMap<String, usize>,
}

impl TfidfVectorizer {
    /// `vocabulary[i]` is the term for column `i`, weighted by `idf[i]`.
    pub fn new(
        vocabulary: Vec<String>,
        idf: Vec<f32>,
        ngram_range: (u32, u32),
    ) -> Result<Self, PpmError> {
        Self::from_payload(TfidfPayload {
            vocabulary,
            idf,
            ngram_min: ngram_range.0,
            ngram_max: ngram_range.1,
        })
    }

    fn from_payload(payload: TfidfPayload) -> Result<Self, PpmError> {
        if payload.vocabulary.len() != payload.idf.len() {
            return Err(PpmError::Artifact(format!(
                "vocabulary has {} terms but idf has {} weights",
                payload.vocabulary.len(),
                payload.idf.len()
            )));
        }
        if payload.ngram_min == 0 || payload.ngram_min > payload.ngram_max {
            return Err(PpmError::Artifact(format!(
                "invalid n-gram range ({}, {})",
                payload.ngram_min, payload.ngram_max
            )));
        }
        let index = payload
            .vocabulary
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        Ok(Self { payload, index })
    }

    /// Encode as a versioned bitcode payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_artifact(&bitcode::encode(&self.payload))
    }

    /// Decode a payload produced by [`TfidfVectorizer::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PpmError> {
        let raw = decode_artifact(bytes, "vectorizer")?;
        let payload = bitcode::decode(raw)
            .map_err(|err| PpmError::Artifact(format!("corrupt vectorizer payload: {err}")))?;
        Self::from_payload(payload)
    }

    /// Read from disk.
    pub fn load(path: &Path) -> Result<Self, PpmError> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Write atomically.
    pub fn save(&self, path: &Path) -> Result<(), PpmError> {
        save_artifact(path, &self.to_bytes())
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
            .filter(|word| word.chars().count() >= 2)
            .collect();
        let mut terms = Vec::new();
        for n in self.payload.ngram_min as usize..=self.payload.ngram_max as usize {
            if n > words.len() {
                break;
            }
            terms.extend(words.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}

impl TextVectorizer for TfidfVectorizer {
    fn transform(&self, text: &str) -> Vec<f32> {
        let mut features = vec![0.0f32; self.width()];
        for term in self.terms(text) {
            if let Some(&idx) = self.index.get(&term) {
                features[idx] += 1.0;
            }
        }
        for (value, idf) in features.iter_mut().zip(&self.payload.idf) {
            *value *= idf;
        }
        let norm = features.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            features.iter_mut().for_each(|v| *v /= norm);
        }
        features
    }

    fn width(&self) -> usize {
        self.payload.vocabulary.len()
    }
}

#[derive(Clone, Debug, PartialEq, bitcode::Encode, bitcode::Decode)]
struct LinearPayload {
    classes: Vec<String>,
    coefficients: Vec<Vec<f32>>,
    intercepts: Vec<f32>,
}

/// One-vs-rest linear scorer. With two classes a single coefficient row is accepted:
/// a positive score selects the second class.
#[derive(Clone, Debug)]
pub struct LinearClassifier {
    payload: LinearPayload,
}

impl LinearClassifier {
    /// Build from class labels, one coefficient row per class (or one row for two classes),
    /// and matching intercepts.
    pub fn new(
        classes: Vec<String>,
        coefficients: Vec<Vec<f32>>,
        intercepts: Vec<f32>,
    ) -> Result<Self, PpmError> {
        Self::from_payload(LinearPayload {
            classes,
            coefficients,
            intercepts,
        })
    }

    fn from_payload(payload: LinearPayload) -> Result<Self, PpmError> {
        let rows = payload.coefficients.len();
        let binary = payload.classes.len() == 2 && rows == 1;
        if payload.classes.is_empty() || (!binary && rows != payload.classes.len()) {
            return Err(PpmError::Artifact(format!(
                "{} classes cannot use {rows} coefficient rows",
                payload.classes.len()
            )));
        }
        if payload.intercepts.len() != rows {
            return Err(PpmError::Artifact(format!(
                "{rows} coefficient rows but {} intercepts",
                payload.intercepts.len()
            )));
        }
        let width = payload.coefficients[0].len();
        if payload.coefficients.iter().any(|row| row.len() != width) {
            return Err(PpmError::Artifact(
                "coefficient rows have different widths".into(),
            ));
        }
        Ok(Self { payload })
    }

    /// Class labels in score order.
    pub fn classes(&self) -> &[String] {
        &self.payload.classes
    }

    /// Expected feature width.
    pub fn width(&self) -> usize {
        self.payload.coefficients[0].len()
    }

    /// Encode as a versioned bitcode payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_artifact(&bitcode::encode(&self.payload))
    }

    /// Decode a payload produced by [`LinearClassifier::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PpmError> {
        let raw = decode_artifact(bytes, "classifier")?;
        let payload = bitcode::decode(raw)
            .map_err(|err| PpmError::Artifact(format!("corrupt classifier payload: {err}")))?;
        Self::from_payload(payload)
    }

    /// Read from disk.
    pub fn load(path: &Path) -> Result<Self, PpmError> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Write atomically.
    pub fn save(&self, path: &Path) -> Result<(), PpmError> {
        save_artifact(path, &self.to_bytes())
    }

    fn score(&self, row: usize, features: &[f32]) -> f32 {
        self.payload.coefficients[row]
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.payload.intercepts[row]
    }
}

impl LabelPredictor for LinearClassifier {
    fn predict(&self, features: &[f32]) -> Option<String> {
        if features.len() != self.width() {
            return None;
        }
        let classes = &self.payload.classes;
        if self.payload.coefficients.len() == 1 && classes.len() == 2 {
            let idx = usize::from(self.score(0, features) > 0.0);
            return Some(classes[idx].clone());
        }
        let mut best: Option<(usize, f32)> = None;
        for row in 0..self.payload.coefficients.len() {
            let score = self.score(row, features);
            match best {
                Some((_, top)) if top >= score => {}
                _ => best = Some((row, score)),
            }
        }
        best.map(|(row, _)| classes[row].clone())
    }
}

fn encode_artifact(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.push(ARTIFACT_VERSION);
    out.extend_from_slice(bytes);
    out
}

fn decode_artifact<'a>(bytes: &'a [u8], kind: &str) -> Result<&'a [u8], PpmError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(PpmError::Artifact(format!(
            "{kind} payload missing expected prefix"
        )));
    }
    if bytes.get(1).copied() != Some(ARTIFACT_VERSION) {
        return Err(PpmError::Artifact(format!("{kind} payload version mismatch")));
    }
    Ok(&bytes[2..])
}

fn save_artifact(path: &Path, bytes: &[u8]) -> Result<(), PpmError> {
    write_atomic(path, |file| {
        std::io::Write::write_all(file, bytes)?;
        Ok(())
    })
}
