//! Layered model identity resolution for noisy product-name strings.
//!
//! Rules run in a fixed order and the first hit wins:
//! structural code pattern, manual phrase map, keyword group, nearest known
//! production model by token overlap, then the longest input token.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::canonical::fold_accents;
use crate::constants::resolver::{
    DEFAULT_KEYWORD_GROUPS, DEFAULT_PHRASE_MAP, DEFAULT_STRUCTURAL_PATTERNS, MODEL_PUNCTUATION,
};
use crate::errors::PpmError;
use crate::types::ModelName;
use crate::utils::{longest_token, normalize_inline_whitespace, token_overlap, token_set};

/// Rule that produced a resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionRule {
    /// A structural code pattern matched.
    StructuralPattern,
    /// A known phrase mapped to a model.
    PhraseMap,
    /// A keyword group mapped to a model.
    KeywordGroup,
    /// Highest token overlap with a production model.
    NearestProductionModel,
    /// Longest remaining token as a last resort.
    LongestToken,
}

/// Resolved model plus the rule that matched, for audit trails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Resolved model.
    pub model: ModelName,
    /// Rule that produced it.
    pub rule: ResolutionRule,
}

#[derive(Clone, Debug)]
struct KeywordGroup {
    keyword: String,
    candidates: Vec<ModelName>,
}

/// Deterministic resolver; holds only immutable rule tables.
#[derive(Clone, Debug)]
pub struct ModelResolver {
    patterns: Vec<Regex>,
    phrases: Vec<(String, ModelName)>,
    keywords: Vec<KeywordGroup>,
}

impl ModelResolver {
    /// Build from rule tables. Phrase keys and keywords are normalized like inputs.
    pub fn new(
        patterns: &[&str],
        phrases: &[(&str, &str)],
        keywords: &[(&str, &[&str])],
    ) -> Result<Self, PpmError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    PpmError::Configuration(format!("invalid model pattern {pattern:?}: {err}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let phrases = phrases
            .iter()
            .map(|(phrase, model)| (normalize_model_text(phrase), model.to_string()))
            .filter(|(phrase, _)| !phrase.is_empty())
            .collect();
        let keywords = keywords
            .iter()
            .map(|(keyword, candidates)| KeywordGroup {
                keyword: normalize_model_text(keyword),
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            })
            .filter(|group| !group.keyword.is_empty() && !group.candidates.is_empty())
            .collect();
        Ok(Self {
            patterns,
            phrases,
            keywords,
        })
    }

    /// Resolver loaded with the built-in rule tables.
    pub fn with_defaults() -> Result<Self, PpmError> {
        Self::new(
            DEFAULT_STRUCTURAL_PATTERNS,
            DEFAULT_PHRASE_MAP,
            DEFAULT_KEYWORD_GROUPS,
        )
    }

    /// Canonical model identifier for `raw_model_text`, or `None` when it has no tokens.
    pub fn resolve<S: AsRef<str>>(
        &self,
        raw_model_text: &str,
        known_production_models: &[S],
    ) -> Option<ModelName> {
        self.resolve_detailed(raw_model_text, known_production_models)
            .map(|resolution| resolution.model)
    }

    /// Like [`ModelResolver::resolve`] but also reports which rule matched.
    pub fn resolve_detailed<S: AsRef<str>>(
        &self,
        raw_model_text: &str,
        known_production_models: &[S],
    ) -> Option<Resolution> {
        let input = normalize_model_text(raw_model_text);
        if input.is_empty() {
            return None;
        }
        if let Some(code) = self.structural_match(&input) {
            return Some(found(code, ResolutionRule::StructuralPattern));
        }
        if let Some((_, model)) = self
            .phrases
            .iter()
            .find(|(phrase, _)| input.contains(phrase.as_str()))
        {
            return Some(found(model.clone(), ResolutionRule::PhraseMap));
        }
        if let Some(model) = self.keyword_match(&input) {
            return Some(found(model, ResolutionRule::KeywordGroup));
        }
        if let Some(model) = self.nearest_model(&input, known_production_models) {
            return Some(found(model, ResolutionRule::NearestProductionModel));
        }
        longest_token(&input).map(|token| found(token.to_string(), ResolutionRule::LongestToken))
    }

    fn structural_match(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.find(text))
            .map(|hit| hit.as_str().to_string())
    }

    fn keyword_match(&self, input: &str) -> Option<ModelName> {
        let tokens = token_set(input);
        let group = self
            .keywords
            .iter()
            .find(|group| tokens.contains(group.keyword.as_str()))?;
        if let [only] = group.candidates.as_slice() {
            return Some(only.clone());
        }
        best_by_overlap(input, &group.candidates, 0).map(|(idx, _)| group.candidates[idx].clone())
    }

    fn nearest_model<S: AsRef<str>>(&self, input: &str, known: &[S]) -> Option<ModelName> {
        let (idx, normalized) = best_by_overlap(input, known, 1)?;
        match self.structural_match(&normalized) {
            Some(code) => Some(code),
            None => Some(known[idx].as_ref().trim().to_string()),
        }
    }
}

fn found(model: ModelName, rule: ResolutionRule) -> Resolution {
    Resolution { model, rule }
}

/// Index and normalized text of the candidate with the highest token overlap of at
/// least `min_score`. Ties keep the earliest candidate.
fn best_by_overlap<S: AsRef<str>>(
    input: &str,
    candidates: &[S],
    min_score: usize,
) -> Option<(usize, String)> {
    let mut best: Option<(usize, String, usize)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let normalized = normalize_model_text(candidate.as_ref());
        let score = token_overlap(input, &normalized);
        if score < min_score {
            continue;
        }
        match &best {
            Some((_, _, top)) if *top >= score => {}
            _ => best = Some((idx, normalized, score)),
        }
    }
    best.map(|(idx, normalized, _)| (idx, normalized))
}

/// Fold accents, uppercase, keep alphanumerics and model punctuation (`- / . %`),
/// turn everything else into spaces, and collapse whitespace.
pub fn normalize_model_text(raw: &str) -> String {
    let upper = fold_accents(raw).to_uppercase();
    let kept: String = upper
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch.is_whitespace() || MODEL_PUNCTUATION.contains(&ch) {
                ch
            } else {
                ' '
            }
        })
        .collect();
    normalize_inline_whitespace(kept)
}
