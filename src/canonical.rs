//! Deterministic text canonicalization shared by the classifier, catalog, and PPM join keys.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::constants::canonical::STOPWORDS;
use crate::errors::PpmError;
use crate::types::CanonicalKey;

/// How tokens are joined once text has been folded and split.
///
/// There is no default: the lexicon and the lookup store must be keyed with the same
/// mode they are queried with, so callers always choose one explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonicalMode {
    /// Keep every token and join them with `delimiter` (`"sem ligação"` -> `SEM_LIGACAO`).
    Delimited {
        /// Join character; must be neither alphanumeric nor whitespace.
        delimiter: char,
    },
    /// Drop stopwords and join the remaining tokens with a single space.
    StopwordStripped,
}

impl CanonicalMode {
    /// Separator placed between tokens of a canonical key.
    pub fn separator(&self) -> char {
        match self {
            CanonicalMode::Delimited { delimiter } => *delimiter,
            CanonicalMode::StopwordStripped => ' ',
        }
    }
}

/// Pure text-to-key function parameterized by a [`CanonicalMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canonicalizer {
    mode: CanonicalMode,
}

impl Canonicalizer {
    /// Build a canonicalizer; rejects delimiters that would survive tokenization.
    pub fn new(mode: CanonicalMode) -> Result<Self, PpmError> {
        if let CanonicalMode::Delimited { delimiter } = mode
            && (delimiter.is_alphanumeric() || delimiter.is_whitespace())
        {
            return Err(PpmError::Configuration(format!(
                "canonical delimiter {delimiter:?} must be punctuation"
            )));
        }
        Ok(Self { mode })
    }

    /// Active mode.
    pub fn mode(&self) -> CanonicalMode {
        self.mode
    }

    /// Canonicalize optional text; `None` yields an empty key.
    pub fn canonicalize_opt(&self, text: Option<&str>) -> CanonicalKey {
        text.map(|value| self.canonicalize(value)).unwrap_or_default()
    }

    /// Canonicalize free text.
    ///
    /// The result is idempotent: feeding a key back in returns the same key.
    pub fn canonicalize(&self, text: &str) -> CanonicalKey {
        let tokens = fold_tokens(text);
        match self.mode {
            CanonicalMode::Delimited { delimiter } => {
                join_tokens(tokens.iter().map(String::as_str), delimiter)
            }
            CanonicalMode::StopwordStripped => join_tokens(
                tokens
                    .iter()
                    .map(String::as_str)
                    .filter(|token| !STOPWORDS.contains(token)),
                ' ',
            ),
        }
    }

    /// Split a canonical key back into its tokens.
    pub fn tokens<'a>(&self, key: &'a str) -> Vec<&'a str> {
        key.split(self.mode.separator())
            .filter(|token| !token.is_empty())
            .collect()
    }

    /// Join tokens with the mode separator.
    pub fn join<'a, I>(&self, tokens: I) -> CanonicalKey
    where
        I: IntoIterator<Item = &'a str>,
    {
        join_tokens(tokens, self.mode.separator())
    }
}

/// Strip combining marks after compatibility decomposition.
pub(crate) fn fold_accents(text: &str) -> String {
    text.nfkd().filter(|ch| !is_combining_mark(*ch)).collect()
}

fn fold_tokens(text: &str) -> Vec<String> {
    // Folding again after uppercasing catches letters whose uppercase form decomposes.
    let upper = fold_accents(text.trim()).to_uppercase();
    let folded = fold_accents(&upper);
    let spaced: String = folded
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect();
    spaced.split_whitespace().map(str::to_string).collect()
}

fn join_tokens<'a, I>(tokens: I, separator: char) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for token in tokens {
        if !out.is_empty() {
            out.push(separator);
        }
        out.push_str(token);
    }
    out
}
