//! Exact-match lexicon: canonical description key to failure code.

use std::io::{BufReader, Write};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::canonical::Canonicalizer;
use crate::errors::PpmError;
use crate::transport::write_atomic;
use crate::types::{CanonicalKey, FailureCode};

/// Ordered, read-only mapping used as ground truth by the classifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lexicon {
    entries: IndexMap<CanonicalKey, FailureCode>,
}

impl Lexicon {
    /// Build from already-canonical entries; blank keys are skipped, later duplicates win.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut lexicon = Self::default();
        for (key, code) in entries {
            lexicon.insert(key.as_ref(), code.as_ref());
        }
        lexicon
    }

    /// Load a JSON object file. A missing file degrades to an empty lexicon.
    pub fn load(path: &Path) -> Result<Self, PpmError> {
        if !path.exists() {
            warn!(
                "[defect_ppm:lexicon] {} not found; classifier runs without a lexicon",
                path.display()
            );
            return Ok(Self::default());
        }
        let file = std::fs::File::open(path)?;
        let raw: IndexMap<String, String> = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| {
                PpmError::Artifact(format!("lexicon {} is not valid JSON: {err}", path.display()))
            })?;
        let lexicon = Self::from_entries(raw);
        info!(
            "[defect_ppm:lexicon] loaded {} entries from {}",
            lexicon.len(),
            path.display()
        );
        Ok(lexicon)
    }

    /// Persist as pretty JSON through a temp file + rename.
    pub fn save(&self, path: &Path) -> Result<(), PpmError> {
        let body = serde_json::to_vec_pretty(&self.entries)
            .map_err(|err| PpmError::Artifact(format!("failed to encode lexicon: {err}")))?;
        write_atomic(path, |file| {
            file.write_all(&body)?;
            Ok(())
        })
    }

    /// Seed from `(description, code)` pairs. Codes are uppercased; last occurrence wins.
    pub fn seed_from_pairs<'a, I>(canonicalizer: &Canonicalizer, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut lexicon = Self::default();
        for (description, code) in pairs {
            let key = canonicalizer.canonicalize(description);
            let code = code.trim().to_uppercase();
            if code.is_empty() {
                continue;
            }
            lexicon.insert(&key, &code);
        }
        lexicon
    }

    /// Insert or replace one entry. Returns false when the key is blank.
    pub fn insert(&mut self, key: &str, code: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        // Replacing keeps the original position; remove first so the newest lands last.
        self.entries.shift_remove(key);
        self.entries.insert(key.to_string(), code.trim().to_string());
        true
    }

    /// Code mapped to an exact canonical key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, code)| (key.as_str(), code.as_str()))
    }
}
