//! Ordered token-sequence rewrites applied to canonical keys before lexicon lookup.

use crate::canonical::Canonicalizer;
use crate::constants::synonyms::DEFAULT_RULES;
use crate::types::CanonicalKey;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Rule {
    pattern: Vec<String>,
    replacement: Vec<String>,
}

/// Technical synonym table keyed in the same mode as the canonicalizer it was built with.
#[derive(Clone, Debug)]
pub struct SynonymRules {
    canonicalizer: Canonicalizer,
    rules: Vec<Rule>,
}

impl SynonymRules {
    /// Build rules from `(phrase, replacement)` pairs; both sides are canonicalized.
    ///
    /// Pairs whose phrase canonicalizes to nothing are dropped.
    pub fn new<'a, I>(canonicalizer: Canonicalizer, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules = pairs
            .into_iter()
            .filter_map(|(phrase, replacement)| {
                let pattern = owned_tokens(&canonicalizer, &canonicalizer.canonicalize(phrase));
                if pattern.is_empty() {
                    return None;
                }
                let replacement =
                    owned_tokens(&canonicalizer, &canonicalizer.canonicalize(replacement));
                Some(Rule {
                    pattern,
                    replacement,
                })
            })
            .collect();
        Self {
            canonicalizer,
            rules,
        }
    }

    /// Built-in rule table.
    pub fn defaults(canonicalizer: Canonicalizer) -> Self {
        Self::new(canonicalizer, DEFAULT_RULES.iter().copied())
    }

    /// Number of active rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rule is active.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite a canonical key. Rules run in declared order over non-overlapping spans.
    pub fn apply(&self, key: &str) -> CanonicalKey {
        let mut tokens = owned_tokens(&self.canonicalizer, key);
        for rule in &self.rules {
            tokens = rewrite(&tokens, rule);
        }
        self.canonicalizer.join(tokens.iter().map(String::as_str))
    }
}

fn owned_tokens(canonicalizer: &Canonicalizer, key: &str) -> Vec<String> {
    canonicalizer
        .tokens(key)
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn rewrite(tokens: &[String], rule: &Rule) -> Vec<String> {
    let width = rule.pattern.len();
    let mut out = Vec::with_capacity(tokens.len());
    let mut idx = 0;
    while idx < tokens.len() {
        if idx + width <= tokens.len() && tokens[idx..idx + width] == rule.pattern[..] {
            out.extend(rule.replacement.iter().cloned());
            idx += width;
        } else {
            out.push(tokens[idx].clone());
            idx += 1;
        }
    }
    out
}
