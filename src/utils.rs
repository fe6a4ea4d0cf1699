//! Text helpers shared by the resolver, catalog audits, and the overlay join.

use std::collections::HashSet;

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Whitespace-collapsed, uppercased comparison form used for overlay keys.
pub fn comparison_form<T: AsRef<str>>(text: T) -> String {
    normalize_inline_whitespace(text).to_uppercase()
}

/// Distinct whitespace-delimited tokens.
pub fn token_set(text: &str) -> HashSet<&str> {
    text.split_whitespace().collect()
}

/// Size of the intersection of the two strings' whitespace token sets.
pub fn token_overlap(left: &str, right: &str) -> usize {
    let left = token_set(left);
    token_set(right)
        .iter()
        .filter(|token| left.contains(*token))
        .count()
}

/// Longest whitespace token; the first one wins among equal lengths.
pub fn longest_token(text: &str) -> Option<&str> {
    let mut best: Option<&str> = None;
    for token in text.split_whitespace() {
        match best {
            Some(current) if current.chars().count() >= token.chars().count() => {}
            _ => best = Some(token),
        }
    }
    best
}

/// Return `None` for blank strings, otherwise the trimmed text.
pub fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_inline_whitespace_collapses_runs() {
        let input = "Alpha\n\n  Beta\tGamma";
        assert_eq!(normalize_inline_whitespace(input), "Alpha Beta Gamma");
        assert_eq!(comparison_form("  não\tliga "), "NÃO LIGA");
    }

    #[test]
    fn token_overlap_counts_distinct_shared_tokens() {
        assert_eq!(token_overlap("TORRE DE SOM", "TORRE DE SOM TM-2200"), 3);
        assert_eq!(token_overlap("A A B", "A C"), 1);
        assert_eq!(token_overlap("", "A"), 0);
    }

    #[test]
    fn longest_token_prefers_first_on_ties() {
        assert_eq!(longest_token("AB CD EFG HIJ"), Some("EFG"));
        assert_eq!(longest_token("   "), None);
        assert_eq!(longest_token("X"), Some("X"));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank("  a "), Some("a"));
        assert_eq!(non_blank(" \t"), None);
    }
}
