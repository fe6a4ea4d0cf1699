use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::types::ColumnName;

/// Canonical identifier for a table column plus the header spellings accepted for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnKey {
    name: &'static str,
    aliases: &'static [&'static str],
}

impl ColumnKey {
    /// Create a column key with a canonical static name and accepted aliases.
    pub const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    /// Return the canonical column name.
    pub const fn as_str(&self) -> &'static str {
        self.name
    }

    /// Return the alternate header spellings.
    pub const fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    /// True when a normalized header names this column.
    pub fn matches(&self, normalized_header: &str) -> bool {
        normalized_header == self.name || self.aliases.contains(&normalized_header)
    }

    /// Candidate names in lookup order: canonical name first, then aliases.
    pub fn candidates(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// Normalize a raw header: fold accents, uppercase, punctuation to spaces, whitespace runs to `_`.
///
/// `"Desc. Falha"` becomes `DESC_FALHA`;
/// `"Descrição do Material"` becomes `DESCRICAO_DO_MATERIAL`.
pub fn normalize_header(raw: &str) -> ColumnName {
    let folded: String = raw
        .trim()
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect::<String>()
        .to_uppercase();
    let spaced: String = folded
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' {
                ch
            } else {
                ' '
            }
        })
        .collect();
    spaced
        .split(|ch: char| ch.is_whitespace() || ch == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::columns::{DATE, DESCRIPTION, QUANTITY};

    #[test]
    fn column_key_matches_name_and_aliases() {
        assert!(DATE.matches("DATE"));
        assert!(DATE.matches("DATA"));
        assert!(!DATE.matches("DIA"));
        assert_eq!(DATE.as_str(), "DATE");
        assert_eq!(
            QUANTITY.candidates().collect::<Vec<_>>(),
            vec!["QUANTITY", "QTY_GERAL", "QUANTIDADE_PRODUZIDA", "QTD_PRODUZIDA"]
        );
    }

    #[test]
    fn normalize_header_folds_accents_and_punctuation() {
        assert_eq!(normalize_header("Desc. Falha"), "DESC_FALHA");
        assert_eq!(normalize_header("  Descrição do Material "), "DESCRICAO_DO_MATERIAL");
        assert_eq!(normalize_header("QTD."), "QTD");
        assert_eq!(normalize_header("Qty_Geral"), "QTY_GERAL");
        assert_eq!(normalize_header("MODELOS  PRODUÇÃO"), "MODELOS_PRODUCAO");
        assert!(DESCRIPTION.matches(&normalize_header("desc falha")));
    }

    #[test]
    fn custom_column_keys_work_in_const_context() {
        const CUSTOM: ColumnKey = ColumnKey::new("CUSTOM", &["ALT"]);
        assert_eq!(CUSTOM.as_str(), "CUSTOM");
        assert_eq!(CUSTOM.aliases(), &["ALT"]);
        assert!(CUSTOM.matches("ALT"));
    }
}
