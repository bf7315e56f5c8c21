use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Decompose and drop combining marks: "Équipe" → "Equipe".
pub fn fold_accents(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Comparison key for a hand-typed pseudonym.
///
/// Sheet exports often leak neighbouring cells into the name
/// (`Killycurly,,Silver,3`); only the first token carrying letters is kept.
pub fn alias_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let text = if trimmed.contains(',') {
        trimmed
            .split(',')
            .map(str::trim)
            .find(|t| t.chars().any(char::is_alphabetic))
            .unwrap_or("")
    } else {
        trimmed
    };

    let folded = fold_accents(text).to_lowercase();
    let kept: String = folded
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' => Some(c),
            c if c.is_whitespace() => Some(' '),
            _ => None,
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `alias_key` with the spaces removed, for "Faker Jr" vs "FakerJr".
pub fn compact_key(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Spreadsheet header slug: accents folded, lowercase, separators removed.
pub fn header_slug(raw: &str) -> String {
    fold_accents(raw)
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\r' | '-' | '_'))
        .collect()
}

/// Label slug for free-form sheet labels ("Matchs joués" → "matchsjoues").
pub fn label_slug(raw: &str) -> String {
    fold_accents(raw)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_key_strips_noise() {
        assert_eq!(alias_key("  Élodie  du   Nord "), "elodie du nord");
        assert_eq!(alias_key("Killycurly,,,"), "killycurly");
        assert_eq!(alias_key("Killycurly,,Silver,3"), "killycurly");
        assert_eq!(alias_key(",,3,Zoogie"), "zoogie");
        assert_eq!(alias_key("xX_Sn!per_Xx"), "xxsnperxx");
        assert_eq!(alias_key(""), "");
    }

    #[test]
    fn compact_key_drops_spaces() {
        assert_eq!(compact_key(&alias_key("Faker Jr")), "fakerjr");
    }

    #[test]
    fn header_slug_matches_synonym_table_form() {
        assert_eq!(header_slug("Équipe"), "equipe");
        assert_eq!(header_slug("Riot Tag"), "riottag");
        assert_eq!(header_slug("Nom_de-Equipe"), "nomdeequipe");
        assert_eq!(header_slug("Kills/G"), "kills/g");
    }

    #[test]
    fn label_slug_keeps_alphanumerics_only() {
        assert_eq!(label_slug("Matchs joués :"), "matchsjoues");
        assert_eq!(label_slug("Kills/G"), "killsg");
    }
}
