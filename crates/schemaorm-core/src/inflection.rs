//! Pluralization used for cardinality inference and synthesized adapter names.
//!
//! A non-primitive field whose name is plural (`orders`, `people`) is treated as a
//! one-to-many collection unless the definition says otherwise.

use inflector::Inflector;

/// Irregular plurals that the inflector rules get wrong for schema names.
static IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("mouse", "mice"),
    ("leaf", "leaves"),
    ("life", "lives"),
    ("knife", "knives"),
    ("wife", "wives"),
    ("half", "halves"),
    ("hero", "heroes"),
    ("analysis", "analyses"),
    ("basis", "bases"),
    ("crisis", "crises"),
    ("criterion", "criteria"),
    ("medium", "media"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
];

/// Pluralize a word, handling irregulars first.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular || lower == *plural {
            return (*plural).to_string();
        }
    }
    word.to_plural()
}

/// Singularize a word, handling irregulars first.
pub fn singularize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *plural || lower == *singular {
            return (*singular).to_string();
        }
    }
    word.to_singular()
}

/// True when `word` reads as a plural noun.
pub fn is_plural(word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let lower = word.to_lowercase();
    if IRREGULAR_PLURALS.iter().any(|(_, plural)| lower == *plural) {
        return true;
    }
    if IRREGULAR_PLURALS.iter().any(|(singular, _)| lower == *singular) {
        return false;
    }
    let singular = word.to_singular();
    singular != word && singular.to_plural() == word
}

/// Uppercase the first character (`skills` -> `Skills`).
pub fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_detection() {
        assert!(is_plural("orders"));
        assert!(is_plural("skills"));
        assert!(is_plural("people"));
        assert!(!is_plural("customer"));
        assert!(!is_plural("person"));
        assert!(!is_plural(""));
    }

    #[test]
    fn irregulars() {
        assert_eq!(pluralize("person"), "people");
        assert_eq!(singularize("children"), "child");
        assert_eq!(pluralize("category"), "categories");
    }

    #[test]
    fn upper_first_char() {
        assert_eq!(upper_first("skills"), "Skills");
        assert_eq!(upper_first(""), "");
    }
}
