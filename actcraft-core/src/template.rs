//! Placeholder tokens and their substitution inside cell text

use anyhow::Result;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Token → replacement table for one act
#[derive(Debug, Clone, Default)]
pub struct Replacements {
    entries: Vec<(String, String)>,
    /// Alternation of every token, built on first use
    pattern: OnceLock<Option<Regex>>,
}

impl PartialEq for Replacements {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Replacements {}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a token; binding the same token again replaces the value
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(t, _)| *t == token) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.push((token, value));
                self.pattern = OnceLock::new();
            }
        }
    }

    /// Longest tokens first so a token never loses to one of its prefixes
    fn pattern(&self) -> Option<&Regex> {
        self.pattern
            .get_or_init(|| {
                if self.entries.is_empty() {
                    return None;
                }
                let mut tokens: Vec<&str> = self.tokens().collect();
                tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
                let alternation = tokens
                    .iter()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&alternation).ok()
            })
            .as_ref()
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that no token is empty or contained in another token
    pub fn validate(&self) -> Result<()> {
        validate_tokens(self.tokens())
    }

    /// Check whether any token occurs in `text`
    pub fn matches(&self, text: &str) -> bool {
        self.pattern().is_some_and(|re| re.is_match(text))
    }

    /// Substitute every token occurrence in `text`
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        substitute(text, self)
    }
}

impl<T: Into<String>, V: Into<String>> FromIterator<(T, V)> for Replacements {
    fn from_iter<I: IntoIterator<Item = (T, V)>>(iter: I) -> Self {
        let mut replacements = Replacements::new();
        for (token, value) in iter {
            replacements.insert(token, value);
        }
        replacements
    }
}

/// Check a token vocabulary: tokens must be non-empty and none may occur inside another
pub fn validate_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let tokens: Vec<&str> = tokens.into_iter().collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            anyhow::bail!("Empty placeholder token");
        }
        for (j, other) in tokens.iter().enumerate() {
            if i != j && other.contains(token) {
                anyhow::bail!(
                    "Placeholder '{}' occurs inside placeholder '{}'",
                    token,
                    other
                );
            }
        }
    }
    Ok(())
}

/// Replace every occurrence of every token in one left-to-right pass.
///
/// Replacement text is never rescanned, so a value that happens to contain a
/// token is inserted verbatim and the outcome does not depend on token order.
pub fn substitute<'a>(text: &'a str, replacements: &Replacements) -> Cow<'a, str> {
    match replacements.pattern() {
        Some(re) => re.replace_all(text, |caps: &Captures| {
            replacements.get(&caps[0]).unwrap_or_default().to_string()
        }),
        None => Cow::Borrowed(text),
    }
}

/// Tokens from `vocabulary` still present in `text`
pub fn remaining_tokens<'a>(text: &str, vocabulary: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    vocabulary
        .into_iter()
        .filter(|token| text.contains(token))
        .collect()
}

/// Bracket-delimited labels such as `[Шифр]` occurring in `text`
pub fn bracket_labels(text: &str) -> Vec<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[[^\[\]]+\]").unwrap());
    re.find_iter(text).map(|m| m.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Replacements {
        [
            ("[№ акта]", "12"),
            ("[Наименование работ]", "Заливка фундамента"),
            ("[Материалы1]", "Бетон"),
            ("[Материалы1_1]", ""),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_whole_cell_and_embedded_tokens() {
        let r = table();
        assert_eq!(r.apply("[№ акта]"), "12");
        assert_eq!(
            r.apply("Акт № [№ акта] на [Наименование работ]."),
            "Акт № 12 на Заливка фундамента."
        );
        assert_eq!(r.apply("[№ акта]/[№ акта]"), "12/12");
        assert_eq!(r.apply("[Материалы1][Материалы1_1]"), "Бетон");
    }

    #[test]
    fn test_untouched_text_is_borrowed() {
        let r = table();
        assert!(matches!(r.apply("Без меток"), Cow::Borrowed(_)));
        assert!(matches!(Replacements::new().apply("[№ акта]"), Cow::Borrowed(_)));
        assert!(r.matches("Акт [№ акта]"));
        assert!(!r.matches("Без меток"));
    }

    #[test]
    fn test_replacement_values_are_not_rescanned() {
        let r: Replacements = [("[A]", "[B]"), ("[B]", "x")].into_iter().collect();
        assert_eq!(r.apply("[A] [B]"), "[B] x");

        let reversed: Replacements = [("[B]", "x"), ("[A]", "[B]")].into_iter().collect();
        assert_eq!(reversed.apply("[A] [B]"), "[B] x");
    }

    #[test]
    fn test_longest_token_wins() {
        let r: Replacements = [("[Материалы1]", "a"), ("[Материалы1_1]", "b")]
            .into_iter()
            .collect();
        assert_eq!(r.apply("[Материалы1_1] [Материалы1]"), "b a");

        let mut r = r;
        r.insert("[Шифр]", "c");
        assert_eq!(r.apply("[Шифр]"), "c");
    }

    #[test]
    fn test_insert_overwrites() {
        let mut r = table();
        r.insert("[№ акта]", "13");
        assert_eq!(r.len(), 4);
        assert_eq!(r.get("[№ акта]"), Some("13"));
    }

    #[test]
    fn test_validate_tokens() {
        assert!(table().validate().is_ok());
        assert!(validate_tokens(["[Смесь]", "[Смесь] №"]).is_err());
        assert!(validate_tokens(["", "[A]"]).is_err());
    }

    #[test]
    fn test_remaining_tokens() {
        let text = table().apply("[№ акта] [Шифр]").into_owned();
        assert_eq!(remaining_tokens(&text, ["[№ акта]", "[Шифр]"]), vec!["[Шифр]"]);
    }

    #[test]
    fn test_bracket_labels() {
        assert_eq!(
            bracket_labels("Акт № [№ акта] от [Дата акта]"),
            vec!["[№ акта]", "[Дата акта]"]
        );
        assert_eq!(bracket_labels("[[Шифр]] []"), vec!["[Шифр]"]);
        assert!(bracket_labels("без меток [").is_empty());
    }
}
