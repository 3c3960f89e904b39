//! Localized text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Text keyed by language code, or a single language-neutral string.
///
/// # Example
///
/// ```
/// use bitbeat_core::LocalizedText;
///
/// let text = LocalizedText::default()
///     .with("en", "Returns the server status")
///     .with("de", "Liefert den Serverstatus");
///
/// assert_eq!(text.resolve("de", "en"), Some("Liefert den Serverstatus"));
/// assert_eq!(text.resolve("fr", "en"), Some("Returns the server status"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    /// The same text for every language.
    Plain(String),
    /// Language code to text.
    Translations(IndexMap<String, String>),
}

impl LocalizedText {
    /// Adds or replaces the text for a language.
    ///
    /// A plain text is kept as a translation for `"en"`.
    #[must_use]
    pub fn with(self, language: impl Into<String>, text: impl Into<String>) -> Self {
        let mut translations = match self {
            Self::Plain(plain) if plain.is_empty() => IndexMap::new(),
            Self::Plain(plain) => IndexMap::from([("en".to_string(), plain)]),
            Self::Translations(map) => map,
        };
        translations.insert(language.into(), text.into());
        Self::Translations(translations)
    }

    /// Resolves the text for `language`, falling back to `fallback`.
    #[must_use]
    pub fn resolve(&self, language: &str, fallback: &str) -> Option<&str> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Translations(map) => map
                .get(language)
                .or_else(|| map.get(fallback))
                .map(String::as_str),
        }
    }
}

impl Default for LocalizedText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl From<&str> for LocalizedText {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

impl From<String> for LocalizedText {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for LocalizedText {
    fn from(pairs: [(K, V); N]) -> Self {
        Self::Translations(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
