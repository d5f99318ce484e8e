//! Text normalization for training and query input.
//!
//! Turns raw text into stemmed tokens:
//! 1. Lower-case
//! 2. Split on whitespace
//! 3. Drop tokens shorter than the configured minimum length
//! 4. Drop stopwords
//! 5. (batches of two or more documents) drop tokens seen exactly once
//! 6. Stem every remaining token

use std::collections::{HashMap, HashSet};

use rust_stemmers::Algorithm;

use crate::config::EngineConfig;
use crate::engine::stopwords;

/// Languages with a Snowball stemmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Arabic,
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
}

impl Language {
    /// Default language used when a configured language name has no stemmer.
    pub const FALLBACK: Language = Language::English;

    /// Look up a language by its lower-case English name (e.g. `"finnish"`).
    pub fn from_name(name: &str) -> Option<Language> {
        let language = match name.trim().to_lowercase().as_str() {
            "arabic" => Language::Arabic,
            "danish" => Language::Danish,
            "dutch" => Language::Dutch,
            "english" => Language::English,
            "finnish" => Language::Finnish,
            "french" => Language::French,
            "german" => Language::German,
            "hungarian" => Language::Hungarian,
            "italian" => Language::Italian,
            "norwegian" => Language::Norwegian,
            "portuguese" => Language::Portuguese,
            "romanian" => Language::Romanian,
            "russian" => Language::Russian,
            "spanish" => Language::Spanish,
            "swedish" => Language::Swedish,
            _ => return None,
        };
        Some(language)
    }

    fn algorithm(self) -> Algorithm {
        match self {
            Language::Arabic => Algorithm::Arabic,
            Language::Danish => Algorithm::Danish,
            Language::Dutch => Algorithm::Dutch,
            Language::English => Algorithm::English,
            Language::Finnish => Algorithm::Finnish,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Hungarian => Algorithm::Hungarian,
            Language::Italian => Algorithm::Italian,
            Language::Norwegian => Algorithm::Norwegian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Romanian => Algorithm::Romanian,
            Language::Russian => Algorithm::Russian,
            Language::Spanish => Algorithm::Spanish,
            Language::Swedish => Algorithm::Swedish,
        }
    }

    fn builtin_stopwords(self) -> &'static [&'static str] {
        match self {
            Language::Arabic => stopwords::ARABIC,
            Language::Danish => stopwords::DANISH,
            Language::Dutch => stopwords::DUTCH,
            Language::English => stopwords::ENGLISH,
            Language::Finnish => stopwords::FINNISH,
            Language::French => stopwords::FRENCH,
            Language::German => stopwords::GERMAN,
            Language::Hungarian => stopwords::HUNGARIAN,
            Language::Italian => stopwords::ITALIAN,
            Language::Norwegian => stopwords::NORWEGIAN,
            Language::Portuguese => stopwords::PORTUGUESE,
            Language::Romanian => stopwords::ROMANIAN,
            Language::Russian => stopwords::RUSSIAN,
            Language::Spanish => stopwords::SPANISH,
            Language::Swedish => stopwords::SWEDISH,
        }
    }
}

/// Reduces a token to its stem or lemma.
pub trait Stemmer: Send + Sync {
    fn stem(&self, token: &str) -> String;
}

/// Snowball stemmer for one language.
pub struct SnowballStemmer {
    inner: rust_stemmers::Stemmer,
}

impl SnowballStemmer {
    pub fn new(language: Language) -> Self {
        Self {
            inner: rust_stemmers::Stemmer::create(language.algorithm()),
        }
    }
}

impl Stemmer for SnowballStemmer {
    fn stem(&self, token: &str) -> String {
        self.inner.stem(token).into_owned()
    }
}

/// Per-language tokenizer, filter and stemmer.
pub struct Normalizer {
    stopwords: HashSet<String>,
    stemmer: Box<dyn Stemmer>,
    min_token_len: usize,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("stopwords", &self.stopwords.len())
            .field("min_token_len", &self.min_token_len)
            .finish()
    }
}

impl Normalizer {
    pub fn new(stopwords: HashSet<String>, stemmer: Box<dyn Stemmer>, min_token_len: usize) -> Self {
        Self {
            stopwords: stopwords.into_iter().map(|w| w.to_lowercase()).collect(),
            stemmer,
            min_token_len,
        }
    }

    /// Build the normalizer for `language` with the built-in stopwords plus
    /// the deployment's per-language and custom lists.
    pub fn for_language(language: Language, iso_code: &str, config: &EngineConfig) -> Self {
        let mut stopwords: HashSet<String> = language
            .builtin_stopwords()
            .iter()
            .map(|w| w.to_string())
            .collect();

        if let Some(extra) = config.stopwords.get(iso_code) {
            stopwords.extend(extra.iter().cloned());
        }
        stopwords.extend(config.custom_stopwords.iter().cloned());

        Self::new(
            stopwords,
            Box::new(SnowballStemmer::new(language)),
            config.min_token_len,
        )
    }

    /// Lower-case, split, and drop short tokens and stopwords. No stemming.
    pub fn filter(&self, document: &str) -> Vec<String> {
        document
            .to_lowercase()
            .split_whitespace()
            .filter(|token| token.chars().count() >= self.min_token_len)
            .filter(|token| !self.stopwords.contains(*token))
            .map(|token| token.to_string())
            .collect()
    }

    /// Normalize a single document (query path).
    pub fn normalize(&self, document: &str) -> Vec<String> {
        self.stem_all(self.filter(document))
    }

    /// Normalize a batch of documents (training path).
    ///
    /// Every input document yields exactly one token list, in input order.
    /// With two or more documents, tokens occurring once across the whole
    /// batch are removed before stemming.
    pub fn normalize_batch<S: AsRef<str>>(&self, documents: &[S]) -> Vec<Vec<String>> {
        let mut texts: Vec<Vec<String>> = documents
            .iter()
            .map(|document| self.filter(document.as_ref()))
            .collect();

        if texts.len() > 1 {
            let mut frequency: HashMap<&str, usize> = HashMap::new();
            for text in &texts {
                for token in text {
                    *frequency.entry(token.as_str()).or_default() += 1;
                }
            }

            let hapaxes: HashSet<String> = frequency
                .into_iter()
                .filter(|(_, count)| *count == 1)
                .map(|(token, _)| token.to_string())
                .collect();

            for text in texts.iter_mut() {
                text.retain(|token| !hapaxes.contains(token));
            }
        }

        texts.into_iter().map(|text| self.stem_all(text)).collect()
    }

    fn stem_all(&self, tokens: Vec<String>) -> Vec<String> {
        tokens
            .into_iter()
            .map(|token| self.stemmer.stem(&token))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IdentityStemmer;

    impl Stemmer for IdentityStemmer {
        fn stem(&self, token: &str) -> String {
            token.to_string()
        }
    }

    fn plain(stopwords: &[&str]) -> Normalizer {
        Normalizer::new(
            stopwords.iter().map(|s| s.to_string()).collect(),
            Box::new(IdentityStemmer),
            2,
        )
    }

    #[test]
    fn test_filter_stopwords_and_short_tokens() {
        let normalizer = plain(&["a", "the", "it"]);
        let tokens = normalizer.filter("a the it cat cat dog");
        assert_eq!(tokens, vec!["cat", "cat", "dog"]);
    }

    #[test]
    fn test_filter_lowercases_before_stopword_check() {
        let normalizer = plain(&["the"]);
        let tokens = normalizer.filter("The CAT sat");
        assert_eq!(tokens, vec!["cat", "sat"]);
    }

    #[test]
    fn test_filter_length_counts_characters() {
        let normalizer = plain(&[]);
        // "ä" is two bytes but one character
        let tokens = normalizer.filter("ä öö x yy");
        assert_eq!(tokens, vec!["öö", "yy"]);
    }

    #[test]
    fn test_single_document_keeps_hapaxes() {
        let normalizer = plain(&[]);
        let batch = normalizer.normalize_batch(&["unique words only"]);
        assert_eq!(batch, vec![vec!["unique", "words", "only"]]);
    }

    #[test]
    fn test_batch_removes_hapaxes() {
        let normalizer = plain(&[]);
        let batch = normalizer.normalize_batch(&["cat dog bird", "cat dog fish", "dog"]);
        assert_eq!(
            batch,
            vec![vec!["cat", "dog"], vec!["cat", "dog"], vec!["dog"]]
        );
    }

    #[test]
    fn test_batch_preserves_document_positions() {
        let normalizer = plain(&[]);
        let batch = normalizer.normalize_batch(&["cat cat", "", "x", "cat"]);
        assert_eq!(batch.len(), 4);
        assert!(batch[1].is_empty());
        assert!(batch[2].is_empty());
        assert_eq!(batch[3], vec!["cat"]);
    }

    #[test]
    fn test_snowball_stemming() {
        let normalizer = Normalizer::new(
            HashSet::new(),
            Box::new(SnowballStemmer::new(Language::English)),
            2,
        );
        assert_eq!(normalizer.normalize("cats running"), vec!["cat", "run"]);
    }

    #[test]
    fn test_language_from_name() {
        assert_eq!(Language::from_name("finnish"), Some(Language::Finnish));
        assert_eq!(Language::from_name(" English "), Some(Language::English));
        assert_eq!(Language::from_name("klingon"), None);
    }

    #[test]
    fn test_german_function_words_dropped() {
        let normalizer = Normalizer::for_language(Language::German, "de", &EngineConfig::default());
        let tokens = normalizer.filter("der hund und die katze ist nicht in dem haus");
        assert_eq!(tokens, vec!["hund", "katze", "haus"]);
    }

    #[test]
    fn test_finnish_function_words_dropped() {
        let normalizer = Normalizer::for_language(Language::Finnish, "fi", &EngineConfig::default());
        let tokens = normalizer.filter("kissa ja koira ovat se on talossa");
        assert_eq!(tokens, vec!["kissa", "koira", "talossa"]);
    }

    #[test]
    fn test_every_language_ships_stopwords() {
        let config = EngineConfig::default();
        for (code, name) in &config.languages {
            let language = Language::from_name(name).unwrap();
            assert!(!language.builtin_stopwords().is_empty(), "{code}");

            // stored lower-case, so lookups after lower-casing hit
            for word in language.builtin_stopwords() {
                assert_eq!(word.to_lowercase(), *word, "{code}: {word}");
            }
        }
    }

    #[test]
    fn test_for_language_merges_stopword_sources() {
        let mut config = EngineConfig::default();
        config
            .stopwords
            .insert("en".to_string(), vec!["foo".to_string()]);
        config.custom_stopwords = vec!["--retracted--".to_string()];

        let normalizer = Normalizer::for_language(Language::English, "en", &config);
        let tokens = normalizer.filter("the foo --retracted-- report");
        assert_eq!(tokens, vec!["report"]);
    }
}
