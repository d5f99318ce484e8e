//! One independently trained (vocabulary, topic model, index) unit.
//!
//! State machine:
//! - `Uninitialized`: constructed, nothing trained or loaded yet
//! - `Ready`: a complete generation is published and queryable
//! - `Nok`: reload found missing or corrupt artifacts, or persisting a
//!   freshly trained generation failed
//!
//! Training builds a new generation off to the side and publishes it with a
//! single swap under the state lock, so concurrent queries see either the
//! previous generation or the new one.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::artifact::{self, ArtifactError, ArtifactKind, ByteReader, ByteWriter};
use crate::engine::errors::EngineError;
use crate::engine::index::{SearchResult, SimilarityIndex};
use crate::engine::normalize::{Language, Normalizer};
use crate::engine::topic_model::{TopicModel, TopicModelError};
use crate::engine::vocabulary::{DocumentVector, Vocabulary};
use crate::storage::StorageManager;

/// Identity of an analyzer: which text field of which dataset, in which language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnalyzerKey {
    pub language: String,
    pub field: String,
    pub dataset: String,
}

impl AnalyzerKey {
    pub fn new(
        language: impl Into<String>,
        field: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            field: field.into(),
            dataset: dataset.into(),
        }
    }

    /// Storage-safe name, also used as the artifact file stem.
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.language, self.field, self.dataset)
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect()
    }

    pub fn dictionary_artifact(&self) -> String {
        format!("{}.dictionary", self.name())
    }

    pub fn model_artifact(&self) -> String {
        format!("{}_lsi.model", self.name())
    }

    pub fn index_artifact(&self) -> String {
        format!("{}.index", self.name())
    }
}

impl fmt::Display for AnalyzerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerStatus {
    Uninitialized,
    Ready,
    Nok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOK")]
    Nok,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub name: String,
    pub state: HealthState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
}

/// A complete, immutable training result.
#[derive(Debug)]
struct Generation {
    id: u64,
    trained_at: DateTime<Utc>,
    vocabulary: Vocabulary,
    model: TopicModel,
    index: SimilarityIndex,
}

#[derive(Debug)]
struct AnalyzerState {
    status: AnalyzerStatus,
    generation: Option<Arc<Generation>>,
    errors: Vec<String>,
    updated_at: Option<DateTime<Utc>>,
}

pub struct Analyzer {
    key: AnalyzerKey,
    name: String,
    topic_count: usize,
    normalizer: Normalizer,
    storage: Arc<dyn StorageManager>,
    created_at: DateTime<Utc>,
    state: RwLock<AnalyzerState>,
    /// Serializes training runs. Never held by queries.
    train_lock: Mutex<()>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("name", &self.name)
            .field("topic_count", &self.topic_count)
            .field("status", &self.status())
            .finish()
    }
}

impl Analyzer {
    /// Construct an untrained analyzer. Fails if the key's language code is
    /// not configured.
    pub fn new(
        key: AnalyzerKey,
        config: &EngineConfig,
        storage: Arc<dyn StorageManager>,
    ) -> Result<Self, EngineError> {
        let language_name = config.language_name(&key.language).ok_or_else(|| {
            EngineError::MalformedInput(format!("language '{}' is not supported", key.language))
        })?;

        let language = match Language::from_name(language_name) {
            Some(language) => language,
            None => {
                log::warn!(
                    "no stemmer for language '{language_name}', falling back to {:?}",
                    Language::FALLBACK
                );
                Language::FALLBACK
            }
        };

        let normalizer = Normalizer::for_language(language, &key.language, config);
        let name = key.name();

        Ok(Self {
            key,
            name,
            topic_count: config.num_topics,
            normalizer,
            storage,
            created_at: Utc::now(),
            state: RwLock::new(AnalyzerState {
                status: AnalyzerStatus::Uninitialized,
                generation: None,
                errors: Vec::new(),
                updated_at: None,
            }),
            train_lock: Mutex::new(()),
        })
    }

    /// Construct and try to reload persisted artifacts.
    pub fn open(
        key: AnalyzerKey,
        config: &EngineConfig,
        storage: Arc<dyn StorageManager>,
    ) -> Result<Self, EngineError> {
        let analyzer = Self::new(key, config, storage)?;
        analyzer.reload()?;
        Ok(analyzer)
    }

    pub fn key(&self) -> &AnalyzerKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic_count(&self) -> usize {
        self.topic_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> AnalyzerStatus {
        self.state
            .read()
            .map(|state| state.status)
            .unwrap_or(AnalyzerStatus::Nok)
    }

    pub fn is_ready(&self) -> bool {
        self.status() == AnalyzerStatus::Ready
    }

    /// Number of documents in the published generation (0 when none).
    pub fn document_count(&self) -> usize {
        self.snapshot()
            .ok()
            .flatten()
            .map(|generation| generation.index.len())
            .unwrap_or(0)
    }

    /// Rebuild everything from `documents` and publish the result.
    ///
    /// Malformed input leaves the previous state untouched. A persistence
    /// failure marks the analyzer NOK and keeps the new generation unpublished.
    pub fn train<S: AsRef<str>>(&self, documents: &[S]) -> Result<(), EngineError> {
        let _guard = self
            .train_lock
            .lock()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))?;

        if documents.is_empty() {
            return Err(EngineError::MalformedInput(
                "training requires at least one document".to_string(),
            ));
        }

        log::info!("{}: training on {} documents", self.name, documents.len());

        let generation = Arc::new(self.build(documents)?);

        if let Err(err) = self.persist(&generation) {
            log::error!("{}: failed to persist artifacts: {err}", self.name);
            let mut state = self.write_state()?;
            state.status = AnalyzerStatus::Nok;
            state.errors.push(format!("persistence failed: {err}"));
            return Err(EngineError::Persistence {
                name: self.name.clone(),
                source: err,
            });
        }

        let mut state = self.write_state()?;
        state.status = AnalyzerStatus::Ready;
        state.updated_at = Some(generation.trained_at);
        state.errors.clear();
        state.generation = Some(generation);

        Ok(())
    }

    fn build<S: AsRef<str>>(&self, documents: &[S]) -> Result<Generation, EngineError> {
        let texts = self.normalizer.normalize_batch(documents);
        let vocabulary = Vocabulary::build(&texts);
        if vocabulary.is_empty() {
            return Err(EngineError::MalformedInput(
                "no tokens left after normalization".to_string(),
            ));
        }

        let corpus: Vec<DocumentVector> = texts.iter().map(|text| vocabulary.encode(text)).collect();

        let model = TopicModel::fit(&corpus, &vocabulary, self.topic_count).map_err(|e| match e {
            TopicModelError::EmptyCorpus
            | TopicModelError::EmptyVocabulary
            | TopicModelError::DegenerateCorpus => EngineError::MalformedInput(e.to_string()),
            other => EngineError::Internal(other.to_string()),
        })?;

        let index = SimilarityIndex::build(&model, &corpus)
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        log::info!(
            "{}: trained documents={} vocabulary={} dimensions={}",
            self.name,
            index.len(),
            vocabulary.len(),
            model.dimensions()
        );

        Ok(Generation {
            id: rand::random(),
            // persisted with millisecond precision
            trained_at: Utc::now().trunc_subsecs(3),
            vocabulary,
            model,
            index,
        })
    }

    /// Rank every training document against `text`.
    ///
    /// Returns an empty ranking unless the analyzer is ready.
    pub fn query(&self, text: &str) -> Vec<SearchResult> {
        match self.try_query(text) {
            Ok(results) => results,
            Err(EngineError::NotReady { .. }) => Vec::new(),
            Err(err) => {
                log::error!("{}: query failed: {err}", self.name);
                Vec::new()
            }
        }
    }

    /// Like [`Analyzer::query`], but reports why no ranking was produced.
    pub fn try_query(&self, text: &str) -> Result<Vec<SearchResult>, EngineError> {
        let generation = self.snapshot()?.ok_or_else(|| EngineError::NotReady {
            name: self.name.clone(),
        })?;

        let tokens = self.normalizer.normalize(text);
        let vector = generation.vocabulary.encode(&tokens);
        if vector.is_empty() {
            log::debug!("{}: query has no known terms", self.name);
        } else if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "{}: query terms {:?}",
                self.name,
                generation.vocabulary.decode(&vector)
            );
        }

        let projected = generation
            .model
            .project(&vector)
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        generation
            .index
            .query(&projected)
            .map_err(|e| EngineError::Internal(e.to_string()))
    }

    pub fn health(&self) -> HealthReport {
        let (status, mut errors, updated_at) = match self.state.read() {
            Ok(state) => (state.status, state.errors.clone(), state.updated_at),
            Err(e) => (AnalyzerStatus::Nok, vec![format!("Lock poisoned: {}", e)], None),
        };

        if status == AnalyzerStatus::Uninitialized && errors.is_empty() {
            errors.push("not trained".to_string());
        }

        HealthReport {
            name: self.name.clone(),
            state: if status == AnalyzerStatus::Ready {
                HealthState::Ok
            } else {
                HealthState::Nok
            },
            created_at: self.created_at,
            updated_at,
            errors,
        }
    }

    /// Incremental updates are not available; retrain with the full corpus.
    pub fn update(&self, _entry: &serde_json::Value) -> Result<(), EngineError> {
        log::info!("{}: incremental update requested but not supported", self.name);
        Err(EngineError::Unsupported(
            "incremental update is not implemented, retrain with the full corpus",
        ))
    }

    /// Published generation, or `None` unless ready.
    fn snapshot(&self) -> Result<Option<Arc<Generation>>, EngineError> {
        let state = self
            .state
            .read()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))?;
        if state.status != AnalyzerStatus::Ready {
            return Ok(None);
        }
        Ok(state.generation.clone())
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, AnalyzerState>, EngineError> {
        self.state
            .write()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))
    }

    fn persist(&self, generation: &Generation) -> Result<(), ArtifactError> {
        let mut writer = ByteWriter::default();
        writer.put_u64(generation.id);
        generation.vocabulary.write_payload(&mut writer);
        self.storage.write(
            &self.key.dictionary_artifact(),
            &artifact::encode(ArtifactKind::Vocabulary, &writer.into_inner()),
        )?;

        let mut writer = ByteWriter::default();
        writer.put_u64(generation.id);
        writer.put_i64(generation.trained_at.timestamp_millis());
        generation.model.write_payload(&mut writer);
        self.storage.write(
            &self.key.model_artifact(),
            &artifact::encode(ArtifactKind::TopicModel, &writer.into_inner()),
        )?;

        let mut writer = ByteWriter::default();
        writer.put_u64(generation.id);
        generation.index.write_payload(&mut writer);
        self.storage.write(
            &self.key.index_artifact(),
            &artifact::encode(ArtifactKind::SimilarityIndex, &writer.into_inner()),
        )?;

        Ok(())
    }

    /// Try to load the three persisted artifacts. Any missing or
    /// inconsistent artifact leaves the analyzer NOK.
    fn reload(&self) -> Result<(), EngineError> {
        let missing: Vec<&str> = [
            (self.key.dictionary_artifact(), "Dictionary not found."),
            (self.key.model_artifact(), "LSI-model not found."),
            (self.key.index_artifact(), "Document-index not found."),
        ]
        .iter()
        .filter(|(artifact, _)| !self.storage.exists(artifact))
        .map(|(_, message)| *message)
        .collect();

        let mut state = self.write_state()?;

        if !missing.is_empty() {
            for message in &missing {
                log::info!("{}: {message}", self.name);
            }
            state.status = AnalyzerStatus::Nok;
            state.errors = missing.iter().map(|m| m.to_string()).collect();
            return Ok(());
        }

        match self.load() {
            Ok(generation) => {
                log::info!(
                    "{}: reloaded {} documents trained at {}",
                    self.name,
                    generation.index.len(),
                    generation.trained_at
                );
                state.status = AnalyzerStatus::Ready;
                state.updated_at = Some(generation.trained_at);
                state.errors.clear();
                state.generation = Some(Arc::new(generation));
            }
            Err(err) => {
                log::warn!("{}: failed to reload artifacts: {err}", self.name);
                state.status = AnalyzerStatus::Nok;
                state.errors = vec![format!("reload failed: {err}")];
            }
        }

        Ok(())
    }

    fn load(&self) -> Result<Generation, ArtifactError> {
        let bytes = self.storage.read(&self.key.dictionary_artifact())?;
        let mut reader = ByteReader::new(artifact::decode(ArtifactKind::Vocabulary, &bytes)?);
        let vocabulary_generation = reader.get_u64()?;
        let vocabulary = Vocabulary::read_payload(&mut reader)?;
        reader.finish()?;

        let bytes = self.storage.read(&self.key.model_artifact())?;
        let mut reader = ByteReader::new(artifact::decode(ArtifactKind::TopicModel, &bytes)?);
        let model_generation = reader.get_u64()?;
        let trained_at = DateTime::<Utc>::from_timestamp_millis(reader.get_i64()?)
            .ok_or_else(|| ArtifactError::InvalidFormat("training time out of range".to_string()))?;
        let model = TopicModel::read_payload(&mut reader)?;
        reader.finish()?;

        let bytes = self.storage.read(&self.key.index_artifact())?;
        let mut reader = ByteReader::new(artifact::decode(ArtifactKind::SimilarityIndex, &bytes)?);
        let index_generation = reader.get_u64()?;
        let index = SimilarityIndex::read_payload(&mut reader)?;
        reader.finish()?;

        if vocabulary_generation != model_generation || model_generation != index_generation {
            return Err(ArtifactError::InvalidFormat(
                "artifacts belong to different training runs".to_string(),
            ));
        }
        if !model.is_fitted_on(&vocabulary) {
            return Err(ArtifactError::InvalidFormat(
                "topic model was fitted on a different vocabulary".to_string(),
            ));
        }
        if index.dimensions() != model.dimensions() {
            return Err(ArtifactError::InvalidFormat(format!(
                "index has {} dimensions, topic model has {}",
                index.dimensions(),
                model.dimensions()
            )));
        }

        Ok(Generation {
            id: model_generation,
            trained_at,
            vocabulary,
            model,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendLocal;

    const CORPUS: &[&str] = &[
        "the cat sat on the mat with another cat",
        "dogs chase cats around the garden",
        "the stock market fell sharply today",
        "market traders sold stock as the market fell",
        "a cat and a dog played in the garden with another dog",
    ];

    fn storage(dir: &tempfile::TempDir) -> Arc<dyn StorageManager> {
        Arc::new(BackendLocal::new(dir.path()).unwrap())
    }

    fn key() -> AnalyzerKey {
        AnalyzerKey::new("en", "description", "tickets")
    }

    struct ReadOnlyStorage;

    impl StorageManager for ReadOnlyStorage {
        fn write(&self, _ident: &str, _data: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ))
        }
        fn read(&self, _ident: &str) -> std::io::Result<Vec<u8>> {
            Err(std::io::ErrorKind::NotFound.into())
        }
        fn exists(&self, _ident: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_key_name_is_storage_safe() {
        let key = AnalyzerKey::new("en", "long text", "data/set 1");
        assert_eq!(key.name(), "en_longtext_data_set1");
        assert_eq!(key.dictionary_artifact(), "en_longtext_data_set1.dictionary");
        assert_eq!(key.model_artifact(), "en_longtext_data_set1_lsi.model");
        assert_eq!(key.index_artifact(), "en_longtext_data_set1.index");
    }

    #[test]
    fn test_unsupported_language_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = Analyzer::new(
            AnalyzerKey::new("xx", "f", "d"),
            &EngineConfig::default(),
            storage(&tmp),
        );
        assert!(matches!(result, Err(EngineError::MalformedInput(_))));
    }

    #[test]
    fn test_language_without_stemmer_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config
            .languages
            .insert("tlh".to_string(), "klingon".to_string());

        let analyzer = Analyzer::new(AnalyzerKey::new("tlh", "f", "d"), &config, storage(&tmp)).unwrap();
        analyzer.train(&["cats cats", "cats dogs dogs"]).unwrap();
        assert!(analyzer.is_ready());
    }

    #[test]
    fn test_new_analyzer_is_uninitialized() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(key(), &EngineConfig::default(), storage(&tmp)).unwrap();

        assert_eq!(analyzer.status(), AnalyzerStatus::Uninitialized);
        assert!(analyzer.query("cat").is_empty());
        assert!(matches!(
            analyzer.try_query("cat"),
            Err(EngineError::NotReady { .. })
        ));

        let health = analyzer.health();
        assert_eq!(health.state, HealthState::Nok);
        assert_eq!(health.errors, vec!["not trained".to_string()]);
        assert!(health.updated_at.is_none());
    }

    #[test]
    fn test_train_then_query() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(key(), &EngineConfig::default(), storage(&tmp)).unwrap();
        analyzer.train(CORPUS).unwrap();

        assert!(analyzer.is_ready());
        assert_eq!(analyzer.document_count(), CORPUS.len());

        let results = analyzer.query(CORPUS[3]);
        assert_eq!(results.len(), CORPUS.len());
        assert_eq!(results[0].id, 3);

        let health = analyzer.health();
        assert_eq!(health.state, HealthState::Ok);
        assert!(health.errors.is_empty());
        assert!(health.updated_at.is_some());
    }

    #[test]
    fn test_empty_batch_keeps_previous_state() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(key(), &EngineConfig::default(), storage(&tmp)).unwrap();
        analyzer.train(CORPUS).unwrap();
        let before = analyzer.query("stock market");
        let updated_at = analyzer.health().updated_at;

        let empty: &[&str] = &[];
        assert!(matches!(
            analyzer.train(empty),
            Err(EngineError::MalformedInput(_))
        ));

        assert!(analyzer.is_ready());
        assert_eq!(analyzer.query("stock market"), before);
        assert_eq!(analyzer.health().updated_at, updated_at);
    }

    #[test]
    fn test_batch_without_tokens_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(key(), &EngineConfig::default(), storage(&tmp)).unwrap();

        let result = analyzer.train(&["the a", "of it"]);
        assert!(matches!(result, Err(EngineError::MalformedInput(_))));
        assert_eq!(analyzer.status(), AnalyzerStatus::Uninitialized);
    }

    #[test]
    fn test_reload_restores_identical_rankings() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();

        let trained = Analyzer::new(key(), &config, storage(&tmp)).unwrap();
        trained.train(CORPUS).unwrap();

        let reopened = Analyzer::open(key(), &config, storage(&tmp)).unwrap();
        assert!(reopened.is_ready());
        assert_eq!(reopened.health().state, HealthState::Ok);
        assert_eq!(reopened.health().updated_at, trained.health().updated_at);

        for text in ["cat in the garden", "stock traders", "unknown words only"] {
            assert_eq!(reopened.query(text), trained.query(text));
        }
    }

    #[test]
    fn test_reload_with_missing_artifact_is_nok() {
        for artifact in [
            key().dictionary_artifact(),
            key().model_artifact(),
            key().index_artifact(),
        ] {
            let tmp = tempfile::tempdir().unwrap();
            let config = EngineConfig::default();

            Analyzer::new(key(), &config, storage(&tmp))
                .unwrap()
                .train(CORPUS)
                .unwrap();
            std::fs::remove_file(tmp.path().join(&artifact)).unwrap();

            let reopened = Analyzer::open(key(), &config, storage(&tmp)).unwrap();
            assert_eq!(reopened.status(), AnalyzerStatus::Nok, "{artifact}");
            assert_eq!(reopened.health().state, HealthState::Nok);
            assert!(reopened.query("cat").is_empty());
        }
    }

    #[test]
    fn test_reload_without_artifacts_reports_each_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::open(key(), &EngineConfig::default(), storage(&tmp)).unwrap();

        assert_eq!(analyzer.status(), AnalyzerStatus::Nok);
        assert_eq!(
            analyzer.health().errors,
            vec![
                "Dictionary not found.".to_string(),
                "LSI-model not found.".to_string(),
                "Document-index not found.".to_string(),
            ]
        );
    }

    #[test]
    fn test_reload_rejects_mixed_generations() {
        let tmp = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();

        Analyzer::new(key(), &config, storage(&tmp))
            .unwrap()
            .train(CORPUS)
            .unwrap();
        Analyzer::new(key(), &config, storage(&other))
            .unwrap()
            .train(CORPUS)
            .unwrap();

        std::fs::copy(
            other.path().join(key().index_artifact()),
            tmp.path().join(key().index_artifact()),
        )
        .unwrap();

        let reopened = Analyzer::open(key(), &config, storage(&tmp)).unwrap();
        assert_eq!(reopened.status(), AnalyzerStatus::Nok);
    }

    #[test]
    fn test_reload_rejects_corrupt_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();

        Analyzer::new(key(), &config, storage(&tmp))
            .unwrap()
            .train(CORPUS)
            .unwrap();
        let path = tmp.path().join(key().model_artifact());
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let reopened = Analyzer::open(key(), &config, storage(&tmp)).unwrap();
        assert_eq!(reopened.status(), AnalyzerStatus::Nok);
        assert!(reopened.health().errors[0].contains("reload failed"));
    }

    #[test]
    fn test_train_recovers_from_nok() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::open(key(), &EngineConfig::default(), storage(&tmp)).unwrap();
        assert_eq!(analyzer.status(), AnalyzerStatus::Nok);

        analyzer.train(CORPUS).unwrap();
        assert!(analyzer.is_ready());
        assert!(analyzer.health().errors.is_empty());
    }

    #[test]
    fn test_persistence_failure_marks_nok() {
        let analyzer =
            Analyzer::new(key(), &EngineConfig::default(), Arc::new(ReadOnlyStorage)).unwrap();

        let result = analyzer.train(CORPUS);
        assert!(matches!(result, Err(EngineError::Persistence { .. })));
        assert_eq!(analyzer.status(), AnalyzerStatus::Nok);
        assert!(analyzer.query("cat").is_empty());
        assert!(analyzer.health().errors[0].contains("persistence failed"));
    }

    #[test]
    fn test_update_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(key(), &EngineConfig::default(), storage(&tmp)).unwrap();
        let result = analyzer.update(&serde_json::json!({"description": "new text"}));
        assert!(matches!(result, Err(EngineError::Unsupported(_))));
    }

    #[test]
    fn test_concurrent_queries_during_retrain() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Arc::new(Analyzer::new(key(), &EngineConfig::default(), storage(&tmp)).unwrap());
        analyzer.train(CORPUS).unwrap();

        let reader = {
            let analyzer = analyzer.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let results = analyzer.query("cat garden");
                    assert!(results.len() == CORPUS.len() || results.len() == 3);
                }
            })
        };

        for _ in 0..5 {
            analyzer.train(CORPUS).unwrap();
            analyzer.train(&CORPUS[..3]).unwrap();
        }
        reader.join().unwrap();
    }
}
