//! Process-wide set of analyzers, keyed by (language, field, dataset).
//!
//! Lookups share a read lock; creating a new analyzer takes the write lock
//! and re-checks, so two requests for the same new key build it once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::config::EngineConfig;
use crate::engine::aggregate::{aggregate, AggregateHit};
use crate::engine::analyzer::{Analyzer, AnalyzerKey, HealthReport};
use crate::engine::errors::EngineError;
use crate::storage::StorageManager;

pub struct Registry {
    config: Arc<EngineConfig>,
    storage: Arc<dyn StorageManager>,
    analyzers: RwLock<HashMap<AnalyzerKey, Arc<Analyzer>>>,
}

impl Registry {
    pub fn new(config: Arc<EngineConfig>, storage: Arc<dyn StorageManager>) -> Self {
        Self {
            config,
            storage,
            analyzers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.analyzers.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &AnalyzerKey) -> Option<Arc<Analyzer>> {
        self.analyzers.read().ok()?.get(key).cloned()
    }

    /// Registered analyzer for `key`, or a newly opened one (reloading any
    /// persisted artifacts).
    pub fn get_or_create(&self, key: &AnalyzerKey) -> Result<Arc<Analyzer>, EngineError> {
        if let Some(analyzer) = self.get(key) {
            return Ok(analyzer);
        }

        let mut analyzers = self
            .analyzers
            .write()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(analyzer) = analyzers.get(key) {
            return Ok(analyzer.clone());
        }

        let analyzer = Arc::new(Analyzer::open(
            key.clone(),
            &self.config,
            self.storage.clone(),
        )?);
        log::info!("registered analyzer {key} ({:?})", analyzer.status());
        analyzers.insert(key.clone(), analyzer.clone());

        Ok(analyzer)
    }

    /// Reload `key` from storage and register it only if every artifact
    /// loaded. Returns the registered analyzer, if any.
    pub fn respawn(&self, key: &AnalyzerKey) -> Result<Option<Arc<Analyzer>>, EngineError> {
        log::info!("trying to respawn analyzer {key}");

        let analyzer = Analyzer::open(key.clone(), &self.config, self.storage.clone())?;
        if !analyzer.is_ready() {
            log::info!("analyzer {key} could not be respawned");
            return Ok(None);
        }

        let mut analyzers = self
            .analyzers
            .write()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))?;
        let analyzer = analyzers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(analyzer))
            .clone();

        Ok(Some(analyzer))
    }

    /// Analyzers of one dataset and language, ordered by key.
    pub fn analyzers_for(&self, dataset: &str, language: &str) -> Vec<Arc<Analyzer>> {
        let Ok(analyzers) = self.analyzers.read() else {
            return Vec::new();
        };

        let mut found: Vec<Arc<Analyzer>> = analyzers
            .iter()
            .filter(|(key, _)| key.dataset == dataset && key.language == language)
            .map(|(_, analyzer)| analyzer.clone())
            .collect();
        found.sort_by(|a, b| a.key().cmp(b.key()));
        found
    }

    /// Health of every registered analyzer, ordered by name.
    pub fn health(&self) -> Vec<HealthReport> {
        let Ok(analyzers) = self.analyzers.read() else {
            return Vec::new();
        };

        let mut reports: Vec<HealthReport> = analyzers.values().map(|a| a.health()).collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }

    pub fn train<S: AsRef<str>>(&self, key: &AnalyzerKey, documents: &[S]) -> Result<(), EngineError> {
        self.get_or_create(key)?.train(documents)
    }

    /// Incremental updates are refused. An entry naming a registered
    /// analyzer (`language`, `dataset`, `key`) is handed to it first.
    pub fn update(&self, entry: &serde_json::Value) -> Result<(), EngineError> {
        let text = |name: &str| entry.get(name).and_then(serde_json::Value::as_str);

        if let (Some(language), Some(dataset), Some(field)) =
            (text("language"), text("dataset"), text("key"))
        {
            if let Some(analyzer) = self.get(&AnalyzerKey::new(language, field, dataset)) {
                return analyzer.update(entry);
            }
        }

        log::info!("update requested, incremental training is not supported");
        Err(EngineError::Unsupported(
            "incremental update is not implemented, post the full corpus to /training_data",
        ))
    }

    /// Query every ready analyzer of `dataset`/`language` whose field is in
    /// `fields` and fuse the rankings.
    ///
    /// When nothing is registered for the dataset yet, analyzers for the
    /// payload fields are first respawned from storage.
    pub fn find_similar(
        &self,
        dataset: &str,
        language: &str,
        fields: &BTreeMap<String, String>,
        top_n: Option<usize>,
    ) -> Result<Vec<AggregateHit>, EngineError> {
        if self.config.language_name(language).is_none() {
            return Err(EngineError::MalformedInput(format!(
                "language '{language}' is not supported"
            )));
        }

        if self.analyzers_for(dataset, language).is_empty() {
            for field in fields.keys() {
                self.respawn(&AnalyzerKey::new(language, field.as_str(), dataset))?;
            }
        }

        // an analyzer counts only if it actually produced a ranking
        let rankings: Vec<_> = self
            .analyzers_for(dataset, language)
            .iter()
            .filter_map(|analyzer| {
                let text = fields.get(&analyzer.key().field)?;
                match analyzer.try_query(text) {
                    Ok(ranking) => Some(ranking),
                    Err(err) => {
                        log::debug!("{} left out of fusion: {err}", analyzer.name());
                        None
                    }
                }
            })
            .collect();

        let top_n = top_n.unwrap_or(self.config.default_top_n);
        log::debug!(
            "find_similar dataset={dataset} language={language} participants={}",
            rankings.len()
        );

        Ok(aggregate(&rankings, top_n))
    }
}
