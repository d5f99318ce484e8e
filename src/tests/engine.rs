//! End-to-end engine flows over real storage.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::engine::analyzer::{AnalyzerStatus, HealthState};
use crate::engine::{AnalyzerKey, EngineError};

const STORIES: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "a lazy dog sleeps in the sun all day",
    "quick brown foxes are rare in the city",
    "the city council met to discuss the budget",
    "budget cuts hit the city council hard",
    "sun and rain make the garden grow",
];

fn setup(dir: &tempfile::TempDir) -> (EngineConfig, std::sync::Arc<crate::engine::Registry>) {
    let base = dir.path().to_str().unwrap();
    let config = EngineConfig::load_with(base).unwrap();
    let registry = crate::build_registry(base, config.clone()).unwrap();
    (config, registry)
}

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_every_training_document_ranks_itself_first() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, registry) = setup(&tmp);
    let key = AnalyzerKey::new("en", "story", "tales");
    registry.train(&key, STORIES).unwrap();

    let analyzer = registry.get(&key).unwrap();
    for (id, story) in STORIES.iter().enumerate() {
        let results = analyzer.query(story);
        assert_eq!(results.len(), STORIES.len());

        let own = results.iter().find(|r| r.id == id as u64).unwrap();
        assert!(
            (results[0].score - own.score).abs() < 1e-5,
            "document {id} is not a top match for itself"
        );
    }
}

#[test]
fn test_train_reload_query_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let key = AnalyzerKey::new("en", "story", "tales");

    let before = {
        let (_, registry) = setup(&tmp);
        registry.train(&key, STORIES).unwrap();
        registry
            .find_similar("tales", "en", &fields(&[("story", "city budget")]), Some(3))
            .unwrap()
    };
    assert_eq!(before.len(), 3);

    // a fresh process sees nothing registered and respawns from disk
    let (_, registry) = setup(&tmp);
    assert!(registry.is_empty());
    let after = registry
        .find_similar("tales", "en", &fields(&[("story", "city budget")]), Some(3))
        .unwrap();

    assert_eq!(before, after);
    assert_eq!(registry.health()[0].state, HealthState::Ok);
}

#[test]
fn test_deleting_any_artifact_makes_reload_nok() {
    let key = AnalyzerKey::new("en", "story", "tales");

    for artifact in [
        key.dictionary_artifact(),
        key.model_artifact(),
        key.index_artifact(),
    ] {
        let tmp = tempfile::tempdir().unwrap();
        {
            let (_, registry) = setup(&tmp);
            registry.train(&key, STORIES).unwrap();
        }
        std::fs::remove_file(tmp.path().join("models").join(&artifact)).unwrap();

        let (_, registry) = setup(&tmp);
        let analyzer = registry.get_or_create(&key).unwrap();
        assert_eq!(analyzer.health().state, HealthState::Nok, "{artifact}");
        assert!(analyzer.query("city budget").is_empty());

        // respawn refuses the incomplete triple
        let (_, fresh) = setup(&tmp);
        assert!(fresh.respawn(&key).unwrap().is_none());

        // retraining repairs it
        analyzer.train(STORIES).unwrap();
        assert_eq!(analyzer.status(), AnalyzerStatus::Ready);
    }
}

#[test]
fn test_empty_batch_preserves_trained_state() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, registry) = setup(&tmp);
    let key = AnalyzerKey::new("en", "story", "tales");
    registry.train(&key, STORIES).unwrap();

    let query = fields(&[("story", "lazy dog")]);
    let before = registry.find_similar("tales", "en", &query, None).unwrap();

    let empty: Vec<String> = Vec::new();
    let result = registry.train(&key, &empty);
    assert!(matches!(result, Err(EngineError::MalformedInput(_))));

    let after = registry.find_similar("tales", "en", &query, None).unwrap();
    assert_eq!(before, after);
    assert_eq!(before.len(), STORIES.len());
}

#[test]
fn test_languages_are_queried_separately() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, registry) = setup(&tmp);

    registry
        .train(&AnalyzerKey::new("en", "title", "tickets"), STORIES)
        .unwrap();
    registry
        .train(
            &AnalyzerKey::new("fi", "title", "tickets"),
            &["kissa istuu matolla", "koira juoksee puistossa", "kissa ja koira"],
        )
        .unwrap();

    let finnish = registry
        .find_similar("tickets", "fi", &fields(&[("title", "kissa")]), None)
        .unwrap();
    assert_eq!(finnish.len(), 3);

    let english = registry
        .find_similar("tickets", "en", &fields(&[("title", "kissa")]), None)
        .unwrap();
    assert_eq!(english.len(), STORIES.len());
    assert!(english.iter().all(|hit| hit.similarity_score == 0.0));
}

#[test]
fn test_custom_stopwords_never_reach_the_vocabulary() {
    let tmp = tempfile::tempdir().unwrap();
    let (config, registry) = setup(&tmp);
    assert!(config.custom_stopwords.contains(&"--retracted--".to_string()));

    let key = AnalyzerKey::new("en", "notes", "cases");
    registry
        .train(
            &key,
            &[
                "--retracted-- called about invoice invoice",
                "--retracted-- asked for refund refund",
                "invoice refund pending",
            ],
        )
        .unwrap();

    let results = registry.get(&key).unwrap().query("--retracted--");
    assert!(results.iter().all(|r| r.score == 0.0));
}
