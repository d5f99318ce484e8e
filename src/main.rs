use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use homedir::my_home;

mod cli;
mod config;
mod engine;
mod lock;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::EngineConfig;
use engine::{AnalyzerKey, Registry};
use lock::DataDirLock;

/// Subdirectory of the base path holding analyzer artifacts
const MODELS_DIR: &str = "models";

fn base_path() -> anyhow::Result<String> {
    if let Ok(path) = std::env::var("DOCSIM_BASE_PATH") {
        return Ok(path);
    }

    let home = my_home()
        .map_err(|e| anyhow::anyhow!("could not determine home directory: {e:?}"))?
        .context("home directory path is empty")?;
    Ok(format!("{}/.local/share/docsim", home.to_string_lossy()))
}

pub fn build_registry(base_path: &str, config: EngineConfig) -> anyhow::Result<Arc<Registry>> {
    let models_dir = PathBuf::from(base_path).join(MODELS_DIR);
    let store = storage::BackendLocal::new(&models_dir)
        .with_context(|| format!("failed to create {}", models_dir.display()))?;

    Ok(Arc::new(Registry::new(Arc::new(config), Arc::new(store))))
}

fn read_documents(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} must hold a JSON array", path.display()))?;

    Ok(values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .collect())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let base_path = base_path()?;
    let config = EngineConfig::load_with(&base_path)?;

    match args.command {
        cli::Command::Daemon { listen } => {
            let _lock = DataDirLock::acquire(Path::new(&base_path))?;
            let listen_addr = listen.unwrap_or_else(|| config.listen_addr.clone());
            let registry = build_registry(&base_path, config)?;
            web::start_daemon(registry, listen_addr)
        }

        cli::Command::Train {
            languages,
            dataset,
            field,
            documents,
        } => {
            let _lock = DataDirLock::acquire(Path::new(&base_path))?;
            let documents = read_documents(&documents)?;
            let registry = build_registry(&base_path, config)?;

            let mut failed = 0;
            for language in languages {
                let key = AnalyzerKey::new(language, field.as_str(), dataset.as_str());
                match registry.train(&key, &documents) {
                    Ok(()) => println!("trained {key}"),
                    Err(err) => {
                        eprintln!("{key}: {err}");
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                bail!("{failed} analyzer(s) failed to train");
            }
            Ok(())
        }

        cli::Command::Query {
            language,
            dataset,
            fields,
            top_n,
            text,
        } => {
            let registry = build_registry(&base_path, config)?;
            let fields: BTreeMap<String, String> = fields
                .into_iter()
                .map(|field| (field, text.clone()))
                .collect();

            let hits = registry.find_similar(&dataset, &language, &fields, top_n)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }

        cli::Command::Health {
            language,
            dataset,
            field,
        } => {
            let registry = build_registry(&base_path, config)?;
            let analyzer = registry.get_or_create(&AnalyzerKey::new(language, field, dataset))?;
            let report = serde_json::json!({
                "health": analyzer.health(),
                "documents": analyzer.document_count(),
                "topic_count": analyzer.topic_count(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
