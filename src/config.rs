use std::collections::BTreeMap;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::storage::{self, StorageManager};

/// Default number of latent topics per analyzer
const DEFAULT_NUM_TOPICS: usize = 16;
/// Default number of fused results per query
const DEFAULT_TOP_N: usize = 10;
/// Tokens shorter than this (in characters) are dropped
const DEFAULT_MIN_TOKEN_LEN: usize = 2;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";

const CONFIG_FILE: &str = "config.yaml";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on topic-space dimensions
    #[serde(default = "default_num_topics")]
    pub num_topics: usize,

    /// Result count for queries that do not pass `top_n`
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    /// Stopwords applied to every language (redaction placeholders and such)
    #[serde(default = "default_custom_stopwords")]
    pub custom_stopwords: Vec<String>,

    /// Supported ISO codes and their language names
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, String>,

    /// Extra stopwords per ISO code
    #[serde(default)]
    pub stopwords: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_topics: DEFAULT_NUM_TOPICS,
            default_top_n: DEFAULT_TOP_N,
            custom_stopwords: default_custom_stopwords(),
            languages: default_languages(),
            stopwords: BTreeMap::new(),
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            base_path: String::new(),
        }
    }
}

fn default_num_topics() -> usize {
    DEFAULT_NUM_TOPICS
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_min_token_len() -> usize {
    DEFAULT_MIN_TOKEN_LEN
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_custom_stopwords() -> Vec<String> {
    vec!["--retracted--".to_string(), "xxx@email.zz".to_string()]
}

fn default_languages() -> BTreeMap<String, String> {
    [
        ("ar", "arabic"),
        ("da", "danish"),
        ("de", "german"),
        ("en", "english"),
        ("es", "spanish"),
        ("fi", "finnish"),
        ("fr", "french"),
        ("hu", "hungarian"),
        ("it", "italian"),
        ("nl", "dutch"),
        ("no", "norwegian"),
        ("pt", "portuguese"),
        ("ro", "romanian"),
        ("ru", "russian"),
        ("sv", "swedish"),
    ]
    .into_iter()
    .map(|(code, name)| (code.to_string(), name.to_string()))
    .collect()
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_topics == 0 {
            bail!("num_topics must be greater than 0");
        }
        if self.default_top_n == 0 {
            bail!("default_top_n must be greater than 0");
        }
        if self.min_token_len == 0 {
            bail!("min_token_len must be greater than 0");
        }
        if self.languages.is_empty() {
            bail!("at least one language must be configured");
        }
        for (code, name) in &self.languages {
            if code.trim().is_empty() {
                bail!("language '{name}' has an empty code");
            }
            if name.trim().is_empty() {
                bail!("language code '{code}' has an empty name");
            }
        }
        Ok(())
    }

    /// Language name for a supported ISO code.
    pub fn language_name(&self, code: &str) -> Option<&str> {
        self.languages.get(code).map(String::as_str)
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)
            .with_context(|| format!("failed to create base directory {base_path}"))?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store
                .write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())
                .context("failed to write default config")?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store
            .write(CONFIG_FILE, config_str.as_bytes())
            .context("failed to save config")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().to_str().unwrap();

        let config = EngineConfig::load_with(base).unwrap();
        assert_eq!(config.num_topics, 16);
        assert_eq!(config.default_top_n, 10);
        assert_eq!(config.min_token_len, 2);
        assert_eq!(config.language_name("fi"), Some("finnish"));
        assert_eq!(config.language_name("xx"), None);
        assert!(tmp.path().join("config.yaml").exists());
    }

    #[test]
    fn test_load_fills_missing_fields_and_resaves() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "num_topics: 4\n").unwrap();

        let config = EngineConfig::load_with(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(config.num_topics, 4);
        assert_eq!(config.default_top_n, 10);

        let saved = std::fs::read_to_string(tmp.path().join("config.yaml")).unwrap();
        assert!(saved.contains("default_top_n"));
        assert!(saved.contains("num_topics: 4"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "num_topics: 0\n").unwrap();

        let err = EngineConfig::load_with(tmp.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("num_topics"));
    }

    #[test]
    fn test_malformed_config_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "num_topics: [").unwrap();

        assert!(EngineConfig::load_with(tmp.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_empty_languages_rejected() {
        let config = EngineConfig {
            languages: BTreeMap::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
