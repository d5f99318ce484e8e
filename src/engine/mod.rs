//! Document-similarity engine.
//!
//! Training path: raw documents → [`normalize`] → [`vocabulary`] →
//! [`topic_model`] → [`index`]. Queries run the same normalizer and
//! vocabulary, are projected by the topic model and scored against the
//! index. An [`analyzer::Analyzer`] owns one such pipeline per
//! (language, field, dataset); the [`registry::Registry`] holds all of them
//! and [`aggregate`] fuses rankings across fields of one dataset.

pub mod aggregate;
pub mod analyzer;
pub mod artifact;
pub mod errors;
pub mod index;
pub mod normalize;
pub mod registry;
mod stopwords;
pub mod topic_model;
pub mod vocabulary;

pub use analyzer::{AnalyzerKey, HealthReport};
pub use errors::EngineError;
pub use registry::Registry;
