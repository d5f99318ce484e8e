use crate::engine::artifact::ArtifactError;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("analyzer {name} is not ready")]
    NotReady { name: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("persistence failed for {name}: {source}")]
    Persistence {
        name: String,
        #[source]
        source: ArtifactError,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}
