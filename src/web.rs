use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::signal;

use crate::engine::{AnalyzerKey, EngineError, HealthReport, Registry};

#[derive(Clone)]
struct SharedState {
    registry: Arc<Registry>,
}

pub fn router(registry: Arc<Registry>) -> Router {
    let shared_state = Arc::new(SharedState { registry });

    Router::new()
        .route("/training_data", post(training_data))
        .route("/find_similar", post(find_similar))
        .route("/update", post(update))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(registry: Arc<Registry>, listen_addr: String) -> anyhow::Result<()> {
    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                log::error!("failed to install Ctrl+C handler: {err}");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => log::error!("failed to install signal handler: {err}"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        log::warn!("shutting down");
    }

    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    log::info!("listening on {listen_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(registry: Arc<Registry>, listen_addr: String) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(registry, listen_addr).await })
}

#[derive(Debug)]
struct HttpError(EngineError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            EngineError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            EngineError::NotReady { .. } => StatusCode::CONFLICT,
            EngineError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            EngineError::Persistence { .. } | EngineError::Internal(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(json!({"status": status.as_u16(), "error": self.0.to_string()})),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<EngineError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn join_error(err: tokio::task::JoinError) -> HttpError {
    HttpError(EngineError::Internal(format!("worker failed: {err}")))
}

/// One ISO code or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LanguageSpec {
    One(String),
    Many(Vec<String>),
}

impl LanguageSpec {
    fn into_vec(self) -> Vec<String> {
        match self {
            LanguageSpec::One(code) => vec![code],
            LanguageSpec::Many(codes) => codes,
        }
    }
}

/// `{keys, language, dataset, <key>: [document...]...}`
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingRequest {
    pub keys: Vec<String>,
    pub language: LanguageSpec,
    pub dataset: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct TrainingResponse {
    status: u16,
    trained: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

/// JSON strings are used as-is, anything else by its JSON text.
fn document_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn train_all(registry: &Registry, payload: TrainingRequest) -> Result<TrainingResponse, EngineError> {
    let languages: Vec<String> = payload
        .language
        .into_vec()
        .into_iter()
        .filter(|code| {
            let supported = registry.config().language_name(code).is_some();
            if !supported {
                log::warn!("skipping unsupported language '{code}'");
            }
            supported
        })
        .collect();

    if languages.is_empty() {
        return Err(EngineError::MalformedInput(
            "none of the requested languages is supported".to_string(),
        ));
    }
    if payload.keys.is_empty() {
        return Err(EngineError::MalformedInput("no keys given".to_string()));
    }

    let mut trained = Vec::new();
    let mut errors = Vec::new();

    for field in &payload.keys {
        let documents: Vec<String> = match payload.fields.get(field) {
            Some(Value::Array(values)) => values.iter().map(document_text).collect(),
            _ => {
                errors.push(format!("field '{field}' is missing or not an array"));
                continue;
            }
        };

        for language in &languages {
            let key = AnalyzerKey::new(language.as_str(), field.as_str(), payload.dataset.as_str());
            match registry.train(&key, &documents) {
                Ok(()) => trained.push(key.name()),
                Err(err) => {
                    log::warn!("training {key} failed: {err}");
                    errors.push(format!("{key}: {err}"));
                }
            }
        }
    }

    let status = if errors.is_empty() { 200 } else { 400 };
    Ok(TrainingResponse {
        status,
        trained,
        errors,
    })
}

async fn training_data(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<TrainingRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let registry = state.registry.clone();

    let response = tokio::task::spawn_blocking(move || train_all(&registry, payload))
        .await
        .map_err(join_error)??;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_REQUEST);
    Ok((status, Json(response)))
}

/// `{language, dataset, top_n?, <field>: text...}`
#[derive(Debug, Clone, Deserialize)]
pub struct FindSimilarRequest {
    pub language: String,
    pub dataset: String,
    pub top_n: Option<usize>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

async fn find_similar(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<FindSimilarRequest>,
) -> Result<Json<Value>, HttpError> {
    let registry = state.registry.clone();

    if registry.config().language_name(&payload.language).is_none() {
        return Ok(Json(json!({
            "similar": {"language": format!("{} not supported", payload.language)}
        })));
    }

    // only string-valued fields can be queried
    let fields: BTreeMap<String, String> = payload
        .fields
        .iter()
        .filter_map(|(field, value)| value.as_str().map(|text| (field.clone(), text.to_string())))
        .collect();

    let hits = tokio::task::spawn_blocking(move || {
        registry.find_similar(&payload.dataset, &payload.language, &fields, payload.top_n)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(json!({ "similar": hits })))
}

/// Any body is accepted; the answer is always 501.
async fn update(
    State(state): State<Arc<SharedState>>,
    body: Bytes,
) -> Result<Json<Value>, HttpError> {
    let entry = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    state.registry.update(&entry)?;
    Ok(Json(json!({"status": 200})))
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<Vec<HealthReport>> {
    Json(state.registry.health())
}
