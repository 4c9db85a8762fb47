use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::clients::OpenRouterClient;
use crate::config::{AppConfig, SummarySource};
use crate::models::WebhookEvent;
use crate::orchestrator::{BookImageProcessor, Collaborators};
use crate::persistence::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, connect_pool};
use crate::summary::{ModelSummaryLookup, PostgresSummaryLookup, SummaryLookup};

pub const START_MESSAGE: &str = "ImageProcessingController started";

#[derive(Clone)]
pub struct AppState {
    processor: Arc<BookImageProcessor>,
}

impl AppState {
    pub fn new(processor: BookImageProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(start))
        .route("/images/start", get(start))
        .route("/health", get(health_check))
        .route("/images", post(receive_image_event))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(state)
}

/// Wire the production collaborators described by `config` and build the router
pub async fn create_app(config: &AppConfig) -> anyhow::Result<Router> {
    let openrouter = Arc::new(OpenRouterClient::from_config(config)?);

    let pool = match config.storage.database_url.as_deref() {
        Some(database_url) => {
            info!("Using PostgreSQL document store");
            Some(connect_pool(database_url, config.storage.max_connections).await?)
        }
        None => {
            info!("Using in-memory document store (set DATABASE_URL to use PostgreSQL)");
            None
        }
    };

    let store: Arc<dyn DocumentStore> = match &pool {
        Some(pool) => Arc::new(PostgresDocumentStore::new(pool.clone()).await?),
        None => Arc::new(InMemoryDocumentStore::new()),
    };

    let summaries: Arc<dyn SummaryLookup> = match (config.summary.source, &pool) {
        (SummarySource::Database, Some(pool)) => Arc::new(PostgresSummaryLookup::new(pool.clone())),
        (SummarySource::Database, None) => {
            warn!("Summary source is the database but none is configured; asking the model instead");
            Arc::new(ModelSummaryLookup::new(config.api_key()?, &config.models.chat_model))
        }
        (SummarySource::Model, _) => {
            Arc::new(ModelSummaryLookup::new(config.api_key()?, &config.models.chat_model))
        }
    };

    let processor = BookImageProcessor::new(
        config,
        Collaborators {
            image_model: openrouter.clone(),
            chat_model: openrouter,
            summaries,
            store,
        },
    );

    Ok(build_router(AppState::new(processor)))
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn start() -> &'static str {
    START_MESSAGE
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn receive_image_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(message) => {
            warn!(error = %message, "Rejecting webhook with unreadable body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_body", "message": message })),
            )
                .into_response();
        }
    };

    let event = WebhookEvent::new(header_map(&headers), body);

    match state.processor.process(&event).await {
        Ok(ack) => {
            info!(file_name = %ack.book.file_name, "Webhook handled");
            (StatusCode::OK, ack.message).into_response()
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Webhook failed");
            e.into_response()
        }
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// An empty body is an empty object, so validation can name the missing field
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("Request body must be a JSON object".to_string()),
        Err(e) => Err(format!("Request body is not valid JSON: {}", e)),
    }
}
