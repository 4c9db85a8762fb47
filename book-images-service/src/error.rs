use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pipeline_flow::GraphError;
use serde_json::json;
use thiserror::Error;

/// First missing field found while validating a webhook event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing expected header: {0}.")]
    MissingHeader(String),

    #[error("Missing expected body element: {0}")]
    MissingBodyField(String),
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingHeader(name) | Self::MissingBodyField(name) => name,
        }
    }
}

/// Every way a webhook invocation can fail
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Image extraction failed: {0}")]
    Extraction(String),

    #[error("Summary lookup failed: {0}")]
    SummaryLookup(String),

    #[error("Availability negotiation failed: {0}")]
    Negotiation(String),

    #[error("Availability negotiation exhausted after {tool_invocations} tool calls")]
    NegotiationExhausted {
        tool_invocations: u32,
        last_response: Option<String>,
    },

    #[error("Failed to persist book record: {0}")]
    Persistence(String),

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Extraction(_) => "extraction_error",
            Self::SummaryLookup(_) => "summary_lookup_error",
            Self::Negotiation(_) => "negotiation_error",
            Self::NegotiationExhausted { .. } => "negotiation_exhausted",
            Self::Persistence(_) => "persistence_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Any non-2xx status makes the webhook sender redeliver the event
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Extraction(_) | Self::SummaryLookup(_) | Self::Negotiation(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::NegotiationExhausted { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Recover the pipeline error a task raised inside the workflow graph
    pub fn from_graph(err: GraphError) -> Self {
        match err {
            GraphError::Other(inner) => match inner.downcast::<PipelineError>() {
                Ok(pipeline_error) => pipeline_error,
                Err(other) => Self::Internal(other.to_string()),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for GraphError {
    fn from(err: PipelineError) -> Self {
        GraphError::Other(anyhow::Error::new(err))
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Validation(validation) => json!({
                "error": self.kind(),
                "message": validation.to_string(),
                "field": validation.field(),
            }),
            Self::NegotiationExhausted {
                tool_invocations,
                last_response,
            } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "tool_invocations": tool_invocations,
                "last_response": last_response,
            }),
            _ => json!({
                "error": self.kind(),
                "message": self.to_string(),
            }),
        };

        (self.status_code(), Json(body)).into_response()
    }
}
