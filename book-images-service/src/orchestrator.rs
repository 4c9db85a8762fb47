//! Runs one webhook notification through the whole pipeline.

use pipeline_flow::{Context, Graph};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::extraction::{ImageExtractionClient, ImageModel};
use crate::models::{PersistedBook, ValidatedEvent, WebhookAck, WebhookEvent};
use crate::negotiation::{AvailabilityNegotiator, ChatModel};
use crate::persistence::{DocumentStore, PersistenceSink};
use crate::summary::SummaryLookup;
use crate::tasks::context_keys;
use crate::validation::WebhookValidator;
use crate::workflow::build_book_workflow;

/// External systems the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub image_model: Arc<dyn ImageModel>,
    pub chat_model: Arc<dyn ChatModel>,
    pub summaries: Arc<dyn SummaryLookup>,
    pub store: Arc<dyn DocumentStore>,
}

/// Validates a notification, then runs extract, summary, availability and persist
/// in that order. The first failing stage ends the invocation.
pub struct BookImageProcessor {
    validator: WebhookValidator,
    workflow: Graph,
}

impl BookImageProcessor {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Self {
        let workflow = build_book_workflow(
            ImageExtractionClient::new(collaborators.image_model, config.prompts.image.clone()),
            collaborators.summaries,
            AvailabilityNegotiator::new(collaborators.chat_model),
            PersistenceSink::new(collaborators.store),
        );

        Self {
            validator: WebhookValidator::new(config.webhook.required_headers.clone()),
            workflow,
        }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<WebhookAck, PipelineError> {
        let validated = self.validator.validate(event)?;

        let span = info_span!(
            "book_image",
            subject = %validated.subject,
            file_name = %validated.file_name,
            bucket = ?validated.bucket_name,
        );

        self.run_workflow(validated).instrument(span).await
    }

    async fn run_workflow(&self, validated: ValidatedEvent) -> Result<WebhookAck, PipelineError> {
        let context = Context::new();
        context
            .set(context_keys::EVENT, &validated)
            .await
            .map_err(PipelineError::from_graph)?;

        let result = self
            .workflow
            .execute(context.clone())
            .await
            .map_err(PipelineError::from_graph)?;

        let book: PersistedBook = context.get(context_keys::PERSISTED).await.ok_or_else(|| {
            PipelineError::Internal("workflow finished without persisting the record".to_string())
        })?;
        let tool_invocations: u32 = context
            .get(context_keys::TOOL_INVOCATIONS)
            .await
            .unwrap_or_default();

        info!(
            tasks = result.executed_tasks.len(),
            tool_invocations,
            "Book image processed"
        );

        Ok(WebhookAck {
            message: acknowledgement(&validated.subject),
            book,
            tool_invocations,
        })
    }
}

pub fn acknowledgement(subject: &str) -> String {
    format!("Detected change in Cloud Storage bucket: (ce-subject) : {}", subject)
}
