use async_trait::async_trait;
use pipeline_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::{context_keys, load_document};
use crate::error::PipelineError;
use crate::negotiation::{AvailabilityNegotiator, NegotiationError};

pub struct NegotiateAvailabilityTask {
    negotiator: AvailabilityNegotiator,
}

impl NegotiateAvailabilityTask {
    pub fn new(negotiator: AvailabilityNegotiator) -> Self {
        Self { negotiator }
    }
}

#[async_trait]
impl Task for NegotiateAvailabilityTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let mut document = load_document(&context)?;
        let book = document
            .book_info()
            .ok_or_else(|| PipelineError::Internal("book info missing before negotiation".to_string()))?;
        let summary = document.summary.clone().unwrap_or_default();

        let outcome = self
            .negotiator
            .negotiate(&book, &summary)
            .await
            .map_err(|e| match e {
                NegotiationError::Model(message) => PipelineError::Negotiation(message),
                NegotiationError::Exhausted {
                    tool_invocations,
                    last_response,
                } => PipelineError::NegotiationExhausted {
                    tool_invocations,
                    last_response,
                },
            })?;

        info!(
            title = %book.title,
            tool_invocations = outcome.tool_invocations,
            "Availability note ready"
        );

        document.availability_note = Some(outcome.note);
        context.set(context_keys::DOCUMENT, document).await?;
        context
            .set(context_keys::TOOL_INVOCATIONS, outcome.tool_invocations)
            .await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!(
                "Availability settled after {} tool calls",
                outcome.tool_invocations
            )),
        ))
    }
}
