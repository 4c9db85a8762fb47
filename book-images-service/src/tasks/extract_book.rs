use async_trait::async_trait;
use pipeline_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::context_keys;
use crate::error::PipelineError;
use crate::extraction::ImageExtractionClient;
use crate::models::{BookDocument, ValidatedEvent};

/// Reads title and author off the uploaded cover and starts the book document
pub struct ExtractBookTask {
    client: ImageExtractionClient,
}

impl ExtractBookTask {
    pub fn new(client: ImageExtractionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for ExtractBookTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let event: ValidatedEvent = context
            .get(context_keys::EVENT)
            .await
            .ok_or_else(|| PipelineError::Internal("validated event not found in context".to_string()))?;

        let book = self
            .client
            .extract(event.bucket_name.as_deref(), &event.file_name)
            .await
            .map_err(|e| PipelineError::Extraction(e.to_string()))?;

        let mut document = BookDocument::new(&event.file_name);
        document.title = Some(book.title.clone());
        document.author = Some(book.author.clone());
        context.set(context_keys::DOCUMENT, document).await?;

        info!(title = %book.title, author = %book.author, "Book document started");
        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!("Extracted '{}' by {}", book.title, book.author)),
        ))
    }
}
