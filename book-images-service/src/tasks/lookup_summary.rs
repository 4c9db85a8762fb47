use async_trait::async_trait;
use pipeline_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info};

use super::{context_keys, load_document};
use crate::error::PipelineError;
use crate::summary::SummaryLookup;

pub struct LookupSummaryTask {
    summaries: Arc<dyn SummaryLookup>,
}

impl LookupSummaryTask {
    pub fn new(summaries: Arc<dyn SummaryLookup>) -> Self {
        Self { summaries }
    }
}

#[async_trait]
impl Task for LookupSummaryTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let mut document = load_document(&context)?;
        let title = document
            .title
            .clone()
            .ok_or_else(|| PipelineError::Internal("title missing before summary lookup".to_string()))?;

        let summary = self.summaries.summary_for(&title).await.map_err(|e| {
            error!(title = %title, error = %e, "Summary lookup failed");
            PipelineError::SummaryLookup(e.to_string())
        })?;

        if summary.is_empty() {
            info!(title = %title, "No summary found");
        } else {
            info!(title = %title, summary_length = summary.len(), "Summary found");
        }

        document.summary = Some(summary);
        context.set(context_keys::DOCUMENT, document).await?;

        Ok(TaskResult::new(None, NextAction::ContinueAndExecute))
    }
}
