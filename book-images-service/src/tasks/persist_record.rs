use async_trait::async_trait;
use pipeline_flow::{Context, NextAction, Result, Task, TaskResult};

use super::{context_keys, load_document};
use crate::error::PipelineError;
use crate::models::{ConsolidatedRecord, PersistedBook};
use crate::persistence::PersistenceSink;

/// Last stage: writes the consolidated record and waits for the store to acknowledge it
pub struct PersistRecordTask {
    sink: PersistenceSink,
}

impl PersistRecordTask {
    pub fn new(sink: PersistenceSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Task for PersistRecordTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let document = load_document(&context)?;
        let record = ConsolidatedRecord::try_from(document).map_err(PipelineError::Internal)?;

        let ack = self
            .sink
            .persist(record.clone())
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let persisted = PersistedBook::from_record(record, ack);
        context.set(context_keys::PERSISTED, &persisted).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some(format!("Stored record for {}", persisted.file_name)),
        ))
    }
}
