use pipeline_flow::{Graph, GraphBuilder, Task};
use std::sync::Arc;

use crate::extraction::ImageExtractionClient;
use crate::negotiation::AvailabilityNegotiator;
use crate::persistence::PersistenceSink;
use crate::summary::SummaryLookup;
use crate::tasks::{ExtractBookTask, LookupSummaryTask, NegotiateAvailabilityTask, PersistRecordTask};

pub const WORKFLOW_ID: &str = "book_images";

/// Linear workflow: extract -> summary -> availability -> persist
pub fn build_book_workflow(
    extraction: ImageExtractionClient,
    summaries: Arc<dyn SummaryLookup>,
    negotiator: AvailabilityNegotiator,
    sink: PersistenceSink,
) -> Graph {
    let extract: Arc<dyn Task> = Arc::new(ExtractBookTask::new(extraction));
    let summary: Arc<dyn Task> = Arc::new(LookupSummaryTask::new(summaries));
    let negotiate: Arc<dyn Task> = Arc::new(NegotiateAvailabilityTask::new(negotiator));
    let persist: Arc<dyn Task> = Arc::new(PersistRecordTask::new(sink));

    let extract_id = extract.id().to_string();
    let summary_id = summary.id().to_string();
    let negotiate_id = negotiate.id().to_string();
    let persist_id = persist.id().to_string();

    GraphBuilder::new(WORKFLOW_ID)
        .add_task(extract)
        .add_task(summary)
        .add_task(negotiate)
        .add_task(persist)
        .add_edge(extract_id.clone(), summary_id.clone())
        .add_edge(summary_id, negotiate_id.clone())
        .add_edge(negotiate_id, persist_id)
        .set_start_task(extract_id)
        .build()
}
