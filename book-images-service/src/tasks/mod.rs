// Book image workflow tasks
pub mod extract_book;
pub mod lookup_summary;
pub mod negotiate_availability;
pub mod persist_record;

pub use extract_book::ExtractBookTask;
pub use lookup_summary::LookupSummaryTask;
pub use negotiate_availability::NegotiateAvailabilityTask;
pub use persist_record::PersistRecordTask;

use pipeline_flow::{Context, Result};

use crate::error::PipelineError;
use crate::models::BookDocument;

/// Keys of the per-invocation workflow context
pub mod context_keys {
    /// `ValidatedEvent` the workflow was started with
    pub const EVENT: &str = "event";
    /// `BookDocument` being filled in
    pub const DOCUMENT: &str = "document";
    /// `PersistedBook` once the store acknowledged the write
    pub const PERSISTED: &str = "persisted";
    pub const TOOL_INVOCATIONS: &str = "tool_invocations";
}

pub(crate) fn load_document(context: &Context) -> Result<BookDocument> {
    context
        .get_sync(context_keys::DOCUMENT)
        .ok_or_else(|| PipelineError::Internal("book document not found in context".to_string()).into())
}
