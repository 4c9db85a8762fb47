use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::ExtractedBookInfo;

/// Multimodal model that answers a text prompt about one stored image
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn prompt_on_image(
        &self,
        prompt: &str,
        bucket: Option<&str>,
        file_name: &str,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("multimodal model call failed: {0}")]
    Upstream(String),

    #[error("could not parse model response as JSON: {reason}")]
    Unparsable { reason: String },

    #[error("model response has no {0}")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct BookInfoResponse {
    title: Option<String>,
    author: Option<String>,
}

/// Reads title and author off a book cover image with a single model call
pub struct ImageExtractionClient {
    model: Arc<dyn ImageModel>,
    prompt: String,
}

impl ImageExtractionClient {
    pub fn new(model: Arc<dyn ImageModel>, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
        }
    }

    /// Calls the model exactly once. Upstream failures and unusable responses are both
    /// errors; no partially filled result is ever returned.
    pub async fn extract(
        &self,
        bucket: Option<&str>,
        file_name: &str,
    ) -> Result<ExtractedBookInfo, ExtractionError> {
        info!(file_name = %file_name, bucket = ?bucket, "Extracting book info from image");

        let raw = self
            .model
            .prompt_on_image(&self.prompt, bucket, file_name)
            .await
            .map_err(|e| {
                error!(file_name = %file_name, error = %e, "Multimodal model call failed");
                ExtractionError::Upstream(e.to_string())
            })?;

        let book = parse_book_info(&raw).inspect_err(|e| {
            warn!(file_name = %file_name, error = %e, raw = %raw, "Unusable extraction response");
        })?;

        info!(title = %book.title, author = %book.author, "Book info extracted");
        Ok(book)
    }
}

/// Parse the model's answer into title and author.
///
/// Accepts a bare JSON object, one wrapped in a Markdown code fence, or one embedded in
/// surrounding prose.
pub fn parse_book_info(raw: &str) -> Result<ExtractedBookInfo, ExtractionError> {
    let trimmed = raw.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    let parsed = match serde_json::from_str::<BookInfoResponse>(cleaned) {
        Ok(parsed) => parsed,
        Err(first_error) => {
            let embedded = match (cleaned.find('{'), cleaned.rfind('}')) {
                (Some(start), Some(end)) if start < end => &cleaned[start..=end],
                _ => {
                    return Err(ExtractionError::Unparsable {
                        reason: first_error.to_string(),
                    });
                }
            };
            serde_json::from_str::<BookInfoResponse>(embedded).map_err(|e| {
                ExtractionError::Unparsable {
                    reason: e.to_string(),
                }
            })?
        }
    };

    let title = non_empty(parsed.title).ok_or(ExtractionError::MissingField("title"))?;
    let author = non_empty(parsed.author).ok_or(ExtractionError::MissingField("author"))?;

    Ok(ExtractedBookInfo { title, author })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
