use async_trait::async_trait;
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use sqlx::PgPool;
use tracing::{debug, info};

/// Resolves a short summary for a book title.
///
/// A title that is not known yields an empty summary, not an error; only a failing
/// collaborator is an error.
#[async_trait]
pub trait SummaryLookup: Send + Sync {
    async fn summary_for(&self, title: &str) -> anyhow::Result<String>;
}

/// Reads summaries from the `books` table, matching titles case-insensitively
pub struct PostgresSummaryLookup {
    pool: PgPool,
}

impl PostgresSummaryLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryLookup for PostgresSummaryLookup {
    async fn summary_for(&self, title: &str) -> anyhow::Result<String> {
        let summary = sqlx::query_scalar::<_, Option<String>>(
            "SELECT summary FROM books WHERE lower(title) = lower($1) LIMIT 1",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .unwrap_or_default();

        debug!(title = %title, found = !summary.is_empty(), "Summary looked up in database");
        Ok(summary)
    }
}

const SUMMARY_PREAMBLE: &str = "You are a librarian. Given a book title, reply with a summary \
of the book in at most three sentences. If you do not know the book, reply with exactly NONE.";

const UNKNOWN_BOOK: &str = "NONE";

/// Asks a chat model for the summary
pub struct ModelSummaryLookup {
    client: openrouter::Client,
    model: String,
}

impl ModelSummaryLookup {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            model: model.into(),
        }
    }
}

#[async_trait]
impl SummaryLookup for ModelSummaryLookup {
    async fn summary_for(&self, title: &str) -> anyhow::Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(SUMMARY_PREAMBLE)
            .build();

        let response = agent.prompt(format!("Book title: {}", title)).await?;
        let summary = normalize_model_summary(&response);

        info!(title = %title, found = !summary.is_empty(), "Summary generated by model");
        Ok(summary)
    }
}

fn normalize_model_summary(response: &str) -> String {
    let trimmed = response.trim();
    if trimmed.eq_ignore_ascii_case(UNKNOWN_BOOK) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_books_get_an_empty_summary() {
        assert_eq!(normalize_model_summary("NONE"), "");
        assert_eq!(normalize_model_summary("  none\n"), "");
    }

    #[test]
    fn model_summaries_are_trimmed() {
        assert_eq!(
            normalize_model_summary("\nA duke's son survives on a desert planet.  "),
            "A duke's son survives on a desert planet."
        );
    }
}
