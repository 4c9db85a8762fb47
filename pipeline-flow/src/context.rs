use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{GraphError, Result};

/// Context for sharing data between the tasks of one graph execution.
///
/// A context is created per execution and dropped with it, so nothing stored here
/// outlives the request that produced it.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            GraphError::ContextError(format!("Failed to serialize value for '{}': {}", key, e))
        })?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    /// Synchronous read, usable from edge conditions and non-async helpers
    pub fn get_sync<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Book {
        title: String,
        pages: u32,
    }

    #[tokio::test]
    async fn stores_and_reads_typed_values() {
        let context = Context::new();
        context
            .set(
                "book",
                Book {
                    title: "Dune".to_string(),
                    pages: 412,
                },
            )
            .await
            .unwrap();

        let book: Book = context.get("book").await.unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.pages, 412);
        assert!(context.contains_key("book"));
    }

    #[tokio::test]
    async fn wrong_type_reads_as_missing() {
        let context = Context::new();
        context.set("count", 3u32).await.unwrap();

        let as_string: Option<String> = context.get("count").await;
        assert!(as_string.is_none());
    }

    #[tokio::test]
    async fn clones_share_the_same_data() {
        let context = Context::new();
        let other = context.clone();
        other.set("file_name", "book1.jpg").await.unwrap();

        let name: String = context.get_sync("file_name").unwrap();
        assert_eq!(name, "book1.jpg");

        assert!(context.remove("file_name").await.is_some());
        assert!(!other.contains_key("file_name"));
    }
}
