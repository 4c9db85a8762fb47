//! Tools the chat model may call during a negotiation.

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const AVAILABILITY_TOOL: &str = "bookStoreAvailability";

const IN_STOCK: &str = "The book is available for purchase in the book store in paperback format.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub title: String,
    pub author: String,
    pub availability: String,
}

#[derive(Debug, Error)]
#[error("Book store availability error")]
pub struct AvailabilityError;

/// Answers whether the university book store carries a book.
///
/// The answer depends only on the arguments and the call has no side effects, so the
/// model can repeat it as often as it likes within a negotiation.
#[derive(Debug, Clone, Default)]
pub struct BookStoreAvailability;

impl Tool for BookStoreAvailability {
    const NAME: &'static str = AVAILABILITY_TOOL;
    type Error = AvailabilityError;
    type Args = AvailabilityRequest;
    type Output = AvailabilityResponse;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Get availability of book in the book store".to_string(),
            parameters: json!({
                "type": "object",
                "description": "BookStore API Request",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "The title of the book"
                    },
                    "author": {
                        "type": "string",
                        "description": "The author of the book"
                    }
                },
                "required": ["title", "author"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!(title = %args.title, author = %args.author, "Book store availability request");
        Ok(AvailabilityResponse {
            title: args.title,
            author: args.author,
            availability: IN_STOCK.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool {tool} failed: {reason}")]
    Failed { tool: String, reason: String },
}

/// Type-erased tool that takes and returns JSON
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn definition(&self) -> ToolDefinition;
    async fn call_json(&self, arguments: Value) -> Result<Value, ToolCallError>;
}

struct TypedTool<T>(T);

#[async_trait]
impl<T> ToolHandler for TypedTool<T>
where
    T: Tool + 'static,
{
    fn name(&self) -> &str {
        T::NAME
    }

    async fn definition(&self) -> ToolDefinition {
        self.0.definition(String::new()).await
    }

    async fn call_json(&self, arguments: Value) -> Result<Value, ToolCallError> {
        let args: T::Args =
            serde_json::from_value(arguments).map_err(|e| ToolCallError::InvalidArguments {
                tool: T::NAME.to_string(),
                reason: e.to_string(),
            })?;

        let output = self
            .0
            .call(args)
            .await
            .map_err(|e| ToolCallError::Failed {
                tool: T::NAME.to_string(),
                reason: e.to_string(),
            })?;

        serde_json::to_value(output).map_err(|e| ToolCallError::Failed {
            tool: T::NAME.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Tools registered by name, each with the schema handed to the model
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.tools.insert(T::NAME.to_string(), Arc::new(TypedTool(tool)));
        self
    }

    /// Schemas of all registered tools, ordered by name
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = Vec::with_capacity(self.tools.len());
        for handler in self.tools.values() {
            definitions.push(handler.definition().await);
        }
        definitions
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolCallError> {
        let handler = self
            .tools
            .get(name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;
        handler.call_json(arguments).await
    }
}
