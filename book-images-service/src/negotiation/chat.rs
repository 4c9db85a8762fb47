use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the chat model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned id, echoed back with the tool result
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of the conversation sent to the chat model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User { content: String },
    /// Assistant turn that asked for a tool, with any text sent alongside
    ToolCall {
        request: ToolCallRequest,
        text: Option<String>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }
}

/// Everything the model sees on one turn
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolDefinition],
}

/// What the model answered on one turn
#[derive(Debug, Clone, PartialEq)]
pub enum ChatTurn {
    Final(String),
    ToolCall {
        request: ToolCallRequest,
        /// Text the model sent alongside the request, if any
        text: Option<String>,
    },
}

/// Chat model with function calling
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatTurn>;
}
