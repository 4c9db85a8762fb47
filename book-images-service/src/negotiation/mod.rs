//! Bounded tool-calling conversation that settles book store availability.
//!
//! The negotiation is a small state machine:
//!
//! ```text
//! Init -> ModelCall -> { ToolRequested -> ToolExec -> ModelCall }* -> Final
//! ```
//!
//! Every model turn either ends the conversation with a final note or asks for a tool.
//! Requested tools are run in order and their results are appended to the conversation
//! before the model is called again. At most [`MAX_TOOL_INVOCATIONS`] tools run; a
//! model that asks for one more ends the negotiation with
//! [`NegotiationError::Exhausted`].

pub mod chat;
pub mod tools;

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use chat::{ChatMessage, ChatModel, ChatRequest, ChatTurn, ToolCallRequest};
pub use tools::{BookStoreAvailability, ToolRegistry, AVAILABILITY_TOOL};

use crate::models::ExtractedBookInfo;

pub const MAX_TOOL_INVOCATIONS: u32 = 3;

pub const SYSTEM_INSTRUCTION: &str = "Use Multi-turn function calling.
Answer with precision.
If the information was not fetched call the function again. Repeat at most 3 times.";

const NO_SUMMARY: &str = "No summary is available for this book.";

#[derive(Debug, Clone, PartialEq)]
enum NegotiationState {
    Init,
    ModelCall,
    ToolRequested {
        request: ToolCallRequest,
        text: Option<String>,
    },
    ToolExec(ToolCallRequest),
    Final(String),
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("chat model call failed: {0}")]
    Model(String),

    #[error("no final answer after {tool_invocations} tool calls")]
    Exhausted {
        tool_invocations: u32,
        last_response: Option<String>,
    },
}

/// Final note produced by a negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityNote {
    pub note: String,
    pub tool_invocations: u32,
}

pub struct AvailabilityNegotiator {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
}

impl AvailabilityNegotiator {
    /// Negotiator with the book store availability tool registered
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self::with_tools(model, ToolRegistry::new().register(BookStoreAvailability))
    }

    pub fn with_tools(model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self { model, tools }
    }

    pub async fn negotiate(
        &self,
        book: &ExtractedBookInfo,
        summary: &str,
    ) -> Result<AvailabilityNote, NegotiationError> {
        let definitions = self.tools.definitions().await;
        let mut conversation: Vec<ChatMessage> = Vec::new();
        let mut tool_invocations = 0u32;
        let mut last_response: Option<String> = None;
        let mut state = NegotiationState::Init;

        loop {
            state = match state {
                NegotiationState::Init => {
                    conversation.push(ChatMessage::user(user_instruction(book, summary)));
                    NegotiationState::ModelCall
                }
                NegotiationState::ModelCall => {
                    let request = ChatRequest {
                        system: SYSTEM_INSTRUCTION,
                        messages: &conversation,
                        tools: &definitions,
                    };
                    let turn = self
                        .model
                        .complete(request)
                        .await
                        .map_err(|e| NegotiationError::Model(e.to_string()))?;

                    match turn {
                        ChatTurn::Final(text) if text.trim().is_empty() => {
                            return Err(NegotiationError::Model(
                                "model returned an empty final answer".to_string(),
                            ));
                        }
                        ChatTurn::Final(text) => NegotiationState::Final(text),
                        ChatTurn::ToolCall { request, text } => {
                            let text = text.filter(|t| !t.trim().is_empty());
                            if text.is_some() {
                                last_response = text.clone();
                            }
                            NegotiationState::ToolRequested { request, text }
                        }
                    }
                }
                NegotiationState::ToolRequested { request, text } => {
                    if tool_invocations >= MAX_TOOL_INVOCATIONS {
                        warn!(
                            tool_invocations,
                            tool = %request.name,
                            "Tool call limit reached without a final answer"
                        );
                        return Err(NegotiationError::Exhausted {
                            tool_invocations,
                            last_response,
                        });
                    }
                    conversation.push(ChatMessage::ToolCall {
                        request: request.clone(),
                        text,
                    });
                    NegotiationState::ToolExec(request)
                }
                NegotiationState::ToolExec(request) => {
                    tool_invocations += 1;
                    debug!(
                        tool = %request.name,
                        arguments = %request.arguments,
                        invocation = tool_invocations,
                        "Running requested tool"
                    );

                    let content = match self.tools.call(&request.name, request.arguments).await {
                        Ok(output) => output.to_string(),
                        Err(e) => {
                            warn!(tool = %request.name, error = %e, "Tool call rejected");
                            json!({ "error": e.to_string() }).to_string()
                        }
                    };

                    conversation.push(ChatMessage::ToolResult {
                        call_id: request.id,
                        name: request.name,
                        content,
                    });
                    NegotiationState::ModelCall
                }
                NegotiationState::Final(note) => {
                    info!(tool_invocations, note_length = note.len(), "Negotiation finished");
                    return Ok(AvailabilityNote {
                        note,
                        tool_invocations,
                    });
                }
            };
        }
    }
}

/// User turn that opens the negotiation
pub fn user_instruction(book: &ExtractedBookInfo, summary: &str) -> String {
    let summary = if summary.trim().is_empty() {
        NO_SUMMARY
    } else {
        summary
    };

    format!(
        "Write a nice note including book author, book title and availability. \
         Find out if the book with the title {} by author {} is available in the University bookstore. \
         Please add also this book summary to the response, with the text available after the colon, \
         prefix it with My Book Summary: {}",
        book.title, book.author, summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted turns and records every request it receives
    struct ScriptedChatModel {
        turns: Mutex<Vec<anyhow::Result<ChatTurn>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChatModel {
        fn new(mut turns: Vec<anyhow::Result<ChatTurn>>) -> Arc<Self> {
            turns.reverse();
            Arc::new(Self {
                turns: Mutex::new(turns),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChatModel {
        async fn complete(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatTurn> {
            assert_eq!(request.system, SYSTEM_INSTRUCTION);
            assert_eq!(request.tools.len(), 1);
            self.seen.lock().unwrap().push(request.messages.to_vec());
            self.turns
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(availability_call("extra")))
        }
    }

    fn availability_call(id: &str) -> ChatTurn {
        ChatTurn::ToolCall {
            request: ToolCallRequest {
                id: id.to_string(),
                name: AVAILABILITY_TOOL.to_string(),
                arguments: json!({ "title": "Dune", "author": "Frank Herbert" }),
            },
            text: None,
        }
    }

    fn dune() -> ExtractedBookInfo {
        ExtractedBookInfo {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
        }
    }

    #[tokio::test]
    async fn final_answer_without_tools() {
        let model = ScriptedChatModel::new(vec![Ok(ChatTurn::Final("Dune is in stock".to_string()))]);
        let negotiator = AvailabilityNegotiator::new(model.clone());

        let note = negotiator.negotiate(&dune(), "A desert planet").await.unwrap();

        assert_eq!(note.note, "Dune is in stock");
        assert_eq!(note.tool_invocations, 0);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn one_tool_call_then_final_answer() {
        let model = ScriptedChatModel::new(vec![
            Ok(availability_call("call-1")),
            Ok(ChatTurn::Final("Dune by Frank Herbert is available".to_string())),
        ]);
        let negotiator = AvailabilityNegotiator::new(model.clone());

        let note = negotiator.negotiate(&dune(), "A desert planet").await.unwrap();

        assert_eq!(note.tool_invocations, 1);
        assert_eq!(model.calls(), 2);

        let second_request = model.seen.lock().unwrap()[1].clone();
        assert_eq!(second_request.len(), 3);
        match &second_request[2] {
            ChatMessage::ToolResult {
                call_id, content, ..
            } => {
                assert_eq!(call_id, "call-1");
                assert!(content.contains("available for purchase"));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stops_after_three_tool_calls() {
        let model = ScriptedChatModel::new(vec![
            Ok(availability_call("call-1")),
            Ok(availability_call("call-2")),
            Ok(availability_call("call-3")),
            Ok(availability_call("call-4")),
        ]);
        let negotiator = AvailabilityNegotiator::new(model.clone());

        let err = negotiator.negotiate(&dune(), "").await.unwrap_err();

        match err {
            NegotiationError::Exhausted {
                tool_invocations, ..
            } => assert_eq!(tool_invocations, MAX_TOOL_INVOCATIONS),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(model.calls(), 4);

        let last_request = model.seen.lock().unwrap().last().cloned().unwrap();
        let tool_results = last_request
            .iter()
            .filter(|m| matches!(m, ChatMessage::ToolResult { .. }))
            .count();
        assert_eq!(tool_results, 3);
    }

    #[tokio::test]
    async fn exhaustion_keeps_the_last_model_text() {
        let mut turns: Vec<anyhow::Result<ChatTurn>> = (0..3)
            .map(|i| Ok(availability_call(&format!("call-{}", i))))
            .collect();
        turns.push(Ok(ChatTurn::ToolCall {
            request: ToolCallRequest {
                id: "call-4".to_string(),
                name: AVAILABILITY_TOOL.to_string(),
                arguments: json!({ "title": "Dune", "author": "Frank Herbert" }),
            },
            text: Some("Still checking the store".to_string()),
        }));
        let negotiator = AvailabilityNegotiator::new(ScriptedChatModel::new(turns));

        match negotiator.negotiate(&dune(), "").await {
            Err(NegotiationError::Exhausted { last_response, .. }) => {
                assert_eq!(last_response.as_deref(), Some("Still checking the store"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn text_sent_with_a_tool_call_stays_in_the_conversation() {
        let model = ScriptedChatModel::new(vec![
            Ok(ChatTurn::ToolCall {
                request: ToolCallRequest {
                    id: "call-1".to_string(),
                    name: AVAILABILITY_TOOL.to_string(),
                    arguments: json!({ "title": "Dune", "author": "Frank Herbert" }),
                },
                text: Some("Checking the store first.".to_string()),
            }),
            Ok(ChatTurn::Final("Dune is in stock".to_string())),
        ]);
        let negotiator = AvailabilityNegotiator::new(model.clone());

        negotiator.negotiate(&dune(), "").await.unwrap();

        let last_request = model.seen.lock().unwrap().last().cloned().unwrap();
        match &last_request[1] {
            ChatMessage::ToolCall { request, text } => {
                assert_eq!(request.id, "call-1");
                assert_eq!(text.as_deref(), Some("Checking the store first."));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn repeated_tool_calls_return_identical_results() {
        let model = ScriptedChatModel::new(vec![
            Ok(availability_call("call-1")),
            Ok(availability_call("call-2")),
            Ok(ChatTurn::Final("done".to_string())),
        ]);
        let negotiator = AvailabilityNegotiator::new(model.clone());

        negotiator.negotiate(&dune(), "summary").await.unwrap();

        let last_request = model.seen.lock().unwrap().last().cloned().unwrap();
        let results: Vec<String> = last_request
            .into_iter()
            .filter_map(|m| match m {
                ChatMessage::ToolResult { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn unknown_tool_gets_an_error_result_and_counts() {
        let model = ScriptedChatModel::new(vec![
            Ok(ChatTurn::ToolCall {
                request: ToolCallRequest {
                    id: "call-1".to_string(),
                    name: "weather".to_string(),
                    arguments: json!({}),
                },
                text: None,
            }),
            Ok(ChatTurn::Final("Sorry, only availability is known".to_string())),
        ]);
        let negotiator = AvailabilityNegotiator::new(model.clone());

        let note = negotiator.negotiate(&dune(), "").await.unwrap();
        assert_eq!(note.tool_invocations, 1);

        let last_request = model.seen.lock().unwrap().last().cloned().unwrap();
        assert!(matches!(
            &last_request[2],
            ChatMessage::ToolResult { content, .. } if content.contains("unknown tool")
        ));
    }

    #[tokio::test]
    async fn model_failure_aborts() {
        let model = ScriptedChatModel::new(vec![Err(anyhow::anyhow!("rate limited"))]);
        let negotiator = AvailabilityNegotiator::new(model);

        let err = negotiator.negotiate(&dune(), "").await.unwrap_err();
        assert!(matches!(err, NegotiationError::Model(ref m) if m.contains("rate limited")));
    }

    #[tokio::test]
    async fn blank_final_answer_is_rejected() {
        let model = ScriptedChatModel::new(vec![Ok(ChatTurn::Final("  ".to_string()))]);
        let negotiator = AvailabilityNegotiator::new(model);

        assert!(matches!(
            negotiator.negotiate(&dune(), "").await,
            Err(NegotiationError::Model(_))
        ));
    }

    #[test]
    fn instruction_embeds_book_and_summary() {
        let text = user_instruction(&dune(), "Spice and sandworms");
        assert!(text.contains("title Dune"));
        assert!(text.contains("author Frank Herbert"));
        assert!(text.ends_with("My Book Summary: Spice and sandworms"));
    }

    #[test]
    fn empty_summary_is_spelled_out() {
        let text = user_instruction(&dune(), "  ");
        assert!(text.ends_with(NO_SUMMARY));
    }
}
