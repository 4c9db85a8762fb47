use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{AppConfig, ImageDelivery};
use crate::extraction::ImageModel;
use crate::negotiation::{ChatMessage, ChatModel, ChatRequest, ChatTurn, ToolCallRequest};

/// OpenRouter (OpenAI-compatible) client used for both the multimodal extraction call
/// and the tool-calling chat
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
    vision_model: String,
    chat_model: String,
    image_base_url: String,
    image_delivery: ImageDelivery,
    default_bucket: Option<String>,
}

impl OpenRouterClient {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key()?.to_string(),
            base_url: config.models.base_url.trim_end_matches('/').to_string(),
            vision_model: config.models.vision_model.clone(),
            chat_model: config.models.chat_model.clone(),
            image_base_url: config.models.image_base_url.trim_end_matches('/').to_string(),
            image_delivery: config.models.image_delivery,
            default_bucket: config.models.default_bucket.clone(),
        })
    }

    async fn image_content(&self, bucket: &str, file_name: &str) -> anyhow::Result<Value> {
        let url = object_url(&self.image_base_url, bucket, file_name);

        let image_url = match self.image_delivery {
            ImageDelivery::Url => url,
            ImageDelivery::Inline => {
                let response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to download {}", url))?;
                if !response.status().is_success() {
                    return Err(anyhow!(
                        "Object download failed for {}: {}",
                        url,
                        response.status()
                    ));
                }
                let bytes = response.bytes().await?;
                let data_url = to_data_url(&bytes)?;
                debug!(url = %url, bytes = bytes.len(), "Inlined image for model call");
                data_url
            }
        };

        Ok(json!({
            "type": "image_url",
            "image_url": { "url": image_url }
        }))
    }

    async fn call_chat_completions(&self, payload: Value) -> anyhow::Result<Value> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API request failed: {} {}", status, body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ImageModel for OpenRouterClient {
    async fn prompt_on_image(
        &self,
        prompt: &str,
        bucket: Option<&str>,
        file_name: &str,
    ) -> anyhow::Result<String> {
        let bucket = resolve_bucket(bucket, self.default_bucket.as_deref(), file_name)?;

        info!(model = %self.vision_model, bucket = %bucket, file_name = %file_name, "Prompting on image");

        let payload = json!({
            "model": self.vision_model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        self.image_content(bucket, file_name).await?
                    ]
                }
            ],
            "max_tokens": 500
        });

        let response = self.call_chat_completions(payload).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    async fn complete(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatTurn> {
        let mut messages = vec![json!({ "role": "system", "content": request.system })];
        messages.extend(request.messages.iter().map(to_openai_message));

        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|definition| json!({ "type": "function", "function": definition }))
            .collect();

        let mut payload = json!({
            "model": self.chat_model,
            "messages": messages,
            "max_tokens": 1000
        });
        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools);
            payload["tool_choice"] = json!("auto");
        }

        let response = self.call_chat_completions(payload).await?;
        parse_chat_turn(&response)
    }
}

/// Bucket named by the notification, else the configured default
fn resolve_bucket<'a>(
    bucket: Option<&'a str>,
    default_bucket: Option<&'a str>,
    file_name: &str,
) -> anyhow::Result<&'a str> {
    bucket
        .filter(|b| !b.trim().is_empty())
        .or(default_bucket)
        .ok_or_else(|| anyhow!("No bucket given for {} and no default bucket configured", file_name))
}

/// Public URL of a stored object; path segments of the object name are kept
fn object_url(base_url: &str, bucket: &str, file_name: &str) -> String {
    let object = file_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}/{}", base_url, urlencoding::encode(bucket), object)
}

/// Encode image bytes as a data URL, detecting the format from the content
fn to_data_url(bytes: &[u8]) -> anyhow::Result<String> {
    let format = image::guess_format(bytes).context("Object is not a recognised image")?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        STANDARD.encode(bytes)
    ))
}

fn to_openai_message(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::User { content } => json!({ "role": "user", "content": content }),
        ChatMessage::ToolCall { request, text } => json!({
            "role": "assistant",
            "content": text,
            "tool_calls": [{
                "id": request.id,
                "type": "function",
                "function": {
                    "name": request.name,
                    "arguments": request.arguments.to_string()
                }
            }]
        }),
        ChatMessage::ToolResult {
            call_id,
            name,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "name": name,
            "content": content
        }),
    }
}

/// Read the first choice of a chat completion as either a tool request or a final answer
fn parse_chat_turn(response: &Value) -> anyhow::Result<ChatTurn> {
    let message = &response["choices"][0]["message"];
    if message.is_null() {
        return Err(anyhow!("Invalid response format from LLM: no message"));
    }

    let text = message["content"]
        .as_str()
        .map(String::from)
        .filter(|t| !t.trim().is_empty());

    if let Some(call) = message["tool_calls"].as_array().and_then(|calls| calls.first()) {
        let name = call["function"]["name"]
            .as_str()
            .ok_or_else(|| anyhow!("Tool call without a function name"))?;
        let raw_arguments = &call["function"]["arguments"];
        // Arguments arrive as a JSON-encoded string; anything unparsable is passed on
        // as-is and rejected by the tool's schema check.
        let arguments = match raw_arguments.as_str() {
            Some(encoded) => serde_json::from_str(encoded)
                .unwrap_or_else(|_| Value::String(encoded.to_string())),
            None => raw_arguments.clone(),
        };

        return Ok(ChatTurn::ToolCall {
            request: ToolCallRequest {
                id: call["id"].as_str().unwrap_or(name).to_string(),
                name: name.to_string(),
                arguments,
            },
            text,
        });
    }

    text.map(ChatTurn::Final)
        .ok_or_else(|| anyhow!("Invalid response format from LLM: no content"))
}
