//! Service configuration, loaded once at start-up.
//!
//! Values come from an optional `book-images.toml` next to the binary and from
//! `BOOK_IMAGES__<SECTION>__<KEY>` environment variables, e.g.
//! `BOOK_IMAGES__SERVER__PORT=8080` or
//! `BOOK_IMAGES__WEBHOOK__REQUIRED_HEADERS=ce-id,ce-source`.

use anyhow::Context as _;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_IMAGE_PROMPT: &str = r#"You are looking at the front cover of a book.
Extract the book title and the author name from the image.
Respond only with JSON of the form {"title": "...", "author": "..."}.
Do not mix text and JSON in your response."#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// CloudEvents headers every notification must carry
    #[serde(default = "default_required_headers")]
    pub required_headers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Falls back to `OPENROUTER_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Public object-storage endpoint images are served from
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    #[serde(default)]
    pub image_delivery: ImageDelivery,
    /// Used when a notification carries no bucket
    #[serde(default)]
    pub default_bucket: Option<String>,
}

/// How the image reaches the multimodal model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDelivery {
    /// Send the object URL and let the provider fetch it
    #[default]
    Url,
    /// Download the object and embed it as a base64 data URL
    Inline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_image_prompt")]
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Falls back to `DATABASE_URL`; without either, records are kept in memory
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub source: SummarySource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// `books` table in the configured database
    #[default]
    Database,
    /// Ask the chat model for a short summary
    Model,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_required_headers() -> Vec<String> {
    ["ce-id", "ce-source", "ce-type", "ce-specversion"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_vision_model() -> String {
    "openai/gpt-4.1-mini".to_string()
}

fn default_chat_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_image_base_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_image_prompt() -> String {
    DEFAULT_IMAGE_PROMPT.to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            required_headers: default_required_headers(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            vision_model: default_vision_model(),
            chat_model: default_chat_model(),
            request_timeout_secs: default_timeout_secs(),
            image_base_url: default_image_base_url(),
            image_delivery: ImageDelivery::default(),
            default_bucket: None,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            image: default_image_prompt(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `book-images.toml` and the environment
    pub fn load() -> anyhow::Result<Self> {
        let mut config: AppConfig = Config::builder()
            .add_source(File::with_name("book-images").required(false))
            .add_source(
                Environment::with_prefix("BOOK_IMAGES")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("webhook.required_headers")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build config")?
            .try_deserialize()
            .context("Failed to deserialize config")?;

        if config.models.api_key.is_none() {
            config.models.api_key = std::env::var("OPENROUTER_API_KEY").ok();
        }
        if config.storage.database_url.is_none() {
            config.storage.database_url = std::env::var("DATABASE_URL").ok();
        }

        config.webhook.required_headers = config
            .webhook
            .required_headers
            .iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.models.request_timeout_secs)
    }

    pub fn api_key(&self) -> anyhow::Result<&str> {
        self.models
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY not set"))
    }
}
