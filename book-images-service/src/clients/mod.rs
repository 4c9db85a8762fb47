//! Production model clients.

pub mod openrouter;

pub use openrouter::OpenRouterClient;
