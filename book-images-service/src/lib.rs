//! Webhook service that turns uploaded book cover images into enriched book records.
//!
//! A storage notification names an image; the service reads title and author off the
//! cover, looks up a summary, asks a chat model (with a book store tool) for an
//! availability note and stores the consolidated record.

pub mod clients;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod negotiation;
pub mod orchestrator;
pub mod persistence;
pub mod service;
pub mod summary;
pub mod tasks;
pub mod validation;
pub mod workflow;

pub use config::AppConfig;
pub use error::{PipelineError, ValidationError};
pub use orchestrator::{BookImageProcessor, Collaborators};
pub use service::{AppState, build_router, create_app};
