//! AI collaborators
//!
//! Text generation goes through the [`TextGenerator`] trait so the advisor
//! can run against Groq in production, a mock in tests, or nothing at all.
//! When no generator is configured, or a call fails, the advisor answers
//! with labelled deterministic text instead.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ApiError;

pub mod advisor;
pub mod groq;
pub mod ocr;
mod prompts;

pub use advisor::{AiAdvisor, Narrative};
pub use groq::{GroqClient, GroqConfig};
pub use ocr::{OcrSpaceClient, OcrSpaceConfig};

/// Errors from AI and OCR collaborators
#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Empty response from AI service")]
    EmptyResponse,

    #[error("OCR failed: {0}")]
    Ocr(String),
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::NotConfigured(what) => {
                ApiError::ServiceUnavailable(format!("{} is not configured", what))
            }
            AiError::Ocr(msg) => ApiError::UnprocessableEntity(format!("OCR extraction failed: {}", msg)),
            other => ApiError::ExternalServiceError(other.to_string()),
        }
    }
}

/// Chat-style text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a system prompt and a user prompt
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}
