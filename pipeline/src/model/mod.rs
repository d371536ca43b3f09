//! The language model used for repair.

pub mod ollama;

use std::time::Duration;

/// Generates a completion for a prompt. Calls block and are bounded by the implementation's
/// timeout.
pub trait LanguageModel {
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

impl<T> LanguageModel for &T
where
    T: LanguageModel + ?Sized,
{
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        (*self).generate(prompt)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not reach model server: {0}")]
    Transport(String),
    #[error("model server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response from model server: {0}")]
    InvalidResponse(String),
}
