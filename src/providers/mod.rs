//! External AI providers
//!
//! The service layer only sees the two traits here. HTTP clients for the
//! Gemini API and Google Cloud Text-to-Speech implement them.

mod cloud_tts;
mod gemini;

use std::sync::Arc;

use async_trait::async_trait;

pub use cloud_tts::CloudTtsClient;
pub use gemini::GeminiClient;

use crate::config::{AppConfig, TtsProvider};
use crate::error::AppError;

/// Audio returned by a speech provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Free-form text generation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one prompt and return the model's text output
    async fn generate_text(&self, prompt: &str) -> Result<String, AppError>;
}

/// Spoken rendition of a joke
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, setup: &str, punchline: &str)
    -> Result<SynthesizedAudio, AppError>;
}

/// Build the configured speech provider
pub fn speech_synthesizer(config: &AppConfig) -> Result<Arc<dyn SpeechSynthesizer>, AppError> {
    match config.tts.provider {
        TtsProvider::Gemini => Ok(Arc::new(GeminiClient::new(&config.gemini)?)),
        TtsProvider::Cloud => Ok(Arc::new(CloudTtsClient::new(
            &config.tts.cloud,
            config.provider_timeout(),
        )?)),
    }
}

fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(concat!("Jokebox/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(e.into()))
}

/// Truncate a provider error body for logs and error messages
fn snippet(body: &str) -> String {
    const MAX: usize = 300;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
