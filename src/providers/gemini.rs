//! Gemini `generateContent` client
//!
//! Serves both text generation and the Gemini TTS model, which returns
//! base64 audio in `inlineData` parts.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::{SpeechSynthesizer, SynthesizedAudio, TextGenerator, http_client, snippet};
use crate::config::GeminiConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    tts_model: String,
    voice_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: Vec<&'a str>,
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateResponse {
    /// Reason the prompt or the answer was withheld, if any
    fn blocked(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Some(reason);
        }
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|reason| matches!(*reason, "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT"))
            .map(str::to_string)
    }

    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_seconds))?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            tts_model: config.tts_model.clone(),
            voice_name: config.voice_name.clone(),
        })
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(
        &self,
        model: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerateResponse, String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("request to {model} failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model, %status, body = %snippet(&body), "Gemini request rejected");
            return Err(format!("{model} returned {status}"));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| format!("malformed {model} response: {e}"))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, AppError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: None,
        };

        let response = self
            .call(&self.text_model, &request)
            .await
            .map_err(AppError::Generation)?;

        if let Some(reason) = response.blocked() {
            return Err(AppError::Generation(format!("content blocked: {reason}")));
        }

        let text: String = response
            .parts()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(AppError::Generation("empty response".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(
        &self,
        setup: &str,
        punchline: &str,
    ) -> Result<SynthesizedAudio, AppError> {
        let prompt = format!(
            "Read this joke aloud. A woman asks the setup and a kid answers with the \
             punchline after a short pause.\nWOMAN: {setup}\nKID: {punchline}"
        );
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: &prompt }],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &self.voice_name,
                        },
                    },
                },
            }),
        };

        let response = self
            .call(&self.tts_model, &request)
            .await
            .map_err(AppError::Synthesis)?;

        if let Some(reason) = response.blocked() {
            return Err(AppError::Synthesis(format!("content blocked: {reason}")));
        }

        let inline = response
            .parts()
            .find_map(|part| part.inline_data.as_ref())
            .ok_or_else(|| AppError::Synthesis("no audio in response".to_string()))?;

        let bytes = general_purpose::STANDARD
            .decode(inline.data.trim())
            .map_err(|e| AppError::Synthesis(format!("invalid audio payload: {e}")))?;

        Ok(SynthesizedAudio {
            bytes,
            content_type: inline.mime_type.clone(),
        })
    }
}
