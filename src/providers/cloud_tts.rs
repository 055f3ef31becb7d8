//! Google Cloud Text-to-Speech client
//!
//! Setup and punchline are rendered with different voices and joined
//! into one MP3 stream.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::{SpeechSynthesizer, SynthesizedAudio, http_client, snippet};
use crate::config::CloudTtsConfig;
use crate::error::AppError;

const SETUP_PITCH: f64 = 0.0;
const SETUP_SPEAKING_RATE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct CloudTtsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    language_code: String,
    setup_voice: String,
    punchline_voice: String,
    punchline_pitch: f64,
    punchline_speaking_rate: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    pitch: f64,
    speaking_rate: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

impl CloudTtsClient {
    pub fn new(config: &CloudTtsConfig, timeout: Duration) -> Result<Self, AppError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Config("tts.cloud.api_key is not set".to_string()))?;

        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language_code: config.language_code.clone(),
            setup_voice: config.setup_voice.clone(),
            punchline_voice: config.punchline_voice.clone(),
            punchline_pitch: config.punchline_pitch,
            punchline_speaking_rate: config.punchline_speaking_rate,
        })
    }

    async fn synthesize_line(
        &self,
        text: &str,
        voice: &str,
        pitch: f64,
        speaking_rate: f64,
    ) -> Result<Vec<u8>, AppError> {
        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.language_code,
                name: voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                pitch,
                speaking_rate,
            },
        };

        let response = self
            .client
            .post(format!("{}/text:synthesize", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Synthesis(format!("text-to-speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, voice, body = %snippet(&body), "Text-to-speech request rejected");
            return Err(AppError::Synthesis(format!(
                "text-to-speech returned {status}"
            )));
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Synthesis(format!("malformed text-to-speech response: {e}")))?;

        general_purpose::STANDARD
            .decode(body.audio_content.trim())
            .map_err(|e| AppError::Synthesis(format!("invalid audio payload: {e}")))
    }
}

#[async_trait]
impl SpeechSynthesizer for CloudTtsClient {
    async fn synthesize(
        &self,
        setup: &str,
        punchline: &str,
    ) -> Result<SynthesizedAudio, AppError> {
        let (setup_audio, punchline_audio) = tokio::try_join!(
            self.synthesize_line(setup, &self.setup_voice, SETUP_PITCH, SETUP_SPEAKING_RATE),
            self.synthesize_line(
                punchline,
                &self.punchline_voice,
                self.punchline_pitch,
                self.punchline_speaking_rate,
            ),
        )?;

        // MP3 streams concatenate frame by frame
        let mut bytes = setup_audio;
        bytes.extend_from_slice(&punchline_audio);

        Ok(SynthesizedAudio {
            bytes,
            content_type: "audio/mpeg".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> CloudTtsClient {
        let mut config = crate::config::test_config().tts.cloud;
        config.api_key = Some("cloud-key".to_string());
        config.base_url = base_url.to_string();
        CloudTtsClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = crate::config::test_config().tts.cloud;
        let error = CloudTtsClient::new(&config, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(error, AppError::Config(_)));
    }

    #[tokio::test]
    async fn synthesize_concatenates_setup_then_punchline() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/text:synthesize"))
            .and(query_param("key", "cloud-key"))
            .and(body_partial_json(serde_json::json!({
                "voice": {"name": "en-US-Neural2-F"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "audioContent": general_purpose::STANDARD.encode([1u8, 1, 1])
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/text:synthesize"))
            .and(body_partial_json(serde_json::json!({
                "voice": {"name": "en-US-Neural2-J"},
                "audioConfig": {"pitch": 4.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "audioContent": general_purpose::STANDARD.encode([2u8, 2])
            })))
            .expect(1)
            .mount(&server)
            .await;

        let audio = test_client(&server.uri())
            .synthesize("Why?", "Because.")
            .await
            .unwrap();
        assert_eq!(audio.bytes, vec![1, 1, 1, 2, 2]);
        assert_eq!(audio.content_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn provider_error_is_a_synthesis_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let error = test_client(&server.uri())
            .synthesize("Why?", "Because.")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Synthesis(msg) if msg.contains("403")));
    }
}
