//! Joke audio
//!
//! Returns the stored audio URL of a joke, synthesizing and uploading it
//! on first request. Recording the new URL on the joke happens in the
//! background.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::data::{AudioMetadata, AudioUrl, DEFAULT_VOICE_ID, JokeStore};
use crate::error::AppError;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, SYNTHESIS_REQUESTS_TOTAL};
use crate::providers::{SpeechSynthesizer, SynthesizedAudio};
use crate::service::tasks::BackgroundTasks;
use crate::storage::{ObjectStore, audio_extension};

/// Anything smaller is treated as a failed synthesis
pub const MIN_AUDIO_BYTES: usize = 1024;

const CACHE_NAME: &str = "joke_audio";

pub struct AudioService {
    store: Arc<dyn JokeStore>,
    objects: Arc<dyn ObjectStore>,
    speech: Arc<dyn SpeechSynthesizer>,
    tasks: Arc<BackgroundTasks>,
    timeout: Duration,
}

impl AudioService {
    pub fn new(
        store: Arc<dyn JokeStore>,
        objects: Arc<dyn ObjectStore>,
        speech: Arc<dyn SpeechSynthesizer>,
        tasks: Arc<BackgroundTasks>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            speech,
            tasks,
            timeout,
        }
    }

    /// Public URL of the joke's default audio
    pub async fn resolve_audio(&self, joke_id: &str) -> Result<String, AppError> {
        let joke = self
            .store
            .get_joke(joke_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if let Some(url) = joke.default_audio_url {
            CACHE_HITS_TOTAL.with_label_values(&[CACHE_NAME]).inc();
            return Ok(url);
        }
        CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();

        let audio = self.synthesize(&joke.setup, &joke.punchline).await?;
        let key = format!(
            "jokes_audio/{}/{}.{}",
            joke.id,
            DEFAULT_VOICE_ID,
            audio_extension(&audio.content_type)
        );
        let stored = self
            .objects
            .put(&key, audio.bytes, &audio.content_type)
            .await?;

        tracing::info!(joke_id, key = %stored.key, size = stored.size, "Joke audio stored");

        self.schedule_record(joke.id, stored.url.clone(), stored.size);
        Ok(stored.url)
    }

    async fn synthesize(&self, setup: &str, punchline: &str) -> Result<SynthesizedAudio, AppError> {
        let result = match tokio::time::timeout(self.timeout, self.speech.synthesize(setup, punchline))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Synthesis(format!(
                "provider did not answer within {}s",
                self.timeout.as_secs()
            ))),
        };

        let audio = result.and_then(|audio| {
            if audio.bytes.len() < MIN_AUDIO_BYTES {
                return Err(AppError::Synthesis(format!(
                    "audio too small ({} bytes)",
                    audio.bytes.len()
                )));
            }
            Ok(audio)
        });

        let status = if audio.is_ok() { "success" } else { "error" };
        SYNTHESIS_REQUESTS_TOTAL.with_label_values(&[status]).inc();
        audio
    }

    fn schedule_record(&self, joke_id: String, audio_url: String, size: usize) {
        let store = self.store.clone();
        self.tasks.spawn("record_joke_audio", async move {
            store
                .set_default_audio(
                    &joke_id,
                    &AudioUrl {
                        voice_id: DEFAULT_VOICE_ID.to_string(),
                        audio_url: audio_url.clone(),
                    },
                )
                .await?;
            store
                .insert_audio_metadata(&AudioMetadata {
                    joke_id,
                    voice_id: DEFAULT_VOICE_ID.to_string(),
                    audio_url,
                    size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
                    created_at: Utc::now(),
                })
                .await
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Joke, MemoryStore};
    use crate::providers::MockSpeechSynthesizer;
    use crate::storage::MemoryObjectStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        objects: Arc<MemoryObjectStore>,
        tasks: Arc<BackgroundTasks>,
        audio: AudioService,
    }

    async fn fixture(speech: MockSpeechSynthesizer, max_tasks: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut joke = Joke::new("j1".into(), "Why?", "Because.", "u", false);
        store.save_joke(&joke).await.unwrap();
        joke.id = "cached".into();
        joke.setup = "Cached".into();
        joke.default_audio_url = Some("https://audio.example.com/cached.mp3".into());
        store.save_joke(&joke).await.unwrap();

        let objects = Arc::new(MemoryObjectStore::new("https://audio.example.com"));
        let tasks = Arc::new(BackgroundTasks::new(max_tasks));
        let audio = AudioService::new(
            store.clone(),
            objects.clone(),
            Arc::new(speech),
            tasks.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            store,
            objects,
            tasks,
            audio,
        }
    }

    fn mp3(len: usize) -> SynthesizedAudio {
        SynthesizedAudio {
            bytes: vec![0xFF; len],
            content_type: "audio/mpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn stored_url_skips_provider() {
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().times(0);
        let f = fixture(speech, 4).await;

        let url = f.audio.resolve_audio("cached").await.unwrap();
        assert_eq!(url, "https://audio.example.com/cached.mp3");
        assert!(f.objects.keys().is_empty());
        assert_eq!(f.tasks.pending(), 0);
    }

    #[tokio::test]
    async fn miss_synthesizes_once_and_records_in_background() {
        let mut speech = MockSpeechSynthesizer::new();
        speech
            .expect_synthesize()
            .withf(|setup, punchline| setup.starts_with("Why") && punchline.starts_with("Because"))
            .times(1)
            .returning(|_, _| Ok(mp3(4096)));
        let f = fixture(speech, 1).await;

        // Hold the only task slot so the record step cannot run yet
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        f.tasks.spawn("blocker", async move {
            let _ = release_rx.await;
            Ok(())
        });

        let url = f.audio.resolve_audio("j1").await.unwrap();
        assert_eq!(url, "https://audio.example.com/jokes_audio/j1/default.mp3");
        assert_eq!(f.objects.get("jokes_audio/j1/default.mp3").unwrap().0.len(), 4096);

        let joke = f.store.get_joke("j1").await.unwrap().unwrap();
        assert!(joke.default_audio_url.is_none());
        assert_eq!(f.tasks.pending(), 2);

        release_tx.send(()).unwrap();
        f.tasks.wait_idle().await;

        let joke = f.store.get_joke("j1").await.unwrap().unwrap();
        assert_eq!(joke.default_audio_url.as_deref(), Some(url.as_str()));
        assert_eq!(joke.audio_urls.len(), 1);
        let metadata = f.store.audio_metadata();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].size_bytes, 4096);
    }

    #[tokio::test]
    async fn undersized_audio_is_rejected() {
        let mut speech = MockSpeechSynthesizer::new();
        speech
            .expect_synthesize()
            .times(1)
            .returning(|_, _| Ok(mp3(100)));
        let f = fixture(speech, 4).await;

        let error = f.audio.resolve_audio("j1").await.unwrap_err();
        assert!(matches!(error, AppError::Synthesis(_)));
        assert!(f.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_fatal() {
        let mut speech = MockSpeechSynthesizer::new();
        speech
            .expect_synthesize()
            .returning(|_, _| Err(AppError::Synthesis("blocked".to_string())));
        let f = fixture(speech, 4).await;

        let error = f.audio.resolve_audio("j1").await.unwrap_err();
        assert!(matches!(error, AppError::Synthesis(msg) if msg == "blocked"));
    }

    #[tokio::test]
    async fn unknown_joke_is_not_found() {
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().times(0);
        let f = fixture(speech, 4).await;

        let error = f.audio.resolve_audio("missing").await.unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }
}
