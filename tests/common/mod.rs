//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use jokebox::auth::{Session, create_session_token};
use jokebox::data::{Joke, JokeStore, MemoryStore};
use jokebox::error::AppError;
use jokebox::providers::{SpeechSynthesizer, SynthesizedAudio, TextGenerator};
use jokebox::storage::MemoryObjectStore;
use jokebox::{AppState, Backends, config};
use tokio::net::TcpListener;

/// Text generator that replays a configured answer
#[derive(Default)]
pub struct ScriptedGenerator {
    answer: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Answer every prompt with `text`. `None` makes calls fail.
    pub fn set_answer(&self, text: Option<String>) {
        *self.answer.lock().unwrap_or_else(PoisonError::into_inner) = text;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, _prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AppError::Generation("scripted failure".to_string()))
    }
}

/// Speech synthesizer returning a fixed MP3-sized buffer
#[derive(Default)]
pub struct FakeSpeech {
    calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(
        &self,
        _setup: &str,
        _punchline: &str,
    ) -> Result<SynthesizedAudio, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SynthesizedAudio {
            bytes: vec![0xFF; 4096],
            content_type: "audio/mpeg".to_string(),
        })
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub speech: Arc<FakeSpeech>,
    pub client: reqwest::Client,
}

pub fn test_config() -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "test.example.com".to_string(),
            protocol: "https".to_string(),
        },
        database: config::DatabaseConfig {
            path: std::env::temp_dir().join("jokebox-unused.db"),
        },
        storage: config::StorageConfig {
            audio: config::AudioStorageConfig {
                bucket: "test-audio".to_string(),
                public_url: "https://audio.test.example.com".to_string(),
            },
        },
        cloudflare: config::CloudflareConfig {
            account_id: "test-account".to_string(),
            r2_access_key_id: "test-key".to_string(),
            r2_secret_access_key: "test-secret".to_string(),
        },
        auth: config::AuthConfig {
            session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
            session_max_age: 604800,
        },
        gemini: config::GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice_name: "Puck".to_string(),
            timeout_seconds: 5,
        },
        tts: config::TtsConfig {
            provider: config::TtsProvider::Gemini,
            cloud: config::CloudTtsConfig {
                api_key: None,
                base_url: "http://127.0.0.1:9".to_string(),
                language_code: "en-US".to_string(),
                setup_voice: "en-US-Neural2-F".to_string(),
                punchline_voice: "en-US-Neural2-J".to_string(),
                punchline_pitch: 4.0,
                punchline_speaking_rate: 1.1,
            },
        },
        feed: config::FeedConfig {
            default_count: 5,
            pool_multiplier: 5,
            oversample_factor: 10,
            freshness_ratio: 0.7,
            preference_context_limit: 10,
            generate_count: 10,
            max_count: 50,
        },
        tasks: config::TaskConfig { max_concurrent: 4 },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new("https://audio.test.example.com"));
        let generator = Arc::new(ScriptedGenerator::default());
        let speech = Arc::new(FakeSpeech::default());

        let state = AppState::with_backends(
            test_config(),
            Backends {
                store: store.clone(),
                objects: objects.clone(),
                text: generator.clone(),
                speech: speech.clone(),
            },
        );

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = jokebox::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            store,
            objects,
            generator,
            speech,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Signed session token for `user_id`
    pub fn token_for(&self, user_id: &str) -> String {
        let session = Session::new(
            user_id,
            Some(format!("{user_id}@test.example.com")),
            None,
            self.state.config.auth.session_max_age,
        );
        create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token")
    }

    /// Store `n` untagged jokes with ids `{prefix}0..{prefix}{n-1}`
    ///
    /// `random_val` alternates between 0.0 and 1.0, so every sampled range
    /// reaches half of them whatever its threshold and direction.
    pub async fn seed_jokes(&self, prefix: &str, n: usize) -> Vec<Joke> {
        let mut jokes = Vec::with_capacity(n);
        for i in 0..n {
            let mut joke = Joke::new(
                format!("{prefix}{i}"),
                format!("Why is {prefix} number {i} funny?"),
                "It just is.",
                "seed",
                false,
            );
            joke.random_val = Some(if i % 2 == 0 { 0.0 } else { 1.0 });
            self.store.save_joke(&joke).await.unwrap();
            jokes.push(joke);
        }
        jokes
    }

    /// Wait for background writes started by earlier requests
    pub async fn settle(&self) {
        self.state.tasks.wait_idle().await;
    }
}

/// JSON array text the scripted generator can return
pub fn generated_jokes(n: usize) -> String {
    let items: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "joke_setup": format!("What did generated joke {i} say?"),
                "joke_punchline": "Nothing, it was shy.",
                "emoji": "🙈"
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}
