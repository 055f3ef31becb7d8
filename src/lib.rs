//! Jokebox - joke feed backend with generative backfill and spoken audio
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Joke catalogue, feed, preference lists                    │
//! │  - Login, metrics                                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Sampling, feed composition, backfill                      │
//! │  - Audio resolution, background tasks                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Data / Storage / Provider Layers                 │
//! │  - SQLite (sqlx) or in-memory joke store                     │
//! │  - R2 audio storage                                          │
//! │  - Gemini and Cloud TTS clients                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Joke store trait and implementations
//! - `storage`: Cloudflare R2 object storage
//! - `providers`: Text generation and speech synthesis clients
//! - `auth`: Session tokens and extractors
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod service;
pub mod storage;

use std::sync::Arc;

use data::JokeStore;
use providers::{SpeechSynthesizer, TextGenerator};
use service::{
    AudioService, BackgroundTasks, FeedService, JokeGenerator, PreferenceService, RangeSampler,
    VoiceService,
};
use storage::ObjectStore;

/// External dependencies of the application
///
/// Production wiring builds these from configuration; tests pass
/// in-memory stores and scripted providers.
pub struct Backends {
    pub store: Arc<dyn JokeStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub text: Arc<dyn TextGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

/// Application state shared across all handlers
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Joke and user documents
    pub store: Arc<dyn JokeStore>,

    /// Fire-and-forget writes
    pub tasks: Arc<BackgroundTasks>,

    pub preferences: Arc<PreferenceService>,
    pub feed: Arc<FeedService>,
    pub generator: Arc<JokeGenerator>,
    pub audio: Arc<AudioService>,
    pub voices: Arc<VoiceService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Connect to R2 storage
    /// 3. Build provider clients
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        // 2. Connect to R2 storage
        let objects = storage::AudioStorage::new(&config.storage.audio, &config.cloudflare).await?;
        tracing::info!("Audio storage initialized");

        // 3. Build provider clients
        let text = providers::GeminiClient::new(&config.gemini)?;
        let speech = providers::speech_synthesizer(&config)?;
        tracing::info!(provider = ?config.tts.provider, "Providers initialized");

        Ok(Self::with_backends(
            config,
            Backends {
                store: Arc::new(db),
                objects: Arc::new(objects),
                text: Arc::new(text),
                speech,
            },
        ))
    }

    /// Wire services on top of the given backends
    pub fn with_backends(config: config::AppConfig, backends: Backends) -> Self {
        let Backends {
            store,
            objects,
            text,
            speech,
        } = backends;
        let timeout = config.provider_timeout();

        let tasks = Arc::new(BackgroundTasks::new(config.tasks.max_concurrent));
        let preferences = Arc::new(PreferenceService::new(store.clone(), tasks.clone()));
        let generator = Arc::new(JokeGenerator::new(text, store.clone(), timeout));
        let sampler = Arc::new(RangeSampler::new(
            store.clone(),
            config.feed.oversample_factor,
        ));
        let feed = Arc::new(FeedService::new(
            sampler,
            preferences.clone(),
            generator.clone(),
            tasks.clone(),
            config.feed.clone(),
        ));
        let audio = Arc::new(AudioService::new(
            store.clone(),
            objects.clone(),
            speech,
            tasks.clone(),
            timeout,
        ));
        let voices = Arc::new(VoiceService::new(store.clone(), objects));

        Self {
            config: Arc::new(config),
            store,
            tasks,
            preferences,
            feed,
            generator,
            audio,
            voices,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .nest("/api", api::api_router())
        .merge(api::metrics_router(state.clone()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
