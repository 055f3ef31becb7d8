//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub cloudflare: CloudflareConfig,
    pub auth: AuthConfig,
    pub gemini: GeminiConfig,
    pub tts: TtsConfig,
    pub feed: FeedConfig,
    pub tasks: TaskConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "jokes.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the service
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Storage configuration (Cloudflare R2)
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub audio: AudioStorageConfig,
}

/// Public bucket holding synthesized joke audio and uploaded voice samples
#[derive(Debug, Clone, Deserialize)]
pub struct AudioStorageConfig {
    /// R2 bucket name
    pub bucket: String,
    /// Public URL for objects (Custom Domain)
    /// e.g., "https://audio.example.com"
    pub public_url: String,
}

/// Cloudflare credentials
#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareConfig {
    /// Cloudflare account ID
    pub account_id: String,
    /// R2 access key ID
    pub r2_access_key_id: String,
    /// R2 secret access key
    pub r2_secret_access_key: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
}

/// Gemini API configuration, shared by text generation and Gemini TTS
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    /// API root, e.g. "https://generativelanguage.googleapis.com/v1beta"
    pub base_url: String,
    pub text_model: String,
    pub tts_model: String,
    /// Prebuilt voice used by the TTS model
    pub voice_name: String,
    /// Upper bound for a single provider call
    pub timeout_seconds: u64,
}

/// Speech provider selector
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    Gemini,
    Cloud,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub provider: TtsProvider,
    pub cloud: CloudTtsConfig,
}

/// Google Cloud Text-to-Speech configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CloudTtsConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub language_code: String,
    pub setup_voice: String,
    pub punchline_voice: String,
    pub punchline_pitch: f64,
    pub punchline_speaking_rate: f64,
}

/// Feed composition tuning
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Jokes returned when the caller does not ask for a count
    pub default_count: usize,
    /// Candidate pool size as a multiple of the requested count
    pub pool_multiplier: usize,
    /// Range query limit as a multiple of the sampled count
    pub oversample_factor: usize,
    /// Share of the pool that must be unseen to serve without generation
    pub freshness_ratio: f64,
    /// Liked and disliked examples handed to the generator
    pub preference_context_limit: usize,
    /// Jokes requested by the direct generate endpoint
    pub generate_count: usize,
    /// Upper bound on any caller-supplied count
    pub max_count: usize,
}

impl FeedConfig {
    /// Caller's count clamped to `1..=max_count`; `default` when missing
    /// or non-positive
    pub fn clamp_count(&self, count: Option<i64>, default: usize) -> usize {
        match count.and_then(|n| usize::try_from(n).ok()) {
            Some(n) if n > 0 => n.min(self.max_count),
            _ => default.min(self.max_count),
        }
    }
}

/// Background task configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Maximum number of background writes running at once
    pub max_concurrent: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (JOKEBOX__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/jokebox.db")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("gemini.api_key", "")?
            .set_default(
                "gemini.base_url",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("gemini.text_model", "gemini-2.5-flash")?
            .set_default("gemini.tts_model", "gemini-2.5-flash-preview-tts")?
            .set_default("gemini.voice_name", "Puck")?
            .set_default("gemini.timeout_seconds", 60)?
            .set_default("tts.provider", "gemini")?
            .set_default("tts.cloud.base_url", "https://texttospeech.googleapis.com/v1")?
            .set_default("tts.cloud.language_code", "en-US")?
            .set_default("tts.cloud.setup_voice", "en-US-Neural2-F")?
            .set_default("tts.cloud.punchline_voice", "en-US-Neural2-J")?
            .set_default("tts.cloud.punchline_pitch", 4.0)?
            .set_default("tts.cloud.punchline_speaking_rate", 1.1)?
            .set_default("feed.default_count", 5)?
            .set_default("feed.pool_multiplier", 5)?
            .set_default("feed.oversample_factor", 10)?
            .set_default("feed.freshness_ratio", 0.7)?
            .set_default("feed.preference_context_limit", 10)?
            .set_default("feed.generate_count", 10)?
            .set_default("feed.max_count", 50)?
            .set_default("tasks.max_concurrent", 16)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (JOKEBOX__*)
            .add_source(
                Environment::with_prefix("JOKEBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.gemini.timeout_seconds)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.feed.freshness_ratio) {
            return Err(AppError::Config(
                "feed.freshness_ratio must be between 0 and 1".to_string(),
            ));
        }

        if self.feed.pool_multiplier == 0 || self.feed.oversample_factor == 0 {
            return Err(AppError::Config(
                "feed.pool_multiplier and feed.oversample_factor must be positive".to_string(),
            ));
        }

        if self.feed.max_count == 0 {
            return Err(AppError::Config(
                "feed.max_count must be greater than 0".to_string(),
            ));
        }

        if self.tasks.max_concurrent == 0 {
            return Err(AppError::Config(
                "tasks.max_concurrent must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.storage.audio.public_url).is_err() {
            return Err(AppError::Config(format!(
                "storage.audio.public_url is not a valid URL: {}",
                self.storage.audio.public_url
            )));
        }

        if self.tts.provider == TtsProvider::Cloud
            && self
                .tts
                .cloud
                .api_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            return Err(AppError::Config(
                "tts.cloud.api_key is required when tts.provider=cloud".to_string(),
            ));
        }

        if self.gemini.api_key.trim().is_empty() {
            tracing::warn!("gemini.api_key is empty; generation requests will fail");
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            domain: "localhost".to_string(),
            protocol: "http".to_string(),
        },
        database: DatabaseConfig {
            path: PathBuf::from("/tmp/jokebox-test.db"),
        },
        storage: StorageConfig {
            audio: AudioStorageConfig {
                bucket: "audio".to_string(),
                public_url: "https://audio.example.com".to_string(),
            },
        },
        cloudflare: CloudflareConfig {
            account_id: "account".to_string(),
            r2_access_key_id: "access-key".to_string(),
            r2_secret_access_key: "secret-key".to_string(),
        },
        auth: AuthConfig {
            session_secret: "x".repeat(32),
            session_max_age: 604_800,
        },
        gemini: GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice_name: "Puck".to_string(),
            timeout_seconds: 5,
        },
        tts: TtsConfig {
            provider: TtsProvider::Gemini,
            cloud: CloudTtsConfig {
                api_key: None,
                base_url: "https://texttospeech.googleapis.com/v1".to_string(),
                language_code: "en-US".to_string(),
                setup_voice: "en-US-Neural2-F".to_string(),
                punchline_voice: "en-US-Neural2-J".to_string(),
                punchline_pitch: 4.0,
                punchline_speaking_rate: 1.1,
            },
        },
        feed: FeedConfig {
            default_count: 5,
            pool_multiplier: 5,
            oversample_factor: 10,
            freshness_ratio: 0.7,
            preference_context_limit: 10,
            generate_count: 10,
            max_count: 50,
        },
        tasks: TaskConfig { max_concurrent: 4 },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}
