//! Data models
//!
//! Rust structs representing stored entities. List-valued columns are
//! stored as JSON arrays and decoded through the `*Row` types here, which
//! is also where legacy document shapes are normalized.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// =============================================================================
// ID Types
// =============================================================================

/// Store-generated entity ID (ULID format, 26 characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Voice id used for audio rendered with the provider's stock voice
pub const DEFAULT_VOICE_ID: &str = "default";

// =============================================================================
// Joke
// =============================================================================

/// One rendered audio file for a joke
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioUrl {
    pub voice_id: String,
    pub audio_url: String,
}

/// A joke as served to clients
///
/// `(setup, punchline)` is the natural duplicate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joke {
    #[serde(rename = "joke_id")]
    pub id: String,
    #[serde(rename = "joke_setup")]
    pub setup: String,
    #[serde(rename = "joke_punchline")]
    pub punchline: String,
    #[serde(rename = "joke_content", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub age_range: Vec<String>,
    #[serde(default)]
    pub default_audio_url: Option<String>,
    #[serde(default)]
    pub audio_urls: Vec<AudioUrl>,
    pub created_by_customer: bool,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    /// Uniform draw in [0, 1) used for range sampling.
    /// Rows without one never appear in random samples.
    #[serde(skip)]
    pub random_val: Option<f64>,
}

impl Joke {
    /// Build a joke that has not been stored yet
    pub fn new(
        id: String,
        setup: impl Into<String>,
        punchline: impl Into<String>,
        creator_id: impl Into<String>,
        created_by_customer: bool,
    ) -> Self {
        Self {
            id,
            setup: setup.into(),
            punchline: punchline.into(),
            content: None,
            emoji: None,
            scenarios: Vec::new(),
            age_range: Vec::new(),
            default_audio_url: None,
            audio_urls: Vec::new(),
            created_by_customer,
            creator_id: creator_id.into(),
            created_at: Utc::now(),
            random_val: Some(rand::random::<f64>()),
        }
    }
}

/// Raw `jokes` row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JokeRow {
    pub id: String,
    pub joke_setup: String,
    pub joke_punchline: String,
    pub joke_content: Option<String>,
    pub emoji: Option<String>,
    pub scenarios: String,
    pub age_range: String,
    pub default_audio_url: Option<String>,
    pub audio_urls: String,
    pub created_by_customer: bool,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub random_val: Option<f64>,
}

impl JokeRow {
    pub fn into_joke(self) -> Result<Joke, AppError> {
        let audio_urls: serde_json::Value = decode_json(&self.audio_urls, "jokes.audio_urls")?;

        Ok(Joke {
            id: self.id,
            setup: self.joke_setup,
            punchline: self.joke_punchline,
            content: self.joke_content,
            emoji: self.emoji,
            scenarios: decode_json(&self.scenarios, "jokes.scenarios")?,
            age_range: decode_json(&self.age_range, "jokes.age_range")?,
            default_audio_url: self.default_audio_url.filter(|url| !url.is_empty()),
            audio_urls: normalize_audio_urls(&audio_urls),
            created_by_customer: self.created_by_customer,
            creator_id: self.creator_id,
            created_at: self.created_at,
            random_val: self.random_val,
        })
    }
}

/// Normalize the stored audio list
///
/// Older documents kept a plain list of URLs; those entries are attributed
/// to the default voice. Entries that are neither shape are dropped.
pub fn normalize_audio_urls(value: &serde_json::Value) -> Vec<AudioUrl> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            serde_json::Value::String(url) if !url.is_empty() => Some(AudioUrl {
                voice_id: DEFAULT_VOICE_ID.to_string(),
                audio_url: url.clone(),
            }),
            serde_json::Value::Object(map) => {
                let audio_url = map.get("audio_url")?.as_str()?.to_string();
                let voice_id = map
                    .get("voice_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(DEFAULT_VOICE_ID)
                    .to_string();
                Some(AudioUrl {
                    voice_id,
                    audio_url,
                })
            }
            _ => None,
        })
        .collect()
}

// =============================================================================
// User
// =============================================================================

/// Per-user identifier lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserList {
    Favorites,
    LikeHistory,
    DislikeHistory,
    CreationHistory,
    JokeJar,
    Voices,
}

impl UserList {
    pub fn column(self) -> &'static str {
        match self {
            UserList::Favorites => "favorites",
            UserList::LikeHistory => "like_history",
            UserList::DislikeHistory => "dislike_history",
            UserList::CreationHistory => "creation_history",
            UserList::JokeJar => "joke_jar",
            UserList::Voices => "voices",
        }
    }
}

/// Application user, keyed by the authenticated principal id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub favorites: Vec<String>,
    pub like_history: Vec<String>,
    pub dislike_history: Vec<String>,
    pub creation_history: Vec<String>,
    pub joke_jar: Vec<String>,
    pub voices: Vec<String>,
    pub voice_to_use: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Empty user with default lists
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn list(&self, list: UserList) -> &[String] {
        match list {
            UserList::Favorites => &self.favorites,
            UserList::LikeHistory => &self.like_history,
            UserList::DislikeHistory => &self.dislike_history,
            UserList::CreationHistory => &self.creation_history,
            UserList::JokeJar => &self.joke_jar,
            UserList::Voices => &self.voices,
        }
    }

    pub fn list_mut(&mut self, list: UserList) -> &mut Vec<String> {
        match list {
            UserList::Favorites => &mut self.favorites,
            UserList::LikeHistory => &mut self.like_history,
            UserList::DislikeHistory => &mut self.dislike_history,
            UserList::CreationHistory => &mut self.creation_history,
            UserList::JokeJar => &mut self.joke_jar,
            UserList::Voices => &mut self.voices,
        }
    }
}

/// Raw `users` row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub favorites: String,
    pub like_history: String,
    pub dislike_history: String,
    pub creation_history: String,
    pub joke_jar: String,
    pub voices: String,
    pub voice_to_use: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub fn into_user(self) -> Result<User, AppError> {
        Ok(User {
            id: self.id,
            display_name: self.display_name,
            email: self.email,
            favorites: decode_json(&self.favorites, "users.favorites")?,
            like_history: decode_json(&self.like_history, "users.like_history")?,
            dislike_history: decode_json(&self.dislike_history, "users.dislike_history")?,
            creation_history: decode_json(&self.creation_history, "users.creation_history")?,
            joke_jar: decode_json(&self.joke_jar, "users.joke_jar")?,
            voices: decode_json(&self.voices, "users.voices")?,
            voice_to_use: self.voice_to_use,
            created_at: self.created_at,
        })
    }
}

/// Identifier sets read from one user document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserJokeSets {
    pub favorites: HashSet<String>,
    pub liked: HashSet<String>,
    pub disliked: HashSet<String>,
    pub jar: HashSet<String>,
}

impl UserJokeSets {
    pub fn from_user(user: &User) -> Self {
        Self {
            favorites: user.favorites.iter().cloned().collect(),
            liked: user.like_history.iter().cloned().collect(),
            disliked: user.dislike_history.iter().cloned().collect(),
            jar: user.joke_jar.iter().cloned().collect(),
        }
    }

    /// Jokes the user has already reacted to. The jar is not included.
    pub fn seen(&self) -> HashSet<String> {
        self.favorites
            .iter()
            .chain(&self.liked)
            .chain(&self.disliked)
            .cloned()
            .collect()
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Aggregate interaction counters for a joke
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JokeMetadata {
    pub joke_id: String,
    pub liked_times: i64,
    pub disliked_times: i64,
    pub saved_to_favorite_times: i64,
}

/// Counter column in `joke_metadata`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataCounter {
    Liked,
    Disliked,
    SavedToFavorite,
}

impl MetadataCounter {
    pub fn column(self) -> &'static str {
        match self {
            MetadataCounter::Liked => "liked_times",
            MetadataCounter::Disliked => "disliked_times",
            MetadataCounter::SavedToFavorite => "saved_to_favorite_times",
        }
    }
}

/// Record of one synthesized audio upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AudioMetadata {
    pub joke_id: String,
    pub voice_id: String,
    pub audio_url: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Voice
// =============================================================================

/// User-uploaded voice sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Voice {
    #[serde(rename = "voice_id")]
    pub id: String,
    pub creator_id: String,
    pub name: String,
    pub audio_url: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Generation
// =============================================================================

/// Joke text returned by the generator, before it gets an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JokeCandidate {
    #[serde(rename = "joke_setup", alias = "setup")]
    pub setup: String,
    #[serde(rename = "joke_punchline", alias = "punchline")]
    pub punchline: String,
    #[serde(
        rename = "joke_content",
        alias = "content",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> Result<T, AppError> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed {column}: {e}")))
}
