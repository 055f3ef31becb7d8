//! Storage interface consumed by the service layer
//!
//! `Database` is the production implementation and `MemoryStore` the
//! in-process one. Every list mutation is a single atomic statement on the
//! backing store; callers never read-modify-write a user document.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::models::*;
use crate::error::AppError;

/// Range query over `random_val`
///
/// `ascending == true` selects `random_val >= threshold` in ascending
/// order, otherwise `random_val <= threshold` in descending order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomRange {
    pub threshold: f64,
    pub ascending: bool,
    pub limit: usize,
}

/// Result of saving a joke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Id of the row that now holds the joke
    pub id: String,
    /// True when an existing `(setup, punchline)` row absorbed the save
    pub merged: bool,
}

/// Result of moving a joke id between two mutually exclusive lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListMove {
    pub added: bool,
    pub evicted: bool,
}

#[async_trait]
pub trait JokeStore: Send + Sync {
    async fn get_joke(&self, id: &str) -> Result<Option<Joke>, AppError>;

    /// Resolve ids in order, silently dropping ids that no longer exist
    async fn get_jokes(&self, ids: &[String]) -> Result<Vec<Joke>, AppError>;

    /// Newest jokes first
    async fn list_jokes(&self, limit: usize) -> Result<Vec<Joke>, AppError>;

    /// Row with exactly this setup and punchline
    async fn find_by_text(
        &self,
        setup: &str,
        punchline: &str,
    ) -> Result<Option<Joke>, AppError>;

    /// Insert the joke, or merge its tags into the existing row with the
    /// same setup and punchline
    async fn save_joke(&self, joke: &Joke) -> Result<SaveOutcome, AppError>;

    /// Stream jokes in `random_val` order. Rows without a `random_val` are
    /// never yielded.
    fn random_range(&self, range: RandomRange) -> BoxStream<'_, Result<Joke, AppError>>;

    /// Set the default audio URL and record it in `audio_urls`
    async fn set_default_audio(&self, joke_id: &str, audio: &AudioUrl) -> Result<(), AppError>;

    async fn insert_audio_metadata(&self, metadata: &AudioMetadata) -> Result<(), AppError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Create the user with empty lists if it does not exist yet
    async fn ensure_user(
        &self,
        id: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), AppError>;

    /// Append `value` to a user list, creating the user if needed.
    /// Returns false when the value was already present.
    async fn add_to_list(&self, user_id: &str, list: UserList, value: &str)
    -> Result<bool, AppError>;

    /// Returns false when the value was not present
    async fn remove_from_list(
        &self,
        user_id: &str,
        list: UserList,
        value: &str,
    ) -> Result<bool, AppError>;

    /// Add `value` to `into` and drop it from `evict_from` in one step
    async fn move_to_list(
        &self,
        user_id: &str,
        into: UserList,
        evict_from: UserList,
        value: &str,
    ) -> Result<ListMove, AppError>;

    /// Apply a delta to one counter. The stored value never drops below zero.
    async fn adjust_metadata(
        &self,
        joke_id: &str,
        counter: MetadataCounter,
        delta: i64,
    ) -> Result<(), AppError>;

    async fn get_metadata(&self, joke_id: &str) -> Result<Option<JokeMetadata>, AppError>;

    async fn insert_voice(&self, voice: &Voice) -> Result<(), AppError>;

    async fn list_voices(&self, creator_id: &str) -> Result<Vec<Voice>, AppError>;
}
