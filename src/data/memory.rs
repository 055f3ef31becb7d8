//! In-process `JokeStore`
//!
//! Mirrors the SQLite semantics (duplicate merge, set-like lists, counter
//! floor) without a file. Used by the test suites and for local runs
//! without a database.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use super::models::*;
use super::store::{JokeStore, ListMove, RandomRange, SaveOutcome};
use crate::error::AppError;

#[derive(Default)]
struct Inner {
    jokes: HashMap<String, Joke>,
    users: HashMap<String, User>,
    metadata: HashMap<String, JokeMetadata>,
    audio: Vec<AudioMetadata>,
    voices: Vec<Voice>,
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

fn union_into(target: &mut Vec<String>, incoming: &[String]) {
    for value in incoming {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded audio uploads, oldest first
    pub fn audio_metadata(&self) -> Vec<AudioMetadata> {
        self.read().audio.clone()
    }

    pub fn joke_count(&self) -> usize {
        self.read().jokes.len()
    }

    /// Replace a user document wholesale
    pub fn put_user(&self, user: User) {
        self.write().users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl JokeStore for MemoryStore {
    async fn get_joke(&self, id: &str) -> Result<Option<Joke>, AppError> {
        Ok(self.read().jokes.get(id).cloned())
    }

    async fn get_jokes(&self, ids: &[String]) -> Result<Vec<Joke>, AppError> {
        let inner = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.jokes.get(id).cloned())
            .collect())
    }

    async fn list_jokes(&self, limit: usize) -> Result<Vec<Joke>, AppError> {
        let mut jokes: Vec<Joke> = self.read().jokes.values().cloned().collect();
        jokes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jokes.truncate(limit);
        Ok(jokes)
    }

    async fn find_by_text(
        &self,
        setup: &str,
        punchline: &str,
    ) -> Result<Option<Joke>, AppError> {
        Ok(self
            .read()
            .jokes
            .values()
            .find(|j| j.setup == setup && j.punchline == punchline)
            .cloned())
    }

    async fn save_joke(&self, joke: &Joke) -> Result<SaveOutcome, AppError> {
        let mut inner = self.write();

        let existing = inner
            .jokes
            .values_mut()
            .find(|j| j.setup == joke.setup && j.punchline == joke.punchline);
        if let Some(existing) = existing {
            union_into(&mut existing.scenarios, &joke.scenarios);
            union_into(&mut existing.age_range, &joke.age_range);
            return Ok(SaveOutcome {
                merged: existing.id != joke.id,
                id: existing.id.clone(),
            });
        }

        inner.jokes.insert(joke.id.clone(), joke.clone());
        Ok(SaveOutcome {
            id: joke.id.clone(),
            merged: false,
        })
    }

    fn random_range(&self, range: RandomRange) -> BoxStream<'_, Result<Joke, AppError>> {
        let mut matched: Vec<(f64, Joke)> = self
            .read()
            .jokes
            .values()
            .filter_map(|joke| {
                let value = joke.random_val?;
                let in_range = if range.ascending {
                    value >= range.threshold
                } else {
                    value <= range.threshold
                };
                in_range.then(|| (value, joke.clone()))
            })
            .collect();

        matched.sort_by(|a, b| a.0.total_cmp(&b.0));
        if !range.ascending {
            matched.reverse();
        }
        matched.truncate(range.limit);

        futures::stream::iter(matched.into_iter().map(|(_, joke)| Ok(joke))).boxed()
    }

    async fn set_default_audio(&self, joke_id: &str, audio: &AudioUrl) -> Result<(), AppError> {
        let mut inner = self.write();
        let joke = inner.jokes.get_mut(joke_id).ok_or(AppError::NotFound)?;
        joke.default_audio_url = Some(audio.audio_url.clone());
        joke.audio_urls.retain(|existing| existing.voice_id != audio.voice_id);
        joke.audio_urls.push(audio.clone());
        Ok(())
    }

    async fn insert_audio_metadata(&self, metadata: &AudioMetadata) -> Result<(), AppError> {
        self.write().audio.push(metadata.clone());
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.read().users.get(id).cloned())
    }

    async fn ensure_user(
        &self,
        id: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), AppError> {
        let mut inner = self.write();
        let user = inner
            .users
            .entry(id.to_string())
            .or_insert_with(|| User::empty(id));
        if let Some(name) = display_name {
            user.display_name = Some(name.to_string());
        }
        if let Some(email) = email {
            user.email = Some(email.to_string());
        }
        Ok(())
    }

    async fn add_to_list(
        &self,
        user_id: &str,
        list: UserList,
        value: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.write();
        let user = inner
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| User::empty(user_id));
        let entries = user.list_mut(list);
        if entries.iter().any(|v| v == value) {
            return Ok(false);
        }
        entries.push(value.to_string());
        Ok(true)
    }

    async fn remove_from_list(
        &self,
        user_id: &str,
        list: UserList,
        value: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.write();
        let Some(user) = inner.users.get_mut(user_id) else {
            return Ok(false);
        };
        let entries = user.list_mut(list);
        let before = entries.len();
        entries.retain(|v| v != value);
        Ok(entries.len() != before)
    }

    async fn move_to_list(
        &self,
        user_id: &str,
        into: UserList,
        evict_from: UserList,
        value: &str,
    ) -> Result<ListMove, AppError> {
        let mut inner = self.write();
        let user = inner
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| User::empty(user_id));

        let from = user.list_mut(evict_from);
        let before = from.len();
        from.retain(|v| v != value);
        let evicted = from.len() != before;

        let target = user.list_mut(into);
        let added = !target.iter().any(|v| v == value);
        if added {
            target.push(value.to_string());
        }

        Ok(ListMove { added, evicted })
    }

    async fn adjust_metadata(
        &self,
        joke_id: &str,
        counter: MetadataCounter,
        delta: i64,
    ) -> Result<(), AppError> {
        let mut inner = self.write();
        let metadata = inner
            .metadata
            .entry(joke_id.to_string())
            .or_insert_with(|| JokeMetadata {
                joke_id: joke_id.to_string(),
                ..JokeMetadata::default()
            });
        let slot = match counter {
            MetadataCounter::Liked => &mut metadata.liked_times,
            MetadataCounter::Disliked => &mut metadata.disliked_times,
            MetadataCounter::SavedToFavorite => &mut metadata.saved_to_favorite_times,
        };
        *slot = (*slot + delta).max(0);
        Ok(())
    }

    async fn get_metadata(&self, joke_id: &str) -> Result<Option<JokeMetadata>, AppError> {
        Ok(self.read().metadata.get(joke_id).cloned())
    }

    async fn insert_voice(&self, voice: &Voice) -> Result<(), AppError> {
        self.write().voices.push(voice.clone());
        Ok(())
    }

    async fn list_voices(&self, creator_id: &str) -> Result<Vec<Voice>, AppError> {
        Ok(self
            .read()
            .voices
            .iter()
            .filter(|v| v.creator_id == creator_id)
            .cloned()
            .collect())
    }
}
