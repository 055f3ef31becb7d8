//! User preference lists
//!
//! Reads the per-user identifier sets and applies like, dislike, favorite,
//! jar and creation changes. Counter updates on `joke_metadata` are
//! best-effort and run in the background.

use std::sync::Arc;

use crate::data::{
    EntityId, Joke, JokeStore, MetadataCounter, UserJokeSets, UserList,
};
use crate::error::AppError;
use crate::service::sampling::sample_identifiers;
use crate::service::tasks::BackgroundTasks;

/// Fields of a user-submitted joke
#[derive(Debug, Clone, Default)]
pub struct NewJoke {
    pub setup: String,
    pub punchline: String,
    pub content: Option<String>,
    pub emoji: Option<String>,
    pub scenarios: Vec<String>,
    pub age_range: Vec<String>,
}

/// Preference service
pub struct PreferenceService {
    store: Arc<dyn JokeStore>,
    tasks: Arc<BackgroundTasks>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn JokeStore>, tasks: Arc<BackgroundTasks>) -> Self {
        Self { store, tasks }
    }

    /// Favorites, likes, dislikes and jar of a user in one read.
    /// Unknown users have empty sets.
    pub async fn identifier_sets(&self, user_id: &str) -> Result<UserJokeSets, AppError> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .map(|user| UserJokeSets::from_user(&user))
            .unwrap_or_default())
    }

    /// Up to `limit` random jokes from the user's like history
    pub async fn random_liked(&self, user_id: &str, limit: usize) -> Result<Vec<Joke>, AppError> {
        self.random_from_list(user_id, UserList::LikeHistory, limit)
            .await
    }

    /// Up to `limit` random jokes from the user's dislike history
    pub async fn random_disliked(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Joke>, AppError> {
        self.random_from_list(user_id, UserList::DislikeHistory, limit)
            .await
    }

    async fn random_from_list(
        &self,
        user_id: &str,
        list: UserList,
        limit: usize,
    ) -> Result<Vec<Joke>, AppError> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(Vec::new());
        };
        self.resolve_random(user.list(list), limit).await
    }

    /// Sample up to `limit` ids and resolve them, dropping ids that no
    /// longer resolve to a joke
    pub async fn resolve_random(&self, ids: &[String], limit: usize) -> Result<Vec<Joke>, AppError> {
        let picked = sample_identifiers(ids, limit, &mut rand::thread_rng());
        self.store.get_jokes(&picked).await
    }

    /// Jokes referenced by one of the user's lists, in list order
    pub async fn jokes_in_list(&self, user_id: &str, list: UserList) -> Result<Vec<Joke>, AppError> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(Vec::new());
        };
        self.store.get_jokes(user.list(list)).await
    }

    async fn require_joke(&self, joke_id: &str) -> Result<Joke, AppError> {
        self.store
            .get_joke(joke_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    fn schedule_counter(&self, joke_id: &str, counter: MetadataCounter, delta: i64) {
        let store = self.store.clone();
        let joke_id = joke_id.to_string();
        self.tasks.spawn("joke_metadata", async move {
            store.adjust_metadata(&joke_id, counter, delta).await
        });
    }

    /// Record a like. Clears any dislike of the same joke.
    pub async fn like(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        self.require_joke(joke_id).await?;
        let moved = self
            .store
            .move_to_list(user_id, UserList::LikeHistory, UserList::DislikeHistory, joke_id)
            .await?;

        if moved.added {
            self.schedule_counter(joke_id, MetadataCounter::Liked, 1);
        }
        if moved.evicted {
            self.schedule_counter(joke_id, MetadataCounter::Disliked, -1);
        }

        tracing::debug!(user_id, joke_id, ?moved, "Joke liked");
        Ok(true)
    }

    /// Record a dislike. Clears any like of the same joke.
    pub async fn dislike(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        self.require_joke(joke_id).await?;
        let moved = self
            .store
            .move_to_list(user_id, UserList::DislikeHistory, UserList::LikeHistory, joke_id)
            .await?;

        if moved.added {
            self.schedule_counter(joke_id, MetadataCounter::Disliked, 1);
        }
        if moved.evicted {
            self.schedule_counter(joke_id, MetadataCounter::Liked, -1);
        }

        tracing::debug!(user_id, joke_id, ?moved, "Joke disliked");
        Ok(true)
    }

    /// Returns false if the joke was already a favorite
    pub async fn favorite(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        self.require_joke(joke_id).await?;
        let added = self
            .store
            .add_to_list(user_id, UserList::Favorites, joke_id)
            .await?;

        if added {
            self.schedule_counter(joke_id, MetadataCounter::SavedToFavorite, 1);
        }
        Ok(added)
    }

    /// Returns false if the joke was not a favorite
    pub async fn unfavorite(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        self.require_joke(joke_id).await?;
        let removed = self
            .store
            .remove_from_list(user_id, UserList::Favorites, joke_id)
            .await?;

        if removed {
            self.schedule_counter(joke_id, MetadataCounter::SavedToFavorite, -1);
        }
        Ok(removed)
    }

    /// Store a user-written joke and add it to the user's creations
    ///
    /// Returns the stored joke. When an identical joke already exists its
    /// id is reused.
    pub async fn create(&self, user_id: &str, new_joke: NewJoke) -> Result<Joke, AppError> {
        let setup = new_joke.setup.trim();
        let punchline = new_joke.punchline.trim();
        if setup.is_empty() || punchline.is_empty() {
            return Err(AppError::Validation(
                "joke_setup and joke_punchline are required".to_string(),
            ));
        }

        let mut joke = Joke::new(EntityId::new().0, setup, punchline, user_id, true);
        joke.content = new_joke.content.filter(|c| !c.trim().is_empty());
        joke.emoji = new_joke.emoji.filter(|e| !e.trim().is_empty());
        joke.scenarios = new_joke.scenarios;
        joke.age_range = new_joke.age_range;

        let outcome = self.store.save_joke(&joke).await?;
        self.store
            .add_to_list(user_id, UserList::CreationHistory, &outcome.id)
            .await?;

        tracing::info!(user_id, joke_id = %outcome.id, merged = outcome.merged, "Joke created");

        self.store
            .get_joke(&outcome.id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Drop a joke from the user's creations. The joke row stays.
    ///
    /// Only the joke's creator, or a user who has it in their creations,
    /// may remove it.
    pub async fn delete_created(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        let joke = self.require_joke(joke_id).await?;

        if joke.creator_id != user_id {
            let listed = self
                .store
                .get_user(user_id)
                .await?
                .is_some_and(|user| user.creation_history.iter().any(|id| id == joke_id));
            if !listed {
                return Err(AppError::Forbidden);
            }
        }

        self.store
            .remove_from_list(user_id, UserList::CreationHistory, joke_id)
            .await
    }

    /// Returns false if the joke was already in the jar
    pub async fn add_to_jar(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        self.require_joke(joke_id).await?;
        self.store
            .add_to_list(user_id, UserList::JokeJar, joke_id)
            .await
    }

    /// Returns false if the joke was not in the jar
    pub async fn remove_from_jar(&self, user_id: &str, joke_id: &str) -> Result<bool, AppError> {
        self.store
            .remove_from_list(user_id, UserList::JokeJar, joke_id)
            .await
    }
}
