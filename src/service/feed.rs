//! Feed composition
//!
//! Serves a mix of unseen stored jokes plus one joke the user already
//! liked. When too little of the sampled pool is new to the user the feed
//! is generated instead, and the generated jokes are saved in the
//! background.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::FeedConfig;
use crate::data::Joke;
use crate::error::AppError;
use crate::metrics::FEEDS_SERVED_TOTAL;
use crate::service::generation::{GenerationRequest, JokeGenerator, materialize};
use crate::service::preferences::PreferenceService;
use crate::service::sampling::{JokeFilter, JokeSampler};
use crate::service::tasks::BackgroundTasks;

/// Feed parameters
#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    pub user_id: String,
    pub age_range: Option<String>,
    pub scenario: Option<String>,
    /// Non-positive or missing means the configured default; larger
    /// values are capped at `feed.max_count`
    pub count: Option<i64>,
}

/// How a feed was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPath {
    Direct,
    Backfill,
    /// Generation failed and the unseen stored jokes were served instead
    Fallback,
}

impl FeedPath {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedPath::Direct => "direct",
            FeedPath::Backfill => "backfill",
            FeedPath::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedOutcome {
    pub jokes: Vec<Joke>,
    pub path: FeedPath,
}

/// Feed service
pub struct FeedService {
    sampler: Arc<dyn JokeSampler>,
    preferences: Arc<PreferenceService>,
    generator: Arc<JokeGenerator>,
    tasks: Arc<BackgroundTasks>,
    config: FeedConfig,
}

/// Serve from the pool when enough of it is unseen
///
/// True iff the pool is non-empty, the unseen share exceeds `ratio`, and
/// more than `needed` unseen jokes remain.
pub fn should_serve_directly(pool: usize, remaining: usize, needed: usize, ratio: f64) -> bool {
    pool > 0 && remaining as f64 > ratio * pool as f64 && remaining > needed
}

/// Pick `requested - 1` unseen jokes, add the liked joke, and top up from
/// the unseen jokes if the liked joke was missing or a duplicate
pub fn assemble_direct_feed<R: Rng + ?Sized>(
    remaining: &[Joke],
    liked: Option<Joke>,
    requested: usize,
    rng: &mut R,
) -> Vec<Joke> {
    let needed = requested.saturating_sub(1);
    let mut feed: Vec<Joke> = remaining.choose_multiple(rng, needed).cloned().collect();
    let mut ids: HashSet<String> = feed.iter().map(|j| j.id.clone()).collect();

    if let Some(liked) = liked {
        if ids.insert(liked.id.clone()) {
            feed.push(liked);
        }
    }

    if feed.len() < requested {
        let mut rest: Vec<&Joke> = remaining.iter().filter(|j| !ids.contains(&j.id)).collect();
        rest.shuffle(rng);
        for joke in rest {
            if feed.len() >= requested {
                break;
            }
            ids.insert(joke.id.clone());
            feed.push(joke.clone());
        }
    }

    feed.truncate(requested);
    feed
}

impl FeedService {
    pub fn new(
        sampler: Arc<dyn JokeSampler>,
        preferences: Arc<PreferenceService>,
        generator: Arc<JokeGenerator>,
        tasks: Arc<BackgroundTasks>,
        config: FeedConfig,
    ) -> Self {
        Self {
            sampler,
            preferences,
            generator,
            tasks,
            config,
        }
    }

    /// Count to serve, bounded by `feed.max_count`
    pub fn requested_count(&self, count: Option<i64>) -> usize {
        self.config.clamp_count(count, self.config.default_count)
    }

    /// Build a feed for one user
    pub async fn compose_feed(&self, request: FeedRequest) -> Result<FeedOutcome, AppError> {
        let requested = self.requested_count(request.count);
        let age_range = request.age_range.as_deref();
        let scenario = request.scenario.as_deref();

        let sets = self.preferences.identifier_sets(&request.user_id).await?;
        let excluded = sets.seen();

        let filter = JokeFilter::new(age_range, scenario);
        let pool = self
            .sampler
            .sample(requested.saturating_mul(self.config.pool_multiplier), &filter)
            .await?;

        let mut unique = HashSet::new();
        let mut remaining: Vec<Joke> = pool
            .iter()
            .filter(|joke| !excluded.contains(&joke.id) && unique.insert(joke.id.clone()))
            .cloned()
            .collect();

        let liked_ids: Vec<String> = sets.liked.iter().cloned().collect();
        let liked = self.preferences.resolve_random(&liked_ids, 1).await?;

        let needed = requested.saturating_sub(1);
        tracing::debug!(
            user_id = %request.user_id,
            requested,
            pool = pool.len(),
            remaining = remaining.len(),
            "Feed candidates"
        );

        let outcome = if should_serve_directly(
            pool.len(),
            remaining.len(),
            needed,
            self.config.freshness_ratio,
        ) {
            let jokes = assemble_direct_feed(
                &remaining,
                liked.into_iter().next(),
                requested,
                &mut rand::thread_rng(),
            );
            FeedOutcome {
                jokes,
                path: FeedPath::Direct,
            }
        } else {
            let context_limit = self.config.preference_context_limit;
            let disliked_ids: Vec<String> = sets.disliked.iter().cloned().collect();
            let liked_context = self.context(&liked_ids, context_limit).await;
            let disliked_context = self.context(&disliked_ids, context_limit).await;

            let generated = self
                .generator
                .generate(GenerationRequest {
                    age_range,
                    scenario,
                    count: requested,
                    liked: &liked_context,
                    disliked: &disliked_context,
                })
                .await;

            match generated {
                Ok(candidates) => {
                    let mut jokes = materialize(candidates, age_range, scenario);
                    jokes.truncate(requested);
                    let jokes = self.generator.reuse_stored(jokes).await;
                    self.schedule_save(jokes.clone());
                    FeedOutcome {
                        jokes,
                        path: FeedPath::Backfill,
                    }
                }
                Err(error) if !remaining.is_empty() => {
                    tracing::warn!(%error, "Backfill failed; serving stored jokes");
                    remaining.truncate(requested);
                    FeedOutcome {
                        jokes: remaining,
                        path: FeedPath::Fallback,
                    }
                }
                Err(error) => return Err(error),
            }
        };

        FEEDS_SERVED_TOTAL
            .with_label_values(&[outcome.path.as_str()])
            .inc();
        tracing::info!(
            user_id = %request.user_id,
            path = outcome.path.as_str(),
            count = outcome.jokes.len(),
            "Feed served"
        );

        Ok(outcome)
    }

    /// Preference examples for the prompt. Failing to read them only
    /// makes the prompt less personal.
    async fn context(&self, ids: &[String], limit: usize) -> Vec<Joke> {
        match self.preferences.resolve_random(ids, limit).await {
            Ok(jokes) => jokes,
            Err(error) => {
                tracing::warn!(%error, "Failed to load preference context");
                Vec::new()
            }
        }
    }

    fn schedule_save(&self, jokes: Vec<Joke>) {
        let generator = self.generator.clone();
        self.tasks.spawn("save_generated_jokes", async move {
            generator.save_batch(&jokes).await;
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{JokeStore, MemoryStore, UserList};
    use crate::providers::MockTextGenerator;
    use crate::service::generation::GENERATED_CREATOR_ID;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    /// Returns the same pool on every call
    struct FixedSampler(Vec<Joke>);

    #[async_trait]
    impl JokeSampler for FixedSampler {
        async fn sample(&self, count: usize, _filter: &JokeFilter) -> Result<Vec<Joke>, AppError> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    fn jokes(n: usize) -> Vec<Joke> {
        (0..n)
            .map(|i| Joke::new(format!("j{i}"), format!("Setup {i}"), "P", "u", false))
            .collect()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        tasks: Arc<BackgroundTasks>,
        feed: FeedService,
    }

    async fn fixture(pool: Vec<Joke>, text: MockTextGenerator) -> Fixture {
        fixture_with_permits(pool, text, 4).await
    }

    async fn fixture_with_permits(
        pool: Vec<Joke>,
        text: MockTextGenerator,
        permits: usize,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for joke in &pool {
            store.save_joke(joke).await.unwrap();
        }
        let tasks = Arc::new(BackgroundTasks::new(permits));
        let preferences = Arc::new(PreferenceService::new(store.clone(), tasks.clone()));
        let generator = Arc::new(JokeGenerator::new(
            Arc::new(text),
            store.clone(),
            Duration::from_secs(5),
        ));
        let feed = FeedService::new(
            Arc::new(FixedSampler(pool)),
            preferences,
            generator,
            tasks.clone(),
            crate::config::test_config().feed,
        );
        Fixture { store, tasks, feed }
    }

    fn request(count: i64) -> FeedRequest {
        FeedRequest {
            user_id: "u1".to_string(),
            age_range: Some("5-7".to_string()),
            scenario: Some("school".to_string()),
            count: Some(count),
        }
    }

    fn generated_json(n: usize) -> String {
        let items: Vec<serde_json::Value> = (0..n)
            .map(|i| serde_json::json!({"joke_setup": format!("Why {i}?"), "joke_punchline": "So."}))
            .collect();
        serde_json::Value::Array(items).to_string()
    }

    #[test]
    fn direct_serve_threshold() {
        assert!(should_serve_directly(10, 8, 4, 0.7));
        assert!(!should_serve_directly(10, 7, 4, 0.7));
        assert!(!should_serve_directly(10, 2, 4, 0.7));
        assert!(!should_serve_directly(0, 0, 4, 0.7));
        // Ratio alone is not enough
        assert!(!should_serve_directly(4, 4, 4, 0.7));
    }

    #[test]
    fn direct_feed_adds_liked_joke_once() {
        let remaining = jokes(8);
        let mut rng = StdRng::seed_from_u64(1);
        let liked = Joke::new("liked".into(), "Old", "P", "u", false);

        let feed = assemble_direct_feed(&remaining, Some(liked), 5, &mut rng);
        assert_eq!(feed.len(), 5);
        assert_eq!(feed.iter().filter(|j| j.id == "liked").count(), 1);
    }

    #[test]
    fn direct_feed_tops_up_without_liked_joke() {
        let remaining = jokes(8);
        let mut rng = StdRng::seed_from_u64(2);

        let feed = assemble_direct_feed(&remaining, None, 5, &mut rng);
        let ids: HashSet<&str> = feed.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(feed.len(), 5);
        assert_eq!(ids.len(), 5);

        // Duplicate liked joke is replaced by another unseen joke
        let duplicate = feed[0].clone();
        let feed = assemble_direct_feed(&remaining[..5], Some(duplicate), 5, &mut rng);
        let ids: HashSet<&str> = feed.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn mostly_unseen_pool_is_served_directly() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text().times(0);
        let f = fixture(jokes(10), text).await;

        for id in ["j0", "j1"] {
            f.store
                .add_to_list("u1", UserList::LikeHistory, id)
                .await
                .unwrap();
        }

        let outcome = f.feed.compose_feed(request(5)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Direct);
        assert_eq!(outcome.jokes.len(), 5);

        let ids: HashSet<&str> = outcome.jokes.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
        // Only the injected liked joke may come from the seen set
        let seen = ids.iter().filter(|id| **id == "j0" || **id == "j1").count();
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn mostly_seen_pool_triggers_backfill() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text()
            .times(1)
            .returning(|_| Ok(generated_json(5)));
        let f = fixture(jokes(10), text).await;

        for i in 0..8 {
            f.store
                .add_to_list("u1", UserList::DislikeHistory, &format!("j{i}"))
                .await
                .unwrap();
        }

        let outcome = f.feed.compose_feed(request(5)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Backfill);
        assert_eq!(outcome.jokes.len(), 5);
        assert!(outcome.jokes.iter().all(|j| j.creator_id == GENERATED_CREATOR_ID));
        assert!(outcome.jokes.iter().all(|j| j.scenarios == vec!["school".to_string()]));

        f.tasks.wait_idle().await;
        assert_eq!(f.store.joke_count(), 15);
        let saved = f.store.get_joke(&outcome.jokes[0].id).await.unwrap();
        assert!(saved.is_some());
    }

    #[tokio::test]
    async fn backfill_failure_falls_back_to_unseen_jokes() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text()
            .returning(|_| Err(AppError::Generation("down".to_string())));
        let f = fixture(jokes(10), text).await;

        for i in 0..8 {
            f.store
                .add_to_list("u1", UserList::Favorites, &format!("j{i}"))
                .await
                .unwrap();
        }

        let outcome = f.feed.compose_feed(request(5)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Fallback);
        let ids: Vec<&str> = outcome.jokes.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j8", "j9"]);
    }

    #[tokio::test]
    async fn backfill_failure_with_nothing_unseen_is_an_error() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text()
            .returning(|_| Ok("no jokes today".to_string()));
        let f = fixture(Vec::new(), text).await;

        let error = f.feed.compose_feed(request(3)).await.unwrap_err();
        assert!(matches!(error, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn joke_jar_does_not_exclude_jokes() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text().times(0);
        let f = fixture(jokes(10), text).await;

        for i in 0..10 {
            f.store
                .add_to_list("u1", UserList::JokeJar, &format!("j{i}"))
                .await
                .unwrap();
        }

        let outcome = f.feed.compose_feed(request(5)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Direct);
        assert_eq!(outcome.jokes.len(), 5);
    }

    #[tokio::test]
    async fn non_positive_count_uses_default() {
        let f = fixture(jokes(30), MockTextGenerator::new()).await;
        assert_eq!(f.feed.requested_count(Some(0)), 5);
        assert_eq!(f.feed.requested_count(Some(-3)), 5);
        assert_eq!(f.feed.requested_count(None), 5);

        let outcome = f
            .feed
            .compose_feed(FeedRequest {
                user_id: "new-user".to_string(),
                ..FeedRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.jokes.len(), 5);
    }

    #[tokio::test]
    async fn backfill_returns_before_generated_jokes_are_saved() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text()
            .times(1)
            .returning(|_| Ok(generated_json(5)));
        let f = fixture_with_permits(Vec::new(), text, 1).await;

        // Hold the only task slot so the save cannot run yet
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        f.tasks.spawn("blocker", async move {
            let _ = release_rx.await;
            Ok(())
        });
        tokio::task::yield_now().await;

        let outcome = f.feed.compose_feed(request(5)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Backfill);
        assert_eq!(outcome.jokes.len(), 5);

        tokio::task::yield_now().await;
        assert_eq!(f.store.joke_count(), 0);
        assert_eq!(f.tasks.pending(), 2);

        release_tx.send(()).unwrap();
        f.tasks.wait_idle().await;
        assert_eq!(f.store.joke_count(), 5);
    }

    #[tokio::test]
    async fn oversized_count_is_capped() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text()
            .times(1)
            .returning(|_| Ok(generated_json(80)));
        let f = fixture(jokes(30), text).await;
        let max = crate::config::test_config().feed.max_count;

        assert_eq!(f.feed.requested_count(Some(i64::MAX)), max);

        let outcome = f.feed.compose_feed(request(i64::MAX)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Backfill);
        assert_eq!(outcome.jokes.len(), max);
    }

    #[tokio::test]
    async fn backfill_reuses_id_of_stored_duplicate() {
        let mut text = MockTextGenerator::new();
        text.expect_generate_text()
            .times(1)
            .returning(|_| Ok(generated_json(3)));
        let f = fixture(Vec::new(), text).await;

        let stored = Joke::new("kept".into(), "Why 1?", "So.", "someone", true);
        f.store.save_joke(&stored).await.unwrap();

        let outcome = f.feed.compose_feed(request(3)).await.unwrap();
        assert_eq!(outcome.path, FeedPath::Backfill);
        assert_eq!(outcome.jokes[1].id, "kept");

        f.tasks.wait_idle().await;
        assert_eq!(f.store.joke_count(), 3);
        for joke in &outcome.jokes {
            assert!(f.store.get_joke(&joke.id).await.unwrap().is_some());
        }
    }
}
