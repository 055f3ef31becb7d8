//! Randomized sampling
//!
//! Picks a random threshold and direction, then walks the `random_val`
//! index from there. This yields a near-uniform subset without reading
//! the whole collection.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::data::{Joke, JokeStore, RandomRange};
use crate::error::AppError;

const MAX_PREALLOCATED: usize = 1024;

/// Age range and scenario filter
///
/// A blank value or "all" disables that half of the filter. A joke with
/// no tags for a dimension matches any requested value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JokeFilter {
    age_range: Option<String>,
    scenario: Option<String>,
}

fn normalize_tag(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("all") {
        return None;
    }
    Some(value.to_lowercase())
}

fn tag_matches(wanted: Option<&str>, tags: &[String]) -> bool {
    match wanted {
        None => true,
        Some(wanted) => {
            tags.is_empty() || tags.iter().any(|tag| tag.trim().to_lowercase() == wanted)
        }
    }
}

impl JokeFilter {
    pub fn new(age_range: Option<&str>, scenario: Option<&str>) -> Self {
        Self {
            age_range: normalize_tag(age_range),
            scenario: normalize_tag(scenario),
        }
    }

    pub fn matches(&self, joke: &Joke) -> bool {
        tag_matches(self.age_range.as_deref(), &joke.age_range)
            && tag_matches(self.scenario.as_deref(), &joke.scenarios)
    }
}

/// Source of random candidate jokes
#[async_trait]
pub trait JokeSampler: Send + Sync {
    /// Up to `count` random jokes passing `filter`
    async fn sample(&self, count: usize, filter: &JokeFilter) -> Result<Vec<Joke>, AppError>;
}

/// Threshold-and-direction sampler over the store's `random_val` index
pub struct RangeSampler {
    store: Arc<dyn JokeStore>,
    oversample_factor: usize,
}

impl RangeSampler {
    pub fn new(store: Arc<dyn JokeStore>, oversample_factor: usize) -> Self {
        Self {
            store,
            oversample_factor: oversample_factor.max(1),
        }
    }

    /// Range query for `count` results with a fresh random start
    pub fn random_range<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> RandomRange {
        RandomRange {
            threshold: rng.gen_range(0.0..1.0),
            ascending: rng.gen_bool(0.5),
            limit: count.saturating_mul(self.oversample_factor),
        }
    }

    /// Stream `range` and keep the first `count` jokes passing `filter`
    pub async fn sample_from(
        &self,
        range: RandomRange,
        count: usize,
        filter: &JokeFilter,
    ) -> Result<Vec<Joke>, AppError> {
        let mut picked = Vec::with_capacity(count.min(range.limit).min(MAX_PREALLOCATED));
        if count == 0 {
            return Ok(picked);
        }

        let mut rows = self.store.random_range(range);
        while let Some(joke) = rows.try_next().await? {
            if joke.random_val.is_none() || !filter.matches(&joke) {
                continue;
            }
            picked.push(joke);
            if picked.len() >= count {
                break;
            }
        }

        Ok(picked)
    }
}

#[async_trait]
impl JokeSampler for RangeSampler {
    async fn sample(&self, count: usize, filter: &JokeFilter) -> Result<Vec<Joke>, AppError> {
        let range = self.random_range(count, &mut rand::thread_rng());
        tracing::debug!(
            threshold = range.threshold,
            ascending = range.ascending,
            limit = range.limit,
            "Sampling jokes"
        );
        self.sample_from(range, count, filter).await
    }
}

/// Up to `limit` distinct ids drawn without replacement
pub fn sample_identifiers<R: Rng + ?Sized>(
    ids: &[String],
    limit: usize,
    rng: &mut R,
) -> Vec<String> {
    ids.choose_multiple(rng, limit.min(ids.len()))
        .cloned()
        .collect()
}
