//! Joke catalogue, generation and audio endpoints

use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use super::dto::{
    AudioResponse, CreateJokeRequest, GeneratedJokesResponse, JokeListResponse, JokeQueryRequest,
    ListParams,
};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::Joke;
use crate::error::AppError;
use crate::service::{GenerationRequest, NewJoke};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;

/// GET /api/jokes
pub async fn list_jokes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<JokeListResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);
    let jokes = state.store.list_jokes(limit).await?;
    Ok(Json(JokeListResponse { jokes }))
}

/// GET /api/jokes/:id
pub async fn get_joke(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Joke>, AppError> {
    let joke = state.store.get_joke(&id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(joke))
}

/// POST /api/jokes
pub async fn create_joke(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(body): Json<CreateJokeRequest>,
) -> Result<Json<Joke>, AppError> {
    let joke = state
        .preferences
        .create(
            &session.user_id,
            NewJoke {
                setup: body.joke_setup,
                punchline: body.joke_punchline,
                content: body.joke_content,
                emoji: body.emoji,
                scenarios: body.scenarios,
                age_range: body.age_range,
            },
        )
        .await?;
    Ok(Json(joke))
}

/// POST /api/jokes/generate
///
/// Authenticated callers get prompts seeded with their likes and dislikes.
/// Nothing is saved.
pub async fn generate_jokes(
    State(state): State<AppState>,
    MaybeUser(session): MaybeUser,
    Json(body): Json<JokeQueryRequest>,
) -> Result<Json<GeneratedJokesResponse>, AppError> {
    let age_range = required(body.age_range.as_deref(), "age_range")?;
    let scenario = required(body.scenario.as_deref(), "scenario")?;
    let feed = &state.config.feed;
    let count = feed.clamp_count(body.count, feed.generate_count);

    let (liked, disliked) = match &session {
        Some(session) => {
            let limit = state.config.feed.preference_context_limit;
            (
                state.preferences.random_liked(&session.user_id, limit).await?,
                state
                    .preferences
                    .random_disliked(&session.user_id, limit)
                    .await?,
            )
        }
        None => (Vec::new(), Vec::new()),
    };

    let jokes = state
        .generator
        .generate(GenerationRequest {
            age_range: Some(age_range),
            scenario: Some(scenario),
            count,
            liked: &liked,
            disliked: &disliked,
        })
        .await?;

    Ok(Json(GeneratedJokesResponse { jokes }))
}

/// GET /api/jokes/:id/audio
pub async fn joke_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AudioResponse>, AppError> {
    let audio_url = state.audio.resolve_audio(&id).await?;
    Ok(Json(AudioResponse {
        joke_id: id,
        audio_url,
    }))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}
