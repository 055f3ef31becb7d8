//! Per-user endpoints: feed, preference lists and their mutations
//!
//! Every route is scoped by `:uid`. A caller may only touch their own
//! lists.

use axum::{
    extract::{Path, State},
    response::Json,
};

use super::dto::{JokeIdRequest, JokeListResponse, JokeQueryRequest, MutationResponse};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser, Session};
use crate::data::UserList;
use crate::error::AppError;
use crate::service::FeedRequest;

fn ensure_same_user(session: &Session, user_id: &str) -> Result<(), AppError> {
    if session.user_id != user_id {
        tracing::debug!(caller = %session.user_id, target = %user_id, "Cross-user access denied");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// POST /api/users/:uid/jokes/get
///
/// Anonymous callers may read any user's feed; signed-in callers only
/// their own.
pub async fn get_feed(
    State(state): State<AppState>,
    MaybeUser(session): MaybeUser,
    Path(user_id): Path<String>,
    Json(body): Json<JokeQueryRequest>,
) -> Result<Json<JokeListResponse>, AppError> {
    if let Some(session) = &session {
        ensure_same_user(session, &user_id)?;
    }

    let outcome = state
        .feed
        .compose_feed(FeedRequest {
            user_id,
            age_range: body.age_range,
            scenario: body.scenario,
            count: body.count,
        })
        .await?;

    Ok(Json(JokeListResponse {
        jokes: outcome.jokes,
    }))
}

async fn list_response(
    state: &AppState,
    session: &Session,
    user_id: &str,
    list: UserList,
) -> Result<Json<JokeListResponse>, AppError> {
    ensure_same_user(session, user_id)?;
    let jokes = state.preferences.jokes_in_list(user_id, list).await?;
    Ok(Json(JokeListResponse { jokes }))
}

/// GET /api/users/:uid/favorites
pub async fn favorites(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<JokeListResponse>, AppError> {
    list_response(&state, &session, &user_id, UserList::Favorites).await
}

/// GET /api/users/:uid/liked-jokes
pub async fn liked_jokes(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<JokeListResponse>, AppError> {
    list_response(&state, &session, &user_id, UserList::LikeHistory).await
}

/// GET /api/users/:uid/disliked-jokes
pub async fn disliked_jokes(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<JokeListResponse>, AppError> {
    list_response(&state, &session, &user_id, UserList::DislikeHistory).await
}

/// GET /api/users/:uid/created-jokes
pub async fn created_jokes(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<JokeListResponse>, AppError> {
    list_response(&state, &session, &user_id, UserList::CreationHistory).await
}

/// GET /api/users/:uid/joke-jar
pub async fn joke_jar(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<JokeListResponse>, AppError> {
    list_response(&state, &session, &user_id, UserList::JokeJar).await
}

/// POST /api/users/:uid/favorites
pub async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
    Json(body): Json<JokeIdRequest>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let added = state.preferences.favorite(&user_id, &body.joke_id).await?;
    let message = if added {
        "Joke added to favorites"
    } else {
        "Joke is already in favorites"
    };
    Ok(Json(MutationResponse::new(message, added, body.joke_id, user_id)))
}

/// DELETE /api/users/:uid/favorites/:jid
pub async fn remove_favorite(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((user_id, joke_id)): Path<(String, String)>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let removed = state.preferences.unfavorite(&user_id, &joke_id).await?;
    let message = if removed {
        "Joke removed from favorites"
    } else {
        "Joke was not in favorites"
    };
    Ok(Json(MutationResponse::new(message, removed, joke_id, user_id)))
}

/// POST /api/users/:uid/like-history/:jid
pub async fn like(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((user_id, joke_id)): Path<(String, String)>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let success = state.preferences.like(&user_id, &joke_id).await?;
    Ok(Json(MutationResponse::new(
        "Joke added to liked history",
        success,
        joke_id,
        user_id,
    )))
}

/// POST /api/users/:uid/dislike-history/:jid
pub async fn dislike(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((user_id, joke_id)): Path<(String, String)>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let success = state.preferences.dislike(&user_id, &joke_id).await?;
    Ok(Json(MutationResponse::new(
        "Joke added to disliked history",
        success,
        joke_id,
        user_id,
    )))
}

/// DELETE /api/users/:uid/created-jokes/:jid
pub async fn delete_created(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((user_id, joke_id)): Path<(String, String)>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let deleted = state
        .preferences
        .delete_created(&user_id, &joke_id)
        .await?;
    let message = if deleted {
        "Joke removed from your created jokes"
    } else {
        "Joke was not in your created jokes list"
    };
    Ok(Json(MutationResponse::new(message, deleted, joke_id, user_id)))
}

/// POST /api/users/:uid/joke-jar
pub async fn add_to_jar(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
    Json(body): Json<JokeIdRequest>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let added = state
        .preferences
        .add_to_jar(&user_id, &body.joke_id)
        .await?;
    let message = if added {
        "Joke added to joke jar"
    } else {
        "Joke is already in joke jar"
    };
    Ok(Json(MutationResponse::new(message, added, body.joke_id, user_id)))
}

/// DELETE /api/users/:uid/joke-jar/:jid
pub async fn remove_from_jar(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((user_id, joke_id)): Path<(String, String)>,
) -> Result<Json<MutationResponse>, AppError> {
    ensure_same_user(&session, &user_id)?;
    let removed = state
        .preferences
        .remove_from_jar(&user_id, &joke_id)
        .await?;
    let message = if removed {
        "Joke removed from joke jar"
    } else {
        "Joke was not in joke jar"
    };
    Ok(Json(MutationResponse::new(message, removed, joke_id, user_id)))
}
