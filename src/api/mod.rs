//! API layer
//!
//! HTTP handlers for:
//! - Joke catalogue, generation and audio
//! - Per-user feed and preference lists
//! - Voice uploads
//! - Metrics (Prometheus)

mod dto;
mod jokes;
pub mod metrics;
mod users;
mod voices;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

pub use dto::*;
pub use metrics::metrics_router;

use crate::AppState;

/// Largest accepted voice upload
const MAX_VOICE_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create the `/api` router
///
/// Handlers that need a signed-in user take `CurrentUser`, which rejects
/// anonymous requests with 401.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Jokes
        .route("/jokes", get(jokes::list_jokes).post(jokes::create_joke))
        .route("/jokes/generate", post(jokes::generate_jokes))
        .route("/jokes/:id", get(jokes::get_joke))
        .route("/jokes/:id/audio", get(jokes::joke_audio))
        // Feed
        .route("/users/:uid/jokes/get", post(users::get_feed))
        // Preference lists
        .route(
            "/users/:uid/favorites",
            get(users::favorites).post(users::add_favorite),
        )
        .route(
            "/users/:uid/favorites/:jid",
            axum::routing::delete(users::remove_favorite),
        )
        .route("/users/:uid/liked-jokes", get(users::liked_jokes))
        .route("/users/:uid/disliked-jokes", get(users::disliked_jokes))
        .route("/users/:uid/like-history/:jid", post(users::like))
        .route("/users/:uid/dislike-history/:jid", post(users::dislike))
        .route("/users/:uid/created-jokes", get(users::created_jokes))
        .route(
            "/users/:uid/created-jokes/:jid",
            axum::routing::delete(users::delete_created),
        )
        .route(
            "/users/:uid/joke-jar",
            get(users::joke_jar).post(users::add_to_jar),
        )
        .route(
            "/users/:uid/joke-jar/:jid",
            axum::routing::delete(users::remove_from_jar),
        )
        // Voices
        .route(
            "/users/:uid/voices",
            get(voices::list_voices)
                .post(voices::upload_voice)
                .layer(DefaultBodyLimit::max(MAX_VOICE_UPLOAD_BYTES)),
        )
}
