//! Request and response bodies

use serde::{Deserialize, Serialize};

use crate::data::{Joke, JokeCandidate, Voice};

/// `?limit=` on list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// Body of the feed and generate endpoints
#[derive(Debug, Default, Deserialize)]
pub struct JokeQueryRequest {
    #[serde(default)]
    pub age_range: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
}

/// Body of `POST /api/jokes`
#[derive(Debug, Deserialize)]
pub struct CreateJokeRequest {
    pub joke_setup: String,
    pub joke_punchline: String,
    #[serde(default)]
    pub joke_content: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub age_range: Vec<String>,
}

/// Body naming a joke
#[derive(Debug, Deserialize)]
pub struct JokeIdRequest {
    pub joke_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JokeListResponse {
    pub jokes: Vec<Joke>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedJokesResponse {
    pub jokes: Vec<JokeCandidate>,
}

/// Outcome of a preference mutation
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    pub message: String,
    pub success: bool,
    pub joke_id: String,
    pub user_id: String,
}

impl MutationResponse {
    pub fn new(message: &str, success: bool, joke_id: String, user_id: String) -> Self {
        Self {
            message: message.to_string(),
            success,
            joke_id,
            user_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AudioResponse {
    pub joke_id: String,
    pub audio_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceListResponse {
    pub voices: Vec<Voice>,
}
