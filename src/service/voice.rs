//! Voice sample uploads

use std::sync::Arc;

use chrono::Utc;

use crate::data::{JokeStore, UserList, Voice};
use crate::error::AppError;
use crate::storage::{ObjectStore, audio_extension};

pub struct VoiceService {
    store: Arc<dyn JokeStore>,
    objects: Arc<dyn ObjectStore>,
}

impl VoiceService {
    pub fn new(store: Arc<dyn JokeStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    /// Upload a sample and attach it to the user
    pub async fn register_voice(
        &self,
        user_id: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<Voice, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("voice name is required".to_string()));
        }
        if data.is_empty() {
            return Err(AppError::Validation("voice file is empty".to_string()));
        }
        if !content_type.trim().to_ascii_lowercase().starts_with("audio/") {
            return Err(AppError::Validation(format!(
                "unsupported voice file type: {content_type}"
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let key = format!("voices/{}.{}", id, audio_extension(content_type));
        let stored = self.objects.put(&key, data, content_type).await?;

        let voice = Voice {
            id,
            creator_id: user_id.to_string(),
            name: name.to_string(),
            audio_url: stored.url,
            created_at: Utc::now(),
        };
        self.store.insert_voice(&voice).await?;
        self.store
            .add_to_list(user_id, UserList::Voices, &voice.id)
            .await?;

        tracing::info!(user_id, voice_id = %voice.id, size = stored.size, "Voice registered");
        Ok(voice)
    }

    pub async fn list_voices(&self, user_id: &str) -> Result<Vec<Voice>, AppError> {
        self.store.list_voices(user_id).await
    }
}
