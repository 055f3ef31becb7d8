//! Voice sample endpoints

use axum::{
    extract::{Multipart, Path, State},
    response::Json,
};

use super::dto::VoiceListResponse;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::Voice;
use crate::error::AppError;

/// POST /api/users/:uid/voices
///
/// Multipart form with a `name` text field and a `file` audio field.
pub async fn upload_voice(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Voice>, AppError> {
    if session.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let mut name = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("invalid name field: {e}")))?;
                name = Some(text);
            }
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("invalid file field: {e}")))?;
                file = Some((data.to_vec(), content_type));
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| AppError::Validation("name is required".to_string()))?;
    let (data, content_type) =
        file.ok_or_else(|| AppError::Validation("file is required".to_string()))?;

    let voice = state
        .voices
        .register_voice(&user_id, &name, data, &content_type)
        .await?;
    Ok(Json(voice))
}

/// GET /api/users/:uid/voices
pub async fn list_voices(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<VoiceListResponse>, AppError> {
    if session.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    let voices = state.voices.list_voices(&user_id).await?;
    Ok(Json(VoiceListResponse { voices }))
}
