//! SQLite database operations
//!
//! All database access goes through this module.
//! List-valued fields are JSON arrays updated in place with the JSON1
//! functions, so each list mutation is one statement.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use super::models::*;
use super::store::{JokeStore, ListMove, RandomRange, SaveOutcome};
use crate::error::AppError;
use crate::metrics::observe_db_query;

macro_rules! joke_select {
    ($tail:literal) => {
        concat!(
            "SELECT id, joke_setup, joke_punchline, joke_content, emoji, scenarios, age_range, \
             default_audio_url, audio_urls, created_by_customer, creator_id, created_at, random_val \
             FROM jokes ",
            $tail
        )
    };
}

const USER_SELECT: &str = "SELECT id, display_name, email, favorites, like_history, \
     dislike_history, creation_history, joke_jar, voices, voice_to_use, created_at \
     FROM users WHERE id = ?";

const RANDOM_ASC_SQL: &str = joke_select!(
    "WHERE random_val IS NOT NULL AND random_val >= ? ORDER BY random_val ASC LIMIT ?"
);
const RANDOM_DESC_SQL: &str = joke_select!(
    "WHERE random_val IS NOT NULL AND random_val <= ? ORDER BY random_val DESC LIMIT ?"
);

// SQLite caps bound parameters per statement
const ID_CHUNK_SIZE: usize = 500;

/// Database connection pool wrapper.
pub struct Database {
    pub(super) pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the SQLite file and run migrations
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    async fn insert_user_if_missing(
        &self,
        id: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, email, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, users.display_name),
                email = COALESCE(excluded.email, users.email)
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(email)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        observe_db_query("upsert", "users");
        Ok(())
    }
}

#[async_trait]
impl JokeStore for Database {
    async fn get_joke(&self, id: &str) -> Result<Option<Joke>, AppError> {
        let row = sqlx::query_as::<_, JokeRow>(joke_select!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        observe_db_query("select", "jokes");
        row.map(JokeRow::into_joke).transpose()
    }

    async fn get_jokes(&self, ids: &[String]) -> Result<Vec<Joke>, AppError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut by_id = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let mut query_builder = QueryBuilder::<Sqlite>::new(joke_select!("WHERE id IN ("));
            {
                let mut separated = query_builder.separated(", ");
                for id in chunk {
                    separated.push_bind(id);
                }
            }
            query_builder.push(")");

            let rows = query_builder
                .build_query_as::<JokeRow>()
                .fetch_all(&self.pool)
                .await?;
            observe_db_query("select", "jokes");

            for row in rows {
                let joke = row.into_joke()?;
                by_id.insert(joke.id.clone(), joke);
            }
        }

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn list_jokes(&self, limit: usize) -> Result<Vec<Joke>, AppError> {
        let rows = sqlx::query_as::<_, JokeRow>(joke_select!("ORDER BY created_at DESC LIMIT ?"))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        observe_db_query("select", "jokes");
        rows.into_iter().map(JokeRow::into_joke).collect()
    }

    async fn find_by_text(
        &self,
        setup: &str,
        punchline: &str,
    ) -> Result<Option<Joke>, AppError> {
        let row = sqlx::query_as::<_, JokeRow>(joke_select!(
            "WHERE joke_setup = ? AND joke_punchline = ?"
        ))
        .bind(setup)
        .bind(punchline)
        .fetch_optional(&self.pool)
        .await?;

        observe_db_query("select", "jokes");
        row.map(JokeRow::into_joke).transpose()
    }

    async fn save_joke(&self, joke: &Joke) -> Result<SaveOutcome, AppError> {
        let scenarios = serde_json::to_string(&joke.scenarios)
            .map_err(|e| AppError::Internal(e.into()))?;
        let age_range = serde_json::to_string(&joke.age_range)
            .map_err(|e| AppError::Internal(e.into()))?;
        let audio_urls = serde_json::to_string(&joke.audio_urls)
            .map_err(|e| AppError::Internal(e.into()))?;

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO jokes (
                id, joke_setup, joke_punchline, joke_content, emoji, scenarios, age_range,
                default_audio_url, audio_urls, created_by_customer, creator_id, created_at,
                random_val
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(joke_setup, joke_punchline) DO UPDATE SET
                scenarios = (
                    SELECT json_group_array(value) FROM (
                        SELECT value FROM json_each(jokes.scenarios)
                        UNION
                        SELECT value FROM json_each(excluded.scenarios)
                    )
                ),
                age_range = (
                    SELECT json_group_array(value) FROM (
                        SELECT value FROM json_each(jokes.age_range)
                        UNION
                        SELECT value FROM json_each(excluded.age_range)
                    )
                )
            RETURNING id
            "#,
        )
        .bind(&joke.id)
        .bind(&joke.setup)
        .bind(&joke.punchline)
        .bind(&joke.content)
        .bind(&joke.emoji)
        .bind(scenarios)
        .bind(age_range)
        .bind(&joke.default_audio_url)
        .bind(audio_urls)
        .bind(joke.created_by_customer)
        .bind(&joke.creator_id)
        .bind(joke.created_at)
        .bind(joke.random_val)
        .fetch_one(&self.pool)
        .await?;

        observe_db_query("upsert", "jokes");
        let merged = id != joke.id;
        Ok(SaveOutcome { id, merged })
    }

    fn random_range(&self, range: RandomRange) -> BoxStream<'_, Result<Joke, AppError>> {
        let sql = if range.ascending {
            RANDOM_ASC_SQL
        } else {
            RANDOM_DESC_SQL
        };
        observe_db_query("sample", "jokes");

        sqlx::query_as::<_, JokeRow>(sql)
            .bind(range.threshold)
            .bind(i64::try_from(range.limit).unwrap_or(i64::MAX))
            .fetch(&self.pool)
            .map(|row| row.map_err(AppError::from).and_then(JokeRow::into_joke))
            .boxed()
    }

    async fn set_default_audio(&self, joke_id: &str, audio: &AudioUrl) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT audio_urls FROM jokes WHERE id = ?")
                .bind(joke_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Err(AppError::NotFound);
        };

        let parsed: serde_json::Value =
            serde_json::from_str(&current).unwrap_or(serde_json::Value::Null);
        let mut urls = normalize_audio_urls(&parsed);
        urls.retain(|existing| existing.voice_id != audio.voice_id);
        urls.push(audio.clone());
        let encoded = serde_json::to_string(&urls).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query("UPDATE jokes SET default_audio_url = ?, audio_urls = ? WHERE id = ?")
            .bind(&audio.audio_url)
            .bind(encoded)
            .bind(joke_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        observe_db_query("update", "jokes");
        Ok(())
    }

    async fn insert_audio_metadata(&self, metadata: &AudioMetadata) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audio_metadata (joke_id, voice_id, audio_url, size_bytes, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metadata.joke_id)
        .bind(&metadata.voice_id)
        .bind(&metadata.audio_url)
        .bind(metadata.size_bytes)
        .bind(metadata.created_at)
        .execute(&self.pool)
        .await?;

        observe_db_query("insert", "audio_metadata");
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(USER_SELECT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        observe_db_query("select", "users");
        row.map(UserRow::into_user).transpose()
    }

    async fn ensure_user(
        &self,
        id: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), AppError> {
        self.insert_user_if_missing(id, display_name, email).await
    }

    async fn add_to_list(
        &self,
        user_id: &str,
        list: UserList,
        value: &str,
    ) -> Result<bool, AppError> {
        self.insert_user_if_missing(user_id, None, None).await?;

        let column = list.column();
        let sql = format!(
            "UPDATE users SET {column} = json_insert({column}, '$[#]', ?) \
             WHERE id = ? AND NOT EXISTS (SELECT 1 FROM json_each(users.{column}) WHERE value = ?)"
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(user_id)
            .bind(value)
            .execute(&self.pool)
            .await?;

        observe_db_query("update", "users");
        Ok(result.rows_affected() > 0)
    }

    async fn remove_from_list(
        &self,
        user_id: &str,
        list: UserList,
        value: &str,
    ) -> Result<bool, AppError> {
        let column = list.column();
        let sql = format!(
            "UPDATE users SET {column} = \
                (SELECT json_group_array(value) FROM json_each(users.{column}) WHERE value <> ?) \
             WHERE id = ? AND EXISTS (SELECT 1 FROM json_each(users.{column}) WHERE value = ?)"
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(user_id)
            .bind(value)
            .execute(&self.pool)
            .await?;

        observe_db_query("update", "users");
        Ok(result.rows_affected() > 0)
    }

    async fn move_to_list(
        &self,
        user_id: &str,
        into: UserList,
        evict_from: UserList,
        value: &str,
    ) -> Result<ListMove, AppError> {
        let into_col = into.column();
        let from_col = evict_from.column();
        let mut tx = self.pool.begin().await?;

        // Taking the write lock first keeps the read and update below consistent.
        sqlx::query("INSERT INTO users (id, created_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(user_id)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await?;

        let presence_sql = format!(
            "SELECT \
                EXISTS (SELECT 1 FROM json_each(users.{into_col}) WHERE value = ?), \
                EXISTS (SELECT 1 FROM json_each(users.{from_col}) WHERE value = ?) \
             FROM users WHERE id = ?"
        );
        let (already_present, was_in_other): (bool, bool) = sqlx::query_as(&presence_sql)
            .bind(value)
            .bind(value)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let update_sql = format!(
            "UPDATE users SET \
                {into_col} = CASE WHEN ? THEN {into_col} ELSE json_insert({into_col}, '$[#]', ?) END, \
                {from_col} = (SELECT json_group_array(value) FROM json_each(users.{from_col}) WHERE value <> ?) \
             WHERE id = ?"
        );
        sqlx::query(&update_sql)
            .bind(already_present)
            .bind(value)
            .bind(value)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        observe_db_query("update", "users");

        Ok(ListMove {
            added: !already_present,
            evicted: was_in_other,
        })
    }

    async fn adjust_metadata(
        &self,
        joke_id: &str,
        counter: MetadataCounter,
        delta: i64,
    ) -> Result<(), AppError> {
        let column = counter.column();
        let sql = format!(
            "INSERT INTO joke_metadata (joke_id, {column}) VALUES (?, MAX(0, ?)) \
             ON CONFLICT(joke_id) DO UPDATE SET {column} = MAX(0, joke_metadata.{column} + ?)"
        );
        sqlx::query(&sql)
            .bind(joke_id)
            .bind(delta)
            .bind(delta)
            .execute(&self.pool)
            .await?;

        observe_db_query("upsert", "joke_metadata");
        Ok(())
    }

    async fn get_metadata(&self, joke_id: &str) -> Result<Option<JokeMetadata>, AppError> {
        let metadata = sqlx::query_as::<_, JokeMetadata>(
            "SELECT joke_id, liked_times, disliked_times, saved_to_favorite_times \
             FROM joke_metadata WHERE joke_id = ?",
        )
        .bind(joke_id)
        .fetch_optional(&self.pool)
        .await?;

        observe_db_query("select", "joke_metadata");
        Ok(metadata)
    }

    async fn insert_voice(&self, voice: &Voice) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO voices (id, creator_id, name, audio_url, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&voice.id)
        .bind(&voice.creator_id)
        .bind(&voice.name)
        .bind(&voice.audio_url)
        .bind(voice.created_at)
        .execute(&self.pool)
        .await?;

        observe_db_query("insert", "voices");
        Ok(())
    }

    async fn list_voices(&self, creator_id: &str) -> Result<Vec<Voice>, AppError> {
        let voices = sqlx::query_as::<_, Voice>(
            "SELECT id, creator_id, name, audio_url, created_at FROM voices \
             WHERE creator_id = ? ORDER BY created_at ASC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;

        observe_db_query("select", "voices");
        Ok(voices)
    }
}
