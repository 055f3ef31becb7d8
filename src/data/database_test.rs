//! Database tests

use super::*;
use crate::error::AppError;
use futures::TryStreamExt;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn joke_with(id: &str, setup: &str, random_val: Option<f64>) -> Joke {
    let mut joke = Joke::new(id.to_string(), setup, "Punchline", "creator", true);
    joke.random_val = random_val;
    joke
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
}

#[tokio::test]
async fn test_joke_insert_and_get() {
    let (db, _temp_dir) = create_test_db().await;

    let mut joke = joke_with("j1", "Why did the chicken cross the road?", Some(0.5));
    joke.scenarios = vec!["school".to_string()];
    joke.emoji = Some("🐔".to_string());

    let outcome = db.save_joke(&joke).await.unwrap();
    assert_eq!(outcome.id, "j1");
    assert!(!outcome.merged);

    let stored = db.get_joke("j1").await.unwrap().unwrap();
    assert_eq!(stored.setup, joke.setup);
    assert_eq!(stored.scenarios, vec!["school".to_string()]);
    assert_eq!(stored.emoji.as_deref(), Some("🐔"));
    assert_eq!(stored.random_val, Some(0.5));

    assert!(db.get_joke("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_save_merges_tags() {
    let (db, _temp_dir) = create_test_db().await;

    let mut first = joke_with("j1", "Same setup", Some(0.1));
    first.scenarios = vec!["school".to_string()];
    first.age_range = vec!["5-7".to_string()];
    db.save_joke(&first).await.unwrap();

    let mut second = joke_with("j2", "Same setup", Some(0.9));
    second.scenarios = vec!["bedtime".to_string(), "school".to_string()];
    second.age_range = vec!["8-10".to_string()];

    let outcome = db.save_joke(&second).await.unwrap();
    assert_eq!(outcome.id, "j1");
    assert!(outcome.merged);

    // Saving the same record again changes nothing
    db.save_joke(&second).await.unwrap();

    assert!(db.get_joke("j2").await.unwrap().is_none());
    let stored = db.get_joke("j1").await.unwrap().unwrap();
    let mut scenarios = stored.scenarios.clone();
    scenarios.sort();
    assert_eq!(scenarios, vec!["bedtime".to_string(), "school".to_string()]);
    let mut ages = stored.age_range.clone();
    ages.sort();
    assert_eq!(ages, vec!["5-7".to_string(), "8-10".to_string()]);
}

#[tokio::test]
async fn test_find_by_text_matches_exact_pair() {
    let (db, _temp_dir) = create_test_db().await;
    db.save_joke(&joke_with("j1", "Knock knock", Some(0.3)))
        .await
        .unwrap();

    let found = db.find_by_text("Knock knock", "Punchline").await.unwrap();
    assert_eq!(found.map(|j| j.id).as_deref(), Some("j1"));
    assert!(db.find_by_text("Knock knock", "Other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_jokes_preserves_order_and_drops_missing() {
    let (db, _temp_dir) = create_test_db().await;

    for (id, setup) in [("a", "Setup A"), ("b", "Setup B"), ("c", "Setup C")] {
        db.save_joke(&joke_with(id, setup, Some(0.5))).await.unwrap();
    }

    let ids = vec![
        "c".to_string(),
        "gone".to_string(),
        "a".to_string(),
    ];
    let jokes = db.get_jokes(&ids).await.unwrap();
    let got: Vec<&str> = jokes.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(got, vec!["c", "a"]);
}

#[tokio::test]
async fn test_random_range_direction_and_missing_random_val() {
    let (db, _temp_dir) = create_test_db().await;

    db.save_joke(&joke_with("low", "Low", Some(0.1))).await.unwrap();
    db.save_joke(&joke_with("mid", "Mid", Some(0.5))).await.unwrap();
    db.save_joke(&joke_with("high", "High", Some(0.9))).await.unwrap();
    db.save_joke(&joke_with("none", "None", None)).await.unwrap();

    let up: Vec<Joke> = db
        .random_range(RandomRange {
            threshold: 0.4,
            ascending: true,
            limit: 10,
        })
        .try_collect()
        .await
        .unwrap();
    let up_ids: Vec<&str> = up.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(up_ids, vec!["mid", "high"]);

    let down: Vec<Joke> = db
        .random_range(RandomRange {
            threshold: 0.6,
            ascending: false,
            limit: 1,
        })
        .try_collect()
        .await
        .unwrap();
    let down_ids: Vec<&str> = down.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(down_ids, vec!["mid"]);
}

#[tokio::test]
async fn test_user_lists_are_set_like() {
    let (db, _temp_dir) = create_test_db().await;

    assert!(db.add_to_list("u1", UserList::Favorites, "j1").await.unwrap());
    assert!(!db.add_to_list("u1", UserList::Favorites, "j1").await.unwrap());
    assert!(db.add_to_list("u1", UserList::Favorites, "j2").await.unwrap());

    let user = db.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.favorites, vec!["j1".to_string(), "j2".to_string()]);
    assert!(user.like_history.is_empty());

    assert!(db.remove_from_list("u1", UserList::Favorites, "j1").await.unwrap());
    assert!(!db.remove_from_list("u1", UserList::Favorites, "j1").await.unwrap());
    assert!(!db.remove_from_list("nobody", UserList::Favorites, "j1").await.unwrap());

    let user = db.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.favorites, vec!["j2".to_string()]);
}

#[tokio::test]
async fn test_like_and_dislike_are_mutually_exclusive() {
    let (db, _temp_dir) = create_test_db().await;

    let moved = db
        .move_to_list("u1", UserList::LikeHistory, UserList::DislikeHistory, "j1")
        .await
        .unwrap();
    assert_eq!(moved, ListMove { added: true, evicted: false });

    let moved = db
        .move_to_list("u1", UserList::DislikeHistory, UserList::LikeHistory, "j1")
        .await
        .unwrap();
    assert_eq!(moved, ListMove { added: true, evicted: true });

    let user = db.get_user("u1").await.unwrap().unwrap();
    assert!(user.like_history.is_empty());
    assert_eq!(user.dislike_history, vec!["j1".to_string()]);

    let moved = db
        .move_to_list("u1", UserList::DislikeHistory, UserList::LikeHistory, "j1")
        .await
        .unwrap();
    assert_eq!(moved, ListMove { added: false, evicted: false });
    let user = db.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.dislike_history, vec!["j1".to_string()]);
}

#[tokio::test]
async fn test_metadata_counters_floor_at_zero() {
    let (db, _temp_dir) = create_test_db().await;

    db.adjust_metadata("j1", MetadataCounter::Liked, -1).await.unwrap();
    let metadata = db.get_metadata("j1").await.unwrap().unwrap();
    assert_eq!(metadata.liked_times, 0);

    db.adjust_metadata("j1", MetadataCounter::Liked, 1).await.unwrap();
    db.adjust_metadata("j1", MetadataCounter::Liked, 1).await.unwrap();
    db.adjust_metadata("j1", MetadataCounter::Liked, -5).await.unwrap();
    db.adjust_metadata("j1", MetadataCounter::SavedToFavorite, 1).await.unwrap();

    let metadata = db.get_metadata("j1").await.unwrap().unwrap();
    assert_eq!(metadata.liked_times, 0);
    assert_eq!(metadata.saved_to_favorite_times, 1);
    assert_eq!(metadata.disliked_times, 0);
}

#[tokio::test]
async fn test_set_default_audio_normalizes_legacy_list() {
    let (db, _temp_dir) = create_test_db().await;
    db.save_joke(&joke_with("j1", "Audio", Some(0.3))).await.unwrap();

    sqlx::query("UPDATE jokes SET audio_urls = ? WHERE id = ?")
        .bind(r#"["https://audio.example.com/old.mp3"]"#)
        .bind("j1")
        .execute(&db.pool)
        .await
        .unwrap();

    let legacy = db.get_joke("j1").await.unwrap().unwrap();
    assert_eq!(legacy.audio_urls[0].voice_id, DEFAULT_VOICE_ID);

    let fresh = AudioUrl {
        voice_id: DEFAULT_VOICE_ID.to_string(),
        audio_url: "https://audio.example.com/new.mp3".to_string(),
    };
    db.set_default_audio("j1", &fresh).await.unwrap();

    let stored = db.get_joke("j1").await.unwrap().unwrap();
    assert_eq!(
        stored.default_audio_url.as_deref(),
        Some("https://audio.example.com/new.mp3")
    );
    assert_eq!(stored.audio_urls, vec![fresh]);

    let missing = db
        .set_default_audio("missing", &stored.audio_urls[0])
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::NotFound));
}

#[tokio::test]
async fn test_ensure_user_keeps_existing_lists() {
    let (db, _temp_dir) = create_test_db().await;

    db.add_to_list("u1", UserList::JokeJar, "j1").await.unwrap();
    db.ensure_user("u1", Some("Ada"), Some("ada@example.com"))
        .await
        .unwrap();

    let user = db.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.display_name.as_deref(), Some("Ada"));
    assert_eq!(user.joke_jar, vec!["j1".to_string()]);
}

#[tokio::test]
async fn test_voice_insert_and_list() {
    let (db, _temp_dir) = create_test_db().await;

    let voice = Voice {
        id: "v1".to_string(),
        creator_id: "u1".to_string(),
        name: "Grandma".to_string(),
        audio_url: "https://audio.example.com/voices/v1.wav".to_string(),
        created_at: chrono::Utc::now(),
    };
    db.insert_voice(&voice).await.unwrap();

    let voices = db.list_voices("u1").await.unwrap();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].name, "Grandma");
    assert!(db.list_voices("u2").await.unwrap().is_empty());
}
