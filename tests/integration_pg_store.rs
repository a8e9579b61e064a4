#![allow(clippy::unwrap_used, clippy::panic, clippy::todo, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, clippy::cast_precision_loss, clippy::clone_on_ref_ptr, clippy::match_same_arms, clippy::items_after_statements, unreachable_pub, clippy::print_stdout, clippy::similar_names)]
//! Runs against a real PostgreSQL only when `DATABASE_URL` is set.
use lovenotes_server::adapters::database::{self, DbPool, note_repo::PgNoteStore};
use lovenotes_server::config::DatabaseConfig;
use lovenotes_server::domain::note::{NewNote, Note, NoteStatus, VoiceAttachment};
use lovenotes_server::services::note_store::NoteStore;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

mod common;

async fn get_test_pool() -> Option<DbPool> {
    common::setup_tracing();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, skipping PostgreSQL store test");
        return None;
    };

    let config = DatabaseConfig { connect_max_retries: 1, ..DatabaseConfig::default() };
    let pool = database::init_pool(&config, &url).await.expect("Failed to connect to DB. Is Postgres running?");
    database::run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

/// Truncated to microseconds, the precision PostgreSQL keeps.
fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000).unwrap()
}

fn text_note(room: Uuid, sender: Uuid, created: OffsetDateTime) -> Note {
    let new_note = NewNote::validate(sender, room, Some("from postgres"), None, None, 500).unwrap();
    Note::pending(new_note, created, Duration::hours(24)).unwrap()
}

#[tokio::test]
async fn test_create_and_find_roundtrip() {
    let Some(pool) = get_test_pool().await else { return };
    let store = PgNoteStore::new(pool);

    let created = now();
    let new_note = NewNote::validate(
        Uuid::new_v4(),
        Uuid::new_v4(),
        None,
        Some(VoiceAttachment { url: "blobs/voice.webm".to_string(), duration_secs: Some(12) }),
        Some("blobs/photo.jpg".to_string()),
        500,
    )
    .unwrap();
    let note = Note::pending(new_note, created, Duration::hours(24)).unwrap();

    assert_eq!(store.create(&note).await.unwrap(), note.id);
    let stored = store.find_by_id(note.id).await.unwrap().unwrap();
    assert_eq!(stored, note);

    assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_conditional_updates() {
    let Some(pool) = get_test_pool().await else { return };
    let store = PgNoteStore::new(pool);

    let created = now() - Duration::days(10);
    let note = text_note(Uuid::new_v4(), Uuid::new_v4(), created);
    store.create(&note).await.unwrap();

    let publish_at = created + Duration::hours(24);
    let first = note.plan_publish(publish_at, Duration::days(3)).unwrap();
    let second = note.plan_publish(publish_at + Duration::minutes(1), Duration::days(3)).unwrap();

    assert!(store.update(&first).await.unwrap());
    assert!(!store.update(&second).await.unwrap());

    let published = store.find_by_id(note.id).await.unwrap().unwrap();
    assert_eq!(published.status, NoteStatus::Published { expiry_time: publish_at + Duration::days(3) });

    let expire = published.plan_expire(now()).unwrap();
    assert!(store.update(&expire).await.unwrap());
    assert!(!store.update(&expire).await.unwrap());

    let deleted = store.find_by_id(note.id).await.unwrap().unwrap();
    assert!(deleted.is_deleted());
    assert_eq!(deleted.expiry_time(), Some(publish_at + Duration::days(3)));
}

#[tokio::test]
async fn test_due_queries() {
    let Some(pool) = get_test_pool().await else { return };
    let store = PgNoteStore::new(pool);
    let t = now();

    let due = text_note(Uuid::new_v4(), Uuid::new_v4(), t - Duration::hours(25));
    let not_due = text_note(Uuid::new_v4(), Uuid::new_v4(), t - Duration::hours(1));
    store.create(&due).await.unwrap();
    store.create(&not_due).await.unwrap();

    let publishable: Vec<Uuid> = store.find_publishable(t).await.unwrap().into_iter().map(|n| n.id).collect();
    assert!(publishable.contains(&due.id));
    assert!(!publishable.contains(&not_due.id));

    let transition = due.plan_publish(t - Duration::days(4), Duration::days(3)).unwrap();
    assert!(store.update(&transition).await.unwrap());

    let expirable: Vec<Uuid> = store.find_expirable(t).await.unwrap().into_iter().map(|n| n.id).collect();
    assert!(expirable.contains(&due.id));
    assert!(!expirable.contains(&not_due.id));
}

#[tokio::test]
async fn test_visibility_query() {
    let Some(pool) = get_test_pool().await else { return };
    let store = PgNoteStore::new(pool);
    let t = now();
    let room = Uuid::new_v4();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let pending = text_note(room, alice, t - Duration::hours(2));
    let live = text_note(room, alice, t - Duration::hours(30));
    let lapsed = text_note(room, alice, t - Duration::days(5));
    let elsewhere = text_note(Uuid::new_v4(), alice, t - Duration::hours(30));
    for note in [&pending, &live, &lapsed, &elsewhere] {
        store.create(note).await.unwrap();
    }
    let publish = |n: &Note| n.plan_publish(n.publish_time, Duration::days(3)).unwrap();
    assert!(store.update(&publish(&live)).await.unwrap());
    assert!(store.update(&publish(&lapsed)).await.unwrap());
    assert!(store.update(&publish(&elsewhere)).await.unwrap());

    let ids = |notes: Vec<Note>| notes.into_iter().map(|n| n.id).collect::<Vec<_>>();

    // Lapsed but not yet swept is hidden from the partner and still listed for the sender.
    assert_eq!(ids(store.find_visible(room, bob, t).await.unwrap()), vec![live.id]);
    assert_eq!(ids(store.find_visible(room, alice, t).await.unwrap()), vec![pending.id, live.id, lapsed.id]);

    let expire = store.find_by_id(lapsed.id).await.unwrap().unwrap().plan_expire(t).unwrap();
    assert!(store.update(&expire).await.unwrap());
    assert_eq!(ids(store.find_visible(room, alice, t).await.unwrap()), vec![pending.id, live.id]);
}

#[tokio::test]
async fn test_schema_rejects_incoherent_flags() {
    let Some(pool) = get_test_pool().await else { return };
    let store = PgNoteStore::new(pool.clone());
    let t = now();
    let room = Uuid::new_v4();
    let sender = Uuid::new_v4();

    let good = text_note(room, sender, t - Duration::hours(1));
    store.create(&good).await.unwrap();

    // Deleted without ever being published.
    let result = sqlx::query(
        "INSERT INTO notes (id, sender_id, room_id, content, created_at, publish_time, is_published, is_deleted)
         VALUES ($1, $2, $3, 'bad', $4, $4, FALSE, TRUE)",
    )
    .bind(Uuid::new_v4())
    .bind(sender)
    .bind(room)
    .bind(t)
    .execute(&pool)
    .await;
    assert!(result.is_err());

    let visible = store.find_visible(room, sender, t).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, good.id);
}
