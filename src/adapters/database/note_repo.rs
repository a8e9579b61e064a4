use crate::adapters::database::DbPool;
use crate::adapters::database::records::NoteRecord;
use crate::domain::note::{Note, Transition};
use crate::error::Result;
use crate::services::note_store::NoteStore;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

const NOTE_COLUMNS: &str = "id, sender_id, room_id, content, voice_url, voice_duration_secs, image_url, \
                            created_at, publish_time, is_published, expiry_time, is_deleted";

/// PostgreSQL-backed note store.
#[derive(Clone, Debug)]
pub struct PgNoteStore {
    pool: DbPool,
}

impl PgNoteStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Converts rows, dropping (and logging) any row whose flags no transition
    /// could have produced so one bad record cannot wedge a whole batch.
    fn into_notes(records: Vec<NoteRecord>) -> Vec<Note> {
        records
            .into_iter()
            .filter_map(|record| match Note::try_from(record) {
                Ok(note) => Some(note),
                Err(e) => {
                    tracing::error!(error = %e, "Skipping corrupt note record");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl NoteStore for PgNoteStore {
    #[tracing::instrument(level = "debug", skip(self, note), fields(note.id = %note.id))]
    async fn create(&self, note: &Note) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        let (voice_url, voice_duration_secs) =
            note.voice.as_ref().map_or((None, None), |v| (Some(v.url.as_str()), v.duration_secs));

        sqlx::query(
            r"
            INSERT INTO notes (id, sender_id, room_id, content, voice_url, voice_duration_secs, image_url,
                               created_at, publish_time, is_published, expiry_time, is_deleted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, NULL, FALSE)
            ",
        )
        .bind(note.id)
        .bind(note.sender_id)
        .bind(note.room_id)
        .bind(note.content.as_deref())
        .bind(voice_url)
        .bind(voice_duration_secs)
        .bind(note.image_url.as_deref())
        .bind(note.created_at)
        .bind(note.publish_time)
        .execute(&mut *conn)
        .await?;

        Ok(note.id)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>> {
        let mut conn = self.pool.acquire().await?;
        let record = sqlx::query_as::<_, NoteRecord>(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"))
            .bind(note_id)
            .fetch_optional(&mut *conn)
            .await?;

        record.map(Note::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_publishable(&self, now: OffsetDateTime) -> Result<Vec<Note>> {
        let mut conn = self.pool.acquire().await?;
        let records = sqlx::query_as::<_, NoteRecord>(&format!(
            r"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE is_published = FALSE
              AND is_deleted = FALSE
              AND publish_time <= $1
            ORDER BY publish_time ASC
            "
        ))
        .bind(now)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Self::into_notes(records))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_expirable(&self, now: OffsetDateTime) -> Result<Vec<Note>> {
        let mut conn = self.pool.acquire().await?;
        let records = sqlx::query_as::<_, NoteRecord>(&format!(
            r"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE is_published = TRUE
              AND is_deleted = FALSE
              AND expiry_time <= $1
            ORDER BY expiry_time ASC
            "
        ))
        .bind(now)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Self::into_notes(records))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_visible(&self, room_id: Uuid, user_id: Uuid, now: OffsetDateTime) -> Result<Vec<Note>> {
        let mut conn = self.pool.acquire().await?;
        let records = sqlx::query_as::<_, NoteRecord>(&format!(
            r"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE room_id = $1
              AND is_deleted = FALSE
              AND (sender_id = $2 OR (is_published = TRUE AND expiry_time > $3))
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(room_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Self::into_notes(records))
    }

    #[tracing::instrument(level = "debug", skip(self), fields(note.id = %transition.note_id()))]
    async fn update(&self, transition: &Transition) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;

        // The WHERE clause carries the precondition, so a concurrent writer
        // that already moved the note turns this into a zero-row update.
        let result = match *transition {
            Transition::Publish { note_id, published_at, expiry_time } => {
                sqlx::query(
                    r"
                    UPDATE notes
                    SET is_published = TRUE, published_at = $2, expiry_time = $3
                    WHERE id = $1 AND is_published = FALSE AND is_deleted = FALSE
                    ",
                )
                .bind(note_id)
                .bind(published_at)
                .bind(expiry_time)
                .execute(&mut *conn)
                .await?
            }
            Transition::Expire { note_id } => {
                sqlx::query(
                    r"
                    UPDATE notes
                    SET is_deleted = TRUE
                    WHERE id = $1 AND is_published = TRUE AND is_deleted = FALSE
                    ",
                )
                .bind(note_id)
                .execute(&mut *conn)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
