use crate::domain::note::{Note, Transition};
use crate::error::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persistence port for notes.
///
/// Each note is written independently; nothing here spans several notes.
#[async_trait]
pub trait NoteStore: Send + Sync + std::fmt::Debug {
    /// Persists a new, unpublished note and returns its id.
    async fn create(&self, note: &Note) -> Result<Uuid>;

    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>>;

    /// Pending notes whose publish time has passed.
    async fn find_publishable(&self, now: OffsetDateTime) -> Result<Vec<Note>>;

    /// Published, not yet deleted notes whose expiry time has passed.
    async fn find_expirable(&self, now: OffsetDateTime) -> Result<Vec<Note>>;

    /// Notes in `room_id` that `user_id` may see, newest first: their own
    /// notes in any live state plus the partner's published, unexpired notes.
    /// Soft-deleted notes are never returned.
    async fn find_visible(&self, room_id: Uuid, user_id: Uuid, now: OffsetDateTime) -> Result<Vec<Note>>;

    /// Writes every field of `transition` in a single update that only matches
    /// while the note is still in `transition.required_state()`.
    ///
    /// Returns `false` when the guard did not match and nothing was written.
    async fn update(&self, transition: &Transition) -> Result<bool>;

    /// Cheap connectivity probe used by the readiness endpoint.
    async fn ping(&self) -> Result<()>;
}
