use crate::domain::note::{Note, Transition};
use crate::error::{AppError, Result};
use crate::services::note_store::NoteStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

/// Process-local note store.
///
/// Used when no database is configured. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: Mutex<HashMap<Uuid, Note>>,
}

impl MemoryNoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Note>> {
        self.notes.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn select(&self, predicate: impl Fn(&Note) -> bool) -> Vec<Note> {
        self.lock().values().filter(|n| predicate(n)).cloned().collect()
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn create(&self, note: &Note) -> Result<Uuid> {
        if note.is_published() {
            return Err(AppError::Validation("New notes must start unpublished".to_string()));
        }

        let mut notes = self.lock();
        if notes.contains_key(&note.id) {
            return Err(AppError::Internal);
        }
        notes.insert(note.id, note.clone());
        Ok(note.id)
    }

    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>> {
        Ok(self.lock().get(&note_id).cloned())
    }

    async fn find_publishable(&self, now: OffsetDateTime) -> Result<Vec<Note>> {
        let mut due = self.select(|n| n.is_publish_due(now));
        due.sort_by_key(|n| n.publish_time);
        Ok(due)
    }

    async fn find_expirable(&self, now: OffsetDateTime) -> Result<Vec<Note>> {
        let mut due = self.select(|n| n.is_expiry_due(now));
        due.sort_by_key(Note::expiry_time);
        Ok(due)
    }

    async fn find_visible(&self, room_id: Uuid, user_id: Uuid, now: OffsetDateTime) -> Result<Vec<Note>> {
        let mut visible = self.select(|n| {
            n.room_id == room_id
                && !n.is_deleted()
                && (n.sender_id == user_id || n.expiry_time().is_some_and(|expiry| expiry > now))
        });
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(visible)
    }

    async fn update(&self, transition: &Transition) -> Result<bool> {
        let mut notes = self.lock();
        let Some(current) = notes.get(&transition.note_id()) else {
            return Ok(false);
        };

        match current.apply(transition) {
            Some(next) => {
                notes.insert(next.id, next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
