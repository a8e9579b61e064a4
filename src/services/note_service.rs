use crate::config::{LifecycleTimings, NoteConfig};
use crate::domain::clock::Clock;
use crate::domain::note::{NewNote, Note, VoiceAttachment};
use crate::domain::projection::NoteView;
use crate::error::Result;
use crate::services::note_store::NoteStore;
use crate::services::notification::{NoteEvent, NotificationDispatcher};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
    visible_count: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("lovenotes-server");
        Self {
            created_total: meter
                .u64_counter("lovenotes_notes_created_total")
                .with_description("Total note creation attempts")
                .build(),
            visible_count: meter
                .u64_histogram("lovenotes_visible_notes")
                .with_description("Number of notes returned by a single listing")
                .build(),
        }
    }
}

/// Raw note submission as it arrives from a client.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub content: Option<String>,
    pub voice_url: Option<String>,
    pub voice_duration_secs: Option<i32>,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NoteService {
    store: Arc<dyn NoteStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    timings: LifecycleTimings,
    config: NoteConfig,
    metrics: Metrics,
}

impl NoteService {
    #[must_use]
    pub fn new(
        store: Arc<dyn NoteStore>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        timings: LifecycleTimings,
        config: NoteConfig,
    ) -> Self {
        Self { store, dispatcher, clock, timings, config, metrics: Metrics::new() }
    }

    /// Creates a pending note scheduled for automatic publishing.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the draft carries no text, voice or image,
    /// or if the text is too long.
    /// Returns `AppError::Database` if the note cannot be stored.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, draft),
        fields(sender_id = %sender_id, note.id = tracing::field::Empty)
    )]
    pub async fn create_note(&self, sender_id: Uuid, room_id: Uuid, draft: NoteDraft) -> Result<NoteView> {
        let voice = draft.voice_url.map(|url| VoiceAttachment { url, duration_secs: draft.voice_duration_secs });
        let new_note = match NewNote::validate(
            sender_id,
            room_id,
            draft.content.as_deref(),
            voice,
            draft.image_url,
            self.config.max_content_chars,
        ) {
            Ok(n) => n,
            Err(e) => {
                self.metrics.created_total.add(1, &[KeyValue::new("status", "invalid")]);
                return Err(e);
            }
        };

        let now = self.clock.now();
        let note = Note::pending(new_note, now, self.timings.publish_delay)?;

        if let Err(e) = self.store.create(&note).await {
            self.metrics.created_total.add(1, &[KeyValue::new("status", "failure")]);
            return Err(e);
        }

        tracing::Span::current().record("note.id", tracing::field::display(note.id));
        tracing::debug!(publish_time = %note.publish_time, "Note stored");
        self.metrics.created_total.add(1, &[KeyValue::new("status", "success")]);
        self.dispatcher.dispatch(room_id, sender_id, NoteEvent::Created);

        Ok(NoteView::project(&note, sender_id, now))
    }

    /// Lists what `viewer_id` can currently see in `room_id`, newest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(viewer_id = %viewer_id))]
    pub async fn list_visible(&self, room_id: Uuid, viewer_id: Uuid) -> Result<Vec<NoteView>> {
        let now = self.clock.now();
        let notes = self.store.find_visible(room_id, viewer_id, now).await?;

        self.metrics.visible_count.record(notes.len() as u64, &[]);

        Ok(notes.iter().map(|note| NoteView::project(note, viewer_id, now)).collect())
    }
}
