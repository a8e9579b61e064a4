use crate::domain::projection::NoteView;
use crate::services::note_service::NoteDraft;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "voiceMessage")]
    pub voice_url: Option<String>,
    #[serde(default)]
    pub voice_duration: Option<i32>,
    #[serde(default, alias = "imageData")]
    pub image_url: Option<String>,
}

impl From<CreateNoteRequest> for NoteDraft {
    fn from(req: CreateNoteRequest) -> Self {
        // Older clients send empty strings instead of omitting absent attachments.
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        Self {
            content: req.content,
            voice_url: non_empty(req.voice_url),
            voice_duration_secs: req.voice_duration,
            image_url: non_empty(req.image_url),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub publish_time: OffsetDateTime,
    pub is_published: bool,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<OffsetDateTime>,
    pub is_own: bool,
    pub has_voice: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_duration: Option<i32>,
    pub has_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Milliseconds until automatic publishing; only present while pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_until_publish: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_until_publish_label: Option<String>,
    /// Fractional days until the note disappears; only present once published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_until_expiry: Option<f64>,
}

impl From<NoteView> for NoteResponse {
    fn from(view: NoteView) -> Self {
        let has_voice = view.has_voice();
        let has_image = view.has_image();
        let (voice_url, voice_duration) = view.voice.map_or((None, None), |v| (Some(v.url), v.duration_secs));

        Self {
            id: view.id,
            sender_id: view.sender_id,
            content: view.content,
            created_at: view.created_at,
            publish_time: view.publish_time,
            is_published: view.is_published,
            expiry_time: view.expiry_time,
            is_own: view.is_own,
            has_voice,
            voice_url,
            voice_duration,
            has_image,
            image_url: view.image_url,
            time_until_publish: view.time_until_publish_ms,
            time_until_publish_label: view.time_until_publish_label,
            days_until_expiry: view.days_until_expiry,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteEnvelope {
    pub message: String,
    pub note: NoteResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListNotesResponse {
    pub notes: Vec<NoteResponse>,
    pub count: usize,
}
