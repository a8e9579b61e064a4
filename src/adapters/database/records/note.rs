use crate::domain::note::{Note, NoteStatus, VoiceAttachment};
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct NoteRecord {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) room_id: Uuid,
    pub(crate) content: Option<String>,
    pub(crate) voice_url: Option<String>,
    pub(crate) voice_duration_secs: Option<i32>,
    pub(crate) image_url: Option<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) publish_time: OffsetDateTime,
    pub(crate) is_published: bool,
    pub(crate) expiry_time: Option<OffsetDateTime>,
    pub(crate) is_deleted: bool,
}

impl TryFrom<NoteRecord> for Note {
    type Error = AppError;

    fn try_from(record: NoteRecord) -> Result<Self, Self::Error> {
        let status = NoteStatus::from_flags(record.id, record.is_published, record.is_deleted, record.expiry_time)?;
        let voice =
            record.voice_url.map(|url| VoiceAttachment { url, duration_secs: record.voice_duration_secs });

        Ok(Self {
            id: record.id,
            sender_id: record.sender_id,
            room_id: record.room_id,
            content: record.content,
            voice,
            image_url: record.image_url,
            created_at: record.created_at,
            publish_time: record.publish_time,
            status,
        })
    }
}
