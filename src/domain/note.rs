use crate::error::{AppError, Result};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A voice recording stored by the blob service, referenced by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceAttachment {
    pub url: String,
    pub duration_secs: Option<i32>,
}

/// Where a note sits in its lifecycle.
///
/// Transitions only ever move forward: `Pending -> Published -> Deleted`.
/// The expiry time is fixed at the moment of publishing and carried along
/// into the deleted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteStatus {
    Pending,
    Published { expiry_time: OffsetDateTime },
    Deleted { expiry_time: OffsetDateTime },
}

/// Coarse state used as the guard of a conditional store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    Pending,
    Published,
    Deleted,
}

impl NoteStatus {
    #[must_use]
    pub const fn state(&self) -> NoteState {
        match self {
            Self::Pending => NoteState::Pending,
            Self::Published { .. } => NoteState::Published,
            Self::Deleted { .. } => NoteState::Deleted,
        }
    }

    /// Rebuilds the status from the flat flags a storage row carries.
    ///
    /// # Errors
    /// Returns `AppError::CorruptRecord` for flag combinations no transition can produce.
    pub fn from_flags(
        id: Uuid,
        is_published: bool,
        is_deleted: bool,
        expiry_time: Option<OffsetDateTime>,
    ) -> Result<Self> {
        match (is_published, is_deleted, expiry_time) {
            (false, false, None) => Ok(Self::Pending),
            (true, false, Some(expiry_time)) => Ok(Self::Published { expiry_time }),
            (true, true, Some(expiry_time)) => Ok(Self::Deleted { expiry_time }),
            (false, true, _) => Err(AppError::CorruptRecord { id, reason: "deleted before publish" }),
            (false, false, Some(_)) => Err(AppError::CorruptRecord { id, reason: "expiry set on pending note" }),
            (true, _, None) => Err(AppError::CorruptRecord { id, reason: "published without expiry" }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub room_id: Uuid,
    pub content: Option<String>,
    pub voice: Option<VoiceAttachment>,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub publish_time: OffsetDateTime,
    pub status: NoteStatus,
}

/// A validated note submission that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub sender_id: Uuid,
    pub room_id: Uuid,
    pub content: Option<String>,
    pub voice: Option<VoiceAttachment>,
    pub image_url: Option<String>,
}

impl NewNote {
    /// Validates a raw submission.
    ///
    /// Text is trimmed and blank text counts as absent. At least one of text,
    /// voice or image must remain.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for empty submissions, oversized text or
    /// blank attachment references.
    pub fn validate(
        sender_id: Uuid,
        room_id: Uuid,
        content: Option<&str>,
        voice: Option<VoiceAttachment>,
        image_url: Option<String>,
        max_chars: usize,
    ) -> Result<Self> {
        let content = content.map(str::trim).filter(|c| !c.is_empty());
        if content.is_some_and(|text| text.chars().count() > max_chars) {
            return Err(AppError::Validation(format!("Note content must be {max_chars} characters or less")));
        }

        if let Some(v) = &voice {
            if v.url.trim().is_empty() {
                return Err(AppError::Validation("Voice message reference must not be blank".to_string()));
            }
            if v.duration_secs.is_some_and(|d| d < 0) {
                return Err(AppError::Validation("Voice duration must not be negative".to_string()));
            }
        }

        if image_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(AppError::Validation("Image reference must not be blank".to_string()));
        }

        if content.is_none() && voice.is_none() && image_url.is_none() {
            return Err(AppError::Validation("Note content, voice message, or image is required".to_string()));
        }

        Ok(Self { sender_id, room_id, content: content.map(str::to_string), voice, image_url })
    }
}

/// A single legal state change, expressed with everything the store needs to
/// write it in one conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Publish { note_id: Uuid, published_at: OffsetDateTime, expiry_time: OffsetDateTime },
    Expire { note_id: Uuid },
}

impl Transition {
    #[must_use]
    pub const fn note_id(&self) -> Uuid {
        match self {
            Self::Publish { note_id, .. } | Self::Expire { note_id } => *note_id,
        }
    }

    /// The state the note must still be in for this transition to apply.
    #[must_use]
    pub const fn required_state(&self) -> NoteState {
        match self {
            Self::Publish { .. } => NoteState::Pending,
            Self::Expire { .. } => NoteState::Published,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Note is already published")]
    AlreadyPublished,
    #[error("Note has been deleted")]
    Deleted,
    #[error("Note is not published")]
    NotPublished,
    #[error("Note has not reached its expiry time")]
    NotDue,
    #[error("Expiry time is out of range")]
    ExpiryOutOfRange,
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::ExpiryOutOfRange => Self::Internal,
            _ => Self::InvalidStateTransition(e.to_string()),
        }
    }
}

impl Note {
    /// Builds a fresh unpublished note scheduled `publish_delay` after `now`.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the publish time does not fit in a timestamp.
    pub fn pending(new_note: NewNote, now: OffsetDateTime, publish_delay: Duration) -> Result<Self> {
        let publish_time = now.checked_add(publish_delay).ok_or(AppError::Internal)?;

        Ok(Self {
            id: Uuid::new_v4(),
            sender_id: new_note.sender_id,
            room_id: new_note.room_id,
            content: new_note.content,
            voice: new_note.voice,
            image_url: new_note.image_url,
            created_at: now,
            publish_time,
            status: NoteStatus::Pending,
        })
    }

    #[must_use]
    pub const fn is_published(&self) -> bool {
        !matches!(self.status, NoteStatus::Pending)
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self.status, NoteStatus::Deleted { .. })
    }

    #[must_use]
    pub const fn expiry_time(&self) -> Option<OffsetDateTime> {
        match self.status {
            NoteStatus::Pending => None,
            NoteStatus::Published { expiry_time } | NoteStatus::Deleted { expiry_time } => Some(expiry_time),
        }
    }

    #[must_use]
    pub fn is_publish_due(&self, now: OffsetDateTime) -> bool {
        matches!(self.status, NoteStatus::Pending) && self.publish_time <= now
    }

    #[must_use]
    pub fn is_expiry_due(&self, now: OffsetDateTime) -> bool {
        matches!(self.status, NoteStatus::Published { expiry_time } if expiry_time <= now)
    }

    /// Plans the publish transition. The expiry clock starts at `now`, the
    /// actual publish instant, not at the scheduled `publish_time`.
    ///
    /// # Errors
    /// Returns `TransitionError::AlreadyPublished` or `TransitionError::Deleted`.
    /// Returns `TransitionError::ExpiryOutOfRange` if `now + expiry_delay` overflows.
    pub fn plan_publish(
        &self,
        now: OffsetDateTime,
        expiry_delay: Duration,
    ) -> std::result::Result<Transition, TransitionError> {
        match self.status {
            NoteStatus::Pending => {
                let expiry_time = now.checked_add(expiry_delay).ok_or(TransitionError::ExpiryOutOfRange)?;
                Ok(Transition::Publish { note_id: self.id, published_at: now, expiry_time })
            }
            NoteStatus::Published { .. } => Err(TransitionError::AlreadyPublished),
            NoteStatus::Deleted { .. } => Err(TransitionError::Deleted),
        }
    }

    /// Plans the expire transition.
    ///
    /// # Errors
    /// Returns `TransitionError::NotPublished`, `TransitionError::Deleted` or
    /// `TransitionError::NotDue`.
    pub fn plan_expire(&self, now: OffsetDateTime) -> std::result::Result<Transition, TransitionError> {
        match self.status {
            NoteStatus::Pending => Err(TransitionError::NotPublished),
            NoteStatus::Deleted { .. } => Err(TransitionError::Deleted),
            NoteStatus::Published { expiry_time } if expiry_time > now => Err(TransitionError::NotDue),
            NoteStatus::Published { .. } => Ok(Transition::Expire { note_id: self.id }),
        }
    }

    /// Returns the note as it looks after `transition`, or `None` when the
    /// transition's guard does not hold for this note.
    #[must_use]
    pub fn apply(&self, transition: &Transition) -> Option<Self> {
        if transition.note_id() != self.id || transition.required_state() != self.status.state() {
            return None;
        }

        let status = match (*transition, self.status) {
            (Transition::Publish { expiry_time, .. }, NoteStatus::Pending) => NoteStatus::Published { expiry_time },
            (Transition::Expire { .. }, NoteStatus::Published { expiry_time }) => NoteStatus::Deleted { expiry_time },
            _ => return None,
        };

        Some(Self { status, ..self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(now: OffsetDateTime) -> Note {
        let new_note =
            NewNote::validate(Uuid::new_v4(), Uuid::new_v4(), Some("  hello  "), None, None, 500).unwrap();
        Note::pending(new_note, now, Duration::hours(24)).unwrap()
    }

    #[test]
    fn test_validate_trims_and_requires_payload() {
        let sender = Uuid::new_v4();
        let room = Uuid::new_v4();

        let note = NewNote::validate(sender, room, Some("  hi  "), None, None, 500).unwrap();
        assert_eq!(note.content.as_deref(), Some("hi"));

        let blank = NewNote::validate(sender, room, Some("   "), None, None, 500);
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let nothing = NewNote::validate(sender, room, None, None, None, 500);
        assert!(matches!(nothing, Err(AppError::Validation(_))));

        let image_only = NewNote::validate(sender, room, Some(""), None, Some("img/1.png".into()), 500).unwrap();
        assert!(image_only.content.is_none());
    }

    #[test]
    fn test_validate_rejects_oversized_text() {
        let text = "x".repeat(501);
        let res = NewNote::validate(Uuid::new_v4(), Uuid::new_v4(), Some(&text), None, None, 500);
        assert!(matches!(res, Err(AppError::Validation(_))));

        // Characters, not bytes
        let hearts = "\u{2764}".repeat(500);
        assert!(NewNote::validate(Uuid::new_v4(), Uuid::new_v4(), Some(&hearts), None, None, 500).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_attachment() {
        let voice = VoiceAttachment { url: " ".into(), duration_secs: Some(3) };
        let res = NewNote::validate(Uuid::new_v4(), Uuid::new_v4(), None, Some(voice), None, 500);
        assert!(matches!(res, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_pending_schedules_publish() {
        let now = datetime!(2026-02-14 09:00 UTC);
        let note = sample(now);
        assert_eq!(note.publish_time, datetime!(2026-02-15 09:00 UTC));
        assert!(!note.is_published());
        assert!(note.expiry_time().is_none());
        assert!(!note.is_publish_due(now));
        assert!(note.is_publish_due(note.publish_time));
    }

    #[test]
    fn test_publish_uses_publish_instant() {
        let now = datetime!(2026-02-14 09:00 UTC);
        let note = sample(now);
        let early = now + Duration::hours(1);

        let transition = note.plan_publish(early, Duration::days(3)).unwrap();
        let published = note.apply(&transition).unwrap();

        assert_eq!(published.expiry_time(), Some(early + Duration::days(3)));
        assert!(published.expiry_time().unwrap() > early);
        assert_eq!(published.plan_publish(early, Duration::days(3)), Err(TransitionError::AlreadyPublished));
    }

    #[test]
    fn test_expire_requires_publish_and_due() {
        let now = datetime!(2026-02-14 09:00 UTC);
        let note = sample(now);
        assert_eq!(note.plan_expire(now), Err(TransitionError::NotPublished));

        let published = note.apply(&note.plan_publish(now, Duration::days(3)).unwrap()).unwrap();
        assert_eq!(published.plan_expire(now), Err(TransitionError::NotDue));

        let later = now + Duration::days(3);
        let deleted = published.apply(&published.plan_expire(later).unwrap()).unwrap();
        assert!(deleted.is_deleted());
        assert!(deleted.is_published());
        assert_eq!(deleted.plan_expire(later), Err(TransitionError::Deleted));
        assert_eq!(deleted.plan_publish(later, Duration::days(3)), Err(TransitionError::Deleted));
    }

    #[test]
    fn test_apply_respects_guard() {
        let now = datetime!(2026-02-14 09:00 UTC);
        let note = sample(now);
        let publish = note.plan_publish(now, Duration::days(3)).unwrap();
        let published = note.apply(&publish).unwrap();

        // A second publish built against the stale snapshot is a no-op.
        assert!(published.apply(&publish).is_none());
        assert!(note.apply(&Transition::Expire { note_id: note.id }).is_none());
    }

    #[test]
    fn test_from_flags_rejects_incoherent_rows() {
        let id = Uuid::new_v4();
        let t = datetime!(2026-02-14 09:00 UTC);
        assert_eq!(NoteStatus::from_flags(id, false, false, None).unwrap(), NoteStatus::Pending);
        assert!(NoteStatus::from_flags(id, true, false, None).is_err());
        assert!(NoteStatus::from_flags(id, false, true, Some(t)).is_err());
        assert!(NoteStatus::from_flags(id, false, false, Some(t)).is_err());
    }

    #[test]
    fn test_out_of_range_delays_are_errors() {
        let now = datetime!(2026-02-14 09:00 UTC);
        let new_note = NewNote::validate(Uuid::new_v4(), Uuid::new_v4(), Some("forever"), None, None, 500).unwrap();
        assert!(matches!(Note::pending(new_note, now, Duration::MAX), Err(AppError::Internal)));

        let note = sample(now);
        let huge = Duration::seconds(400_000_000_000);
        assert_eq!(note.plan_publish(now, huge), Err(TransitionError::ExpiryOutOfRange));
        assert!(matches!(AppError::from(TransitionError::ExpiryOutOfRange), AppError::Internal));
        assert!(matches!(AppError::from(TransitionError::Deleted), AppError::InvalidStateTransition(_)));
    }
}
