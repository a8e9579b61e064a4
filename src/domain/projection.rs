use crate::domain::note::{Note, VoiceAttachment};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A note as one particular viewer sees it at one particular instant.
///
/// Countdown fields are derived on every read and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteView {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub voice: Option<VoiceAttachment>,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub publish_time: OffsetDateTime,
    pub is_published: bool,
    pub expiry_time: Option<OffsetDateTime>,
    pub is_own: bool,
    pub time_until_publish_ms: Option<i64>,
    pub time_until_publish_label: Option<String>,
    pub days_until_expiry: Option<f64>,
}

impl NoteView {
    #[must_use]
    pub fn project(note: &Note, viewer_id: Uuid, now: OffsetDateTime) -> Self {
        let (time_until_publish_ms, time_until_publish_label) = if note.is_published() {
            (None, None)
        } else {
            let remaining = non_negative(note.publish_time - now);
            let ms = i64::try_from(remaining.whole_milliseconds()).unwrap_or(i64::MAX);
            (Some(ms), Some(format_countdown(remaining)))
        };

        let days_until_expiry =
            note.expiry_time().map(|expiry| non_negative(expiry - now).as_seconds_f64() / SECONDS_PER_DAY);

        Self {
            id: note.id,
            sender_id: note.sender_id,
            content: note.content.clone(),
            voice: note.voice.clone(),
            image_url: note.image_url.clone(),
            created_at: note.created_at,
            publish_time: note.publish_time,
            is_published: note.is_published(),
            expiry_time: note.expiry_time(),
            is_own: note.sender_id == viewer_id,
            time_until_publish_ms,
            time_until_publish_label,
            days_until_expiry,
        }
    }

    #[must_use]
    pub const fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    #[must_use]
    pub const fn has_image(&self) -> bool {
        self.image_url.is_some()
    }
}

fn non_negative(d: Duration) -> Duration {
    if d.is_negative() { Duration::ZERO } else { d }
}

/// Formats a countdown as `"{hours}h {minutes}m"`, counting whole hours past 24.
#[must_use]
pub fn format_countdown(remaining: Duration) -> String {
    let remaining = non_negative(remaining);
    format!("{}h {}m", remaining.whole_hours(), remaining.whole_minutes() % 60)
}

/// Renders a configured delay for user-facing messages, e.g. `"24 hours"` or `"3 days"`.
#[must_use]
pub fn describe_delay(delay: Duration) -> String {
    let secs = delay.whole_seconds();
    let (amount, unit) = if secs >= 86_400 && secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs >= 3_600 && secs % 3_600 == 0 {
        (secs / 3_600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if amount == 1 { format!("1 {unit}") } else { format!("{amount} {unit}s") }
}
