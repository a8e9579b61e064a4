use crate::services::notification::{NoteEvent, NotifyError, PartnerNotifier};
use async_trait::async_trait;
use uuid::Uuid;

/// Notifier that only records what it would deliver. Push delivery lives in
/// a separate service.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl PartnerNotifier for LogNotifier {
    async fn notify_partner(&self, room_id: Uuid, sender_id: Uuid, event: NoteEvent) -> Result<(), NotifyError> {
        tracing::info!(%room_id, %sender_id, event = event.as_str(), message = event.message(), "STUB: would notify partner");
        Ok(())
    }
}
