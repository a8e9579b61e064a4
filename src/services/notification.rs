use async_trait::async_trait;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    Created,
    Published,
}

impl NoteEvent {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Created => "New love note coming your way!",
            Self::Published => "Your partner sent you a love note!",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Published => "published",
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("No partner to notify")]
    NoRecipient,
    #[error("External service error: {0}")]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait PartnerNotifier: Send + Sync + std::fmt::Debug {
    /// Tells the other participant of `room_id` that `sender_id` did something.
    ///
    /// # Errors
    /// Returns `NotifyError::NoRecipient` if the room has no reachable partner.
    async fn notify_partner(&self, room_id: Uuid, sender_id: Uuid, event: NoteEvent) -> Result<(), NotifyError>;
}

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("lovenotes-server");
        Self {
            sent: meter
                .u64_counter("partner_notifications_sent_total")
                .with_description("Total partner notifications handed to the notifier")
                .build(),
            errors: meter
                .u64_counter("partner_notification_errors_total")
                .with_description("Total partner notifications that failed and were dropped")
                .build(),
        }
    }
}

/// Fire-and-forget front for a [`PartnerNotifier`].
///
/// Delivery runs on its own task; failures are logged and counted, never
/// reported back to whoever triggered the event.
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn PartnerNotifier>,
    metrics: Metrics,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(notifier: Arc<dyn PartnerNotifier>) -> Self {
        Self { notifier, metrics: Metrics::new() }
    }

    pub fn dispatch(&self, room_id: Uuid, sender_id: Uuid, event: NoteEvent) {
        let notifier = Arc::clone(&self.notifier);
        let metrics = self.metrics.clone();

        tokio::spawn(
            async move {
                match notifier.notify_partner(room_id, sender_id, event).await {
                    Ok(()) => {
                        metrics.sent.add(1, &[KeyValue::new("event", event.as_str())]);
                    }
                    Err(NotifyError::NoRecipient) => {
                        tracing::debug!("No partner to notify");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Partner notification failed");
                        metrics.errors.add(1, &[KeyValue::new("event", event.as_str())]);
                    }
                }
            }
            .instrument(tracing::debug_span!("notify_partner", %room_id, event = event.as_str())),
        );
    }
}
