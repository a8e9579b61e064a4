use crate::config::LifecycleTimings;
use crate::domain::clock::Clock;
use crate::domain::note::{Note, TransitionError};
use crate::error::{AppError, Result};
use crate::services::note_store::NoteStore;
use crate::services::notification::{NoteEvent, NotificationDispatcher};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    expired_total: Counter<u64>,
    sweep_failures_total: Counter<u64>,
    sweep_duration_seconds: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("lovenotes-server");
        Self {
            published_total: meter
                .u64_counter("lovenotes_notes_published_total")
                .with_description("Total notes published, by trigger")
                .build(),
            expired_total: meter
                .u64_counter("lovenotes_notes_expired_total")
                .with_description("Total published notes soft-deleted after expiry")
                .build(),
            sweep_failures_total: meter
                .u64_counter("lovenotes_sweep_failures_total")
                .with_description("Store failures hit while sweeping, retried on the next cycle")
                .build(),
            sweep_duration_seconds: meter
                .f64_histogram("lovenotes_sweep_duration_seconds")
                .with_description("Time taken by a single lifecycle sweep")
                .build(),
        }
    }
}

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub published: usize,
    pub expired: usize,
    /// Notes another writer transitioned between our query and our update.
    pub skipped: usize,
    /// Queries or updates that failed; the affected notes are retried next cycle.
    pub failed: usize,
    /// Set when this call found another sweep in progress and did nothing.
    pub overlapped: bool,
}

impl SweepReport {
    #[must_use]
    pub const fn transitions(&self) -> usize {
        self.published + self.expired
    }
}

/// Owns the publish and expire transitions and both ways of triggering them.
#[derive(Clone, Debug)]
pub struct LifecycleEngine {
    store: Arc<dyn NoteStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    timings: LifecycleTimings,
    sweep_lock: Arc<Mutex<()>>,
    metrics: Metrics,
}

impl LifecycleEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn NoteStore>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        timings: LifecycleTimings,
    ) -> Self {
        Self { store, dispatcher, clock, timings, sweep_lock: Arc::new(Mutex::new(())), metrics: Metrics::new() }
    }

    #[must_use]
    pub const fn timings(&self) -> &LifecycleTimings {
        &self.timings
    }

    /// Publishes a note ahead of schedule on behalf of its sender.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the note does not exist in `room_id`.
    /// Returns `AppError::Forbidden` if `actor_id` did not send the note.
    /// Returns `AppError::InvalidStateTransition` if the note is already published
    /// or deleted, including when a concurrent sweep got there first.
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self),
        fields(note.id = %note_id, actor.id = %actor_id)
    )]
    pub async fn publish_now(&self, note_id: Uuid, actor_id: Uuid, room_id: Uuid) -> Result<Note> {
        let note =
            self.store.find_by_id(note_id).await?.filter(|n| n.room_id == room_id).ok_or(AppError::NotFound)?;

        if note.sender_id != actor_id {
            return Err(AppError::Forbidden("Only the sender can publish this note".to_string()));
        }

        let transition = note.plan_publish(self.clock.now(), self.timings.expiry_delay)?;

        if !self.store.update(&transition).await? {
            tracing::debug!("Lost publish race to a concurrent writer");
            return Err(TransitionError::AlreadyPublished.into());
        }

        let published = note.apply(&transition).ok_or(AppError::Internal)?;
        tracing::info!(expiry_time = ?published.expiry_time(), "Note published early by sender");
        self.metrics.published_total.add(1, &[KeyValue::new("trigger", "manual")]);
        self.dispatcher.dispatch(published.room_id, published.sender_id, NoteEvent::Published);

        Ok(published)
    }

    /// Runs one sweep cycle: publish everything due, then expire everything due.
    ///
    /// Both steps share a single `now`, so a note published in this cycle can
    /// never also be expired by it. Never runs concurrently with itself.
    #[tracing::instrument(
        skip(self),
        fields(
            published = tracing::field::Empty,
            expired = tracing::field::Empty,
            failed = tracing::field::Empty
        )
    )]
    pub async fn sweep(&self) -> SweepReport {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            tracing::warn!("Previous lifecycle sweep still running, skipping this one");
            return SweepReport { overlapped: true, ..SweepReport::default() };
        };

        let started = Instant::now();
        let now = self.clock.now();
        let mut report = SweepReport::default();

        self.publish_due(now, &mut report).instrument(tracing::debug_span!("publish_due")).await;
        self.expire_due(now, &mut report).instrument(tracing::debug_span!("expire_due")).await;

        self.metrics.sweep_duration_seconds.record(started.elapsed().as_secs_f64(), &[]);

        let span = tracing::Span::current();
        span.record("published", report.published);
        span.record("expired", report.expired);
        span.record("failed", report.failed);

        if report.transitions() > 0 || report.failed > 0 {
            tracing::info!(
                published = report.published,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Lifecycle sweep completed"
            );
        } else {
            tracing::debug!("Lifecycle sweep found nothing to do");
        }

        report
    }

    async fn publish_due(&self, now: OffsetDateTime, report: &mut SweepReport) {
        let due = match self.store.find_publishable(now).await {
            Ok(notes) => notes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query publishable notes");
                self.metrics.sweep_failures_total.add(1, &[KeyValue::new("step", "publish_query")]);
                report.failed += 1;
                return;
            }
        };

        for note in due {
            if !note.is_publish_due(now) {
                report.skipped += 1;
                continue;
            }
            let transition = match note.plan_publish(now, self.timings.expiry_delay) {
                Ok(t) => t,
                Err(TransitionError::ExpiryOutOfRange) => {
                    tracing::error!(
                        note.id = %note.id,
                        expiry_delay = %self.timings.expiry_delay,
                        "Expiry time out of range"
                    );
                    self.metrics.sweep_failures_total.add(1, &[KeyValue::new("step", "publish")]);
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::debug!(note.id = %note.id, reason = %e, "Skipping note");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.store.update(&transition).await {
                Ok(true) => {
                    tracing::debug!(note.id = %note.id, "Published note");
                    report.published += 1;
                    self.metrics.published_total.add(1, &[KeyValue::new("trigger", "sweep")]);
                    self.dispatcher.dispatch(note.room_id, note.sender_id, NoteEvent::Published);
                }
                Ok(false) => {
                    tracing::debug!(note.id = %note.id, "Note already published elsewhere");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, note.id = %note.id, "Failed to publish note, will retry next sweep");
                    self.metrics.sweep_failures_total.add(1, &[KeyValue::new("step", "publish")]);
                    report.failed += 1;
                }
            }
        }
    }

    async fn expire_due(&self, now: OffsetDateTime, report: &mut SweepReport) {
        let due = match self.store.find_expirable(now).await {
            Ok(notes) => notes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query expirable notes");
                self.metrics.sweep_failures_total.add(1, &[KeyValue::new("step", "expire_query")]);
                report.failed += 1;
                return;
            }
        };

        for note in due {
            let transition = match note.plan_expire(now) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(note.id = %note.id, reason = %e, "Skipping note");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.store.update(&transition).await {
                Ok(true) => {
                    tracing::debug!(note.id = %note.id, "Soft-deleted expired note");
                    report.expired += 1;
                    self.metrics.expired_total.add(1, &[]);
                }
                Ok(false) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, note.id = %note.id, "Failed to expire note, will retry next sweep");
                    self.metrics.sweep_failures_total.add(1, &[KeyValue::new("step", "expire")]);
                    report.failed += 1;
                }
            }
        }
    }
}
