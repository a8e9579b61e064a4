#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::api::ServiceContainer;
use crate::config::Config;
use crate::domain::clock::{Clock, SystemClock};
use crate::services::health_service::HealthService;
use crate::services::lifecycle_service::LifecycleEngine;
use crate::services::note_service::NoteService;
use crate::services::note_store::NoteStore;
use crate::services::notification::{NotificationDispatcher, PartnerNotifier};
use crate::workers::LifecycleSweepWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Background tasks owned by the application.
#[derive(Debug)]
pub struct Workers {
    lifecycle_sweep: LifecycleSweepWorker,
}

impl Workers {
    /// Spawns every worker onto the runtime.
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(
            self.lifecycle_sweep.run(shutdown_rx).instrument(tracing::info_span!("lifecycle_sweep_worker")),
        )]
    }
}

/// A fully wired application, ready to be served.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn NoteStore>>,
    notifier: Option<Arc<dyn PartnerNotifier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AppBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config, store: None, notifier: None, clock: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn NoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn PartnerNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wires services and workers together.
    ///
    /// # Errors
    /// Returns an error if no note store was provided or the lifecycle
    /// delays are out of range.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("AppBuilder requires a note store"))?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(adapters::push::LogNotifier));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        // Read once; fixed for the lifetime of the process.
        let timings = self.config.lifecycle.timings()?;
        if self.config.lifecycle.fast_mode {
            tracing::warn!(
                publish_delay = %timings.publish_delay,
                expiry_delay = %timings.expiry_delay,
                "Fast mode enabled: lifecycle delays are shortened"
            );
        }

        let dispatcher = NotificationDispatcher::new(notifier);
        let lifecycle_engine =
            LifecycleEngine::new(Arc::clone(&store), dispatcher.clone(), Arc::clone(&clock), timings);
        let note_service = NoteService::new(
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&clock),
            timings,
            self.config.notes.clone(),
        );
        let health_service = HealthService::new(store, self.config.health.clone());

        let workers = Workers { lifecycle_sweep: LifecycleSweepWorker::new(lifecycle_engine.clone()) };

        Ok(App { services: ServiceContainer { note_service, lifecycle_engine, clock }, health_service, workers })
    }
}

/// Builds the note store named by the configuration: PostgreSQL when a
/// database URL is set, process memory otherwise.
///
/// # Errors
/// Returns an error if the database cannot be reached or migrated.
pub async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn NoteStore>> {
    match &config.database.url {
        Some(url) => {
            let pool = adapters::database::init_pool(&config.database, url).await?;
            adapters::database::run_migrations(&pool).await?;
            tracing::info!("Connected to PostgreSQL note store");
            Ok(Arc::new(adapters::database::note_repo::PgNoteStore::new(pool)))
        }
        None => {
            tracing::warn!("No database configured, notes are kept in memory and lost on restart");
            Ok(Arc::new(adapters::memory::MemoryNoteStore::new()))
        }
    }
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the structured log pipeline.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        tracing::error!(panic = %info, %location, "Panic occurred");
    }));
}
