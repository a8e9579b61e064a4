#![allow(dead_code)]
use async_trait::async_trait;
use lovenotes_server::adapters::memory::MemoryNoteStore;
use lovenotes_server::api::{self, MgmtState, ServiceContainer};
use lovenotes_server::config::{
    AuthConfig, Config, DatabaseConfig, HealthConfig, LifecycleConfig, NoteConfig, ServerConfig, TelemetryConfig,
};
use lovenotes_server::domain::auth::Claims;
use lovenotes_server::domain::clock::{Clock, ManualClock};
use lovenotes_server::domain::note::{Note, Transition};
use lovenotes_server::error::{AppError, Result};
use lovenotes_server::services::note_store::NoteStore;
use lovenotes_server::services::notification::{NoteEvent, NotifyError, PartnerNotifier};
use lovenotes_server::{AppBuilder, Workers};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::net::TcpListener;
use tokio::sync::watch;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret";

/// Valentine's Day morning; every test clock starts here.
pub const T0: OffsetDateTime = datetime!(2026-02-14 09:00 UTC);

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("lovenotes_server=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn get_test_config() -> Config {
    Config {
        database: DatabaseConfig::default(),
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, mgmt_port: 0, ..ServerConfig::default() },
        auth: AuthConfig { jwt_secret: JWT_SECRET.to_string() },
        notes: NoteConfig::default(),
        lifecycle: LifecycleConfig::default(),
        telemetry: TelemetryConfig::default(),
        health: HealthConfig::default(),
    }
}

/// Records every partner notification instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(Uuid, Uuid, NoteEvent)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(Uuid, Uuid, NoteEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: NoteEvent) -> usize {
        self.events().iter().filter(|(_, _, e)| *e == event).count()
    }

    /// Notifications are delivered on spawned tasks, so give them a moment.
    pub async fn wait_for(&self, event: NoteEvent, expected: usize) -> usize {
        for _ in 0..100 {
            if self.count(event) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count(event)
    }
}

#[async_trait]
impl PartnerNotifier for RecordingNotifier {
    async fn notify_partner(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        event: NoteEvent,
    ) -> std::result::Result<(), NotifyError> {
        self.events.lock().unwrap().push((room_id, sender_id, event));
        Ok(())
    }
}

/// A notifier that always fails, for checking failures never reach callers.
#[derive(Debug, Default)]
pub struct BrokenNotifier;

#[async_trait]
impl PartnerNotifier for BrokenNotifier {
    async fn notify_partner(&self, _: Uuid, _: Uuid, _: NoteEvent) -> std::result::Result<(), NotifyError> {
        Err(NotifyError::Other(anyhow::anyhow!("push gateway unavailable")))
    }
}

/// Memory store whose conditional writes fail for chosen notes.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryNoteStore,
    failing: Mutex<HashSet<Uuid>>,
    fail_ping: Mutex<bool>,
}

impl FlakyStore {
    pub fn fail_updates_for(&self, note_id: Uuid) {
        self.failing.lock().unwrap().insert(note_id);
    }

    pub fn heal(&self, note_id: Uuid) {
        self.failing.lock().unwrap().remove(&note_id);
    }

    pub fn fail_ping(&self, fail: bool) {
        *self.fail_ping.lock().unwrap() = fail;
    }
}

#[async_trait]
impl NoteStore for FlakyStore {
    async fn create(&self, note: &Note) -> Result<Uuid> {
        self.inner.create(note).await
    }

    async fn find_by_id(&self, note_id: Uuid) -> Result<Option<Note>> {
        self.inner.find_by_id(note_id).await
    }

    async fn find_publishable(&self, now: OffsetDateTime) -> Result<Vec<Note>> {
        self.inner.find_publishable(now).await
    }

    async fn find_expirable(&self, now: OffsetDateTime) -> Result<Vec<Note>> {
        self.inner.find_expirable(now).await
    }

    async fn find_visible(&self, room_id: Uuid, user_id: Uuid, now: OffsetDateTime) -> Result<Vec<Note>> {
        self.inner.find_visible(room_id, user_id, now).await
    }

    async fn update(&self, transition: &Transition) -> Result<bool> {
        if self.failing.lock().unwrap().contains(&transition.note_id()) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.update(transition).await
    }

    async fn ping(&self) -> Result<()> {
        if *self.fail_ping.lock().unwrap() {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

/// Two paired users sharing a room, plus someone from another room.
#[derive(Debug, Clone, Copy)]
pub struct Couple {
    pub room_id: Uuid,
    pub alice: Uuid,
    pub bob: Uuid,
}

impl Couple {
    pub fn new() -> Self {
        Self { room_id: Uuid::new_v4(), alice: Uuid::new_v4(), bob: Uuid::new_v4() }
    }
}

pub fn token_for(user_id: Uuid, room_id: Option<Uuid>) -> String {
    Claims::new(user_id, room_id, 3600).encode(JWT_SECRET).unwrap()
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub services: ServiceContainer,
    pub workers: Option<Workers>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_store(get_test_config(), Arc::new(MemoryNoteStore::new())).await
    }

    pub async fn spawn_with_store(config: Config, store: Arc<dyn NoteStore>) -> Self {
        setup_tracing();

        let clock = Arc::new(ManualClock::new(T0));
        let notifier = Arc::new(RecordingNotifier::default());

        let app = AppBuilder::new(config.clone())
            .with_store(store)
            .with_notifier(notifier.clone())
            .with_clock(clock.clone() as Arc<dyn Clock>)
            .build()
            .unwrap();

        let services = app.services.clone();
        let app_router = api::app_router(config.clone(), app.services);
        let mgmt_router = api::mgmt_router(MgmtState { health_service: app.health_service });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, app_router)
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router)
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            server_url: format!("http://{addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            config,
            clock,
            notifier,
            services,
            workers: Some(app.workers),
            shutdown_tx,
        }
    }

    pub async fn create_note(&self, token: &str, body: serde_json::Value) -> reqwest::Response {
        self.client.post(format!("{}/v1/notes", self.server_url)).bearer_auth(token).json(&body).send().await.unwrap()
    }

    pub async fn create_text_note(&self, token: &str, content: &str) -> Uuid {
        let resp = self.create_note(token, serde_json::json!({ "content": content })).await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = resp.json().await.unwrap();
        body["note"]["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn publish(&self, token: &str, note_id: Uuid) -> reqwest::Response {
        self.client
            .post(format!("{}/v1/notes/{}/publish", self.server_url, note_id))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn list(&self, token: &str) -> serde_json::Value {
        let resp = self.client.get(format!("{}/v1/notes", self.server_url)).bearer_auth(token).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        resp.json().await.unwrap()
    }

    pub fn listed_ids(body: &serde_json::Value) -> Vec<Uuid> {
        body["notes"].as_array().unwrap().iter().map(|n| n["id"].as_str().unwrap().parse().unwrap()).collect()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
