//! # Push Engine
//!
//! The host-facing service object. Wires the registration state machine, the
//! push classifier and dispatcher, and the metrics batcher to one client,
//! one store and one event bus.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           PushEngine                                   │
//! │                                                                         │
//! │  initialize / register_push_token / resume                             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────────────┐   events   ┌──────────────┐                  │
//! │  │ RegistrationState-   │──────────►│   EventBus   │◄──┐              │
//! │  │ Machine              │            └──────────────┘   │              │
//! │  └──────────┬───────────┘                               │ NewCampaign  │
//! │             │                                           │              │
//! │  handle_remote_push / dispatch_notification             │              │
//! │        │                                                │              │
//! │        ▼                                                │              │
//! │  ┌──────────────────────┐      ┌────────────────────────┴─┐            │
//! │  │ NotificationDispatch.│◄─────│ PushClassifier           │            │
//! │  └──────────────────────┘      └──────────────────────────┘            │
//! │             │ campaign received / opened / viewed, interactions         │
//! │             ▼                                                           │
//! │  ┌──────────────────────┐                                              │
//! │  │ MetricsBatcher       │◄── send / send_on_change / force_send        │
//! │  │ (timer task)         │                                              │
//! │  └──────────┬───────────┘                                              │
//! │             ▼                                                           │
//! │     SyncClient (HTTP)          LocalStore (SQLite / memory)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! `PushEngine::builder(config).build().await` → `start()` (metrics timer)
//! → `initialize(...)` → ... → `shutdown()` (timer stopped, last flush).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use herald_core::{
    CampaignRecord, LogLevel, MetricEntry, NotificationAction, PushNotification, PushPayload,
    RegistrationState, ValidationError, SDK_VERSION,
};
use herald_db::{Database, DbConfig};

use crate::classifier::{Classification, NewCampaignCheck, PushClassifier, PushHandlers};
use crate::client::{HttpClientConfig, HttpSyncClient, SyncClient};
use crate::config::{LocationMode, SdkConfig};
use crate::dispatcher::{
    BackgroundFetchResult, CompletionToken, DefaultDelegate, LandingPagePresenter,
    LoggingPresenter, NotificationDelegate, NotificationDispatcher,
};
use crate::error::{SdkError, SdkResult};
use crate::events::{BusEvent, EventBus};
use crate::logging;
use crate::metrics::{FlushOutcome, MetricsBatcher, MetricsTimer};
use crate::registration::{Credentials, RegistrationStateMachine};
use crate::store::{LocalStore, MemoryStore};

static SHARED: OnceLock<Arc<PushEngine>> = OnceLock::new();

// =============================================================================
// Push Engine
// =============================================================================

pub struct PushEngine {
    config: SdkConfig,
    store: Arc<dyn LocalStore>,
    events: Arc<EventBus>,

    registration: RegistrationStateMachine,
    classifier: PushClassifier,
    dispatcher: NotificationDispatcher,
    metrics: Arc<MetricsBatcher>,

    /// Running flush timer, if started.
    timer: Mutex<Option<MetricsTimer>>,

    shut_down: AtomicBool,
}

impl PushEngine {
    pub fn builder(config: SdkConfig) -> PushEngineBuilder {
        PushEngineBuilder::new(config)
    }

    // =========================================================================
    // Shared Instance
    // =========================================================================

    /// Installs the process-wide engine. Returns false if one is installed.
    pub fn install_shared(engine: Arc<PushEngine>) -> bool {
        SHARED.set(engine).is_ok()
    }

    pub fn shared() -> Option<Arc<PushEngine>> {
        SHARED.get().cloned()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the metrics timer. Calling it again while running is a no-op.
    pub async fn start(&self) -> SdkResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SdkError::ShuttingDown);
        }

        let mut timer = self.timer.lock().await;
        if timer.is_none() {
            *timer = Some(self.metrics.spawn_timer());
            info!(
                interval_secs = self.metrics.send_interval().as_secs(),
                "Push engine started"
            );
        }
        Ok(())
    }

    /// Stops the metrics timer and attempts one last flush.
    pub async fn shutdown(&self) -> SdkResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Shutting down push engine");

        if let Some(timer) = self.timer.lock().await.take() {
            timer.stop().await;
        }

        match self.metrics.flush().await {
            Ok(outcome) => debug!(?outcome, "Final metrics flush"),
            Err(e) => warn!(error = %e, pending = self.metrics.pending_count(), "Final metrics flush failed"),
        }

        info!("Push engine stopped");
        Ok(())
    }

    /// Sets credentials and drives registration.
    ///
    /// Repeating the call with the same credentials once registration is
    /// complete sends nothing. A different app id than the stored one clears
    /// the record and campaigns first.
    pub async fn initialize(
        &self,
        app_id: &str,
        app_secret: &str,
        log_level: LogLevel,
    ) -> SdkResult<RegistrationState> {
        if app_id.trim().is_empty() || app_secret.is_empty() {
            return Err(SdkError::MissingCredentials);
        }
        logging::set_log_level(log_level);

        let metrics = &self.metrics;
        self.registration
            .switch_credentials(Credentials::new(app_id, app_secret), || {
                metrics.clear_last_sent()
            })
            .await
    }

    /// [`initialize`](Self::initialize) with the `[app]` and `[log]` settings.
    pub async fn initialize_from_config(&self) -> SdkResult<RegistrationState> {
        let (Some(app_id), Some(secret)) = (
            self.config.app.id.clone(),
            self.config.app.secret.clone(),
        ) else {
            return Err(SdkError::MissingCredentials);
        };
        self.initialize(&app_id, &secret, self.config.log.level)
            .await
    }

    /// Retries pending registration steps, e.g. when the app comes to the
    /// foreground.
    pub async fn resume(&self) -> SdkResult<RegistrationState> {
        self.registration.drive().await
    }

    // =========================================================================
    // Push Token
    // =========================================================================

    /// Stores the push token and sends it if its step is pending.
    pub async fn register_push_token(&self, token: &str) -> SdkResult<RegistrationState> {
        if token.trim().is_empty() {
            return Err(ValidationError::required("push token").into());
        }
        self.registration.set_push_token(token).await?;
        self.registration.drive().await
    }

    /// Registers a raw platform token, hex-encoded in lowercase.
    pub async fn register_push_token_bytes(&self, token: &[u8]) -> SdkResult<RegistrationState> {
        self.register_push_token(&hex_token(token)).await
    }

    /// The platform delivered a push token.
    pub async fn did_register_for_remote_notifications(
        &self,
        token: &[u8],
    ) -> SdkResult<RegistrationState> {
        let push_token = hex_token(token);
        self.events
            .emit(BusEvent::DidRegisterForRemoteNotifications {
                push_token: push_token.clone(),
            });
        self.register_push_token(&push_token).await
    }

    /// The platform refused push registration.
    pub fn did_fail_to_register_for_remote_notifications(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Remote notification registration failed");
        self.events
            .emit(BusEvent::DidFailToRegisterForRemoteNotifications { reason });
    }

    // =========================================================================
    // Push Handling
    // =========================================================================

    /// Classifies a push. A new campaign queues a `campaign/received` metric.
    pub async fn classify(&self, payload: &PushPayload) -> SdkResult<Classification> {
        let classification = self.classifier.classify(payload).await?;
        if let Classification::Campaign { is_new: true, record } = &classification {
            self.metrics
                .send(MetricEntry::campaign_received(record.id.clone()));
        }
        Ok(classification)
    }

    /// Combined shape: is this a new campaign, and which one.
    pub async fn handle_remote_push(&self, payload: &PushPayload) -> SdkResult<NewCampaignCheck> {
        self.classify(payload).await.map(NewCampaignCheck::from)
    }

    /// Four-way shape: exactly one of the handlers is called.
    pub async fn handle_remote_push_with(&self, payload: &PushPayload, handlers: PushHandlers) {
        handlers.deliver(self.classify(payload).await);
    }

    /// Classifies and dispatches a push. Returns true if the SDK performed
    /// the default action. `completion` is invoked exactly once.
    pub async fn dispatch_notification(
        &self,
        payload: &PushPayload,
        completion: CompletionToken,
    ) -> bool {
        let notification = match self.classify(payload).await {
            Ok(classification) => notification_for(payload, classification),
            Err(e) => {
                warn!(error = %e, "Push could not be classified");
                completion.complete(BackgroundFetchResult::Failed);
                return false;
            }
        };

        let performed = self.dispatcher.dispatch(&notification, completion);
        if performed {
            if let Some(campaign) = &notification.campaign {
                self.metrics
                    .send(MetricEntry::campaign_opened(campaign.id.clone()));
            }
        }
        performed
    }

    /// Reports a user interaction; unknown action ids are ignored.
    pub fn perform_interaction(
        &self,
        action_id: &str,
        notification: Option<&PushNotification>,
    ) -> Option<NotificationAction> {
        let action = self.dispatcher.perform_interaction(action_id, notification)?;
        self.metrics.send(MetricEntry::interaction(
            action,
            notification.and_then(PushNotification::notification_id),
        ));
        Some(action)
    }

    // =========================================================================
    // Campaigns
    // =========================================================================

    /// Marks a campaign viewed. The first time queues a `campaign/viewed`
    /// metric and returns true.
    pub async fn mark_campaign_as_viewed(&self, campaign_id: &str) -> SdkResult<bool> {
        let changed = self.store.mark_campaign_viewed(campaign_id).await?;
        if changed {
            debug!(campaign_id = %campaign_id, "Campaign viewed");
            self.metrics
                .send(MetricEntry::campaign_viewed(campaign_id));
        }
        Ok(changed)
    }

    pub async fn delete_campaign(&self, campaign_id: &str) -> SdkResult<bool> {
        let deleted = self.store.delete_campaign(campaign_id).await?;
        if deleted {
            debug!(campaign_id = %campaign_id, "Campaign deleted");
        }
        Ok(deleted)
    }

    /// Stored campaigns, newest first.
    pub async fn campaign_list(&self) -> SdkResult<Vec<CampaignRecord>> {
        self.store.list_campaigns().await
    }

    /// Full reset: registration record, campaigns, and on-change values.
    ///
    /// Queued metrics are kept.
    pub async fn clean(&self) -> SdkResult<()> {
        self.registration.clean().await?;
        self.metrics.clear_last_sent();
        Ok(())
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    pub fn metrics(&self) -> &MetricsBatcher {
        &self.metrics
    }

    pub fn send_metric(&self, entry: MetricEntry) -> bool {
        self.metrics.send(entry)
    }

    pub fn send_metric_on_change(&self, entry: MetricEntry) -> bool {
        self.metrics.send_on_change(entry)
    }

    /// Flushes now, outside the timer cadence.
    pub async fn force_send_metrics(&self) -> SdkResult<FlushOutcome> {
        self.metrics.flush().await
    }

    pub fn set_metric_send_interval(&self, seconds: u64) -> SdkResult<()> {
        self.metrics.set_send_interval(Duration::from_secs(seconds))
    }

    pub fn set_location_acquisition(&self, mode: LocationMode) {
        self.metrics.set_location_mode(mode);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub async fn device_id(&self) -> SdkResult<Option<String>> {
        let record = self.registration.record().await?;
        Ok(record.device_id().map(str::to_owned))
    }

    pub async fn is_app_registered(&self) -> SdkResult<bool> {
        Ok(self.registration.record().await?.is_app_registered())
    }

    pub async fn registration_state(&self) -> SdkResult<RegistrationState> {
        self.registration.state().await
    }

    /// App id passed to the last `initialize`.
    pub fn app_id(&self) -> Option<String> {
        self.registration.credentials().map(|c| c.app_id)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }
}

fn notification_for(payload: &PushPayload, classification: Classification) -> PushNotification {
    match classification {
        Classification::Campaign { record, .. } => {
            PushNotification::from_campaign(payload.clone(), record)
        }
        Classification::Custom(record) => PushNotification::from_custom(payload.clone(), record),
        Classification::Other(payload) => PushNotification::foreign(payload),
    }
}

fn hex_token(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`PushEngine`].
///
/// Unset collaborators default to an HTTP client on the configured manager,
/// the SQLite store at the configured path, the SDK's own delegate, and a
/// presenter that only logs.
pub struct PushEngineBuilder {
    config: SdkConfig,
    client: Option<Arc<dyn SyncClient>>,
    store: Option<Arc<dyn LocalStore>>,
    delegate: Option<Arc<dyn NotificationDelegate>>,
    presenter: Option<Arc<dyn LandingPagePresenter>>,
    events: Option<Arc<EventBus>>,
    sdk_version: f64,
    install_logging: bool,
}

impl PushEngineBuilder {
    pub fn new(config: SdkConfig) -> Self {
        PushEngineBuilder {
            config,
            client: None,
            store: None,
            delegate: None,
            presenter: None,
            events: None,
            sdk_version: SDK_VERSION,
            install_logging: false,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn SyncClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.store = Some(db);
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn NotificationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn LandingPagePresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Overrides the version stamped into the registration record.
    pub fn with_sdk_version(mut self, version: f64) -> Self {
        self.sdk_version = version;
        self
    }

    /// Installs the global `tracing` subscriber at the configured level.
    pub fn install_logging(mut self, install: bool) -> Self {
        self.install_logging = install;
        self
    }

    /// Builds the engine, opening the SQLite store if none was given.
    pub async fn build(self) -> SdkResult<PushEngine> {
        self.config.validate()?;

        if self.install_logging && !logging::init_logging(self.config.log.level) {
            debug!("A global subscriber is already installed");
        }

        let client: Arc<dyn SyncClient> = match self.client {
            Some(client) => client,
            None => Arc::new(HttpSyncClient::new(HttpClientConfig {
                base_url: self.config.manager.base_url.clone(),
                request_timeout: self.config.request_timeout(),
                app_id: self.config.app.id.clone(),
            })?),
        };

        let store: Arc<dyn LocalStore> = match self.store {
            Some(store) => store,
            None => open_store(&self.config).await?,
        };

        let record = store.load_record().await?;
        client.set_device_id(record.device_id());

        let events = self.events.unwrap_or_default();
        let delegate = self
            .delegate
            .unwrap_or_else(|| Arc::new(DefaultDelegate));
        let presenter = self
            .presenter
            .unwrap_or_else(|| Arc::new(LoggingPresenter));

        let registration = RegistrationStateMachine::new(
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&events),
            self.sdk_version,
            self.config.notification_types(),
        );
        let classifier = PushClassifier::new(Arc::clone(&store), Arc::clone(&events));
        let dispatcher = NotificationDispatcher::new(delegate, presenter);
        let metrics = Arc::new(MetricsBatcher::new(
            client,
            Arc::clone(&store),
            self.config.send_interval(),
            self.config.metrics.location,
        ));

        info!(
            manager = %self.config.manager.base_url,
            state = %record.state,
            "Push engine built"
        );

        Ok(PushEngine {
            config: self.config,
            store,
            events,
            registration,
            classifier,
            dispatcher,
            metrics,
            timer: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }
}

async fn open_store(config: &SdkConfig) -> SdkResult<Arc<dyn LocalStore>> {
    let Some(path) = config.database_path() else {
        warn!("No data directory available, registration will not survive restarts");
        return Ok(Arc::new(MemoryStore::new()));
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SdkError::Persistence(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    info!(path = %path.display(), "Opening local store");
    let db = Database::new(DbConfig::new(path)).await?;
    Ok(Arc::new(db))
}
