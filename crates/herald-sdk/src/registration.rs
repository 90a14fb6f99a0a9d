//! # Registration State Machine
//!
//! Drives the persisted registration record through the handshake with the
//! manager and, when chat is enabled, the universe.
//!
//! ## Handshake Ladder
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  AppUnregistered (0)                                                    │
//! │     │  POST apps/register            needs: credentials                 │
//! │     ▼                                stores device_id, stamps version   │
//! │  PushTokenUnsentToManager (10)                                          │
//! │     │  PUT devices/{id}/push_token   needs: push token                  │
//! │     ├──────────── chat disabled ──────────────────────────┐             │
//! │     ▼                                                     │             │
//! │  ChatEnabledButNoUniverse (20)                            │             │
//! │     │  GET devices/{id}/universe     (skipped if known)   │             │
//! │     ▼                                                     │             │
//! │  PushTokenUnsentToUniverse (30)                           │             │
//! │     │  PUT {universe}/devices/{id}/push_token             │             │
//! │     ▼                                                     ▼             │
//! │  Complete (40) ◄──────────────────────────────────────────┘             │
//! │     version check: stored < running → Upgraded                          │
//! │                    stored > running → Downgraded                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! One drive at a time. The drive lock is held across "load record, decide,
//! call the backend, save", so concurrent triggers can never send the same
//! step twice. A failed step saves nothing and the next trigger retries it.

use std::sync::{Arc, RwLock};

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use herald_core::{
    compare_versions, RegistrationRecord, RegistrationState, VersionChange, PLATFORM,
};

use crate::client::{Method, SyncClient};
use crate::config::NotificationTypes;
use crate::error::{SdkError, SdkResult};
use crate::events::{BusEvent, EventBus};
use crate::protocol::{
    manager_push_token_path, to_params, universe_push_token_url, universe_resolve_path,
    ManagerPushTokenRequest, RegisterAppRequest, RegisterAppResponse, UniversePushTokenRequest,
    UniverseResponse, REGISTER_APP_PATH,
};
use crate::store::LocalStore;

// =============================================================================
// Credentials
// =============================================================================

/// App credentials used by the registration step.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Credentials {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Single writer of the registration record.
pub struct RegistrationStateMachine {
    client: Arc<dyn SyncClient>,
    store: Arc<dyn LocalStore>,
    events: Arc<EventBus>,

    /// Version of the running SDK.
    sdk_version: f64,

    notification_types: NotificationTypes,

    credentials: RwLock<Option<Credentials>>,

    /// Held for the whole of a drive, a token update, or a clean.
    drive_lock: Mutex<()>,
}

impl RegistrationStateMachine {
    pub fn new(
        client: Arc<dyn SyncClient>,
        store: Arc<dyn LocalStore>,
        events: Arc<EventBus>,
        sdk_version: f64,
        notification_types: NotificationTypes,
    ) -> Self {
        RegistrationStateMachine {
            client,
            store,
            events,
            sdk_version,
            notification_types,
            credentials: RwLock::new(None),
            drive_lock: Mutex::new(()),
        }
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        if let Ok(mut guard) = self.credentials.write() {
            *guard = Some(credentials);
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().ok().and_then(|guard| guard.clone())
    }

    /// Current persisted record.
    pub async fn record(&self) -> SdkResult<RegistrationRecord> {
        self.store.load_record().await
    }

    pub async fn state(&self) -> SdkResult<RegistrationState> {
        Ok(self.store.load_record().await?.state)
    }

    /// Stores the platform push token.
    ///
    /// Returns true if the stored token changed. The state is not touched; a
    /// later [`drive`](Self::drive) sends the token if its step is pending.
    pub async fn set_push_token(&self, token: &str) -> SdkResult<bool> {
        let _guard = self.drive_lock.lock().await;
        let mut record = self.store.load_record().await?;
        if record.push_token() == Some(token) {
            return Ok(false);
        }

        if record.state > RegistrationState::PushTokenUnsentToManager {
            info!(
                state = %record.state,
                "Push token changed after it was sent; keeping the registered one on the backend"
            );
        }
        record.push_token = Some(token.to_string());
        self.store.save_record(&record).await?;
        debug!("Push token stored");
        Ok(true)
    }

    /// Advances the record as far as it can go.
    ///
    /// Stops without error when a step is waiting for input (credentials or a
    /// push token). Stops with the step's error when a request fails; the
    /// record then still holds the state before that step.
    pub async fn drive(&self) -> SdkResult<RegistrationState> {
        let _guard = self.drive_lock.lock().await;
        self.drive_locked().await
    }

    /// Installs `credentials` and drives, all under one hold of the lock.
    ///
    /// When the stored record belongs to another app id it is cleared first
    /// and `on_app_change` runs before registration restarts.
    pub async fn switch_credentials(
        &self,
        credentials: Credentials,
        on_app_change: impl FnOnce(),
    ) -> SdkResult<RegistrationState> {
        let _guard = self.drive_lock.lock().await;
        let record = self.store.load_record().await?;
        if let Some(stored) = record.app_id.as_deref() {
            if stored != credentials.app_id {
                info!(from = %stored, to = %credentials.app_id, "App id changed, clearing registration");
                self.clear_locked().await?;
                on_app_change();
            }
        }
        self.set_credentials(credentials);
        self.drive_locked().await
    }

    async fn drive_locked(&self) -> SdkResult<RegistrationState> {
        let mut record = self.store.load_record().await?;

        loop {
            match record.state {
                RegistrationState::AppUnregistered => {
                    let Some(credentials) = self.credentials() else {
                        debug!("No credentials yet, registration waits");
                        return Ok(record.state);
                    };
                    record = self.register_app(&record, &credentials).await?;
                }
                RegistrationState::PushTokenUnsentToManager => {
                    if record.push_token().is_none() {
                        debug!("No push token yet, registration waits");
                        return Ok(record.state);
                    }
                    record = self.send_token_to_manager(&record).await?;
                }
                RegistrationState::ChatEnabledButNoUniverse => {
                    record = self.resolve_universe(&record).await?;
                }
                RegistrationState::PushTokenUnsentToUniverse => {
                    record = self.send_token_to_universe(&record).await?;
                }
                RegistrationState::Complete => {
                    self.check_sdk_version(&record).await?;
                    return Ok(record.state);
                }
            }
        }
    }

    /// Resets the record to `AppUnregistered` and removes every campaign.
    ///
    /// Waits for an in-flight drive, so a read after this returns sees the
    /// cleared record.
    pub async fn clean(&self) -> SdkResult<()> {
        let _guard = self.drive_lock.lock().await;
        self.clear_locked().await
    }

    async fn clear_locked(&self) -> SdkResult<()> {
        self.store.clear_all().await?;
        self.client.set_device_id(None);
        info!("Registration record cleared");
        Ok(())
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn register_app(
        &self,
        record: &RegistrationRecord,
        credentials: &Credentials,
    ) -> SdkResult<RegistrationRecord> {
        info!(app_id = %credentials.app_id, "Registering app");

        let request = RegisterAppRequest {
            app_id: &credentials.app_id,
            app_secret: &credentials.app_secret,
            platform: PLATFORM,
            sdk_version: self.sdk_version,
            device_id: record.device_id(),
        };
        let response = self
            .client
            .submit(REGISTER_APP_PATH, Method::Post, to_params(&request))
            .await?;
        let body: RegisterAppResponse = serde_json::from_value(response.body)?;

        let device_id = body
            .device_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SdkError::UnexpectedResponse("register response carries no device_id".into())
            })?;

        let first_device_id = record.device_id().is_none();

        let mut next = record.clone();
        next.app_id = Some(credentials.app_id.clone());
        next.device_id = Some(device_id.clone());
        next.chat_enabled = body.chat_enabled;
        if let Some(raw) = body.universe_url.filter(|u| !u.is_empty()) {
            match parse_universe_url(&raw) {
                Ok(universe_url) => next.universe_url = Some(universe_url),
                Err(e) => warn!(error = %e, "Ignoring universe_url from register response"),
            }
        }
        next.current_sdk_version = self.sdk_version;
        next.advance_to(RegistrationState::PushTokenUnsentToManager)?;
        self.store.save_record(&next).await?;

        self.client.set_device_id(Some(&device_id));
        info!(device_id = %device_id, chat_enabled = next.chat_enabled, "App registered");

        self.events.emit(BusEvent::SuccessfulAppRegistration);
        if first_device_id {
            self.events.emit(BusEvent::SuccessfulDeviceId { device_id });
        }
        Ok(next)
    }

    async fn send_token_to_manager(
        &self,
        record: &RegistrationRecord,
    ) -> SdkResult<RegistrationRecord> {
        let device_id = record.device_id().ok_or(SdkError::NotRegistered)?;
        let push_token = record.push_token().unwrap_or_default();

        let request = ManagerPushTokenRequest {
            push_token,
            notification_types: self.notification_types.bits(),
        };
        self.client
            .submit(
                &manager_push_token_path(device_id),
                Method::Put,
                to_params(&request),
            )
            .await?;

        let mut next = record.clone();
        next.advance_to(record.state_after_manager_token())?;
        self.store.save_record(&next).await?;
        debug!(device_id = %device_id, state = %next.state, "Push token sent to manager");
        Ok(next)
    }

    async fn resolve_universe(&self, record: &RegistrationRecord) -> SdkResult<RegistrationRecord> {
        let mut next = record.clone();

        let known = record
            .universe_url()
            .filter(|u| parse_universe_url(u).is_ok());
        if known.is_none() {
            let device_id = record.device_id().ok_or(SdkError::NotRegistered)?;
            let response = self
                .client
                .submit(&universe_resolve_path(device_id), Method::Get, json!({}))
                .await?;
            let body: UniverseResponse = serde_json::from_value(response.body)?;
            let raw = body
                .universe_url
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    SdkError::UnexpectedResponse("universe response carries no universe_url".into())
                })?;
            next.universe_url = Some(parse_universe_url(&raw)?);
        } else {
            debug!("Universe URL already known, skipping resolution");
        }

        next.advance_to(RegistrationState::PushTokenUnsentToUniverse)?;
        self.store.save_record(&next).await?;
        debug!(universe_url = ?next.universe_url(), "Universe resolved");
        Ok(next)
    }

    async fn send_token_to_universe(
        &self,
        record: &RegistrationRecord,
    ) -> SdkResult<RegistrationRecord> {
        let device_id = record.device_id().ok_or(SdkError::NotRegistered)?;
        let universe_url = record.universe_url().ok_or_else(|| {
            SdkError::Internal("universe step reached without a universe URL".into())
        })?;

        let request = UniversePushTokenRequest {
            push_token: record.push_token().unwrap_or_default(),
        };
        self.client
            .submit(
                &universe_push_token_url(universe_url, device_id),
                Method::Put,
                to_params(&request),
            )
            .await?;

        let mut next = record.clone();
        next.advance_to(RegistrationState::Complete)?;
        self.store.save_record(&next).await?;
        info!(device_id = %device_id, "Registration complete");
        Ok(next)
    }

    /// Compares the stamped SDK version with the running one and re-stamps.
    async fn check_sdk_version(&self, record: &RegistrationRecord) -> SdkResult<()> {
        let stored = record.current_sdk_version;
        let running = self.sdk_version;

        let event = match compare_versions(stored, running) {
            VersionChange::Unchanged => return Ok(()),
            VersionChange::Upgraded => BusEvent::SdkVersionUpgraded {
                from: stored,
                to: running,
            },
            VersionChange::Downgraded => {
                warn!(from = stored, to = running, "SDK version went down");
                BusEvent::SdkVersionDowngraded {
                    from: stored,
                    to: running,
                }
            }
        };

        let mut next = record.clone();
        next.current_sdk_version = running;
        self.store.save_record(&next).await?;
        info!(from = stored, to = running, "SDK version re-stamped");

        self.events.emit(event);
        Ok(())
    }
}

/// The universe is another host, so its URL must be absolute http(s).
fn parse_universe_url(raw: &str) -> SdkResult<String> {
    let url = url::Url::parse(raw).map_err(|e| {
        SdkError::UnexpectedResponse(format!("invalid universe_url '{raw}': {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(SdkError::UnexpectedResponse(format!(
            "universe_url '{raw}' is not an http(s) URL"
        )));
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::store::MemoryStore;
    use crate::test_support::{fail, ok, FlakyStore, RecordingListener, ScriptedClient};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN_PATH: &str = "devices/dev-1/push_token";
    const UNIVERSE_PATH: &str = "devices/dev-1/universe";
    const UNIVERSE_TOKEN_URL: &str = "https://universe.example/devices/dev-1/push_token";

    struct Fixture {
        client: Arc<ScriptedClient>,
        store: Arc<MemoryStore>,
        listener: RecordingListener,
        machine: RegistrationStateMachine,
    }

    fn fixture_with(record: RegistrationRecord, sdk_version: f64) -> Fixture {
        let client = ScriptedClient::new();
        client.always(REGISTER_APP_PATH, ok(json!({"device_id": "dev-1"})));
        let store = Arc::new(MemoryStore::with_record(record));
        let events = Arc::new(EventBus::new());
        let listener = RecordingListener::attach(&events);
        let machine = RegistrationStateMachine::new(
            client.clone(),
            store.clone(),
            events,
            sdk_version,
            NotificationTypes::ALL,
        );
        machine.set_credentials(Credentials::new("app-1", "secret"));
        Fixture {
            client,
            store,
            listener,
            machine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RegistrationRecord::default(), 2.0)
    }

    fn complete_record(version: f64) -> RegistrationRecord {
        RegistrationRecord {
            app_id: Some("app-1".into()),
            device_id: Some("dev-1".into()),
            push_token: Some("tok".into()),
            current_sdk_version: version,
            state: RegistrationState::Complete,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_ladder_without_chat() {
        let f = fixture();

        let state = f.machine.drive().await.unwrap();
        assert_eq!(state, RegistrationState::PushTokenUnsentToManager);

        assert!(f.machine.set_push_token("tok").await.unwrap());
        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);

        let calls = f.client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].path, REGISTER_APP_PATH);
        assert_eq!(calls[0].params["app_id"], "app-1");
        assert_eq!(calls[1].path, TOKEN_PATH);
        assert_eq!(calls[1].method, Method::Put);
        assert_eq!(calls[1].params["push_token"], "tok");
        assert_eq!(calls[1].params["notification_types"], 7);

        let record = f.store.load_record().await.unwrap();
        assert_eq!(record.device_id(), Some("dev-1"));
        assert_eq!(record.app_id.as_deref(), Some("app-1"));
        assert_eq!(record.current_sdk_version, 2.0);

        assert_eq!(f.listener.count(EventKind::SuccessfulAppRegistration), 1);
        assert_eq!(f.listener.count(EventKind::SuccessfulDeviceId), 1);
        assert_eq!(f.listener.count(EventKind::SdkVersionUpgraded), 0);
    }

    #[tokio::test]
    async fn test_chat_ladder_resolves_universe() {
        let f = fixture();
        f.client.always(
            REGISTER_APP_PATH,
            ok(json!({"device_id": "dev-1", "chat_enabled": true})),
        );
        f.client.always(
            UNIVERSE_PATH,
            ok(json!({"universe_url": "https://universe.example/"})),
        );
        f.machine.set_push_token("tok").await.unwrap();

        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);

        let paths: Vec<String> = f.client.calls().into_iter().map(|c| c.path).collect();
        assert_eq!(
            paths,
            vec![
                REGISTER_APP_PATH.to_string(),
                TOKEN_PATH.to_string(),
                UNIVERSE_PATH.to_string(),
                UNIVERSE_TOKEN_URL.to_string(),
            ]
        );
        let record = f.store.load_record().await.unwrap();
        assert_eq!(record.universe_url(), Some("https://universe.example/"));
    }

    #[tokio::test]
    async fn test_known_universe_skips_resolution() {
        let f = fixture();
        f.client.always(
            REGISTER_APP_PATH,
            ok(json!({
                "device_id": "dev-1",
                "chat_enabled": true,
                "universe_url": "https://universe.example"
            })),
        );
        f.machine.set_push_token("tok").await.unwrap();

        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);
        assert!(f.client.calls_to(UNIVERSE_PATH).is_empty());
        assert_eq!(f.client.calls_to(UNIVERSE_TOKEN_URL).len(), 1);
    }

    #[tokio::test]
    async fn test_relative_universe_url_from_register_is_resolved() {
        let f = fixture();
        f.client.always(
            REGISTER_APP_PATH,
            ok(json!({
                "device_id": "dev-1",
                "chat_enabled": true,
                "universe_url": "universe.example"
            })),
        );
        f.client.always(
            UNIVERSE_PATH,
            ok(json!({"universe_url": "https://universe.example/"})),
        );
        f.machine.set_push_token("tok").await.unwrap();

        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);
        assert_eq!(f.client.calls_to(UNIVERSE_PATH).len(), 1);
        assert_eq!(f.client.calls_to(UNIVERSE_TOKEN_URL).len(), 1);
        assert!(f
            .client
            .calls()
            .iter()
            .all(|c| !c.path.starts_with("universe.example")));
        let record = f.store.load_record().await.unwrap();
        assert_eq!(record.universe_url(), Some("https://universe.example/"));
    }

    #[tokio::test]
    async fn test_non_http_universe_url_is_rejected() {
        let f = fixture();
        f.client.always(
            REGISTER_APP_PATH,
            ok(json!({"device_id": "dev-1", "chat_enabled": true})),
        );
        f.client
            .always(UNIVERSE_PATH, ok(json!({"universe_url": "ftp://universe.example/"})));
        f.machine.set_push_token("tok").await.unwrap();

        let err = f.machine.drive().await.unwrap_err();
        assert!(matches!(err, SdkError::UnexpectedResponse(_)));
        assert!(f.client.calls_to(UNIVERSE_TOKEN_URL).is_empty());
        assert!(f.store.load_record().await.unwrap().universe_url().is_none());
    }

    #[tokio::test]
    async fn test_failed_step_leaves_state_and_retries() {
        let f = fixture();
        f.machine.set_push_token("tok").await.unwrap();
        f.client.push(TOKEN_PATH, fail(503));

        let err = f.machine.drive().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            f.machine.state().await.unwrap(),
            RegistrationState::PushTokenUnsentToManager
        );

        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);
        assert_eq!(f.client.calls_to(REGISTER_APP_PATH).len(), 1);
        assert_eq!(f.client.calls_to(TOKEN_PATH).len(), 2);
    }

    #[tokio::test]
    async fn test_register_without_device_id_is_unexpected() {
        let f = fixture();
        f.client.push(REGISTER_APP_PATH, ok(json!({"chat_enabled": true})));

        let err = f.machine.drive().await.unwrap_err();
        assert!(matches!(err, SdkError::UnexpectedResponse(_)));
        assert_eq!(
            f.machine.state().await.unwrap(),
            RegistrationState::AppUnregistered
        );
        assert_eq!(f.listener.count(EventKind::SuccessfulAppRegistration), 0);
    }

    #[tokio::test]
    async fn test_waits_for_credentials() {
        let client = ScriptedClient::new();
        let machine = RegistrationStateMachine::new(
            client.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(EventBus::new()),
            2.0,
            NotificationTypes::ALL,
        );

        assert_eq!(
            machine.drive().await.unwrap(),
            RegistrationState::AppUnregistered
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_drive_is_idempotent() {
        let f = fixture_with(complete_record(2.0), 2.0);

        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);
        assert_eq!(f.machine.drive().await.unwrap(), RegistrationState::Complete);

        assert_eq!(f.client.call_count(), 0);
        assert!(f.listener.events().is_empty());
    }

    #[tokio::test]
    async fn test_version_upgrade_emitted_once() {
        let f = fixture_with(complete_record(1.0), 2.0);

        f.machine.drive().await.unwrap();
        f.machine.drive().await.unwrap();

        assert_eq!(
            f.listener.events(),
            vec![BusEvent::SdkVersionUpgraded { from: 1.0, to: 2.0 }]
        );
        assert_eq!(
            f.store.load_record().await.unwrap().current_sdk_version,
            2.0
        );
    }

    #[tokio::test]
    async fn test_version_downgrade_emitted_once() {
        let f = fixture_with(complete_record(2.0), 1.0);

        f.machine.drive().await.unwrap();

        assert_eq!(f.listener.count(EventKind::SdkVersionDowngraded), 1);
        assert_eq!(f.listener.count(EventKind::SdkVersionUpgraded), 0);
        assert_eq!(
            f.store.load_record().await.unwrap().current_sdk_version,
            1.0
        );
    }

    #[tokio::test]
    async fn test_concurrent_drives_send_each_step_once() {
        let f = Arc::new(fixture());
        let gate = f.client.gate(REGISTER_APP_PATH);

        let first = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.machine.drive().await })
        };
        gate.entered().await;

        let second = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.machine.drive().await })
        };
        tokio::task::yield_now().await;
        gate.open();
        gate.open();

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(f.client.calls_to(REGISTER_APP_PATH).len(), 1);
        assert_eq!(f.listener.count(EventKind::SuccessfulAppRegistration), 1);
    }

    #[tokio::test]
    async fn test_overlapping_app_switches_apply_in_turn() {
        let f = Arc::new(fixture_with(complete_record(2.0), 2.0));
        let gate = f.client.gate(REGISTER_APP_PATH);
        let switches = Arc::new(AtomicUsize::new(0));

        let switch_to = |app_id: &'static str| {
            let f = Arc::clone(&f);
            let switches = Arc::clone(&switches);
            tokio::spawn(async move {
                f.machine
                    .switch_credentials(Credentials::new(app_id, "secret"), || {
                        switches.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };

        let first = switch_to("app-2");
        gate.entered().await;
        let second = switch_to("app-3");
        tokio::task::yield_now().await;
        assert_eq!(switches.load(Ordering::SeqCst), 1);
        gate.open();
        gate.open();

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let registers = f.client.calls_to(REGISTER_APP_PATH);
        assert_eq!(registers.len(), 2);
        assert_eq!(registers[0].params["app_id"], "app-2");
        assert_eq!(registers[1].params["app_id"], "app-3");
        assert_eq!(switches.load(Ordering::SeqCst), 2);

        let record = f.store.load_record().await.unwrap();
        assert_eq!(record.app_id.as_deref(), Some("app-3"));
        assert_eq!(f.machine.credentials().unwrap().app_id, "app-3");
    }

    #[tokio::test]
    async fn test_same_app_switch_keeps_record() {
        let f = fixture_with(complete_record(2.0), 2.0);
        let mut cleared = false;

        let state = f
            .machine
            .switch_credentials(Credentials::new("app-1", "secret"), || cleared = true)
            .await
            .unwrap();

        assert_eq!(state, RegistrationState::Complete);
        assert!(!cleared);
        assert_eq!(f.client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_state_never_decreases() {
        let f = fixture();
        f.client.push(REGISTER_APP_PATH, fail(500));
        f.client.push(TOKEN_PATH, fail(500));

        let mut last = RegistrationState::AppUnregistered;
        for round in 0..4 {
            if round == 2 {
                f.machine.set_push_token("tok").await.unwrap();
            }
            let _ = f.machine.drive().await;
            let now = f.machine.state().await.unwrap();
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, RegistrationState::Complete);
    }

    #[tokio::test]
    async fn test_clean_resets_record() {
        let f = fixture_with(complete_record(2.0), 2.0);

        f.machine.clean().await.unwrap();

        let record = f.machine.record().await.unwrap();
        assert_eq!(record.state, RegistrationState::AppUnregistered);
        assert!(record.device_id().is_none());
        assert!(!record.is_app_registered());
    }

    #[tokio::test]
    async fn test_same_push_token_is_not_rewritten() {
        let f = fixture();
        assert!(f.machine.set_push_token("tok").await.unwrap());
        assert!(!f.machine.set_push_token("tok").await.unwrap());
        assert!(f.machine.set_push_token("tok-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_step() {
        let client = ScriptedClient::new();
        client.always(REGISTER_APP_PATH, ok(json!({"device_id": "dev-1"})));
        let store = Arc::new(FlakyStore::new());
        let events = Arc::new(EventBus::new());
        let listener = RecordingListener::attach(&events);
        let machine = RegistrationStateMachine::new(
            client,
            store.clone(),
            events,
            2.0,
            NotificationTypes::ALL,
        );
        machine.set_credentials(Credentials::new("app-1", "secret"));

        store.fail_saves(true);
        let err = machine.drive().await.unwrap_err();
        assert!(err.is_persistence_error());
        assert_eq!(listener.count(EventKind::SuccessfulAppRegistration), 0);

        store.fail_saves(false);
        assert_eq!(
            machine.drive().await.unwrap(),
            RegistrationState::PushTokenUnsentToManager
        );
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let debug = format!("{:?}", Credentials::new("app-1", "hunter2"));
        assert!(debug.contains("app-1"));
        assert!(!debug.contains("hunter2"));
    }
}
