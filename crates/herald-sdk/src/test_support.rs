//! Test doubles shared by the engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use herald_core::{CampaignRecord, RegistrationRecord};
use herald_db::CampaignUpsert;

use crate::client::{Method, SyncClient, SyncFailure, SyncResponse};
use crate::error::{SdkError, SdkResult};
use crate::events::{BusEvent, EventBus, EventKind};
use crate::store::{LocalStore, MemoryStore};

pub type Outcome = Result<SyncResponse, SyncFailure>;

pub fn ok(body: Value) -> Outcome {
    Ok(SyncResponse::new(200, body))
}

pub fn fail(status: u16) -> Outcome {
    Err(SyncFailure::status(status, "scripted failure", None))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub path: String,
    pub method: Method,
    pub params: Value,
}

/// Holds requests to one path until released.
#[derive(Clone)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl Gate {
    /// Waits until a request reaches the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one held request complete.
    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

/// `SyncClient` with per-path scripted outcomes.
///
/// Queued outcomes are used in order; afterwards the path's default applies,
/// and unknown paths answer `200 null`.
#[derive(Default)]
pub struct ScriptedClient {
    calls: Mutex<Vec<RecordedCall>>,
    queued: Mutex<HashMap<String, VecDeque<Outcome>>>,
    defaults: Mutex<HashMap<String, Outcome>>,
    gates: Mutex<HashMap<String, Gate>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, path: &str, outcome: Outcome) {
        self.queued
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn always(&self, path: &str, outcome: Outcome) {
        self.defaults
            .lock()
            .unwrap()
            .insert(path.to_string(), outcome);
    }

    pub fn gate(&self, path: &str) -> Gate {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        };
        self.gates
            .lock()
            .unwrap()
            .insert(path.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_outcome(&self, path: &str) -> Outcome {
        if let Some(outcome) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        self.defaults
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| ok(Value::Null))
    }
}

#[async_trait]
impl SyncClient for ScriptedClient {
    async fn submit(&self, path: &str, method: Method, params: Value) -> Outcome {
        self.calls.lock().unwrap().push(RecordedCall {
            path: path.to_string(),
            method,
            params,
        });

        let gate = self.gates.lock().unwrap().get(path).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            if let Ok(permit) = gate.release.acquire().await {
                permit.forget();
            }
        }

        self.next_outcome(path)
    }
}

/// Collects every event emitted on a bus.
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<BusEvent>>>,
}

impl RecordingListener {
    pub fn attach(bus: &EventBus) -> Self {
        let listener = RecordingListener::default();
        let sink = Arc::clone(&listener.events);
        bus.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        listener
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
}

/// `MemoryStore` whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> SdkResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SdkError::Persistence("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn load_record(&self) -> SdkResult<RegistrationRecord> {
        self.inner.load_record().await
    }

    async fn save_record(&self, record: &RegistrationRecord) -> SdkResult<()> {
        self.check()?;
        self.inner.save_record(record).await
    }

    async fn get_campaign(&self, id: &str) -> SdkResult<Option<CampaignRecord>> {
        self.inner.get_campaign(id).await
    }

    async fn upsert_campaign(&self, campaign: &CampaignRecord) -> SdkResult<CampaignUpsert> {
        self.check()?;
        self.inner.upsert_campaign(campaign).await
    }

    async fn list_campaigns(&self) -> SdkResult<Vec<CampaignRecord>> {
        self.inner.list_campaigns().await
    }

    async fn mark_campaign_viewed(&self, id: &str) -> SdkResult<bool> {
        self.check()?;
        self.inner.mark_campaign_viewed(id).await
    }

    async fn delete_campaign(&self, id: &str) -> SdkResult<bool> {
        self.check()?;
        self.inner.delete_campaign(id).await
    }

    async fn clear_all(&self) -> SdkResult<()> {
        self.check()?;
        self.inner.clear_all().await
    }
}
