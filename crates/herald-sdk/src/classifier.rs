//! # Push Classifier
//!
//! Turns a raw push payload into a campaign, a custom notification, or a
//! payload that belongs to the host app.
//!
//! ```text
//!  payload ──parse_push──┬─► Campaign ──upsert──► LocalStore
//!                        │       │ first time seen?
//!                        │       └──► EventBus: NewCampaign
//!                        ├─► Custom   (transient)
//!                        ├─► Other    (payload handed back)
//!                        └─► Err      (malformed SDK data)
//! ```
//!
//! No network call. The result depends only on the payload and the stored
//! campaign set.

use std::sync::Arc;

use tracing::{debug, info, warn};

use herald_core::{parse_push, CampaignRecord, CustomRecord, ParsedPush, PushPayload};

use crate::error::{SdkError, SdkResult};
use crate::events::{BusEvent, EventBus};
use crate::store::LocalStore;

// =============================================================================
// Results
// =============================================================================

/// Category of a classified push.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// `is_new` is true only the first time this campaign id is seen.
    Campaign {
        is_new: bool,
        record: CampaignRecord,
    },
    Custom(CustomRecord),
    /// No SDK data; the payload is returned unchanged.
    Other(PushPayload),
}

impl Classification {
    pub fn campaign(&self) -> Option<&CampaignRecord> {
        match self {
            Classification::Campaign { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn is_new_campaign(&self) -> bool {
        matches!(self, Classification::Campaign { is_new: true, .. })
    }
}

/// Combined answer for callers that only ask "is this a new campaign?".
///
/// A malformed payload is an `Err` of the call, never a check with
/// `campaign: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaignCheck {
    pub is_new: bool,
    pub campaign: Option<CampaignRecord>,
}

impl From<Classification> for NewCampaignCheck {
    fn from(classification: Classification) -> Self {
        match classification {
            Classification::Campaign { is_new, record } => NewCampaignCheck {
                is_new,
                campaign: Some(record),
            },
            _ => NewCampaignCheck {
                is_new: false,
                campaign: None,
            },
        }
    }
}

// =============================================================================
// Classifier
// =============================================================================

pub struct PushClassifier {
    store: Arc<dyn LocalStore>,
    events: Arc<EventBus>,
}

impl PushClassifier {
    pub fn new(store: Arc<dyn LocalStore>, events: Arc<EventBus>) -> Self {
        PushClassifier { store, events }
    }

    /// Classifies a payload, storing campaigns.
    ///
    /// Every campaign push refreshes the stored record; `viewed` is kept.
    pub async fn classify(&self, payload: &PushPayload) -> SdkResult<Classification> {
        let parsed = parse_push(payload).map_err(|e| {
            warn!(error = %e, "Malformed push payload");
            SdkError::from(e)
        })?;

        match parsed {
            ParsedPush::Campaign(campaign) => {
                let upsert = self.store.upsert_campaign(&campaign).await?;
                if upsert.is_new {
                    info!(campaign_id = %upsert.record.id, "New campaign received");
                    self.events.emit(BusEvent::NewCampaign {
                        campaign_id: upsert.record.id.clone(),
                    });
                } else {
                    debug!(campaign_id = %upsert.record.id, "Known campaign refreshed");
                }
                Ok(Classification::Campaign {
                    is_new: upsert.is_new,
                    record: upsert.record,
                })
            }
            ParsedPush::Custom(custom) => {
                debug!(custom_id = %custom.id, "Custom notification received");
                Ok(Classification::Custom(custom))
            }
            ParsedPush::Other => {
                debug!("Push carries no SDK data");
                Ok(Classification::Other(payload.clone()))
            }
        }
    }

    /// Classifies and reduces the result to the new-campaign fact.
    pub async fn check_new_campaign(&self, payload: &PushPayload) -> SdkResult<NewCampaignCheck> {
        self.classify(payload).await.map(NewCampaignCheck::from)
    }
}

// =============================================================================
// Handlers
// =============================================================================

type CampaignHandler = Box<dyn FnOnce(bool, CampaignRecord) + Send>;
type CustomHandler = Box<dyn FnOnce(CustomRecord) + Send>;
type OtherHandler = Box<dyn FnOnce(PushPayload) + Send>;
type FailHandler = Box<dyn FnOnce(SdkError) + Send>;

/// Four-way callbacks for a classification. Each one is optional; a missing
/// handler drops that outcome.
#[derive(Default)]
pub struct PushHandlers {
    on_campaign: Option<CampaignHandler>,
    on_custom: Option<CustomHandler>,
    on_other: Option<OtherHandler>,
    on_fail: Option<FailHandler>,
}

impl PushHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_campaign(mut self, f: impl FnOnce(bool, CampaignRecord) + Send + 'static) -> Self {
        self.on_campaign = Some(Box::new(f));
        self
    }

    pub fn on_custom(mut self, f: impl FnOnce(CustomRecord) + Send + 'static) -> Self {
        self.on_custom = Some(Box::new(f));
        self
    }

    pub fn on_other(mut self, f: impl FnOnce(PushPayload) + Send + 'static) -> Self {
        self.on_other = Some(Box::new(f));
        self
    }

    pub fn on_fail(mut self, f: impl FnOnce(SdkError) + Send + 'static) -> Self {
        self.on_fail = Some(Box::new(f));
        self
    }

    /// Calls the handler matching `result`, if one is set.
    pub fn deliver(self, result: SdkResult<Classification>) {
        match result {
            Ok(Classification::Campaign { is_new, record }) => {
                if let Some(f) = self.on_campaign {
                    f(is_new, record);
                }
            }
            Ok(Classification::Custom(record)) => {
                if let Some(f) = self.on_custom {
                    f(record);
                }
            }
            Ok(Classification::Other(payload)) => {
                if let Some(f) = self.on_other {
                    f(payload);
                }
            }
            Err(e) => {
                if let Some(f) = self.on_fail {
                    f(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::store::MemoryStore;
    use crate::test_support::RecordingListener;
    use serde_json::json;
    use std::sync::Mutex;

    fn payload(value: serde_json::Value) -> PushPayload {
        value.as_object().cloned().unwrap()
    }

    fn campaign_push(id: &str, title: &str) -> PushPayload {
        payload(json!({
            "aps": {"alert": "hello"},
            "psh": {"campaign_id": id, "type": 1, "title": title, "url": "https://shop.example/x"}
        }))
    }

    fn classifier() -> (PushClassifier, Arc<MemoryStore>, RecordingListener) {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::new());
        let listener = RecordingListener::attach(&events);
        (PushClassifier::new(store.clone(), events), store, listener)
    }

    #[tokio::test]
    async fn test_campaign_is_new_only_once() {
        let (classifier, _store, listener) = classifier();
        let push = campaign_push("c-1", "Sale");

        let first = classifier.classify(&push).await.unwrap();
        let second = classifier.classify(&push).await.unwrap();

        assert!(first.is_new_campaign());
        assert!(!second.is_new_campaign());
        assert_eq!(first.campaign(), second.campaign());
        assert_eq!(first.campaign().unwrap().text, "hello");
        assert_eq!(listener.count(EventKind::NewCampaign), 1);
    }

    #[tokio::test]
    async fn test_campaign_refresh_keeps_viewed() {
        let (classifier, store, _) = classifier();
        classifier.classify(&campaign_push("c-1", "Old")).await.unwrap();
        store.mark_campaign_viewed("c-1").await.unwrap();

        let refreshed = classifier
            .classify(&campaign_push("c-1", "New"))
            .await
            .unwrap();

        let record = refreshed.campaign().unwrap();
        assert_eq!(record.title, "New");
        assert!(record.viewed);
    }

    #[tokio::test]
    async fn test_custom_is_not_stored() {
        let (classifier, store, listener) = classifier();
        let push = payload(json!({"psh": {"custom_id": "x-1", "type": "3", "text": "hi"}}));

        let result = classifier.classify(&push).await.unwrap();

        match result {
            Classification::Custom(record) => {
                assert_eq!(record.id, "x-1");
                assert_eq!(record.custom_type, 3);
            }
            other => panic!("expected custom, got {other:?}"),
        }
        assert!(store.list_campaigns().await.unwrap().is_empty());
        assert!(listener.events().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_payload_passes_through() {
        let (classifier, _, _) = classifier();
        let push = payload(json!({"aps": {"alert": "from the app"}, "order": 42}));

        let result = classifier.classify(&push).await.unwrap();

        assert_eq!(result, Classification::Other(push));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_classification_error() {
        let (classifier, store, _) = classifier();
        let push = payload(json!({"psh": {"campaign_id": "c-1"}}));

        let err = classifier.classify(&push).await.unwrap_err();

        assert!(err.is_classification_error());
        assert!(!err.is_retryable());
        assert!(store.get_campaign("c-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_new_campaign() {
        let (classifier, _, _) = classifier();

        let check = classifier
            .check_new_campaign(&campaign_push("c-1", "Sale"))
            .await
            .unwrap();
        assert!(check.is_new);
        assert_eq!(check.campaign.unwrap().id, "c-1");

        let foreign = classifier
            .check_new_campaign(&payload(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(
            foreign,
            NewCampaignCheck {
                is_new: false,
                campaign: None
            }
        );

        let malformed = classifier
            .check_new_campaign(&payload(json!({"psh": {}})))
            .await;
        assert!(malformed.is_err());
    }

    #[tokio::test]
    async fn test_handlers_route_each_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handlers = |seen: &Arc<Mutex<Vec<String>>>| {
            let (a, b, c, d) = (seen.clone(), seen.clone(), seen.clone(), seen.clone());
            PushHandlers::new()
                .on_campaign(move |is_new, r| a.lock().unwrap().push(format!("campaign:{}:{is_new}", r.id)))
                .on_custom(move |r| b.lock().unwrap().push(format!("custom:{}", r.id)))
                .on_other(move |_| c.lock().unwrap().push("other".into()))
                .on_fail(move |_| d.lock().unwrap().push("fail".into()))
        };

        let (classifier, _, _) = classifier();
        for push in [
            campaign_push("c-1", "Sale"),
            payload(json!({"psh": {"custom_id": "x-1", "type": 1}})),
            payload(json!({"order": 42})),
            payload(json!({"psh": "broken"})),
        ] {
            handlers(&seen).deliver(classifier.classify(&push).await);
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["campaign:c-1:true", "custom:x-1", "other", "fail"]
        );
    }

    #[test]
    fn test_missing_handler_is_a_no_op() {
        PushHandlers::new().deliver(Ok(Classification::Other(PushPayload::new())));
        PushHandlers::new().deliver(Err(SdkError::NotRegistered));
    }
}
