//! # Local Store
//!
//! Durable storage of the registration record and the campaign set, as seen
//! by the engines.
//!
//! ```text
//!             ┌──────────────────────┐
//!             │  LocalStore (trait)  │
//!             └──────────┬───────────┘
//!          ┌─────────────┴──────────────┐
//!          ▼                            ▼
//!   MemoryStore                  herald_db::Database
//!   (tests, no-disk hosts)       (SQLite, embedded migrations)
//! ```
//!
//! Read-modify-write, not versioned. The registration engine serializes its
//! own writes; the store only needs each call to be atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use herald_core::{sort_campaigns_newest_first, CampaignRecord, RegistrationRecord};
use herald_db::{CampaignUpsert, Database};

use crate::error::SdkResult;

/// Storage collaborator of every engine.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Loads the registration record; unset fields default.
    async fn load_record(&self) -> SdkResult<RegistrationRecord>;

    async fn save_record(&self, record: &RegistrationRecord) -> SdkResult<()>;

    async fn get_campaign(&self, id: &str) -> SdkResult<Option<CampaignRecord>>;

    /// Inserts or refreshes a campaign, keeping `viewed = true`.
    async fn upsert_campaign(&self, campaign: &CampaignRecord) -> SdkResult<CampaignUpsert>;

    /// All campaigns, newest first.
    async fn list_campaigns(&self) -> SdkResult<Vec<CampaignRecord>>;

    /// Returns false if the campaign is unknown or was already viewed.
    async fn mark_campaign_viewed(&self, id: &str) -> SdkResult<bool>;

    /// Returns false if the campaign was not stored.
    async fn delete_campaign(&self, id: &str) -> SdkResult<bool>;

    /// Resets the record and removes every campaign.
    async fn clear_all(&self) -> SdkResult<()>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    record: RegistrationRecord,
    campaigns: HashMap<String, CampaignRecord>,
}

/// Non-durable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing record (e.g. one left by a previous run).
    pub fn with_record(record: RegistrationRecord) -> Self {
        MemoryStore {
            state: Mutex::new(MemoryState {
                record,
                campaigns: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load_record(&self) -> SdkResult<RegistrationRecord> {
        Ok(self.state.lock().await.record.clone())
    }

    async fn save_record(&self, record: &RegistrationRecord) -> SdkResult<()> {
        self.state.lock().await.record = record.clone();
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> SdkResult<Option<CampaignRecord>> {
        Ok(self.state.lock().await.campaigns.get(id).cloned())
    }

    async fn upsert_campaign(&self, campaign: &CampaignRecord) -> SdkResult<CampaignUpsert> {
        let mut state = self.state.lock().await;
        let (is_new, record) = match state.campaigns.get_mut(&campaign.id) {
            Some(stored) => {
                stored.refresh_from(campaign);
                (false, stored.clone())
            }
            None => {
                state
                    .campaigns
                    .insert(campaign.id.clone(), campaign.clone());
                (true, campaign.clone())
            }
        };
        Ok(CampaignUpsert { is_new, record })
    }

    async fn list_campaigns(&self) -> SdkResult<Vec<CampaignRecord>> {
        let mut campaigns: Vec<CampaignRecord> =
            self.state.lock().await.campaigns.values().cloned().collect();
        sort_campaigns_newest_first(&mut campaigns);
        Ok(campaigns)
    }

    async fn mark_campaign_viewed(&self, id: &str) -> SdkResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .campaigns
            .get_mut(id)
            .map(CampaignRecord::mark_viewed)
            .unwrap_or(false))
    }

    async fn delete_campaign(&self, id: &str) -> SdkResult<bool> {
        Ok(self.state.lock().await.campaigns.remove(id).is_some())
    }

    async fn clear_all(&self) -> SdkResult<()> {
        let mut state = self.state.lock().await;
        state.record.reset();
        state.campaigns.clear();
        Ok(())
    }
}

// =============================================================================
// SQLite Store
// =============================================================================

#[async_trait]
impl LocalStore for Database {
    async fn load_record(&self) -> SdkResult<RegistrationRecord> {
        Ok(self.registration().load().await?)
    }

    async fn save_record(&self, record: &RegistrationRecord) -> SdkResult<()> {
        Ok(self.registration().save(record).await?)
    }

    async fn get_campaign(&self, id: &str) -> SdkResult<Option<CampaignRecord>> {
        Ok(self.campaigns().get(id).await?)
    }

    async fn upsert_campaign(&self, campaign: &CampaignRecord) -> SdkResult<CampaignUpsert> {
        Ok(self.campaigns().upsert(campaign).await?)
    }

    async fn list_campaigns(&self) -> SdkResult<Vec<CampaignRecord>> {
        Ok(self.campaigns().list().await?)
    }

    async fn mark_campaign_viewed(&self, id: &str) -> SdkResult<bool> {
        match self.campaigns().mark_viewed(id).await {
            Ok(changed) => Ok(changed),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_campaign(&self, id: &str) -> SdkResult<bool> {
        Ok(self.campaigns().delete(id).await?)
    }

    async fn clear_all(&self) -> SdkResult<()> {
        self.registration().reset().await?;
        self.campaigns().clear().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::RegistrationState;
    use herald_db::DbConfig;

    fn campaign(id: &str) -> CampaignRecord {
        CampaignRecord {
            id: id.into(),
            campaign_type: 1,
            title: "t".into(),
            text: "x".into(),
            link: None,
            thumbnail_link: None,
            date: None,
            viewed: false,
        }
    }

    async fn exercise(store: &dyn LocalStore) {
        let mut record = store.load_record().await.unwrap();
        assert_eq!(record.state, RegistrationState::AppUnregistered);
        record.device_id = Some("dev-1".into());
        record.state = RegistrationState::Complete;
        store.save_record(&record).await.unwrap();
        assert_eq!(store.load_record().await.unwrap(), record);

        assert!(store.upsert_campaign(&campaign("c-1")).await.unwrap().is_new);
        assert!(!store.upsert_campaign(&campaign("c-1")).await.unwrap().is_new);
        assert!(store.mark_campaign_viewed("c-1").await.unwrap());
        assert!(!store.mark_campaign_viewed("missing").await.unwrap());

        let refreshed = store.upsert_campaign(&campaign("c-1")).await.unwrap();
        assert!(refreshed.record.viewed);

        store.upsert_campaign(&campaign("c-2")).await.unwrap();
        assert!(store.delete_campaign("c-2").await.unwrap());
        assert_eq!(store.list_campaigns().await.unwrap().len(), 1);

        store.clear_all().await.unwrap();
        let cleared = store.load_record().await.unwrap();
        assert_eq!(cleared.state, RegistrationState::AppUnregistered);
        assert!(cleared.device_id().is_none());
        assert!(store.list_campaigns().await.unwrap().is_empty());
        assert!(store.get_campaign("c-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        exercise(&db).await;
    }
}
