//! # Campaign Repository
//!
//! The keyed campaign set. Upserts run in a transaction so the "was it new"
//! answer and the write agree.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use herald_core::{sort_campaigns_newest_first, CampaignRecord};

#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: String,
    campaign_type: i64,
    title: String,
    text: String,
    link: Option<String>,
    thumbnail_link: Option<String>,
    date: Option<DateTime<Utc>>,
    viewed: bool,
}

impl From<CampaignRow> for CampaignRecord {
    fn from(row: CampaignRow) -> Self {
        CampaignRecord {
            id: row.id,
            campaign_type: row.campaign_type,
            title: row.title,
            text: row.text,
            link: row.link,
            thumbnail_link: row.thumbnail_link,
            date: row.date,
            viewed: row.viewed,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, campaign_type, title, text, link, thumbnail_link, date, viewed FROM campaigns";

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignUpsert {
    /// True if no campaign with this id existed before.
    pub is_new: bool,
    /// The record as stored after the upsert.
    pub record: CampaignRecord,
}

/// Repository for campaign operations.
#[derive(Debug, Clone)]
pub struct CampaignRepository {
    pool: SqlitePool,
}

impl CampaignRepository {
    /// Creates a new CampaignRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CampaignRepository { pool }
    }

    /// Gets a campaign by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<CampaignRecord>> {
        let row: Option<CampaignRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CampaignRecord::from))
    }

    /// Inserts a campaign or refreshes its content.
    ///
    /// An existing `viewed = true` is kept.
    pub async fn upsert(&self, incoming: &CampaignRecord) -> DbResult<CampaignUpsert> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let existing: Option<CampaignRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
                .bind(&incoming.id)
                .fetch_optional(&mut *tx)
                .await?;

        let is_new = existing.is_none();
        let record = match existing {
            Some(row) => {
                let mut stored = CampaignRecord::from(row);
                stored.refresh_from(incoming);
                stored
            }
            None => incoming.clone(),
        };

        debug!(campaign_id = %record.id, is_new, "Upserting campaign");

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, campaign_type, title, text, link, thumbnail_link,
                date, viewed, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(id) DO UPDATE SET
                campaign_type = excluded.campaign_type,
                title = excluded.title,
                text = excluded.text,
                link = excluded.link,
                thumbnail_link = excluded.thumbnail_link,
                date = excluded.date,
                viewed = excluded.viewed,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(record.campaign_type)
        .bind(&record.title)
        .bind(&record.text)
        .bind(&record.link)
        .bind(&record.thumbnail_link)
        .bind(record.date)
        .bind(record.viewed)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(CampaignUpsert { is_new, record })
    }

    /// Lists all campaigns, newest first, undated last.
    pub async fn list(&self) -> DbResult<Vec<CampaignRecord>> {
        let rows: Vec<CampaignRow> = sqlx::query_as(SELECT_COLUMNS)
            .fetch_all(&self.pool)
            .await?;
        let mut campaigns: Vec<CampaignRecord> = rows.into_iter().map(Into::into).collect();
        sort_campaigns_newest_first(&mut campaigns);
        Ok(campaigns)
    }

    /// Sets `viewed = true`. Returns true if it was not viewed before.
    pub async fn mark_viewed(&self, id: &str) -> DbResult<bool> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Campaign", id))?;
        if current.viewed {
            return Ok(false);
        }

        sqlx::query("UPDATE campaigns SET viewed = 1, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Deletes a campaign. Returns false if it was not stored.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        debug!(campaign_id = %id, "Deleting campaign");
        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every campaign.
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM campaigns")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts stored campaigns (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM campaigns")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;

    fn campaign(id: &str, year: Option<i32>) -> CampaignRecord {
        CampaignRecord {
            id: id.to_string(),
            campaign_type: 1,
            title: format!("Campaign {id}"),
            text: "Body".into(),
            link: Some("https://example.com/landing".into()),
            thumbnail_link: None,
            date: year.map(|y| Utc.with_ymd_and_hms(y, 6, 1, 12, 0, 0).unwrap()),
            viewed: false,
        }
    }

    async fn repo() -> CampaignRepository {
        Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .campaigns()
    }

    #[tokio::test]
    async fn test_upsert_reports_novelty() {
        let repo = repo().await;

        let first = repo.upsert(&campaign("c-1", Some(2024))).await.unwrap();
        assert!(first.is_new);

        let second = repo.upsert(&campaign("c-1", Some(2024))).await.unwrap();
        assert!(!second.is_new);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_content_but_keeps_viewed() {
        let repo = repo().await;
        repo.upsert(&campaign("c-1", None)).await.unwrap();
        assert!(repo.mark_viewed("c-1").await.unwrap());

        let mut incoming = campaign("c-1", Some(2025));
        incoming.title = "Updated".into();
        let result = repo.upsert(&incoming).await.unwrap();

        assert!(result.record.viewed);
        let stored = repo.get("c-1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Updated");
        assert!(stored.viewed);
        assert_eq!(stored.date, incoming.date);
    }

    #[tokio::test]
    async fn test_mark_viewed() {
        let repo = repo().await;
        repo.upsert(&campaign("c-1", None)).await.unwrap();

        assert!(repo.mark_viewed("c-1").await.unwrap());
        assert!(!repo.mark_viewed("c-1").await.unwrap());
        assert!(repo.mark_viewed("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = repo().await;
        repo.upsert(&campaign("undated", None)).await.unwrap();
        repo.upsert(&campaign("old", Some(2020))).await.unwrap();
        repo.upsert(&campaign("new", Some(2024))).await.unwrap();

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let repo = repo().await;
        repo.upsert(&campaign("a", None)).await.unwrap();
        repo.upsert(&campaign("b", None)).await.unwrap();

        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);

        repo.clear().await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }
}
