//! # Registration Repository
//!
//! Stores the registration record as the single row `id = 1`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use herald_core::{RegistrationRecord, RegistrationState};

#[derive(Debug, sqlx::FromRow)]
struct RegistrationRow {
    app_id: Option<String>,
    device_id: Option<String>,
    universe_url: Option<String>,
    chat_enabled: bool,
    push_token: Option<String>,
    current_sdk_version: f64,
    state: i64,
}

impl From<RegistrationRow> for RegistrationRecord {
    fn from(row: RegistrationRow) -> Self {
        let state = RegistrationState::from_code(row.state).unwrap_or_else(|| {
            warn!(code = row.state, "Unknown stored registration state, starting over");
            RegistrationState::AppUnregistered
        });
        RegistrationRecord {
            app_id: row.app_id,
            device_id: row.device_id,
            universe_url: row.universe_url,
            chat_enabled: row.chat_enabled,
            push_token: row.push_token,
            current_sdk_version: row.current_sdk_version,
            state,
        }
    }
}

/// Repository for the registration singleton.
#[derive(Debug, Clone)]
pub struct RegistrationRepository {
    pool: SqlitePool,
}

impl RegistrationRepository {
    /// Creates a new RegistrationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RegistrationRepository { pool }
    }

    /// Loads the record. A store that never saved one yields the default.
    pub async fn load(&self) -> DbResult<RegistrationRecord> {
        let row: Option<RegistrationRow> = sqlx::query_as(
            r#"
            SELECT app_id, device_id, universe_url, chat_enabled,
                   push_token, current_sdk_version, state
            FROM registration
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RegistrationRecord::from).unwrap_or_default())
    }

    /// Writes the whole record.
    pub async fn save(&self, record: &RegistrationRecord) -> DbResult<()> {
        debug!(state = %record.state, "Saving registration record");

        sqlx::query(
            r#"
            INSERT INTO registration (
                id, app_id, device_id, universe_url, chat_enabled,
                push_token, current_sdk_version, state, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                app_id = excluded.app_id,
                device_id = excluded.device_id,
                universe_url = excluded.universe_url,
                chat_enabled = excluded.chat_enabled,
                push_token = excluded.push_token,
                current_sdk_version = excluded.current_sdk_version,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.app_id)
        .bind(&record.device_id)
        .bind(&record.universe_url)
        .bind(record.chat_enabled)
        .bind(&record.push_token)
        .bind(record.current_sdk_version)
        .bind(record.state.code())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the record; the next `load` returns the default.
    pub async fn reset(&self) -> DbResult<()> {
        debug!("Resetting registration record");
        sqlx::query("DELETE FROM registration")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
