//! # herald-db: Local Store for the Herald Push SDK
//!
//! SQLite persistence for the registration record and the campaign set,
//! using sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Herald SDK Data Flow                             │
//! │                                                                         │
//! │  RegistrationStateMachine / PushClassifier (herald-sdk)                │
//! │       │  LocalStore trait                                               │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     herald-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌─────────────┐  │   │
//! │  │   │   Database    │    │  Repositories    │   │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ RegistrationRepo │   │ (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ CampaignRepo     │   │ 001_init    │  │   │
//! │  │   └───────────────┘    └──────────────────┘   └─────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file under the platform data directory                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Registration and campaign repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use herald_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/herald.db")).await?;
//! let record = db.registration().load().await?;
//! let campaigns = db.campaigns().list().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::campaign::{CampaignRepository, CampaignUpsert};
pub use repository::registration::RegistrationRepository;
