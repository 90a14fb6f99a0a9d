//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LocalStore (herald-sdk)                                               │
//! │       │                                                                 │
//! │       │  db.registration().load()                                      │
//! │       ▼                                                                 │
//! │  RegistrationRepository            CampaignRepository                  │
//! │  ├── load()                        ├── get(id)                         │
//! │  ├── save(record)                  ├── upsert(record)                  │
//! │  └── reset()                       ├── list()                          │
//! │                                    ├── mark_viewed(id)                 │
//! │                                    ├── delete(id)                      │
//! │                                    └── clear()                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`registration::RegistrationRepository`] - The registration singleton
//! - [`campaign::CampaignRepository`] - The keyed campaign set

pub mod campaign;
pub mod registration;
