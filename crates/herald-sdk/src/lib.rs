//! # herald-sdk: Client Engines for the Herald Push SDK
//!
//! This crate keeps a device registered with the Herald push backend,
//! classifies and dispatches incoming pushes, and batches analytics metrics.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Push Engine Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   PushEngine (host-facing facade)                │  │
//! │  │                                                                  │  │
//! │  │  Built once per process, optionally installed as shared          │  │
//! │  │  Owns one client, one store, one event bus                       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Registration   │  │ PushClassifier │  │  MetricsBatcher        │    │
//! │  │ StateMachine   │  │ + Notification │  │                        │    │
//! │  │                │  │   Dispatcher   │  │ In-memory queue        │    │
//! │  │ manager, token,│  │                │  │ Timer task + forced    │    │
//! │  │ universe steps │  │ campaign/custom│  │ flush, one in flight   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │         │                     │                     │                   │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  SyncClient (reqwest)              LocalStore (herald-db SQLite) │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  BUS EVENTS (to host listeners):                                       │
//! │  • SuccessfulAppRegistration / SuccessfulDeviceId                      │
//! │  • SdkVersionUpgraded / SdkVersionDowngraded                           │
//! │  • DidRegister / DidFailToRegister ForRemoteNotifications              │
//! │  • NewCampaign                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `PushEngine` facade and its builder
//! - [`registration`] - Registration state machine
//! - [`classifier`] - Push classification and four-way handlers
//! - [`dispatcher`] - Default actions, interactions, background completion
//! - [`metrics`] - Metrics queue, on-change cache, flush timer
//! - [`events`] - In-process event bus
//! - [`client`] - HTTP transport to the manager and universe backends
//! - [`protocol`] - Request/response bodies and endpoint paths
//! - [`store`] - Local persistence trait and its implementations
//! - [`config`] - TOML configuration with environment overrides
//! - [`logging`] - `tracing` subscriber with a runtime-adjustable level
//! - [`error`] - SDK error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use herald_sdk::{LogLevel, PushEngine, SdkConfig};
//!
//! let config = SdkConfig::load_or_default(None);
//! let engine = PushEngine::builder(config).install_logging(true).build().await?;
//! engine.start().await?;
//!
//! engine.initialize("app-id", "app-secret", LogLevel::Info).await?;
//! engine.did_register_for_remote_notifications(&token_bytes).await?;
//!
//! let check = engine.handle_remote_push(&payload).await?;
//! if check.is_new {
//!     println!("New campaign: {:?}", check.campaign);
//! }
//!
//! engine.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classifier;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod registration;
pub mod store;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use herald_core::{
    CampaignRecord, CustomRecord, LogLevel, MetricEntry, NotificationAction, PushNotification,
    PushPayload, RegistrationRecord, RegistrationState,
};

pub use classifier::{Classification, NewCampaignCheck, PushClassifier, PushHandlers};
pub use client::{HttpClientConfig, HttpSyncClient, Method, SyncClient, SyncFailure, SyncResponse};
pub use config::{LocationMode, NotificationType, NotificationTypes, SdkConfig};
pub use dispatcher::{
    BackgroundFetchResult, CompletionToken, DefaultDelegate, LandingPagePresenter,
    LoggingPresenter, NotificationDelegate, NotificationDispatcher,
};
pub use engine::{PushEngine, PushEngineBuilder};
pub use error::{SdkError, SdkResult};
pub use events::{BusEvent, EventBus, EventKind, ListenerId};
pub use metrics::{FlushOutcome, MetricsBatcher, MetricsTimer};
pub use registration::{Credentials, RegistrationStateMachine};
pub use herald_db::CampaignUpsert;
pub use store::{LocalStore, MemoryStore};
