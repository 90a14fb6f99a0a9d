//! # herald-core: Pure Domain Model for the Herald Push SDK
//!
//! This crate holds everything about the SDK that can be decided without
//! touching a disk, a socket or a clock-driven timer.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Herald SDK Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Host Application                             │   │
//! │  │   initialize ─► register token ─► handle push ─► send metrics   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    herald-sdk (engines)                         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ herald-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌──────────────┐  ┌─────────┐  │   │
//! │  │   │   types   │  │  payload  │  │ notification │  │ metrics │  │   │
//! │  │   │ Record    │  │ parse_push│  │ PushNotif.   │  │ Entry   │  │   │
//! │  │   │ Campaign  │  │           │  │ Action       │  │ Value   │  │   │
//! │  │   └───────────┘  └───────────┘  └──────────────┘  └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Registration record, campaign/custom records, products
//! - [`payload`] - Push payload parsing (the pure half of classification)
//! - [`notification`] - Notification wrapper and interaction vocabulary
//! - [`metrics`] - Metric entries, values and the domain metric catalog
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use herald_core::{RegistrationRecord, RegistrationState};
//!
//! let mut record = RegistrationRecord::default();
//! assert_eq!(record.state, RegistrationState::AppUnregistered);
//!
//! record.advance_to(RegistrationState::PushTokenUnsentToManager).unwrap();
//! assert!(record.advance_to(RegistrationState::AppUnregistered).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod metrics;
pub mod notification;
pub mod payload;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, PayloadError, ValidationError};
pub use metrics::{GenderType, LoginProvider, MetricEntry, MetricKey, MetricValue};
pub use notification::{NotificationAction, NotificationDefaultAction, PushNotification};
pub use payload::{parse_push, ParsedPush, PushPayload, SDK_PAYLOAD_KEY};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Version of the SDK this build represents.
///
/// Stamped into the registration record on every complete registration and
/// compared against the stored value to detect upgrades and downgrades.
pub const SDK_VERSION: f64 = 2.0;

/// Platform identifier sent with app registration.
pub const PLATFORM: &str = "rust";
