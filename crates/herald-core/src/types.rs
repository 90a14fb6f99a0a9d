//! # Domain Types
//!
//! Core domain types shared by the storage layer and the engines.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │ RegistrationRecord  │  │ CampaignRecord  │  │  CustomRecord   │     │
//! │  │  ─────────────────  │  │  ─────────────  │  │  ─────────────  │     │
//! │  │  device_id          │  │  id (key)       │  │  id             │     │
//! │  │  universe_url       │  │  title / text   │  │  title / text   │     │
//! │  │  chat_enabled       │  │  link / thumb   │  │  link / thumb   │     │
//! │  │  push_token         │  │  date           │  │  date           │     │
//! │  │  current_sdk_version│  │  viewed         │  │                 │     │
//! │  │  state              │  └─────────────────┘  └─────────────────┘     │
//! │  └─────────────────────┘                                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ RegistrationState (strictly increasing)                         │   │
//! │  │  AppUnregistered(0) → PushTokenUnsentToManager(10)              │   │
//! │  │    → ChatEnabledButNoUniverse(20) → PushTokenUnsentToUniverse(30)│  │
//! │  │    → Complete(40)                                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ValidationError};

// =============================================================================
// Registration State
// =============================================================================

/// Step of the device/app registration handshake.
///
/// The discriminants are the persisted codes. Ordering follows the codes, so
/// `a < b` means `a` comes earlier in the handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum RegistrationState {
    /// Nothing registered yet.
    #[default]
    AppUnregistered = 0,

    /// App registered, device id known, push token not yet sent to the manager.
    PushTokenUnsentToManager = 10,

    /// Token sent to the manager; chat is enabled but the universe URL is unknown.
    ChatEnabledButNoUniverse = 20,

    /// Universe URL known, push token not yet sent to the universe.
    PushTokenUnsentToUniverse = 30,

    /// Handshake finished.
    Complete = 40,
}

impl RegistrationState {
    /// Returns the persisted numeric code.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Parses a persisted code. Unknown codes yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RegistrationState::AppUnregistered),
            10 => Some(RegistrationState::PushTokenUnsentToManager),
            20 => Some(RegistrationState::ChatEnabledButNoUniverse),
            30 => Some(RegistrationState::PushTokenUnsentToUniverse),
            40 => Some(RegistrationState::Complete),
            _ => None,
        }
    }

    /// Returns true for the terminal state.
    #[inline]
    pub fn is_complete(self) -> bool {
        self == RegistrationState::Complete
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationState::AppUnregistered => write!(f, "app_unregistered"),
            RegistrationState::PushTokenUnsentToManager => write!(f, "push_token_unsent_to_manager"),
            RegistrationState::ChatEnabledButNoUniverse => write!(f, "chat_enabled_but_no_universe"),
            RegistrationState::PushTokenUnsentToUniverse => {
                write!(f, "push_token_unsent_to_universe")
            }
            RegistrationState::Complete => write!(f, "complete"),
        }
    }
}

// =============================================================================
// Registration Record
// =============================================================================

/// The persisted registration singleton for this installation.
///
/// ## Invariants
/// - `state` never decreases except through [`RegistrationRecord::reset`]
/// - `device_id` is set no later than the move out of `AppUnregistered`
///
/// Missing fields deserialize to unset/zero so older stored records load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRecord {
    /// App id the record was registered under.
    pub app_id: Option<String>,

    /// Identifier assigned by the manager.
    pub device_id: Option<String>,

    /// Secondary backend endpoint, assigned when chat is enabled.
    pub universe_url: Option<String>,

    /// Whether the manager enabled chat/universe features for this app.
    pub chat_enabled: bool,

    /// Platform push token, set by the host app.
    pub push_token: Option<String>,

    /// SDK version stamped at the last full registration.
    pub current_sdk_version: f64,

    /// Current handshake step.
    pub state: RegistrationState,
}

impl RegistrationRecord {
    /// Clears the whole record back to `AppUnregistered`.
    pub fn reset(&mut self) {
        *self = RegistrationRecord::default();
    }

    /// Moves the state forward.
    ///
    /// Staying in the same state is allowed; moving back is an error.
    pub fn advance_to(&mut self, next: RegistrationState) -> Result<(), CoreError> {
        if next < self.state {
            return Err(CoreError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Returns true once the app registration step has succeeded.
    pub fn is_app_registered(&self) -> bool {
        self.state > RegistrationState::AppUnregistered
    }

    /// Returns the device id if it is set and non-empty.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns the push token if it is set and non-empty.
    pub fn push_token(&self) -> Option<&str> {
        self.push_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Returns the universe URL if it is set and non-empty.
    pub fn universe_url(&self) -> Option<&str> {
        self.universe_url.as_deref().filter(|u| !u.is_empty())
    }

    /// State that follows a successful token upload to the manager.
    pub fn state_after_manager_token(&self) -> RegistrationState {
        if self.chat_enabled {
            RegistrationState::ChatEnabledButNoUniverse
        } else {
            RegistrationState::Complete
        }
    }
}

// =============================================================================
// SDK Version Comparison
// =============================================================================

/// Result of comparing the stored SDK version with the running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionChange {
    Upgraded,
    Downgraded,
    Unchanged,
}

/// Compares the version stored in the record against the running version.
///
/// Incomparable values (NaN) count as unchanged.
pub fn compare_versions(stored: f64, running: f64) -> VersionChange {
    match stored.partial_cmp(&running) {
        Some(std::cmp::Ordering::Less) => VersionChange::Upgraded,
        Some(std::cmp::Ordering::Greater) => VersionChange::Downgraded,
        _ => VersionChange::Unchanged,
    }
}

// =============================================================================
// Campaign Record
// =============================================================================

/// A backend-originated marketing push with a stable identifier.
///
/// `viewed` flips from false to true at most once and never reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    /// Unique campaign identifier (store key).
    pub id: String,

    /// Backend campaign type code.
    pub campaign_type: i64,

    pub title: String,
    pub text: String,

    /// Landing page link.
    pub link: Option<String>,

    /// Thumbnail image link.
    pub thumbnail_link: Option<String>,

    pub date: Option<DateTime<Utc>>,

    /// True once the user has seen the campaign.
    pub viewed: bool,
}

impl CampaignRecord {
    /// Marks the campaign as viewed. Returns true if it was not viewed before.
    pub fn mark_viewed(&mut self) -> bool {
        let changed = !self.viewed;
        self.viewed = true;
        changed
    }

    /// Copies content fields from a freshly classified push.
    ///
    /// `viewed` is kept: a refresh never un-views a campaign.
    pub fn refresh_from(&mut self, incoming: &CampaignRecord) {
        self.campaign_type = incoming.campaign_type;
        self.title = incoming.title.clone();
        self.text = incoming.text.clone();
        self.link = incoming.link.clone();
        self.thumbnail_link = incoming.thumbnail_link.clone();
        self.date = incoming.date;
        self.viewed = self.viewed || incoming.viewed;
    }
}

/// Sorts campaigns newest first; undated campaigns go last.
pub fn sort_campaigns_newest_first(campaigns: &mut [CampaignRecord]) {
    campaigns.sort_by(|a, b| match (a.date, b.date) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

// =============================================================================
// Custom Record
// =============================================================================

/// A backend push carrying app-defined fields but no campaign identity.
///
/// Transient: never stored, no viewed tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRecord {
    pub id: String,
    pub custom_type: i64,
    pub title: String,
    pub text: String,
    pub link: Option<String>,
    pub thumbnail_link: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

// =============================================================================
// Product
// =============================================================================

/// A product referenced by cart and purchase metrics.
///
/// Immutable value object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    name: String,
    product_id: String,
    price: f64,
    currency: String,
}

impl Product {
    /// Creates a product.
    pub fn new(
        name: impl Into<String>,
        product_id: impl Into<String>,
        price: f64,
        currency: impl Into<String>,
    ) -> Self {
        Product {
            name: name.into(),
            product_id: product_id.into(),
            price,
            currency: currency.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Offer representation sent inside cart and purchase metrics.
    pub fn offer(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "id": self.product_id,
            "price": self.price,
            "currency": self.currency,
        })
    }
}

// =============================================================================
// Log Level
// =============================================================================

/// Host-facing log verbosity, most quiet first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    #[default]
    Debug,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn filter_directive(self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Alert | LogLevel::Critical | LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Notice | LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            "alert" => Ok(LogLevel::Alert),
            "critical" => Ok(LogLevel::Critical),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "notice" => Ok(LogLevel::Notice),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(ValidationError::unrecognized("log level", other)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
