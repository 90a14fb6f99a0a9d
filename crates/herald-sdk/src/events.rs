//! # Event Bus
//!
//! Typed lifecycle events with synchronous fan-out.
//!
//! ```text
//!  RegistrationStateMachine ─┐
//!  PushClassifier ───────────┼──► EventBus::emit(event)
//!  PushEngine (platform) ────┘        │ snapshot listeners, release lock
//!                                     ├──► listener A (all kinds)
//!                                     └──► listener B (filter: NewCampaign)
//! ```
//!
//! A listener removed while an emission is in progress may or may not
//! receive that emission.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

// =============================================================================
// Events
// =============================================================================

/// Lifecycle events emitted by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// First successful move out of `AppUnregistered`.
    SuccessfulAppRegistration,

    /// The device id became non-empty for the first time.
    SuccessfulDeviceId { device_id: String },

    SdkVersionUpgraded { from: f64, to: f64 },

    SdkVersionDowngraded { from: f64, to: f64 },

    /// The platform delivered a push token.
    DidRegisterForRemoteNotifications { push_token: String },

    /// The platform refused push registration.
    DidFailToRegisterForRemoteNotifications { reason: String },

    /// A campaign id was classified for the first time.
    NewCampaign { campaign_id: String },
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::SuccessfulAppRegistration => EventKind::SuccessfulAppRegistration,
            BusEvent::SuccessfulDeviceId { .. } => EventKind::SuccessfulDeviceId,
            BusEvent::SdkVersionUpgraded { .. } => EventKind::SdkVersionUpgraded,
            BusEvent::SdkVersionDowngraded { .. } => EventKind::SdkVersionDowngraded,
            BusEvent::DidRegisterForRemoteNotifications { .. } => {
                EventKind::DidRegisterForRemoteNotifications
            }
            BusEvent::DidFailToRegisterForRemoteNotifications { .. } => {
                EventKind::DidFailToRegisterForRemoteNotifications
            }
            BusEvent::NewCampaign { .. } => EventKind::NewCampaign,
        }
    }
}

/// Discriminant of [`BusEvent`], used for listener filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SuccessfulAppRegistration,
    SuccessfulDeviceId,
    SdkVersionUpgraded,
    SdkVersionDowngraded,
    DidRegisterForRemoteNotifications,
    DidFailToRegisterForRemoteNotifications,
    NewCampaign,
}

// =============================================================================
// Bus
// =============================================================================

/// Identifies a subscription for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    filter: Option<HashSet<EventKind>>,
    listener: Listener,
}

/// Publish/subscribe registry.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every event.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    /// Subscribes to the given kinds only.
    pub fn subscribe_filtered<F>(&self, kinds: &[EventKind], listener: F) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(Some(kinds.iter().copied().collect()), Arc::new(listener))
    }

    fn register(&self, filter: Option<HashSet<EventKind>>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(Registration {
                id,
                filter,
                listener,
            }),
            Err(_) => warn!("Event bus lock poisoned, listener not registered"),
        }
        id
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Delivers `event` to every matching listener, on the caller's thread.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe.
    pub fn emit(&self, event: BusEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners
                .iter()
                .filter(|r| r.filter.as_ref().map_or(true, |f| f.contains(&kind)))
                .map(|r| Arc::clone(&r.listener))
                .collect(),
            Err(_) => {
                warn!(?kind, "Event bus lock poisoned, event dropped");
                return;
            }
        };

        debug!(?kind, listeners = targets.len(), "Emitting event");
        for listener in targets {
            listener(&event);
        }
    }
}
