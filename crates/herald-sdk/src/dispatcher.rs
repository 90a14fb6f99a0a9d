//! # Notification Dispatcher
//!
//! Decides, per classified push, whether the SDK performs its default action
//! or leaves the notification to the host, and signals background completion.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  dispatch(notification, completion)                                    │
//! │     │                                                                   │
//! │     ├─► delegate.did_receive_notification                               │
//! │     │                                                                   │
//! │     ├─ default_action == LandingPage                                    │
//! │     │  && delegate.should_perform_default_action ?                      │
//! │     │        yes ──► presenter.present_landing_page(url) ──► true       │
//! │     │        no  ─────────────────────────────────────────► false      │
//! │     │                                                                   │
//! │     └─► completion.complete(NewData | NoData)   exactly once            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`CompletionToken`] is consumed by `complete`; if it is dropped on
//! any other path it completes with `Failed` instead.

use std::sync::Arc;

use tracing::{debug, warn};

use herald_core::{NotificationAction, NotificationDefaultAction, PushNotification};

// =============================================================================
// Completion
// =============================================================================

/// Result reported to the OS background-execution budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFetchResult {
    NewData,
    NoData,
    Failed,
}

type CompletionFn = Box<dyn FnOnce(BackgroundFetchResult) + Send>;

/// Background completion signal, invoked exactly once.
pub struct CompletionToken {
    callback: Option<CompletionFn>,
}

impl CompletionToken {
    pub fn new(callback: impl FnOnce(BackgroundFetchResult) + Send + 'static) -> Self {
        CompletionToken {
            callback: Some(Box::new(callback)),
        }
    }

    /// A token for callers with no completion handler.
    pub fn noop() -> Self {
        CompletionToken { callback: None }
    }

    pub fn complete(mut self, result: BackgroundFetchResult) {
        if let Some(callback) = self.callback.take() {
            debug!(?result, "Completing background work");
            callback(result);
        }
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!("Completion token dropped without completing, reporting failure");
            callback(BackgroundFetchResult::Failed);
        }
    }
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

// =============================================================================
// Host Collaborators
// =============================================================================

/// Host hooks for notifications. Every method has a default.
pub trait NotificationDelegate: Send + Sync {
    /// Whether the SDK may perform the notification's default action.
    fn should_perform_default_action(&self, _notification: &PushNotification) -> bool {
        true
    }

    fn did_receive_notification(&self, _notification: &PushNotification) {}

    /// The user picked `action` on `notification`.
    fn did_perform_interaction(
        &self,
        _action: NotificationAction,
        _notification: Option<&PushNotification>,
    ) {
    }
}

/// Delegate that lets the SDK do everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDelegate;

impl NotificationDelegate for DefaultDelegate {}

/// Shows landing pages. Rendering is up to the host.
pub trait LandingPagePresenter: Send + Sync {
    fn present_landing_page(&self, url: &str, notification: &PushNotification);
}

/// Presenter for hosts without a UI; only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPresenter;

impl LandingPagePresenter for LoggingPresenter {
    fn present_landing_page(&self, url: &str, notification: &PushNotification) {
        debug!(
            url = %url,
            notification_id = ?notification.notification_id(),
            "No presenter installed, landing page not shown"
        );
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Stateless per call.
pub struct NotificationDispatcher {
    delegate: Arc<dyn NotificationDelegate>,
    presenter: Arc<dyn LandingPagePresenter>,
}

impl NotificationDispatcher {
    pub fn new(
        delegate: Arc<dyn NotificationDelegate>,
        presenter: Arc<dyn LandingPagePresenter>,
    ) -> Self {
        NotificationDispatcher {
            delegate,
            presenter,
        }
    }

    /// Returns true if the SDK performed the default action.
    pub fn dispatch(&self, notification: &PushNotification, completion: CompletionToken) -> bool {
        self.delegate.did_receive_notification(notification);

        let performed = match (notification.default_action, notification.landing_page_url()) {
            (NotificationDefaultAction::LandingPage, Some(url))
                if self.delegate.should_perform_default_action(notification) =>
            {
                self.presenter.present_landing_page(url, notification);
                true
            }
            (NotificationDefaultAction::LandingPage, _) => {
                debug!(
                    notification_id = ?notification.notification_id(),
                    "Default action deferred to host"
                );
                false
            }
            (NotificationDefaultAction::None, _) => false,
        };

        let result = if notification.notification_id().is_some() {
            BackgroundFetchResult::NewData
        } else {
            BackgroundFetchResult::NoData
        };
        completion.complete(result);

        performed
    }

    /// Reports a user interaction.
    ///
    /// Returns the parsed action, or `None` (logged) for an identifier
    /// outside the vocabulary.
    pub fn perform_interaction(
        &self,
        action_id: &str,
        notification: Option<&PushNotification>,
    ) -> Option<NotificationAction> {
        let action = match action_id.parse::<NotificationAction>() {
            Ok(action) => action,
            Err(e) => {
                warn!(action = %action_id, error = %e, "Ignoring unknown notification action");
                return None;
            }
        };

        debug!(%action, notification_id = ?notification.and_then(|n| n.notification_id()), "Notification interaction");
        self.delegate.did_perform_interaction(action, notification);
        Some(action)
    }
}
