//! Notification wrapper handed to the host, and the interaction vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::payload::PushPayload;
use crate::types::{CampaignRecord, CustomRecord};

// =============================================================================
// Push Notification
// =============================================================================

/// What the SDK would do on its own for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationDefaultAction {
    /// Present the landing page behind the notification's link.
    LandingPage,
    None,
}

/// A classified push as seen by the notification delegate.
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    /// The raw payload.
    pub user_info: PushPayload,
    pub campaign: Option<CampaignRecord>,
    pub custom: Option<CustomRecord>,
    pub default_action: NotificationDefaultAction,
}

impl PushNotification {
    /// Wraps a campaign push.
    pub fn from_campaign(user_info: PushPayload, campaign: CampaignRecord) -> Self {
        let default_action = action_for(campaign.link.as_deref());
        PushNotification {
            user_info,
            campaign: Some(campaign),
            custom: None,
            default_action,
        }
    }

    /// Wraps a custom push.
    pub fn from_custom(user_info: PushPayload, custom: CustomRecord) -> Self {
        let default_action = action_for(custom.link.as_deref());
        PushNotification {
            user_info,
            campaign: None,
            custom: Some(custom),
            default_action,
        }
    }

    /// Wraps a payload without SDK data.
    pub fn foreign(user_info: PushPayload) -> Self {
        PushNotification {
            user_info,
            campaign: None,
            custom: None,
            default_action: NotificationDefaultAction::None,
        }
    }

    /// Link of the landing page, if any.
    pub fn landing_page_url(&self) -> Option<&str> {
        self.campaign
            .as_ref()
            .and_then(|c| c.link.as_deref())
            .or_else(|| self.custom.as_ref().and_then(|c| c.link.as_deref()))
    }

    /// Identifier of the campaign or custom record behind this notification.
    pub fn notification_id(&self) -> Option<&str> {
        self.campaign
            .as_ref()
            .map(|c| c.id.as_str())
            .or_else(|| self.custom.as_ref().map(|c| c.id.as_str()))
    }
}

fn action_for(link: Option<&str>) -> NotificationDefaultAction {
    match link {
        Some(l) if !l.is_empty() => NotificationDefaultAction::LandingPage,
        _ => NotificationDefaultAction::None,
    }
}

// =============================================================================
// Notification Action
// =============================================================================

/// Fixed vocabulary of user interactions on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationAction {
    Ok,
    Cancel,
    Edit,
    Send,
    Buy,
    Save,
    Find,
    Like,
    Dislike,
    Launch,
    Remind,
    Delete,
    Forbid,
    Follow,
    Share,
    Shop,
    Later,
    Yes,
    No,
    Accept,
    Decline,
}

impl NotificationAction {
    pub const ALL: [NotificationAction; 21] = [
        NotificationAction::Ok,
        NotificationAction::Cancel,
        NotificationAction::Edit,
        NotificationAction::Send,
        NotificationAction::Buy,
        NotificationAction::Save,
        NotificationAction::Find,
        NotificationAction::Like,
        NotificationAction::Dislike,
        NotificationAction::Launch,
        NotificationAction::Remind,
        NotificationAction::Delete,
        NotificationAction::Forbid,
        NotificationAction::Follow,
        NotificationAction::Share,
        NotificationAction::Shop,
        NotificationAction::Later,
        NotificationAction::Yes,
        NotificationAction::No,
        NotificationAction::Accept,
        NotificationAction::Decline,
    ];

    /// Wire identifier, e.g. `"OK"`.
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationAction::Ok => "OK",
            NotificationAction::Cancel => "CANCEL",
            NotificationAction::Edit => "EDIT",
            NotificationAction::Send => "SEND",
            NotificationAction::Buy => "BUY",
            NotificationAction::Save => "SAVE",
            NotificationAction::Find => "FIND",
            NotificationAction::Like => "LIKE",
            NotificationAction::Dislike => "DISLIKE",
            NotificationAction::Launch => "LAUNCH",
            NotificationAction::Remind => "REMIND",
            NotificationAction::Delete => "DELETE",
            NotificationAction::Forbid => "FORBID",
            NotificationAction::Follow => "FOLLOW",
            NotificationAction::Share => "SHARE",
            NotificationAction::Shop => "SHOP",
            NotificationAction::Later => "LATER",
            NotificationAction::Yes => "YES",
            NotificationAction::No => "NO",
            NotificationAction::Accept => "ACCEPT",
            NotificationAction::Decline => "DECLINE",
        }
    }
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationAction {
    type Err = ValidationError;

    /// Case-insensitive; an `ACTION_` prefix is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("ACTION_").unwrap_or(&upper);
        NotificationAction::ALL
            .into_iter()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| ValidationError::unrecognized("notification action", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(link: Option<&str>) -> CampaignRecord {
        CampaignRecord {
            id: "c-1".into(),
            campaign_type: 1,
            title: String::new(),
            text: String::new(),
            link: link.map(str::to_owned),
            thumbnail_link: None,
            date: None,
            viewed: false,
        }
    }

    #[test]
    fn test_default_action_follows_link() {
        let with_link =
            PushNotification::from_campaign(PushPayload::new(), campaign(Some("https://a.b/")));
        assert_eq!(with_link.default_action, NotificationDefaultAction::LandingPage);
        assert_eq!(with_link.landing_page_url(), Some("https://a.b/"));
        assert_eq!(with_link.notification_id(), Some("c-1"));

        let without = PushNotification::from_campaign(PushPayload::new(), campaign(None));
        assert_eq!(without.default_action, NotificationDefaultAction::None);

        let foreign = PushNotification::foreign(PushPayload::new());
        assert_eq!(foreign.default_action, NotificationDefaultAction::None);
        assert!(foreign.notification_id().is_none());
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("ok".parse::<NotificationAction>().unwrap(), NotificationAction::Ok);
        assert_eq!(
            "ACTION_DECLINE".parse::<NotificationAction>().unwrap(),
            NotificationAction::Decline
        );
        assert!("SNOOZE".parse::<NotificationAction>().is_err());
    }

    #[test]
    fn test_every_action_parses_from_its_id() {
        for action in NotificationAction::ALL {
            assert_eq!(action.as_str().parse::<NotificationAction>().unwrap(), action);
        }
    }
}
