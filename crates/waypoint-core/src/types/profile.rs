//! Per-account profile: display metadata, preferences and the stats snapshot.

use super::OwnerId;
use super::goal::double_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UI color scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Who may see the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
    pub reminders: bool,
    /// Minutes before an event that reminders fire.
    pub reminder_lead_minutes: u32,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            push: false,
            reminders: true,
            reminder_lead_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyPreferences {
    pub profile_visibility: Visibility,
    pub share_stats: bool,
}

/// The preferences document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
    /// BCP-47 language tag.
    pub language: String,
    pub notifications: NotificationPreferences,
    pub privacy: PrivacyPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: "en".to_string(),
            notifications: NotificationPreferences::default(),
            privacy: PrivacyPreferences::default(),
        }
    }
}

/// Denormalized counters, refreshed by the store whenever goals or events change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total_goals: u32,
    pub completed_goals: u32,
    pub active_goals: u32,
    pub total_events: u32,
    pub current_streak_days: u32,
    /// High-water mark of `current_streak_days`; never decreases.
    pub longest_streak_days: u32,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// One profile per owner, created lazily on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub owner: OwnerId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    /// IANA zone name, informational.
    pub timezone: String,
    pub preferences: Preferences,
    pub stats: ProfileStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A fresh profile with default preferences and empty stats.
    #[must_use]
    pub fn new(owner: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            owner,
            display_name: None,
            avatar_url: None,
            bio: None,
            timezone: "UTC".to_string(),
            preferences: Preferences::default(),
            stats: ProfileStats::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of the profile display fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub bio: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_preferences_fill_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"theme":"dark","notifications":{"push":true}}"#)
                .expect("parse");
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.language, "en");
        assert!(prefs.notifications.push);
        assert!(prefs.notifications.email);
        assert_eq!(prefs.notifications.reminder_lead_minutes, 15);
        assert_eq!(prefs.privacy.profile_visibility, Visibility::Private);
    }
}
