//! Calendar event rows.

use super::goal::double_option;
use super::{CategoryId, EventId, OwnerId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A calendar event row. Plain CRUD, no derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub owner: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub category: Option<CategoryId>,
    /// Free-form tags, kept sorted and deduplicated.
    pub tags: BTreeSet<String>,
    /// Override color (`#RRGGBB`), taking precedence over the category color.
    pub color: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Whether the event touches the given calendar day (UTC).
    #[must_use]
    pub fn overlaps_day(&self, day: NaiveDate) -> bool {
        self.start.date_naive() <= day && day <= self.end.date_naive()
    }

    /// Whether the event is running at `now`.
    #[must_use]
    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

/// Input for creating an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewEvent {
    /// A timed event with no optional fields set.
    #[must_use]
    pub fn timed(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: None,
            start,
            end,
            all_day: false,
            category: None,
            tags: BTreeSet::new(),
            color: None,
            location: None,
        }
    }
}

/// Partial update of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Option<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<Option<String>>,
}

impl EventPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }
}
