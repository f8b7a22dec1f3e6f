//! # Owner Export
//!
//! A `Snapshot` is everything one owner has: goals, events, categories and
//! the profile. It is serde-serializable (the CLI writes it as JSON) and can
//! be loaded back into any store through `Planner::import`, which allocates
//! fresh ids and re-runs every validation.
//!
//! Rows in a snapshot keep their original ids so references between them
//! (goal parent, goal/event category) can be remapped on import.

use crate::{Category, Event, Goal, Profile, WaypointError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format tag written into every snapshot.
pub const SNAPSHOT_FORMAT: &str = "waypoint-export";

/// Current snapshot version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Maximum rows (all kinds together) accepted by one import.
pub const MAX_IMPORT_ROWS: usize = 100_000;

/// One owner's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: String,
    pub version: u8,
    pub exported_at: DateTime<Utc>,
    pub goals: Vec<Goal>,
    pub events: Vec<Event>,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl Snapshot {
    #[must_use]
    pub fn new(
        exported_at: DateTime<Utc>,
        goals: Vec<Goal>,
        events: Vec<Event>,
        categories: Vec<Category>,
        profile: Option<Profile>,
    ) -> Self {
        Self {
            format: SNAPSHOT_FORMAT.to_string(),
            version: SNAPSHOT_VERSION,
            exported_at,
            goals,
            events,
            categories,
            profile,
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.goals
            .len()
            .saturating_add(self.events.len())
            .saturating_add(self.categories.len())
    }

    /// Check the header and size before anything is imported.
    pub fn validate(&self) -> Result<(), WaypointError> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(WaypointError::Serialization(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(WaypointError::Serialization(
                "Unsupported file version".to_string(),
            ));
        }
        if self.row_count() > MAX_IMPORT_ROWS {
            return Err(WaypointError::InvalidInput(format!(
                "snapshot holds {} rows, limit is {}",
                self.row_count(),
                MAX_IMPORT_ROWS
            )));
        }
        Ok(())
    }
}

/// What an import created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub goals: usize,
    pub events: usize,
    pub categories: usize,
    pub profile: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;

    #[test]
    fn validate_rejects_foreign_format() {
        let mut snapshot = Snapshot::new(at(0), vec![], vec![], vec![], None);
        assert!(snapshot.validate().is_ok());

        snapshot.format = "something-else".to_string();
        assert!(matches!(
            snapshot.validate(),
            Err(WaypointError::Serialization(_))
        ));
    }

    #[test]
    fn validate_rejects_future_version() {
        let mut snapshot = Snapshot::new(at(0), vec![], vec![], vec![], None);
        snapshot.version = SNAPSHOT_VERSION.saturating_add(1);
        assert!(snapshot.validate().is_err());
    }
}
