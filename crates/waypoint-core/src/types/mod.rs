//! # Core Type Definitions
//!
//! This module contains all row and value types for Waypoint:
//! - Row identifiers (`GoalId`, `EventId`, `CategoryId`, `OwnerId`)
//! - Goal hierarchy values (`Level`, `Progress`, `GoalStatus`)
//! - Rows (`Goal`, `Event`, `Category`, `Profile`)
//! - Error types (`WaypointError`, `HierarchyError`)
//!
//! ## Arithmetic Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (progress is stored in basis points)
//! - Implement `Ord` where they are used as `BTreeMap`/`BTreeSet` keys
//! - Use saturating arithmetic for counters to prevent overflow

mod category;
mod event;
mod goal;
mod profile;

pub use category::{Category, CategoryPatch, NewCategory};
pub use event::{Event, EventPatch, NewEvent};
pub use goal::{Goal, GoalPatch, GoalStatus, Level, NewGoal, Progress};
pub use profile::{
    NotificationPreferences, Preferences, PrivacyPreferences, Profile, ProfilePatch,
    ProfileStats, Theme, Visibility,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ROW IDENTIFIERS
// =============================================================================

/// Identifier of the account that owns a row.
///
/// Ownership is resolved by the identity layer in front of the store;
/// the store only compares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

/// Identifier of a goal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GoalId(pub u64);

/// Identifier of an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Identifier of a category row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u64);

/// The table a row lives in. Used for error reporting and scope checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Goal,
    Event,
    Category,
    Profile,
}

impl std::fmt::Display for RowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RowKind::Goal => "goal",
            RowKind::Event => "event",
            RowKind::Category => "category",
            RowKind::Profile => "profile",
        };
        f.write_str(name)
    }
}

// =============================================================================
// HEX COLORS
// =============================================================================

/// Check a `#RRGGBB` color string.
///
/// Equivalent to the pattern `^#[0-9A-Fa-f]{6}$`.
#[must_use]
pub fn is_hex_color(color: &str) -> bool {
    let bytes = color.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

/// Validate a color, returning `WaypointError::InvalidColor` on mismatch.
pub fn validate_color(color: &str) -> Result<(), WaypointError> {
    if is_hex_color(color) {
        Ok(())
    } else {
        Err(WaypointError::InvalidColor(color.to_string()))
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Violations of the 4-level goal hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// A goal without a parent must be level 1.
    #[error("Root goals must be level 1, got level {level}")]
    RootLevel { level: u8 },

    /// A child must sit exactly one level below its parent.
    #[error("A level {parent_level} parent requires level {} children, got level {level}", parent_level.saturating_add(1))]
    LevelMismatch { parent_level: u8, level: u8 },

    /// Level 4 goals are leaves.
    #[error("Level 4 goals cannot have children")]
    ParentIsLeaf,

    /// A goal referenced itself as parent.
    #[error("A goal cannot be its own parent")]
    SelfParent,

    /// The level is outside `1..=4`.
    #[error("Level {0} is outside 1..=4")]
    LevelOutOfRange(u8),
}

/// Errors that can occur in the Waypoint system.
///
/// - Constraint violations surface as user feedback
/// - Scope violations surface as access denied
/// - Storage failures are internal
#[derive(Debug, Error)]
pub enum WaypointError {
    /// A field failed validation (empty title, oversized text, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The goal hierarchy would be violated.
    #[error("Invalid hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),

    /// An end precedes its start.
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// A category name is already used by this owner.
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// A color is not a `#RRGGBB` hex string.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Progress outside 0..=10000 basis points.
    #[error("Progress {0} is outside 0..=10000 basis points")]
    ProgressOutOfRange(u32),

    /// The row does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: RowKind, id: u64 },

    /// The row exists but belongs to another owner.
    #[error("Access denied to {kind} {id}")]
    AccessDenied { kind: RowKind, id: u64 },

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A row could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File or network I/O failed outside the store.
    #[error("I/O error: {0}")]
    Io(String),
}

impl WaypointError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            WaypointError::InvalidInput(_) => "invalid_input",
            WaypointError::Hierarchy(_) => "invalid_hierarchy",
            WaypointError::InvalidDateRange(_) => "invalid_date_range",
            WaypointError::DuplicateName(_) => "duplicate_name",
            WaypointError::InvalidColor(_) => "invalid_color",
            WaypointError::ProgressOutOfRange(_) => "progress_out_of_range",
            WaypointError::NotFound { .. } => "not_found",
            WaypointError::AccessDenied { .. } => "access_denied",
            WaypointError::Storage(_) => "storage",
            WaypointError::Serialization(_) => "serialization",
            WaypointError::Io(_) => "io",
        }
    }

    /// True for errors the caller can fix by changing the submitted data.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            WaypointError::InvalidInput(_)
                | WaypointError::Hierarchy(_)
                | WaypointError::InvalidDateRange(_)
                | WaypointError::DuplicateName(_)
                | WaypointError::InvalidColor(_)
                | WaypointError::ProgressOutOfRange(_)
        )
    }

    pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
        WaypointError::Storage(e.to_string())
    }

    pub(crate) fn serialization(e: impl std::fmt::Display) -> Self {
        WaypointError::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
