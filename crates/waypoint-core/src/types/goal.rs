//! Goal rows and the values that make up the hierarchy.

use super::{CategoryId, GoalId, HierarchyError, OwnerId, WaypointError};
use crate::primitives::{MAX_LEVEL, PROGRESS_COMPLETE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// LEVEL
// =============================================================================

/// Depth tier of a goal in the 4-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    /// Level 1: long-term goals. The only level allowed at the root.
    LongTerm = 1,
    /// Level 2: yearly / quarterly goals.
    Yearly = 2,
    /// Level 3: monthly goals.
    Monthly = 3,
    /// Level 4: daily / weekly tasks. Leaves of the hierarchy.
    Daily = 4,
}

impl Level {
    /// All levels, top to bottom.
    pub const ALL: [Level; 4] = [Level::LongTerm, Level::Yearly, Level::Monthly, Level::Daily];

    /// Build a level from its numeric value.
    pub fn new(value: u8) -> Result<Self, HierarchyError> {
        match value {
            1 => Ok(Level::LongTerm),
            2 => Ok(Level::Yearly),
            3 => Ok(Level::Monthly),
            4 => Ok(Level::Daily),
            other => Err(HierarchyError::LevelOutOfRange(other)),
        }
    }

    /// Numeric value, 1..=4.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// The level required for children of this level, `None` for leaves.
    #[must_use]
    pub fn child(self) -> Option<Level> {
        if self.value() >= MAX_LEVEL {
            None
        } else {
            Level::new(self.value().saturating_add(1)).ok()
        }
    }

    /// Level 4 goals cannot have children.
    #[must_use]
    pub fn is_leaf(self) -> bool {
        self.child().is_none()
    }

    /// Human-readable tier name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Level::LongTerm => "Long-term",
            Level::Yearly => "Yearly",
            Level::Monthly => "Monthly",
            Level::Daily => "Daily",
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = HierarchyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::new(value)
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.value()
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Percentage completion stored in basis points (10000 = 100%).
///
/// Fixed point keeps propagation free of floating-point drift; the
/// smallest representable step (0.01%) is also the propagation epsilon.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Progress(u16);

impl Progress {
    /// 0%.
    pub const ZERO: Progress = Progress(0);
    /// 100%.
    pub const COMPLETE: Progress = Progress(PROGRESS_COMPLETE);

    /// Build from basis points, rejecting values above 10000.
    pub fn new(basis_points: u32) -> Result<Self, WaypointError> {
        u16::try_from(basis_points)
            .ok()
            .filter(|bp| *bp <= PROGRESS_COMPLETE)
            .map(Progress)
            .ok_or(WaypointError::ProgressOutOfRange(basis_points))
    }

    /// Build from a whole percentage.
    pub fn from_percent(percent: u32) -> Result<Self, WaypointError> {
        Self::new(percent.saturating_mul(100))
    }

    /// Raw basis points.
    #[must_use]
    pub const fn basis_points(self) -> u16 {
        self.0
    }

    /// Whole percent, truncated.
    #[must_use]
    pub const fn percent(self) -> u16 {
        self.0 / 100
    }

    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.0 == PROGRESS_COMPLETE
    }

    /// Absolute difference in basis points.
    #[must_use]
    pub const fn abs_diff(self, other: Progress) -> u16 {
        self.0.abs_diff(other.0)
    }

    /// Arithmetic mean rounded half-up to the nearest basis point.
    ///
    /// Only an exact mean of 100% yields `Progress::COMPLETE`; anything below
    /// stops at 9999 bp. An empty input yields `Progress::ZERO`.
    #[must_use]
    pub fn mean<I: IntoIterator<Item = Progress>>(values: I) -> Progress {
        let (sum, count) = values
            .into_iter()
            .fold((0u64, 0u64), |(sum, count), p| {
                (sum.saturating_add(u64::from(p.0)), count.saturating_add(1))
            });
        if count == 0 {
            return Progress::ZERO;
        }
        let complete = u64::from(PROGRESS_COMPLETE);
        if sum >= count.saturating_mul(complete) {
            return Progress::COMPLETE;
        }
        let rounded = (sum.saturating_add(count / 2) / count).min(complete.saturating_sub(1));
        Progress(u16::try_from(rounded).unwrap_or(PROGRESS_COMPLETE - 1))
    }
}

impl TryFrom<u32> for Progress {
    type Error = WaypointError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Progress::new(value)
    }
}

impl From<Progress> for u32 {
    fn from(progress: Progress) -> Self {
        u32::from(progress.0)
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle state of a goal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Paused,
    Cancelled,
}

impl GoalStatus {
    /// Whether a child in this status takes part in its parent's average.
    #[must_use]
    pub const fn counts_toward_parent(self) -> bool {
        matches!(self, GoalStatus::Active | GoalStatus::Completed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Paused => "paused",
            GoalStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = WaypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(GoalStatus::Active),
            "completed" => Ok(GoalStatus::Completed),
            "paused" => Ok(GoalStatus::Paused),
            "cancelled" => Ok(GoalStatus::Cancelled),
            other => Err(WaypointError::InvalidInput(format!(
                "unknown goal status '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// GOAL
// =============================================================================

/// A goal row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub owner: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub parent: Option<GoalId>,
    pub level: Level,
    #[serde(rename = "progress_bp")]
    pub progress: Progress,
    pub status: GoalStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub category: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Move to `status`, keeping `completed_at` consistent with it.
    ///
    /// Entering `Completed` stamps the time once; leaving it clears the stamp.
    pub fn set_status(&mut self, status: GoalStatus, now: DateTime<Utc>) {
        if status == GoalStatus::Completed {
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }
        self.status = status;
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Input for creating a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGoal {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<GoalId>,
    pub level: Level,
    #[serde(default, rename = "progress_bp")]
    pub progress: Progress,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<CategoryId>,
}

impl NewGoal {
    /// A root-level (level 1) goal with defaults for everything else.
    #[must_use]
    pub fn root(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            parent: None,
            level: Level::LongTerm,
            progress: Progress::ZERO,
            status: GoalStatus::Active,
            start_date: None,
            due_date: None,
            category: None,
        }
    }

    /// A child goal one level below `parent_level`.
    pub fn child_of(
        title: impl Into<String>,
        parent: GoalId,
        parent_level: Level,
    ) -> Result<Self, HierarchyError> {
        let level = parent_level.child().ok_or(HierarchyError::ParentIsLeaf)?;
        Ok(Self {
            parent: Some(parent),
            level,
            ..Self::root(title)
        })
    }
}

/// Partial update of a goal. Absent fields are left unchanged; an explicit
/// `null` on a nullable field clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<Option<GoalId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(
        default,
        rename = "progress_bp",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GoalStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Option<CategoryId>>,
}

impl GoalPatch {
    /// True when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == GoalPatch::default()
    }

    /// Whether applying the patch can change the parent's computed progress.
    #[must_use]
    pub fn affects_parent(&self) -> bool {
        self.progress.is_some() || self.status.is_some() || self.parent.is_some()
    }
}

/// Deserialize a present field (including `null`) as `Some(..)`.
///
/// Paired with `#[serde(default)]` so an absent field stays `None`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(value: u32) -> Progress {
        Progress::new(value).expect("valid progress")
    }

    #[test]
    fn level_children_stop_at_four() {
        assert_eq!(Level::LongTerm.child(), Some(Level::Yearly));
        assert_eq!(Level::Monthly.child(), Some(Level::Daily));
        assert_eq!(Level::Daily.child(), None);
        assert!(Level::Daily.is_leaf());
    }

    #[test]
    fn level_rejects_out_of_range() {
        assert_eq!(Level::new(0), Err(HierarchyError::LevelOutOfRange(0)));
        assert_eq!(Level::new(5), Err(HierarchyError::LevelOutOfRange(5)));
    }

    #[test]
    fn progress_rejects_above_complete() {
        assert!(Progress::new(10_000).is_ok());
        assert!(matches!(
            Progress::new(10_001),
            Err(WaypointError::ProgressOutOfRange(10_001))
        ));
        assert!(matches!(
            Progress::new(70_000),
            Err(WaypointError::ProgressOutOfRange(70_000))
        ));
    }

    #[test]
    fn progress_mean_rounds_half_up() {
        assert_eq!(Progress::mean([bp(10_000), bp(5_000)]), bp(7_500));
        // (0 + 0 + 10000) / 3 = 3333.33 -> 3333
        assert_eq!(Progress::mean([bp(0), bp(0), bp(10_000)]), bp(3_333));
        // (1 + 2) / 2 = 1.5 -> 2
        assert_eq!(Progress::mean([bp(1), bp(2)]), bp(2));
    }

    #[test]
    fn progress_mean_below_hundred_never_rounds_to_complete() {
        // 29999 / 3 = 9999.67 would round to 10000.
        assert_eq!(
            Progress::mean([bp(10_000), bp(10_000), bp(9_999)]),
            bp(9_999)
        );
        assert!(!Progress::mean([bp(10_000), bp(9_999)]).is_complete());
        assert_eq!(
            Progress::mean([bp(10_000), bp(10_000)]),
            Progress::COMPLETE
        );
    }

    #[test]
    fn progress_mean_of_nothing_is_zero() {
        assert_eq!(Progress::mean(std::iter::empty()), Progress::ZERO);
    }

    #[test]
    fn progress_display() {
        assert_eq!(bp(7_550).to_string(), "75.50%");
        assert_eq!(Progress::COMPLETE.to_string(), "100.00%");
    }

    #[test]
    fn only_active_and_completed_count() {
        assert!(GoalStatus::Active.counts_toward_parent());
        assert!(GoalStatus::Completed.counts_toward_parent());
        assert!(!GoalStatus::Paused.counts_toward_parent());
        assert!(!GoalStatus::Cancelled.counts_toward_parent());
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let patch: GoalPatch = serde_json::from_str(r#"{"description": null}"#).expect("parse");
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.category, None);

        let empty: GoalPatch = serde_json::from_str("{}").expect("parse");
        assert!(empty.is_empty());
    }

    #[test]
    fn child_of_leaf_is_rejected() {
        let err = NewGoal::child_of("x", GoalId(1), Level::Daily);
        assert_eq!(err, Err(HierarchyError::ParentIsLeaf));
    }
}
