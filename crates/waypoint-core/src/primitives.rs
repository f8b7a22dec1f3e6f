//! # Fixed Rules
//!
//! Hardcoded constants for the Waypoint rules.
//!
//! These values are compiled into the binary and are immutable at runtime.
//!
//! ## Groups
//!
//! 1. **Hierarchy**: level bounds and progress scale.
//! 2. **Input limits**: maximum text sizes accepted at the store boundary.
//! 3. **Dashboard weights**: illustrative priority and urgency defaults.

// =============================================================================
// HIERARCHY
// =============================================================================

/// Deepest allowed goal level. Goals at this level are leaves.
pub const MAX_LEVEL: u8 = 4;

/// 100% expressed in basis points.
pub const PROGRESS_COMPLETE: u16 = 10_000;

/// Propagation stops once a parent's progress moves by less than this
/// many basis points (0.01%) and its status is unchanged.
pub const PROPAGATION_EPSILON_BP: u16 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for goal, event and category titles/names (characters).
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length for descriptions and bios (characters).
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

/// Maximum number of tags on one event.
pub const MAX_TAGS: usize = 32;

/// Maximum length of a single tag (characters).
pub const MAX_TAG_LENGTH: usize = 50;

// =============================================================================
// DASHBOARD WEIGHTS
// =============================================================================
//
// The priority formulas are illustrative defaults. They order the "today"
// list but carry no business meaning beyond that.

/// Goal priority: multiplier on `(5 - level)`.
pub const GOAL_LEVEL_WEIGHT: i64 = 10;

/// Goal priority: bonus for being due today.
pub const GOAL_DUE_TODAY_BONUS: i64 = 20;

/// Goal priority: progress divisor for the proximity bonus (10000 / 500 = 20 max).
pub const GOAL_PROXIMITY_DIVISOR: i64 = 500;

/// Event priority: base score.
pub const EVENT_BASE_SCORE: i64 = 15;

/// Event priority: starts within `EVENT_IMMINENT_MINUTES`.
pub const EVENT_IMMINENT_BONUS: i64 = 25;

/// Event priority: starts within `EVENT_SOON_MINUTES`.
pub const EVENT_SOON_BONUS: i64 = 10;

/// Event priority: currently running.
pub const EVENT_ONGOING_BONUS: i64 = 20;

/// Event priority: penalty for all-day events.
pub const EVENT_ALL_DAY_PENALTY: i64 = 10;

/// Window for the imminence bonus.
pub const EVENT_IMMINENT_MINUTES: i64 = 60;

/// Window for the "soon" bonus.
pub const EVENT_SOON_MINUTES: i64 = 180;

/// Days overdue at which an item becomes `medium` urgency.
pub const URGENCY_MEDIUM_DAYS: i64 = 1;

/// Days overdue at which an item becomes `high` urgency.
pub const URGENCY_HIGH_DAYS: i64 = 3;

/// Days overdue at which an item becomes `critical` urgency.
pub const URGENCY_CRITICAL_DAYS: i64 = 7;

/// Days in the rolling window used for the weekly average.
pub const WEEKLY_WINDOW_DAYS: i64 = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proximity_bonus_caps_at_twenty() {
        assert_eq!(i64::from(PROGRESS_COMPLETE) / GOAL_PROXIMITY_DIVISOR, 20);
    }

    #[test]
    fn urgency_thresholds_ascend() {
        assert!(URGENCY_MEDIUM_DAYS < URGENCY_HIGH_DAYS);
        assert!(URGENCY_HIGH_DAYS < URGENCY_CRITICAL_DAYS);
    }
}
