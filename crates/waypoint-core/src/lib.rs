//! # waypoint-core
//!
//! The goal and calendar engine for Waypoint - THE LOGIC.
//!
//! This crate owns every rule that decides what the data looks like:
//! - the 4-level goal hierarchy and its placement checks (`hierarchy`)
//! - bottom-up progress propagation with status transitions (`progress`)
//! - dashboard aggregation: level stats, today, overdue, metrics (`dashboard`)
//! - the profile stats snapshot (`stats`)
//! - owner-scoped storage with atomic changesets (`storage`)
//! - the `Planner`, which turns one mutation into one validated changeset
//! - cache keys, invalidation and freshness for clients (`sync`)
//!
//! ## Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Integer arithmetic only: progress is fixed-point basis points
//! - `now` is always passed in; nothing reads the clock implicitly

// =============================================================================
// MODULES
// =============================================================================

pub mod dashboard;
pub mod export;
pub mod hierarchy;
pub mod planner;
pub mod primitives;
pub mod progress;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    Category, CategoryId, CategoryPatch, Event, EventId, EventPatch, Goal, GoalId, GoalPatch,
    GoalStatus, HierarchyError, Level, NewCategory, NewEvent, NewGoal, NotificationPreferences,
    OwnerId, Preferences, PrivacyPreferences, Profile, ProfilePatch, ProfileStats, Progress,
    RowKind, Theme, Visibility, WaypointError, is_hex_color, validate_color,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use dashboard::{
    Dashboard, GoalStatistics, ItemKind, LevelStats, OverdueItem, ProductivityMetrics, TodayItem,
    Urgency,
};
pub use export::{ImportReport, SNAPSHOT_FORMAT, SNAPSHOT_VERSION, Snapshot};
pub use planner::{EventFilter, GoalFilter, GoalNode, Planner};
pub use storage::{Backend, Changeset, MemoryStore, RedbStore, Store, Write};
pub use sync::{Mutation, OptimisticSnapshot, QueryCache, QueryKey, invalidations};

// =============================================================================
// TEST SUPPORT
// =============================================================================
