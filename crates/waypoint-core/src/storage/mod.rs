//! # Owner-Scoped Storage
//!
//! The `Store` trait is the only way rows are read or written. Every call
//! carries the calling `OwnerId` and the store enforces row-level scope:
//! - Listing returns only the caller's rows.
//! - Reading a row owned by someone else is `AccessDenied`; a missing row is `Ok(None)`.
//! - A `Changeset` is committed atomically; if any write touches a foreign
//!   row, nothing is applied.
//!
//! ## Backends
//!
//! - `MemoryStore`: `BTreeMap` tables, volatile.
//! - `RedbStore`: redb tables, ACID and persistent.
//! - `Backend`: runtime choice between the two.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::{
    Category, CategoryId, Event, EventId, Goal, GoalId, OwnerId, Profile, RowKind, WaypointError,
};
use std::path::Path;

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Owner-scoped row storage.
pub trait Store {
    /// Allocate a fresh row id. Ids are unique across all tables.
    fn allocate_id(&mut self) -> Result<u64, WaypointError>;

    fn goal(&self, owner: OwnerId, id: GoalId) -> Result<Option<Goal>, WaypointError>;

    /// All of the owner's goals, ordered by id.
    fn goals(&self, owner: OwnerId) -> Result<Vec<Goal>, WaypointError>;

    fn event(&self, owner: OwnerId, id: EventId) -> Result<Option<Event>, WaypointError>;

    /// All of the owner's events, ordered by id.
    fn events(&self, owner: OwnerId) -> Result<Vec<Event>, WaypointError>;

    fn category(&self, owner: OwnerId, id: CategoryId)
    -> Result<Option<Category>, WaypointError>;

    /// All of the owner's categories, ordered by id.
    fn categories(&self, owner: OwnerId) -> Result<Vec<Category>, WaypointError>;

    fn profile(&self, owner: OwnerId) -> Result<Option<Profile>, WaypointError>;

    /// Apply every write in `changes` or none of them.
    fn commit(&mut self, owner: OwnerId, changes: &Changeset) -> Result<(), WaypointError>;
}

// =============================================================================
// CHANGESET
// =============================================================================

/// A single row write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    PutGoal(Goal),
    DeleteGoal(GoalId),
    PutEvent(Event),
    DeleteEvent(EventId),
    PutCategory(Category),
    DeleteCategory(CategoryId),
    PutProfile(Profile),
}

/// The batch of writes produced by one mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    writes: Vec<Write>,
}

impl Changeset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn put_goal(&mut self, goal: Goal) {
        self.push(Write::PutGoal(goal));
    }

    pub fn put_event(&mut self, event: Event) {
        self.push(Write::PutEvent(event));
    }

    pub fn put_category(&mut self, category: Category) {
        self.push(Write::PutCategory(category));
    }

    pub fn put_profile(&mut self, profile: Profile) {
        self.push(Write::PutProfile(profile));
    }

    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

// =============================================================================
// SCOPE CHECKS
// =============================================================================

/// Rows that carry an owner.
pub(crate) trait Owned {
    const KIND: RowKind;
    fn owner(&self) -> OwnerId;
    fn row_id(&self) -> u64;
}

impl Owned for Goal {
    const KIND: RowKind = RowKind::Goal;
    fn owner(&self) -> OwnerId {
        self.owner
    }
    fn row_id(&self) -> u64 {
        self.id.0
    }
}

impl Owned for Event {
    const KIND: RowKind = RowKind::Event;
    fn owner(&self) -> OwnerId {
        self.owner
    }
    fn row_id(&self) -> u64 {
        self.id.0
    }
}

impl Owned for Category {
    const KIND: RowKind = RowKind::Category;
    fn owner(&self) -> OwnerId {
        self.owner
    }
    fn row_id(&self) -> u64 {
        self.id.0
    }
}

impl Owned for Profile {
    const KIND: RowKind = RowKind::Profile;
    fn owner(&self) -> OwnerId {
        self.owner
    }
    fn row_id(&self) -> u64 {
        self.owner.0
    }
}

/// Hide nothing, deny foreign rows.
pub(crate) fn scoped<T: Owned>(owner: OwnerId, row: Option<T>) -> Result<Option<T>, WaypointError> {
    match row {
        Some(r) if r.owner() != owner => {
            tracing::warn!(
                event = "scope_denied",
                kind = %T::KIND,
                id = r.row_id(),
                "row-level scope denied read"
            );
            Err(WaypointError::AccessDenied {
                kind: T::KIND,
                id: r.row_id(),
            })
        }
        other => Ok(other),
    }
}

/// A row being written must belong to the caller.
pub(crate) fn check_write<T: Owned>(owner: OwnerId, row: &T) -> Result<(), WaypointError> {
    if row.owner() == owner {
        Ok(())
    } else {
        tracing::warn!(
            event = "scope_denied",
            kind = %T::KIND,
            id = row.row_id(),
            "row-level scope denied write"
        );
        Err(WaypointError::AccessDenied {
            kind: T::KIND,
            id: row.row_id(),
        })
    }
}

// =============================================================================
// RUNTIME BACKEND
// =============================================================================

/// Storage backend chosen at runtime.
#[derive(Debug)]
pub enum Backend {
    /// In-memory tables (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed tables using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for Backend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl Backend {
    /// Open a redb-backed store at `path`, creating it if needed.
    pub fn redb(path: impl AsRef<Path>) -> Result<Self, WaypointError> {
        Ok(Self::Persistent(RedbStore::open(path)?))
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "memory",
            Self::Persistent(_) => "redb",
        }
    }
}

impl Store for Backend {
    fn allocate_id(&mut self) -> Result<u64, WaypointError> {
        match self {
            Self::InMemory(s) => s.allocate_id(),
            Self::Persistent(s) => s.allocate_id(),
        }
    }

    fn goal(&self, owner: OwnerId, id: GoalId) -> Result<Option<Goal>, WaypointError> {
        match self {
            Self::InMemory(s) => s.goal(owner, id),
            Self::Persistent(s) => s.goal(owner, id),
        }
    }

    fn goals(&self, owner: OwnerId) -> Result<Vec<Goal>, WaypointError> {
        match self {
            Self::InMemory(s) => s.goals(owner),
            Self::Persistent(s) => s.goals(owner),
        }
    }

    fn event(&self, owner: OwnerId, id: EventId) -> Result<Option<Event>, WaypointError> {
        match self {
            Self::InMemory(s) => s.event(owner, id),
            Self::Persistent(s) => s.event(owner, id),
        }
    }

    fn events(&self, owner: OwnerId) -> Result<Vec<Event>, WaypointError> {
        match self {
            Self::InMemory(s) => s.events(owner),
            Self::Persistent(s) => s.events(owner),
        }
    }

    fn category(
        &self,
        owner: OwnerId,
        id: CategoryId,
    ) -> Result<Option<Category>, WaypointError> {
        match self {
            Self::InMemory(s) => s.category(owner, id),
            Self::Persistent(s) => s.category(owner, id),
        }
    }

    fn categories(&self, owner: OwnerId) -> Result<Vec<Category>, WaypointError> {
        match self {
            Self::InMemory(s) => s.categories(owner),
            Self::Persistent(s) => s.categories(owner),
        }
    }

    fn profile(&self, owner: OwnerId) -> Result<Option<Profile>, WaypointError> {
        match self {
            Self::InMemory(s) => s.profile(owner),
            Self::Persistent(s) => s.profile(owner),
        }
    }

    fn commit(&mut self, owner: OwnerId, changes: &Changeset) -> Result<(), WaypointError> {
        match self {
            Self::InMemory(s) => s.commit(owner, changes),
            Self::Persistent(s) => s.commit(owner, changes),
        }
    }
}
