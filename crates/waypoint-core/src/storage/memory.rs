//! In-memory tables.

use super::{Changeset, Owned, Store, Write, check_write, scoped};
use crate::{Category, CategoryId, Event, EventId, Goal, GoalId, OwnerId, Profile, WaypointError};
use std::collections::BTreeMap;

/// Volatile store backed by `BTreeMap` tables.
///
/// Commits validate every write's scope first and only then apply, so a
/// rejected changeset leaves the tables untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    goals: BTreeMap<GoalId, Goal>,
    events: BTreeMap<EventId, Event>,
    categories: BTreeMap<CategoryId, Category>,
    profiles: BTreeMap<OwnerId, Profile>,
    next_id: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_rows<K, T: Owned + Clone>(rows: &BTreeMap<K, T>, owner: OwnerId) -> Vec<T> {
        rows.values()
            .filter(|r| r.owner() == owner)
            .cloned()
            .collect()
    }

    fn check_existing<T: Owned>(owner: OwnerId, existing: Option<&T>) -> Result<(), WaypointError> {
        existing.map_or(Ok(()), |row| check_write(owner, row))
    }

    fn validate(&self, owner: OwnerId, changes: &Changeset) -> Result<(), WaypointError> {
        for write in changes.writes() {
            match write {
                Write::PutGoal(goal) => {
                    check_write(owner, goal)?;
                    Self::check_existing(owner, self.goals.get(&goal.id))?;
                }
                Write::DeleteGoal(id) => Self::check_existing(owner, self.goals.get(id))?,
                Write::PutEvent(event) => {
                    check_write(owner, event)?;
                    Self::check_existing(owner, self.events.get(&event.id))?;
                }
                Write::DeleteEvent(id) => Self::check_existing(owner, self.events.get(id))?,
                Write::PutCategory(category) => {
                    check_write(owner, category)?;
                    Self::check_existing(owner, self.categories.get(&category.id))?;
                }
                Write::DeleteCategory(id) => {
                    Self::check_existing(owner, self.categories.get(id))?;
                }
                Write::PutProfile(profile) => check_write(owner, profile)?,
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn allocate_id(&mut self) -> Result<u64, WaypointError> {
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| WaypointError::Storage("id space exhausted".to_string()))?;
        Ok(self.next_id)
    }

    fn goal(&self, owner: OwnerId, id: GoalId) -> Result<Option<Goal>, WaypointError> {
        scoped(owner, self.goals.get(&id).cloned())
    }

    fn goals(&self, owner: OwnerId) -> Result<Vec<Goal>, WaypointError> {
        Ok(Self::owned_rows(&self.goals, owner))
    }

    fn event(&self, owner: OwnerId, id: EventId) -> Result<Option<Event>, WaypointError> {
        scoped(owner, self.events.get(&id).cloned())
    }

    fn events(&self, owner: OwnerId) -> Result<Vec<Event>, WaypointError> {
        Ok(Self::owned_rows(&self.events, owner))
    }

    fn category(
        &self,
        owner: OwnerId,
        id: CategoryId,
    ) -> Result<Option<Category>, WaypointError> {
        scoped(owner, self.categories.get(&id).cloned())
    }

    fn categories(&self, owner: OwnerId) -> Result<Vec<Category>, WaypointError> {
        Ok(Self::owned_rows(&self.categories, owner))
    }

    fn profile(&self, owner: OwnerId) -> Result<Option<Profile>, WaypointError> {
        Ok(self.profiles.get(&owner).cloned())
    }

    fn commit(&mut self, owner: OwnerId, changes: &Changeset) -> Result<(), WaypointError> {
        self.validate(owner, changes)?;

        for write in changes.writes() {
            match write {
                Write::PutGoal(goal) => {
                    self.goals.insert(goal.id, goal.clone());
                }
                Write::DeleteGoal(id) => {
                    self.goals.remove(id);
                }
                Write::PutEvent(event) => {
                    self.events.insert(event.id, event.clone());
                }
                Write::DeleteEvent(id) => {
                    self.events.remove(id);
                }
                Write::PutCategory(category) => {
                    self.categories.insert(category.id, category.clone());
                }
                Write::DeleteCategory(id) => {
                    self.categories.remove(id);
                }
                Write::PutProfile(profile) => {
                    self.profiles.insert(profile.owner, profile.clone());
                }
            }
        }
        tracing::trace!(owner = owner.0, writes = changes.len(), "memory commit");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
