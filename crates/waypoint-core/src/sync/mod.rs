//! # Query Synchronization Rules
//!
//! Clients cache read results under a `QueryKey`. After a write, the keys
//! returned by `invalidations` must be dropped so the next read refetches.
//!
//! Each key also has a freshness window; a cached result older than its
//! window is treated as absent.
//!
//! The rules are a fixed table. They live here, next to the data model, so
//! the server and every client agree on them.

mod cache;

pub use cache::{CacheEntry, OptimisticSnapshot, QueryCache};

use crate::{CategoryId, EventId, GoalId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

// =============================================================================
// FRESHNESS WINDOWS
// =============================================================================

/// Dashboard aggregates go stale fastest.
pub const DASHBOARD_FRESHNESS: Duration = Duration::from_secs(30);

pub const GOALS_FRESHNESS: Duration = Duration::from_secs(2 * 60);

pub const EVENTS_FRESHNESS: Duration = Duration::from_secs(2 * 60);

pub const PROFILE_FRESHNESS: Duration = Duration::from_secs(10 * 60);

/// Categories rarely change.
pub const CATEGORIES_FRESHNESS: Duration = Duration::from_secs(30 * 60);

// =============================================================================
// QUERY KEYS
// =============================================================================

/// Entity family a query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Dashboard,
    Goals,
    Events,
    Profile,
    Categories,
}

impl EntityType {
    /// How long a cached result stays fresh.
    #[must_use]
    pub const fn freshness(self) -> Duration {
        match self {
            EntityType::Dashboard => DASHBOARD_FRESHNESS,
            EntityType::Goals => GOALS_FRESHNESS,
            EntityType::Events => EVENTS_FRESHNESS,
            EntityType::Profile => PROFILE_FRESHNESS,
            EntityType::Categories => CATEGORIES_FRESHNESS,
        }
    }
}

/// Identifies one cached read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKey {
    GoalList,
    GoalDetail(GoalId),
    GoalChildren(GoalId),
    GoalTree,
    GoalStats,
    EventList,
    EventDetail(EventId),
    CategoryList,
    CategoryDetail(CategoryId),
    Profile,
    Dashboard,
    DashboardToday,
    DashboardOverdue,
    DashboardMetrics,
}

impl QueryKey {
    /// Every dashboard aggregate.
    pub const DASHBOARD: [QueryKey; 4] = [
        QueryKey::Dashboard,
        QueryKey::DashboardToday,
        QueryKey::DashboardOverdue,
        QueryKey::DashboardMetrics,
    ];

    /// Goal list views (not tied to one goal).
    pub const GOAL_LISTS: [QueryKey; 3] = [QueryKey::GoalList, QueryKey::GoalTree, QueryKey::GoalStats];

    #[must_use]
    pub const fn entity(self) -> EntityType {
        match self {
            QueryKey::GoalList
            | QueryKey::GoalDetail(_)
            | QueryKey::GoalChildren(_)
            | QueryKey::GoalTree
            | QueryKey::GoalStats => EntityType::Goals,
            QueryKey::EventList | QueryKey::EventDetail(_) => EntityType::Events,
            QueryKey::CategoryList | QueryKey::CategoryDetail(_) => EntityType::Categories,
            QueryKey::Profile => EntityType::Profile,
            QueryKey::Dashboard
            | QueryKey::DashboardToday
            | QueryKey::DashboardOverdue
            | QueryKey::DashboardMetrics => EntityType::Dashboard,
        }
    }

    #[must_use]
    pub const fn freshness(self) -> Duration {
        self.entity().freshness()
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// A completed write, described by what it touched.
///
/// Goal variants carry the parent(s) known at the time of the write so the
/// parent's cached detail and children can be dropped too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    GoalCreated {
        id: GoalId,
        parent: Option<GoalId>,
    },
    GoalUpdated {
        id: GoalId,
        parent: Option<GoalId>,
        /// Set when the update moved the goal away from this parent.
        previous_parent: Option<GoalId>,
    },
    GoalDeleted {
        id: GoalId,
        parent: Option<GoalId>,
    },
    EventCreated(EventId),
    EventUpdated(EventId),
    EventDeleted(EventId),
    CategoryCreated(CategoryId),
    CategoryUpdated(CategoryId),
    CategoryDeleted(CategoryId),
    ProfileUpdated,
}

fn goal_keys(keys: &mut BTreeSet<QueryKey>, goal: GoalId, parents: [Option<GoalId>; 2]) {
    keys.insert(QueryKey::GoalDetail(goal));
    keys.insert(QueryKey::GoalChildren(goal));
    for parent in parents.into_iter().flatten() {
        keys.insert(QueryKey::GoalDetail(parent));
        keys.insert(QueryKey::GoalChildren(parent));
    }
    keys.extend(QueryKey::GOAL_LISTS);
    keys.extend(QueryKey::DASHBOARD);
}

/// The cached queries a mutation makes stale.
#[must_use]
pub fn invalidations(mutation: &Mutation) -> BTreeSet<QueryKey> {
    let mut keys = BTreeSet::new();
    match *mutation {
        Mutation::GoalCreated { id, parent } | Mutation::GoalDeleted { id, parent } => {
            goal_keys(&mut keys, id, [parent, None]);
        }
        Mutation::GoalUpdated {
            id,
            parent,
            previous_parent,
        } => goal_keys(&mut keys, id, [parent, previous_parent]),
        Mutation::EventCreated(id) | Mutation::EventUpdated(id) | Mutation::EventDeleted(id) => {
            keys.insert(QueryKey::EventDetail(id));
            keys.insert(QueryKey::EventList);
            keys.extend(QueryKey::DASHBOARD);
        }
        Mutation::CategoryCreated(id)
        | Mutation::CategoryUpdated(id)
        | Mutation::CategoryDeleted(id) => {
            keys.insert(QueryKey::CategoryList);
            keys.insert(QueryKey::CategoryDetail(id));
            // Goals and events embed category display data.
            keys.insert(QueryKey::EventList);
            keys.insert(QueryKey::GoalList);
            keys.insert(QueryKey::GoalTree);
        }
        Mutation::ProfileUpdated => {
            keys.insert(QueryKey::Profile);
        }
    }
    keys
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_update_reaches_parent_and_dashboard() {
        let keys = invalidations(&Mutation::GoalUpdated {
            id: GoalId(5),
            parent: Some(GoalId(2)),
            previous_parent: None,
        });
        for key in [
            QueryKey::GoalDetail(GoalId(5)),
            QueryKey::GoalChildren(GoalId(5)),
            QueryKey::GoalDetail(GoalId(2)),
            QueryKey::GoalChildren(GoalId(2)),
            QueryKey::GoalList,
            QueryKey::GoalTree,
            QueryKey::GoalStats,
            QueryKey::Dashboard,
            QueryKey::DashboardMetrics,
        ] {
            assert!(keys.contains(&key), "missing {key:?}");
        }
        assert!(!keys.contains(&QueryKey::EventList));
    }

    #[test]
    fn reparent_drops_both_parents() {
        let keys = invalidations(&Mutation::GoalUpdated {
            id: GoalId(5),
            parent: Some(GoalId(3)),
            previous_parent: Some(GoalId(2)),
        });
        assert!(keys.contains(&QueryKey::GoalChildren(GoalId(2))));
        assert!(keys.contains(&QueryKey::GoalChildren(GoalId(3))));
    }

    #[test]
    fn event_mutation_leaves_goals_alone() {
        let keys = invalidations(&Mutation::EventDeleted(EventId(9)));
        assert!(keys.contains(&QueryKey::EventDetail(EventId(9))));
        assert!(keys.contains(&QueryKey::EventList));
        assert!(keys.contains(&QueryKey::DashboardToday));
        assert!(keys.contains(&QueryKey::DashboardOverdue));
        assert!(!keys.contains(&QueryKey::GoalList));
    }

    #[test]
    fn category_mutation_cascades_to_lists() {
        let keys = invalidations(&Mutation::CategoryUpdated(CategoryId(4)));
        assert_eq!(
            keys,
            BTreeSet::from([
                QueryKey::GoalList,
                QueryKey::GoalTree,
                QueryKey::EventList,
                QueryKey::CategoryList,
                QueryKey::CategoryDetail(CategoryId(4)),
            ])
        );
    }

    #[test]
    fn profile_mutation_touches_only_profile() {
        assert_eq!(
            invalidations(&Mutation::ProfileUpdated),
            BTreeSet::from([QueryKey::Profile])
        );
    }

    #[test]
    fn freshness_windows_by_entity() {
        assert_eq!(QueryKey::DashboardToday.freshness(), Duration::from_secs(30));
        assert_eq!(QueryKey::GoalTree.freshness(), Duration::from_secs(120));
        assert_eq!(QueryKey::EventList.freshness(), Duration::from_secs(120));
        assert_eq!(QueryKey::Profile.freshness(), Duration::from_secs(600));
        assert_eq!(QueryKey::CategoryList.freshness(), Duration::from_secs(1800));
    }
}
