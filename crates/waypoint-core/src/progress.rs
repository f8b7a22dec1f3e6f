//! # Progress Propagation
//!
//! A parent's progress is the mean progress of its `active` and `completed`
//! children. When a child changes, the parent is recomputed, then its parent,
//! and so on until the root or until a recomputation changes nothing.
//!
//! Status follows the computed value:
//! - An `active` parent reaching 100% becomes `completed` (stamped once).
//! - A `completed` parent dropping below 100% reverts to `active`.
//! - `paused` and `cancelled` parents keep their status.
//!
//! The functions here are pure. The planner feeds them the owner's goals
//! and commits whatever they changed; the client feeds them its cached goals
//! to mirror the server optimistically.

use crate::primitives::PROPAGATION_EPSILON_BP;
use crate::{Goal, GoalId, GoalStatus, Level, Progress};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Mean progress of the children that count toward a parent.
///
/// Zero eligible children yields 0%.
#[must_use]
pub fn eligible_mean<'a, I>(children: I) -> Progress
where
    I: IntoIterator<Item = &'a Goal>,
{
    Progress::mean(
        children
            .into_iter()
            .filter(|c| c.status.counts_toward_parent())
            .map(|c| c.progress),
    )
}

/// Recompute `parent` from `children`, returning the updated row.
///
/// `updated_at` is only touched when progress or status actually changed.
#[must_use]
pub fn recompute<'a, I>(parent: &Goal, children: I, now: DateTime<Utc>) -> Goal
where
    I: IntoIterator<Item = &'a Goal>,
{
    let mean = eligible_mean(children);
    let mut next = parent.clone();
    next.progress = mean;

    match parent.status {
        GoalStatus::Active if mean.is_complete() => next.set_status(GoalStatus::Completed, now),
        GoalStatus::Completed if !mean.is_complete() => next.set_status(GoalStatus::Active, now),
        _ => {}
    }

    if next.progress != parent.progress || next.status != parent.status {
        next.updated_at = now;
    }
    next
}

/// Whether a recomputation is significant enough to keep climbing.
#[must_use]
pub fn is_significant(before: &Goal, after: &Goal) -> bool {
    before.progress.abs_diff(after.progress) >= PROPAGATION_EPSILON_BP
        || before.status != after.status
}

/// Propagate upward from `start` through `goals`, updating it in place.
///
/// `start` is the first parent to recompute (usually the parent of the goal
/// that changed). Returns the ids of the ancestors that changed, nearest first.
/// The walk is bounded by the number of goals, so a corrupted cycle cannot
/// loop forever.
pub fn propagate(
    goals: &mut BTreeMap<GoalId, Goal>,
    start: Option<GoalId>,
    now: DateTime<Utc>,
) -> Vec<GoalId> {
    let mut changed = Vec::new();
    let mut current = start;
    let mut budget = goals.len();

    while let Some(parent_id) = current {
        if budget == 0 {
            tracing::warn!(goal = parent_id.0, "propagation budget exhausted");
            break;
        }
        budget = budget.saturating_sub(1);

        let Some(parent) = goals.get(&parent_id) else {
            break;
        };
        let next = recompute(
            parent,
            goals.values().filter(|g| g.parent == Some(parent_id)),
            now,
        );
        if !is_significant(parent, &next) {
            break;
        }

        tracing::debug!(
            goal = parent_id.0,
            from = parent.progress.basis_points(),
            to = next.progress.basis_points(),
            status = next.status.as_str(),
            "propagated progress"
        );
        current = next.parent;
        goals.insert(parent_id, next);
        changed.push(parent_id);
    }
    changed
}

/// Recompute every parent in `goals`, deepest level first.
///
/// Used when a whole collection arrives at once (import) and stored parent
/// values cannot be trusted. Returns the ids whose row changed.
pub fn settle(goals: &mut BTreeMap<GoalId, Goal>, now: DateTime<Utc>) -> Vec<GoalId> {
    let mut parents: Vec<(Level, GoalId)> = goals
        .values()
        .filter_map(|g| g.parent)
        .filter_map(|p| goals.get(&p).map(|parent| (parent.level, p)))
        .collect();
    parents.sort_unstable();
    parents.dedup();

    let mut changed = Vec::new();
    for (_, parent_id) in parents.into_iter().rev() {
        let Some(parent) = goals.get(&parent_id) else {
            continue;
        };
        let next = recompute(
            parent,
            goals.values().filter(|g| g.parent == Some(parent_id)),
            now,
        );
        if next != *parent {
            goals.insert(parent_id, next);
            changed.push(parent_id);
        }
    }
    changed
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, goal};

    fn with_progress(mut g: Goal, percent: u32) -> Goal {
        g.progress = Progress::from_percent(percent).expect("percent");
        g
    }

    fn with_status(mut g: Goal, status: GoalStatus) -> Goal {
        g.status = status;
        g
    }

    fn map(goals: Vec<Goal>) -> BTreeMap<GoalId, Goal> {
        goals.into_iter().map(|g| (g.id, g)).collect()
    }

    #[test]
    fn parent_is_mean_of_children() {
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            with_progress(goal(2, Some(1), Level::Yearly), 100),
            with_progress(goal(3, Some(1), Level::Yearly), 50),
        ]);

        let changed = propagate(&mut goals, Some(GoalId(1)), at(10));

        assert_eq!(changed, vec![GoalId(1)]);
        assert_eq!(goals[&GoalId(1)].progress.percent(), 75);
        assert_eq!(goals[&GoalId(1)].status, GoalStatus::Active);
        assert_eq!(goals[&GoalId(1)].completed_at, None);
    }

    #[test]
    fn reaching_hundred_completes_parent() {
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            with_progress(goal(2, Some(1), Level::Yearly), 100),
            with_progress(goal(3, Some(1), Level::Yearly), 100),
        ]);

        propagate(&mut goals, Some(GoalId(1)), at(10));

        let parent = &goals[&GoalId(1)];
        assert!(parent.progress.is_complete());
        assert_eq!(parent.status, GoalStatus::Completed);
        assert_eq!(parent.completed_at, Some(at(10)));
    }

    #[test]
    fn near_complete_children_do_not_complete_parent() {
        let mut almost = goal(4, Some(1), Level::Yearly);
        almost.progress = Progress::new(9_999).expect("bp");
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            with_progress(goal(2, Some(1), Level::Yearly), 100),
            with_progress(goal(3, Some(1), Level::Yearly), 100),
            almost,
        ]);

        propagate(&mut goals, Some(GoalId(1)), at(10));

        let parent = &goals[&GoalId(1)];
        assert_eq!(parent.progress.basis_points(), 9_999);
        assert_eq!(parent.status, GoalStatus::Active);
        assert_eq!(parent.completed_at, None);
    }

    #[test]
    fn completion_stamp_is_not_renewed() {
        let mut parent = with_status(goal(1, None, Level::LongTerm), GoalStatus::Completed);
        parent.progress = Progress::COMPLETE;
        parent.completed_at = Some(at(1));
        let child = with_progress(goal(2, Some(1), Level::Yearly), 100);

        let next = recompute(&parent, [&child], at(20));
        assert_eq!(next.completed_at, Some(at(1)));
        assert_eq!(next.updated_at, parent.updated_at);
    }

    #[test]
    fn dropping_below_hundred_reopens_parent() {
        let mut parent = with_status(goal(1, None, Level::LongTerm), GoalStatus::Completed);
        parent.progress = Progress::COMPLETE;
        parent.completed_at = Some(at(1));
        let mut goals = map(vec![
            parent,
            with_progress(goal(2, Some(1), Level::Yearly), 100),
            with_progress(goal(3, Some(1), Level::Yearly), 40),
        ]);

        propagate(&mut goals, Some(GoalId(1)), at(5));

        let parent = &goals[&GoalId(1)];
        assert_eq!(parent.progress.percent(), 70);
        assert_eq!(parent.status, GoalStatus::Active);
        assert_eq!(parent.completed_at, None);
    }

    #[test]
    fn paused_and_cancelled_children_are_excluded() {
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            with_progress(goal(2, Some(1), Level::Yearly), 80),
            with_status(
                with_progress(goal(3, Some(1), Level::Yearly), 0),
                GoalStatus::Paused,
            ),
            with_status(
                with_progress(goal(4, Some(1), Level::Yearly), 10),
                GoalStatus::Cancelled,
            ),
        ]);

        propagate(&mut goals, Some(GoalId(1)), at(1));
        assert_eq!(goals[&GoalId(1)].progress.percent(), 80);
    }

    #[test]
    fn no_eligible_children_yields_zero() {
        let mut parent = goal(1, None, Level::LongTerm);
        parent.progress = Progress::from_percent(60).expect("percent");
        let paused = with_status(goal(2, Some(1), Level::Yearly), GoalStatus::Paused);

        let next = recompute(&parent, [&paused], at(1));
        assert_eq!(next.progress, Progress::ZERO);

        let alone = recompute(&parent, std::iter::empty(), at(1));
        assert_eq!(alone.progress, Progress::ZERO);
    }

    #[test]
    fn paused_parent_keeps_status_at_hundred() {
        let parent = with_status(goal(1, None, Level::LongTerm), GoalStatus::Paused);
        let child = with_progress(goal(2, Some(1), Level::Yearly), 100);

        let next = recompute(&parent, [&child], at(1));
        assert!(next.progress.is_complete());
        assert_eq!(next.status, GoalStatus::Paused);
    }

    #[test]
    fn propagation_climbs_to_root() {
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            goal(2, Some(1), Level::Yearly),
            goal(3, Some(2), Level::Monthly),
            with_progress(goal(4, Some(3), Level::Daily), 100),
        ]);

        let changed = propagate(&mut goals, Some(GoalId(3)), at(2));

        assert_eq!(changed, vec![GoalId(3), GoalId(2), GoalId(1)]);
        for id in [1, 2, 3] {
            assert_eq!(goals[&GoalId(id)].status, GoalStatus::Completed);
        }
    }

    #[test]
    fn propagation_stops_at_unchanged_ancestor() {
        // Goal 2 already sits at the value its children produce.
        let mut mid = goal(2, Some(1), Level::Yearly);
        mid.progress = Progress::from_percent(50).expect("percent");
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            mid,
            with_progress(goal(3, Some(2), Level::Monthly), 50),
        ]);

        let changed = propagate(&mut goals, Some(GoalId(2)), at(2));
        assert!(changed.is_empty());
        assert_eq!(goals[&GoalId(1)].progress, Progress::ZERO);
    }

    #[test]
    fn sub_epsilon_change_stops_propagation() {
        let mut parent = goal(1, None, Level::LongTerm);
        parent.progress = Progress::new(3_333).expect("bp");
        let mut goals = map(vec![
            parent,
            with_progress(goal(2, Some(1), Level::Yearly), 100),
            goal(3, Some(1), Level::Yearly),
            goal(4, Some(1), Level::Yearly),
        ]);

        let changed = propagate(&mut goals, Some(GoalId(1)), at(2));
        assert!(changed.is_empty());
    }

    #[test]
    fn settle_rebuilds_from_the_leaves() {
        // Stored parent values are stale; only the leaves are trusted.
        let mut stale = goal(2, Some(1), Level::Yearly);
        stale.progress = Progress::from_percent(10).expect("percent");
        let mut goals = map(vec![
            goal(1, None, Level::LongTerm),
            stale,
            with_progress(goal(3, Some(2), Level::Monthly), 100),
            with_progress(goal(4, Some(2), Level::Monthly), 100),
            with_progress(goal(5, Some(1), Level::Yearly), 50),
        ]);

        let changed = settle(&mut goals, at(3));

        assert_eq!(goals[&GoalId(2)].progress.percent(), 100);
        assert_eq!(goals[&GoalId(2)].status, GoalStatus::Completed);
        assert_eq!(goals[&GoalId(1)].progress.percent(), 75);
        assert_eq!(changed, vec![GoalId(2), GoalId(1)]);
    }
}
