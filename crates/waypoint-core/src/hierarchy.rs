//! # Hierarchy Rules
//!
//! Placement checks and tree walks for the 4-level goal hierarchy.
//!
//! The same checks run in two places: the planner runs them before every
//! commit (authoritative), and the client runs them before submitting
//! (advisory only, never trusted by the server).

use crate::{Goal, GoalId, HierarchyError, Level};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Check that a goal at `level` may sit under `parent`.
///
/// - No parent: the level must be 1.
/// - With a parent: the parent must not be a leaf, and the level must be
///   exactly one below it.
pub fn validate_placement(level: Level, parent: Option<&Goal>) -> Result<(), HierarchyError> {
    match parent {
        None => {
            if level == Level::LongTerm {
                Ok(())
            } else {
                Err(HierarchyError::RootLevel {
                    level: level.value(),
                })
            }
        }
        Some(parent) => {
            let expected = parent.level.child().ok_or(HierarchyError::ParentIsLeaf)?;
            if expected == level {
                Ok(())
            } else {
                Err(HierarchyError::LevelMismatch {
                    parent_level: parent.level.value(),
                    level: level.value(),
                })
            }
        }
    }
}

/// Placement check for an existing goal being moved or re-levelled.
///
/// Adds the self-reference check and verifies that the goal's current
/// children still fit under its new level.
pub fn validate_move(
    goal: GoalId,
    level: Level,
    new_parent: Option<&Goal>,
    children: &[Goal],
) -> Result<(), HierarchyError> {
    if new_parent.is_some_and(|p| p.id == goal) {
        return Err(HierarchyError::SelfParent);
    }
    validate_placement(level, new_parent)?;

    if children.is_empty() {
        return Ok(());
    }
    let expected = level.child().ok_or(HierarchyError::ParentIsLeaf)?;
    match children.iter().find(|c| c.level != expected) {
        Some(misfit) => Err(HierarchyError::LevelMismatch {
            parent_level: level.value(),
            level: misfit.level.value(),
        }),
        None => Ok(()),
    }
}

/// Audit a whole collection, returning every goal that breaks the hierarchy.
///
/// Goals whose parent is missing from the collection are reported as roots
/// with the wrong level only if they are not level 1.
pub fn audit(goals: &[Goal]) -> Vec<(GoalId, HierarchyError)> {
    let by_id: BTreeMap<GoalId, &Goal> = goals.iter().map(|g| (g.id, g)).collect();
    let mut violations = Vec::new();

    for goal in goals {
        if goal.parent == Some(goal.id) {
            violations.push((goal.id, HierarchyError::SelfParent));
            continue;
        }
        let parent = goal.parent.and_then(|p| by_id.get(&p).copied());
        if let Err(e) = validate_placement(goal.level, parent) {
            violations.push((goal.id, e));
        }
    }
    violations
}

/// Direct children of `parent`, ordered by creation time then id.
#[must_use]
pub fn children_of(goals: &[Goal], parent: GoalId) -> Vec<Goal> {
    let mut children: Vec<Goal> = goals
        .iter()
        .filter(|g| g.parent == Some(parent))
        .cloned()
        .collect();
    children.sort_by_key(|g| (g.created_at, g.id));
    children
}

/// All descendants of `root` (excluding `root`), breadth-first.
#[must_use]
pub fn descendants(goals: &[Goal], root: GoalId) -> Vec<GoalId> {
    let mut by_parent: BTreeMap<GoalId, Vec<GoalId>> = BTreeMap::new();
    for goal in goals {
        if let Some(parent) = goal.parent {
            by_parent.entry(parent).or_default().push(goal.id);
        }
    }

    let mut seen = BTreeSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut out = Vec::new();
    while let Some(current) = queue.pop_front() {
        for child in by_parent.get(&current).into_iter().flatten() {
            if seen.insert(*child) {
                out.push(*child);
                queue.push_back(*child);
            }
        }
    }
    out
}

/// Ancestors of `goal` from the root down, ending with `goal` itself.
///
/// Returns an empty path when `goal` is not in the collection. The walk is
/// bounded by the level count, so a corrupted cycle cannot loop forever.
#[must_use]
pub fn path_to(goals: &[Goal], goal: GoalId) -> Vec<Goal> {
    let by_id: BTreeMap<GoalId, &Goal> = goals.iter().map(|g| (g.id, g)).collect();
    let mut path = Vec::new();
    let mut current = by_id.get(&goal).copied();
    while let Some(g) = current {
        if path.len() >= Level::ALL.len() {
            break;
        }
        path.push(g.clone());
        current = g.parent.and_then(|p| by_id.get(&p).copied());
    }
    path.reverse();
    path
}

// =============================================================================
// TESTS
// =============================================================================
