//! # Profile Stats Refresh
//!
//! The profile carries a denormalized snapshot of the owner's totals and
//! streaks. The planner refreshes it inside every goal and event commit, so
//! it is never stale relative to the rows it summarizes.

use crate::dashboard::{activity_days, current_streak, longest_streak};
use crate::{Event, Goal, GoalStatus, ProfileStats};
use chrono::{DateTime, Utc};

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Recompute the snapshot from the post-mutation collections.
///
/// `longest_streak_days` is a high-water mark: it never drops below the
/// previous snapshot, even if the rows that produced it were deleted.
#[must_use]
pub fn refresh(
    previous: &ProfileStats,
    goals: &[Goal],
    events: &[Event],
    now: DateTime<Utc>,
) -> ProfileStats {
    let days = activity_days(goals, events);
    let current = current_streak(&days, now.date_naive());
    let longest = longest_streak(&days)
        .max(current)
        .max(previous.longest_streak_days);

    ProfileStats {
        total_goals: count(goals.len()),
        completed_goals: count(
            goals
                .iter()
                .filter(|g| g.status == GoalStatus::Completed)
                .count(),
        ),
        active_goals: count(
            goals
                .iter()
                .filter(|g| g.status == GoalStatus::Active)
                .count(),
        ),
        total_events: count(events.len()),
        current_streak_days: current,
        longest_streak_days: longest,
        refreshed_at: Some(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;
    use crate::test_support::{at, event, goal};

    #[test]
    fn refresh_counts_rows() {
        let mut done = goal(2, Some(1), Level::Yearly);
        done.status = GoalStatus::Completed;
        let mut paused = goal(3, Some(1), Level::Yearly);
        paused.status = GoalStatus::Paused;
        let goals = vec![goal(1, None, Level::LongTerm), done, paused];
        let events = vec![event(9, at(0), at(30))];

        let stats = refresh(&ProfileStats::default(), &goals, &events, at(60));

        assert_eq!(stats.total_goals, 3);
        assert_eq!(stats.completed_goals, 1);
        assert_eq!(stats.active_goals, 1);
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.current_streak_days, 1);
        assert_eq!(stats.refreshed_at, Some(at(60)));
    }

    #[test]
    fn longest_streak_never_decreases() {
        let previous = ProfileStats {
            longest_streak_days: 12,
            ..ProfileStats::default()
        };
        let stats = refresh(&previous, &[], &[], at(0));
        assert_eq!(stats.longest_streak_days, 12);
        assert_eq!(stats.current_streak_days, 0);
    }
}
