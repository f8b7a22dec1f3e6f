//! # Dashboard Aggregation
//!
//! Read-only views derived from one owner's goals and events:
//! - per-level completion counts and rates
//! - the "today" list (due-today level-4 goals and today's events), ranked
//! - the "overdue" list, bucketed by days overdue
//! - productivity metrics (completion rate, streaks, weekly average)
//!
//! Everything is recomputed from the full collections on each call; the data
//! set is small and owner-scoped. "Today" is the UTC calendar date of `now`.
//!
//! The priority weights live in `primitives` and are illustrative defaults.

use crate::primitives::{
    EVENT_ALL_DAY_PENALTY, EVENT_BASE_SCORE, EVENT_IMMINENT_BONUS, EVENT_IMMINENT_MINUTES,
    EVENT_ONGOING_BONUS, EVENT_SOON_BONUS, EVENT_SOON_MINUTES, GOAL_DUE_TODAY_BONUS,
    GOAL_LEVEL_WEIGHT, GOAL_PROXIMITY_DIVISOR, URGENCY_CRITICAL_DAYS, URGENCY_HIGH_DAYS,
    URGENCY_MEDIUM_DAYS, WEEKLY_WINDOW_DAYS,
};
use crate::{Event, Goal, GoalStatus, Level, Progress};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// RATES
// =============================================================================

/// `part / whole` in basis points (10000 = 100%), 0 when `whole` is 0.
#[must_use]
pub fn rate_bp(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let scaled = u64::from(part).saturating_mul(10_000) / u64::from(whole);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// =============================================================================
// LEVEL STATISTICS
// =============================================================================

/// Completion figures for one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStats {
    pub level: Level,
    pub name: String,
    pub total: u32,
    pub completed: u32,
    pub completion_rate_bp: u32,
}

/// Completion figures per level plus the overall totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatistics {
    pub levels: Vec<LevelStats>,
    pub total: u32,
    pub completed: u32,
    pub completion_rate_bp: u32,
}

/// Completion counts and rates per level.
#[must_use]
pub fn goal_statistics(goals: &[Goal]) -> GoalStatistics {
    let levels: Vec<LevelStats> = Level::ALL
        .iter()
        .map(|&level| {
            let at_level = goals.iter().filter(|g| g.level == level);
            let total = count(at_level.clone().count());
            let completed = count(
                at_level
                    .filter(|g| g.status == GoalStatus::Completed)
                    .count(),
            );
            LevelStats {
                level,
                name: level.name().to_string(),
                total,
                completed,
                completion_rate_bp: rate_bp(completed, total),
            }
        })
        .collect();

    let total = levels.iter().fold(0u32, |acc, l| acc.saturating_add(l.total));
    let completed = levels
        .iter()
        .fold(0u32, |acc, l| acc.saturating_add(l.completed));

    GoalStatistics {
        levels,
        total,
        completed,
        completion_rate_bp: rate_bp(completed, total),
    }
}

// =============================================================================
// TODAY LIST
// =============================================================================

/// Which collection a dashboard item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Goal,
    Event,
}

/// An entry in the "today" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayItem {
    pub kind: ItemKind,
    pub id: u64,
    pub title: String,
    /// Due time for goals, start time for events.
    pub at: DateTime<Utc>,
    pub all_day: bool,
    pub level: Option<Level>,
    pub progress_bp: Option<Progress>,
    pub score: i64,
}

/// Priority of a goal on `today`: higher levels weigh more, being due today
/// adds a bonus, and goals close to done get a proximity bonus.
#[must_use]
pub fn goal_priority(goal: &Goal, today: NaiveDate) -> i64 {
    let level_weight = (5 - i64::from(goal.level.value())) * GOAL_LEVEL_WEIGHT;
    let due_bonus = if goal.due_date.is_some_and(|d| d.date_naive() == today) {
        GOAL_DUE_TODAY_BONUS
    } else {
        0
    };
    let proximity = i64::from(goal.progress.basis_points()) / GOAL_PROXIMITY_DIVISOR;
    level_weight + due_bonus + proximity
}

/// Priority of an event at `now`: imminent and running events rank higher,
/// all-day events lower.
#[must_use]
pub fn event_priority(event: &Event, now: DateTime<Utc>) -> i64 {
    let mut score = EVENT_BASE_SCORE;
    let minutes_until = (event.start - now).num_minutes();
    if event.start > now {
        if minutes_until <= EVENT_IMMINENT_MINUTES {
            score += EVENT_IMMINENT_BONUS;
        } else if minutes_until <= EVENT_SOON_MINUTES {
            score += EVENT_SOON_BONUS;
        }
    }
    if event.is_ongoing(now) {
        score += EVENT_ONGOING_BONUS;
    }
    if event.all_day {
        score -= EVENT_ALL_DAY_PENALTY;
    }
    score
}

/// Level-4 goals due today that are still open, merged with events that
/// touch today, ranked by score (desc), then time, then title.
#[must_use]
pub fn today(goals: &[Goal], events: &[Event], now: DateTime<Utc>) -> Vec<TodayItem> {
    let day = now.date_naive();

    let goal_items = goals
        .iter()
        .filter(|g| g.level == Level::Daily)
        .filter(|g| !matches!(g.status, GoalStatus::Completed | GoalStatus::Cancelled))
        .filter_map(|g| {
            let due = g.due_date.filter(|d| d.date_naive() == day)?;
            Some(TodayItem {
                kind: ItemKind::Goal,
                id: g.id.0,
                title: g.title.clone(),
                at: due,
                all_day: false,
                level: Some(g.level),
                progress_bp: Some(g.progress),
                score: goal_priority(g, day),
            })
        });

    let event_items = events
        .iter()
        .filter(|e| e.overlaps_day(day))
        .map(|e| TodayItem {
            kind: ItemKind::Event,
            id: e.id.0,
            title: e.title.clone(),
            at: e.start,
            all_day: e.all_day,
            level: None,
            progress_bp: None,
            score: event_priority(e, now),
        });

    let mut items: Vec<TodayItem> = goal_items.chain(event_items).collect();
    items.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.at.cmp(&b.at))
            .then_with(|| a.title.cmp(&b.title))
    });
    items
}

// =============================================================================
// OVERDUE LIST
// =============================================================================

/// Coarse classification of an overdue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Bucket by whole days overdue: 0 low, 1-2 medium, 3-6 high, 7+ critical.
    #[must_use]
    pub fn from_days_overdue(days: i64) -> Urgency {
        if days >= URGENCY_CRITICAL_DAYS {
            Urgency::Critical
        } else if days >= URGENCY_HIGH_DAYS {
            Urgency::High
        } else if days >= URGENCY_MEDIUM_DAYS {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

/// An entry in the "overdue" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueItem {
    pub kind: ItemKind,
    pub id: u64,
    pub title: String,
    /// Due time for goals, end time for events.
    pub due: DateTime<Utc>,
    pub days_overdue: i64,
    pub urgency: Urgency,
}

fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// Goals past due and not completed, plus events that have ended.
///
/// Unlike [`today`], cancelled goals stay in: only completion clears a
/// missed due date. Items less than one calendar day overdue are left out. Ranked by urgency
/// (desc), then days overdue (desc), then title; truncated to `limit`.
#[must_use]
pub fn overdue(
    goals: &[Goal],
    events: &[Event],
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Vec<OverdueItem> {
    let day = now.date_naive();
    let item = |kind: ItemKind, id: u64, title: &str, due: DateTime<Utc>| {
        let days_overdue = days_between(due.date_naive(), day);
        (days_overdue >= URGENCY_MEDIUM_DAYS).then(|| OverdueItem {
            kind,
            id,
            title: title.to_string(),
            due,
            days_overdue,
            urgency: Urgency::from_days_overdue(days_overdue),
        })
    };

    let goal_items = goals
        .iter()
        .filter(|g| g.status != GoalStatus::Completed)
        .filter_map(|g| {
            let due = g.due_date.filter(|d| *d < now)?;
            item(ItemKind::Goal, g.id.0, &g.title, due)
        });
    let event_items = events
        .iter()
        .filter(|e| e.end < now)
        .filter_map(|e| item(ItemKind::Event, e.id.0, &e.title, e.end));

    let mut items: Vec<OverdueItem> = goal_items.chain(event_items).collect();
    items.sort_by(|a, b| {
        b.urgency
            .cmp(&a.urgency)
            .then(b.days_overdue.cmp(&a.days_overdue))
            .then_with(|| a.title.cmp(&b.title))
    });
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

// =============================================================================
// PRODUCTIVITY METRICS
// =============================================================================

/// Derived productivity figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductivityMetrics {
    pub completion_rate_bp: u32,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    /// Goals completed per day over the last 7 days, in hundredths.
    pub weekly_average_centi: u32,
    pub completed_today: u32,
    pub completed_this_week: u32,
}

/// Every calendar day on which any goal or event was created, updated or completed.
#[must_use]
pub fn activity_days(goals: &[Goal], events: &[Event]) -> BTreeSet<NaiveDate> {
    let goal_days = goals.iter().flat_map(|g| {
        [Some(g.created_at), Some(g.updated_at), g.completed_at]
            .into_iter()
            .flatten()
    });
    let event_days = events.iter().flat_map(|e| [e.created_at, e.updated_at]);
    goal_days
        .chain(event_days)
        .map(|t| t.date_naive())
        .collect()
}

/// Consecutive active days ending today, or ending yesterday when today has
/// no activity yet.
#[must_use]
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut cursor = if days.contains(&today) {
        Some(today)
    } else {
        today.checked_sub_days(Days::new(1))
    };
    let mut streak = 0u32;
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        streak = streak.saturating_add(1);
        cursor = day.checked_sub_days(Days::new(1));
    }
    streak
}

/// Longest run of consecutive active days.
#[must_use]
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for &day in days {
        let continues = previous
            .and_then(|p| p.checked_add_days(Days::new(1)))
            .is_some_and(|next| next == day);
        run = if continues { run.saturating_add(1) } else { 1 };
        longest = longest.max(run);
        previous = Some(day);
    }
    longest
}

/// Completion rate, streaks and the rolling weekly average.
#[must_use]
pub fn metrics(goals: &[Goal], events: &[Event], now: DateTime<Utc>) -> ProductivityMetrics {
    let day = now.date_naive();
    let total = count(goals.len());
    let completed = count(
        goals
            .iter()
            .filter(|g| g.status == GoalStatus::Completed)
            .count(),
    );

    let completion_days: Vec<NaiveDate> = goals
        .iter()
        .filter(|g| g.status == GoalStatus::Completed)
        .filter_map(|g| g.completed_at)
        .map(|t| t.date_naive())
        .collect();
    let completed_today = count(completion_days.iter().filter(|d| **d == day).count());
    let completed_this_week = count(
        completion_days
            .iter()
            .filter(|d| (0..WEEKLY_WINDOW_DAYS).contains(&days_between(**d, day)))
            .count(),
    );
    let weekly_average_centi =
        u32::try_from(i64::from(completed_this_week) * 100 / WEEKLY_WINDOW_DAYS).unwrap_or(0);

    let days = activity_days(goals, events);
    ProductivityMetrics {
        completion_rate_bp: rate_bp(completed, total),
        current_streak_days: current_streak(&days, day),
        longest_streak_days: longest_streak(&days),
        weekly_average_centi,
        completed_today,
        completed_this_week,
    }
}

// =============================================================================
// FULL DASHBOARD
// =============================================================================

/// All dashboard views in one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub statistics: GoalStatistics,
    pub today: Vec<TodayItem>,
    pub overdue: Vec<OverdueItem>,
    pub metrics: ProductivityMetrics,
}

/// Build every dashboard view from the owner's collections.
#[must_use]
pub fn build(
    goals: &[Goal],
    events: &[Event],
    now: DateTime<Utc>,
    overdue_limit: Option<usize>,
) -> Dashboard {
    Dashboard {
        generated_at: now,
        statistics: goal_statistics(goals),
        today: today(goals, events, now),
        overdue: overdue(goals, events, now, overdue_limit),
        metrics: metrics(goals, events, now),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, day_at, event, goal};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn rate_handles_empty_denominator() {
        assert_eq!(rate_bp(0, 0), 0);
        assert_eq!(rate_bp(1, 4), 2_500);
        assert_eq!(rate_bp(2, 3), 6_666);
    }

    #[test]
    fn statistics_count_per_level() {
        let mut done = goal(2, Some(1), Level::Yearly);
        done.status = GoalStatus::Completed;
        let goals = vec![
            goal(1, None, Level::LongTerm),
            done,
            goal(3, Some(1), Level::Yearly),
        ];

        let stats = goal_statistics(&goals);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.levels.len(), 4);
        assert_eq!(stats.levels[1].total, 2);
        assert_eq!(stats.levels[1].completion_rate_bp, 5_000);
        assert_eq!(stats.levels[3].total, 0);
    }

    #[test]
    fn urgency_buckets() {
        assert_eq!(Urgency::from_days_overdue(0), Urgency::Low);
        assert_eq!(Urgency::from_days_overdue(1), Urgency::Medium);
        assert_eq!(Urgency::from_days_overdue(2), Urgency::Medium);
        assert_eq!(Urgency::from_days_overdue(3), Urgency::High);
        assert_eq!(Urgency::from_days_overdue(6), Urgency::High);
        assert_eq!(Urgency::from_days_overdue(7), Urgency::Critical);
        assert_eq!(Urgency::from_days_overdue(30), Urgency::Critical);
    }

    #[test]
    fn overdue_excludes_same_day_and_completed() {
        let now = day_at(2024, 1, 10, 15);
        let mut earlier_today = goal(1, None, Level::LongTerm);
        earlier_today.due_date = Some(day_at(2024, 1, 10, 9));
        let mut one_day = goal(2, None, Level::LongTerm);
        one_day.due_date = Some(day_at(2024, 1, 9, 9));
        let mut done = goal(3, None, Level::LongTerm);
        done.due_date = Some(day_at(2024, 1, 1, 9));
        done.status = GoalStatus::Completed;
        let mut week = goal(4, None, Level::LongTerm);
        week.due_date = Some(day_at(2024, 1, 3, 9));
        let old_event = event(5, day_at(2024, 1, 7, 9), day_at(2024, 1, 7, 10));

        let items = overdue(&[earlier_today, one_day, done, week], &[old_event], now, None);

        let summary: Vec<(u64, i64, Urgency)> = items
            .iter()
            .map(|i| (i.id, i.days_overdue, i.urgency))
            .collect();
        assert_eq!(
            summary,
            vec![
                (4, 7, Urgency::Critical),
                (5, 3, Urgency::High),
                (2, 1, Urgency::Medium),
            ]
        );
    }

    #[test]
    fn overdue_keeps_cancelled_goals() {
        let now = day_at(2024, 1, 10, 15);
        let mut dropped = goal(1, None, Level::LongTerm);
        dropped.due_date = Some(day_at(2024, 1, 5, 9));
        dropped.status = GoalStatus::Cancelled;
        let mut paused = goal(2, None, Level::LongTerm);
        paused.due_date = Some(day_at(2024, 1, 8, 9));
        paused.status = GoalStatus::Paused;

        let ids: Vec<u64> = overdue(&[dropped, paused], &[], now, None)
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn overdue_respects_limit() {
        let now = day_at(2024, 1, 10, 15);
        let goals: Vec<Goal> = (1..=5)
            .map(|id| {
                let mut g = goal(id, None, Level::LongTerm);
                g.due_date = Some(day_at(2024, 1, 1, 0));
                g
            })
            .collect();
        assert_eq!(overdue(&goals, &[], now, Some(2)).len(), 2);
    }

    #[test]
    fn today_merges_and_ranks() {
        let now = day_at(2024, 1, 10, 9);
        let mut task = goal(4, Some(3), Level::Daily);
        task.due_date = Some(day_at(2024, 1, 10, 17));
        task.progress = Progress::from_percent(50).expect("percent");
        let mut tomorrow = goal(5, Some(3), Level::Daily);
        tomorrow.due_date = Some(day_at(2024, 1, 11, 17));
        let mut monthly = goal(3, Some(2), Level::Monthly);
        monthly.due_date = Some(day_at(2024, 1, 10, 17));

        let standup = event(
            10,
            day_at(2024, 1, 10, 9) + chrono::Duration::minutes(30),
            day_at(2024, 1, 10, 10),
        );
        let mut holiday = event(11, day_at(2024, 1, 10, 0), day_at(2024, 1, 10, 23));
        holiday.all_day = true;
        let yesterday = event(12, day_at(2024, 1, 9, 9), day_at(2024, 1, 9, 10));

        let items = today(
            &[task, tomorrow, monthly],
            &[standup, holiday, yesterday],
            now,
        );
        let ids: Vec<(ItemKind, u64, i64)> =
            items.iter().map(|i| (i.kind, i.id, i.score)).collect();

        // goal: 10 level + 20 due + 10 proximity = 40
        // standup: 15 base + 25 imminent = 40, ties break on time (09:30 < 17:00)
        // holiday: 15 base + 20 ongoing - 10 all-day = 25
        assert_eq!(
            ids,
            vec![
                (ItemKind::Event, 10, 40),
                (ItemKind::Goal, 4, 40),
                (ItemKind::Event, 11, 25),
            ]
        );
    }

    #[test]
    fn streaks_count_consecutive_days() {
        let days: BTreeSet<NaiveDate> = [
            date(2024, 1, 1),
            date(2024, 1, 2),
            date(2024, 1, 3),
            date(2024, 1, 5),
            date(2024, 1, 6),
        ]
        .into_iter()
        .collect();

        assert_eq!(longest_streak(&days), 3);
        assert_eq!(current_streak(&days, date(2024, 1, 6)), 2);
        // No activity yet on the 7th: the streak through the 6th still counts.
        assert_eq!(current_streak(&days, date(2024, 1, 7)), 2);
        assert_eq!(current_streak(&days, date(2024, 1, 8)), 0);
        assert_eq!(longest_streak(&BTreeSet::new()), 0);
    }

    #[test]
    fn weekly_average_uses_last_seven_days() {
        let now = day_at(2024, 1, 10, 12);
        let goals: Vec<Goal> = [10, 9, 4, 3]
            .into_iter()
            .enumerate()
            .map(|(i, d)| {
                let mut g = goal(i as u64 + 1, None, Level::LongTerm);
                g.status = GoalStatus::Completed;
                g.completed_at = Some(day_at(2024, 1, d, 8));
                g
            })
            .collect();

        let m = metrics(&goals, &[], now);
        assert_eq!(m.completed_today, 1);
        // Days 10, 9 and 4 fall within the window (0..7 days back); day 3 does not.
        assert_eq!(m.completed_this_week, 3);
        assert_eq!(m.weekly_average_centi, 42);
        assert_eq!(m.completion_rate_bp, 10_000);
    }

    #[test]
    fn build_assembles_all_views() {
        let goals = vec![goal(1, None, Level::LongTerm)];
        let dash = build(&goals, &[], at(0), Some(10));
        assert_eq!(dash.statistics.total, 1);
        assert!(dash.today.is_empty());
        assert!(dash.overdue.is_empty());
        assert_eq!(dash.generated_at, at(0));
    }
}
