//! # Planner Benchmarks
//!
//! Performance benchmarks for progress propagation and dashboard assembly.
//!
//! Run with: `cargo bench -p waypoint-core`

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::hint::black_box;
use waypoint_core::{
    Event, EventId, Goal, GoalId, GoalStatus, Level, OwnerId, Progress, dashboard, progress,
};

const OWNER: OwnerId = OwnerId(1);

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid time")
}

fn goal(id: u64, parent: Option<u64>, level: Level, bp: u32) -> Goal {
    Goal {
        id: GoalId(id),
        owner: OWNER,
        title: format!("goal {id}"),
        description: None,
        parent: parent.map(GoalId),
        level,
        progress: Progress::new(bp).expect("bp"),
        status: GoalStatus::Active,
        start_date: None,
        due_date: Some(epoch() + Duration::days((id % 30) as i64)),
        completed_at: None,
        category: None,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

/// A full four-level tree with `fanout` children under every non-leaf.
fn create_tree(fanout: u64) -> BTreeMap<GoalId, Goal> {
    let mut goals = BTreeMap::new();
    let mut next = 1u64;
    let mut frontier = vec![];
    for _ in 0..fanout {
        goals.insert(GoalId(next), goal(next, None, Level::LongTerm, 0));
        frontier.push((next, Level::LongTerm));
        next += 1;
    }
    while let Some((parent, level)) = frontier.pop() {
        let Some(child_level) = level.child() else {
            continue;
        };
        for _ in 0..fanout {
            let bp = ((next * 37) % 10_001) as u32;
            goals.insert(GoalId(next), goal(next, Some(parent), child_level, bp));
            frontier.push((next, child_level));
            next += 1;
        }
    }
    goals
}

fn create_events(count: u64) -> Vec<Event> {
    (0..count)
        .map(|i| {
            let start = epoch() + Duration::hours(i as i64);
            Event {
                id: EventId(1_000_000 + i),
                owner: OWNER,
                title: format!("event {i}"),
                description: None,
                start,
                end: start + Duration::minutes(45),
                all_day: false,
                category: None,
                tags: Default::default(),
                color: None,
                location: None,
                created_at: start,
                updated_at: start,
            }
        })
        .collect()
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");

    for fanout in [2u64, 4, 6].iter() {
        let goals = create_tree(*fanout);
        let deepest_parent = goals
            .values()
            .filter(|g| g.level == Level::Monthly)
            .map(|g| g.id)
            .last();

        group.bench_with_input(
            BenchmarkId::from_parameter(goals.len()),
            &goals,
            |b, goals| {
                b.iter(|| {
                    let mut goals = goals.clone();
                    black_box(progress::propagate(&mut goals, deepest_parent, epoch()))
                });
            },
        );
    }

    group.finish();
}

fn bench_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle");

    for fanout in [2u64, 4, 6].iter() {
        let goals = create_tree(*fanout);
        group.bench_with_input(
            BenchmarkId::from_parameter(goals.len()),
            &goals,
            |b, goals| {
                b.iter(|| {
                    let mut goals = goals.clone();
                    black_box(progress::settle(&mut goals, epoch()))
                });
            },
        );
    }

    group.finish();
}

fn bench_dashboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("dashboard_build");
    let now = epoch() + Duration::days(10);

    for fanout in [2u64, 4, 6].iter() {
        let goals: Vec<Goal> = create_tree(*fanout).into_values().collect();
        let events = create_events(goals.len() as u64);
        group.bench_with_input(
            BenchmarkId::from_parameter(goals.len()),
            &(goals, events),
            |b, (goals, events)| {
                b.iter(|| black_box(dashboard::build(goals, events, now, Some(10))));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_propagation, bench_settle, bench_dashboard);
criterion_main!(benches);
