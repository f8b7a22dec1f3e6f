//! Integration tests for the Waypoint HTTP client.
//!
//! Each test starts a real server on an ephemeral port.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use waypoint::api::{Accounts, ApiSettings, AppState, ErrorBody, HealthResponse, create_router};
use waypoint::client::{ClientError, RetryPolicy, WaypointClient};
use waypoint::config::Account;
use waypoint_core::{
    Backend, Goal, GoalPatch, HierarchyError, Level, NewCategory, NewGoal, OwnerId, Planner,
    Progress, QueryKey,
};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

async fn spawn_server(accounts: Accounts) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let settings = ApiSettings {
        accounts,
        cors_origins: None,
        rate_limit: 0,
    };
    let router = create_router(AppState::new(Planner::new(Backend::default())), &settings);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn dev_server() -> String {
    spawn_server(Accounts::development(OwnerId(1))).await
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        base_delay: Duration::from_millis(10),
    }
}

/// A `/health` endpoint that fails with `status` for the first `failures`
/// hits and answers normally afterwards.
struct Flaky {
    hits: AtomicUsize,
    failures: usize,
    status: StatusCode,
}

async fn flaky_health(State(flaky): State<Arc<Flaky>>) -> Response {
    let hit = flaky.hits.fetch_add(1, Ordering::SeqCst);
    if hit < flaky.failures {
        let body = ErrorBody {
            error: "try again".to_string(),
            code: "flaky".to_string(),
        };
        return (flaky.status, Json(body)).into_response();
    }
    Json(HealthResponse::ok("memory")).into_response()
}

async fn spawn_flaky(failures: usize, status: StatusCode) -> (String, Arc<Flaky>) {
    let flaky = Arc::new(Flaky {
        hits: AtomicUsize::new(0),
        failures,
        status,
    });
    let router = Router::new()
        .route("/health", get(flaky_health))
        .with_state(Arc::clone(&flaky));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), flaky)
}

fn three_quick_attempts() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

// =============================================================================
// CACHE TESTS
// =============================================================================

#[tokio::test]
async fn test_fresh_reads_come_from_cache() {
    let url = dev_server().await;
    let mut reader = WaypointClient::new(url.clone(), None);
    let mut writer = WaypointClient::new(url, None);

    assert!(reader.goals().await.unwrap().is_empty());
    writer.create_goal(&NewGoal::root("Run a marathon")).await.unwrap();

    // The reader never saw the write, so its cached list is served as is.
    assert!(reader.goals().await.unwrap().is_empty());
    assert_eq!(writer.goals().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_writes_invalidate_affected_queries() {
    let url = dev_server().await;
    let mut client = WaypointClient::new(url, None);

    client.goals().await.unwrap();
    client.goal_stats().await.unwrap();
    client.dashboard().await.unwrap();
    client.profile().await.unwrap();
    assert!(client.cache().peek(QueryKey::GoalList).is_some());

    let goal = client
        .create_goal(&NewGoal::root("Learn Rust"))
        .await
        .unwrap();

    assert!(client.cache().peek(QueryKey::GoalList).is_none());
    assert!(client.cache().peek(QueryKey::GoalStats).is_none());
    assert!(client.cache().peek(QueryKey::Dashboard).is_none());
    assert!(client.cache().peek(QueryKey::Profile).is_some());

    let goals = client.goals().await.unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].id, goal.id);
}

#[tokio::test]
async fn test_update_propagates_through_server() {
    let url = dev_server().await;
    let mut client = WaypointClient::new(url, None);

    let root = client.create_goal(&NewGoal::root("Root")).await.unwrap();
    let child = client
        .create_goal(&NewGoal::child_of("Child", root.id, root.level).unwrap())
        .await
        .unwrap();
    client.goals().await.unwrap();

    let patch = GoalPatch {
        progress: Some(Progress::from_percent(60).unwrap()),
        ..GoalPatch::default()
    };
    let updated = client.update_goal(child.id, &patch).await.unwrap();
    assert_eq!(updated.progress.percent(), 60);

    let root = client.goal(root.id).await.unwrap();
    assert_eq!(root.progress.percent(), 60);

    let cached: Goal =
        serde_json::from_value(client.cache().peek(QueryKey::GoalDetail(child.id)).cloned().unwrap())
            .unwrap();
    assert_eq!(cached.progress.percent(), 60);
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let url = dev_server().await;
    let mut client = WaypointClient::new(url, None).with_retry(fast_retry());

    let goal = client.create_goal(&NewGoal::root("Keep me")).await.unwrap();
    client.goal(goal.id).await.unwrap();
    let before = client.cache().peek(QueryKey::GoalDetail(goal.id)).cloned();

    let patch = GoalPatch {
        title: Some("   ".to_string()),
        ..GoalPatch::default()
    };
    let err = client.update_goal(goal.id, &patch).await.unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert_eq!(client.cache().peek(QueryKey::GoalDetail(goal.id)).cloned(), before);
    assert_eq!(client.goal(goal.id).await.unwrap().title, "Keep me");
}

#[tokio::test]
async fn test_delete_drops_removed_subtree() {
    let url = dev_server().await;
    let mut client = WaypointClient::new(url, None);

    let root = client.create_goal(&NewGoal::root("Root")).await.unwrap();
    let child = client
        .create_goal(&NewGoal::child_of("Child", root.id, root.level).unwrap())
        .await
        .unwrap();
    client.goal(child.id).await.unwrap();

    let removed = client.delete_goal(root.id).await.unwrap();

    assert_eq!(removed, vec![root.id, child.id]);
    assert!(client.cache().peek(QueryKey::GoalDetail(child.id)).is_none());
    assert!(client.goals().await.unwrap().is_empty());
}

// =============================================================================
// VALIDATION AND ERROR TESTS
// =============================================================================

#[tokio::test]
async fn test_hierarchy_is_checked_before_sending() {
    let url = dev_server().await;
    let mut client = WaypointClient::new(url, None);

    let input = NewGoal {
        level: Level::Monthly,
        ..NewGoal::root("Stray monthly")
    };
    let err = client.create_goal(&input).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Validation(HierarchyError::RootLevel { .. })
    ));
    assert!(client.goals().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejections_carry_error_code() {
    let url = dev_server().await;
    let mut client = WaypointClient::new(url, None).with_retry(fast_retry());

    client
        .create_category(&NewCategory::new("Health", "#22AA55"))
        .await
        .unwrap();
    let err = client
        .create_category(&NewCategory::new("Health", "#000000"))
        .await
        .unwrap_err();

    match err {
        ClientError::Rejected { status, code, .. } => {
            assert_eq!(status, 422);
            assert_eq!(code.as_deref(), Some("duplicate_name"));
        }
        other => panic!("expected rejection, got {other}"),
    }
    assert_eq!(client.categories().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let accounts = Accounts::new(
        &[Account {
            token: "secret".to_string(),
            owner: 3,
        }],
        OwnerId(1),
    );
    let url = spawn_server(accounts).await;

    let mut anonymous = WaypointClient::new(url.clone(), None);
    assert!(matches!(
        anonymous.goals().await.unwrap_err(),
        ClientError::Unauthorized
    ));

    let mut client = WaypointClient::new(url, Some("secret".to_string()));
    let goal = client.create_goal(&NewGoal::root("Mine")).await.unwrap();
    assert_eq!(goal.owner, OwnerId(3));
    assert_eq!(client.health().await.unwrap().status, "ok");
}

#[tokio::test]
async fn test_server_error_is_retried_until_success() {
    let (url, flaky) = spawn_flaky(1, StatusCode::SERVICE_UNAVAILABLE).await;
    let client = WaypointClient::new(url, None).with_retry(three_quick_attempts());

    let health = client.health().await.unwrap();

    assert_eq!(health.status, "ok");
    assert_eq!(flaky.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let (url, flaky) = spawn_flaky(2, StatusCode::TOO_MANY_REQUESTS).await;
    let client = WaypointClient::new(url, None).with_retry(three_quick_attempts());

    assert_eq!(client.health().await.unwrap().status, "ok");
    assert_eq!(flaky.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_persistent_server_error_gives_up_after_attempts() {
    let (url, flaky) = spawn_flaky(usize::MAX, StatusCode::SERVICE_UNAVAILABLE).await;
    let client = WaypointClient::new(url, None).with_retry(three_quick_attempts());

    let err = client.health().await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(flaky.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_error_is_sent_once() {
    let (url, flaky) = spawn_flaky(usize::MAX, StatusCode::UNPROCESSABLE_ENTITY).await;
    let client = WaypointClient::new(url, None).with_retry(three_quick_attempts());

    let err = client.health().await.unwrap_err();

    match err {
        ClientError::Rejected { status, code, .. } => {
            assert_eq!(status, 422);
            assert_eq!(code.as_deref(), Some("flaky"));
        }
        other => panic!("expected rejection, got {other}"),
    }
    assert_eq!(flaky.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = WaypointClient::new(format!("http://{}", addr), None).with_retry(fast_retry());
    let err = client.health().await.unwrap_err();

    assert!(err.is_transient());
}
