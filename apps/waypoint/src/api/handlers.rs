//! # API Endpoint Handlers
//!
//! Each handler resolves the owner from request extensions, takes the
//! planner lock (read for queries, write for mutations) and maps the
//! planner result straight to JSON.

use super::{
    AppState,
    auth::Owner,
    types::{
        ApiError, CategoryDeleted, EventDeleted, EventQuery, GoalDeleted, GoalQuery,
        HealthResponse, NowQuery, OverdueQuery,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use waypoint_core::{
    Category, CategoryId, CategoryPatch, Dashboard, Event, EventId, EventPatch, Goal, GoalId,
    GoalNode, GoalPatch, GoalStatistics, NewCategory, NewEvent, NewGoal, OverdueItem,
    Preferences, ProductivityMetrics, Profile, ProfilePatch, TodayItem,
};

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint. Needs no owner.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.backend))
}

// =============================================================================
// GOAL HANDLERS
// =============================================================================

pub async fn list_goals_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<GoalQuery>,
) -> ApiResult<Vec<Goal>> {
    let filter = query.to_filter()?;
    let planner = state.planner.read().await;
    Ok(Json(planner.goals(owner, &filter)?))
}

pub async fn create_goal_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(input): Json<NewGoal>,
) -> Created<Goal> {
    let mut planner = state.planner.write().await;
    let goal = planner.create_goal(owner, input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn goal_tree_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> ApiResult<Vec<GoalNode>> {
    let planner = state.planner.read().await;
    Ok(Json(planner.goal_tree(owner)?))
}

pub async fn goal_stats_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> ApiResult<GoalStatistics> {
    let planner = state.planner.read().await;
    Ok(Json(planner.goal_stats(owner)?))
}

pub async fn get_goal_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<Goal> {
    let planner = state.planner.read().await;
    Ok(Json(planner.goal(owner, GoalId(id))?))
}

pub async fn update_goal_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
    Json(patch): Json<GoalPatch>,
) -> ApiResult<Goal> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.update_goal(owner, GoalId(id), patch, Utc::now())?))
}

pub async fn delete_goal_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<GoalDeleted> {
    let mut planner = state.planner.write().await;
    let removed = planner.delete_goal(owner, GoalId(id), Utc::now())?;
    Ok(Json(GoalDeleted { removed }))
}

pub async fn goal_children_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<Goal>> {
    let planner = state.planner.read().await;
    Ok(Json(planner.goal_children(owner, GoalId(id))?))
}

pub async fn goal_path_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<Goal>> {
    let planner = state.planner.read().await;
    Ok(Json(planner.goal_path(owner, GoalId(id))?))
}

// =============================================================================
// EVENT HANDLERS
// =============================================================================

pub async fn list_events_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Vec<Event>> {
    let filter = query.to_filter()?;
    let planner = state.planner.read().await;
    Ok(Json(planner.events(owner, &filter)?))
}

pub async fn create_event_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(input): Json<NewEvent>,
) -> Created<Event> {
    let mut planner = state.planner.write().await;
    let event = planner.create_event(owner, input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<Event> {
    let planner = state.planner.read().await;
    Ok(Json(planner.event(owner, EventId(id))?))
}

pub async fn update_event_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
    Json(patch): Json<EventPatch>,
) -> ApiResult<Event> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.update_event(owner, EventId(id), patch, Utc::now())?))
}

pub async fn delete_event_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<EventDeleted> {
    let mut planner = state.planner.write().await;
    planner.delete_event(owner, EventId(id), Utc::now())?;
    Ok(Json(EventDeleted { id }))
}

// =============================================================================
// CATEGORY HANDLERS
// =============================================================================

pub async fn list_categories_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> ApiResult<Vec<Category>> {
    let planner = state.planner.read().await;
    Ok(Json(planner.categories(owner)?))
}

pub async fn create_category_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(input): Json<NewCategory>,
) -> Created<Category> {
    let mut planner = state.planner.write().await;
    let category = planner.create_category(owner, input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<Category> {
    let planner = state.planner.read().await;
    Ok(Json(planner.category(owner, CategoryId(id))?))
}

pub async fn update_category_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
    Json(patch): Json<CategoryPatch>,
) -> ApiResult<Category> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.update_category(owner, CategoryId(id), patch)?))
}

pub async fn delete_category_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<u64>,
) -> ApiResult<CategoryDeleted> {
    let mut planner = state.planner.write().await;
    let (goals_cleared, events_cleared) = planner.delete_category(owner, CategoryId(id))?;
    Ok(Json(CategoryDeleted {
        id,
        goals_cleared,
        events_cleared,
    }))
}

// =============================================================================
// PROFILE HANDLERS
// =============================================================================

/// The profile is created on first access, so this takes the write lock.
pub async fn get_profile_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> ApiResult<Profile> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.profile(owner, Utc::now())?))
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(patch): Json<ProfilePatch>,
) -> ApiResult<Profile> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.update_profile(owner, patch, Utc::now())?))
}

pub async fn update_preferences_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(preferences): Json<Preferences>,
) -> ApiResult<Profile> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.update_preferences(owner, preferences, Utc::now())?))
}

// =============================================================================
// DASHBOARD HANDLERS
// =============================================================================

pub async fn dashboard_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<NowQuery>,
) -> ApiResult<Dashboard> {
    let planner = state.planner.read().await;
    Ok(Json(planner.dashboard(owner, query.resolve(), None)?))
}

pub async fn today_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<NowQuery>,
) -> ApiResult<Vec<TodayItem>> {
    let planner = state.planner.read().await;
    Ok(Json(planner.today(owner, query.resolve())?))
}

pub async fn overdue_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<OverdueQuery>,
) -> ApiResult<Vec<OverdueItem>> {
    let now = query.now.unwrap_or_else(Utc::now);
    let planner = state.planner.read().await;
    Ok(Json(planner.overdue(owner, now, query.limit)?))
}

pub async fn metrics_handler(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<NowQuery>,
) -> ApiResult<ProductivityMetrics> {
    let planner = state.planner.read().await;
    Ok(Json(planner.metrics(owner, query.resolve())?))
}
