//! # Waypoint HTTP Client
//!
//! Wrapper around the Waypoint REST API with a local query cache.
//!
//! - Reads go through `QueryCache`: a fresh entry is served without a call.
//! - Every successful write invalidates the keys `invalidations` names.
//! - Goal and event updates are applied to the cache before the request and
//!   rolled back if it fails. A goal update is also mirrored onto the cached
//!   goal list with the same propagation the server runs.
//! - Transient failures are retried with exponential backoff; rejections
//!   (4xx) are returned immediately.
//! - Goal creation runs the hierarchy placement check locally first. The
//!   check is advisory: the server enforces it again.

mod error;
mod retry;

pub use error::ClientError;
pub use retry::RetryPolicy;

use crate::api::{CategoryDeleted, ErrorBody, EventDeleted, GoalDeleted, HealthResponse};
use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use waypoint_core::{
    Category, CategoryId, CategoryPatch, Dashboard, Event, EventId, EventPatch, Goal, GoalId,
    GoalNode, GoalPatch, GoalStatistics, Mutation, NewCategory, NewEvent, NewGoal,
    OptimisticSnapshot, OverdueItem, Preferences, ProductivityMetrics, Profile, ProfilePatch,
    QueryCache, QueryKey, TodayItem, hierarchy, invalidations, progress,
};

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Parse(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::Parse(e.to_string()))
}

/// Local preview of a goal patch.
///
/// Structural fields (parent, level) are left for the server to apply.
fn preview_goal(goal: &Goal, patch: &GoalPatch) -> Goal {
    let now = Utc::now();
    let mut next = goal.clone();
    if let Some(title) = &patch.title {
        next.title.clone_from(title);
    }
    if let Some(description) = &patch.description {
        next.description.clone_from(description);
    }
    if let Some(progress) = patch.progress {
        next.progress = progress;
    }
    if let Some(status) = patch.status {
        next.set_status(status, now);
    }
    if let Some(start) = patch.start_date {
        next.start_date = start;
    }
    if let Some(due) = patch.due_date {
        next.due_date = due;
    }
    if let Some(category) = patch.category {
        next.category = category;
    }
    next.updated_at = now;
    next
}

fn preview_event(event: &Event, patch: &EventPatch) -> Event {
    let mut next = event.clone();
    if let Some(title) = &patch.title {
        next.title.clone_from(title);
    }
    if let Some(description) = &patch.description {
        next.description.clone_from(description);
    }
    if let Some(start) = patch.start {
        next.start = start;
    }
    if let Some(end) = patch.end {
        next.end = end;
    }
    if let Some(all_day) = patch.all_day {
        next.all_day = all_day;
    }
    if let Some(category) = patch.category {
        next.category = category;
    }
    if let Some(tags) = &patch.tags {
        next.tags.clone_from(tags);
    }
    if let Some(color) = &patch.color {
        next.color.clone_from(color);
    }
    if let Some(location) = &patch.location {
        next.location.clone_from(location);
    }
    next.updated_at = Utc::now();
    next
}

/// HTTP client that wraps calls to the Waypoint REST API.
#[derive(Debug)]
pub struct WaypointClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
    cache: QueryCache<Value>,
}

impl WaypointClient {
    /// Create a new client pointing at the given server URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            retry: RetryPolicy::default(),
            cache: QueryCache::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache<Value> {
        &self.cache
    }

    // =========================================================================
    // TRANSPORT
    // =========================================================================

    /// Build a request with optional Bearer auth.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Check status codes and parse the JSON body.
    async fn handle_response(resp: reqwest::Response) -> Result<Value, ClientError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Transient(format!("{status}: {body}")));
        }
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(e) => (Some(e.code), e.error),
                Err(_) => (None, body),
            };
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Send a request, retrying transient failures with backoff.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let mut made = 0u32;
        loop {
            let mut req = self.request(method.clone(), path);
            if let Some(body) = body {
                req = req.json(body);
            }
            let result = match req.send().await {
                Ok(resp) => Self::handle_response(resp).await,
                Err(e) => Err(ClientError::Transient(format!("{}: {e}", self.base_url))),
            };
            made = made.saturating_add(1);

            match result {
                Err(e) if e.is_transient() && self.retry.allows_another(made) => {
                    let delay = self.retry.delay(made.saturating_sub(1));
                    tracing::debug!(
                        %method,
                        path,
                        attempt = made,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Serve `key` from the cache when fresh, otherwise GET `path` and cache it.
    async fn cached<T: DeserializeOwned>(
        &mut self,
        key: QueryKey,
        path: &str,
    ) -> Result<T, ClientError> {
        if let Some(value) = self.cache.get(key, Instant::now()) {
            tracing::trace!(?key, "cache hit");
            return decode(value.clone());
        }
        let value = self.send(Method::GET, path, None).await?;
        self.cache.insert(key, value.clone(), Instant::now());
        decode(value)
    }

    async fn write<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = encode(body)?;
        decode(self.send(method, path, Some(&body)).await?)
    }

    fn invalidate(&mut self, mutation: Mutation) {
        let dropped = self.cache.invalidate(invalidations(&mutation));
        tracing::trace!(?mutation, dropped, "cache invalidated");
    }

    fn rollback(&mut self, snapshots: Vec<OptimisticSnapshot<Value>>) {
        for snapshot in snapshots.into_iter().rev() {
            self.cache.rollback(snapshot);
        }
    }

    fn confirm(&mut self, snapshots: Vec<OptimisticSnapshot<Value>>) {
        for snapshot in snapshots {
            self.cache.confirm(snapshot);
        }
    }

    // =========================================================================
    // HEALTH
    // =========================================================================

    /// GET /health
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        decode(self.send(Method::GET, "/health", None).await?)
    }

    // =========================================================================
    // GOALS
    // =========================================================================

    pub async fn goals(&mut self) -> Result<Vec<Goal>, ClientError> {
        self.cached(QueryKey::GoalList, "/goals").await
    }

    pub async fn goal(&mut self, id: GoalId) -> Result<Goal, ClientError> {
        self.cached(QueryKey::GoalDetail(id), &format!("/goals/{}", id.0))
            .await
    }

    pub async fn goal_children(&mut self, id: GoalId) -> Result<Vec<Goal>, ClientError> {
        self.cached(
            QueryKey::GoalChildren(id),
            &format!("/goals/{}/children", id.0),
        )
        .await
    }

    pub async fn goal_tree(&mut self) -> Result<Vec<GoalNode>, ClientError> {
        self.cached(QueryKey::GoalTree, "/goals/tree").await
    }

    pub async fn goal_stats(&mut self) -> Result<GoalStatistics, ClientError> {
        self.cached(QueryKey::GoalStats, "/goals/stats").await
    }

    /// Create a goal after checking its placement locally.
    pub async fn create_goal(&mut self, input: &NewGoal) -> Result<Goal, ClientError> {
        let parent = match input.parent {
            Some(id) => Some(self.goal(id).await?),
            None => None,
        };
        hierarchy::validate_placement(input.level, parent.as_ref())?;

        let goal: Goal = self.write(Method::POST, "/goals", input).await?;
        self.invalidate(Mutation::GoalCreated {
            id: goal.id,
            parent: goal.parent,
        });
        Ok(goal)
    }

    /// Update a goal, showing the change in the cache before the server answers.
    pub async fn update_goal(&mut self, id: GoalId, patch: &GoalPatch) -> Result<Goal, ClientError> {
        let current = self.goal(id).await?;
        let optimistic = preview_goal(&current, patch);
        let snapshots = self.stage_goal_update(&optimistic, patch)?;

        let result: Result<Goal, ClientError> = self
            .write(Method::PATCH, &format!("/goals/{}", id.0), patch)
            .await;
        match result {
            Ok(goal) => {
                self.confirm(snapshots);
                self.invalidate(Mutation::GoalUpdated {
                    id,
                    parent: goal.parent,
                    previous_parent: current.parent.filter(|p| Some(*p) != goal.parent),
                });
                self.cache
                    .insert(QueryKey::GoalDetail(id), encode(&goal)?, Instant::now());
                Ok(goal)
            }
            Err(e) => {
                tracing::debug!(goal = id.0, error = %e, "goal update failed, rolling back");
                self.rollback(snapshots);
                Err(e)
            }
        }
    }

    /// Write `optimistic` into its detail entry, the cached goal list and the
    /// detail entry of every ancestor the change propagates to.
    fn stage_goal_update(
        &mut self,
        optimistic: &Goal,
        patch: &GoalPatch,
    ) -> Result<Vec<OptimisticSnapshot<Value>>, ClientError> {
        let now = Instant::now();
        let mut snapshots = vec![self.cache.apply_optimistic(
            QueryKey::GoalDetail(optimistic.id),
            encode(optimistic)?,
            now,
        )];
        if let Some((list, ancestors)) = self.mirrored_goal_list(optimistic, patch) {
            snapshots.push(self.cache.apply_optimistic(QueryKey::GoalList, list, now));
            for ancestor in &ancestors {
                snapshots.push(self.cache.apply_optimistic(
                    QueryKey::GoalDetail(ancestor.id),
                    encode(ancestor)?,
                    now,
                ));
            }
        }
        Ok(snapshots)
    }

    /// The cached goal list with `updated` swapped in and its ancestors
    /// recomputed, plus the ancestors that changed (nearest first).
    fn mirrored_goal_list(&self, updated: &Goal, patch: &GoalPatch) -> Option<(Value, Vec<Goal>)> {
        let cached: Vec<Goal> = decode(self.cache.peek(QueryKey::GoalList)?.clone()).ok()?;
        let mut goals: BTreeMap<GoalId, Goal> = cached.into_iter().map(|g| (g.id, g)).collect();
        goals.insert(updated.id, updated.clone());
        let changed = if patch.affects_parent() {
            progress::propagate(&mut goals, updated.parent, Utc::now())
        } else {
            Vec::new()
        };
        tracing::trace!(goal = updated.id.0, ancestors = changed.len(), "mirrored propagation");
        let ancestors: Vec<Goal> = changed
            .iter()
            .filter_map(|id| goals.get(id).cloned())
            .collect();
        let mut list: Vec<Goal> = goals.into_values().collect();
        list.sort_by_key(|g| (g.created_at, g.id));
        Some((encode(&list).ok()?, ancestors))
    }

    /// Delete a goal and its subtree. Returns every removed id.
    pub async fn delete_goal(&mut self, id: GoalId) -> Result<Vec<GoalId>, ClientError> {
        let parent = self.goal(id).await?.parent;
        let deleted: GoalDeleted = decode(
            self.send(Method::DELETE, &format!("/goals/{}", id.0), None)
                .await?,
        )?;
        self.invalidate(Mutation::GoalDeleted { id, parent });
        for removed in &deleted.removed {
            self.cache.invalidate([
                QueryKey::GoalDetail(*removed),
                QueryKey::GoalChildren(*removed),
            ]);
        }
        Ok(deleted.removed)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub async fn events(&mut self) -> Result<Vec<Event>, ClientError> {
        self.cached(QueryKey::EventList, "/events").await
    }

    pub async fn event(&mut self, id: EventId) -> Result<Event, ClientError> {
        self.cached(QueryKey::EventDetail(id), &format!("/events/{}", id.0))
            .await
    }

    pub async fn create_event(&mut self, input: &NewEvent) -> Result<Event, ClientError> {
        let event: Event = self.write(Method::POST, "/events", input).await?;
        self.invalidate(Mutation::EventCreated(event.id));
        Ok(event)
    }

    pub async fn update_event(
        &mut self,
        id: EventId,
        patch: &EventPatch,
    ) -> Result<Event, ClientError> {
        let current = self.event(id).await?;
        let snapshot = self.cache.apply_optimistic(
            QueryKey::EventDetail(id),
            encode(&preview_event(&current, patch))?,
            Instant::now(),
        );

        let result: Result<Event, ClientError> = self
            .write(Method::PATCH, &format!("/events/{}", id.0), patch)
            .await;
        match result {
            Ok(event) => {
                self.cache.confirm(snapshot);
                self.invalidate(Mutation::EventUpdated(id));
                self.cache
                    .insert(QueryKey::EventDetail(id), encode(&event)?, Instant::now());
                Ok(event)
            }
            Err(e) => {
                self.cache.rollback(snapshot);
                Err(e)
            }
        }
    }

    pub async fn delete_event(&mut self, id: EventId) -> Result<(), ClientError> {
        let _: EventDeleted = decode(
            self.send(Method::DELETE, &format!("/events/{}", id.0), None)
                .await?,
        )?;
        self.invalidate(Mutation::EventDeleted(id));
        Ok(())
    }

    // =========================================================================
    // CATEGORIES
    // =========================================================================

    pub async fn categories(&mut self) -> Result<Vec<Category>, ClientError> {
        self.cached(QueryKey::CategoryList, "/categories").await
    }

    pub async fn create_category(&mut self, input: &NewCategory) -> Result<Category, ClientError> {
        let category: Category = self.write(Method::POST, "/categories", input).await?;
        self.invalidate(Mutation::CategoryCreated(category.id));
        Ok(category)
    }

    pub async fn update_category(
        &mut self,
        id: CategoryId,
        patch: &CategoryPatch,
    ) -> Result<Category, ClientError> {
        let category: Category = self
            .write(Method::PATCH, &format!("/categories/{}", id.0), patch)
            .await?;
        self.invalidate(Mutation::CategoryUpdated(id));
        Ok(category)
    }

    /// Delete a category. Returns how many goals and events were cleared.
    pub async fn delete_category(&mut self, id: CategoryId) -> Result<(usize, usize), ClientError> {
        let deleted: CategoryDeleted = decode(
            self.send(Method::DELETE, &format!("/categories/{}", id.0), None)
                .await?,
        )?;
        self.invalidate(Mutation::CategoryDeleted(id));
        Ok((deleted.goals_cleared, deleted.events_cleared))
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    pub async fn profile(&mut self) -> Result<Profile, ClientError> {
        self.cached(QueryKey::Profile, "/profile").await
    }

    pub async fn update_profile(&mut self, patch: &ProfilePatch) -> Result<Profile, ClientError> {
        let profile: Profile = self.write(Method::PATCH, "/profile", patch).await?;
        self.invalidate(Mutation::ProfileUpdated);
        Ok(profile)
    }

    pub async fn update_preferences(
        &mut self,
        preferences: &Preferences,
    ) -> Result<Profile, ClientError> {
        let profile: Profile = self
            .write(Method::PUT, "/profile/preferences", preferences)
            .await?;
        self.invalidate(Mutation::ProfileUpdated);
        Ok(profile)
    }

    // =========================================================================
    // DASHBOARD
    // =========================================================================

    pub async fn dashboard(&mut self) -> Result<Dashboard, ClientError> {
        self.cached(QueryKey::Dashboard, "/dashboard").await
    }

    pub async fn today(&mut self) -> Result<Vec<TodayItem>, ClientError> {
        self.cached(QueryKey::DashboardToday, "/dashboard/today")
            .await
    }

    pub async fn overdue(&mut self) -> Result<Vec<OverdueItem>, ClientError> {
        self.cached(QueryKey::DashboardOverdue, "/dashboard/overdue")
            .await
    }

    pub async fn metrics(&mut self) -> Result<ProductivityMetrics, ClientError> {
        self.cached(QueryKey::DashboardMetrics, "/dashboard/metrics")
            .await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use waypoint_core::{GoalStatus, Level, OwnerId, Progress};

    fn goal(id: u64, parent: Option<u64>, level: Level, percent: u32) -> Goal {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid time");
        Goal {
            id: GoalId(id),
            owner: OwnerId(1),
            title: format!("goal {id}"),
            description: None,
            parent: parent.map(GoalId),
            level,
            progress: Progress::from_percent(percent).expect("percent"),
            status: GoalStatus::Active,
            start_date: None,
            due_date: None,
            completed_at: None,
            category: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn preview_leaves_structure_alone() {
        let current = goal(2, Some(1), Level::Yearly, 10);
        let patch = GoalPatch {
            title: Some("renamed".to_string()),
            progress: Some(Progress::from_percent(40).expect("percent")),
            parent: Some(None),
            ..GoalPatch::default()
        };
        let next = preview_goal(&current, &patch);
        assert_eq!(next.title, "renamed");
        assert_eq!(next.progress.percent(), 40);
        assert_eq!(next.parent, Some(GoalId(1)));
    }

    #[test]
    fn preview_completion_stamps_time() {
        let current = goal(2, Some(1), Level::Yearly, 100);
        let patch = GoalPatch {
            status: Some(GoalStatus::Completed),
            ..GoalPatch::default()
        };
        assert!(preview_goal(&current, &patch).completed_at.is_some());
    }

    #[test]
    fn mirrored_list_recomputes_parent() {
        let mut client = WaypointClient::new("http://127.0.0.1:1", None);
        let list = vec![
            goal(1, None, Level::LongTerm, 50),
            goal(2, Some(1), Level::Yearly, 100),
            goal(3, Some(1), Level::Yearly, 0),
        ];
        client.cache.insert(
            QueryKey::GoalList,
            encode(&list).expect("encode"),
            Instant::now(),
        );

        let patch = GoalPatch {
            progress: Some(Progress::COMPLETE),
            ..GoalPatch::default()
        };
        let updated = preview_goal(&list[2], &patch);
        let (mirrored, ancestors) = client
            .mirrored_goal_list(&updated, &patch)
            .expect("mirrored");
        let mirrored: Vec<Goal> = decode(mirrored).expect("decode");

        let parent = mirrored.iter().find(|g| g.id == GoalId(1)).expect("parent");
        assert!(parent.progress.is_complete());
        assert_eq!(parent.status, GoalStatus::Completed);
        assert_eq!(
            ancestors.iter().map(|g| g.id).collect::<Vec<_>>(),
            vec![GoalId(1)]
        );
    }

    #[test]
    fn staged_update_reaches_ancestor_details() {
        let mut client = WaypointClient::new("http://127.0.0.1:1", None);
        let list = vec![
            goal(1, None, Level::LongTerm, 25),
            goal(2, Some(1), Level::Yearly, 50),
            goal(3, Some(2), Level::Monthly, 50),
        ];
        let now = Instant::now();
        client
            .cache
            .insert(QueryKey::GoalList, encode(&list).expect("encode"), now);
        client
            .cache
            .insert(QueryKey::GoalDetail(GoalId(1)), encode(&list[0]).expect("encode"), now);
        let before = client.cache.peek(QueryKey::GoalDetail(GoalId(1))).cloned();

        let patch = GoalPatch {
            progress: Some(Progress::COMPLETE),
            ..GoalPatch::default()
        };
        let updated = preview_goal(&list[2], &patch);
        let snapshots = client.stage_goal_update(&updated, &patch).expect("stage");

        for (id, percent) in [(1, 100), (2, 100)] {
            let cached: Goal = decode(
                client
                    .cache
                    .peek(QueryKey::GoalDetail(GoalId(id)))
                    .cloned()
                    .expect("detail"),
            )
            .expect("decode");
            assert_eq!(cached.progress.percent(), percent);
        }

        client.rollback(snapshots);
        assert_eq!(client.cache.peek(QueryKey::GoalDetail(GoalId(1))).cloned(), before);
        assert!(client.cache.peek(QueryKey::GoalDetail(GoalId(2))).is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = WaypointClient::new("http://localhost:8080/", None);
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
