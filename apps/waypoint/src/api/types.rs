//! # API Request/Response Types
//!
//! JSON shapes specific to the HTTP layer. Domain rows (`Goal`, `Event`, ...)
//! and their create/patch inputs are serialized as-is from `waypoint-core`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_core::{
    CategoryId, EventFilter, GoalFilter, GoalId, GoalStatus, Level, WaypointError,
};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}

impl HealthResponse {
    #[must_use]
    pub fn ok(backend: &str) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: backend.to_string(),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// A `WaypointError` rendered as an HTTP response.
///
/// - Constraint violations: 422
/// - Missing rows: 404
/// - Rows owned by someone else: 403
/// - Storage, serialization and I/O failures: 500 with a generic message
#[derive(Debug)]
pub struct ApiError(pub WaypointError);

impl From<WaypointError> for ApiError {
    fn from(e: WaypointError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_constraint_violation() => StatusCode::UNPROCESSABLE_ENTITY,
            WaypointError::NotFound { .. } => StatusCode::NOT_FOUND,
            WaypointError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "request failed");
            "Internal server error".to_string()
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "request rejected");
            self.0.to_string()
        };
        let body = ErrorBody {
            error: message,
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// `GET /goals` filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalQuery {
    pub level: Option<u8>,
    pub status: Option<GoalStatus>,
    pub parent: Option<u64>,
    pub category: Option<u64>,
    pub root_only: Option<bool>,
}

impl GoalQuery {
    pub fn to_filter(&self) -> Result<GoalFilter, WaypointError> {
        Ok(GoalFilter {
            level: self.level.map(Level::new).transpose()?,
            status: self.status,
            parent: self.parent.map(GoalId),
            category: self.category.map(CategoryId),
            root_only: self.root_only.unwrap_or(false),
        })
    }
}

/// `GET /events` filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<u64>,
    pub tag: Option<String>,
    pub all_day: Option<bool>,
}

impl EventQuery {
    pub fn to_filter(&self) -> Result<EventFilter, WaypointError> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && to < from
        {
            return Err(WaypointError::InvalidDateRange(
                "'to' precedes 'from'".to_string(),
            ));
        }
        Ok(EventFilter {
            from: self.from,
            to: self.to,
            category: self.category.map(CategoryId),
            tag: self.tag.clone(),
            all_day: self.all_day,
        })
    }
}

/// Optional evaluation time for dashboard views (defaults to the server clock).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NowQuery {
    pub now: Option<DateTime<Utc>>,
}

impl NowQuery {
    #[must_use]
    pub fn resolve(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// `GET /dashboard/overdue` parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverdueQuery {
    pub now: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

// =============================================================================
// DELETE RESPONSES
// =============================================================================

/// Goals removed by a cascading delete, the requested goal first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalDeleted {
    pub removed: Vec<GoalId>,
}

/// A deleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDeleted {
    pub id: u64,
}

/// A deleted category and how many rows lost their reference to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDeleted {
    pub id: u64,
    pub goals_cleared: usize,
    pub events_cleared: usize,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{HierarchyError, RowKind};

    #[test]
    fn constraint_errors_map_to_422() {
        let e = ApiError(WaypointError::Hierarchy(HierarchyError::ParentIsLeaf));
        assert_eq!(e.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let e = ApiError(WaypointError::DuplicateName("Work".to_string()));
        assert_eq!(e.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn scope_errors_map_to_404_and_403() {
        let missing = ApiError(WaypointError::NotFound {
            kind: RowKind::Goal,
            id: 1,
        });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let denied = ApiError(WaypointError::AccessDenied {
            kind: RowKind::Event,
            id: 2,
        });
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn storage_errors_map_to_500() {
        let e = ApiError(WaypointError::Storage("disk".to_string()));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn goal_query_rejects_unknown_level() {
        let query = GoalQuery {
            level: Some(9),
            ..GoalQuery::default()
        };
        assert!(query.to_filter().is_err());
    }

    #[test]
    fn event_query_rejects_inverted_window() {
        let now = Utc::now();
        let query = EventQuery {
            from: Some(now),
            to: Some(now - chrono::Duration::hours(1)),
            ..EventQuery::default()
        };
        assert!(matches!(
            query.to_filter(),
            Err(WaypointError::InvalidDateRange(_))
        ));
    }
}
