use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::Caller,
    dashboard::{self, DashboardGroup},
    error::ApiError,
    models::*,
    stats::{self, EnrollmentStats},
    store::{CatalogStore, EnrollmentStore, StoreError},
};

/// Shared handler state: the two store seams plus dashboard tuning.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub dashboard_concurrency: usize,
}

impl AppState {
    /// State backed by one store serving both the catalog and enrollments.
    pub fn new<S>(store: S, dashboard_concurrency: usize) -> Self
    where
        S: CatalogStore + EnrollmentStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            enrollments: store,
            dashboard_concurrency,
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        // catalog
        .route("/api/course-groups", get(list_groups).post(create_group))
        .route("/api/course-groups/:group_id/courses", get(group_courses))
        .route("/api/courses", post(create_course))
        .route("/api/courses/:course_id", get(get_course))
        // enrollments
        .route("/api/enrollments", post(enroll))
        .route("/api/enrollments/:course_id", get(get_enrollment))
        .route("/api/enrollments/:course_id/progress", patch(update_progress))
        // per-user views
        .route("/api/user/:user_id/enrollments", get(user_enrollments))
        .route("/api/user/:user_id/stats", get(user_stats))
        .route("/api/dashboard/:user_id", get(user_dashboard))
        .with_state(state)
}

// --- catalog ---

async fn list_groups(
    State(state): State<AppState>,
    _: Caller,
) -> ApiResult<Json<Vec<CourseGroup>>> {
    Ok(Json(state.catalog.list_groups().await?))
}

async fn group_courses(
    State(state): State<AppState>,
    _: Caller,
    WithRejection(Path(group_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<Vec<Course>>> {
    let courses = state
        .catalog
        .courses_by_group(group_id, dashboard::COURSES_PER_GROUP)
        .await?;
    Ok(Json(courses))
}

async fn get_course(
    State(state): State<AppState>,
    _: Caller,
    WithRejection(Path(course_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<Course>> {
    let course = state
        .catalog
        .get_course(course_id)
        .await?
        .ok_or(StoreError::NotFound("course"))?;
    Ok(Json(course))
}

async fn create_group(
    State(state): State<AppState>,
    caller: Caller,
    WithRejection(Json(req), _): WithRejection<Json<NewCourseGroup>, ApiError>,
) -> ApiResult<(StatusCode, Json<CourseGroup>)> {
    req.validate()?;
    let group = state.catalog.create_group(req).await?;
    tracing::info!(caller = %caller.user_id, group_id = %group.id, "course group created");
    Ok((StatusCode::CREATED, Json(group)))
}

async fn create_course(
    State(state): State<AppState>,
    caller: Caller,
    WithRejection(Json(req), _): WithRejection<Json<NewCourse>, ApiError>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    req.validate()?;
    let course = state.catalog.create_course(req).await?;
    tracing::info!(caller = %caller.user_id, course_id = %course.id, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

// --- enrollments ---
//
// Core operations always act for the authenticated caller. A `userId` in the
// path, query or body is only checked against it.

async fn get_enrollment(
    State(state): State<AppState>,
    caller: Caller,
    WithRejection(Path(course_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(q), _): WithRejection<Query<EnrollmentQuery>, ApiError>,
) -> ApiResult<Json<Option<Enrollment>>> {
    let user_id = caller.acting_as(q.user_id.as_deref())?;
    let enrollment = state.enrollments.get_enrollment(user_id, course_id).await?;
    Ok(Json(enrollment))
}

async fn enroll(
    State(state): State<AppState>,
    caller: Caller,
    WithRejection(Json(req), _): WithRejection<Json<CreateEnrollmentReq>, ApiError>,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    let user_id = caller.acting_as(req.user_id.as_deref())?;
    let enrollment = state
        .enrollments
        .create_enrollment(user_id, req.course_id)
        .await?;
    tracing::info!(
        user_id = %enrollment.user_id,
        course_id = %enrollment.course_id,
        "enrolled"
    );
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn update_progress(
    State(state): State<AppState>,
    caller: Caller,
    WithRejection(Path(course_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProgressReq>, ApiError>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = caller.acting_as(req.user_id.as_deref())?;
    let progress = Progress::new(req.progress)?;
    let update = state
        .enrollments
        .update_progress(user_id, course_id, progress)
        .await?;
    tracing::debug!(
        user_id,
        course_id = %course_id,
        progress = update.enrollment.progress,
        "progress updated"
    );
    if update.newly_completed {
        tracing::info!(user_id, course_id = %course_id, "course completed");
    }
    Ok(Json(
        serde_json::json!({ "ok": true, "message": "Progress updated successfully" }),
    ))
}

// --- per-user views ---

async fn user_enrollments(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<EnrollmentWithCourse>>> {
    let user_id = caller.acting_as(Some(user_id.as_str()))?;
    Ok(Json(state.enrollments.list_for_user(user_id).await?))
}

async fn user_stats(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<EnrollmentStats>> {
    let user_id = caller.acting_as(Some(user_id.as_str()))?;
    let rows = state.enrollments.list_for_user(user_id).await?;
    Ok(Json(stats::compute_stats(&rows)))
}

async fn user_dashboard(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<DashboardGroup>>> {
    let user_id = caller.acting_as(Some(user_id.as_str()))?;
    let groups = dashboard::build_dashboard(
        state.catalog.as_ref(),
        state.enrollments.as_ref(),
        user_id,
        state.dashboard_concurrency,
    )
    .await?;
    Ok(Json(groups))
}
