use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use shared::{
    AddExerciseRequest, DayWorkoutLog, ExercisePatch, ReorderExercisesRequest, TemplateRange,
    UpsertDayLogRequest, UpsertTemplateRangeRequest, WeeklyWorkoutData,
};

use crate::domain::week::WeekId;
use crate::domain::{TimelineService, WeeklyLogService, WorkoutService};
use crate::error::{AppError, AppResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub timeline: TimelineService,
    pub weekly: WeeklyLogService,
    pub workouts: WorkoutService,
}

impl AppState {
    pub fn new(db: crate::db::DbConnection) -> Self {
        Self {
            timeline: TimelineService::new(db.clone()),
            weekly: WeeklyLogService::new(db.clone()),
            workouts: WorkoutService::new(db),
        }
    }
}

/// JSON body extractor whose rejection is an `AppError`.
///
/// Axum's stock `Json` rejects malformed or incomplete bodies with a plain
/// text 422; routing the failure through `AppError::Validation` keeps every
/// error on the wire in the `{code, message}` shape.
#[derive(Debug)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

/// Extract the caller's identity from the `X-User-Id` header
fn require_user(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(AppError::Unauthenticated)
}

fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {value} (expected YYYY-MM-DD)")))
}

/// Query parameters for the template-ranges endpoint
#[derive(Deserialize, Debug)]
pub struct TemplateRangeQuery {
    #[serde(rename = "weekId")]
    pub week_id: Option<String>,
}

/// GET /api/template-ranges
///
/// With `weekId`, the single range resolved for that week (or null).
/// Without it, every range for the user, ascending by start week.
pub async fn get_template_ranges(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TemplateRangeQuery>,
) -> AppResult<Response> {
    let user_id = require_user(&headers)?;
    info!(user_id, query = ?query, "GET /api/template-ranges");

    match query.week_id {
        Some(week_id) => {
            let week: WeekId = week_id.parse()?;
            let resolved = state.timeline.resolve_template_for_week(&user_id, week).await?;
            Ok(Json(resolved).into_response())
        }
        None => {
            let ranges = state.timeline.list_ranges(&user_id).await?;
            Ok(Json(ranges).into_response())
        }
    }
}

/// POST /api/template-ranges
pub async fn upsert_template_range(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(request): AppJson<UpsertTemplateRangeRequest>,
) -> AppResult<Json<TemplateRange>> {
    let user_id = require_user(&headers)?;
    info!(user_id, start = %request.start_week_id, "POST /api/template-ranges");

    let week: WeekId = request.start_week_id.parse()?;
    let range = state
        .timeline
        .upsert_range_starting_at(&user_id, week, request.plan, request.name)
        .await?;
    Ok(Json(range))
}

/// Query parameters for the day-workout-logs endpoint
#[derive(Deserialize, Debug)]
pub struct DayLogQuery {
    #[serde(rename = "weekId")]
    pub week_id: Option<String>,
    pub date: Option<String>,
}

/// GET /api/day-workout-logs
///
/// `weekId` yields the persisted logs for that week; `date` yields the
/// single log for that date (or null). One of the two is required.
pub async fn get_day_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DayLogQuery>,
) -> AppResult<Response> {
    let user_id = require_user(&headers)?;
    info!(user_id, query = ?query, "GET /api/day-workout-logs");

    match (query.week_id, query.date) {
        (Some(week_id), _) => {
            let week: WeekId = week_id.parse()?;
            let logs = state
                .weekly
                .persisted_logs_for_week(&user_id, week)
                .await?;
            Ok(Json(logs).into_response())
        }
        (None, Some(date)) => {
            parse_date(&date)?;
            let log = state.weekly.persisted_log_for_date(&user_id, &date).await?;
            Ok(Json(log).into_response())
        }
        (None, None) => Err(AppError::Validation(
            "weekId or date query parameter is required".to_string(),
        )),
    }
}

/// POST /api/day-workout-logs
pub async fn upsert_day_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(request): AppJson<UpsertDayLogRequest>,
) -> AppResult<Json<DayWorkoutLog>> {
    let user_id = require_user(&headers)?;
    info!(user_id, date = %request.date, "POST /api/day-workout-logs");

    let stored = state.workouts.upsert_day_log(&user_id, request).await?;
    Ok(Json(stored))
}

/// Query parameters for the weekly-workout-logs endpoint
#[derive(Deserialize, Debug)]
pub struct WeeklyLogQuery {
    pub date: String,
}

/// GET /api/weekly-workout-logs?date=YYYY-MM-DD
pub async fn get_weekly_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WeeklyLogQuery>,
) -> AppResult<Json<WeeklyWorkoutData>> {
    let user_id = require_user(&headers)?;
    info!(user_id, date = %query.date, "GET /api/weekly-workout-logs");

    let date = parse_date(&query.date)?;
    let data = state.weekly.materialize_week(&user_id, date).await?;
    Ok(Json(data))
}

/// POST /api/workouts/days/:day/exercises
pub async fn add_exercise(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(day): Path<usize>,
    AppJson(request): AppJson<AddExerciseRequest>,
) -> AppResult<Json<TemplateRange>> {
    let user_id = require_user(&headers)?;
    info!(user_id, day, exercise = %request.exercise.name, "POST exercises");

    let today = Utc::now().date_naive();
    let range = state
        .workouts
        .add_exercise(&user_id, today, day, request)
        .await?;
    Ok(Json(range))
}

/// PUT /api/workouts/days/:day/exercises/:exercise_id
pub async fn update_exercise(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((day, exercise_id)): Path<(usize, String)>,
    AppJson(patch): AppJson<ExercisePatch>,
) -> AppResult<Json<TemplateRange>> {
    let user_id = require_user(&headers)?;
    info!(user_id, day, exercise_id, "PUT exercises");

    let today = Utc::now().date_naive();
    let range = state
        .workouts
        .update_exercise(&user_id, today, day, &exercise_id, &patch)
        .await?;
    Ok(Json(range))
}

/// DELETE /api/workouts/days/:day/exercises/:exercise_id
pub async fn remove_exercise(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((day, exercise_id)): Path<(usize, String)>,
) -> AppResult<Json<TemplateRange>> {
    let user_id = require_user(&headers)?;
    info!(user_id, day, exercise_id, "DELETE exercises");

    let today = Utc::now().date_naive();
    let range = state
        .workouts
        .remove_exercise(&user_id, today, day, &exercise_id)
        .await?;
    Ok(Json(range))
}

/// POST /api/workouts/days/:day/exercises/:exercise_id/toggle
pub async fn toggle_exercise(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((day, exercise_id)): Path<(usize, String)>,
) -> AppResult<Json<DayWorkoutLog>> {
    let user_id = require_user(&headers)?;
    info!(user_id, day, exercise_id, "POST toggle");

    let today = Utc::now().date_naive();
    let log = state
        .workouts
        .toggle_exercise_complete(&user_id, today, day, &exercise_id)
        .await?;
    Ok(Json(log))
}

/// POST /api/workouts/days/:day/reorder
pub async fn reorder_exercises(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(day): Path<usize>,
    AppJson(request): AppJson<ReorderExercisesRequest>,
) -> AppResult<Json<TemplateRange>> {
    let user_id = require_user(&headers)?;
    info!(user_id, day, count = request.exercise_ids.len(), "POST reorder");

    let today = Utc::now().date_naive();
    let range = state
        .workouts
        .reorder_exercises(&user_id, today, day, &request.exercise_ids)
        .await?;
    Ok(Json(range))
}

/// POST /api/workouts/days/:day/complete
pub async fn mark_day_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(day): Path<usize>,
) -> AppResult<Json<DayWorkoutLog>> {
    let user_id = require_user(&headers)?;
    info!(user_id, day, "POST complete");

    let today = Utc::now().date_naive();
    let log = state.workouts.mark_day_complete(&user_id, today, day).await?;
    Ok(Json(log))
}

/// All API routes, to be nested under `/api`
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/template-ranges", get(get_template_ranges))
        .route("/template-ranges", post(upsert_template_range))
        .route("/day-workout-logs", get(get_day_logs))
        .route("/day-workout-logs", post(upsert_day_log))
        .route("/weekly-workout-logs", get(get_weekly_logs))
        .route("/workouts/days/:day/exercises", post(add_exercise))
        .route(
            "/workouts/days/:day/exercises/:exercise_id",
            put(update_exercise),
        )
        .route(
            "/workouts/days/:day/exercises/:exercise_id",
            delete(remove_exercise),
        )
        .route(
            "/workouts/days/:day/exercises/:exercise_id/toggle",
            post(toggle_exercise),
        )
        .route("/workouts/days/:day/reorder", post(reorder_exercises))
        .route("/workouts/days/:day/complete", post(mark_day_complete))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use axum::http::StatusCode;
    use shared::WeekPlan;

    async fn setup_test_state() -> AppState {
        let db = DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        AppState::new(db)
    }

    fn headers_for(user: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", user.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_missing_user_header_is_unauthorized() {
        let state = setup_test_state().await;

        let response = get_template_ranges(
            State(state),
            HeaderMap::new(),
            Query(TemplateRangeQuery { week_id: None }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upsert_then_resolve_template_range() {
        let state = setup_test_state().await;
        let now = "2024-01-01T00:00:00Z".to_string();

        let request = UpsertTemplateRangeRequest {
            start_week_id: "2024-W10".to_string(),
            name: None,
            plan: WeekPlan::empty(&now),
        };
        let created = upsert_template_range(
            State(state.clone()),
            headers_for("user_1"),
            AppJson(request),
        )
        .await
        .unwrap();
        assert_eq!(created.0.start_week_id, "2024-W10");

        let response = get_template_ranges(
            State(state),
            headers_for("user_1"),
            Query(TemplateRangeQuery {
                week_id: Some("2024-W12".to_string()),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_week_id_is_bad_request() {
        let state = setup_test_state().await;

        let response = get_template_ranges(
            State(state),
            headers_for("user_1"),
            Query(TemplateRangeQuery {
                week_id: Some("week ten".to_string()),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_day_logs_require_a_query_parameter() {
        let state = setup_test_state().await;

        let response = get_day_logs(
            State(state),
            headers_for("user_1"),
            Query(DayLogQuery {
                week_id: None,
                date: None,
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_weekly_logs_reject_bad_date() {
        let state = setup_test_state().await;

        let response = get_weekly_logs(
            State(state),
            headers_for("user_1"),
            Query(WeeklyLogQuery {
                date: "June 5".to_string(),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upsert_day_log_round_trips_through_get() {
        let state = setup_test_state().await;

        let request = UpsertDayLogRequest {
            date: "2024-06-03".to_string(),
            week_id: "2024-W23".to_string(),
            day_of_week: 1,
            exercises: Vec::new(),
            completed: true,
        };
        let stored = upsert_day_log(
            State(state.clone()),
            headers_for("user_1"),
            AppJson(request),
        )
        .await
        .unwrap();
        assert!(stored.0.completed);

        let response = get_day_logs(
            State(state),
            headers_for("user_1"),
            Query(DayLogQuery {
                week_id: Some("2024-W23".to_string()),
                date: None,
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_incomplete_json_body_yields_structured_validation_error() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/template-ranges")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{}"))
            .unwrap();

        let rejection = AppJson::<UpsertTemplateRangeRequest>::from_request(request, &())
            .await
            .expect_err("body missing startWeekId must be rejected");

        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: shared::ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "validation_error");
        assert!(!body.message.is_empty());
    }

    #[tokio::test]
    async fn test_day_index_out_of_range_is_bad_request() {
        let state = setup_test_state().await;

        let response = mark_day_complete(State(state), headers_for("user_1"), Path(9))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
