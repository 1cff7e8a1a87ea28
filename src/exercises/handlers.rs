use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

use super::{
    dto::{CreateExerciseRequest, ExercisePage, ListQuery, UpdateExerciseRequest},
    repo_types::Exercise,
    services,
};

pub fn exercise_routes() -> Router<AppState> {
    Router::new()
        .route("/exercises", get(list_exercises).post(create_exercise))
        .route(
            "/exercises/:id",
            get(get_exercise)
                .patch(update_exercise)
                .delete(delete_exercise),
        )
}

#[instrument(skip(state))]
pub async fn list_exercises(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListQuery>,
) -> AppResult<Json<ExercisePage>> {
    let page = services::list(state.exercises.as_ref(), query).await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn get_exercise(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<Exercise>> {
    let exercise = services::get(state.exercises.as_ref(), id).await?;
    Ok(Json(exercise))
}

#[instrument(skip(state, user, payload), fields(user_id = user.id))]
pub async fn create_exercise(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<CreateExerciseRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<Exercise>)> {
    let exercise = services::create(
        state.exercises.as_ref(),
        payload,
        &user,
        OffsetDateTime::now_utc(),
    )
    .await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/exercises/{}", exercise.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(exercise)))
}

#[instrument(skip(state, user, payload), fields(user_id = user.id))]
pub async fn update_exercise(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateExerciseRequest>,
) -> AppResult<Json<Exercise>> {
    let exercise = services::update(
        state.exercises.as_ref(),
        id,
        payload,
        &user,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json(exercise))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_exercise(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    services::delete(state.exercises.as_ref(), id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
