//! Exercise catalog endpoints.
//!
//! - `POST /api/exercises`: create
//! - `GET /api/exercises`: list with `category` / `search` filters
//! - `GET /api/exercises/:id`: detail
//! - `PATCH /api/exercises/:id`: partial update
//! - `DELETE /api/exercises/:id`: delete with cascade count
//! - `GET /api/exercises/:id/stats`: assignment figures

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{parse_enum, parse_id, ApiContext};
use crate::catalog::{DeleteOutcome, ExerciseDefinition, ExercisePatch, ExerciseStats};
use crate::models::enums::ExerciseCategory;
use crate::models::{Exercise, ExerciseFilter};

#[derive(Deserialize)]
pub struct CreateExerciseRequest {
    #[serde(flatten)]
    pub definition: ExerciseDefinition,
    pub created_by: String,
}

#[derive(Deserialize)]
pub struct ExerciseListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct ExercisesResponse {
    pub exercises: Vec<Exercise>,
    pub total: usize,
}

/// `POST /api/exercises`
pub async fn create(
    State(ctx): State<ApiContext>,
    payload: Result<Json<CreateExerciseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Exercise>), ApiError> {
    let Json(request) = payload?;
    let exercise = ctx
        .service
        .create_exercise(request.definition, &request.created_by)?;
    Ok((StatusCode::CREATED, Json(exercise)))
}

/// `GET /api/exercises`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<ExerciseListQuery>, QueryRejection>,
) -> Result<Json<ExercisesResponse>, ApiError> {
    let Query(query) = query?;
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| parse_enum("category", c, ExerciseCategory::ALL, ExerciseCategory::as_str))
        .transpose()?;

    let filter = ExerciseFilter {
        category,
        search: query.search,
    };
    let exercises = ctx.service.list_exercises(&filter)?.to_vec();

    Ok(Json(ExercisesResponse {
        total: exercises.len(),
        exercises,
    }))
}

/// `GET /api/exercises/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(exercise_id): Path<String>,
) -> Result<Json<Exercise>, ApiError> {
    let id = parse_id("exercise", &exercise_id)?;
    Ok(Json(ctx.service.get_exercise(&id)?))
}

/// `PATCH /api/exercises/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(exercise_id): Path<String>,
    payload: Result<Json<ExercisePatch>, JsonRejection>,
) -> Result<Json<Exercise>, ApiError> {
    let id = parse_id("exercise", &exercise_id)?;
    let Json(patch) = payload?;
    Ok(Json(ctx.service.update_exercise(&id, patch)?))
}

/// `DELETE /api/exercises/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(exercise_id): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let id = parse_id("exercise", &exercise_id)?;
    Ok(Json(ctx.service.delete_exercise(&id)?))
}

/// `GET /api/exercises/:id/stats`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Path(exercise_id): Path<String>,
) -> Result<Json<ExerciseStats>, ApiError> {
    let id = parse_id("exercise", &exercise_id)?;
    Ok(Json(ctx.service.exercise_stats(&id)?))
}
