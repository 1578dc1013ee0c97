//! Assignment endpoints.
//!
//! - `POST /api/assignments`: assign an exercise to a patient
//! - `GET /api/assignments`: list with filters
//! - `GET /api/assignments/:id`: detail
//! - `DELETE /api/assignments/:id`: unassign
//! - `POST /api/assignments/:id/complete-set`: record one set

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{parse_enum, parse_id, ApiContext};
use crate::assignments::{AssignmentRequest, AssignmentView};
use crate::coordinator::CompleteSetOutcome;
use crate::models::enums::AssignmentStatus;
use crate::models::AssignmentFilter;

#[derive(Deserialize)]
pub struct AssignmentListQuery {
    pub patient_id: Option<String>,
    pub exercise_id: Option<String>,
    pub status: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct AssignmentsResponse {
    pub assignments: Vec<AssignmentView>,
    pub total: usize,
}

/// `POST /api/assignments`
pub async fn create(
    State(ctx): State<ApiContext>,
    payload: Result<Json<AssignmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignmentView>), ApiError> {
    let Json(request) = payload?;
    let view = ctx.service.assign_exercise_to_patient(request)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/assignments`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<AssignmentListQuery>, QueryRejection>,
) -> Result<Json<AssignmentsResponse>, ApiError> {
    let Query(query) = query?;

    let exercise_id = query
        .exercise_id
        .as_deref()
        .map(|raw| parse_id("exercise", raw))
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|raw| parse_enum("status", raw, AssignmentStatus::ALL, AssignmentStatus::as_str))
        .transpose()?;

    let filter = AssignmentFilter {
        patient_id: query.patient_id.filter(|p| !p.trim().is_empty()),
        exercise_id,
        status,
        due_from: query.due_from,
        due_to: query.due_to,
    };
    let assignments = ctx.service.list_assignments(&filter)?;

    Ok(Json(AssignmentsResponse {
        total: assignments.len(),
        assignments,
    }))
}

/// `GET /api/assignments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentView>, ApiError> {
    let id = parse_id("assignment", &assignment_id)?;
    Ok(Json(ctx.service.get_assignment(&id)?))
}

/// `DELETE /api/assignments/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(assignment_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id("assignment", &assignment_id)?;
    ctx.service.unassign(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/assignments/:id/complete-set`
pub async fn complete_set(
    State(ctx): State<ApiContext>,
    Path(assignment_id): Path<String>,
) -> Result<Json<CompleteSetOutcome>, ApiError> {
    let id = parse_id("assignment", &assignment_id)?;
    Ok(Json(ctx.service.complete_set(&id)?))
}
