//! Patient-facing endpoints.
//!
//! - `POST /api/patients`: register a patient id
//! - `GET /api/patients/:id/daily?date=`: what is due on one day
//! - `GET /api/patients/:id/adherence`: dashboard figures
//! - `GET /api/patients/:id/plan`: today / upcoming / overdue / completed

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::coordinator::{DailyView, ExercisePlan, PatientAdherence};

#[derive(Deserialize)]
pub struct RegisterPatientRequest {
    pub patient_id: String,
}

#[derive(Serialize)]
pub struct RegisterPatientResponse {
    pub patient_id: String,
    pub created: bool,
}

#[derive(Deserialize)]
pub struct DailyQuery {
    pub date: Option<NaiveDate>,
}

/// `POST /api/patients`: 201 when new, 200 when already known.
pub async fn register(
    State(ctx): State<ApiContext>,
    payload: Result<Json<RegisterPatientRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterPatientResponse>), ApiError> {
    let Json(request) = payload?;
    let created = ctx.service.register_patient(&request.patient_id)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(RegisterPatientResponse {
            patient_id: request.patient_id.trim().to_string(),
            created,
        }),
    ))
}

/// `GET /api/patients/:id/daily`: defaults to today.
pub async fn daily(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    query: Result<Query<DailyQuery>, QueryRejection>,
) -> Result<Json<DailyView>, ApiError> {
    let Query(query) = query?;
    let date = query.date.unwrap_or_else(|| ctx.service.today());
    Ok(Json(ctx.service.get_patient_daily_view(&patient_id, date)?))
}

/// `GET /api/patients/:id/adherence`
pub async fn adherence(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientAdherence>, ApiError> {
    Ok(Json(ctx.service.get_patient_adherence(&patient_id)?))
}

/// `GET /api/patients/:id/plan`
pub async fn plan(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<ExercisePlan>, ApiError> {
    Ok(Json(ctx.service.get_patient_exercise_plan(&patient_id)?))
}
