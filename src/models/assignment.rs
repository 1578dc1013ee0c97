use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AssignmentStatus;
use super::exercise::ExerciseSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub patient_id: String,
    pub clinician_id: String,
    pub assigned_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: AssignmentStatus,
    pub completed_sets: u32,
    pub last_completed_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

/// An assignment joined with the exercise it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub exercise: ExerciseSummary,
}
