use chrono::NaiveDate;
use uuid::Uuid;

use super::enums::{AssignmentStatus, ExerciseCategory};

#[derive(Debug, Default, Clone)]
pub struct ExerciseFilter {
    pub category: Option<ExerciseCategory>,
    /// Case-insensitive substring matched against name and description.
    pub search: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct AssignmentFilter {
    pub patient_id: Option<String>,
    pub exercise_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

impl AssignmentFilter {
    pub fn for_patient(patient_id: &str) -> Self {
        Self {
            patient_id: Some(patient_id.to_string()),
            ..Self::default()
        }
    }

    pub fn due_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.due_from = Some(from);
        self.due_to = Some(to);
        self
    }
}
