use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Difficulty, ExerciseCategory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub category: ExerciseCategory,
    pub difficulty: Difficulty,
    /// Display string, e.g. "2 minutes".
    pub duration: String,
    /// Timer length, when the exercise is timed.
    pub duration_seconds: Option<u32>,
    pub sets: u32,
    pub reps: u32,
    pub description: String,
    pub instructions: Vec<String>,
    pub created_by: String,
    pub last_modified: NaiveDateTime,
}

/// The slice of an exercise shown next to each assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSummary {
    pub id: Uuid,
    pub name: String,
    pub category: ExerciseCategory,
    pub difficulty: Difficulty,
    pub duration: String,
    pub sets: u32,
    pub reps: u32,
}

impl From<&Exercise> for ExerciseSummary {
    fn from(exercise: &Exercise) -> Self {
        Self {
            id: exercise.id,
            name: exercise.name.clone(),
            category: exercise.category,
            difficulty: exercise.difficulty,
            duration: exercise.duration.clone(),
            sets: exercise.sets,
            reps: exercise.reps,
        }
    }
}
