//! Exercise catalog: reusable prescription templates.
//!
//! Creation, validated partial updates, cascading delete, and filtered
//! listing of exercises. Functions take a borrowed connection; callers own
//! transaction boundaries (see `coordinator`).

use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adherence::AssignmentProgress;
use crate::clock::Clock;
use crate::db::repository;
use crate::error::ExerciseError;
use crate::models::enums::{Difficulty, ExerciseCategory};
use crate::models::{AssignmentFilter, Exercise, ExerciseFilter};

// ═══════════════════════════════════════════
// Input types
// ═══════════════════════════════════════════

/// Everything needed to create an exercise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub name: String,
    pub category: ExerciseCategory,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    pub sets: u32,
    pub reps: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// Partial update. `None` leaves a field unchanged. For `duration_seconds`,
/// `Some(None)` (an explicit JSON `null`) removes the timer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExercisePatch {
    pub name: Option<String>,
    pub category: Option<ExerciseCategory>,
    pub difficulty: Option<Difficulty>,
    pub duration: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub duration_seconds: Option<Option<u32>>,
    pub sets: Option<u32>,
    pub reps: Option<u32>,
    pub description: Option<String>,
    pub instructions: Option<Vec<String>>,
}

/// Any present value, `null` included, becomes `Some`. Absent fields fall
/// back to `None` through `#[serde(default)]`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ═══════════════════════════════════════════
// Result types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub exercise_id: Uuid,
    /// Assignments removed along with the exercise.
    pub cascaded_assignments: usize,
}

/// Library-card figures for one exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseStats {
    pub exercise_id: Uuid,
    pub assignment_count: usize,
    /// Distinct patients, earliest due date first.
    pub patients: Vec<String>,
    /// Mean completion rate; `None` when never assigned.
    pub average_completion_rate: Option<u8>,
}

/// A filtered view over a catalog snapshot.
///
/// Matching happens lazily as the iterator is driven, and `iter()` can be
/// called again to restart from the top. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ExerciseListing {
    exercises: Arc<[Exercise]>,
    needle: Option<String>,
}

impl ExerciseListing {
    fn new(exercises: Vec<Exercise>, search: Option<&str>) -> Self {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        Self {
            exercises: exercises.into(),
            needle,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exercise> + '_ {
        self.exercises
            .iter()
            .filter(move |e| matches_search(e, self.needle.as_deref()))
    }

    pub fn to_vec(&self) -> Vec<Exercise> {
        self.iter().cloned().collect()
    }
}

fn matches_search(exercise: &Exercise, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(needle) => {
            exercise.name.to_lowercase().contains(needle)
                || exercise.description.to_lowercase().contains(needle)
        }
    }
}

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

fn validate_name(name: &str) -> Result<(), ExerciseError> {
    if name.trim().is_empty() {
        return Err(ExerciseError::Validation("exercise name must not be empty".into()));
    }
    Ok(())
}

fn validate_positive(field: &str, value: u32) -> Result<(), ExerciseError> {
    if value == 0 {
        return Err(ExerciseError::Validation(format!(
            "{field} must be a positive integer"
        )));
    }
    Ok(())
}

fn validate_exercise(exercise: &Exercise) -> Result<(), ExerciseError> {
    validate_name(&exercise.name)?;
    validate_positive("sets", exercise.sets)?;
    validate_positive("reps", exercise.reps)?;
    if let Some(seconds) = exercise.duration_seconds {
        validate_positive("duration_seconds", seconds)?;
    }
    Ok(())
}

fn clean_instructions(steps: Vec<String>) -> Vec<String> {
    steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ═══════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════

pub fn create_exercise(
    conn: &Connection,
    clock: &dyn Clock,
    definition: ExerciseDefinition,
    created_by: &str,
) -> Result<Exercise, ExerciseError> {
    if created_by.trim().is_empty() {
        return Err(ExerciseError::Validation("creator id must not be empty".into()));
    }

    let exercise = Exercise {
        id: Uuid::new_v4(),
        name: definition.name.trim().to_string(),
        category: definition.category,
        difficulty: definition.difficulty,
        duration: definition.duration.trim().to_string(),
        duration_seconds: definition.duration_seconds,
        sets: definition.sets,
        reps: definition.reps,
        description: definition.description.trim().to_string(),
        instructions: clean_instructions(definition.instructions),
        created_by: created_by.to_string(),
        last_modified: clock.now(),
    };
    validate_exercise(&exercise)?;

    repository::insert_exercise(conn, &exercise)?;
    tracing::info!(exercise_id = %exercise.id, name = %exercise.name, "Exercise created");
    Ok(exercise)
}

pub fn get_exercise(conn: &Connection, id: &Uuid) -> Result<Exercise, ExerciseError> {
    repository::get_exercise(conn, id)?.ok_or_else(|| ExerciseError::not_found("Exercise", id))
}

/// Applies a partial update.
///
/// Shrinking `sets` below progress already recorded on an assignment is a
/// `Conflict`. Shrinking onto it completes those assignments.
pub fn update_exercise(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
    patch: ExercisePatch,
) -> Result<Exercise, ExerciseError> {
    let mut exercise = get_exercise(conn, id)?;
    let previous_sets = exercise.sets;

    if let Some(name) = patch.name {
        exercise.name = name.trim().to_string();
    }
    if let Some(category) = patch.category {
        exercise.category = category;
    }
    if let Some(difficulty) = patch.difficulty {
        exercise.difficulty = difficulty;
    }
    if let Some(duration) = patch.duration {
        exercise.duration = duration.trim().to_string();
    }
    if let Some(seconds) = patch.duration_seconds {
        exercise.duration_seconds = seconds;
    }
    if let Some(sets) = patch.sets {
        exercise.sets = sets;
    }
    if let Some(reps) = patch.reps {
        exercise.reps = reps;
    }
    if let Some(description) = patch.description {
        exercise.description = description.trim().to_string();
    }
    if let Some(instructions) = patch.instructions {
        exercise.instructions = clean_instructions(instructions);
    }
    validate_exercise(&exercise)?;

    if exercise.sets < previous_sets {
        let recorded = repository::max_completed_sets_for_exercise(conn, id)?;
        if exercise.sets < recorded {
            tracing::warn!(
                exercise_id = %id,
                requested = exercise.sets,
                recorded,
                "Rejected set reduction below recorded progress"
            );
            return Err(ExerciseError::Conflict(format!(
                "cannot reduce sets to {} while an assignment has {} completed sets",
                exercise.sets, recorded
            )));
        }
    }

    exercise.last_modified = clock.now();
    repository::update_exercise(conn, &exercise)?;

    if exercise.sets < previous_sets {
        let completed = repository::complete_assignments_at_target(conn, id, exercise.sets)?;
        if completed > 0 {
            tracing::info!(exercise_id = %id, completed, "Assignments completed by set reduction");
        }
    }

    tracing::info!(exercise_id = %id, "Exercise updated");
    Ok(exercise)
}

/// Deletes the exercise and every assignment that references it.
pub fn delete_exercise(conn: &Connection, id: &Uuid) -> Result<DeleteOutcome, ExerciseError> {
    // Existence first so an unknown id never reports a cascade.
    get_exercise(conn, id)?;
    let cascaded = repository::delete_assignments_for_exercise(conn, id)?;
    repository::delete_exercise(conn, id)?;

    tracing::info!(exercise_id = %id, cascaded, "Exercise deleted");
    Ok(DeleteOutcome {
        exercise_id: *id,
        cascaded_assignments: cascaded,
    })
}

pub fn list_exercises(
    conn: &Connection,
    filter: &ExerciseFilter,
) -> Result<ExerciseListing, ExerciseError> {
    let exercises = repository::list_exercises(conn, filter.category)?;
    Ok(ExerciseListing::new(exercises, filter.search.as_deref()))
}

pub fn exercise_stats(conn: &Connection, id: &Uuid) -> Result<ExerciseStats, ExerciseError> {
    get_exercise(conn, id)?;
    let filter = AssignmentFilter {
        exercise_id: Some(*id),
        ..AssignmentFilter::default()
    };
    let details = repository::list_assignment_details(conn, &filter)?;

    let mut patients: Vec<String> = Vec::new();
    for detail in &details {
        if !patients.contains(&detail.assignment.patient_id) {
            patients.push(detail.assignment.patient_id.clone());
        }
    }

    let average_completion_rate = if details.is_empty() {
        None
    } else {
        let total: u32 = details
            .iter()
            .map(|d| AssignmentProgress::from(d).completion_rate() as u32)
            .sum();
        Some((total as f64 / details.len() as f64).round() as u8)
    };

    Ok(ExerciseStats {
        exercise_id: *id,
        assignment_count: details.len(),
        patients,
        average_completion_rate,
    })
}
