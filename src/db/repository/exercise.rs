use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const EXERCISE_COLUMNS: &str = "id, name, category, difficulty, duration, duration_seconds,
     sets, reps, description, instructions, created_by, last_modified";

type ExerciseRow = (
    String, String, String, String, String, Option<u32>,
    u32, u32, String, String, String, String,
);

fn read_exercise_row(row: &Row<'_>) -> rusqlite::Result<ExerciseRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn exercise_from_row(raw: ExerciseRow) -> Result<Exercise, DatabaseError> {
    let (
        id, name, category, difficulty, duration, duration_seconds,
        sets, reps, description, instructions, created_by, last_modified,
    ) = raw;
    Ok(Exercise {
        id: parse_uuid(&id)?,
        name,
        category: ExerciseCategory::from_str(&category)?,
        difficulty: Difficulty::from_str(&difficulty)?,
        duration,
        duration_seconds,
        sets,
        reps,
        description,
        instructions: serde_json::from_str(&instructions)
            .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid instructions: {e}")))?,
        created_by,
        last_modified: parse_datetime(&last_modified)?,
    })
}

fn instructions_json(exercise: &Exercise) -> Result<String, DatabaseError> {
    serde_json::to_string(&exercise.instructions)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub fn insert_exercise(conn: &Connection, exercise: &Exercise) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO exercises (id, name, category, difficulty, duration, duration_seconds,
         sets, reps, description, instructions, created_by, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            exercise.id.to_string(),
            exercise.name,
            exercise.category.as_str(),
            exercise.difficulty.as_str(),
            exercise.duration,
            exercise.duration_seconds,
            exercise.sets,
            exercise.reps,
            exercise.description,
            instructions_json(exercise)?,
            exercise.created_by,
            format_datetime(&exercise.last_modified),
        ],
    )?;
    Ok(())
}

pub fn get_exercise(conn: &Connection, id: &Uuid) -> Result<Option<Exercise>, DatabaseError> {
    let raw = conn
        .query_row(
            &format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE id = ?1"),
            params![id.to_string()],
            read_exercise_row,
        )
        .optional()?;
    raw.map(exercise_from_row).transpose()
}

/// Overwrites every mutable column of an existing exercise.
pub fn update_exercise(conn: &Connection, exercise: &Exercise) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE exercises SET name = ?2, category = ?3, difficulty = ?4, duration = ?5,
         duration_seconds = ?6, sets = ?7, reps = ?8, description = ?9, instructions = ?10,
         last_modified = ?11
         WHERE id = ?1",
        params![
            exercise.id.to_string(),
            exercise.name,
            exercise.category.as_str(),
            exercise.difficulty.as_str(),
            exercise.duration,
            exercise.duration_seconds,
            exercise.sets,
            exercise.reps,
            exercise.description,
            instructions_json(exercise)?,
            format_datetime(&exercise.last_modified),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Exercise".into(),
            id: exercise.id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_exercise(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM exercises WHERE id = ?1",
        params![id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Exercise".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Most recently modified first. Ties fall back to insertion order, newest first.
pub fn list_exercises(
    conn: &Connection,
    category: Option<ExerciseCategory>,
) -> Result<Vec<Exercise>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXERCISE_COLUMNS} FROM exercises
         WHERE (?1 IS NULL OR category = ?1)
         ORDER BY last_modified DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![category.map(|c| c.as_str())], read_exercise_row)?;

    let mut exercises = Vec::new();
    for row in rows {
        exercises.push(exercise_from_row(row?)?);
    }
    Ok(exercises)
}
