use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_date, format_datetime, parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const DETAIL_SELECT: &str = "SELECT a.id, a.exercise_id, a.patient_id, a.clinician_id,
            a.assigned_date, a.due_date, a.status, a.completed_sets,
            a.last_completed_at, a.notes,
            e.name, e.category, e.difficulty, e.duration, e.sets, e.reps
     FROM assignments a
     JOIN exercises e ON a.exercise_id = e.id";

type AssignmentRow = (
    String, String, String, String,
    String, String, String, u32,
    Option<String>, Option<String>,
);

type ExerciseSummaryRow = (String, String, String, String, u32, u32);

fn read_assignment_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRow> {
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
    ))
}

fn read_detail_row(row: &Row<'_>) -> rusqlite::Result<(AssignmentRow, ExerciseSummaryRow)> {
    Ok((
        read_assignment_row(row)?,
        (
            row.get(10)?,
            row.get(11)?,
            row.get(12)?,
            row.get(13)?,
            row.get(14)?,
            row.get(15)?,
        ),
    ))
}

fn assignment_from_row(raw: AssignmentRow) -> Result<Assignment, DatabaseError> {
    let (
        id, exercise_id, patient_id, clinician_id,
        assigned_date, due_date, status, completed_sets,
        last_completed_at, notes,
    ) = raw;
    Ok(Assignment {
        id: parse_uuid(&id)?,
        exercise_id: parse_uuid(&exercise_id)?,
        patient_id,
        clinician_id,
        assigned_date: parse_date(&assigned_date)?,
        due_date: parse_date(&due_date)?,
        status: AssignmentStatus::from_str(&status)?,
        completed_sets,
        last_completed_at: last_completed_at.as_deref().map(parse_datetime).transpose()?,
        notes,
    })
}

fn detail_from_row(
    raw: (AssignmentRow, ExerciseSummaryRow),
) -> Result<AssignmentDetail, DatabaseError> {
    let (assignment_raw, (name, category, difficulty, duration, sets, reps)) = raw;
    let assignment = assignment_from_row(assignment_raw)?;
    Ok(AssignmentDetail {
        exercise: ExerciseSummary {
            id: assignment.exercise_id,
            name,
            category: ExerciseCategory::from_str(&category)?,
            difficulty: Difficulty::from_str(&difficulty)?,
            duration,
            sets,
            reps,
        },
        assignment,
    })
}

pub fn insert_assignment(conn: &Connection, assignment: &Assignment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO assignments (id, exercise_id, patient_id, clinician_id, assigned_date,
         due_date, status, completed_sets, last_completed_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            assignment.id.to_string(),
            assignment.exercise_id.to_string(),
            assignment.patient_id,
            assignment.clinician_id,
            format_date(&assignment.assigned_date),
            format_date(&assignment.due_date),
            assignment.status.as_str(),
            assignment.completed_sets,
            assignment.last_completed_at.as_ref().map(format_datetime),
            assignment.notes,
        ],
    )?;
    Ok(())
}

pub fn get_assignment_detail(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<AssignmentDetail>, DatabaseError> {
    let raw = conn
        .query_row(
            &format!("{DETAIL_SELECT} WHERE a.id = ?1"),
            params![id.to_string()],
            read_detail_row,
        )
        .optional()?;
    raw.map(detail_from_row).transpose()
}

/// Assignments joined with their exercise, ordered by due date then exercise name.
pub fn list_assignment_details(
    conn: &Connection,
    filter: &AssignmentFilter,
) -> Result<Vec<AssignmentDetail>, DatabaseError> {
    let mut sql = format!("{DETAIL_SELECT} WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref patient_id) = filter.patient_id {
        params_vec.push(Box::new(patient_id.clone()));
        sql.push_str(&format!(" AND a.patient_id = ?{}", params_vec.len()));
    }
    if let Some(exercise_id) = filter.exercise_id {
        params_vec.push(Box::new(exercise_id.to_string()));
        sql.push_str(&format!(" AND a.exercise_id = ?{}", params_vec.len()));
    }
    if let Some(status) = filter.status {
        params_vec.push(Box::new(status.as_str()));
        sql.push_str(&format!(" AND a.status = ?{}", params_vec.len()));
    }
    if let Some(ref from) = filter.due_from {
        params_vec.push(Box::new(format_date(from)));
        sql.push_str(&format!(" AND a.due_date >= ?{}", params_vec.len()));
    }
    if let Some(ref to) = filter.due_to {
        params_vec.push(Box::new(format_date(to)));
        sql.push_str(&format!(" AND a.due_date <= ?{}", params_vec.len()));
    }

    sql.push_str(" ORDER BY a.due_date ASC, e.name ASC, a.rowid ASC");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), read_detail_row)?;

    let mut details = Vec::new();
    for row in rows {
        details.push(detail_from_row(row?)?);
    }
    Ok(details)
}

pub fn delete_assignment(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM assignments WHERE id = ?1",
        params![id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Assignment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Removes every assignment referencing the exercise. Returns how many went.
pub fn delete_assignments_for_exercise(
    conn: &Connection,
    exercise_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM assignments WHERE exercise_id = ?1",
        params![exercise_id.to_string()],
    )?;
    Ok(deleted)
}

/// Highest completed-set counter across the exercise's assignments (0 when none).
pub fn max_completed_sets_for_exercise(
    conn: &Connection,
    exercise_id: &Uuid,
) -> Result<u32, DatabaseError> {
    let max = conn.query_row(
        "SELECT COALESCE(MAX(completed_sets), 0) FROM assignments WHERE exercise_id = ?1",
        params![exercise_id.to_string()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(max)
}

/// Compare-and-swap increment of the completed-set counter.
///
/// Succeeds only while the stored counter still equals `expected` and is
/// below `prescribed`. Returns `false` when another writer got there first.
pub fn advance_completed_sets(
    conn: &Connection,
    id: &Uuid,
    expected: u32,
    prescribed: u32,
    next_status: AssignmentStatus,
    completed_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE assignments
         SET completed_sets = completed_sets + 1, status = ?4, last_completed_at = ?5
         WHERE id = ?1 AND completed_sets = ?2 AND completed_sets < ?3
           AND status != 'completed'",
        params![
            id.to_string(),
            expected,
            prescribed,
            next_status.as_str(),
            format_datetime(completed_at),
        ],
    )?;
    Ok(updated == 1)
}

/// Marks open assignments whose counter already meets `sets` as completed.
/// Used when an exercise's prescription shrinks onto recorded progress.
pub fn complete_assignments_at_target(
    conn: &Connection,
    exercise_id: &Uuid,
    sets: u32,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE assignments SET status = 'completed'
         WHERE exercise_id = ?1 AND status != 'completed' AND completed_sets >= ?2",
        params![exercise_id.to_string(), sets],
    )?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_exercise;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn seed_exercise(conn: &Connection, name: &str, sets: u32) -> Uuid {
        let exercise = Exercise {
            id: Uuid::new_v4(),
            name: name.into(),
            category: ExerciseCategory::Mobility,
            difficulty: Difficulty::Beginner,
            duration: "1 minute".into(),
            duration_seconds: None,
            sets,
            reps: 20,
            description: String::new(),
            instructions: Vec::new(),
            created_by: "dr-smith".into(),
            last_modified: day(10).and_hms_opt(9, 0, 0).unwrap(),
        };
        insert_exercise(conn, &exercise).unwrap();
        exercise.id
    }

    fn seed_assignment(conn: &Connection, exercise_id: Uuid, patient: &str, due: u32) -> Uuid {
        let assignment = Assignment {
            id: Uuid::new_v4(),
            exercise_id,
            patient_id: patient.into(),
            clinician_id: "dr-smith".into(),
            assigned_date: day(10),
            due_date: day(due),
            status: AssignmentStatus::Pending,
            completed_sets: 0,
            last_completed_at: None,
            notes: Some("Stop if pain increases".into()),
        };
        insert_assignment(conn, &assignment).unwrap();
        assignment.id
    }

    #[test]
    fn insert_and_fetch_detail() {
        let conn = open_memory_database().unwrap();
        let exercise_id = seed_exercise(&conn, "Ankle Circles", 2);
        let id = seed_assignment(&conn, exercise_id, "p1", 15);

        let detail = get_assignment_detail(&conn, &id).unwrap().unwrap();
        assert_eq!(detail.assignment.patient_id, "p1");
        assert_eq!(detail.assignment.status, AssignmentStatus::Pending);
        assert_eq!(detail.exercise.name, "Ankle Circles");
        assert_eq!(detail.exercise.sets, 2);
    }

    #[test]
    fn foreign_key_rejects_unknown_exercise() {
        let conn = open_memory_database().unwrap();
        let assignment = Assignment {
            id: Uuid::new_v4(),
            exercise_id: Uuid::new_v4(),
            patient_id: "p1".into(),
            clinician_id: "dr-smith".into(),
            assigned_date: day(10),
            due_date: day(12),
            status: AssignmentStatus::Pending,
            completed_sets: 0,
            last_completed_at: None,
            notes: None,
        };
        assert!(insert_assignment(&conn, &assignment).is_err());
    }

    #[test]
    fn list_filters_by_patient_and_due_range() {
        let conn = open_memory_database().unwrap();
        let exercise_id = seed_exercise(&conn, "Knee Flexion Stretch", 3);
        seed_assignment(&conn, exercise_id, "p1", 12);
        seed_assignment(&conn, exercise_id, "p1", 15);
        seed_assignment(&conn, exercise_id, "p2", 15);

        let p1 = list_assignment_details(&conn, &AssignmentFilter::for_patient("p1")).unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0].assignment.due_date, day(12));

        let filter = AssignmentFilter::for_patient("p1").due_between(day(15), day(15));
        let due_15 = list_assignment_details(&conn, &filter).unwrap();
        assert_eq!(due_15.len(), 1);

        let filter = AssignmentFilter {
            status: Some(AssignmentStatus::Completed),
            ..AssignmentFilter::default()
        };
        assert!(list_assignment_details(&conn, &filter).unwrap().is_empty());
    }

    #[test]
    fn advance_is_compare_and_swap() {
        let conn = open_memory_database().unwrap();
        let exercise_id = seed_exercise(&conn, "Ankle Circles", 2);
        let id = seed_assignment(&conn, exercise_id, "p1", 15);
        let at = day(15).and_hms_opt(8, 0, 0).unwrap();

        assert!(advance_completed_sets(&conn, &id, 0, 2, AssignmentStatus::InProgress, &at).unwrap());
        // Stale expectation loses
        assert!(!advance_completed_sets(&conn, &id, 0, 2, AssignmentStatus::InProgress, &at).unwrap());
        assert!(advance_completed_sets(&conn, &id, 1, 2, AssignmentStatus::Completed, &at).unwrap());
        // Counter at the prescription cannot move
        assert!(!advance_completed_sets(&conn, &id, 2, 2, AssignmentStatus::Completed, &at).unwrap());

        let detail = get_assignment_detail(&conn, &id).unwrap().unwrap();
        assert_eq!(detail.assignment.completed_sets, 2);
        assert_eq!(detail.assignment.status, AssignmentStatus::Completed);
        assert_eq!(detail.assignment.last_completed_at, Some(at));
    }

    #[test]
    fn delete_for_exercise_counts_rows() {
        let conn = open_memory_database().unwrap();
        let exercise_id = seed_exercise(&conn, "Ankle Circles", 2);
        let other_id = seed_exercise(&conn, "Wall Push-up", 2);
        seed_assignment(&conn, exercise_id, "p1", 15);
        seed_assignment(&conn, exercise_id, "p2", 15);
        seed_assignment(&conn, other_id, "p1", 15);

        assert_eq!(delete_assignments_for_exercise(&conn, &exercise_id).unwrap(), 2);
        assert_eq!(
            list_assignment_details(&conn, &AssignmentFilter::default()).unwrap().len(),
            1
        );
    }

    #[test]
    fn max_completed_sets_defaults_to_zero() {
        let conn = open_memory_database().unwrap();
        let exercise_id = seed_exercise(&conn, "Ankle Circles", 3);
        assert_eq!(max_completed_sets_for_exercise(&conn, &exercise_id).unwrap(), 0);

        let id = seed_assignment(&conn, exercise_id, "p1", 15);
        let at = day(15).and_hms_opt(8, 0, 0).unwrap();
        advance_completed_sets(&conn, &id, 0, 3, AssignmentStatus::InProgress, &at).unwrap();
        assert_eq!(max_completed_sets_for_exercise(&conn, &exercise_id).unwrap(), 1);
    }

    #[test]
    fn delete_unknown_assignment_returns_not_found() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            delete_assignment(&conn, &Uuid::new_v4()),
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
