//! Assignment store: one exercise prescribed to one patient.
//!
//! State machine: `pending` → `in_progress` → `completed` (terminal).
//! `overdue` is derived on read by `effective_status` and never stored, so
//! a late assignment can still be completed.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adherence::AssignmentProgress;
use crate::clock::Clock;
use crate::db::repository;
use crate::error::ExerciseError;
use crate::models::enums::{AssignmentStatus, EffectiveStatus};
use crate::models::{Assignment, AssignmentDetail, AssignmentFilter, ExerciseSummary};

/// Attempts at the compare-and-swap increment before giving up.
const MAX_CAS_ATTEMPTS: usize = 5;

// ═══════════════════════════════════════════
// Input / view types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub exercise_id: Uuid,
    pub patient_id: String,
    pub clinician_id: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

/// An assignment as callers see it: overdue rule applied, rate computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub exercise: ExerciseSummary,
    pub effective_status: EffectiveStatus,
    pub completion_rate: u8,
}

impl AssignmentView {
    pub fn from_detail(detail: AssignmentDetail, as_of: NaiveDate) -> Self {
        let effective_status = effective_status(&detail.assignment, as_of);
        let completion_rate = AssignmentProgress::from(&detail).completion_rate();
        Self {
            assignment: detail.assignment,
            exercise: detail.exercise,
            effective_status,
            completion_rate,
        }
    }
}

/// Result of recording one set.
#[derive(Debug, Clone)]
pub struct SetCompletion {
    pub detail: AssignmentDetail,
    /// True only on the call that moved the assignment to `completed`.
    pub just_completed: bool,
}

// ═══════════════════════════════════════════
// Pure rules
// ═══════════════════════════════════════════

/// `Overdue` when the due date is before `as_of` and the assignment is not
/// completed; the stored status otherwise.
pub fn effective_status(assignment: &Assignment, as_of: NaiveDate) -> EffectiveStatus {
    if assignment.status != AssignmentStatus::Completed && assignment.due_date < as_of {
        return EffectiveStatus::Overdue;
    }
    assignment.status.into()
}

fn next_status(completed_sets: u32, prescribed_sets: u32) -> AssignmentStatus {
    if completed_sets >= prescribed_sets {
        AssignmentStatus::Completed
    } else if completed_sets > 0 {
        AssignmentStatus::InProgress
    } else {
        AssignmentStatus::Pending
    }
}

fn require_id(field: &str, value: &str) -> Result<(), ExerciseError> {
    if value.trim().is_empty() {
        return Err(ExerciseError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════

/// Creates a `pending` assignment dated today and registers the patient.
pub fn assign(
    conn: &Connection,
    clock: &dyn Clock,
    request: AssignmentRequest,
) -> Result<AssignmentDetail, ExerciseError> {
    let exercise = repository::get_exercise(conn, &request.exercise_id)?
        .ok_or_else(|| ExerciseError::not_found("Exercise", request.exercise_id))?;

    require_id("patient_id", &request.patient_id)?;
    require_id("clinician_id", &request.clinician_id)?;

    let today = clock.today();
    if request.due_date < today {
        return Err(ExerciseError::Validation(format!(
            "due date {} is before today ({today})",
            request.due_date
        )));
    }

    let assignment = Assignment {
        id: Uuid::new_v4(),
        exercise_id: exercise.id,
        patient_id: request.patient_id.trim().to_string(),
        clinician_id: request.clinician_id.trim().to_string(),
        assigned_date: today,
        due_date: request.due_date,
        status: AssignmentStatus::Pending,
        completed_sets: 0,
        last_completed_at: None,
        notes: request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
    };

    repository::register_patient(conn, &assignment.patient_id, &clock.now())?;
    repository::insert_assignment(conn, &assignment)?;

    tracing::info!(
        assignment_id = %assignment.id,
        exercise_id = %exercise.id,
        patient_id = %assignment.patient_id,
        due_date = %assignment.due_date,
        "Exercise assigned"
    );

    Ok(AssignmentDetail {
        exercise: ExerciseSummary::from(&exercise),
        assignment,
    })
}

pub fn get_assignment(conn: &Connection, id: &Uuid) -> Result<AssignmentDetail, ExerciseError> {
    repository::get_assignment_detail(conn, id)?
        .ok_or_else(|| ExerciseError::not_found("Assignment", id))
}

pub fn list_assignments(
    conn: &Connection,
    filter: &AssignmentFilter,
) -> Result<Vec<AssignmentDetail>, ExerciseError> {
    Ok(repository::list_assignment_details(conn, filter)?)
}

/// Records exactly one completed set.
///
/// The increment is a compare-and-swap on the stored counter, so concurrent
/// writers can never push it past the prescribed sets. Run inside an
/// immediate transaction when the connection is shared.
pub fn record_set_completion(
    conn: &Connection,
    clock: &dyn Clock,
    id: &Uuid,
) -> Result<SetCompletion, ExerciseError> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let mut detail = get_assignment(conn, id)?;
        let current = detail.assignment.completed_sets;
        let prescribed = detail.exercise.sets;

        if detail.assignment.status == AssignmentStatus::Completed || current >= prescribed {
            tracing::warn!(assignment_id = %id, "Set recorded on a completed assignment");
            return Err(ExerciseError::InvalidState(format!(
                "assignment {id} is already completed"
            )));
        }

        let completed_sets = current + 1;
        let status = next_status(completed_sets, prescribed);
        let now = clock.now();

        if repository::advance_completed_sets(conn, id, current, prescribed, status, &now)? {
            detail.assignment.completed_sets = completed_sets;
            detail.assignment.status = status;
            detail.assignment.last_completed_at = Some(now);

            let just_completed = status == AssignmentStatus::Completed;
            tracing::info!(
                assignment_id = %id,
                completed_sets,
                prescribed,
                just_completed,
                "Set completed"
            );
            return Ok(SetCompletion {
                detail,
                just_completed,
            });
        }

        tracing::debug!(assignment_id = %id, attempt, "Set counter moved underneath us, retrying");
    }

    Err(ExerciseError::Conflict(format!(
        "assignment {id} is being updated concurrently, try again"
    )))
}

/// Removes an assignment. The exercise is untouched.
pub fn unassign(conn: &Connection, id: &Uuid) -> Result<(), ExerciseError> {
    repository::delete_assignment(conn, id)?;
    tracing::info!(assignment_id = %id, "Assignment removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{create_exercise, ExerciseDefinition};
    use crate::clock::FixedClock;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{Difficulty, ExerciseCategory};
    use chrono::Duration;
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn seed_exercise(conn: &Connection, clock: &FixedClock, sets: u32) -> Uuid {
        create_exercise(
            conn,
            clock,
            ExerciseDefinition {
                name: "Ankle Circles".into(),
                category: ExerciseCategory::Mobility,
                difficulty: Difficulty::Beginner,
                duration: "1 minute".into(),
                duration_seconds: Some(60),
                sets,
                reps: 20,
                description: "Improve ankle mobility and circulation".into(),
                instructions: vec!["Sit comfortably".into()],
            },
            "dr-smith",
        )
        .unwrap()
        .id
    }

    fn request(exercise_id: Uuid, due: NaiveDate) -> AssignmentRequest {
        AssignmentRequest {
            exercise_id,
            patient_id: "p1".into(),
            clinician_id: "dr-smith".into(),
            due_date: due,
            notes: Some("Great for morning routine".into()),
        }
    }

    fn stored(status: AssignmentStatus, due: NaiveDate) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            exercise_id: Uuid::new_v4(),
            patient_id: "p1".into(),
            clinician_id: "dr-smith".into(),
            assigned_date: day(1),
            due_date: due,
            status,
            completed_sets: 0,
            last_completed_at: None,
            notes: None,
        }
    }

    #[test]
    fn assign_creates_pending_assignment() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 2);

        let detail = assign(&conn, &clock, request(exercise_id, day(15))).unwrap();
        assert_eq!(detail.assignment.status, AssignmentStatus::Pending);
        assert_eq!(detail.assignment.completed_sets, 0);
        assert_eq!(detail.assignment.assigned_date, day(15));
        assert_eq!(detail.assignment.last_completed_at, None);
        assert!(repository::patient_exists(&conn, "p1").unwrap());
        assert_eq!(get_assignment(&conn, &detail.assignment.id).unwrap(), detail);
    }

    #[test]
    fn assign_unknown_exercise_is_not_found() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let result = assign(&conn, &clock, request(Uuid::new_v4(), day(16)));
        assert!(matches!(result, Err(ExerciseError::NotFound { .. })));
        assert!(!repository::patient_exists(&conn, "p1").unwrap());
    }

    #[test]
    fn assign_in_the_past_is_rejected() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 2);
        let result = assign(&conn, &clock, request(exercise_id, day(14)));
        assert!(matches!(result, Err(ExerciseError::Validation(_))));
        assert!(list_assignments(&conn, &AssignmentFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn assign_requires_patient_and_clinician() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 2);

        let mut blank_patient = request(exercise_id, day(15));
        blank_patient.patient_id = " ".into();
        assert!(matches!(
            assign(&conn, &clock, blank_patient),
            Err(ExerciseError::Validation(_))
        ));

        let mut blank_clinician = request(exercise_id, day(15));
        blank_clinician.clinician_id = String::new();
        assert!(matches!(
            assign(&conn, &clock, blank_clinician),
            Err(ExerciseError::Validation(_))
        ));
    }

    #[test]
    fn sets_advance_through_state_machine() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 3);
        let id = assign(&conn, &clock, request(exercise_id, day(15))).unwrap().assignment.id;

        let first = record_set_completion(&conn, &clock, &id).unwrap();
        assert_eq!(first.detail.assignment.status, AssignmentStatus::InProgress);
        assert_eq!(first.detail.assignment.completed_sets, 1);
        assert!(!first.just_completed);

        clock.advance(Duration::minutes(3));
        record_set_completion(&conn, &clock, &id).unwrap();
        let last = record_set_completion(&conn, &clock, &id).unwrap();
        assert_eq!(last.detail.assignment.status, AssignmentStatus::Completed);
        assert_eq!(last.detail.assignment.completed_sets, 3);
        assert_eq!(last.detail.assignment.last_completed_at, Some(clock.now()));
        assert!(last.just_completed);

        assert_eq!(get_assignment(&conn, &id).unwrap(), last.detail);
    }

    #[test]
    fn completed_assignment_rejects_more_sets() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 2);
        let id = assign(&conn, &clock, request(exercise_id, day(15))).unwrap().assignment.id;

        record_set_completion(&conn, &clock, &id).unwrap();
        record_set_completion(&conn, &clock, &id).unwrap();
        assert!(matches!(
            record_set_completion(&conn, &clock, &id),
            Err(ExerciseError::InvalidState(_))
        ));
        assert_eq!(get_assignment(&conn, &id).unwrap().assignment.completed_sets, 2);
    }

    #[test]
    fn record_on_unknown_assignment_is_not_found() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        assert!(matches!(
            record_set_completion(&conn, &clock, &Uuid::new_v4()),
            Err(ExerciseError::NotFound { .. })
        ));
    }

    #[test]
    fn late_completion_is_still_accepted() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 1);
        let id = assign(&conn, &clock, request(exercise_id, day(15))).unwrap().assignment.id;

        clock.advance(Duration::days(3));
        let late = record_set_completion(&conn, &clock, &id).unwrap();
        assert_eq!(late.detail.assignment.status, AssignmentStatus::Completed);
        assert_eq!(
            effective_status(&late.detail.assignment, clock.today()),
            EffectiveStatus::Completed
        );
    }

    #[test]
    fn effective_status_overdue_rule() {
        let due = day(10);
        for status in [AssignmentStatus::Pending, AssignmentStatus::InProgress] {
            let a = stored(status, due);
            assert_eq!(effective_status(&a, day(9)), status.into());
            assert_eq!(effective_status(&a, day(10)), status.into());
            assert_eq!(effective_status(&a, day(11)), EffectiveStatus::Overdue);
        }
        let done = stored(AssignmentStatus::Completed, due);
        assert_eq!(effective_status(&done, day(30)), EffectiveStatus::Completed);
    }

    #[test]
    fn unassign_removes_only_the_assignment() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 2);
        let id = assign(&conn, &clock, request(exercise_id, day(15))).unwrap().assignment.id;

        unassign(&conn, &id).unwrap();
        assert!(matches!(get_assignment(&conn, &id), Err(ExerciseError::NotFound { .. })));
        assert!(repository::get_exercise(&conn, &exercise_id).unwrap().is_some());
        assert!(matches!(unassign(&conn, &id), Err(ExerciseError::NotFound { .. })));
    }

    #[test]
    fn view_applies_overdue_and_rate() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::on(day(15));
        let exercise_id = seed_exercise(&conn, &clock, 4);
        let id = assign(&conn, &clock, request(exercise_id, day(15))).unwrap().assignment.id;
        let detail = record_set_completion(&conn, &clock, &id).unwrap().detail;

        let view = AssignmentView::from_detail(detail, day(16));
        assert_eq!(view.effective_status, EffectiveStatus::Overdue);
        assert_eq!(view.assignment.status, AssignmentStatus::InProgress);
        assert_eq!(view.completion_rate, 25);
    }

    /// Random interleavings of completions across several assignments never
    /// push a counter outside `0..=prescribed`.
    #[test]
    fn counters_stay_within_prescription_under_random_interleavings() {
        let mut rng = rand::thread_rng();
        for _round in 0..20 {
            let conn = open_memory_database().unwrap();
            let clock = FixedClock::on(day(15));

            let mut targets = Vec::new();
            for _ in 0..4 {
                let sets = rng.gen_range(1..=5);
                let exercise_id = seed_exercise(&conn, &clock, sets);
                let id = assign(&conn, &clock, request(exercise_id, day(20)))
                    .unwrap()
                    .assignment
                    .id;
                targets.push((id, sets));
            }

            let mut calls: Vec<(Uuid, u32)> = targets
                .iter()
                .flat_map(|&(id, sets)| std::iter::repeat((id, sets)).take(sets as usize + 3))
                .collect();
            calls.shuffle(&mut rng);

            for (id, sets) in calls {
                let before = get_assignment(&conn, &id).unwrap().assignment.completed_sets;
                let result = record_set_completion(&conn, &clock, &id);
                let after = get_assignment(&conn, &id).unwrap().assignment;

                assert!(after.completed_sets <= sets);
                match result {
                    Ok(done) => {
                        assert_eq!(after.completed_sets, before + 1);
                        assert_eq!(done.just_completed, after.completed_sets == sets);
                    }
                    Err(ExerciseError::InvalidState(_)) => {
                        assert_eq!(before, sets);
                        assert_eq!(after.status, AssignmentStatus::Completed);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }

            for (id, sets) in targets {
                let final_state = get_assignment(&conn, &id).unwrap().assignment;
                assert_eq!(final_state.completed_sets, sets);
                assert_eq!(final_state.status, AssignmentStatus::Completed);
            }
        }
    }

    /// Separate connections to one database file racing on one assignment.
    #[test]
    fn concurrent_connections_cannot_overshoot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let clock = FixedClock::on(day(15));

        let id = {
            let conn = crate::db::sqlite::open_database(&path).unwrap();
            let exercise_id = seed_exercise(&conn, &clock, 3);
            assign(&conn, &clock, request(exercise_id, day(15))).unwrap().assignment.id
        };

        let clock = std::sync::Arc::new(clock);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let clock = clock.clone();
                std::thread::spawn(move || {
                    let mut conn = crate::db::sqlite::open_database(&path).unwrap();
                    let tx = conn
                        .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
                        .unwrap();
                    let result = record_set_completion(&tx, clock.as_ref(), &id);
                    tx.commit().unwrap();
                    result.is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 3);

        let conn = crate::db::sqlite::open_database(&path).unwrap();
        let final_state = get_assignment(&conn, &id).unwrap().assignment;
        assert_eq!(final_state.completed_sets, 3);
        assert_eq!(final_state.status, AssignmentStatus::Completed);
    }
}
