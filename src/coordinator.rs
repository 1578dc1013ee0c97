//! Assignment lifecycle coordinator.
//!
//! `ExerciseService` is the one entry point the hosting layer talks to. It
//! owns the SQLite connection behind a mutex, wraps every mutation in a
//! transaction, and stitches the catalog, the assignment store and the
//! adherence engine together. Shared across handlers as
//! `Arc<ExerciseService>`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adherence::{self, AdherenceSnapshot, AssignmentProgress};
use crate::assignments::{self, AssignmentRequest, AssignmentView};
use crate::catalog::{
    self, DeleteOutcome, ExerciseDefinition, ExerciseListing, ExercisePatch, ExerciseStats,
};
use crate::clock::Clock;
use crate::config::AdherenceSettings;
use crate::db::{self, repository};
use crate::error::ExerciseError;
use crate::models::enums::{AssignmentStatus, EffectiveStatus};
use crate::models::{AssignmentDetail, AssignmentFilter, Exercise, ExerciseFilter};

// ═══════════════════════════════════════════
// Result types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteSetOutcome {
    pub assignment: AssignmentView,
    pub just_completed: bool,
    /// Present only on the call that completed the assignment.
    pub adherence: Option<AdherenceSnapshot>,
}

/// Everything due for one patient on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyView {
    pub patient_id: String,
    pub date: NaiveDate,
    pub assignments: Vec<AssignmentView>,
    pub due_count: u32,
    pub completed_count: u32,
    pub completion_percentage: u8,
}

/// A patient's assignments bucketed the way the patient app shows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePlan {
    pub patient_id: String,
    pub as_of: NaiveDate,
    pub today: Vec<AssignmentView>,
    pub upcoming: Vec<AssignmentView>,
    pub overdue: Vec<AssignmentView>,
    pub completed: Vec<AssignmentView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientAdherence {
    pub patient_id: String,
    #[serde(flatten)]
    pub snapshot: AdherenceSnapshot,
}

// ═══════════════════════════════════════════
// ExerciseService
// ═══════════════════════════════════════════

pub struct ExerciseService {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    adherence: AdherenceSettings,
}

impl ExerciseService {
    pub fn new(conn: Connection, clock: Arc<dyn Clock>, adherence: AdherenceSettings) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock,
            adherence,
        }
    }

    /// Opens (creating and migrating if needed) the database at `path`.
    pub fn open(
        path: &Path,
        clock: Arc<dyn Clock>,
        adherence: AdherenceSettings,
    ) -> Result<Self, ExerciseError> {
        let conn = db::open_database(path)?;
        tracing::info!(path = %path.display(), "Exercise database opened");
        Ok(Self::new(conn, clock, adherence))
    }

    /// Fresh in-memory database with default adherence settings.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, ExerciseError> {
        let conn = db::open_memory_database()?;
        Ok(Self::new(conn, clock, AdherenceSettings::default()))
    }

    /// Today according to the service clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ── Connection access ───────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ExerciseError> {
        self.conn.lock().map_err(|_| ExerciseError::LockPoisoned)
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, ExerciseError>,
    ) -> Result<T, ExerciseError> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` in one transaction. Any error rolls the whole thing back.
    fn write<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Connection) -> Result<T, ExerciseError>,
    ) -> Result<T, ExerciseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn view(&self, detail: AssignmentDetail) -> AssignmentView {
        AssignmentView::from_detail(detail, self.clock.today())
    }

    fn require_patient(conn: &Connection, patient_id: &str) -> Result<(), ExerciseError> {
        if !repository::patient_exists(conn, patient_id)? {
            return Err(ExerciseError::not_found("Patient", patient_id));
        }
        Ok(())
    }

    fn patient_snapshot(
        &self,
        conn: &Connection,
        patient_id: &str,
    ) -> Result<AdherenceSnapshot, ExerciseError> {
        let details =
            repository::list_assignment_details(conn, &AssignmentFilter::for_patient(patient_id))?;
        let progress: Vec<AssignmentProgress> =
            details.iter().map(AssignmentProgress::from).collect();
        Ok(adherence::snapshot(
            &progress,
            self.clock.today(),
            self.adherence.window_days,
            self.adherence.streak_lookback_days,
        ))
    }

    // ── Catalog ─────────────────────────────────────────────

    pub fn create_exercise(
        &self,
        definition: ExerciseDefinition,
        created_by: &str,
    ) -> Result<Exercise, ExerciseError> {
        self.write(TransactionBehavior::Deferred, |conn| {
            catalog::create_exercise(conn, self.clock.as_ref(), definition, created_by)
        })
    }

    pub fn update_exercise(
        &self,
        id: &Uuid,
        patch: ExercisePatch,
    ) -> Result<Exercise, ExerciseError> {
        self.write(TransactionBehavior::Immediate, |conn| {
            catalog::update_exercise(conn, self.clock.as_ref(), id, patch)
        })
    }

    pub fn delete_exercise(&self, id: &Uuid) -> Result<DeleteOutcome, ExerciseError> {
        self.write(TransactionBehavior::Immediate, |conn| {
            catalog::delete_exercise(conn, id)
        })
    }

    pub fn get_exercise(&self, id: &Uuid) -> Result<Exercise, ExerciseError> {
        tracing::debug!(exercise_id = %id, "Fetching exercise");
        self.read(|conn| catalog::get_exercise(conn, id))
    }

    pub fn list_exercises(&self, filter: &ExerciseFilter) -> Result<ExerciseListing, ExerciseError> {
        tracing::debug!(?filter, "Listing exercises");
        self.read(|conn| catalog::list_exercises(conn, filter))
    }

    pub fn exercise_stats(&self, id: &Uuid) -> Result<ExerciseStats, ExerciseError> {
        self.read(|conn| catalog::exercise_stats(conn, id))
    }

    // ── Assignments ─────────────────────────────────────────

    /// Looks the exercise up first; nothing is written when it is unknown.
    pub fn assign_exercise_to_patient(
        &self,
        request: AssignmentRequest,
    ) -> Result<AssignmentView, ExerciseError> {
        let detail = self.write(TransactionBehavior::Immediate, |conn| {
            assignments::assign(conn, self.clock.as_ref(), request)
        })?;
        Ok(self.view(detail))
    }

    /// Records one set. On the completing call the patient's adherence
    /// snapshot is recomputed in the same transaction and returned too.
    pub fn complete_set(&self, id: &Uuid) -> Result<CompleteSetOutcome, ExerciseError> {
        let (completion, snapshot) = self.write(TransactionBehavior::Immediate, |conn| {
            let completion = assignments::record_set_completion(conn, self.clock.as_ref(), id)?;
            let snapshot = if completion.just_completed {
                Some(self.patient_snapshot(conn, &completion.detail.assignment.patient_id)?)
            } else {
                None
            };
            Ok((completion, snapshot))
        })?;

        if let Some(snapshot) = &snapshot {
            tracing::info!(
                assignment_id = %id,
                streak = snapshot.streak,
                adherence_rate = ?snapshot.adherence_rate,
                "Assignment completed"
            );
        }

        Ok(CompleteSetOutcome {
            just_completed: completion.just_completed,
            assignment: self.view(completion.detail),
            adherence: snapshot,
        })
    }

    pub fn unassign(&self, id: &Uuid) -> Result<(), ExerciseError> {
        self.write(TransactionBehavior::Immediate, |conn| {
            assignments::unassign(conn, id)
        })
    }

    pub fn get_assignment(&self, id: &Uuid) -> Result<AssignmentView, ExerciseError> {
        let detail = self.read(|conn| assignments::get_assignment(conn, id))?;
        Ok(self.view(detail))
    }

    pub fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<AssignmentView>, ExerciseError> {
        tracing::debug!(?filter, "Listing assignments");
        let details = self.read(|conn| assignments::list_assignments(conn, filter))?;
        Ok(details.into_iter().map(|d| self.view(d)).collect())
    }

    // ── Patients ────────────────────────────────────────────

    /// Makes a patient known before any assignment exists. Returns `true`
    /// when the patient was new.
    pub fn register_patient(&self, patient_id: &str) -> Result<bool, ExerciseError> {
        let patient_id = patient_id.trim();
        if patient_id.is_empty() {
            return Err(ExerciseError::Validation("patient_id must not be empty".into()));
        }
        let created = self.write(TransactionBehavior::Deferred, |conn| {
            Ok(repository::register_patient(conn, patient_id, &self.clock.now())?)
        })?;
        if created {
            tracing::info!(patient_id, "Patient registered");
        }
        Ok(created)
    }

    pub fn get_patient_daily_view(
        &self,
        patient_id: &str,
        date: NaiveDate,
    ) -> Result<DailyView, ExerciseError> {
        let patient_id = patient_id.trim();
        tracing::debug!(patient_id, %date, "Building daily view");
        let details = self.read(|conn| {
            Self::require_patient(conn, patient_id)?;
            let filter = AssignmentFilter::for_patient(patient_id).due_between(date, date);
            Ok(repository::list_assignment_details(conn, &filter)?)
        })?;

        let views: Vec<AssignmentView> = details.into_iter().map(|d| self.view(d)).collect();
        let due_count = views.len() as u32;
        let completed_count = views
            .iter()
            .filter(|v| v.assignment.status == AssignmentStatus::Completed)
            .count() as u32;

        Ok(DailyView {
            patient_id: patient_id.to_string(),
            date,
            assignments: views,
            due_count,
            completed_count,
            completion_percentage: adherence::completion_rate(completed_count, due_count),
        })
    }

    pub fn get_patient_adherence(&self, patient_id: &str) -> Result<PatientAdherence, ExerciseError> {
        let patient_id = patient_id.trim();
        tracing::debug!(patient_id, "Computing adherence");
        let snapshot = self.read(|conn| {
            Self::require_patient(conn, patient_id)?;
            self.patient_snapshot(conn, patient_id)
        })?;
        Ok(PatientAdherence {
            patient_id: patient_id.to_string(),
            snapshot,
        })
    }

    pub fn get_patient_exercise_plan(&self, patient_id: &str) -> Result<ExercisePlan, ExerciseError> {
        let patient_id = patient_id.trim();
        tracing::debug!(patient_id, "Building exercise plan");
        let details = self.read(|conn| {
            Self::require_patient(conn, patient_id)?;
            Ok(repository::list_assignment_details(
                conn,
                &AssignmentFilter::for_patient(patient_id),
            )?)
        })?;

        let as_of = self.clock.today();
        let mut plan = ExercisePlan {
            patient_id: patient_id.to_string(),
            as_of,
            today: Vec::new(),
            upcoming: Vec::new(),
            overdue: Vec::new(),
            completed: Vec::new(),
        };
        for detail in details {
            let view = AssignmentView::from_detail(detail, as_of);
            match view.effective_status {
                EffectiveStatus::Completed => plan.completed.push(view),
                EffectiveStatus::Overdue => plan.overdue.push(view),
                _ if view.assignment.due_date == as_of => plan.today.push(view),
                _ => plan.upcoming.push(view),
            }
        }
        Ok(plan)
    }
}
