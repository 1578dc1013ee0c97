//! Adherence engine: completion rate, adherence rate, streaks.
//!
//! Pure functions over caller-supplied assignment snapshots. Nothing here
//! reads storage or the clock; callers pass "today" in.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::MAX_WINDOW_DAYS;
use crate::models::enums::AssignmentStatus;
use crate::models::AssignmentDetail;

// ═══════════════════════════════════════════
// Inputs
// ═══════════════════════════════════════════

/// The facts about one assignment that adherence metrics depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentProgress {
    pub due_date: NaiveDate,
    pub prescribed_sets: u32,
    pub completed_sets: u32,
    pub status: AssignmentStatus,
    /// Day of the last recorded set, if any.
    pub last_completed_on: Option<NaiveDate>,
}

impl AssignmentProgress {
    /// A completed assignment stays at 100 even if its exercise was later
    /// given more sets.
    pub fn completion_rate(&self) -> u8 {
        if self.status == AssignmentStatus::Completed {
            return 100;
        }
        completion_rate(self.completed_sets, self.prescribed_sets)
    }

    /// Completed with the last set recorded no later than the due date.
    pub fn completed_on_time(&self) -> bool {
        self.status == AssignmentStatus::Completed
            && self
                .last_completed_on
                .map_or(false, |day| day <= self.due_date)
    }
}

impl From<&AssignmentDetail> for AssignmentProgress {
    fn from(detail: &AssignmentDetail) -> Self {
        Self {
            due_date: detail.assignment.due_date,
            prescribed_sets: detail.exercise.sets,
            completed_sets: detail.assignment.completed_sets,
            status: detail.assignment.status,
            last_completed_on: detail.assignment.last_completed_at.map(|at| at.date()),
        }
    }
}

// ═══════════════════════════════════════════
// Rates
// ═══════════════════════════════════════════

/// `round(100 * completed / prescribed)`, capped at 100. Zero prescribed sets yields 0.
pub fn completion_rate(completed_sets: u32, prescribed_sets: u32) -> u8 {
    if prescribed_sets == 0 {
        return 0;
    }
    let completed = completed_sets.min(prescribed_sets) as f64;
    (100.0 * completed / prescribed_sets as f64).round() as u8
}

/// Mean completion rate over assignments due inside `[period_start, period_end]`.
///
/// `None` means there was nothing to measure, which is not the same as 0%.
pub fn patient_adherence_rate(
    assignments: &[AssignmentProgress],
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Option<u8> {
    let rates: Vec<u32> = assignments
        .iter()
        .filter(|a| a.due_date >= period_start && a.due_date <= period_end)
        .map(|a| a.completion_rate() as u32)
        .collect();

    if rates.is_empty() {
        return None;
    }
    let total: u32 = rates.iter().sum();
    Some((total as f64 / rates.len() as f64).round() as u8)
}

/// Dashboard band for an adherence rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdherenceLevel {
    Excellent,
    Great,
    Good,
    NeedsImprovement,
}

impl AdherenceLevel {
    pub fn from_rate(rate: u8) -> Self {
        match rate {
            90.. => Self::Excellent,
            80..=89 => Self::Great,
            70..=79 => Self::Good,
            _ => Self::NeedsImprovement,
        }
    }
}

// ═══════════════════════════════════════════
// Streaks
// ═══════════════════════════════════════════

/// How one calendar day went: assignments due, and how many of those were
/// completed on time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCompletion {
    pub date: NaiveDate,
    pub due: u32,
    pub completed: u32,
}

impl DailyCompletion {
    pub fn is_rest_day(&self) -> bool {
        self.due == 0
    }

    pub fn is_fully_completed(&self) -> bool {
        self.due > 0 && self.completed >= self.due
    }
}

/// One record per day in `[from, to]`, rest days included.
pub fn daily_completion_records(
    assignments: &[AssignmentProgress],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<DailyCompletion> {
    let mut records = Vec::new();
    let mut day = from;
    while day <= to {
        let due_today = assignments.iter().filter(|a| a.due_date == day);
        let (due, completed) = due_today.fold((0, 0), |(due, done), a| {
            (due + 1, done + u32::from(a.completed_on_time()))
        });
        records.push(DailyCompletion {
            date: day,
            due,
            completed,
        });
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    records
}

/// Consecutive fully-completed days ending today (or yesterday).
///
/// Today only counts once it is fully completed; an unfinished today is
/// skipped rather than breaking the run. Rest days are skipped as well.
/// The walk stops at the first earlier day that had work due and was not
/// fully completed. Records after `today` are ignored.
pub fn streak(records: &[DailyCompletion], today: NaiveDate) -> u32 {
    let mut by_day: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.date <= today) {
        let entry = by_day.entry(record.date).or_insert((0, 0));
        entry.0 += record.due;
        entry.1 += record.completed;
    }

    let mut count = 0;
    for (date, (due, completed)) in by_day.iter().rev() {
        let day = DailyCompletion {
            date: *date,
            due: *due,
            completed: *completed,
        };
        if day.is_rest_day() {
            continue;
        }
        if day.is_fully_completed() {
            count += 1;
        } else if day.date == today {
            continue;
        } else {
            break;
        }
    }
    count
}

// ═══════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════

/// Derived adherence figures for one patient. Recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdherenceSnapshot {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub adherence_rate: Option<u8>,
    pub level: Option<AdherenceLevel>,
    pub streak: u32,
}

/// First day of the `days`-long window ending on `today`. Windows are capped
/// at `MAX_WINDOW_DAYS` and stop at the earliest representable date.
fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    let days = days.clamp(1, MAX_WINDOW_DAYS);
    today
        .checked_sub_signed(Duration::days(i64::from(days) - 1))
        .unwrap_or(NaiveDate::MIN)
}

/// Adherence over the `window_days` ending today; streak over the
/// `streak_lookback_days` ending today.
pub fn snapshot(
    assignments: &[AssignmentProgress],
    today: NaiveDate,
    window_days: u32,
    streak_lookback_days: u32,
) -> AdherenceSnapshot {
    let period_start = window_start(today, window_days);
    let adherence_rate = patient_adherence_rate(assignments, period_start, today);

    let streak_start = window_start(today, streak_lookback_days);
    let records = daily_completion_records(assignments, streak_start, today);

    AdherenceSnapshot {
        period_start,
        period_end: today,
        adherence_rate,
        level: adherence_rate.map(AdherenceLevel::from_rate),
        streak: streak(&records, today),
    }
}
