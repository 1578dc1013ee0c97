use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use super::format_datetime;
use crate::db::DatabaseError;

/// Registers a patient id. Returns `true` when the patient was new.
pub fn register_patient(
    conn: &Connection,
    patient_id: &str,
    at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO patients (id, registered_at) VALUES (?1, ?2)",
        params![patient_id, format_datetime(at)],
    )?;
    Ok(inserted == 1)
}

pub fn patient_exists(conn: &Connection, patient_id: &str) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT COUNT(*) > 0 FROM patients WHERE id = ?1",
        params![patient_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}
