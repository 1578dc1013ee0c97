//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table. All public functions are re-exported here.

mod assignment;
mod exercise;
mod patient;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::DatabaseError;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub use assignment::*;
pub use exercise::*;
pub use patient::*;

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_datetime(at: &NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_date(raw: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid date {raw}: {e}")))
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_formats_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date(&format_date(&date)).unwrap(), date);

        let at = date.and_hms_opt(9, 30, 5).unwrap();
        assert_eq!(format_datetime(&at), "2024-01-15 09:30:05");
        assert_eq!(parse_datetime("2024-01-15 09:30:05").unwrap(), at);
    }

    #[test]
    fn malformed_values_are_constraint_violations() {
        assert!(matches!(
            parse_date("15/01/2024"),
            Err(DatabaseError::ConstraintViolation(_))
        ));
        assert!(matches!(
            parse_uuid("not-a-uuid"),
            Err(DatabaseError::ConstraintViolation(_))
        ));
    }
}
