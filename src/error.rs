//! Error taxonomy for the exercise domain.
//!
//! Every operation either succeeds or returns exactly one of these.
//! `Validation`, `NotFound`, `Conflict` and `InvalidState` are caller
//! errors and are never retried here.

use crate::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ExerciseError {
    /// Malformed or out-of-range input.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The change would break an invariant spanning several entities.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation is not allowed in the entity's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(DatabaseError),

    #[error("Service lock poisoned")]
    LockPoisoned,
}

impl ExerciseError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<DatabaseError> for ExerciseError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            other => Self::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for ExerciseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(DatabaseError::Sqlite(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_not_found_maps_to_not_found() {
        let err: ExerciseError = DatabaseError::NotFound {
            entity_type: "Exercise".into(),
            id: "abc".into(),
        }
        .into();
        assert!(matches!(err, ExerciseError::NotFound { ref entity, .. } if entity == "Exercise"));
        assert_eq!(err.to_string(), "Exercise not found: abc");
    }

    #[test]
    fn other_database_errors_map_to_storage() {
        let err: ExerciseError = DatabaseError::ConstraintViolation("bad row".into()).into();
        assert!(matches!(err, ExerciseError::Storage(_)));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ExerciseError::InvalidState("assignment already completed".into()).to_string(),
            "Invalid state: assignment already completed"
        );
        assert_eq!(ExerciseError::LockPoisoned.to_string(), "Service lock poisoned");
    }
}
