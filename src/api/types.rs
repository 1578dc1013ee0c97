//! Shared types for the HTTP layer.

use std::sync::Arc;

use uuid::Uuid;

use crate::api::error::ApiError;
use crate::coordinator::ExerciseService;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub service: Arc<ExerciseService>,
}

impl ApiContext {
    pub fn new(service: Arc<ExerciseService>) -> Self {
        Self { service }
    }
}

/// Parses a path id, naming the entity in the error.
pub fn parse_id(entity: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {entity} ID: {e}")))
}

/// Matches a query value against an enum's wire names.
///
/// Accepts the stored form (`in_progress`) and the JSON form (`InProgress`),
/// case-insensitively.
pub fn parse_enum<T: Copy>(
    field: &str,
    raw: &str,
    all: &[T],
    name: impl Fn(&T) -> &'static str,
) -> Result<T, ApiError> {
    let wanted = normalize(raw);
    all.iter()
        .find(|v| normalize(name(*v)) == wanted)
        .copied()
        .ok_or_else(|| {
            let options: Vec<&str> = all.iter().map(&name).collect();
            ApiError::BadRequest(format!(
                "Invalid {field} '{raw}', expected one of: {}",
                options.join(", ")
            ))
        })
}

fn normalize(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
