//! API endpoint handlers.
//!
//! Handlers are thin: parse the request, call `ExerciseService`, map the
//! result. No business rules live here.

pub mod assignments;
pub mod exercises;
pub mod health;
pub mod patients;
