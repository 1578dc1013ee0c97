pub mod enums;
mod assignment;
mod exercise;
mod filters;

pub use assignment::*;
pub use exercise::*;
pub use filters::*;
