pub mod classes;
pub mod conduct;
pub mod core;
pub mod evaluations;
pub mod reports;
pub mod setup;
