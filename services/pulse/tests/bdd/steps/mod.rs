//! BDD step definitions for pulse service

pub mod lifecycle_steps;
pub mod scheduling_steps;
pub mod status_steps;
