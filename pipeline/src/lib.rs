//! Turns the tables of a building-code PDF into validated, typed records: fast extraction with a
//! layout fallback, then model repair against strict schemas.

pub mod config;
pub mod hints;
pub mod model;
pub mod orchestrator;
pub mod outcome;
pub mod prompt;
pub mod repair;
pub mod schema;
