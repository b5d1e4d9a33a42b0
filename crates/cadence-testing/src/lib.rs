//! Testing infrastructure for cadence integration tests.
//!
//! - `TestWorld`: isolated data dir + seeded store for declarative setup
//! - `fixtures`: canonical sessions, checkpoints, and samples

pub mod fixtures;
pub mod world;

pub use world::TestWorld;
