// Embedded relational store: single source of truth for all coordination
// state. Observables are derived caches refreshed after commits.

mod db;
mod error;
mod schema;

pub(crate) mod queries;

pub use db::{Database, SymbolRegistration};
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
