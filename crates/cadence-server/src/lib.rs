// Server wiring: config, state, the realtime bus, and the health endpoint.
// The binary entry point lives in main.rs.

pub mod bus;
pub mod config;
pub mod health;
pub mod logging;
pub mod register;
pub mod state;

pub use bus::{bus_router, serve_bus};
pub use config::{Cli, Config};
pub use health::{health_payload, serve_health};
pub use state::{AppState, build_state};
