//! Web layer for the ride-matching server.
//!
//! JSON endpoints for riders, drivers and trips.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::{AppOrchestrator, AppState};
