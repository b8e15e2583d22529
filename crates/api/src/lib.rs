//! # Mood Gateway API
//!
//! The HTTP surface: request adapters over the recommendation and room
//! engines, the WebSocket upgrade, startup wiring and the daily scheduler.

pub mod health;
pub mod routes;
pub mod scheduler;
pub mod server;
pub mod state;

pub use scheduler::{Scheduler, SchedulerHandle};
pub use state::AppState;
