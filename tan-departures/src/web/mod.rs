//! Web layer for the departure board.
//!
//! Read-only access to the published snapshots of every monitored stop,
//! plus an on-demand refresh.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::create_router;
pub use state::AppState;
