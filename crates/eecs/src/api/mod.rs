//! HTTP API module.
//!
//! Login, logout and the protected auth endpoints.

pub mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
