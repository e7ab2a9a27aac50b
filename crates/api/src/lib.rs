//! HTTP API layer for the activity pipeline.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
