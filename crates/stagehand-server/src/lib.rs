//! HTTP transport for the Stagehand stage scheduler.
//!
//! Runners long-poll `POST /api/v1/request`; producers create or release
//! stages, which nudges the scheduler.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
