//! # REST API Components
//!
//! HTTP routing, error mapping, handlers and the server runner for Warden.

pub mod docs;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::{shutdown_signal, start_api_server};
